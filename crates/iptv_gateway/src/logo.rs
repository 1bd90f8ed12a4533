use std::path::{Component, Path, PathBuf};

use reqwest::Url;
use serde::Serialize;
use tokio::fs;

use crate::catalog::Channel;
use crate::client::Throttle;
use crate::downloader::Downloader;
use crate::utils::filenamify::{filenamify, is_degenerate};

const DEFAULT_LOGO_SUBDIR: &str = "logos";
const DEFAULT_EXTENSION: &str = "png";

/// 台标目录：文件系统路径与对外访问路径在解析配置时一次性算好，且一定位于输出目录之下
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoDir {
    fs_path: PathBuf,
    web_path: String,
}

impl LogoDir {
    /// `configured` 为空时使用 `{out_dir}/logos`；相对路径相对于 out_dir；
    /// 不在输出目录下的路径会被纠正为默认目录
    pub fn resolve(out_dir: &Path, configured: Option<&Path>, web_mount: &str) -> Self {
        let relative = match configured.filter(|p| !p.as_os_str().is_empty()) {
            None => PathBuf::from(DEFAULT_LOGO_SUBDIR),
            Some(path) => match Self::relative_to(out_dir, path) {
                Some(relative) if relative.as_os_str().is_empty() => {
                    warn!("台标目录 {} 与输出目录相同，改用 {DEFAULT_LOGO_SUBDIR}/ 子目录", path.display());
                    PathBuf::from(DEFAULT_LOGO_SUBDIR)
                }
                Some(relative) => relative,
                None => {
                    warn!(
                        "台标目录 {} 不在输出目录 {} 下，改用默认目录",
                        path.display(),
                        out_dir.display()
                    );
                    PathBuf::from(DEFAULT_LOGO_SUBDIR)
                }
            },
        };
        let segments = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>();
        let web_path = std::iter::once(web_mount.trim_matches('/'))
            .chain(segments.iter().map(String::as_str))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self {
            fs_path: out_dir.join(relative),
            web_path,
        }
    }

    /// 只接受不含 `..` 的相对路径，或以 out_dir 开头的绝对路径
    fn relative_to(out_dir: &Path, path: &Path) -> Option<PathBuf> {
        let relative = if path.is_absolute() {
            path.strip_prefix(out_dir).ok()?.to_path_buf()
        } else {
            path.to_path_buf()
        };
        relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
            .then_some(relative)
    }

    pub fn fs_path(&self) -> &Path {
        &self.fs_path
    }

    pub fn web_path(&self) -> &str {
        &self.web_path
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.fs_path.join(filename)
    }

    pub fn url(&self, web_base: &str, filename: &str) -> String {
        let web_base = web_base.trim().trim_end_matches('/');
        if self.web_path.is_empty() {
            format!("{web_base}/{filename}")
        } else {
            format!("{web_base}/{}/{filename}", self.web_path)
        }
    }
}

fn last_path_segment(url: &str) -> String {
    let url = url.trim();
    match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or_default()
            .to_owned(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_owned(),
    }
}

/// 从台标 URL 末段推导本地文件名，推导不出时使用 `fallback_stem`
pub fn logo_filename(url: &str, fallback_stem: &str) -> String {
    let name = filenamify(last_path_segment(url));
    if is_degenerate(&name) {
        let stem = filenamify(fallback_stem);
        let stem = if is_degenerate(&stem) { "logo" } else { stem.as_str() };
        return format!("{stem}.{DEFAULT_EXTENSION}");
    }
    if Path::new(&name).extension().is_none() {
        return format!("{name}.{DEFAULT_EXTENSION}");
    }
    name
}

async fn is_present(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LogoStats {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub missing: usize,
    pub rewritten: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct LogoPolicy {
    pub download_missing: bool,
    pub skip_existing: bool,
}

pub struct LogoLocalizer<'a> {
    pub dir: &'a LogoDir,
    pub web_base: &'a str,
    pub downloader: &'a Downloader,
    pub throttle: &'a Throttle,
}

impl LogoLocalizer<'_> {
    pub async fn localize(&self, channels: Vec<Channel>, policy: LogoPolicy) -> (Vec<Channel>, LogoStats) {
        let mut stats = LogoStats::default();
        let mut localized = Vec::with_capacity(channels.len());
        for channel in channels {
            let logo = channel.tvg_logo.trim().to_owned();
            if logo.is_empty() {
                localized.push(channel);
                continue;
            }
            let fallback_stem = if channel.tvg_id.is_empty() {
                &channel.name
            } else {
                &channel.tvg_id
            };
            let filename = logo_filename(&logo, fallback_stem);
            let path = self.dir.file_path(&filename);
            let download = match (is_present(&path).await, policy.skip_existing, policy.download_missing) {
                (true, true, _) => {
                    stats.skipped += 1;
                    false
                }
                (true, false, _) => true,
                (false, _, false) => {
                    stats.missing += 1;
                    false
                }
                (false, _, true) => true,
            };
            if download {
                self.throttle.wait().await;
                match self.downloader.fetch(&logo, &path).await {
                    Ok(_) => stats.downloaded += 1,
                    Err(e) => {
                        warn!("下载频道「{}」的台标 {logo} 失败：{e:#}", channel.name);
                        stats.failed += 1;
                    }
                }
            }
            if is_present(&path).await {
                stats.rewritten += 1;
                let url = self.dir.url(self.web_base, &filename);
                localized.push(channel.with_logo(url));
            } else {
                localized.push(channel);
            }
        }
        (localized, stats)
    }
}

/// 只读地把图标地址替换为本地已有的台标，本地没有时返回原地址，从不下载
pub struct LogoResolver<'a> {
    pub dir: &'a LogoDir,
    pub web_base: &'a str,
}

impl LogoResolver<'_> {
    pub async fn resolve(&self, icon: &str, fallback_stem: &str) -> String {
        let icon = icon.trim();
        if icon.is_empty() {
            return String::new();
        }
        let filename = logo_filename(icon, fallback_stem);
        if is_present(&self.dir.file_path(&filename)).await {
            self.dir.url(self.web_base, &filename)
        } else {
            icon.to_owned()
        }
    }
}
