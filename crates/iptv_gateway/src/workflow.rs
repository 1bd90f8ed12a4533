use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;

use crate::catalog::{self, CatchupTarget, epg_channels, fetch_catalog};
use crate::client::{Client, Throttle};
use crate::config::Settings;
use crate::downloader::Downloader;
use crate::epg::{self, DayWindow, FetchStats, build_xmltv, filter_by_days};
use crate::error::JobOutcome;
use crate::logo::{LogoLocalizer, LogoResolver, LogoStats};
use crate::{playlist, relay};

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistReport {
    pub path: PathBuf,
    pub channels: usize,
    pub with_catchup: usize,
    pub logos: Option<LogoStats>,
    pub catchup_target: Option<CatchupTarget>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpgReport {
    pub path: PathBuf,
    pub channels: usize,
    pub fetch: FetchStats,
    pub programmes: usize,
    pub window: DayWindow,
}

/// 先写入同目录下的临时文件再改名，失败时不会破坏已有的输出；临时文件名唯一，并发运行互不干扰
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("创建目录 {} 失败", parent.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("输出路径 {} 不是文件", path.display()))?;
    let prefix = format!(".{}.", file_name.to_string_lossy());
    let (parent, target, content) = (parent.to_path_buf(), path.to_path_buf(), content.to_vec());
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut temp_file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(&parent)?;
        temp_file.write_all(&content)?;
        temp_file.as_file().sync_all()?;
        // 改名失败时 PersistError 携带的临时文件随之被删除
        temp_file.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .context("写入任务异常退出")?
    .with_context(|| format!("写入 {} 失败", path.display()))
}

/// 拉取频道列表 -> 解析 -> 台标本地化 -> 组播转换 -> 写出 M3U
pub async fn build_playlist(settings: &Settings) -> Result<PlaylistReport> {
    let client = Client::new(&settings.http_options(settings.timeout))?;
    let categories = fetch_catalog(&client, &settings.catalog_url)
        .await
        .context("拉取频道列表失败")?;
    let parsed = catalog::parse(&categories, &settings.tvg_id_field, &settings.output.web_base_url);
    if parsed.channels.is_empty() {
        bail!("频道列表中没有可用的频道");
    }
    info!("解析频道列表完成，共 {} 个频道", parsed.channels.len());
    let catchup_target = parsed.catchup_target();
    let mut channels = parsed.channels;

    let mut logos = None;
    if let Some(logo) = &settings.logo {
        let downloader = Downloader::new(Client::new(&settings.http_options(logo.timeout))?);
        let throttle = Throttle::new(logo.delay);
        let localizer = LogoLocalizer {
            dir: &settings.output.logo_dir,
            web_base: &settings.output.web_base_url,
            downloader: &downloader,
            throttle: &throttle,
        };
        let (localized, stats) = localizer.localize(channels, logo.policy).await;
        info!(
            "台标处理完成：下载 {}，跳过 {}，失败 {}，缺失 {}，改写 {}",
            stats.downloaded, stats.skipped, stats.failed, stats.missing, stats.rewritten
        );
        channels = localized;
        logos = Some(stats);
    }
    if let Some(relay_base) = &settings.relay_base {
        channels = relay::rewrite_all(channels, relay_base);
    }

    let text = playlist::render(&channels, settings.output.epg_url.as_deref());
    write_atomic(&settings.output.playlist_path, text.as_bytes()).await?;
    Ok(PlaylistReport {
        path: settings.output.playlist_path.clone(),
        channels: channels.len(),
        with_catchup: channels.iter().filter(|c| !c.catchup_source.is_empty()).count(),
        logos,
        catchup_target,
    })
}

/// 拉取频道列表 -> 逐个频道拉取节目单 -> 按日期过滤 -> 写出 XMLTV
pub async fn build_epg(settings: &Settings, now: DateTime<Utc>) -> Result<EpgReport> {
    let client = Client::new(&settings.http_options(settings.timeout))?;
    let categories = fetch_catalog(&client, &settings.catalog_url)
        .await
        .context("拉取频道列表失败")?;
    let mut channels = epg_channels(&categories);
    if channels.is_empty() {
        bail!("频道列表中没有带 primaryid 的频道");
    }
    info!("共 {} 个频道需要获取节目单", channels.len());

    let epg_client = Client::new(&settings.http_options(settings.epg.timeout))?;
    let (mut doc, fetch) = epg::fetch_all(&epg_client, &channels, &settings.epg.backend).await;
    if fetch.ok == 0 {
        warn!("没有获取到任何频道的节目单，输出的 XMLTV 将只包含频道信息");
    }
    let window = filter_by_days(&mut doc, settings.epg.days_back, settings.epg.days_forward, now);

    let resolver = LogoResolver {
        dir: &settings.output.logo_dir,
        web_base: &settings.output.web_base_url,
    };
    for channel in &mut channels {
        channel.icon = resolver.resolve(&channel.icon, &channel.id).await;
    }
    let xmltv = build_xmltv(&channels, &doc);
    let xml = xmltv.render().await.context("生成 XMLTV 失败")?;
    write_atomic(&settings.output.xmltv_path, xml.as_bytes()).await?;
    Ok(EpgReport {
        path: settings.output.xmltv_path.clone(),
        channels: channels.len(),
        fetch,
        programmes: xmltv.programmes.len(),
        window,
    })
}

/// 整个任务超时视为失败，但与普通错误区分开
pub async fn run_job<T, F>(timeout: Duration, job: F) -> JobOutcome<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, job).await {
        Ok(res) => res.into(),
        Err(_) => JobOutcome::TimedOut(timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_write_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/iptv.m3u");
        write_atomic(&path, b"#EXTM3U\n").await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "#EXTM3U\n");
        write_atomic(&path, b"#EXTM3U\nnew\n").await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "#EXTM3U\nnew\n");
        assert_eq!(entries(&dir.path().join("out")), vec!["iptv.m3u"]);
    }

    #[tokio::test]
    async fn test_write_atomic_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epg.xml");
        let contents = (0..8).map(|i| format!("<tv>{i}</tv>")).collect::<Vec<_>>();
        let writes = contents.iter().map(|c| write_atomic(&path, c.as_bytes()));
        for res in futures::future::join_all(writes).await {
            res.unwrap();
        }
        let written = fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains(&written), "{written}");
        assert_eq!(entries(dir.path()), vec!["epg.xml"]);
    }

    #[tokio::test]
    async fn test_write_atomic_keeps_old_file_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        // 目标是一个非空目录，改名必然失败
        let path = dir.path().join("epg.xml");
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        assert!(write_atomic(&path, b"<tv/>").await.is_err());
        assert!(path.join("occupied").exists());
        assert_eq!(entries(dir.path()), vec!["epg.xml"]);
    }

    #[tokio::test]
    async fn test_run_job_outcomes() {
        let ok = run_job(Duration::from_secs(1), async { Ok(1) }).await;
        assert_eq!(ok.exit_code(), 0);
        let failed = run_job(Duration::from_secs(1), async { Err::<(), _>(anyhow::anyhow!("boom")) }).await;
        assert_eq!(failed.exit_code(), 1);
        let timed_out = run_job(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(timed_out, JobOutcome::TimedOut(_)));
        assert_eq!(timed_out.exit_code(), 124);
    }
}
