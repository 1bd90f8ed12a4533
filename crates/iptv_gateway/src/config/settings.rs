use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::CatchupTarget;
use crate::client::HttpOptions;
use crate::config::{Config, Job, SourceConfig};
use crate::epg::EpgBackend;
use crate::error::ConfigError;
use crate::logo::{LogoDir, LogoPolicy};
use crate::utils::net::ipv4_of_interface;

/// 输出文件与对外访问地址
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub out_dir: PathBuf,
    pub playlist_path: PathBuf,
    pub xmltv_path: PathBuf,
    pub web_base_url: String,
    /// 写入播放列表头部的 XMLTV 地址
    pub epg_url: Option<String>,
    pub logo_dir: LogoDir,
}

#[derive(Debug, Clone)]
pub struct LogoSettings {
    pub policy: LogoPolicy,
    pub delay: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EpgSettings {
    pub backend: EpgBackend,
    pub days_back: u32,
    pub days_forward: u32,
    pub timeout: Duration,
}

/// 单次运行使用的只读设置，由 Config 一次性解析得到并显式传给各个阶段
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_ip: Option<IpAddr>,
    pub user_agent: String,
    pub timeout: Duration,
    pub catalog_url: String,
    pub tvg_id_field: String,
    pub output: OutputLayout,
    /// None 表示不做组播转换
    pub relay_base: Option<String>,
    /// None 表示不做台标本地化
    pub logo: Option<LogoSettings>,
    pub epg: EpgSettings,
    pub catchup: CatchupTarget,
    pub job_timeout: Duration,
}

fn resolve_bind_ip(source: &SourceConfig) -> Result<Option<IpAddr>, String> {
    if let Some(ip) = source.bind_ip {
        return Ok(Some(ip));
    }
    let iface = source.interface.trim();
    if iface.is_empty() {
        return Ok(None);
    }
    ipv4_of_interface(iface)
        .map(|ip| Some(IpAddr::V4(ip)))
        .ok_or_else(|| format!("网卡 {iface} 不存在或没有 IPv4 地址"))
}

fn upsert(params: &mut Vec<(String, String)>, key: &str, value: String) {
    params.retain(|(k, _)| k != key);
    params.push((key.to_owned(), value));
}

/// 解析 querystring 形式的固定参数：空键忽略，重复键以最后一个为准，ip 替换为出站地址
fn parse_extra_params(qs: &str, bind_ip: Option<IpAddr>) -> Result<Vec<(String, String)>, String> {
    let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(qs.trim().trim_start_matches('?'))
        .map_err(|e| format!("epg.extra_params 无法解析：{e}"))?;
    let mut params = Vec::with_capacity(pairs.len() + 1);
    for (key, value) in pairs.into_iter().filter(|(k, _)| !k.is_empty()) {
        upsert(&mut params, &key, value);
    }
    if let Some(ip) = bind_ip {
        upsert(&mut params, "ip", ip.to_string());
    }
    Ok(params)
}

impl Settings {
    pub fn resolve(config: &Config, config_dir: &Path, job: Job) -> Result<Self, ConfigError> {
        config.check(job)?;
        let mut errors = Vec::new();

        let bind_ip = if matches!(job, Job::Playlist | Job::Epg) {
            resolve_bind_ip(&config.source).unwrap_or_else(|e| {
                errors.push(e);
                None
            })
        } else {
            None
        };
        let extra_params = if job == Job::Epg {
            parse_extra_params(&config.epg.extra_params, bind_ip).unwrap_or_else(|e| {
                errors.push(e);
                Vec::new()
            })
        } else {
            Vec::new()
        };
        if !errors.is_empty() {
            return Err(ConfigError(errors));
        }

        let output = &config.output;
        let out_dir = if output.out_dir.is_absolute() {
            output.out_dir.clone()
        } else {
            config_dir.join(&output.out_dir)
        };
        let web_base_url = output.web_base_url.trim().trim_end_matches('/').to_owned();
        let epg_url = match output.epg_url.trim() {
            "" if web_base_url.is_empty() => None,
            "" => {
                let mount = output.web_mount.trim_matches('/');
                Some(if mount.is_empty() {
                    format!("{web_base_url}/{}", output.xmltv_name)
                } else {
                    format!("{web_base_url}/{mount}/{}", output.xmltv_name)
                })
            }
            explicit => Some(explicit.to_owned()),
        };
        let logo_dir = LogoDir::resolve(&out_dir, config.logo.dir.as_deref(), &output.web_mount);

        Ok(Self {
            bind_ip,
            user_agent: config.source.user_agent.trim().to_owned(),
            timeout: Duration::from_secs(config.source.timeout),
            catalog_url: config.source.catalog_url.trim().to_owned(),
            tvg_id_field: config.source.tvg_id_field.trim().to_owned(),
            output: OutputLayout {
                playlist_path: out_dir.join(&output.playlist_name),
                xmltv_path: out_dir.join(&output.xmltv_name),
                out_dir,
                web_base_url,
                epg_url,
                logo_dir,
            },
            relay_base: config
                .relay
                .enabled
                .then(|| config.relay.base_url.trim().trim_end_matches('/').to_owned()),
            logo: config.logo.localize.then(|| LogoSettings {
                policy: LogoPolicy {
                    download_missing: config.logo.download_missing,
                    skip_existing: config.logo.skip_existing,
                },
                delay: Duration::from_millis(config.logo.delay),
                timeout: Duration::from_secs(config.logo.timeout),
            }),
            epg: EpgSettings {
                backend: EpgBackend {
                    url: config.epg.backend_url.trim().to_owned(),
                    riddle: config.epg.riddle.trim().to_owned(),
                    time: config.epg.time.trim().to_owned(),
                    extra_params,
                    delay: Duration::from_millis(config.epg.delay),
                    max_channels: config.epg.max_channels,
                },
                days_back: config.epg.days_back,
                days_forward: config.epg.days_forward,
                timeout: Duration::from_secs(config.epg.timeout),
            },
            catchup: config.catchup.clone(),
            job_timeout: Duration::from_secs(config.job_timeout),
        })
    }

    pub fn http_options(&self, timeout: Duration) -> HttpOptions {
        HttpOptions {
            bind_ip: self.bind_ip,
            user_agent: self.user_agent.clone(),
            timeout,
        }
    }
}
