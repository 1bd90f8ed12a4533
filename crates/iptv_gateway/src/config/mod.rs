mod args;
mod default;
mod item;
mod settings;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use crate::config::args::{Args, Command};
use crate::config::default::{default_catchup_target, default_job_timeout};
pub use crate::config::item::{EpgConfig, LogoConfig, OutputConfig, RelayConfig, SourceConfig};
pub use crate::config::settings::{EpgSettings, LogoSettings, OutputLayout, Settings};
use crate::catalog::CatchupTarget;
use crate::error::ConfigError;
use crate::utils::net::is_http_url;

const CONFIG_FILE: &str = "config.toml";

pub fn default_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir().context("No config path found")?.join("iptv-gateway"))
}

/// 需要预检的任务类型，不同任务依赖的配置项不同
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Playlist,
    Epg,
    Catchup,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// 单次任务的超时时间，秒
    pub job_timeout: u64,
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub relay: RelayConfig,
    pub logo: LogoConfig,
    pub epg: EpgConfig,
    /// 每次成功生成播放列表后由频道列表中的回放地址刷新
    pub catchup: CatchupTarget,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            job_timeout: default_job_timeout(),
            source: SourceConfig::default(),
            output: OutputConfig::default(),
            relay: RelayConfig::default(),
            logo: LogoConfig::default(),
            epg: EpgConfig::default(),
            catchup: default_catchup_target(),
        }
    }
}

impl Config {
    pub fn load_or_init(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        let config = match std::fs::read_to_string(&config_path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("解析配置文件 {} 失败", config_path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("配置文件 {} 不存在，使用默认配置...", config_path.display());
                Config::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("读取配置文件 {} 失败", config_path.display()));
            }
        };
        // 放到外面，确保新的配置项被保存
        config.save(config_dir)?;
        Ok(config)
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(config_dir)?;
        std::fs::write(config_dir.join(CONFIG_FILE), toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// 一次性列出当前任务所需配置中的全部问题
    pub fn check(&self, job: Job) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.job_timeout == 0 {
            errors.push("job_timeout 必须大于 0".to_owned());
        }
        if matches!(job, Job::Playlist | Job::Epg) {
            if self.source.interface.trim().is_empty() && self.source.bind_ip.is_none() {
                errors.push("未设置出站网卡 source.interface 或出站地址 source.bind_ip".to_owned());
            }
            if !is_http_url(&self.source.catalog_url) {
                errors.push(format!(
                    "频道列表地址 source.catalog_url 不是合法的 http(s) 地址：{:?}",
                    self.source.catalog_url
                ));
            }
            if self.source.user_agent.trim().is_empty() {
                errors.push("source.user_agent 不能为空".to_owned());
            }
            if self.source.timeout == 0 {
                errors.push("source.timeout 必须大于 0".to_owned());
            }
        }
        match job {
            Job::Playlist => {
                if self.source.tvg_id_field.trim().is_empty() {
                    errors.push("source.tvg_id_field 不能为空".to_owned());
                }
                if self.relay.enabled && !is_http_url(&self.relay.base_url) {
                    errors.push(format!(
                        "已启用组播转换，但 relay.base_url 不是合法的 http(s) 地址：{:?}",
                        self.relay.base_url
                    ));
                }
                if self.output.playlist_name.trim().is_empty() {
                    errors.push("output.playlist_name 不能为空".to_owned());
                }
                if self.logo.localize && self.logo.download_missing && self.logo.timeout == 0 {
                    errors.push("logo.timeout 必须大于 0".to_owned());
                }
            }
            Job::Epg => {
                if !is_http_url(&self.epg.backend_url) {
                    errors.push(format!(
                        "节目单接口 epg.backend_url 不是合法的 http(s) 地址：{:?}",
                        self.epg.backend_url
                    ));
                }
                if self.epg.riddle.trim().is_empty() || self.epg.time.trim().is_empty() {
                    errors.push("节目单接口凭据 epg.riddle / epg.time 不完整".to_owned());
                }
                if self.epg.timeout == 0 {
                    errors.push("epg.timeout 必须大于 0".to_owned());
                }
                if self.output.xmltv_name.trim().is_empty() {
                    errors.push("output.xmltv_name 不能为空".to_owned());
                }
            }
            Job::Catchup => {
                if self.catchup.host.trim().is_empty() || self.catchup.port == 0 {
                    errors.push("回放服务器 catchup.host / catchup.port 未设置".to_owned());
                }
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(ConfigError(errors)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn valid_config() -> Config {
        let mut config = Config::default();
        config.source.catalog_url = "http://yepg.example.com:99/pic/channel/list/channel_5.js".to_owned();
        config.source.bind_ip = Some("10.0.0.2".parse().unwrap());
        config.relay.base_url = "http://192.168.1.250:4022".to_owned();
        config.epg.backend_url = "http://cms.example.com:99/cms/searchProgramList.action".to_owned();
        config.epg.riddle = "0e5172956bf2c1d87381056eb23ebe5a".to_owned();
        config.epg.time = "1764552092957".to_owned();
        config
    }

    #[test]
    fn test_default_config_roundtrip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.job_timeout, 300);
        assert_eq!(parsed.catchup, default_catchup_target());
        assert_eq!(parsed.epg.days_forward, 7);
        assert_eq!(parsed.output.out_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [source]
            catalog_url = "http://example.com/channels.js"
            interface = "eth1"

            [epg]
            days_back = 2
            "#,
        )
        .unwrap();
        assert_eq!(parsed.source.interface, "eth1");
        assert_eq!(parsed.source.user_agent, "curl/8.0.0");
        assert_eq!(parsed.source.timeout, 10);
        assert_eq!(parsed.epg.days_back, 2);
        assert_eq!(parsed.epg.timeout, 8);
        assert!(parsed.relay.enabled);
    }

    #[test]
    fn test_check() {
        let config = valid_config();
        for job in [Job::Playlist, Job::Epg, Job::Catchup] {
            assert!(config.check(job).is_ok(), "job: {job:?}");
        }

        let err = Config::default().check(Job::Playlist).unwrap_err();
        assert_eq!(err.0.len(), 3, "{err}");

        let mut config = valid_config();
        config.relay.enabled = false;
        config.relay.base_url = String::new();
        assert!(config.check(Job::Playlist).is_ok());

        config.epg.riddle = String::new();
        config.catchup.port = 0;
        assert_eq!(config.check(Job::Epg).unwrap_err().0.len(), 1);
        assert_eq!(config.check(Job::Catchup).unwrap_err().0.len(), 1);
    }

    #[test]
    fn test_load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_init(dir.path()).unwrap();
        assert!(dir.path().join(CONFIG_FILE).exists());
        assert_eq!(config.job_timeout, 300);

        let mut config = valid_config();
        config.catchup.host = "10.0.0.1".to_owned();
        config.save(dir.path()).unwrap();
        let reloaded = Config::load_or_init(dir.path()).unwrap();
        assert_eq!(reloaded.catchup.host, "10.0.0.1");
        assert_eq!(reloaded.source.bind_ip, config.source.bind_ip);
    }
}
