use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::default::*;

/// 频道列表来源与出站连接
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub catalog_url: String,
    pub tvg_id_field: String,
    /// 出站网卡名，例如 eth1
    pub interface: String,
    /// 显式指定时优先于 interface
    pub bind_ip: Option<IpAddr>,
    pub user_agent: String,
    /// 秒
    pub timeout: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            catalog_url: String::new(),
            tvg_id_field: default_tvg_id_field(),
            interface: String::new(),
            bind_ip: None,
            user_agent: default_user_agent(),
            timeout: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OutputConfig {
    /// 相对路径相对于配置目录
    pub out_dir: PathBuf,
    pub playlist_name: String,
    pub xmltv_name: String,
    /// 播放器访问本机 Web 服务的地址，例如 http://192.168.1.250:8088
    pub web_base_url: String,
    /// out_dir 在 Web 服务上的挂载路径
    pub web_mount: String,
    /// 写入 #EXT-X-TVG 的地址，留空时由 web_base_url 推导
    pub epg_url: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            playlist_name: default_playlist_name(),
            xmltv_name: default_xmltv_name(),
            web_base_url: String::new(),
            web_mount: default_web_mount(),
            epg_url: String::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RelayConfig {
    pub enabled: bool,
    /// 例如 http://192.168.1.250:4022
    pub base_url: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: String::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LogoConfig {
    pub localize: bool,
    pub download_missing: bool,
    pub skip_existing: bool,
    /// 留空时使用 {out_dir}/logos
    pub dir: Option<PathBuf>,
    /// 毫秒
    pub delay: u64,
    /// 秒
    pub timeout: u64,
}

impl Default for LogoConfig {
    fn default() -> Self {
        Self {
            localize: true,
            download_missing: true,
            skip_existing: true,
            dir: None,
            delay: 50,
            timeout: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EpgConfig {
    pub backend_url: String,
    pub riddle: String,
    pub time: String,
    /// querystring 形式的固定参数，其中的 ip 会在运行时替换为出站地址
    pub extra_params: String,
    pub days_back: u32,
    pub days_forward: u32,
    /// 毫秒
    pub delay: u64,
    /// 秒
    pub timeout: u64,
    /// 0 表示不限制
    pub max_channels: usize,
}

impl Default for EpgConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            riddle: String::new(),
            time: String::new(),
            extra_params: String::new(),
            days_back: 0,
            days_forward: 7,
            delay: 50,
            timeout: 8,
            max_channels: 0,
        }
    }
}
