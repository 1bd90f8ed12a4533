use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "iptv-gateway", version, about, long_about = None)]
pub struct Args {
    #[arg(short, long, default_value = "None,iptv_gateway=info", env = "RUST_LOG")]
    pub log_level: String,

    /// 以 JSON 行的形式额外写入日志文件
    #[arg(long, env = "IPTV_GATEWAY_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[arg(short, long, env = "IPTV_GATEWAY_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 拉取频道列表并生成 M3U 播放列表
    Playlist,
    /// 拉取节目单并生成 XMLTV
    Epg,
    /// 把播放器的回放请求转换为回放服务器地址
    CatchupUrl {
        /// 回放路径，例如 ZTE_EPG16/2/9201
        path: String,
        /// 请求的查询字符串，例如 "programbegin=...&programend=..."
        query: String,
    },
    /// 识别时间字符串的格式并输出规范化结果
    DetectTime { value: String },
}
