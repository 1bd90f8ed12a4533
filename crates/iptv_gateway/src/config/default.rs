use std::path::PathBuf;

use crate::catalog::{CatchupTarget, PRIMARY_ID_FIELD};

pub(super) fn default_user_agent() -> String {
    "curl/8.0.0".to_owned()
}

pub(super) fn default_tvg_id_field() -> String {
    PRIMARY_ID_FIELD.to_owned()
}

pub(super) fn default_out_dir() -> PathBuf {
    PathBuf::from("out")
}

pub(super) fn default_playlist_name() -> String {
    "iptv.m3u".to_owned()
}

pub(super) fn default_xmltv_name() -> String {
    "epg.xml".to_owned()
}

pub(super) fn default_web_mount() -> String {
    "out".to_owned()
}

pub(super) fn default_job_timeout() -> u64 {
    300
}

/// 大多数 ZTE 回放平台的默认地址，运行一次 playlist 后会被频道列表中的实际地址覆盖
pub(super) fn default_catchup_target() -> CatchupTarget {
    CatchupTarget {
        host: "10.255.129.26".to_owned(),
        port: 6060,
        virtual_domain: "hls.tvod_hls.zte.com".to_owned(),
    }
}
