use std::net::{IpAddr, Ipv4Addr};

use sysinfo::Networks;

/// 读取网卡上的第一个 IPv4 地址，用于把出站请求绑定到指定上行链路
pub fn ipv4_of_interface(iface: &str) -> Option<Ipv4Addr> {
    let iface = iface.trim();
    if iface.is_empty() {
        return None;
    }
    let networks = Networks::new_with_refreshed_list();
    networks
        .iter()
        .find(|(name, _)| name.as_str() == iface)
        .and_then(|(_, data)| {
            data.ip_networks().iter().find_map(|network| match network.addr {
                IpAddr::V4(addr) => Some(addr),
                IpAddr::V6(_) => None,
            })
        })
}

/// 判断是否为可直接拉取的 http(s) 地址
pub fn is_http_url(s: &str) -> bool {
    let s = s.trim().to_ascii_lowercase();
    (s.starts_with("http://") && s.len() > "http://".len())
        || (s.starts_with("https://") && s.len() > "https://".len())
}
