use crate::catalog::Channel;

const RELAY_SCHEMES: [(&str, &str); 2] = [("rtp://", "rtp"), ("udp://", "udp")];

/// 把 rtp:// / udp:// 组播地址改写为中继服务的 HTTP 地址，其它地址原样返回
pub fn rewrite(locator: &str, relay_base: &str) -> String {
    let locator = locator.trim();
    let base = relay_base.trim().trim_end_matches('/');
    if locator.is_empty() || base.is_empty() {
        return locator.to_owned();
    }
    for (scheme, segment) in RELAY_SCHEMES {
        if let Some(rest) = locator.strip_prefix(scheme) {
            let addr = rest.split('?').next().unwrap_or_default();
            return format!("{base}/{segment}/{addr}");
        }
    }
    locator.to_owned()
}

pub fn rewrite_all(channels: Vec<Channel>, relay_base: &str) -> Vec<Channel> {
    channels
        .into_iter()
        .map(|ch| {
            let stream_url = rewrite(&ch.stream_url, relay_base);
            ch.with_stream_url(stream_url)
        })
        .collect()
}
