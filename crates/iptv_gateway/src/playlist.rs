use std::fmt::Write;

use crate::catalog::Channel;

const CATCHUP_MODE: &str = "default";

fn escape_attr(value: &str) -> String {
    value.replace('"', "\\\"")
}

fn extinf(channel: &Channel) -> String {
    let mut line = String::from("#EXTINF:-1");
    let mut push_attr = |key: &str, value: &str| {
        if !value.is_empty() {
            // 写入 String 不会失败
            let _ = write!(line, " {key}=\"{}\"", escape_attr(value));
        }
    };
    if !channel.catchup_source.is_empty() {
        push_attr("catchup", CATCHUP_MODE);
        push_attr("catchup-source", &channel.catchup_source);
    }
    push_attr("tvg-id", &channel.tvg_id);
    push_attr("tvg-name", &channel.tvg_name);
    push_attr("tvg-logo", &channel.tvg_logo);
    push_attr("group-title", &channel.group);
    // 非标准字段，部分播放器用它排序
    push_attr("tvg-chno", &channel.channel_number);
    line.push(',');
    line.push_str(&channel.name);
    line
}

/// 生成 M3U 文本，以换行结尾；相同输入总是得到相同输出
pub fn render(channels: &[Channel], epg_url: Option<&str>) -> String {
    let mut lines = vec!["#EXTM3U".to_owned()];
    if let Some(epg_url) = epg_url.map(str::trim).filter(|u| !u.is_empty()) {
        lines.push(format!("#EXT-X-TVG url-tvg=\"{}\"", escape_attr(epg_url)));
    }
    for channel in channels {
        lines.push(extinf(channel));
        lines.push(channel.stream_url.clone());
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> Channel {
        Channel {
            name: "CCTV-1 综合".to_owned(),
            group: "央视".to_owned(),
            tvg_id: "1".to_owned(),
            tvg_name: "CCTV-1 综合".to_owned(),
            tvg_logo: "http://gw/out/logos/1.png".to_owned(),
            channel_number: "1".to_owned(),
            stream_url: "http://relay:4022/rtp/239.1.1.1:1234".to_owned(),
            catchup_source: "http://gw/catchup/p?programbegin={start}&programend={end}".to_owned(),
        }
    }

    #[test]
    fn test_render() {
        let text = render(&[channel()], Some("http://gw/out/epg.xml"));
        assert_eq!(
            text,
            "#EXTM3U\n\
             #EXT-X-TVG url-tvg=\"http://gw/out/epg.xml\"\n\
             #EXTINF:-1 catchup=\"default\" catchup-source=\"http://gw/catchup/p?programbegin={start}&programend={end}\" \
             tvg-id=\"1\" tvg-name=\"CCTV-1 综合\" tvg-logo=\"http://gw/out/logos/1.png\" group-title=\"央视\" tvg-chno=\"1\",CCTV-1 综合\n\
             http://relay:4022/rtp/239.1.1.1:1234\n"
        );
    }

    #[test]
    fn test_render_skips_empty_attributes() {
        let bare = Channel {
            name: "X".to_owned(),
            stream_url: "rtp://239.0.0.1:1".to_owned(),
            ..Default::default()
        };
        assert_eq!(
            render(&[bare], None),
            "#EXTM3U\n#EXTINF:-1,X\nrtp://239.0.0.1:1\n"
        );
        assert_eq!(render(&[], Some("  ")), "#EXTM3U\n");
    }

    #[test]
    fn test_render_escapes_quotes_and_is_deterministic() {
        let quoted = Channel {
            group: "say \"hi\"".to_owned(),
            ..channel()
        };
        let text = render(&[quoted.clone(), channel()], None);
        assert!(text.contains("group-title=\"say \\\"hi\\\"\""));
        assert_eq!(text, render(&[quoted, channel()], None));
    }
}
