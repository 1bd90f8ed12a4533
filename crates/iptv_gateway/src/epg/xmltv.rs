use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use quick_xml::Error;
use quick_xml::events::BytesText;
use quick_xml::writer::Writer;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::{EpgDocument, Programme};
use crate::catalog::EpgChannel;

const GENERATOR_NAME: &str = "iptv-gateway";
const TITLE_LANG: &str = "zh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmltvChannel {
    pub id: String,
    pub display_name: String,
    /// 为空时不输出 icon 元素
    pub icon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmltvDocument {
    pub channels: Vec<XmltvChannel>,
    pub programmes: Vec<Programme>,
}

fn xmltv_time(dt: &DateTime<FixedOffset>) -> String {
    dt.format("%Y%m%d%H%M%S %z").to_string()
}

/// 频道按输入顺序输出；节目按频道顺序、日期键顺序输出，无法解析的节目直接跳过
pub fn build_xmltv(channels: &[EpgChannel], doc: &EpgDocument) -> XmltvDocument {
    let xmltv_channels = channels
        .iter()
        .map(|ch| XmltvChannel {
            id: ch.id.clone(),
            display_name: if ch.name.is_empty() { ch.id.clone() } else { ch.name.clone() },
            icon: ch.icon.trim().to_owned(),
        })
        .collect();
    let programmes = channels
        .iter()
        .filter_map(|ch| doc.get(&ch.id).map(|grid| (ch, grid)))
        .flat_map(|(ch, grid)| {
            grid.iter().flat_map(move |(date_key, items)| {
                items
                    .iter()
                    .filter_map(move |item| item.to_programme(&ch.id, date_key))
            })
        })
        .collect();
    XmltvDocument {
        channels: xmltv_channels,
        programmes,
    }
}

impl XmltvDocument {
    pub async fn render(&self) -> Result<String> {
        let mut buffer = r#"<?xml version="1.0" encoding="UTF-8"?>
"#
        .as_bytes()
        .to_vec();
        let mut tokio_buffer = BufWriter::new(&mut buffer);
        let mut writer = Writer::new_with_indent(&mut tokio_buffer, b' ', 2);
        writer
            .create_element("tv")
            .with_attribute(("generator-info-name", GENERATOR_NAME))
            .write_inner_content_async::<_, _, Error>(|writer| async move {
                for channel in &self.channels {
                    writer
                        .create_element("channel")
                        .with_attribute(("id", channel.id.as_str()))
                        .write_inner_content_async::<_, _, Error>(|writer| async move {
                            writer
                                .create_element("display-name")
                                .write_text_content_async(BytesText::new(&channel.display_name))
                                .await?;
                            if !channel.icon.is_empty() {
                                writer
                                    .create_element("icon")
                                    .with_attribute(("src", channel.icon.as_str()))
                                    .write_empty_async()
                                    .await?;
                            }
                            Ok(writer)
                        })
                        .await?;
                }
                for programme in &self.programmes {
                    let start = xmltv_time(&programme.start);
                    let stop = programme.stop.as_ref().map(xmltv_time);
                    let mut element = writer
                        .create_element("programme")
                        .with_attribute(("channel", programme.channel_id.as_str()))
                        .with_attribute(("start", start.as_str()));
                    if let Some(stop) = &stop {
                        element = element.with_attribute(("stop", stop.as_str()));
                    }
                    element
                        .write_inner_content_async::<_, _, Error>(|writer| async move {
                            writer
                                .create_element("title")
                                .with_attribute(("lang", TITLE_LANG))
                                .write_text_content_async(BytesText::new(&programme.title))
                                .await?;
                            Ok(writer)
                        })
                        .await?;
                }
                Ok(writer)
            })
            .await?;
        tokio_buffer.write_all(b"\n").await?;
        tokio_buffer.flush().await?;
        Ok(String::from_utf8(buffer)?)
    }
}
