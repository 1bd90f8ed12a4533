use std::time::Duration;

use serde::Serialize;

use super::{EpgDocument, day_grid_from_value};
use crate::catalog::EpgChannel;
use crate::client::{Client, Throttle};
use crate::error::FetchError;

const PROGRESS_EVERY: usize = 50;
const RESERVED_KEYS: [&str; 3] = ["channelId", "riddle", "time"];

/// 节目单接口参数，riddle 与 time 原样透传
#[derive(Debug, Clone)]
pub struct EpgBackend {
    pub url: String,
    pub riddle: String,
    pub time: String,
    pub extra_params: Vec<(String, String)>,
    pub delay: Duration,
    /// 0 表示不限制
    pub max_channels: usize,
}

impl EpgBackend {
    fn form(&self, channel_id: &str) -> Vec<(String, String)> {
        let mut form = self
            .extra_params
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        form.push(("channelId".to_owned(), channel_id.to_owned()));
        form.push(("riddle".to_owned(), self.riddle.clone()));
        form.push(("time".to_owned(), self.time.clone()));
        form
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub ok: usize,
    pub failed: usize,
}

async fn fetch_one(client: &Client, backend: &EpgBackend, channel_id: &str) -> Result<super::DayGrid, FetchError> {
    let value = client.post_form_json(&backend.url, &backend.form(channel_id)).await?;
    day_grid_from_value(&value).ok_or_else(|| FetchError::Malformed {
        url: backend.url.clone(),
        reason: "expected a JSON object keyed by date".to_owned(),
    })
}

/// 逐个频道串行拉取节目单，单个频道失败只计数不中断
pub async fn fetch_all(client: &Client, channels: &[EpgChannel], backend: &EpgBackend) -> (EpgDocument, FetchStats) {
    let limit = match backend.max_channels {
        0 => channels.len(),
        n => n.min(channels.len()),
    };
    let throttle = Throttle::new(backend.delay);
    let mut doc = EpgDocument::new();
    let mut stats = FetchStats::default();
    for (idx, channel) in channels[..limit].iter().enumerate() {
        throttle.wait().await;
        match fetch_one(client, backend, &channel.id).await {
            Ok(grid) => {
                stats.ok += 1;
                doc.insert(channel.id.clone(), grid);
            }
            Err(e) => {
                let hint = if e.is_transient() { "，下次运行时重试" } else { "" };
                warn!("获取频道「{}」({}) 的节目单失败：{e}{hint}", channel.name, channel.id);
                stats.failed += 1;
            }
        }
        if (idx + 1) % PROGRESS_EVERY == 0 {
            info!("节目单进度：{}/{limit}，成功 {}，失败 {}", idx + 1, stats.ok, stats.failed);
        }
    }
    (doc, stats)
}
