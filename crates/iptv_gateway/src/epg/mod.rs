mod fetch;
mod filter;
mod xmltv;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone};
use serde::Deserialize;
use serde_json::Value;

pub use self::fetch::{EpgBackend, FetchStats, fetch_all};
pub use self::filter::{DayWindow, filter_by_days};
pub use self::xmltv::{XmltvChannel, XmltvDocument, build_xmltv};
use crate::timefmt::{date_from_digits, local_offset};
use crate::utils::convert::lenient_string;

/// 节目单接口返回的单条节目，字段缺失或类型不符时均视为空
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub program_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_time: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub duration: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub end_time: String,
}

/// 单个频道的节目表：YYYYMMDD -> 节目列表
pub type DayGrid = BTreeMap<String, Vec<ProgramItem>>;
/// 频道 id -> 节目表
pub type EpgDocument = HashMap<String, DayGrid>;

/// 解析后的节目，时间均为 UTC+8
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Programme {
    pub channel_id: String,
    pub title: String,
    pub start: DateTime<FixedOffset>,
    pub stop: Option<DateTime<FixedOffset>>,
}

/// 把接口返回的 JSON 对象转换为节目表；非数组的日期与非对象的节目被忽略
pub fn day_grid_from_value(value: &Value) -> Option<DayGrid> {
    let object = value.as_object()?;
    Some(
        object
            .iter()
            .filter_map(|(date_key, items)| {
                let items = items
                    .as_array()?
                    .iter()
                    .filter(|item| item.is_object())
                    .filter_map(|item| ProgramItem::deserialize(item).ok())
                    .collect();
                Some((date_key.trim().to_owned(), items))
            })
            .collect(),
    )
}

/// 解析 `HH:MM` 或 `HH:MM:SS`
fn parse_clock(s: &str) -> Option<NaiveTime> {
    let parts = s
        .trim()
        .split(':')
        .map(|p| p.trim().parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [h, m] => NaiveTime::from_hms_opt(*h, *m, 0),
        [h, m, s] => NaiveTime::from_hms_opt(*h, *m, *s),
        _ => None,
    }
}

/// 解析 6 位 `HHMMSS` 时长，时长为 0 视为缺失
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let num = |range: std::ops::Range<usize>| s[range].parse::<i64>().ok();
    let secs = num(0..2)? * 3600 + num(2..4)? * 60 + num(4..6)?;
    (secs > 0).then(|| Duration::seconds(secs))
}

impl ProgramItem {
    pub fn start(&self, date_key: &str) -> Option<DateTime<FixedOffset>> {
        let date = Some(self.start_date.as_str())
            .filter(|d| !d.is_empty())
            .unwrap_or(date_key);
        let naive = date_from_digits(date.trim())?.and_time(parse_clock(&self.start_time)?);
        local_offset().from_local_datetime(&naive).single()
    }

    /// 优先使用 duration，其次 endTime（不晚于开始时间时顺延一天）
    pub fn stop(&self, start: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        if let Some(duration) = parse_duration(&self.duration) {
            return Some(start + duration);
        }
        let end_time = parse_clock(&self.end_time)?;
        let naive = start.date_naive().and_time(end_time);
        let mut stop = local_offset().from_local_datetime(&naive).single()?;
        if stop <= start {
            stop += Duration::days(1);
        }
        Some(stop)
    }

    /// 节目名为空或开始时间无法解析时返回 None
    pub fn to_programme(&self, channel_id: &str, date_key: &str) -> Option<Programme> {
        let title = self.program_name.trim();
        if title.is_empty() {
            return None;
        }
        let start = self.start(date_key)?;
        Some(Programme {
            channel_id: channel_id.to_owned(),
            title: title.to_owned(),
            start,
            stop: self.stop(start).filter(|stop| *stop > start),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn item(start_time: &str, duration: &str, end_time: &str) -> ProgramItem {
        ProgramItem {
            program_name: "新闻联播".to_owned(),
            start_date: "20240101".to_owned(),
            start_time: start_time.to_owned(),
            duration: duration.to_owned(),
            end_time: end_time.to_owned(),
        }
    }

    fn ts(dt: Option<DateTime<FixedOffset>>) -> Option<String> {
        dt.map(|dt| dt.format("%Y%m%d%H%M%S %z").to_string())
    }

    #[test]
    fn test_day_grid_from_value() {
        let grid = day_grid_from_value(&json!({
            "20240101": [
                {"programName": "A", "startDate": 20240101, "startTime": "19:00", "duration": "003000"},
                "garbage",
                {"programName": null}
            ],
            "20240102": "not a list"
        }))
        .unwrap();
        assert_eq!(grid.len(), 1);
        assert_eq!(grid["20240101"].len(), 2);
        assert_eq!(grid["20240101"][0].start_date, "20240101");
        assert_eq!(grid["20240101"][1], ProgramItem::default());
        assert!(day_grid_from_value(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_stop_time() {
        let testcases = [
            // 时长优先
            (item("19:00", "003000", "23:00"), Some("20240101193000 +0800")),
            // 时长非法时使用结束时间
            (item("19:00", "30", "19:30:15"), Some("20240101193015 +0800")),
            // 结束时间不晚于开始时间，顺延一天
            (item("23:30", "", "00:15"), Some("20240102001500 +0800")),
            (item("23:30", "", "23:30"), Some("20240102233000 +0800")),
            // 时长为 0 视为缺失
            (item("19:00", "000000", ""), None),
            (item("19:00", "", "25:00"), None),
        ];
        for (item, expected) in testcases {
            let start = item.start("").unwrap();
            assert_eq!(ts(item.stop(start)).as_deref(), expected, "item: {item:?}");
        }
    }

    #[test]
    fn test_to_programme() {
        let programme = item("19:00:00", "003000", "").to_programme("101", "20991231").unwrap();
        assert_eq!(programme.channel_id, "101");
        assert_eq!(programme.title, "新闻联播");
        assert_eq!(ts(Some(programme.start)).unwrap(), "20240101190000 +0800");

        // startDate 缺失时使用日期键
        let fallback = ProgramItem {
            start_date: String::new(),
            ..item("08:00", "", "")
        };
        let programme = fallback.to_programme("101", "20240305").unwrap();
        assert_eq!(ts(Some(programme.start)).unwrap(), "20240305080000 +0800");
        assert_eq!(programme.stop, None);

        assert!(item("8点", "", "").to_programme("101", "20240101").is_none());
        assert!(
            ProgramItem {
                program_name: "  ".to_owned(),
                ..item("08:00", "", "")
            }
            .to_programme("101", "20240101")
            .is_none()
        );
    }
}
