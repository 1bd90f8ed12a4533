use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;

use super::EpgDocument;
use crate::timefmt::{date_from_digits, local_offset};

/// 以 UTC+8 的“今天”为中心的闭区间日期窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayWindow {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DayWindow {
    pub fn around(now: DateTime<Utc>, days_back: u32, days_forward: u32) -> Self {
        let today = now.with_timezone(&local_offset()).date_naive();
        Self {
            first: today
                .checked_sub_days(Days::new(days_back.into()))
                .unwrap_or(NaiveDate::MIN),
            last: today
                .checked_add_days(Days::new(days_forward.into()))
                .unwrap_or(NaiveDate::MAX),
        }
    }

    /// 日期键必须是严格的 YYYYMMDD，否则视为不在窗口内
    pub fn contains_key(&self, date_key: &str) -> bool {
        date_from_digits(date_key.trim()).is_some_and(|date| (self.first..=self.last).contains(&date))
    }
}

/// 原地丢弃窗口外的日期；过滤后没有任何日期的频道一并移除
pub fn filter_by_days(doc: &mut EpgDocument, days_back: u32, days_forward: u32, now: DateTime<Utc>) -> DayWindow {
    let window = DayWindow::around(now, days_back, days_forward);
    doc.retain(|_, grid| {
        grid.retain(|date_key, _| window.contains_key(date_key));
        !grid.is_empty()
    });
    window
}
