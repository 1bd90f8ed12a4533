use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use strum::Display;

use crate::error::TimeFormatError;

/// 上游（节目单、回放服务器）默认使用的时区：UTC+8
pub const LOCAL_OFFSET_SECS: i32 = 8 * 3600;

pub fn local_offset() -> FixedOffset {
    FixedOffset::east_opt(LOCAL_OFFSET_SECS).expect("UTC+8 is a valid offset")
}

/// 播放器回放请求中可能出现的时间编码，声明顺序即检测顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TimeFormat {
    /// 10 位 Unix 秒
    UnixSeconds,
    /// 13 位 Unix 毫秒
    UnixMillis,
    /// YYYY-MM-DDTHH:MM:SS，可带 Z / +HHMM / +HH:MM
    Iso8601,
    /// YYYYMMDDHHMMSS，按 UTC+8 解释
    Civil,
    /// YYYYMMDDHHMMSS 后接 +/- 与 2~4 位时区
    CivilWithOffset,
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

pub fn detect(raw: &str) -> Option<TimeFormat> {
    let s = raw.trim();
    if is_digits(s) && s.len() == 10 {
        return Some(TimeFormat::UnixSeconds);
    }
    if is_digits(s) && s.len() == 13 {
        return Some(TimeFormat::UnixMillis);
    }
    if s.contains('T') || s.ends_with('Z') {
        return Some(TimeFormat::Iso8601);
    }
    if is_digits(s) && s.len() == 14 && civil_from_digits(s).is_some() {
        return Some(TimeFormat::Civil);
    }
    if split_civil_offset(s).is_some() {
        return Some(TimeFormat::CivilWithOffset);
    }
    None
}

/// 转换为回放服务器要求的 `YYYYMMDDHHMMSS+00`（UTC）
pub fn normalize(raw: &str, kind: Option<TimeFormat>) -> Result<String, TimeFormatError> {
    let s = raw.trim();
    let kind = kind.or_else(|| detect(s)).ok_or_else(|| TimeFormatError::Unrecognized { raw: s.to_owned() })?;
    let utc = to_utc(s, kind)?;
    Ok(utc.format("%Y%m%d%H%M%S+00").to_string())
}

pub fn to_utc(s: &str, kind: TimeFormat) -> Result<DateTime<Utc>, TimeFormatError> {
    let malformed = |reason: &'static str| TimeFormatError::Malformed {
        raw: s.to_owned(),
        kind,
        reason,
    };
    match kind {
        TimeFormat::UnixSeconds => {
            let secs = s.parse::<i64>().map_err(|_| malformed("not an integer"))?;
            DateTime::from_timestamp(secs, 0).ok_or_else(|| malformed("timestamp out of range"))
        }
        TimeFormat::UnixMillis => {
            let millis = s.parse::<i64>().map_err(|_| malformed("not an integer"))?;
            DateTime::from_timestamp_millis(millis).ok_or_else(|| malformed("timestamp out of range"))
        }
        TimeFormat::Iso8601 => parse_iso8601(s).ok_or_else(|| malformed("invalid ISO-8601 date/time or offset")),
        TimeFormat::Civil => {
            if !(is_digits(s) && s.len() == 14) {
                return Err(malformed("expected 14 digits"));
            }
            let naive = civil_from_digits(s).ok_or_else(|| malformed("invalid calendar date/time"))?;
            local_offset()
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| malformed("ambiguous local time"))
        }
        TimeFormat::CivilWithOffset => {
            let (civil, offset) = split_civil_offset(s).ok_or_else(|| malformed("expected 14 digits and an offset"))?;
            let naive = civil_from_digits(civil).ok_or_else(|| malformed("invalid calendar date/time"))?;
            let offset = parse_offset(offset).ok_or_else(|| malformed("offset must be ±HH or ±HHMM"))?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| malformed("ambiguous local time"))
        }
    }
}

/// 解析 `YYYYMMDDHHMMSS`，任一分量越界返回 None
pub(crate) fn civil_from_digits(s: &str) -> Option<NaiveDateTime> {
    if !(is_digits(s) && s.len() == 14) {
        return None;
    }
    let num = |range: std::ops::Range<usize>| s[range].parse::<u32>().ok();
    let date = date_from_digits(&s[..8])?;
    date.and_hms_opt(num(8..10)?, num(10..12)?, num(12..14)?)
}

/// 解析 `YYYYMMDD`
pub(crate) fn date_from_digits(s: &str) -> Option<NaiveDate> {
    if !(is_digits(s) && s.len() == 8) {
        return None;
    }
    let year = s[0..4].parse::<i32>().ok()?;
    let month = s[4..6].parse::<u32>().ok()?;
    let day = s[6..8].parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn split_civil_offset(s: &str) -> Option<(&str, &str)> {
    if s.len() < 17 || !s.is_char_boundary(14) {
        return None;
    }
    let (civil, offset) = s.split_at(14);
    let digits = offset.strip_prefix(['+', '-'])?;
    (is_digits(civil) && is_digits(digits) && (2..=4).contains(&digits.len())).then_some((civil, offset))
}

/// `+HH`、`+HHMM`、`+HH:MM`，负号同理
fn parse_offset(offset: &str) -> Option<FixedOffset> {
    let sign = match offset.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits = offset[1..].replace(':', "");
    if !is_digits(&digits) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    const LAYOUT: &str = "%Y-%m-%dT%H:%M:%S";
    if let Some(body) = s.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(body, LAYOUT).ok().map(|naive| naive.and_utc());
    }
    let time_start = s.find('T')?;
    match s[time_start..].rfind(['+', '-']) {
        Some(pos) => {
            let (body, offset) = s.split_at(time_start + pos);
            let naive = NaiveDateTime::parse_from_str(body, LAYOUT).ok()?;
            let offset = parse_offset(offset)?;
            offset.from_local_datetime(&naive).single().map(|dt| dt.with_timezone(&Utc))
        }
        // 没有时区信息时按 UTC 处理
        None => NaiveDateTime::parse_from_str(s, LAYOUT).ok().map(|naive| naive.and_utc()),
    }
}
