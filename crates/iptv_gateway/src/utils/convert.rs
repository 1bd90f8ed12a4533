use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// 上游 JSON 的同一字段有时是字符串、有时是数字，这里统一转成去掉首尾空白的字符串
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// 用于 `#[serde(deserialize_with)]`，缺失、null 或其它类型都视为空字符串
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .map(value_to_string)
        .unwrap_or_default())
}
