use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use percent_encoding::percent_decode_str;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::Client;
use crate::utils::convert::value_to_string;

/// 上游用来表示“全集合”的分类名
pub const ALL_CATEGORY: &str = "全部";
/// 分类名可能出现的字段，按优先级排列
const CATEGORY_NAME_KEYS: [&str; 3] = ["category_name", "categoryName", "name"];
const CHANNEL_LIST_KEY: &str = "channelList";

pub const PRIMARY_ID_FIELD: &str = "primaryid";
const NAME_FIELD: &str = "name";
const CATEGORY_FIELD: &str = "category_name";
const LOGO_FIELD: &str = "fileurl";
const TITLE_LOGO_FIELD: &str = "titleurl";
const CHANNEL_NUMBER_FIELD: &str = "channelnumber";
const LIVE_FIELD: &str = "multi_ZX";
const TIMESHIFT_FIELD: &str = "zx";

const UNKNOWN_CHANNEL_NAME: &str = "未知频道";

/// 生成播放列表所需的频道信息，构造后不再修改，变换总是产出新值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub group: String,
    pub tvg_id: String,
    pub tvg_name: String,
    pub tvg_logo: String,
    pub channel_number: String,
    pub stream_url: String,
    /// 回放地址模板，带有字面量 `{start}` / `{end}` 占位符；为空表示不支持回放
    pub catchup_source: String,
}

impl Channel {
    pub fn with_stream_url(self, stream_url: String) -> Self {
        Self { stream_url, ..self }
    }

    pub fn with_logo(self, tvg_logo: String) -> Self {
        Self { tvg_logo, ..self }
    }
}

/// 频道列表 JSON 中的一条原始频道记录
#[derive(Debug, Clone, Default)]
pub struct RawChannel(Map<String, Value>);

impl RawChannel {
    pub fn field(&self, key: &str) -> String {
        self.0.get(key).map(value_to_string).unwrap_or_default()
    }

    pub fn primary_id(&self) -> String {
        self.field(PRIMARY_ID_FIELD)
    }

    pub fn live_locator(&self) -> String {
        self.field(LIVE_FIELD)
    }

    /// 去重键：优先使用稳定的 primaryid，否则退化为 `name|组播地址`
    pub fn dedup_key(&self) -> String {
        let primary_id = self.primary_id();
        if !primary_id.is_empty() {
            return primary_id;
        }
        format!("{}|{}", self.field(NAME_FIELD), self.live_locator())
    }
}

impl From<Map<String, Value>> for RawChannel {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Category {
    pub name: String,
    pub channels: Vec<RawChannel>,
}

impl Category {
    /// 把一个分类对象规整为 Category，非对象返回 None；分类名的多种写法只在这里处理
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let name = CATEGORY_NAME_KEYS
            .iter()
            .filter_map(|key| object.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|name| !name.is_empty())
            .unwrap_or_default()
            .to_owned();
        let channels = object
            .get(CHANNEL_LIST_KEY)
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|ch| ch.as_object().cloned().map(RawChannel::from))
                    .collect()
            })
            .unwrap_or_default();
        Some(Self { name, channels })
    }

    pub fn is_all(&self) -> bool {
        self.name == ALL_CATEGORY
    }
}

/// 频道列表根节点必须是分类数组
pub fn categories_from_value(value: &Value) -> Result<Vec<Category>> {
    let Some(list) = value.as_array() else {
        bail!("频道列表 JSON 格式错误：根节点应为数组");
    };
    Ok(list.iter().filter_map(Category::from_value).collect())
}

pub async fn fetch_catalog(client: &Client, url: &str) -> Result<Vec<Category>> {
    let value = client.get_json(url).await?;
    categories_from_value(&value)
}

/// 回放服务器地址，整个频道列表共用一个
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchupTarget {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub virtual_domain: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCatalog {
    pub channels: Vec<Channel>,
    pub catchup_host: Option<String>,
    pub catchup_port: Option<u16>,
    pub virtual_domain: Option<String>,
}

impl ParsedCatalog {
    pub fn catchup_target(&self) -> Option<CatchupTarget> {
        match (&self.catchup_host, self.catchup_port) {
            (Some(host), Some(port)) => Some(CatchupTarget {
                host: host.clone(),
                port,
                virtual_domain: self.virtual_domain.clone().unwrap_or_default(),
            }),
            _ => None,
        }
    }
}

/// 建立 “去重键 -> 分类名” 的反查表：“全部”里的频道通常不带分类名，需要从其它分类找回
fn group_index(categories: &[Category]) -> HashMap<String, String> {
    let mut index = HashMap::new();
    for category in categories.iter().filter(|c| !c.name.is_empty() && !c.is_all()) {
        for channel in &category.channels {
            index
                .entry(channel.dedup_key())
                .or_insert_with(|| category.name.clone());
        }
    }
    index
}

/// 若存在“全部”分类则只遍历它，否则按输入顺序合并所有分类
fn enumeration_source(categories: &[Category]) -> Vec<(&str, &RawChannel)> {
    if let Some(all) = categories.iter().find(|c| c.is_all()) {
        return all.channels.iter().map(|ch| (all.name.as_str(), ch)).collect();
    }
    categories
        .iter()
        .flat_map(|c| c.channels.iter().map(move |ch| (c.name.as_str(), ch)))
        .collect()
}

struct TimeshiftLocator {
    path: String,
    host: Option<String>,
    port: Option<u16>,
    virtual_domain: Option<String>,
}

/// Url 会抹掉与协议默认值相同的端口，需要回到原始文本判断是否显式写了端口
fn has_explicit_port(locator: &str) -> bool {
    let rest = locator.split_once("://").map_or(locator, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    // IPv6 地址本身带冒号，只看 `]` 之后的部分
    let after_host = host_port.rsplit(']').next().unwrap_or_default();
    after_host
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}

fn parse_timeshift(locator: &str) -> Result<TimeshiftLocator> {
    let url = Url::parse(locator)?;
    let port = url
        .port()
        .or_else(|| url.port_or_known_default().filter(|_| has_explicit_port(locator)));
    Ok(TimeshiftLocator {
        path: percent_decode_str(url.path().trim_start_matches('/'))
            .decode_utf8_lossy()
            .into_owned(),
        host: url.host_str().filter(|h| !h.is_empty()).map(str::to_owned),
        port,
        virtual_domain: url
            .query_pairs()
            .find(|(k, _)| k == "virtualDomain")
            .map(|(_, v)| v.into_owned()),
    })
}

pub fn parse(categories: &[Category], id_field: &str, web_base_url: &str) -> ParsedCatalog {
    let index = group_index(categories);
    let web_base_url = web_base_url.trim().trim_end_matches('/');
    let mut parsed = ParsedCatalog::default();
    let mut seen = HashSet::new();

    for (source_group, raw) in enumeration_source(categories) {
        let stream_url = raw.live_locator();
        if stream_url.is_empty() {
            continue;
        }
        let name = Some(raw.field(NAME_FIELD))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_CHANNEL_NAME.to_owned());
        let mut tvg_id = raw.field(id_field);
        if tvg_id.is_empty() {
            tvg_id = raw.primary_id();
        }
        let dedup_key = raw.dedup_key();
        let group = Some(raw.field(CATEGORY_FIELD))
            .filter(|g| !g.is_empty())
            .or_else(|| index.get(&dedup_key).cloned())
            .unwrap_or_else(|| source_group.to_owned());

        let mut catchup_source = String::new();
        let timeshift = raw.field(TIMESHIFT_FIELD);
        if !timeshift.is_empty() {
            match parse_timeshift(&timeshift) {
                Ok(locator) => {
                    if parsed.catchup_host.is_none() {
                        if let (Some(host), Some(port)) = (locator.host, locator.port) {
                            parsed.catchup_host = Some(host);
                            parsed.catchup_port = Some(port);
                            parsed.virtual_domain = locator.virtual_domain;
                        }
                    }
                    if !locator.path.is_empty() && !web_base_url.is_empty() {
                        catchup_source = format!(
                            "{web_base_url}/catchup/{}?programbegin={{start}}&programend={{end}}",
                            locator.path
                        );
                    }
                }
                Err(e) => warn!("频道「{name}」的回放地址 {timeshift:?} 无法解析：{e}，忽略该频道的回放"),
            }
        }

        if !seen.insert(dedup_key) {
            continue;
        }
        parsed.channels.push(Channel {
            tvg_name: name.clone(),
            name,
            group,
            tvg_id,
            tvg_logo: raw.field(LOGO_FIELD),
            channel_number: raw.field(CHANNEL_NUMBER_FIELD),
            stream_url,
            catchup_source,
        });
    }
    parsed
}

/// 生成 EPG 使用的频道：遍历所有分类，按 primaryid 去重
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpgChannel {
    pub id: String,
    pub name: String,
    pub icon: String,
}

pub fn epg_channels(categories: &[Category]) -> Vec<EpgChannel> {
    let mut seen = HashSet::new();
    let mut channels = Vec::new();
    for raw in categories.iter().flat_map(|c| c.channels.iter()) {
        let id = raw.primary_id();
        if id.is_empty() || !seen.insert(id.clone()) {
            continue;
        }
        let name = Some(raw.field(NAME_FIELD))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| id.clone());
        let icon = Some(raw.field(LOGO_FIELD))
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| raw.field(TITLE_LOGO_FIELD));
        channels.push(EpgChannel { id, name, icon });
    }
    channels
}
