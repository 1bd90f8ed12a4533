use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::catalog::CatchupTarget;
use crate::error::CatchupError;
use crate::timefmt;

/// 除 RFC 3986 非保留字符外全部编码
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

const BEGIN_KEY: &str = "programbegin";
const END_KEY: &str = "programend";
const VIRTUAL_DOMAIN_KEY: &str = "virtualDomain";
const BEGIN_ALIAS: &str = "start";
const END_ALIAS: &str = "end";

fn encode(s: &str) -> String {
    utf8_percent_encode(s, QUERY_VALUE).to_string()
}

fn normalize_bound(field: &'static str, raw: &str) -> Result<String, CatchupError> {
    let normalized = timefmt::normalize(raw, None).map_err(|source| CatchupError::InvalidTime {
        field,
        raw: raw.to_owned(),
        source,
    })?;
    // 回放服务器只认 %2B，不能对整个值做标准编码
    Ok(normalized.replace('+', "%2B"))
}

/// 拼出发往回放服务器的最终地址
pub fn build(
    path: &str,
    begin: &str,
    end: &str,
    target: &CatchupTarget,
    extra_params: &[(String, String)],
) -> Result<String, CatchupError> {
    // virtualDomain 即使为空也要带上，回放服务器按键名取值
    let mut query = vec![
        format!("{BEGIN_KEY}={}", normalize_bound(BEGIN_KEY, begin)?),
        format!("{END_KEY}={}", normalize_bound(END_KEY, end)?),
        format!("{VIRTUAL_DOMAIN_KEY}={}", encode(&target.virtual_domain)),
    ];
    query.extend(
        extra_params
            .iter()
            .filter(|(key, _)| ![BEGIN_KEY, END_KEY, VIRTUAL_DOMAIN_KEY].contains(&key.as_str()))
            .map(|(key, value)| format!("{}={}", encode(key), encode(value))),
    );
    Ok(format!(
        "http://{}:{}/{}?{}",
        target.host,
        target.port,
        path.trim_start_matches('/'),
        query.join("&")
    ))
}

/// 播放器发来的一次回放请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchupRequest {
    pub path: String,
    pub begin: String,
    pub end: String,
    pub extra_params: Vec<(String, String)>,
}

impl CatchupRequest {
    /// `query` 不含开头的 `?`；`+` 保持原样，不会被当作空格
    pub fn from_query(path: &str, query: &str) -> Result<Self, CatchupError> {
        let pairs = query
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (
                    percent_decode_str(key).decode_utf8_lossy().into_owned(),
                    percent_decode_str(value).decode_utf8_lossy().trim().to_owned(),
                )
            })
            .collect::<Vec<_>>();
        let lookup = |keys: [&str; 2]| {
            keys.iter()
                .find_map(|key| pairs.iter().find(|(k, v)| k == key && !v.is_empty()))
                .map(|(_, v)| v.clone())
        };
        let begin = lookup([BEGIN_KEY, BEGIN_ALIAS]).ok_or(CatchupError::MissingTime(BEGIN_KEY))?;
        let end = lookup([END_KEY, END_ALIAS]).ok_or(CatchupError::MissingTime(END_KEY))?;
        if begin == "{start}" {
            return Err(CatchupError::Placeholder {
                field: BEGIN_KEY,
                raw: begin,
            });
        }
        if end == "{end}" {
            return Err(CatchupError::Placeholder { field: END_KEY, raw: end });
        }
        let extra_params = pairs
            .into_iter()
            .filter(|(k, _)| ![BEGIN_KEY, END_KEY, BEGIN_ALIAS, END_ALIAS].contains(&k.as_str()))
            .collect();
        Ok(Self {
            path: path.trim_start_matches('/').to_owned(),
            begin,
            end,
            extra_params,
        })
    }

    pub fn target_url(&self, target: &CatchupTarget) -> Result<String, CatchupError> {
        build(&self.path, &self.begin, &self.end, target, &self.extra_params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimeFormatError;

    fn target(virtual_domain: &str) -> CatchupTarget {
        CatchupTarget {
            host: "h".to_owned(),
            port: 80,
            virtual_domain: virtual_domain.to_owned(),
        }
    }

    #[test]
    fn test_build() {
        assert_eq!(
            build("p", "1700000000", "1700003600", &target("v"), &[]).unwrap(),
            "http://h:80/p?programbegin=20231114221320%2B00&programend=20231114231320%2B00&virtualDomain=v"
        );
    }

    #[test]
    fn test_build_extra_params() {
        let extras = vec![
            ("programbegin".to_owned(), "ignored".to_owned()),
            ("virtualDomain".to_owned(), "ignored".to_owned()),
            ("token".to_owned(), "a b/c+d".to_owned()),
        ];
        assert_eq!(
            build(
                "/ZTE_EPG16/2/9201",
                "20231115061320",
                "2023-11-15T07:13:20+08:00",
                &target("hls.tvod_hls.zte.com"),
                &extras
            )
            .unwrap(),
            "http://h:80/ZTE_EPG16/2/9201?programbegin=20231114221320%2B00&programend=20231114231320%2B00\
             &virtualDomain=hls.tvod_hls.zte.com&token=a%20b%2Fc%2Bd"
        );
        assert_eq!(
            build("p", "1700000000", "1700003600", &target(""), &[]).unwrap(),
            "http://h:80/p?programbegin=20231114221320%2B00&programend=20231114231320%2B00&virtualDomain="
        );
    }

    #[test]
    fn test_build_rejects_bad_time() {
        let err = build("p", "1700000000", "tomorrow", &target("v"), &[]).unwrap_err();
        assert_eq!(
            err,
            CatchupError::InvalidTime {
                field: "programend",
                raw: "tomorrow".to_owned(),
                source: TimeFormatError::Unrecognized {
                    raw: "tomorrow".to_owned()
                },
            }
        );
    }

    #[test]
    fn test_request_from_query() {
        let request = CatchupRequest::from_query(
            "/ZTE_EPG16/2/9201",
            "start=20231114221320%2B00&end=20231114231320+00&programbegin=&foo=bar%20baz",
        )
        .unwrap();
        assert_eq!(
            request,
            CatchupRequest {
                path: "ZTE_EPG16/2/9201".to_owned(),
                begin: "20231114221320+00".to_owned(),
                end: "20231114231320+00".to_owned(),
                extra_params: vec![("foo".to_owned(), "bar baz".to_owned())],
            }
        );
        assert_eq!(
            request.target_url(&target("v")).unwrap(),
            "http://h:80/ZTE_EPG16/2/9201?programbegin=20231114221320%2B00&programend=20231114231320%2B00\
             &virtualDomain=v&foo=bar%20baz"
        );
    }

    #[test]
    fn test_request_errors() {
        assert_eq!(
            CatchupRequest::from_query("p", "programend=1700000000"),
            Err(CatchupError::MissingTime("programbegin"))
        );
        assert_eq!(
            CatchupRequest::from_query("p", "programbegin=1700000000"),
            Err(CatchupError::MissingTime("programend"))
        );
        assert_eq!(
            CatchupRequest::from_query("p", "programbegin=%7Bstart%7D&programend=%7Bend%7D"),
            Err(CatchupError::Placeholder {
                field: "programbegin",
                raw: "{start}".to_owned()
            })
        );
    }
}
