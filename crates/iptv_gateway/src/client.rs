use std::net::IpAddr;
use std::sync::Once;
use std::time::Duration;

use anyhow::{Context, Result};
use leaky_bucket::RateLimiter;
use reqwest::{Method, header};
use serde_json::Value;

use crate::error::FetchError;

/// 构建 Client 所需的连接参数
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub bind_ip: Option<IpAddr>,
    pub user_agent: String,
    pub timeout: Duration,
}

// 一个对 reqwest::Client 的简单封装，所有出站请求都从同一个源地址发出
#[derive(Clone)]
pub struct Client(reqwest::Client);

impl Client {
    pub fn new(options: &HttpOptions) -> Result<Self> {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            // 重复安装会返回 Err，同一进程内只需要成功一次
            let _ = rustls::crypto::ring::default_provider().install_default();
        });
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&options.user_agent).context("User-Agent 含有非法字符")?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .gzip(true)
            .local_address(options.bind_ip)
            .connect_timeout(options.timeout)
            .timeout(options.timeout)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self(client))
    }

    pub fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.0.request(method, url)
    }

    /// GET 并把响应体解析为 JSON
    pub async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let resp = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        Self::read_json(url, resp).await
    }

    /// 以 application/x-www-form-urlencoded 提交表单并把响应体解析为 JSON
    pub async fn post_form_json(&self, url: &str, form: &[(String, String)]) -> Result<Value, FetchError> {
        let resp = self
            .request(Method::POST, url)
            .form(form)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        Self::read_json(url, resp).await
    }

    async fn read_json(url: &str, resp: reqwest::Response) -> Result<Value, FetchError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::from_status(url, status));
        }
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let text = resp.text().await.map_err(|e| FetchError::from_reqwest(url, e))?;
        serde_json::from_str(&text).map_err(|e| FetchError::Malformed {
            url: url.to_owned(),
            reason: format!(
                "{e} (content-type: {content_type:?}, body: {:?})",
                text.chars().take(120).collect::<String>()
            ),
        })
    }
}

/// 相邻两次请求之间的最小间隔，用来避免对上游造成压力
pub struct Throttle(Option<RateLimiter>);

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        if interval.is_zero() {
            return Self(None);
        }
        Self(Some(
            RateLimiter::builder()
                .initial(1)
                .refill(1)
                .max(1)
                .interval(interval)
                .build(),
        ))
    }

    pub async fn wait(&self) {
        if let Some(limiter) = &self.0 {
            limiter.acquire_one().await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    pub(crate) fn test_client() -> Client {
        Client::new(&HttpOptions {
            bind_ip: None,
            user_agent: "curl/8.0.0".to_owned(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    /// 在本地随机端口启动一个极简 HTTP 服务，handler 接收请求路径与请求体，返回状态码与响应体
    pub(crate) async fn serve<F>(handler: F) -> String
    where
        F: Fn(&str, &str) -> (u16, Vec<u8>) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = Arc::new(handler);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let (head_len, content_length) = loop {
                        let n = stream.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            let head = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                            let len = head
                                .lines()
                                .find_map(|line| line.strip_prefix("content-length:"))
                                .and_then(|v| v.trim().parse::<usize>().ok())
                                .unwrap_or(0);
                            break (pos + 4, len);
                        }
                    };
                    while buf.len() < head_len + content_length {
                        let n = stream.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }
                    let head = String::from_utf8_lossy(&buf[..head_len]).into_owned();
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_owned();
                    let body = String::from_utf8_lossy(&buf[head_len..]).into_owned();
                    let (status, payload) = handler(&path, &body);
                    let head = format!(
                        "HTTP/1.1 {status} Test\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                        payload.len()
                    );
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(&payload).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_get_json_against_local_server() {
        let base = serve(|path, _| match path {
            "/ok" => (200, br#"{"a": 1}"#.to_vec()),
            "/html" => (200, b"<html></html>".to_vec()),
            _ => (404, Vec::new()),
        })
        .await;
        let client = test_client();
        assert_eq!(client.get_json(&format!("{base}/ok")).await.unwrap()["a"], 1);
        assert!(matches!(
            client.get_json(&format!("{base}/html")).await,
            Err(FetchError::Malformed { .. })
        ));
        assert!(matches!(
            client.get_json(&format!("{base}/missing")).await,
            Err(FetchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_throttle_spacing() {
        let throttle = Throttle::new(Duration::from_millis(50));
        let start = Instant::now();
        for _ in 0..3 {
            throttle.wait().await;
        }
        // 第一次立即放行，之后每次至少间隔 50ms
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_zero_interval_never_waits() {
        let throttle = Throttle::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..100 {
            throttle.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_user_agent() {
        let options = HttpOptions {
            bind_ip: None,
            user_agent: "bad\nagent".to_owned(),
            timeout: Duration::from_secs(1),
        };
        assert!(Client::new(&options).is_err());
    }

    #[ignore = "only for manual test"]
    #[tokio::test]
    async fn test_get_json() {
        let client = Client::new(&HttpOptions {
            bind_ip: None,
            user_agent: "curl/8.0.0".to_owned(),
            timeout: Duration::from_secs(10),
        })
        .unwrap();
        assert!(client.get_json("http://httpbin.org/json").await.is_ok());
    }
}
