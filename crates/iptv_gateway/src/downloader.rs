use std::path::Path;

use anyhow::{Result, ensure};
use async_tempfile::TempFile;
use futures::TryStreamExt;
use reqwest::{Method, header};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

use crate::client::Client;
use crate::error::FetchError;

pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// 先写入临时文件，完整下载后再复制到目标位置，失败时不会留下半截文件
    pub async fn fetch(&self, url: &str, path: &Path) -> Result<()> {
        let mut temp_file = TempFile::new().await?;
        if let Err(e) = self.fetch_serial(url, &mut temp_file).await {
            temp_file.drop_async().await;
            return Err(e);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(temp_file.file_path(), path).await?;
        temp_file.drop_async().await;
        Ok(())
    }

    async fn fetch_serial(&self, url: &str, file: &mut TempFile) -> Result<()> {
        let resp = self
            .client
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        if !resp.status().is_success() {
            return Err(FetchError::from_status(url, resp.status()).into());
        }
        let expected = resp.header_content_length();
        let mut stream_reader = StreamReader::new(resp.bytes_stream().map_err(std::io::Error::other));
        let received = tokio::io::copy(&mut stream_reader, file).await?;
        file.flush().await?;
        ensure!(received > 0, "empty response body from {url}");
        if let Some(expected) = expected {
            ensure!(
                received == expected,
                "downloaded bytes mismatch: expected {}, got {}",
                expected,
                received
            );
        }
        Ok(())
    }
}

/// reqwest.content_length() 居然指的是 body_size 而非 content-length header，没办法自己实现一下
/// https://github.com/seanmonstar/reqwest/issues/1814
trait ResponseExt {
    fn header_content_length(&self) -> Option<u64>;
}

impl ResponseExt for reqwest::Response {
    fn header_content_length(&self) -> Option<u64> {
        self.headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
    }
}
