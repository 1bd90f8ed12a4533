use std::time::Duration;

use anyhow::Result;
use reqwest::StatusCode;
use thiserror::Error;

use crate::timefmt::TimeFormat;

/// 上游请求失败的原因，调用方据此决定跳过还是终止
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("server returned {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return FetchError::Timeout(url.to_owned());
        }
        match err.status() {
            Some(StatusCode::NOT_FOUND) => FetchError::NotFound(url.to_owned()),
            Some(status) => FetchError::Status {
                status,
                url: url.to_owned(),
            },
            None => FetchError::Transport {
                url: url.to_owned(),
                source: err,
            },
        }
    }

    pub(crate) fn from_status(url: &str, status: StatusCode) -> Self {
        if status == StatusCode::NOT_FOUND {
            FetchError::NotFound(url.to_owned())
        } else {
            FetchError::Status {
                status,
                url: url.to_owned(),
            }
        }
    }

    /// 超时、连接错误与 5xx 可以在下一轮重试，其它错误重试也没有意义
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => status.is_server_error(),
            FetchError::NotFound(_) | FetchError::Malformed { .. } => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeFormatError {
    #[error("unrecognized time format: {raw:?}")]
    Unrecognized { raw: String },
    #[error("cannot convert {raw:?} as {kind}: {reason}")]
    Malformed {
        raw: String,
        kind: TimeFormat,
        reason: &'static str,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatchupError {
    #[error("missing time parameter {0}")]
    MissingTime(&'static str),
    #[error("time parameter {field} still carries the template placeholder {raw:?}")]
    Placeholder { field: &'static str, raw: String },
    #[error("invalid {field}={raw:?}: {source}")]
    InvalidTime {
        field: &'static str,
        raw: String,
        #[source]
        source: TimeFormatError,
    },
}

/// 配置预检失败，一次性列出所有问题
#[derive(Error, Debug)]
#[error("配置不合法：\n{}", .0.iter().map(|e| format!("- {e}")).collect::<Vec<_>>().join("\n"))]
pub struct ConfigError(pub Vec<String>);

pub enum JobOutcome<T> {
    Succeeded(T),
    Failed(anyhow::Error),
    TimedOut(Duration),
}

impl<T> JobOutcome<T> {
    /// 超时与失败使用不同的退出码，便于外部调度区分
    pub fn exit_code(&self) -> u8 {
        match self {
            JobOutcome::Succeeded(_) => 0,
            JobOutcome::Failed(_) => 1,
            JobOutcome::TimedOut(_) => 124,
        }
    }
}

impl<T> From<Result<T>> for JobOutcome<T> {
    fn from(res: Result<T>) -> Self {
        match res {
            Ok(value) => JobOutcome::Succeeded(value),
            Err(err) => JobOutcome::Failed(err),
        }
    }
}
