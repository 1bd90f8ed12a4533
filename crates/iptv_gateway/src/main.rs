#[macro_use]
extern crate tracing;

mod catalog;
mod catchup;
mod client;
mod config;
mod downloader;
mod epg;
mod error;
mod logo;
mod playlist;
mod relay;
mod timefmt;
mod utils;
mod workflow;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use crate::catchup::CatchupRequest;
use crate::config::{Args, Command, Config, Job, Settings, default_config_dir};
use crate::error::JobOutcome;
use crate::utils::init_logger;
use crate::workflow::{build_epg, build_playlist, run_job};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logger(&args.log_level, args.log_file.as_deref()) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }
    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(config_dir: Option<&Path>) -> Result<(Config, PathBuf)> {
    let config_dir = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => default_config_dir()?,
    };
    let config = Config::load_or_init(&config_dir)?;
    Ok((config, config_dir))
}

async fn run(args: Args) -> Result<u8> {
    match args.command {
        Command::DetectTime { value } => match timefmt::detect(&value) {
            Some(kind) => {
                println!("{kind}\t{}", timefmt::normalize(&value, Some(kind))?);
                Ok(0)
            }
            None => {
                error!("无法识别时间格式：{value:?}");
                Ok(1)
            }
        },
        Command::CatchupUrl { path, query } => {
            let (config, config_dir) = load_config(args.config_dir.as_deref())?;
            let settings = Settings::resolve(&config, &config_dir, Job::Catchup)?;
            let request = CatchupRequest::from_query(&path, &query)?;
            println!("{}", request.target_url(&settings.catchup)?);
            Ok(0)
        }
        Command::Playlist => {
            let (mut config, config_dir) = load_config(args.config_dir.as_deref())?;
            let settings = Settings::resolve(&config, &config_dir, Job::Playlist)?;
            let outcome = run_job(settings.job_timeout, build_playlist(&settings)).await;
            if let JobOutcome::Succeeded(report) = &outcome {
                match &report.catchup_target {
                    Some(target) if *target != config.catchup => {
                        info!("回放服务器地址更新为 {}:{}", target.host, target.port);
                        config.catchup = target.clone();
                        config.save(&config_dir)?;
                    }
                    _ => {}
                }
            }
            report_outcome("播放列表", outcome)
        }
        Command::Epg => {
            let (config, config_dir) = load_config(args.config_dir.as_deref())?;
            let settings = Settings::resolve(&config, &config_dir, Job::Epg)?;
            let outcome = run_job(settings.job_timeout, build_epg(&settings, chrono::Utc::now())).await;
            report_outcome("节目单", outcome)
        }
    }
}

/// 运行统计输出到标准输出，便于外部调度程序采集
fn report_outcome<T: Serialize>(name: &str, outcome: JobOutcome<T>) -> Result<u8> {
    let code = outcome.exit_code();
    match outcome {
        JobOutcome::Succeeded(report) => {
            info!("{name}生成完毕");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        JobOutcome::Failed(e) => error!("{name}生成失败：{e:#}"),
        JobOutcome::TimedOut(timeout) => error!("{name}生成超时（{} 秒），已放弃本次任务", timeout.as_secs()),
    }
    Ok(code)
}
