//! `wampframe` command line client.
//!
//! Runs the fuzzing-server testee or issues a single RPC call.

mod cli;
mod rpc;
mod testee;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, level_filters::LevelFilter, warn};

use crate::cli::{Cli, Command, LogLevel};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(level_filter(cli.log_level))
        .init();

    let command = async {
        match cli.command {
            Command::Testee { url, agent } => testee::run(&url, &agent).await,
            Command::Call {
                url,
                procedure,
                timeout,
                args,
            } => rpc::run(&url, &procedure, &args, timeout).await,
        }
    };
    let outcome = tokio::select! {
        outcome = command => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            return ExitCode::from(130);
        }
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}
