//! Command line interface for the `wampframe` binary.
//!
//! Shared with `build.rs`, which renders the manual page from it, so this
//! module depends on nothing but `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command line arguments for the `wampframe` binary.
#[derive(Debug, Parser)]
#[command(name = "wampframe", version, about = "WebSocket and WAMP client tools")]
pub struct Cli {
    /// Most verbose log level to emit.
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every case offered by a WebSocket fuzzing server, echoing each
    /// message back, then ask the server to write its reports.
    Testee {
        /// Base URI of the fuzzing server.
        #[arg(long, default_value = "ws://127.0.0.1:9001")]
        url: String,
        /// Agent name reported to the server.
        #[arg(long, default_value = "wampframe")]
        agent: String,
    },
    /// Issue one RPC call and print its result.
    Call {
        /// URI of the session endpoint.
        #[arg(long)]
        url: String,
        /// Procedure URI to call.
        #[arg(long)]
        procedure: String,
        /// Seconds to wait for the result.
        #[arg(long, default_value_t = 10)]
        timeout: u64,
        /// Call arguments. Values that are not JSON are sent as strings.
        args: Vec<String>,
    },
}

/// Log verbosity accepted by `--log-level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command, LogLevel};

    #[test]
    fn testee_uses_defaults() {
        let cli = Cli::parse_from(["wampframe", "testee"]);
        assert_eq!(cli.log_level, LogLevel::Info);
        let Command::Testee { url, agent } = cli.command else {
            panic!("expected testee command");
        };
        assert_eq!(url, "ws://127.0.0.1:9001");
        assert_eq!(agent, "wampframe");
    }

    #[test]
    fn call_collects_trailing_arguments() {
        let cli = Cli::parse_from([
            "wampframe",
            "call",
            "--url",
            "ws://localhost:9000",
            "--procedure",
            "http://example.com/calc#add",
            "23",
            "19",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.log_level, LogLevel::Debug);
        let Command::Call {
            procedure, args, ..
        } = cli.command
        else {
            panic!("expected call command");
        };
        assert_eq!(procedure, "http://example.com/calc#add");
        assert_eq!(args, ["23", "19"]);
    }

    #[test]
    fn call_requires_procedure() {
        assert!(Cli::try_parse_from(["wampframe", "call", "--url", "ws://h"]).is_err());
    }
}
