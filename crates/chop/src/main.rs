mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "chop", version, about = "Chop protocol server and client")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_with_defaults() {
        let cli = Cli::try_parse_from(["chop", "serve"]).expect("serve args should parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.endpoint.addr, chop_peer::DEFAULT_ADDR);
        assert_eq!(args.endpoint.window, 255);
        assert_eq!(args.max_connections, 20);
    }

    #[test]
    fn parses_send_words() {
        let cli = Cli::try_parse_from([
            "chop",
            "send",
            "--addr",
            "127.0.0.1:6000",
            "hello",
            "there",
        ])
        .expect("send args should parse");
        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.words, vec!["hello", "there"]);
        assert_eq!(args.endpoint.addr.port(), 6000);
    }

    #[test]
    fn send_requires_words() {
        let err = Cli::try_parse_from(["chop", "send"]).expect_err("missing words should fail");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "chop",
            "ping",
            "--count",
            "2",
            "--every",
            "500ms",
            "--format",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("ping args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.log_level, LogLevel::Debug));
        assert!(matches!(cli.command, Command::Ping(_)));
    }

    #[test]
    fn rejects_bad_address() {
        let err = Cli::try_parse_from(["chop", "console", "--addr", "not-an-addr"])
            .expect_err("bad address should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
