mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::exit::{CliError, INTERNAL};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "relayhub", version, about = "Identity-relative message hub")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "RELAYHUB_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "RELAYHUB_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
        .and_then(|runtime| runtime.block_on(cmd::run(cli.command, format)));

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
    fn parses_send_with_negative_channel() {
        let cli = Cli::try_parse_from([
            "relayhub",
            "send",
            "--tcp",
            "127.0.0.1:7000",
            "--channel",
            "-1",
            "--data",
            "hello",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send command");
        };
        assert_eq!(args.channel, "-1");
        assert_eq!(args.verb, "MSG");
    }

    #[test]
    fn rejects_conflicting_content_args() {
        let err = Cli::try_parse_from([
            "relayhub",
            "send",
            "--tcp",
            "127.0.0.1:7000",
            "--file",
            "payload.bin",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn serve_requires_an_endpoint() {
        let err = Cli::try_parse_from(["relayhub", "serve"]).expect_err("serve needs an endpoint");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_serve_limits() {
        let cli = Cli::try_parse_from([
            "relayhub",
            "serve",
            "--tcp",
            "127.0.0.1:0",
            "--rate-limit",
            "65536",
            "--spill-threshold",
            "4096",
        ])
        .expect("serve args should parse");

        let Command::Serve(args) = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(args.rate_limit, Some(65536));
        assert_eq!(args.spill_threshold, 4096);
        assert_eq!(args.max_content, relayhub_frame::DEFAULT_MAX_CONTENT);
    }
}
