use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chop_peer::{connect, Client, PeerConfig, PeerError};
use clap::{Args, Subcommand};

use crate::exit::{peer_error, CliError, CliResult, FAILURE, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod console;
pub mod mapping;
pub mod ping;
pub mod send;
pub mod serve;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a server and print received text.
    Serve(ServeArgs),
    /// Read commands from stdin and send them to a server.
    Console(ConsoleArgs),
    /// Send one command and print the first reply.
    Send(SendArgs),
    /// Ping a server at aligned intervals.
    Ping(PingArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Console(args) => console::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Ping(args) => ping::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct EndpointArgs {
    /// Server address.
    #[arg(long, env = "CHOP_ADDR", default_value_t = chop_peer::DEFAULT_ADDR)]
    pub addr: SocketAddr,
    /// Segment size for reads and writes, in bytes.
    #[arg(long, env = "CHOP_WINDOW", default_value_t = chop_frame::DEFAULT_WINDOW)]
    pub window: usize,
}

impl EndpointArgs {
    pub fn peer_config(&self) -> CliResult<PeerConfig> {
        PeerConfig::with_window(self.window).map_err(|err| peer_error("invalid window", err))
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Maximum simultaneous connections.
    #[arg(long, default_value_t = chop_peer::DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,
    /// Exit after receiving N text payloads.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ConsoleArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Connect and disconnect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Command words, mapped like a console line.
    #[arg(required = true, num_args = 1..)]
    pub words: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Stop after N pings. Default: run until interrupted.
    #[arg(long)]
    pub count: Option<u64>,
    /// Ping period; pings go out on multiples of it (e.g. 60s, 500ms).
    #[arg(long, default_value = "60s")]
    pub every: String,
    /// Time to wait for each acknowledgement.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

/// Connect and wait for the connection to come up.
///
/// A connect that fails in the background surfaces the loop's own error.
pub fn open(endpoint: &EndpointArgs, timeout: Duration) -> CliResult<Client> {
    let config = endpoint.peer_config()?;
    let client =
        connect(endpoint.addr, config).map_err(|err| peer_error("connect failed", err))?;

    match client.wait_established(timeout) {
        Ok(()) => Ok(client),
        Err(PeerError::Closed) => match client.join() {
            Err(err) => Err(peer_error("connect failed", err)),
            Ok(()) => Err(CliError::new(FAILURE, "connect failed: connection closed")),
        },
        Err(err) => Err(peer_error("connect failed", err)),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("bad").unwrap_err().code, USAGE);
        assert_eq!(parse_duration(" ").unwrap_err().code, USAGE);
    }

    #[test]
    fn small_window_is_a_usage_error() {
        let endpoint = EndpointArgs {
            addr: chop_peer::DEFAULT_ADDR,
            window: 2,
        };
        assert_eq!(endpoint.peer_config().unwrap_err().code, USAGE);
    }
}
