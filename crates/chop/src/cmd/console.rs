use std::io::BufRead;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chop_peer::{Connection, PeerError};
use tracing::{debug, warn};

use crate::cmd::mapping::{map_line, Line};
use crate::cmd::{open, parse_duration, ConsoleArgs};
use crate::exit::{io_error, peer_error, CliResult, SUCCESS};
use crate::output::{print_notice, print_payload, OutputFormat};

const PRINT_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ConsoleArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let client = open(&args.endpoint, timeout)?;
    let printer = spawn_printer(client.connection(), format);

    let result = forward_stdin(&client);

    if !client.is_closed() {
        match client.request_escape() {
            Ok(()) => {
                if let Err(err) = client.wait_closed(timeout) {
                    warn!(error = %err, "server did not confirm disconnect");
                }
            }
            Err(err) => debug!(error = %err, "escape not sent"),
        }
    }
    if let Err(err) = client.close() {
        debug!(error = %err, "client loop ended with error");
    }
    let _ = printer.join();

    result.map(|()| SUCCESS)
}

/// Send one frame per stdin line until `exit`, end of input, or a closed
/// connection.
fn forward_stdin(connection: &Connection) -> CliResult<()> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.map_err(|err| io_error("failed reading stdin", err))?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        match map_line(line) {
            Line::Escape => return Ok(()),
            Line::Frame(frame) => match connection.send(frame) {
                Ok(()) => {}
                Err(PeerError::Closed) => {
                    warn!("connection closed");
                    return Ok(());
                }
                Err(err) => return Err(peer_error("send failed", err)),
            },
        }
    }
    Ok(())
}

fn spawn_printer(connection: Arc<Connection>, format: OutputFormat) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        let closed = match connection.notice_timeout(PRINT_INTERVAL) {
            Ok(notice) => {
                print_notice(connection.remote(), &notice, format);
                false
            }
            Err(PeerError::Timeout(_)) => false,
            Err(_) => true,
        };
        while let Some(payload) = connection.receive() {
            print_payload(connection.remote(), &payload, format);
        }
        if closed {
            return;
        }
    })
}
