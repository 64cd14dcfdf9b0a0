use chop_peer::{Notice, PeerError};
use tracing::{debug, warn};

use crate::cmd::mapping::{map_line, Line};
use crate::cmd::{open, parse_duration, SendArgs};
use crate::exit::{peer_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_notice, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let line = args.words.join(" ");
    let client = open(&args.endpoint, timeout)?;

    let frame = match map_line(&line) {
        Line::Escape => {
            client
                .request_escape()
                .map_err(|err| peer_error("send failed", err))?;
            client
                .wait_closed(timeout)
                .map_err(|err| peer_error("disconnect failed", err))?;
            if let Some(notice) = client.next_notice() {
                print_notice(client.remote(), &notice, format);
            }
            return Ok(SUCCESS);
        }
        Line::Frame(frame) => frame,
    };

    client
        .send(frame)
        .map_err(|err| peer_error("send failed", err))?;
    let notice = client
        .notice_timeout(timeout)
        .map_err(|err| peer_error("no reply", err))?;
    print_notice(client.remote(), &notice, format);

    match client.request_escape() {
        Ok(()) => {
            if let Err(err) = client.wait_closed(timeout) {
                warn!(error = %err, "server did not confirm disconnect");
            }
        }
        Err(PeerError::Closed) => {}
        Err(err) => debug!(error = %err, "escape not sent"),
    }
    if let Err(err) = client.close() {
        debug!(error = %err, "client loop ended with error");
    }

    Ok(exit_code(&notice))
}

fn exit_code(notice: &Notice) -> i32 {
    match notice {
        Notice::Refused(_) => FAILURE,
        _ => SUCCESS,
    }
}

#[cfg(test)]
mod tests {
    use chop_frame::Enquiry;

    use super::*;

    #[test]
    fn refusal_fails_the_command() {
        assert_eq!(exit_code(&Notice::Refused(7)), FAILURE);
        assert_eq!(exit_code(&Notice::Acknowledged(5)), SUCCESS);
        assert_eq!(exit_code(&Notice::Enquired(Enquiry::Normal)), SUCCESS);
    }
}
