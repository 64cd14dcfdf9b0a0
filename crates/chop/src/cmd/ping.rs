use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chop_frame::{Enquiry, Frame, Status};
use chop_peer::unix_millis;
use tracing::{debug, info};

use crate::cmd::{install_ctrlc_handler, open, parse_duration, PingArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_ping, OutputFormat};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

pub fn run(args: PingArgs, format: OutputFormat) -> CliResult<i32> {
    let period = parse_duration(&args.every)?;
    let timeout = parse_duration(&args.timeout)?;
    let client = open(&args.endpoint, timeout)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut seq = 0u64;
    while running.load(Ordering::SeqCst) && args.count.is_none_or(|count| seq < count) {
        if !sleep_until_aligned(period, &running) {
            break;
        }

        let sent_at = unix_millis();
        let started = Instant::now();
        client
            .send(Frame::enquiry(Enquiry::Normal))
            .map_err(|err| peer_error("ping failed", err))?;
        client
            .expect_ack(Status::Enquiry, timeout)
            .map_err(|err| peer_error("ping failed", err))?;
        let rtt_ms = started.elapsed().as_secs_f64() * 1000.0;

        seq += 1;
        debug!(seq, rtt_ms, "ping acknowledged");
        print_ping(client.remote(), seq, rtt_ms, sent_at, format);
    }

    info!(sent = seq, "ping finished");
    if let Err(err) = client.request_escape() {
        debug!(error = %err, "escape not sent");
    } else if let Err(err) = client.wait_closed(timeout) {
        debug!(error = %err, "server did not confirm disconnect");
    }
    if let Err(err) = client.close() {
        debug!(error = %err, "client loop ended with error");
    }
    Ok(SUCCESS)
}

/// Time left until the next multiple of `period` on the wall clock.
fn until_aligned(now_millis: i64, period: Duration) -> Duration {
    let period_millis = period.as_millis().max(1) as i64;
    let next = (now_millis / period_millis + 1) * period_millis;
    Duration::from_millis((next - now_millis) as u64)
}

/// Sleep to the next period boundary. Returns false if interrupted.
fn sleep_until_aligned(period: Duration, running: &AtomicBool) -> bool {
    let deadline = Instant::now() + until_aligned(unix_millis(), period);
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
