use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chop_peer::{listen, PeerConfig};
use tracing::info;

use crate::cmd::{install_ctrlc_handler, ServeArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_payload, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = PeerConfig {
        max_connections: Some(args.max_connections),
        ..args.endpoint.peer_config()?
    };
    let mut server =
        listen(args.endpoint.addr, config).map_err(|err| peer_error("listen failed", err))?;
    info!(addr = %server.local_addr(), window = args.endpoint.window, "serving");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        server
            .poll_once(Some(chop_peer::event_loop::POLL_INTERVAL))
            .map_err(|err| peer_error("event loop failed", err))?;

        for received in server.take_received() {
            print_payload(received.remote, &received.payload, format);
            printed += 1;
            if args.count.is_some_and(|count| printed >= count) {
                info!(printed, "payload count reached");
                return Ok(SUCCESS);
            }
        }
    }

    info!(connections = server.connection_count(), "shutting down");
    Ok(SUCCESS)
}
