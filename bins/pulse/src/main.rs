//! Soak one side of the duplex channel: run this binary twice (two
//! processes, same config) and each instance pushes `message_count`
//! messages while draining the peer's.

mod config;

use std::time::{Duration, Instant};

use basalt_ipc::{Endpoint, RingConfig};
use config::PulseConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => PulseConfig::load(&path)?,
        None => PulseConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let mut endpoint = Endpoint::open(&config.shm_file_path, RingConfig::new(config.payload_size))?;

    info!(
        role = ?endpoint.role(),
        path = %config.shm_file_path,
        payload_size = config.payload_size,
        "attached; exchanging {count} x {size} B with the peer",
        count = config.message_count,
        size = config.message_size,
    );

    let peer_timeout = Duration::from_millis(config.peer_timeout_ms);
    let payload = vec![0x42u8; config.message_size];
    let started = Instant::now();
    let mut received = 0usize;

    for _ in 0..config.message_count {
        endpoint.send(&payload, true, Some(peer_timeout))?;
        while endpoint.recv(false, None)?.is_some() {
            received += 1;
        }
    }

    // The peer pushes the same count; drain whatever is still in flight.
    while received < config.message_count {
        endpoint.recv(true, Some(peer_timeout))?;
        received += 1;
    }

    let elapsed = started.elapsed();
    let rate = config.message_count as f64 / elapsed.as_secs_f64();
    info!(
        sent = config.message_count,
        received,
        ?elapsed,
        "pulse run complete ({rate:.0} msg/s per direction)"
    );

    Ok(())
}
