//! Benchmark utilities.

use rand::Rng;
use std::path::Path;
use streamlog_core::{Config, EventLogClient};

/// Generate random payload data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a batch of random payloads.
pub fn random_batch(count: usize, payload_size: usize) -> Vec<Vec<u8>> {
    (0..count).map(|_| random_data(payload_size)).collect()
}

/// Opens a file log tuned for benchmarking: no per-commit fsync of record
/// bytes.
pub fn bench_file_log(root: &Path) -> EventLogClient {
    EventLogClient::open_files(root, Config::default().sync_on_commit(false))
        .expect("Failed to open file log")
}

/// Fills a log with `count` events of `payload_size` bytes.
pub fn populate(log: &EventLogClient, count: usize, payload_size: usize) {
    log.write_events_in_large_batch("bench", random_batch(count, payload_size))
        .expect("Failed to populate log");
}
