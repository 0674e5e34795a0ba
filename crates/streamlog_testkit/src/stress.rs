//! Stress tests for streamlog.
//!
//! The flood writer hammers the single-event path from many threads; the
//! basic test imports large batches, floods, then reads everything back and
//! checks that every message arrived exactly once.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use streamlog_core::{EventLogClient, LogResult, StorageOffset};
use uuid::Uuid;

/// Result of a stress test run.
#[derive(Debug, Clone, Serialize)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }

    /// Renders the result as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Configuration for the basic correctness test.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of batches imported.
    pub batch_count: usize,
    /// Records per batch.
    pub batch_size: usize,
    /// Concurrent flood writers.
    pub threads: usize,
    /// Single events per flood writer.
    pub flood_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            batch_count: 10,
            batch_size: 10_000,
            threads: 10,
            flood_size: 1_000,
        }
    }
}

/// What a flood or import run wrote.
#[derive(Debug, Clone)]
pub struct WriteReport {
    /// Timing and failure counts.
    pub result: StressTestResult,
    /// Every message that was acknowledged.
    pub messages: HashSet<String>,
    /// Offsets of acknowledged single events (empty for batch imports).
    pub offsets: Vec<StorageOffset>,
}

/// Writes `flood_size` unique single events from each of `threads` threads.
///
/// Messages are `flood-{thread}-{index}`. Failed writes are counted and
/// left out of the acknowledged set.
pub fn flood_write(
    log: &EventLogClient,
    stream: &str,
    threads: usize,
    flood_size: usize,
) -> WriteReport {
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    let per_thread: Vec<Vec<(String, StorageOffset)>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let failed = &failed;
                scope.spawn(move || {
                    let mut acked = Vec::with_capacity(flood_size);
                    for i in 0..flood_size {
                        let message = format!("flood-{t}-{i}");
                        match log.write_event(stream, message.as_bytes()) {
                            Ok(offset) => acked.push((message, offset)),
                            Err(_) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                    acked
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_default())
            .collect()
    });

    let duration = start.elapsed();
    let mut messages = HashSet::new();
    let mut offsets = Vec::new();
    for (message, offset) in per_thread.into_iter().flatten() {
        messages.insert(message);
        offsets.push(offset);
    }

    WriteReport {
        result: StressTestResult::new(messages.len(), failed.into_inner(), duration),
        messages,
        offsets,
    }
}

/// Imports `batch_count` batches of `batch_size` unique records.
///
/// Messages are `batch-{batch}-{index}`. A failed batch is counted once
/// and none of its messages are acknowledged.
pub fn import_batches(
    log: &EventLogClient,
    stream: &str,
    batch_count: usize,
    batch_size: usize,
) -> WriteReport {
    let start = Instant::now();
    let mut messages = HashSet::new();
    let mut successful = 0;
    let mut failed = 0;

    for b in 0..batch_count {
        let payloads = (0..batch_size).map(|i| format!("batch-{b}-{i}"));
        match log.write_events_in_large_batch(stream, payloads.clone().map(String::into_bytes)) {
            Ok(_) => {
                successful += 1;
                messages.extend(payloads);
            }
            Err(_) => failed += 1,
        }
    }

    WriteReport {
        result: StressTestResult::new(successful, failed, start.elapsed()),
        messages,
        offsets: Vec::new(),
    }
}

/// Outcome of [`basic_test`].
#[derive(Debug, Clone)]
pub struct BasicTestReport {
    /// Stream the test wrote to.
    pub stream: String,
    /// Batch import phase.
    pub imported: StressTestResult,
    /// Flood phase.
    pub flooded: StressTestResult,
    /// Records of the test stream read back.
    pub records_read: usize,
    /// Everything that went wrong; empty on success.
    pub problems: Vec<String>,
}

impl BasicTestReport {
    /// Returns `true` if every message was read back exactly once.
    pub fn passed(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Imports batches, floods single events, then verifies the log.
///
/// Runs on a fresh stream so earlier data in the log is ignored. Batch
/// records must come back before flood records, each exactly once.
///
/// # Errors
///
/// Returns an error if the read-back scan fails.
pub fn basic_test(log: &EventLogClient, config: &StressConfig) -> LogResult<BasicTestReport> {
    let stream = format!("basic-test-{}", Uuid::new_v4().simple());

    let mut imported = import_batches(log, &stream, config.batch_count, config.batch_size);
    let mut flooded = flood_write(log, &stream, config.threads, config.flood_size);
    let batch_messages = imported.messages.len();
    let expected = batch_messages + flooded.messages.len();

    let mut problems = Vec::new();
    if imported.result.failed_ops > 0 {
        problems.push(format!("{} batch imports failed", imported.result.failed_ops));
    }
    if flooded.result.failed_ops > 0 {
        problems.push(format!("{} flood writes failed", flooded.result.failed_ops));
    }

    let mut index = 0;
    for record in log.read_all() {
        let record = record?;
        if record.stream != stream {
            continue;
        }
        let message = String::from_utf8_lossy(&record.payload).into_owned();
        let expected_set = if index < batch_messages {
            &mut imported.messages
        } else {
            &mut flooded.messages
        };
        if !expected_set.remove(&message) {
            problems.push(format!("message '{message}' at {} is unexpected or duplicated", record.offset));
        }
        index += 1;
    }

    if !imported.messages.is_empty() {
        problems.push(format!("{} batch messages were never read", imported.messages.len()));
    }
    if !flooded.messages.is_empty() {
        problems.push(format!("{} flood messages were never read", flooded.messages.len()));
    }
    if index != expected {
        problems.push(format!("expected {expected} records, read {index}"));
    }

    Ok(BasicTestReport {
        stream,
        imported: imported.result,
        flooded: flooded.result,
        records_read: index,
        problems,
    })
}
