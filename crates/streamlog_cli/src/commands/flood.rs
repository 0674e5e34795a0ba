//! Flood command implementation.

use std::collections::HashSet;
use streamlog_core::EventLogClient;
use streamlog_testkit::flood_write;
use tracing::info;

/// Runs the flood command.
///
/// Fails if any acknowledged event cannot be read back.
pub fn run(
    log: &EventLogClient,
    stream: &str,
    threads: usize,
    count: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = log.tail()?;
    info!("Flooding stream '{}' with {}x{} events", stream, threads, count);
    let report = flood_write(log, stream, threads, count);

    let mut missing: HashSet<String> = report.messages.clone();
    for record in log.read_all_events(start, None) {
        let record = record?;
        if record.stream == stream {
            missing.remove(&*String::from_utf8_lossy(&record.payload));
        }
    }

    match format {
        "json" => println!("{}", report.result.to_json()?),
        _ => report.result.print_summary("Flood write"),
    }

    if !missing.is_empty() {
        return Err(format!("{} acknowledged events were not read back", missing.len()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flood_in_memory() {
        let log = EventLogClient::in_memory().unwrap();
        run(&log, "flood", 3, 20, "json").unwrap();
        assert_eq!(log.read_all().count(), 60);
    }
}
