//! Inspect command implementation.

use serde::Serialize;
use std::collections::BTreeMap;
use streamlog_core::EventLogClient;

/// Log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Backend kind.
    pub backend: String,
    /// Backend location.
    pub location: String,
    /// Committed tail in bytes.
    pub tail: u64,
    /// Committed events (if counted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_count: Option<usize>,
    /// Events per stream (if counted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streams: Option<BTreeMap<String, usize>>,
}

/// Runs the inspect command.
pub fn run(
    log: &EventLogClient,
    count_streams: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(log, count_streams)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Backend:  {}", result.backend);
            println!("Location: {}", result.location);
            println!("Tail:     {} bytes", result.tail);
            if let Some(count) = result.event_count {
                println!("Events:   {count}");
            }
            if let Some(streams) = &result.streams {
                println!("\nStreams:");
                for (stream, count) in streams {
                    println!("  {stream:<32} {count:>10}");
                }
            }
        }
    }

    Ok(())
}

fn inspect(
    log: &EventLogClient,
    count_streams: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let info = log.driver_info();
    let mut result = InspectResult {
        backend: info.kind.to_string(),
        location: info.location,
        tail: log.tail()?.as_u64(),
        event_count: None,
        streams: None,
    };

    if count_streams {
        let mut streams = BTreeMap::new();
        let mut total = 0;
        for record in log.read_all() {
            let record = record?;
            *streams.entry(record.stream).or_insert(0) += 1;
            total += 1;
        }
        result.event_count = Some(total);
        result.streams = Some(streams);
    }

    Ok(result)
}
