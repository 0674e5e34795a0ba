//! Read command implementation.

use serde::Serialize;
use streamlog_core::{EventLogClient, RetrievedRecord, StorageOffset};

/// Event representation for output.
#[derive(Debug, Serialize)]
pub struct EventInfo {
    /// Offset of the event.
    pub offset: u64,
    /// Offset to resume reading after this event.
    pub next_offset: u64,
    /// Stream tag.
    pub stream: String,
    /// Payload size in bytes.
    pub size: usize,
    /// Payload as text, lossily decoded.
    pub payload: String,
}

impl From<RetrievedRecord> for EventInfo {
    fn from(record: RetrievedRecord) -> Self {
        Self {
            offset: record.offset.as_u64(),
            next_offset: record.next_offset.as_u64(),
            size: record.payload.len(),
            payload: String::from_utf8_lossy(&record.payload).into_owned(),
            stream: record.stream,
        }
    }
}

/// Runs the read command.
pub fn run(
    log: &EventLogClient,
    start: i64,
    limit: Option<usize>,
    stream: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = StorageOffset::new(start)?;
    let events = collect_events(log, start, limit, stream)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        _ => {
            for event in &events {
                println!(
                    "{:>12}  {:<24} {:>8}b  {}",
                    event.offset, event.stream, event.size, event.payload
                );
            }
            println!("\n{} events", events.len());
        }
    }

    Ok(())
}

fn collect_events(
    log: &EventLogClient,
    start: StorageOffset,
    limit: Option<usize>,
    stream: Option<&str>,
) -> Result<Vec<EventInfo>, Box<dyn std::error::Error>> {
    let max_events = limit.unwrap_or(usize::MAX);
    let mut events = Vec::new();

    for record in log.read_all_events(start, None) {
        if events.len() >= max_events {
            break;
        }
        let record = record?;
        if stream.is_some_and(|s| s != record.stream) {
            continue;
        }
        events.push(EventInfo::from(record));
    }

    Ok(events)
}
