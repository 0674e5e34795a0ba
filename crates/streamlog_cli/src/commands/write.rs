//! Write command implementation.

use std::io::Read;
use streamlog_core::EventLogClient;
use tracing::info;

/// Runs the write command.
pub fn run(
    log: &EventLogClient,
    stream: &str,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = match message {
        Some(message) => message.into_bytes(),
        None => {
            let mut buffer = Vec::new();
            std::io::stdin().read_to_end(&mut buffer)?;
            buffer
        }
    };

    let offset = log.write_event(stream, &payload)?;
    info!("Wrote {} bytes to stream '{}'", payload.len(), stream);
    println!("{offset}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_message() {
        let log = EventLogClient::in_memory().unwrap();
        run(&log, "orders", Some("placed".to_string())).unwrap();

        let records: Vec<_> = log.read_all().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, b"placed");
    }
}
