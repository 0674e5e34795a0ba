//! Import command implementation.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use streamlog_core::EventLogClient;
use tracing::info;

/// Runs the import command.
///
/// Every line becomes one event; lines are streamed into the staging
/// pipeline without loading the whole file.
pub fn run(log: &EventLogClient, stream: &str, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let reader: Box<dyn BufRead> = if file == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        info!("Importing {:?}", file);
        Box::new(BufReader::new(File::open(file)?))
    };

    let mut read_error = None;
    let lines = reader.lines().map_while(|line| match line {
        Ok(line) => Some(line.into_bytes()),
        Err(e) => {
            read_error = Some(e);
            None
        }
    });
    let staged = log.staging().stage(stream, lines)?;

    if let Some(e) = read_error {
        log.staging().discard(staged)?;
        return Err(e.into());
    }

    let committed = log.staging().import(&staged)?;
    info!(
        "Imported {} events into stream '{}'",
        committed.records, committed.stream
    );
    println!(
        "{} events at {}..{}",
        committed.records, committed.range.start, committed.range.end
    );
    Ok(())
}
