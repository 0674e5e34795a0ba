//! # streamlog core
//!
//! Append-only event log for streamlog.
//!
//! This crate provides:
//! - [`StorageOffset`] positions that order every committed record
//! - Single-event appends on a low-latency path
//! - Large batches committed atomically through a stage/import pipeline
//! - Resumable, snapshot-bounded reads
//! - Two backend drivers: a local directory and a cloud-style blob container
//!
//! Offsets are assigned by the backend driver at commit time and never by
//! callers. Readers only ever see committed records.
//!
//! ## Example
//!
//! ```rust
//! use streamlog_core::{EventLogClient, StorageOffset};
//!
//! let log = EventLogClient::in_memory().unwrap();
//! log.write_event("orders", b"order placed").unwrap();
//! log.write_events_in_large_batch("orders", vec![b"a".to_vec(), b"b".to_vec()]).unwrap();
//!
//! let records: Vec<_> = log
//!     .read_all_events(StorageOffset::ZERO, None)
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(records.len(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod client;
mod config;
pub mod driver;
mod error;
mod offset;
mod reader;
pub mod record;
mod retry;
mod staging;

pub use batch::{BatchId, BatchManifest, ImportOutcome, StagedEntry};
pub use client::EventLogClient;
pub use config::{BackendConfig, BlobEndpoint, Config, DEFAULT_CONTAINER};
pub use driver::{BackendKind, BlobLogDriver, DriverInfo, FileLogDriver, LogDriver};
pub use error::{ErrorContext, ErrorKind, LogError, LogResult, Operation};
pub use offset::{OffsetRange, StorageOffset};
pub use reader::RecordReader;
pub use record::{RecordForStaging, RetrievedRecord};
pub use retry::{RetryHandle, RetryPolicy};
pub use staging::{CommittedBatch, StagedBatch, StagingPipeline};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
