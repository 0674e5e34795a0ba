//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random log workloads.

use proptest::prelude::*;
use streamlog_core::EventLogClient;

/// Strategy for generating valid stream tags.
pub fn stream_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating payloads, including empty ones.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for generating batches of up to `max_len` payloads.
pub fn batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload_strategy(), 0..=max_len)
}

/// One write against the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// A single event.
    Single {
        /// Stream tag.
        stream: String,
        /// Payload.
        payload: Vec<u8>,
    },
    /// A large batch.
    Batch {
        /// Stream tag.
        stream: String,
        /// Payloads in submission order.
        payloads: Vec<Vec<u8>>,
    },
}

impl WriteOp {
    /// Number of records this op commits.
    pub fn record_count(&self) -> usize {
        match self {
            Self::Single { .. } => 1,
            Self::Batch { payloads, .. } => payloads.len(),
        }
    }

    /// Applies the op and returns the `(stream, payload)` pairs it
    /// committed, in commit order.
    pub fn apply(&self, log: &EventLogClient) -> Vec<(String, Vec<u8>)> {
        match self {
            Self::Single { stream, payload } => {
                log.write_event(stream, payload).expect("Failed to write event");
                vec![(stream.clone(), payload.clone())]
            }
            Self::Batch { stream, payloads } => {
                log.write_events_in_large_batch(stream, payloads.clone())
                    .expect("Failed to write batch");
                payloads
                    .iter()
                    .map(|p| (stream.clone(), p.clone()))
                    .collect()
            }
        }
    }
}

/// Strategy for generating one write op.
pub fn write_op_strategy() -> impl Strategy<Value = WriteOp> {
    prop_oneof![
        3 => (stream_name_strategy(), payload_strategy())
            .prop_map(|(stream, payload)| WriteOp::Single { stream, payload }),
        1 => (stream_name_strategy(), batch_strategy(40))
            .prop_map(|(stream, payloads)| WriteOp::Batch { stream, payloads }),
    ]
}

/// Strategy for generating a workload of up to `max_ops` writes.
pub fn workload_strategy(max_ops: usize) -> impl Strategy<Value = Vec<WriteOp>> {
    prop::collection::vec(write_op_strategy(), 1..=max_ops)
}
