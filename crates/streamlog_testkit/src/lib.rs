//! # streamlog testkit
//!
//! Test utilities for streamlog.
//!
//! This crate provides:
//! - Temporary logs on every backend
//! - Fault-injecting byte and blob stores
//! - Flood-write stress harness and the basic correctness scenario
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use streamlog_testkit::prelude::*;
//!
//! #[test]
//! fn writes_on_every_backend() {
//!     for_each_backend(|log| {
//!         log.write_event("s", b"x").unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fault;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fault::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fault::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
