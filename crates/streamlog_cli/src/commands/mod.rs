//! CLI command implementations.

pub mod flood;
pub mod import;
pub mod inspect;
pub mod read;
pub mod write;
