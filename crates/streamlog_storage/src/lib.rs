//! # streamlog storage
//!
//! Storage primitives for the streamlog event log.
//!
//! This crate is the lowest layer of the workspace. Everything it stores is
//! **opaque**: it knows nothing about events, offsets, stream tags or staged
//! batches. The log drivers in `streamlog_core` own all layout decisions.
//!
//! Two families of stores are provided:
//!
//! - **Byte stores** ([`StorageBackend`]) - a single growable file-like
//!   region with append, positional read, sync and truncate. Used by the
//!   local-filesystem log driver.
//! - **Blob stores** ([`BlobStore`]) - a cloud-object-store-shaped namespace
//!   with whole-object uploads, ranged reads, prefix listing and
//!   version-conditional writes. Used by the cloud-blob log driver. Adapters
//!   for real cloud SDKs implement this trait.
//!
//! ## Available Stores
//!
//! - [`FileBackend`] - byte store on an OS file
//! - [`InMemoryBackend`] - byte store in memory, for tests
//! - [`DirectoryBlobStore`] - blob store emulated on a directory tree
//! - [`InMemoryBlobStore`] - blob store in memory
//!
//! ## Example
//!
//! ```rust
//! use streamlog_storage::{BlobStore, InMemoryBlobStore, PutCondition};
//!
//! let store = InMemoryBlobStore::new();
//! store.put("log/head", b"pointer", PutCondition::IfAbsent).unwrap();
//! assert_eq!(store.get("log/head").unwrap().unwrap().data, b"pointer");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod blob;
mod blob_dir;
mod blob_memory;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use blob::{validate_blob_name, Blob, BlobMeta, BlobStore, BlobVersion, PutCondition};
pub use blob_dir::DirectoryBlobStore;
pub use blob_memory::InMemoryBlobStore;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
