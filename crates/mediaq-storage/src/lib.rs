//! Object store client for derived media artifacts.
//!
//! This crate provides:
//! - The `ObjectStore` seam used by the job processor
//! - An S3-compatible implementation (MinIO, R2, AWS)
//! - An in-memory implementation for tests and local runs

pub mod client;
pub mod error;
pub mod memory;
pub mod store;

pub use client::{S3Config, S3ObjectStore};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryObjectStore;
pub use store::{content_type_for, ObjectStore};
