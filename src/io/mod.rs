//! Object-storage abstraction.
//!
//! The loader talks to storage through [`ObjectStore`] so the batch driver
//! and the warehouse loader can be exercised against an in-memory
//! implementation in tests.

pub mod s3;

pub use s3::S3Store;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Byte-level object storage operations used by the loader.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every key under `prefix`, in listing order.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    /// Fetch the full body of one object.
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Write the full body of one object in a single put.
    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<()>;

    /// Delete one object.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}
