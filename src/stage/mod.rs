//! Columnar staging. A batch is encoded as snappy-compressed Parquet and
//! uploaded whole to the staging bucket, so readers never observe a partial
//! artifact.

mod encode;

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::frame::Frame;
use crate::io::ObjectStore;

pub struct ParquetStager {
    store: Arc<dyn ObjectStore>,
}

impl ParquetStager {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Encode the batch and upload it to `bucket/key` in a single put.
    pub async fn stage(&self, batch: &Frame, bucket: &str, key: &str) -> Result<()> {
        let body = encode::to_parquet(batch)?;
        self.store.put(bucket, key, Bytes::from(body)).await
    }
}
