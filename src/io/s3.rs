//! S3-backed [`ObjectStore`] implementation.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

use crate::error::{LoadError, Result};

use super::ObjectStore;

#[derive(Clone)]
pub struct S3Store {
    client: Arc<S3Client>,
}

impl S3Store {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Arc::new(S3Client::new(config)),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|err| {
                LoadError::storage_read(format!(
                    "list s3://{bucket}/{prefix}: {}",
                    DisplayErrorContext(&err)
                ))
            })?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated() == Some(true) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                LoadError::storage_read(format!(
                    "get s3://{bucket}/{key}: {}",
                    DisplayErrorContext(&err)
                ))
            })?;

        let body = response.body.collect().await.map_err(|err| {
            LoadError::storage_read(format!("read body of s3://{bucket}/{key}: {err}"))
        })?;

        Ok(body.into_bytes())
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| {
                LoadError::storage_write(format!(
                    "put s3://{bucket}/{key}: {}",
                    DisplayErrorContext(&err)
                ))
            })?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                LoadError::storage_write(format!(
                    "delete s3://{bucket}/{key}: {}",
                    DisplayErrorContext(&err)
                ))
            })?;
        Ok(())
    }
}
