//! Batched writes and reads
//!
//! DynamoDB batch calls are partial-failure: unprocessed items come back in
//! the response and must be re-driven. Re-drives are bounded; anything still
//! unprocessed afterwards surfaces as `SAVE_FAILED`/`DELETE_FAILED`.

use aws_sdk_dynamodb::types::{
    AttributeValue, DeleteRequest, KeysAndAttributes, PutRequest, WriteRequest,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use super::FleetStore;
use crate::errors::{Error, Result};

/// BatchWriteItem accepts at most 25 requests per call.
const BATCH_WRITE_MAX: usize = 25;
/// BatchGetItem accepts at most 100 keys per call.
const BATCH_GET_MAX: usize = 100;
/// Re-drives of unprocessed items before giving up.
const BATCH_REDRIVES: u32 = 3;

/// Which error an exhausted batch write surfaces as.
#[derive(Debug, Clone, Copy)]
enum BatchKind {
    Put,
    Delete,
}

impl FleetStore {
    /// Write all items, chunked and re-driven.
    pub(crate) async fn batch_put_all(
        &self,
        items: Vec<HashMap<String, AttributeValue>>,
    ) -> Result<()> {
        let mut requests = Vec::with_capacity(items.len());
        for item in items {
            let put = PutRequest::builder()
                .set_item(Some(item))
                .build()
                .map_err(|e| Error::Internal(e.to_string()))?;
            requests.push(WriteRequest::builder().put_request(put).build());
        }
        self.run_batch_write(requests, BatchKind::Put).await
    }

    /// Delete all keys, chunked and re-driven.
    pub(crate) async fn batch_delete_all(
        &self,
        keys: Vec<HashMap<String, AttributeValue>>,
    ) -> Result<()> {
        let mut requests = Vec::with_capacity(keys.len());
        for key in keys {
            let delete = DeleteRequest::builder()
                .set_key(Some(key))
                .build()
                .map_err(|e| Error::Internal(e.to_string()))?;
            requests.push(WriteRequest::builder().delete_request(delete).build());
        }
        self.run_batch_write(requests, BatchKind::Delete).await
    }

    async fn run_batch_write(&self, requests: Vec<WriteRequest>, kind: BatchKind) -> Result<()> {
        for chunk in requests.chunks(BATCH_WRITE_MAX) {
            let mut pending = chunk.to_vec();
            let mut attempts = 0;

            while !pending.is_empty() {
                let result = self
                    .client
                    .batch_write_item()
                    .request_items(&self.table_name, pending)
                    .send()
                    .await
                    .map_err(|e| Error::from_dynamo(e.to_string(), "batch write"))?;

                pending = result
                    .unprocessed_items
                    .unwrap_or_default()
                    .remove(&self.table_name)
                    .unwrap_or_default();

                if pending.is_empty() {
                    break;
                }

                attempts += 1;
                if attempts > BATCH_REDRIVES {
                    let message = format!(
                        "{} items unprocessed after {} attempts",
                        pending.len(),
                        attempts
                    );
                    return Err(match kind {
                        BatchKind::Put => Error::SaveFailed(message),
                        BatchKind::Delete => Error::DeleteFailed(message),
                    });
                }
                warn!(
                    unprocessed = pending.len(),
                    attempt = attempts,
                    "Re-driving unprocessed batch items"
                );
                tokio::time::sleep(Duration::from_millis(100 << attempts)).await;
            }
        }
        Ok(())
    }

    /// Fetch all keys, chunked and re-driven. Missing keys are simply absent
    /// from the result.
    pub(crate) async fn batch_get_all(
        &self,
        keys: Vec<HashMap<String, AttributeValue>>,
    ) -> Result<Vec<HashMap<String, AttributeValue>>> {
        let mut items = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(BATCH_GET_MAX) {
            let mut pending = chunk.to_vec();
            let mut attempts = 0;

            while !pending.is_empty() {
                let request = KeysAndAttributes::builder()
                    .set_keys(Some(pending))
                    .build()
                    .map_err(|e| Error::Internal(e.to_string()))?;

                let result = self
                    .client
                    .batch_get_item()
                    .request_items(&self.table_name, request)
                    .send()
                    .await
                    .map_err(|e| Error::from_dynamo(e.to_string(), "batch get"))?;

                if let Some(mut responses) = result.responses {
                    if let Some(found) = responses.remove(&self.table_name) {
                        items.extend(found);
                    }
                }

                pending = result
                    .unprocessed_keys
                    .unwrap_or_default()
                    .remove(&self.table_name)
                    .map(|ka| ka.keys)
                    .unwrap_or_default();

                if pending.is_empty() {
                    break;
                }

                attempts += 1;
                if attempts > BATCH_REDRIVES {
                    return Err(Error::Database(format!(
                        "{} keys unprocessed after {} attempts",
                        pending.len(),
                        attempts
                    )));
                }
                tokio::time::sleep(Duration::from_millis(100 << attempts)).await;
            }
        }

        Ok(items)
    }
}
