//! Device patch rows
//!
//! | pk                   | sk                  | si1Sort                        | si2Hash                       |
//! |----------------------|---------------------|--------------------------------|-------------------------------|
//! | DevicePatch:{id}     | Device:{deviceId}   | DevicePatch:{status}:{id}      | DevicePatch:{associationId}   |
//! | PatchTask:{taskId}   | DevicePatch:{id}    |                                |                               |
//!
//! The second shape is the task-membership link row; the patch itself is
//! re-fetched through it by full key. `si2Hash` is only present once the
//! deployer has created the SSM association.

use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};
use serde_dynamo::from_item;
use std::collections::HashMap;

use super::{FleetStore, Page, ATTR_PK, ATTR_SI1_SORT, ATTR_SI2_HASH, ATTR_SK, GSI1_NAME, GSI2_NAME};
use crate::cursor;
use crate::errors::{Error, Result};
use crate::keys::{CompositeKey, RecordType};
use crate::models::{DevicePatch, PatchStatus};

/// Task-membership link row payload.
#[derive(Debug, Serialize, Deserialize)]
struct PatchLink {
    patch_id: String,
    device_id: String,
}

impl FleetStore {
    /// Build the table row for a patch, with all key projections.
    pub(crate) fn patch_row(patch: &DevicePatch) -> Result<HashMap<String, AttributeValue>> {
        let mut item = Self::to_row(patch)?;
        item.insert(
            ATTR_PK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::DevicePatch)
                    .seg(&patch.patch_id)
                    .encode(),
            ),
        );
        item.insert(
            ATTR_SK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::Device)
                    .seg(&patch.device_id)
                    .encode(),
            ),
        );
        item.insert(
            ATTR_SI1_SORT.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::DevicePatch)
                    .seg(patch.status.as_str())
                    .seg(&patch.patch_id)
                    .encode(),
            ),
        );
        if let Some(association_id) = &patch.association_id {
            item.insert(
                ATTR_SI2_HASH.to_string(),
                AttributeValue::S(
                    CompositeKey::of(RecordType::DevicePatch)
                        .seg(association_id)
                        .encode(),
                ),
            );
        }
        Ok(item)
    }

    /// Build the task-membership link row for a patch.
    pub(crate) fn patch_link_row(patch: &DevicePatch) -> Result<HashMap<String, AttributeValue>> {
        let link = PatchLink {
            patch_id: patch.patch_id.clone(),
            device_id: patch.device_id.clone(),
        };
        let mut item = Self::to_row(&link)?;
        item.insert(
            ATTR_PK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::PatchTask)
                    .seg(&patch.task_id)
                    .encode(),
            ),
        );
        item.insert(
            ATTR_SK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::DevicePatch)
                    .seg(&patch.patch_id)
                    .encode(),
            ),
        );
        Ok(item)
    }

    /// Write one patch row, refreshing its key projections. Status and
    /// association changes go through here.
    pub async fn save_patch(&self, patch: &DevicePatch) -> Result<()> {
        let item = Self::patch_row(patch)?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// Get a patch by its id.
    pub async fn get_patch(&self, patch_id: &str) -> Result<DevicePatch> {
        let pk = CompositeKey::of(RecordType::DevicePatch)
            .seg(patch_id)
            .encode();

        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("pk = :pk")
            .expression_attribute_values(":pk", AttributeValue::S(pk))
            .limit(1)
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        match result.items.unwrap_or_default().into_iter().next() {
            Some(item) => from_item(item).map_err(|e| Error::DynamoSerialization(e.to_string())),
            None => Err(Error::NotFound(format!("patch {}", patch_id))),
        }
    }

    /// List a device's patches, optionally filtered to one status.
    pub async fn list_device_patches(
        &self,
        device_id: &str,
        status: Option<PatchStatus>,
        limit: i32,
        token: Option<&str>,
    ) -> Result<Page<DevicePatch>> {
        let sk = CompositeKey::of(RecordType::Device).seg(device_id).encode();
        let prefix = match status {
            Some(status) => CompositeKey::of(RecordType::DevicePatch)
                .seg(status.as_str())
                .encode(),
            None => CompositeKey::of(RecordType::DevicePatch).encode(),
        };

        let mut query = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(GSI1_NAME)
            .key_condition_expression("sk = :sk AND begins_with(si1Sort, :prefix)")
            .expression_attribute_values(":sk", AttributeValue::S(sk))
            .expression_attribute_values(":prefix", AttributeValue::S(prefix))
            .limit(limit);

        if let Some(token) = token {
            query = query.set_exclusive_start_key(Some(cursor::decode_token(token)?));
        }

        let result = query
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let next_token = match result.last_evaluated_key {
            Some(key) => Some(cursor::encode_token(&key)?),
            None => None,
        };

        let patches = result
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| from_item(item).ok())
            .collect();

        Ok(Page {
            items: patches,
            next_token,
        })
    }

    /// Find the patch driven by an SSM association.
    pub async fn get_patch_by_association(&self, association_id: &str) -> Result<DevicePatch> {
        let si2_hash = CompositeKey::of(RecordType::DevicePatch)
            .seg(association_id)
            .encode();

        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(GSI2_NAME)
            .key_condition_expression("si2Hash = :si2")
            .expression_attribute_values(":si2", AttributeValue::S(si2_hash))
            .limit(1)
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        match result.items.unwrap_or_default().into_iter().next() {
            Some(item) => from_item(item).map_err(|e| Error::DynamoSerialization(e.to_string())),
            None => Err(Error::NotFound(format!("association {}", association_id))),
        }
    }

    /// Load all patches belonging to a task, via the link rows.
    pub async fn get_task_patches(&self, task_id: &str) -> Result<Vec<DevicePatch>> {
        let pk = CompositeKey::of(RecordType::PatchTask).seg(task_id).encode();
        let prefix = CompositeKey::of(RecordType::DevicePatch).encode();

        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("pk = :pk AND begins_with(sk, :prefix)")
            .expression_attribute_values(":pk", AttributeValue::S(pk))
            .expression_attribute_values(":prefix", AttributeValue::S(prefix))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let links: Vec<PatchLink> = result
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| from_item(item).ok())
            .collect();

        let keys = links
            .iter()
            .map(|link| {
                HashMap::from([
                    (
                        ATTR_PK.to_string(),
                        AttributeValue::S(
                            CompositeKey::of(RecordType::DevicePatch)
                                .seg(&link.patch_id)
                                .encode(),
                        ),
                    ),
                    (
                        ATTR_SK.to_string(),
                        AttributeValue::S(
                            CompositeKey::of(RecordType::Device)
                                .seg(&link.device_id)
                                .encode(),
                        ),
                    ),
                ])
            })
            .collect();

        let patches = self
            .batch_get_all(keys)
            .await?
            .into_iter()
            .filter_map(|item| from_item(item).ok())
            .collect();

        Ok(patches)
    }

    /// Delete a patch row and its task-membership link.
    pub async fn delete_patch(&self, patch_id: &str) -> Result<()> {
        let patch = self.get_patch(patch_id).await?;

        let patch_key = HashMap::from([
            (
                ATTR_PK.to_string(),
                AttributeValue::S(
                    CompositeKey::of(RecordType::DevicePatch)
                        .seg(&patch.patch_id)
                        .encode(),
                ),
            ),
            (
                ATTR_SK.to_string(),
                AttributeValue::S(
                    CompositeKey::of(RecordType::Device)
                        .seg(&patch.device_id)
                        .encode(),
                ),
            ),
        ]);
        let link_key = HashMap::from([
            (
                ATTR_PK.to_string(),
                AttributeValue::S(
                    CompositeKey::of(RecordType::PatchTask)
                        .seg(&patch.task_id)
                        .encode(),
                ),
            ),
            (
                ATTR_SK.to_string(),
                AttributeValue::S(
                    CompositeKey::of(RecordType::DevicePatch)
                        .seg(&patch.patch_id)
                        .encode(),
                ),
            ),
        ]);

        self.batch_delete_all(vec![patch_key, link_key]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatchStatus;
    use chrono::Utc;

    fn sample_patch() -> DevicePatch {
        let now = Utc::now();
        DevicePatch {
            patch_id: "p-1".into(),
            device_id: "core-001".into(),
            patch_type: "nginx".into(),
            task_id: "t-1".into(),
            status: PatchStatus::Scheduled,
            association_id: None,
            extra_vars: HashMap::new(),
            status_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn key_of(item: &HashMap<String, AttributeValue>, attr: &str) -> String {
        item.get(attr).unwrap().as_s().unwrap().clone()
    }

    #[test]
    fn test_patch_row_key_projections() {
        let row = FleetStore::patch_row(&sample_patch()).unwrap();
        assert_eq!(key_of(&row, ATTR_PK), "DevicePatch:p-1");
        assert_eq!(key_of(&row, ATTR_SK), "Device:core-001");
        assert_eq!(key_of(&row, ATTR_SI1_SORT), "DevicePatch:scheduled:p-1");
        assert!(row.get(ATTR_SI2_HASH).is_none());
    }

    #[test]
    fn test_patch_row_projects_association_to_si2() {
        let mut patch = sample_patch();
        patch.association_id = Some("assoc-9".into());
        patch.status = PatchStatus::InProgress;
        let row = FleetStore::patch_row(&patch).unwrap();
        assert_eq!(key_of(&row, ATTR_SI1_SORT), "DevicePatch:in_progress:p-1");
        assert_eq!(key_of(&row, ATTR_SI2_HASH), "DevicePatch:assoc-9");
    }

    #[test]
    fn test_patch_link_row_keys() {
        let row = FleetStore::patch_link_row(&sample_patch()).unwrap();
        assert_eq!(key_of(&row, ATTR_PK), "PatchTask:t-1");
        assert_eq!(key_of(&row, ATTR_SK), "DevicePatch:p-1");
        assert_eq!(key_of(&row, "patch_id"), "p-1");
        assert_eq!(key_of(&row, "device_id"), "core-001");
    }
}
