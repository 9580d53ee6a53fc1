//! Task summary and deployment rows
//!
//! | pk                          | sk                | si1Sort                              | si2Hash            |
//! |-----------------------------|-------------------|--------------------------------------|--------------------|
//! | PatchTask:{taskId}          | META              |                                      |                    |
//! | GroupTask:{taskId}          | META              |                                      |                    |
//! | DeviceDeploymentTask:{id}   | Device:{deviceId} | DeviceDeploymentTask:{status}:{id}   | GroupTask:{taskId} |

use aws_sdk_dynamodb::types::AttributeValue;
use serde_dynamo::from_item;
use std::collections::HashMap;

use super::{FleetStore, ATTR_PK, ATTR_SI1_SORT, ATTR_SI2_HASH, ATTR_SK, GSI2_NAME};
use crate::errors::{Error, Result};
use crate::keys::{CompositeKey, RecordType, META_SK};
use crate::models::{DeviceDeployment, DevicePatch, GroupTask, PatchTask};

impl FleetStore {
    // =========================================================================
    // Patch tasks
    // =========================================================================

    /// Persist a patch task and all its device patches in one batch:
    /// the summary row, one patch row per device, and one membership link
    /// row per patch.
    pub async fn create_patch_task(
        &self,
        task: &PatchTask,
        patches: &[DevicePatch],
    ) -> Result<()> {
        let mut items = Vec::with_capacity(1 + patches.len() * 2);

        let mut summary = Self::to_row(task)?;
        summary.insert(
            ATTR_PK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::PatchTask)
                    .seg(&task.task_id)
                    .encode(),
            ),
        );
        summary.insert(ATTR_SK.to_string(), AttributeValue::S(META_SK.to_string()));
        items.push(summary);

        for patch in patches {
            items.push(Self::patch_row(patch)?);
            items.push(Self::patch_link_row(patch)?);
        }

        self.batch_put_all(items).await
    }

    /// Get a patch task summary.
    pub async fn get_patch_task(&self, task_id: &str) -> Result<PatchTask> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(
                ATTR_PK,
                AttributeValue::S(
                    CompositeKey::of(RecordType::PatchTask).seg(task_id).encode(),
                ),
            )
            .key(ATTR_SK, AttributeValue::S(META_SK.to_string()))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        match result.item {
            Some(item) => from_item(item).map_err(|e| Error::DynamoSerialization(e.to_string())),
            None => Err(Error::NotFound(format!("patch task {}", task_id))),
        }
    }

    /// Rewrite a patch task summary row.
    pub async fn update_patch_task(&self, task: &PatchTask) -> Result<()> {
        let mut item = Self::to_row(task)?;
        item.insert(
            ATTR_PK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::PatchTask)
                    .seg(&task.task_id)
                    .encode(),
            ),
        );
        item.insert(ATTR_SK.to_string(), AttributeValue::S(META_SK.to_string()));

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    // =========================================================================
    // Group tasks and deployments
    // =========================================================================

    /// Persist a group task and its scheduled deployments in one batch.
    pub async fn create_group_task(
        &self,
        task: &GroupTask,
        deployments: &[DeviceDeployment],
    ) -> Result<()> {
        let mut items = Vec::with_capacity(1 + deployments.len());

        let mut summary = Self::to_row(task)?;
        summary.insert(
            ATTR_PK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::GroupTask)
                    .seg(&task.task_id)
                    .encode(),
            ),
        );
        summary.insert(ATTR_SK.to_string(), AttributeValue::S(META_SK.to_string()));
        items.push(summary);

        for deployment in deployments {
            items.push(Self::deployment_row(deployment)?);
        }

        self.batch_put_all(items).await
    }

    /// Get a group task summary.
    pub async fn get_group_task(&self, task_id: &str) -> Result<GroupTask> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(
                ATTR_PK,
                AttributeValue::S(
                    CompositeKey::of(RecordType::GroupTask).seg(task_id).encode(),
                ),
            )
            .key(ATTR_SK, AttributeValue::S(META_SK.to_string()))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        match result.item {
            Some(item) => from_item(item).map_err(|e| Error::DynamoSerialization(e.to_string())),
            None => Err(Error::NotFound(format!("group task {}", task_id))),
        }
    }

    /// Rewrite a group task summary row.
    pub async fn update_group_task(&self, task: &GroupTask) -> Result<()> {
        let mut item = Self::to_row(task)?;
        item.insert(
            ATTR_PK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::GroupTask)
                    .seg(&task.task_id)
                    .encode(),
            ),
        );
        item.insert(ATTR_SK.to_string(), AttributeValue::S(META_SK.to_string()));

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    fn deployment_row(deployment: &DeviceDeployment) -> Result<HashMap<String, AttributeValue>> {
        let mut item = Self::to_row(deployment)?;
        item.insert(
            ATTR_PK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::DeviceDeploymentTask)
                    .seg(&deployment.deployment_id)
                    .encode(),
            ),
        );
        item.insert(
            ATTR_SK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::Device)
                    .seg(&deployment.device_id)
                    .encode(),
            ),
        );
        item.insert(
            ATTR_SI1_SORT.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::DeviceDeploymentTask)
                    .seg(deployment.status.as_str())
                    .seg(&deployment.deployment_id)
                    .encode(),
            ),
        );
        item.insert(
            ATTR_SI2_HASH.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::GroupTask)
                    .seg(&deployment.task_id)
                    .encode(),
            ),
        );
        Ok(item)
    }

    /// Rewrite one deployment row, refreshing its key projections.
    pub async fn update_deployment(&self, deployment: &DeviceDeployment) -> Result<()> {
        let item = Self::deployment_row(deployment)?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// List all deployments belonging to a group task.
    pub async fn get_task_deployments(&self, task_id: &str) -> Result<Vec<DeviceDeployment>> {
        let si2_hash = CompositeKey::of(RecordType::GroupTask).seg(task_id).encode();

        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(GSI2_NAME)
            .key_condition_expression("si2Hash = :si2")
            .expression_attribute_values(":si2", AttributeValue::S(si2_hash))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let deployments = result
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| from_item(item).ok())
            .collect();

        Ok(deployments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of(item: &HashMap<String, AttributeValue>, attr: &str) -> String {
        item.get(attr).unwrap().as_s().unwrap().clone()
    }

    #[test]
    fn test_deployment_row_key_projections() {
        let deployment = DeviceDeployment::new("t-7", "edge-west", "core-001");
        let row = FleetStore::deployment_row(&deployment).unwrap();
        assert_eq!(
            key_of(&row, ATTR_PK),
            format!("DeviceDeploymentTask:{}", deployment.deployment_id)
        );
        assert_eq!(key_of(&row, ATTR_SK), "Device:core-001");
        assert_eq!(
            key_of(&row, ATTR_SI1_SORT),
            format!("DeviceDeploymentTask:scheduled:{}", deployment.deployment_id)
        );
        assert_eq!(key_of(&row, ATTR_SI2_HASH), "GroupTask:t-7");
    }
}
