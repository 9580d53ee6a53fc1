//! Activation rows
//!
//! | pk                      | sk                | si1Sort               |
//! |-------------------------|-------------------|-----------------------|
//! | DeviceActivation:{id}   | Device:{deviceId} | DeviceActivation:{id} |

use aws_sdk_dynamodb::types::AttributeValue;
use serde_dynamo::from_item;

use super::{FleetStore, ATTR_PK, ATTR_SI1_SORT, ATTR_SK, GSI1_NAME};
use crate::errors::{Error, Result};
use crate::keys::{CompositeKey, RecordType};
use crate::models::DeviceActivation;

impl FleetStore {
    /// Persist a new activation. Fails with `Conflict` if the activation id
    /// already exists.
    pub async fn save_activation(&self, activation: &DeviceActivation) -> Result<()> {
        let mut item = Self::to_row(activation)?;
        item.insert(
            ATTR_PK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::DeviceActivation)
                    .seg(&activation.activation_id)
                    .encode(),
            ),
        );
        item.insert(
            ATTR_SK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::Device)
                    .seg(&activation.device_id)
                    .encode(),
            ),
        );
        item.insert(
            ATTR_SI1_SORT.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::DeviceActivation)
                    .seg(&activation.activation_id)
                    .encode(),
            ),
        );

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(pk)")
            .send()
            .await
            .map_err(|e| {
                Error::from_dynamo(
                    e.to_string(),
                    &format!("activation {} already exists", activation.activation_id),
                )
            })?;

        Ok(())
    }

    /// Get an activation by its id.
    pub async fn get_activation(&self, activation_id: &str) -> Result<DeviceActivation> {
        let pk = CompositeKey::of(RecordType::DeviceActivation)
            .seg(activation_id)
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
            None => Err(Error::NotFound(format!("activation {}", activation_id))),
        }
    }

    /// Get the activation held by a device, if any.
    pub async fn get_activation_by_device(
        &self,
        device_id: &str,
    ) -> Result<DeviceActivation> {
        let sk = CompositeKey::of(RecordType::Device).seg(device_id).encode();
        let prefix = CompositeKey::of(RecordType::DeviceActivation).encode();

        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(GSI1_NAME)
            .key_condition_expression("sk = :sk AND begins_with(si1Sort, :prefix)")
            .expression_attribute_values(":sk", AttributeValue::S(sk))
            .expression_attribute_values(":prefix", AttributeValue::S(prefix))
            .limit(1)
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        match result.items.unwrap_or_default().into_iter().next() {
            Some(item) => from_item(item).map_err(|e| Error::DynamoSerialization(e.to_string())),
            None => Err(Error::DeviceActivationNotFound(device_id.to_string())),
        }
    }

    /// Delete an activation by id.
    pub async fn delete_activation(&self, activation_id: &str) -> Result<()> {
        let activation = self.get_activation(activation_id).await?;

        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(
                ATTR_PK,
                AttributeValue::S(
                    CompositeKey::of(RecordType::DeviceActivation)
                        .seg(activation_id)
                        .encode(),
                ),
            )
            .key(
                ATTR_SK,
                AttributeValue::S(
                    CompositeKey::of(RecordType::Device)
                        .seg(&activation.device_id)
                        .encode(),
                ),
            )
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }
}
