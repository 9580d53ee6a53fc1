//! Group, group version, and association rows
//!
//! | pk           | sk                | si1Sort                  | si2Hash            |
//! |--------------|-------------------|--------------------------|--------------------|
//! | Group:{name} | META              |                          |                    |
//! | Group:{name} | GroupVersion:{n}  |                          |                    |
//! | Group:{name} | Device:{deviceId} | GroupAssociation:{name}  | GroupTask:{taskId} |

use aws_sdk_dynamodb::types::AttributeValue;
use serde_dynamo::from_item;

use super::{FleetStore, Page, ATTR_PK, ATTR_SI1_SORT, ATTR_SI2_HASH, ATTR_SK, GSI1_NAME};
use crate::cursor;
use crate::errors::{Error, Result};
use crate::keys::{decode, CompositeKey, RecordType, META_SK};
use crate::models::{Group, GroupAssociation, GroupVersion};

impl FleetStore {
    /// Persist a new group. Fails with `Conflict` if the name is taken.
    pub async fn create_group(&self, group: &Group) -> Result<()> {
        let mut item = Self::to_row(group)?;
        item.insert(
            ATTR_PK.to_string(),
            AttributeValue::S(CompositeKey::of(RecordType::Group).seg(&group.name).encode()),
        );
        item.insert(ATTR_SK.to_string(), AttributeValue::S(META_SK.to_string()));

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(pk)")
            .send()
            .await
            .map_err(|e| {
                Error::from_dynamo(e.to_string(), &format!("group {} already exists", group.name))
            })?;

        Ok(())
    }

    /// Get a group by name.
    pub async fn get_group(&self, name: &str) -> Result<Group> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(
                ATTR_PK,
                AttributeValue::S(CompositeKey::of(RecordType::Group).seg(name).encode()),
            )
            .key(ATTR_SK, AttributeValue::S(META_SK.to_string()))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        match result.item {
            Some(item) => from_item(item).map_err(|e| Error::DynamoSerialization(e.to_string())),
            None => Err(Error::NotFound(format!("group {}", name))),
        }
    }

    /// Rewrite a group's current row.
    pub async fn update_group(&self, group: &Group) -> Result<()> {
        let mut item = Self::to_row(group)?;
        item.insert(
            ATTR_PK.to_string(),
            AttributeValue::S(CompositeKey::of(RecordType::Group).seg(&group.name).encode()),
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

    /// Write an immutable membership snapshot row.
    pub async fn save_group_version(&self, version: &GroupVersion) -> Result<()> {
        let mut item = Self::to_row(version)?;
        item.insert(
            ATTR_PK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::Group)
                    .seg(&version.group_name)
                    .encode(),
            ),
        );
        item.insert(
            ATTR_SK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::GroupVersion)
                    .seg(version.version)
                    .encode(),
            ),
        );

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// Get one membership snapshot.
    pub async fn get_group_version(&self, name: &str, version: u32) -> Result<GroupVersion> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(
                ATTR_PK,
                AttributeValue::S(CompositeKey::of(RecordType::Group).seg(name).encode()),
            )
            .key(
                ATTR_SK,
                AttributeValue::S(
                    CompositeKey::of(RecordType::GroupVersion).seg(version).encode(),
                ),
            )
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        match result.item {
            Some(item) => from_item(item).map_err(|e| Error::DynamoSerialization(e.to_string())),
            None => Err(Error::NotFound(format!("group version {}@{}", name, version))),
        }
    }

    /// Persist a device-to-group association. Fails with `Conflict` if the
    /// device is already associated.
    pub async fn save_association(&self, association: &GroupAssociation) -> Result<()> {
        let mut item = Self::to_row(association)?;
        item.insert(
            ATTR_PK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::Group)
                    .seg(&association.group_name)
                    .encode(),
            ),
        );
        item.insert(
            ATTR_SK.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::Device)
                    .seg(&association.device_id)
                    .encode(),
            ),
        );
        item.insert(
            ATTR_SI1_SORT.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::GroupAssociation)
                    .seg(&association.group_name)
                    .encode(),
            ),
        );
        item.insert(
            ATTR_SI2_HASH.to_string(),
            AttributeValue::S(
                CompositeKey::of(RecordType::GroupTask)
                    .seg(&association.task_id)
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
                    &format!(
                        "device {} is already in group {}",
                        association.device_id, association.group_name
                    ),
                )
            })?;

        Ok(())
    }

    /// Get an association, if the device is in the group.
    pub async fn get_association(
        &self,
        group_name: &str,
        device_id: &str,
    ) -> Result<Option<GroupAssociation>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(
                ATTR_PK,
                AttributeValue::S(CompositeKey::of(RecordType::Group).seg(group_name).encode()),
            )
            .key(
                ATTR_SK,
                AttributeValue::S(CompositeKey::of(RecordType::Device).seg(device_id).encode()),
            )
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        match result.item {
            Some(item) => Ok(Some(
                from_item(item).map_err(|e| Error::DynamoSerialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// List the devices associated with a group.
    pub async fn list_group_devices(
        &self,
        group_name: &str,
        limit: i32,
        token: Option<&str>,
    ) -> Result<Page<String>> {
        let pk = CompositeKey::of(RecordType::Group).seg(group_name).encode();
        let prefix = CompositeKey::of(RecordType::Device).encode();

        let mut query = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("pk = :pk AND begins_with(sk, :prefix)")
            .expression_attribute_values(":pk", AttributeValue::S(pk))
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

        let devices = result
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| {
                let association: GroupAssociation = from_item(item).ok()?;
                Some(association.device_id)
            })
            .collect();

        Ok(Page {
            items: devices,
            next_token,
        })
    }

    /// List the groups a device is associated with.
    pub async fn list_device_groups(
        &self,
        device_id: &str,
        limit: i32,
        token: Option<&str>,
    ) -> Result<Page<String>> {
        let sk = CompositeKey::of(RecordType::Device).seg(device_id).encode();
        let prefix = CompositeKey::of(RecordType::GroupAssociation).encode();

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

        // The group name is the second segment of the si1Sort projection.
        let groups = result
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| {
                let si1_sort = item.get(ATTR_SI1_SORT)?.as_s().ok()?.clone();
                decode(&si1_sort).get(1).map(|name| name.to_string())
            })
            .collect();

        Ok(Page {
            items: groups,
            next_token,
        })
    }
}
