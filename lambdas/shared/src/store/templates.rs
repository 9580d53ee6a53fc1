//! Template rows
//!
//! The current definition lives under the `META` sentinel; every save also
//! writes an immutable version snapshot row.
//!
//! | pk                    | sk                        |
//! |-----------------------|---------------------------|
//! | PatchTemplate:{name}  | META                      |
//! | PatchTemplate:{name}  | PatchTemplateVersion:{n}  |
//! | GroupTemplate:{name}  | META                      |
//! | GroupTemplate:{name}  | GroupTemplateVersion:{n}  |

use aws_sdk_dynamodb::types::AttributeValue;
use serde_dynamo::from_item;
use std::collections::HashMap;

use super::{FleetStore, ATTR_PK, ATTR_SK};
use crate::errors::{Error, Result};
use crate::keys::{CompositeKey, RecordType, META_SK};
use crate::models::{SaveTemplateRequest, Template};

/// Which template family a call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Patch,
    Group,
}

impl TemplateKind {
    fn record_type(&self) -> RecordType {
        match self {
            TemplateKind::Patch => RecordType::PatchTemplate,
            TemplateKind::Group => RecordType::GroupTemplate,
        }
    }

    fn version_type(&self) -> RecordType {
        match self {
            TemplateKind::Patch => RecordType::PatchTemplateVersion,
            TemplateKind::Group => RecordType::GroupTemplateVersion,
        }
    }
}

impl FleetStore {
    /// Create or update a template. A first save writes version 1; every
    /// further save applies the request to the current definition, bumps the
    /// version, and snapshots it.
    pub async fn save_template(
        &self,
        kind: TemplateKind,
        req: SaveTemplateRequest,
    ) -> Result<Template> {
        let template = match self.find_template(kind, &req.name).await? {
            Some(mut current) => {
                current.apply(req);
                current
            }
            None => Template::new(req),
        };

        let pk = CompositeKey::of(kind.record_type())
            .seg(&template.name)
            .encode();

        let mut current_row = Self::to_row(&template)?;
        current_row.insert(ATTR_PK.to_string(), AttributeValue::S(pk.clone()));
        current_row.insert(ATTR_SK.to_string(), AttributeValue::S(META_SK.to_string()));

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(current_row))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut version_row = Self::to_row(&template)?;
        version_row.insert(ATTR_PK.to_string(), AttributeValue::S(pk));
        version_row.insert(
            ATTR_SK.to_string(),
            AttributeValue::S(
                CompositeKey::of(kind.version_type())
                    .seg(template.version)
                    .encode(),
            ),
        );

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(version_row))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(template)
    }

    /// Get the current definition of a template.
    pub async fn get_template(&self, kind: TemplateKind, name: &str) -> Result<Template> {
        self.find_template(kind, name)
            .await?
            .ok_or_else(|| Error::TemplateNotFound(name.to_string()))
    }

    async fn find_template(&self, kind: TemplateKind, name: &str) -> Result<Option<Template>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(
                ATTR_PK,
                AttributeValue::S(CompositeKey::of(kind.record_type()).seg(name).encode()),
            )
            .key(ATTR_SK, AttributeValue::S(META_SK.to_string()))
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

    /// Get one version snapshot of a template.
    pub async fn get_template_version(
        &self,
        kind: TemplateKind,
        name: &str,
        version: u32,
    ) -> Result<Template> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(
                ATTR_PK,
                AttributeValue::S(CompositeKey::of(kind.record_type()).seg(name).encode()),
            )
            .key(
                ATTR_SK,
                AttributeValue::S(CompositeKey::of(kind.version_type()).seg(version).encode()),
            )
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        match result.item {
            Some(item) => from_item(item).map_err(|e| Error::DynamoSerialization(e.to_string())),
            None => Err(Error::TemplateNotFound(format!("{}@{}", name, version))),
        }
    }

    /// List current template definitions.
    ///
    /// Scan with a key-prefix filter: template listing is the one read with
    /// no secondary attribute to project, matching the upstream behavior.
    pub async fn list_templates(&self, kind: TemplateKind) -> Result<Vec<Template>> {
        let prefix = format!("{}{}", kind.record_type(), crate::keys::KEY_DELIMITER);

        let result = self
            .client
            .scan()
            .table_name(&self.table_name)
            .filter_expression("begins_with(pk, :prefix) AND sk = :meta")
            .expression_attribute_values(":prefix", AttributeValue::S(prefix))
            .expression_attribute_values(":meta", AttributeValue::S(META_SK.to_string()))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let templates = result
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| from_item(item).ok())
            .collect();

        Ok(templates)
    }

    /// Delete a template's current row and all its version snapshots.
    pub async fn delete_template(&self, kind: TemplateKind, name: &str) -> Result<()> {
        // Verify it exists so deletion of an unknown name is a 404.
        self.get_template(kind, name).await?;

        let pk = CompositeKey::of(kind.record_type()).seg(name).encode();

        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("pk = :pk")
            .expression_attribute_values(":pk", AttributeValue::S(pk.clone()))
            .send()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let keys: Vec<HashMap<String, AttributeValue>> = result
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|mut item| {
                let sk = item.remove(ATTR_SK)?;
                Some(HashMap::from([
                    (ATTR_PK.to_string(), AttributeValue::S(pk.clone())),
                    (ATTR_SK.to_string(), sk),
                ]))
            })
            .collect();

        self.batch_delete_all(keys).await
    }
}
