//! Single-table DynamoDB access for FleetOps
//!
//! Every entity shares one table. Rows are addressed by composite keys from
//! [`crate::keys`]; secondary access paths are GSI projections of the same
//! encoding, never scans (template listing excepted, which prefix-filters a
//! scan the same way it did upstream).
//!
//! - `sk-si1Sort-index` (GSI1): hash `sk`, range `si1Sort`. "Items owned by
//!   X whose si1Sort begins with EntityType:secondaryValue".
//! - `si2Hash-sk-index` (GSI2): hash `si2Hash`, range `sk`. Exact-match
//!   secondary lookups (patch by association id, deployments by task id).

mod activations;
mod batch;
mod groups;
mod patches;
mod tasks;
mod templates;

pub use templates::TemplateKind;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::errors::{Error, Result};

/// DynamoDB table name (from environment)
const TABLE_NAME_ENV: &str = "FLEETOPS_TABLE";
const DEFAULT_TABLE_NAME: &str = "fleetops";

/// Key attribute names
pub const ATTR_PK: &str = "pk";
pub const ATTR_SK: &str = "sk";
pub const ATTR_SI1_SORT: &str = "si1Sort";
pub const ATTR_SI2_HASH: &str = "si2Hash";

/// Index names
pub const GSI1_NAME: &str = "sk-si1Sort-index";
pub const GSI2_NAME: &str = "si2Hash-sk-index";

/// One page of a listing, with the continuation token for the next page.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// DynamoDB client for FleetOps operations
pub struct FleetStore {
    client: Client,
    table_name: String,
}

impl FleetStore {
    /// Create a new store client
    pub fn new(client: Client) -> Self {
        let table_name =
            std::env::var(TABLE_NAME_ENV).unwrap_or_else(|_| DEFAULT_TABLE_NAME.to_string());
        Self { client, table_name }
    }

    /// Create with explicit table name (for testing)
    pub fn with_table_name(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    /// Serialize a record into a row, ready for key insertion.
    fn to_row<T: Serialize>(record: &T) -> Result<HashMap<String, AttributeValue>> {
        serde_dynamo::to_item(record).map_err(|e| Error::DynamoSerialization(e.to_string()))
    }
}
