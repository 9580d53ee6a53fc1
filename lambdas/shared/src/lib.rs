//! FleetOps Core Library
//!
//! Shared functionality for FleetOps Lambda functions including:
//! - Composite key codec and record types
//! - Domain models
//! - Single-table DynamoDB operations
//! - Pagination cursors and request validation
//! - The device-association pipeline

pub mod cursor;
pub mod errors;
pub mod keys;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod validation;

pub use errors::{Error, Result};
pub use keys::{CompositeKey, RecordType, KEY_DELIMITER, META_SK};
pub use models::*;
pub use pipeline::AssociationPipeline;
pub use store::{FleetStore, Page, TemplateKind};
