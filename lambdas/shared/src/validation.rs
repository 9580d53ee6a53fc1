//! Request body validation
//!
//! Mutation bodies are checked against JSON Schemas before deserialization,
//! so malformed input surfaces as `VALIDATION_ERROR`/400 with the offending
//! path instead of a serde parse error.

use jsonschema::Validator;
use serde_json::{json, Value};
use std::sync::LazyLock;

use crate::errors::{Error, Result};

/// Names shared by templates, groups, and devices.
const NAME_PATTERN: &str = "^[A-Za-z0-9_-]+$";

static PATCH_TASK_SCHEMA: LazyLock<Validator> = LazyLock::new(|| {
    compile(json!({
        "type": "object",
        "required": ["patches"],
        "properties": {
            "patches": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["device_id", "patch_type"],
                    "properties": {
                        "device_id": { "type": "string", "minLength": 1 },
                        "patch_type": { "type": "string", "pattern": NAME_PATTERN },
                        "extra_vars": {
                            "type": "object",
                            "additionalProperties": { "type": "string" }
                        }
                    }
                }
            }
        }
    }))
});

static TEMPLATE_SCHEMA: LazyLock<Validator> = LazyLock::new(|| {
    compile(json!({
        "type": "object",
        "required": ["name", "payload_key"],
        "properties": {
            "name": { "type": "string", "pattern": NAME_PATTERN },
            "description": { "type": "string" },
            "payload_key": { "type": "string", "minLength": 1 },
            "enabled": { "type": "boolean" },
            "extra_vars": {
                "type": "object",
                "additionalProperties": { "type": "string" }
            }
        }
    }))
});

static GROUP_SCHEMA: LazyLock<Validator> = LazyLock::new(|| {
    compile(json!({
        "type": "object",
        "required": ["name", "template_name"],
        "properties": {
            "name": { "type": "string", "pattern": NAME_PATTERN },
            "template_name": { "type": "string", "pattern": NAME_PATTERN }
        }
    }))
});

static GROUP_TASK_SCHEMA: LazyLock<Validator> = LazyLock::new(|| {
    compile(json!({
        "type": "object",
        "required": ["group_name", "devices"],
        "properties": {
            "group_name": { "type": "string", "pattern": NAME_PATTERN },
            "devices": {
                "type": "array",
                "minItems": 1,
                "items": { "type": "string", "minLength": 1 }
            }
        }
    }))
});

static ACTIVATION_SCHEMA: LazyLock<Validator> = LazyLock::new(|| {
    compile(json!({
        "type": "object",
        "required": ["device_id"],
        "properties": {
            "device_id": { "type": "string", "minLength": 1 }
        }
    }))
});

fn compile(schema: Value) -> Validator {
    jsonschema::validator_for(&schema).expect("schema is valid")
}

fn check(validator: &Validator, body: &Value) -> Result<()> {
    validator
        .validate(body)
        .map_err(|e| Error::Validation(e.to_string()))
}

/// Validate a `POST /patchTasks` body.
pub fn patch_task(body: &Value) -> Result<()> {
    check(&PATCH_TASK_SCHEMA, body)
}

/// Validate a template create/update body.
pub fn template(body: &Value) -> Result<()> {
    check(&TEMPLATE_SCHEMA, body)
}

/// Validate a `POST /groups` body.
pub fn group(body: &Value) -> Result<()> {
    check(&GROUP_SCHEMA, body)
}

/// Validate a `POST /groupTasks` body.
pub fn group_task(body: &Value) -> Result<()> {
    check(&GROUP_TASK_SCHEMA, body)
}

/// Validate a `POST /activations` body.
pub fn activation(body: &Value) -> Result<()> {
    check(&ACTIVATION_SCHEMA, body)
}
