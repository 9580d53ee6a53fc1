//! Composite key codec for the shared FleetOps table
//!
//! Every row in the table is addressed by delimited composite keys built
//! here. The first segment is always a [`RecordType`] tag; the remaining
//! segments are identifiers or sub-discriminators (UUIDs, names, status
//! strings, version numbers). Only the encoded string form is persisted,
//! as `pk`, `sk`, `si1Sort`, or `si2Hash`.
//!
//! | pk                          | sk                        | Purpose              |
//! |-----------------------------|---------------------------|----------------------|
//! | DeviceActivation:{id}       | Device:{deviceId}         | SSM activation       |
//! | DevicePatch:{patchId}       | Device:{deviceId}         | Patch per device     |
//! | PatchTask:{taskId}          | META                      | Patch task summary   |
//! | PatchTemplate:{name}        | META                      | Current template     |
//! | PatchTemplate:{name}        | PatchTemplateVersion:{n}  | Version snapshot     |
//! | Group:{name}                | META                      | Device group         |
//! | Group:{name}                | GroupVersion:{n}          | Membership snapshot  |
//! | Group:{name}                | Device:{deviceId}         | Association          |
//! | GroupTask:{taskId}          | META                      | Group task summary   |
//! | DeviceDeploymentTask:{id}   | Device:{deviceId}         | Deployment per device|

use serde::{Deserialize, Serialize};

/// Delimiter joining key segments.
pub const KEY_DELIMITER: char = ':';

/// Sentinel sort key for singleton sub-records (summaries, current versions).
pub const META_SK: &str = "META";

/// Entity-type tags, the first segment of every composite key.
///
/// Closed set: adding an entity kind without wiring its tag here fails to
/// compile at every match site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    DeviceActivation,
    Device,
    DevicePatch,
    PatchTask,
    PatchTemplate,
    PatchTemplateVersion,
    GroupTemplate,
    GroupTemplateVersion,
    Group,
    GroupVersion,
    GroupAssociation,
    GroupTask,
    DeviceDeploymentTask,
}

impl RecordType {
    /// The wire tag stored as the first key segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::DeviceActivation => "DeviceActivation",
            RecordType::Device => "Device",
            RecordType::DevicePatch => "DevicePatch",
            RecordType::PatchTask => "PatchTask",
            RecordType::PatchTemplate => "PatchTemplate",
            RecordType::PatchTemplateVersion => "PatchTemplateVersion",
            RecordType::GroupTemplate => "GroupTemplate",
            RecordType::GroupTemplateVersion => "GroupTemplateVersion",
            RecordType::Group => "Group",
            RecordType::GroupVersion => "GroupVersion",
            RecordType::GroupAssociation => "GroupAssociation",
            RecordType::GroupTask => "GroupTask",
            RecordType::DeviceDeploymentTask => "DeviceDeploymentTask",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for delimited composite keys.
///
/// Segments must not contain the delimiter; the encoder does not check.
/// Numbers are stringified with no padding or fixed width. `encode` is pure:
/// equal segments always yield an identical string, and
/// `encode([T, X])` is a prefix of `encode([T, X, Y])` followed immediately
/// by the delimiter, which is what makes `begins_with` GSI queries correct.
#[derive(Debug, Clone)]
pub struct CompositeKey {
    segments: Vec<String>,
}

impl CompositeKey {
    /// Start a key with its type discriminator.
    pub fn of(record_type: RecordType) -> Self {
        Self {
            segments: vec![record_type.as_str().to_string()],
        }
    }

    /// Append a segment. Accepts anything displayable (ids, names, status
    /// strings, version numbers).
    pub fn seg(mut self, segment: impl std::fmt::Display) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    /// Join the segments into the stored string form.
    pub fn encode(&self) -> String {
        self.segments.join(&KEY_DELIMITER.to_string())
    }
}

/// Split a stored key back into its segments, in order.
///
/// Never fails: any string splits. Callers re-parse numeric segments and
/// bounds-check before indexing; a wrong segment count surfaces later as a
/// missing field in the assembled record.
pub fn decode(key: &str) -> Vec<&str> {
    key.split(KEY_DELIMITER).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let segments = ["DeviceActivation", "a1b2", "pending"];
        let encoded = segments.join(":");
        assert_eq!(decode(&encoded), segments);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let a = CompositeKey::of(RecordType::DevicePatch).seg("p-1").encode();
        let b = CompositeKey::of(RecordType::DevicePatch).seg("p-1").encode();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ordering_preserved() {
        let key = CompositeKey::of(RecordType::DevicePatch)
            .seg("failed")
            .seg("p-9")
            .encode();
        let segments = decode(&key);
        assert_eq!(segments[0], "DevicePatch");
        assert_eq!(segments[1], "failed");
        assert_eq!(segments[2], "p-9");
    }

    #[test]
    fn test_prefix_supports_begins_with() {
        let parent = CompositeKey::of(RecordType::PatchTemplate)
            .seg("nginx")
            .encode();
        let child = CompositeKey::of(RecordType::PatchTemplate)
            .seg("nginx")
            .seg("v2")
            .encode();
        assert!(child.starts_with(&format!("{}{}", parent, KEY_DELIMITER)));
    }

    #[test]
    fn test_numeric_segments_unpadded() {
        let key = CompositeKey::of(RecordType::PatchTemplateVersion)
            .seg(7u32)
            .encode();
        assert_eq!(decode(&key), vec!["PatchTemplateVersion", "7"]);
        assert_ne!(decode(&key)[1], "07");
    }

    #[test]
    fn test_activation_key_scenario() {
        let key = CompositeKey::of(RecordType::DeviceActivation)
            .seg("a1b2")
            .encode();
        assert_eq!(key, "DeviceActivation:a1b2");
        assert_eq!(decode("DeviceActivation:a1b2"), vec!["DeviceActivation", "a1b2"]);
    }

    #[test]
    fn test_template_version_key_scenario() {
        let key = CompositeKey::of(RecordType::PatchTemplate)
            .seg("nginx")
            .seg(RecordType::PatchTemplateVersion)
            .seg(3u32)
            .encode();
        assert_eq!(key, "PatchTemplate:nginx:PatchTemplateVersion:3");
    }

    #[test]
    fn test_decode_device_id_segment() {
        assert_eq!(decode("Device:core-001")[1], "core-001");
    }

    #[test]
    fn test_deployment_status_keys_share_type_prefix() {
        // A GSI query with begins_with(si1Sort, "DeviceDeploymentTask") must
        // match rows written for any status and deployment id.
        let prefix = CompositeKey::of(RecordType::DeviceDeploymentTask).encode();
        for status in ["scheduled", "in_progress", "failed"] {
            let si1_sort = CompositeKey::of(RecordType::DeviceDeploymentTask)
                .seg(status)
                .seg("d-42")
                .encode();
            assert!(si1_sort.starts_with(&prefix));
        }
    }

    #[test]
    fn test_record_type_tags() {
        assert_eq!(RecordType::DeviceDeploymentTask.as_str(), "DeviceDeploymentTask");
        assert_eq!(RecordType::Group.to_string(), "Group");
    }
}
