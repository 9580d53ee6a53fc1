//! Domain models for FleetOps
//!
//! These types represent the core entities in the system:
//! - Activations: SSM hybrid activations held by edge devices
//! - Patches: per-device patch executions grouped under a patch task
//! - Templates: versioned patch/group definitions
//! - Groups: device groups with versioned membership snapshots
//! - Tasks: batch operations with aggregated status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Status of a single device patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    Scheduled,
    InProgress,
    Complete,
    Failed,
}

impl PatchStatus {
    /// The wire tag used inside `si1Sort` key segments.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchStatus::Scheduled => "scheduled",
            PatchStatus::InProgress => "in_progress",
            PatchStatus::Complete => "complete",
            PatchStatus::Failed => "failed",
        }
    }
}

/// Aggregated status of a batch task (patch task or group task)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Scheduled,
    InProgress,
    Complete,
    PartialFailure,
    Failed,
}

impl TaskStatus {
    /// Fold per-device outcomes into the task status.
    pub fn from_counts(total: u32, success: u32, failure: u32) -> Self {
        if success + failure == 0 {
            TaskStatus::Scheduled
        } else if success + failure < total {
            TaskStatus::InProgress
        } else if failure == 0 {
            TaskStatus::Complete
        } else if success == 0 {
            TaskStatus::Failed
        } else {
            TaskStatus::PartialFailure
        }
    }
}

/// Status of a per-device deployment inside a group task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Scheduled,
    InProgress,
    Success,
    Failure,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Scheduled => "scheduled",
            DeploymentStatus::InProgress => "in_progress",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failure => "failure",
        }
    }
}

// =============================================================================
// Activations
// =============================================================================

/// SSM hybrid activation held by a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceActivation {
    /// Activation id issued by SSM
    pub activation_id: String,
    /// Device owning the activation
    pub device_id: String,
    /// One-time registration code
    pub activation_code: String,
    /// Region the activation was created in
    pub activation_region: String,
    /// When the activation was created
    pub created_at: DateTime<Utc>,
}

impl DeviceActivation {
    pub fn new(
        activation_id: String,
        device_id: String,
        activation_code: String,
        activation_region: String,
    ) -> Self {
        Self {
            activation_id,
            device_id,
            activation_code,
            activation_region,
            created_at: Utc::now(),
        }
    }
}

/// Request to create an activation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateActivationRequest {
    /// Device the activation is for
    pub device_id: String,
}

// =============================================================================
// Patches and patch tasks
// =============================================================================

/// A patch execution against one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePatch {
    /// Unique patch identifier
    pub patch_id: String,
    /// Target device
    pub device_id: String,
    /// Patch template the execution follows
    pub patch_type: String,
    /// Task this patch belongs to
    pub task_id: String,
    /// Current status
    pub status: PatchStatus,
    /// SSM State Manager association driving the patch, once created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub association_id: Option<String>,
    /// Extra variables merged into the template's playbook
    #[serde(default)]
    pub extra_vars: HashMap<String, String>,
    /// Failure detail, when status is failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DevicePatch {
    /// Build a scheduled patch from one task request entry.
    pub fn from_request(task_id: &str, entry: &PatchRequestEntry) -> Self {
        let now = Utc::now();
        Self {
            patch_id: Uuid::new_v4().to_string(),
            device_id: entry.device_id.clone(),
            patch_type: entry.patch_type.clone(),
            task_id: task_id.to_string(),
            status: PatchStatus::Scheduled,
            association_id: None,
            extra_vars: entry.extra_vars.clone(),
            status_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One device entry in a patch task request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRequestEntry {
    pub device_id: String,
    /// Patch template name
    pub patch_type: String,
    #[serde(default)]
    pub extra_vars: HashMap<String, String>,
}

/// Request to create a patch task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePatchTaskRequest {
    pub patches: Vec<PatchRequestEntry>,
}

/// Patch task summary row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchTask {
    pub task_id: String,
    /// Number of device patches in the task
    pub patch_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatchTask {
    pub fn new(patch_count: u32) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            patch_count,
            success_count: 0,
            failure_count: 0,
            status: TaskStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }
}

/// SQS message enqueued per patch task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchTaskMessage {
    pub task_id: String,
}

/// Response for task creation and task reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchTaskResponse {
    pub task: PatchTask,
    pub patches: Vec<DevicePatch>,
}

/// Paged patch listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchListResponse {
    pub patches: Vec<DevicePatch>,
    /// Opaque continuation token, present when more results exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// A versioned patch or group template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Template name (alphanumeric, hyphens, underscores)
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// S3 key of the install payload (playbook or group config source)
    pub payload_key: String,
    /// Current version, starting at 1 and bumped on every update
    pub version: u32,
    pub enabled: bool,
    /// Default extra variables applied to every execution
    #[serde(default)]
    pub extra_vars: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn new(req: SaveTemplateRequest) -> Self {
        let now = Utc::now();
        Self {
            name: req.name,
            description: req.description,
            payload_key: req.payload_key,
            version: 1,
            enabled: req.enabled,
            extra_vars: req.extra_vars,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an update, bumping the version. The name never changes.
    pub fn apply(&mut self, req: SaveTemplateRequest) {
        self.description = req.description;
        self.payload_key = req.payload_key;
        self.enabled = req.enabled;
        self.extra_vars = req.extra_vars;
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

/// Request to create or update a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveTemplateRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub payload_key: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub extra_vars: HashMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

/// Template listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateListResponse {
    pub templates: Vec<Template>,
}

// =============================================================================
// Groups
// =============================================================================

/// A device group provisioned from a group template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    /// Group template the group was created from
    pub template_name: String,
    /// Template version captured at creation
    pub template_version: u32,
    /// Current group version; bumped whenever membership changes
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: String, template_name: String, template_version: u32) -> Self {
        let now = Utc::now();
        Self {
            name,
            template_name,
            template_version,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request to create a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub template_name: String,
}

/// Immutable membership snapshot written on every group change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupVersion {
    pub group_name: String,
    pub version: u32,
    /// Devices in the group as of this version
    pub devices: Vec<String>,
    /// S3 key of the rendered config artifact
    pub artifact_key: String,
    /// SHA-256 of the artifact, hex-encoded
    pub artifact_checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Device-to-group association row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupAssociation {
    pub group_name: String,
    pub device_id: String,
    /// Group task that created the association
    pub task_id: String,
    pub created_at: DateTime<Utc>,
}

impl GroupAssociation {
    pub fn new(group_name: String, device_id: String, task_id: String) -> Self {
        Self {
            group_name,
            device_id,
            task_id,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Group tasks and deployments
// =============================================================================

/// Request to associate devices with a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupTaskRequest {
    pub group_name: String,
    pub devices: Vec<String>,
}

/// Group task summary row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupTask {
    pub task_id: String,
    pub group_name: String,
    pub device_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupTask {
    pub fn new(group_name: String, device_count: u32) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            group_name,
            device_count,
            success_count: 0,
            failure_count: 0,
            status: TaskStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record one device outcome and refresh the aggregated status.
    pub fn record_outcome(&mut self, success: bool) {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.status =
            TaskStatus::from_counts(self.device_count, self.success_count, self.failure_count);
        self.updated_at = Utc::now();
    }
}

/// One device's deployment inside a group task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDeployment {
    pub deployment_id: String,
    pub task_id: String,
    pub group_name: String,
    pub device_id: String,
    pub status: DeploymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceDeployment {
    pub fn new(task_id: &str, group_name: &str, device_id: &str) -> Self {
        let now = Utc::now();
        Self {
            deployment_id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            group_name: group_name.to_string(),
            device_id: device_id.to_string(),
            status: DeploymentStatus::Scheduled,
            status_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn succeed(&mut self) {
        self.status = DeploymentStatus::Success;
        self.status_message = None;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, message: String) {
        self.status = DeploymentStatus::Failure;
        self.status_message = Some(message);
        self.updated_at = Utc::now();
    }
}

/// Response for group task creation and reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupTaskResponse {
    pub task: GroupTask,
    pub deployments: Vec<DeviceDeployment>,
}

/// Paged device listing for a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDevicesResponse {
    pub devices: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Paged group listing for a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceGroupsResponse {
    pub groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

// =============================================================================
// API error body
// =============================================================================

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_from_counts() {
        assert_eq!(TaskStatus::from_counts(4, 0, 0), TaskStatus::Scheduled);
        assert_eq!(TaskStatus::from_counts(4, 1, 0), TaskStatus::InProgress);
        assert_eq!(TaskStatus::from_counts(4, 4, 0), TaskStatus::Complete);
        assert_eq!(TaskStatus::from_counts(4, 0, 4), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_counts(4, 3, 1), TaskStatus::PartialFailure);
    }

    #[test]
    fn test_group_task_outcome_folding() {
        let mut task = GroupTask::new("edge-west".into(), 2);
        task.record_outcome(true);
        assert_eq!(task.status, TaskStatus::InProgress);
        task.record_outcome(false);
        assert_eq!(task.status, TaskStatus::PartialFailure);
        assert_eq!(task.success_count, 1);
        assert_eq!(task.failure_count, 1);
    }

    #[test]
    fn test_patch_from_request_entry() {
        let entry = PatchRequestEntry {
            device_id: "core-001".into(),
            patch_type: "nginx".into(),
            extra_vars: HashMap::from([("port".into(), "8080".into())]),
        };
        let patch = DevicePatch::from_request("t-1", &entry);
        assert_eq!(patch.device_id, "core-001");
        assert_eq!(patch.patch_type, "nginx");
        assert_eq!(patch.task_id, "t-1");
        assert_eq!(patch.status, PatchStatus::Scheduled);
        assert!(patch.association_id.is_none());
        assert_eq!(patch.extra_vars.get("port").map(String::as_str), Some("8080"));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&PatchStatus::InProgress).unwrap(),
            r#""in_progress""#
        );
        assert_eq!(
            serde_json::to_string(&TaskStatus::PartialFailure).unwrap(),
            r#""partial_failure""#
        );
        assert_eq!(PatchStatus::Complete.as_str(), "complete");
    }

    #[test]
    fn test_save_template_request_defaults() {
        let json = r#"{"name": "nginx", "payload_key": "playbooks/nginx.yml"}"#;
        let req: SaveTemplateRequest = serde_json::from_str(json).unwrap();
        assert!(req.enabled);
        assert!(req.extra_vars.is_empty());
        assert!(req.description.is_none());
    }

    #[test]
    fn test_template_apply_bumps_version() {
        let mut template = Template::new(SaveTemplateRequest {
            name: "nginx".into(),
            description: None,
            payload_key: "playbooks/nginx.yml".into(),
            enabled: true,
            extra_vars: HashMap::new(),
        });
        assert_eq!(template.version, 1);
        template.apply(SaveTemplateRequest {
            name: "nginx".into(),
            description: Some("tls enabled".into()),
            payload_key: "playbooks/nginx-tls.yml".into(),
            enabled: true,
            extra_vars: HashMap::new(),
        });
        assert_eq!(template.version, 2);
        assert_eq!(template.payload_key, "playbooks/nginx-tls.yml");
    }

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("NOT_FOUND", "Not found: patch p-1");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("NOT_FOUND"));
        assert!(json.contains("Not found: patch p-1"));
        assert!(!json.contains("details"));
    }
}
