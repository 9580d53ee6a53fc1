//! FleetOps API client for testing

use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// API client for the patch and provisioning services
pub struct FleetOpsClient {
    client: Client,
    base_url: String,
}

// Request/Response types

#[derive(Debug, Clone, Serialize)]
pub struct SaveTemplateRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub payload_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub extra_vars: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub name: String,
    pub description: Option<String>,
    pub payload_key: String,
    pub version: u32,
    pub enabled: bool,
    pub extra_vars: HashMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateListResponse {
    pub templates: Vec<Template>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateActivationRequest {
    pub device_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceActivation {
    pub activation_id: String,
    pub device_id: String,
    pub activation_code: String,
    pub activation_region: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchRequestEntry {
    pub device_id: String,
    pub patch_type: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub extra_vars: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePatchTaskRequest {
    pub patches: Vec<PatchRequestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevicePatch {
    pub patch_id: String,
    pub device_id: String,
    pub patch_type: String,
    pub task_id: String,
    pub status: String,
    pub association_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchTask {
    pub task_id: String,
    pub patch_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchTaskResponse {
    pub task: PatchTask,
    pub patches: Vec<DevicePatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchListResponse {
    pub patches: Vec<DevicePatch>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub template_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub name: String,
    pub template_name: String,
    pub template_version: u32,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateGroupTaskRequest {
    pub group_name: String,
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceDeployment {
    pub deployment_id: String,
    pub task_id: String,
    pub group_name: String,
    pub device_id: String,
    pub status: String,
    pub status_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupTask {
    pub task_id: String,
    pub group_name: String,
    pub device_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupTaskResponse {
    pub task: GroupTask,
    pub deployments: Vec<DeviceDeployment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupDevicesResponse {
    pub devices: Vec<String>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// Result type for API responses
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// HTTP error with status code and body
    Http { status: StatusCode, body: String },
    /// Network or serialization error
    Request(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            ApiError::Request(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl FleetOpsClient {
    /// Create a new client with the given base URL
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a client from environment variable
    pub fn from_env() -> Self {
        let base_url = std::env::var("FLEETOPS_API_URL")
            .expect("FLEETOPS_API_URL environment variable not set");
        Self::new(&base_url)
    }

    // =========================================================================
    // Patch Templates
    // =========================================================================

    pub async fn save_patch_template(&self, req: &SaveTemplateRequest) -> ApiResult<Template> {
        self.post("/patchTemplates", req).await
    }

    pub async fn list_patch_templates(&self) -> ApiResult<TemplateListResponse> {
        self.get("/patchTemplates").await
    }

    pub async fn get_patch_template(&self, name: &str) -> ApiResult<Template> {
        self.get(&format!("/patchTemplates/{}", name)).await
    }

    pub async fn delete_patch_template(&self, name: &str) -> ApiResult<DeleteResponse> {
        self.delete(&format!("/patchTemplates/{}", name)).await
    }

    // =========================================================================
    // Activations
    // =========================================================================

    pub async fn create_activation(&self, device_id: &str) -> ApiResult<DeviceActivation> {
        let req = CreateActivationRequest {
            device_id: device_id.to_string(),
        };
        self.post("/activations", &req).await
    }

    pub async fn get_activation(&self, activation_id: &str) -> ApiResult<DeviceActivation> {
        self.get(&format!("/activations/{}", activation_id)).await
    }

    pub async fn delete_activation(&self, activation_id: &str) -> ApiResult<DeleteResponse> {
        self.delete(&format!("/activations/{}", activation_id)).await
    }

    // =========================================================================
    // Patch Tasks and Patches
    // =========================================================================

    pub async fn create_patch_task(
        &self,
        req: &CreatePatchTaskRequest,
    ) -> ApiResult<PatchTaskResponse> {
        self.post("/patchTasks", req).await
    }

    pub async fn get_patch_task(&self, task_id: &str) -> ApiResult<PatchTaskResponse> {
        self.get(&format!("/patchTasks/{}", task_id)).await
    }

    pub async fn get_patch(&self, patch_id: &str) -> ApiResult<DevicePatch> {
        self.get(&format!("/patches/{}", patch_id)).await
    }

    pub async fn list_device_patches(
        &self,
        device_id: &str,
        status: Option<&str>,
    ) -> ApiResult<PatchListResponse> {
        let path = match status {
            Some(s) => format!("/devices/{}/patches?status={}", device_id, s),
            None => format!("/devices/{}/patches", device_id),
        };
        self.get(&path).await
    }

    pub async fn delete_patch(&self, patch_id: &str) -> ApiResult<DeleteResponse> {
        self.delete(&format!("/patches/{}", patch_id)).await
    }

    // =========================================================================
    // Group Templates, Groups, and Group Tasks
    // =========================================================================

    pub async fn save_group_template(&self, req: &SaveTemplateRequest) -> ApiResult<Template> {
        self.post("/groupTemplates", req).await
    }

    pub async fn delete_group_template(&self, name: &str) -> ApiResult<DeleteResponse> {
        self.delete(&format!("/groupTemplates/{}", name)).await
    }

    pub async fn create_group(&self, req: &CreateGroupRequest) -> ApiResult<Group> {
        self.post("/groups", req).await
    }

    pub async fn get_group(&self, name: &str) -> ApiResult<Group> {
        self.get(&format!("/groups/{}", name)).await
    }

    pub async fn list_group_devices(&self, name: &str) -> ApiResult<GroupDevicesResponse> {
        self.get(&format!("/groups/{}/devices", name)).await
    }

    pub async fn create_group_task(
        &self,
        req: &CreateGroupTaskRequest,
    ) -> ApiResult<GroupTaskResponse> {
        self.post("/groupTasks", req).await
    }

    pub async fn get_group_task(&self, task_id: &str) -> ApiResult<GroupTaskResponse> {
        self.get(&format!("/groupTasks/{}", task_id)).await
    }

    // =========================================================================
    // HTTP Helpers
    // =========================================================================

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> ApiResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| ApiError::Request(e.to_string()))
        } else {
            Err(ApiError::Http { status, body })
        }
    }
}
