//! FleetOps Patch Lambda
//!
//! Handles patch tasks, patches, patch templates, and device activations:
//! - POST /patchTasks - Create patch task
//! - GET /patchTasks/{task_id} - Get task with its patches
//! - GET /devices/{device_id}/patches - List a device's patches
//! - GET /patches?associationId=... - Find patch by SSM association
//! - GET /patches/{patch_id} - Get patch
//! - DELETE /patches/{patch_id} - Delete patch
//! - POST /patchTemplates - Create or update template
//! - GET /patchTemplates - List templates
//! - GET /patchTemplates/{name} - Get template
//! - GET /patchTemplates/{name}/versions/{version} - Get version snapshot
//! - DELETE /patchTemplates/{name} - Delete template and versions
//! - POST /activations - Create device activation
//! - GET /activations/{activation_id} - Get activation
//! - DELETE /activations/{activation_id} - Delete activation

use aws_config::BehaviorVersion;
use fleetops_core::{
    validation, CreateActivationRequest, CreatePatchTaskRequest, DeviceActivation, DevicePatch,
    Error, ErrorResponse, FleetStore, PatchListResponse, PatchStatus, PatchTask,
    PatchTaskMessage, PatchTaskResponse, SaveTemplateRequest, TemplateKind, TemplateListResponse,
};
use lambda_http::{run, service_fn, Body, Error as LambdaError, Request, RequestExt, Response};
use serde::Serialize;
use tracing::{error, info};

const QUEUE_URL_ENV: &str = "FLEETOPS_QUEUE_URL";
const ACTIVATION_ROLE_ENV: &str = "FLEETOPS_ACTIVATION_ROLE";

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
}

struct Clients {
    store: FleetStore,
    ssm: aws_sdk_ssm::Client,
    sqs: aws_sdk_sqs::Client,
}

async fn handler(event: Request) -> Result<Response<Body>, LambdaError> {
    let method = event.method().as_str();
    let path = event.uri().path().to_string();

    info!(method = %method, path = %path, "Processing patch request");

    // Initialize AWS clients
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let clients = Clients {
        store: FleetStore::new(aws_sdk_dynamodb::Client::new(&config)),
        ssm: aws_sdk_ssm::Client::new(&config),
        sqs: aws_sdk_sqs::Client::new(&config),
    };

    // Extract path parameters if present
    let path_params = event.path_parameters();
    let task_id = path_params.first("task_id").map(|s| s.to_string());
    let device_id = path_params.first("device_id").map(|s| s.to_string());
    let patch_id = path_params.first("patch_id").map(|s| s.to_string());
    let name = path_params.first("name").map(|s| s.to_string());
    let activation_id = path_params.first("activation_id").map(|s| s.to_string());

    // Route based on method and path
    match (method, path.as_str()) {
        // POST /patchTasks - Create patch task
        ("POST", "/patchTasks") => {
            let body = parse_body(&event)?;
            if let Err(e) = validation::patch_task(&body) {
                return error_response(e);
            }
            let req: CreatePatchTaskRequest = serde_json::from_value(body)?;

            match create_patch_task(&clients, req).await {
                Ok(response) => json_response(202, &response),
                Err(e) => error_response(e),
            }
        }

        // GET /patchTasks/{task_id} - Get task with patches
        ("GET", p) if p.starts_with("/patchTasks/") => {
            let task_id = task_id.ok_or("Missing task_id")?;

            match get_patch_task(&clients.store, &task_id).await {
                Ok(response) => json_response(200, &response),
                Err(e) => error_response(e),
            }
        }

        // GET /devices/{device_id}/patches - List patches for a device
        ("GET", p) if p.starts_with("/devices/") && p.ends_with("/patches") => {
            let device_id = device_id.ok_or("Missing device_id")?;

            let query_params = event.query_string_parameters();
            let status = match query_params.first("status") {
                Some(raw) => match parse_status(raw) {
                    Ok(status) => Some(status),
                    Err(e) => return error_response(e),
                },
                None => None,
            };
            let count: i32 = query_params
                .first("count")
                .and_then(|s| s.parse().ok())
                .unwrap_or(25);
            let token = query_params.first("exclusiveStart").map(|s| s.to_string());

            match clients
                .store
                .list_device_patches(&device_id, status, count, token.as_deref())
                .await
            {
                Ok(page) => json_response(
                    200,
                    &PatchListResponse {
                        patches: page.items,
                        next_token: page.next_token,
                    },
                ),
                Err(e) => error_response(e),
            }
        }

        // GET /patches?associationId=... - Find patch by SSM association
        ("GET", "/patches") => {
            let query_params = event.query_string_parameters();
            let Some(association_id) = query_params.first("associationId") else {
                return error_response(Error::Validation("associationId is required".to_string()));
            };

            match clients.store.get_patch_by_association(association_id).await {
                Ok(patch) => json_response(200, &patch),
                Err(e) => error_response(e),
            }
        }

        // GET /patchTemplates/{name}/versions/{version} - Get version snapshot
        ("GET", p) if p.starts_with("/patchTemplates/") && p.contains("/versions/") => {
            let name = name.ok_or("Missing name")?;
            let version: u32 = path_params
                .first("version")
                .and_then(|s| s.parse().ok())
                .ok_or("Missing version")?;

            match clients
                .store
                .get_template_version(TemplateKind::Patch, &name, version)
                .await
            {
                Ok(template) => json_response(200, &template),
                Err(e) => error_response(e),
            }
        }

        // GET /patches/{patch_id} - Get patch
        ("GET", p) if p.starts_with("/patches/") => {
            let patch_id = patch_id.ok_or("Missing patch_id")?;

            match clients.store.get_patch(&patch_id).await {
                Ok(patch) => json_response(200, &patch),
                Err(e) => error_response(e),
            }
        }

        // DELETE /patches/{patch_id} - Delete patch
        ("DELETE", p) if p.starts_with("/patches/") => {
            let patch_id = patch_id.ok_or("Missing patch_id")?;

            match clients.store.delete_patch(&patch_id).await {
                Ok(_) => json_response(200, &DeleteResponse { success: true }),
                Err(e) => error_response(e),
            }
        }

        // POST /patchTemplates - Create or update template
        ("POST", "/patchTemplates") => {
            let body = parse_body(&event)?;
            if let Err(e) = validation::template(&body) {
                return error_response(e);
            }
            let req: SaveTemplateRequest = serde_json::from_value(body)?;
            let created = req.name.clone();

            match clients.store.save_template(TemplateKind::Patch, req).await {
                Ok(template) => {
                    let status = if template.version == 1 { 201 } else { 200 };
                    info!(name = %created, version = template.version, "Saved patch template");
                    json_response(status, &template)
                }
                Err(e) => error_response(e),
            }
        }

        // GET /patchTemplates - List templates
        ("GET", "/patchTemplates") => match clients.store.list_templates(TemplateKind::Patch).await
        {
            Ok(templates) => json_response(200, &TemplateListResponse { templates }),
            Err(e) => error_response(e),
        },

        // GET /patchTemplates/{name} - Get template
        ("GET", p) if p.starts_with("/patchTemplates/") => {
            let name = name.ok_or("Missing name")?;

            match clients.store.get_template(TemplateKind::Patch, &name).await {
                Ok(template) => json_response(200, &template),
                Err(e) => error_response(e),
            }
        }

        // DELETE /patchTemplates/{name} - Delete template and its versions
        ("DELETE", p) if p.starts_with("/patchTemplates/") => {
            let name = name.ok_or("Missing name")?;

            match clients.store.delete_template(TemplateKind::Patch, &name).await {
                Ok(_) => json_response(200, &DeleteResponse { success: true }),
                Err(e) => error_response(e),
            }
        }

        // POST /activations - Create device activation
        ("POST", "/activations") => {
            let body = parse_body(&event)?;
            if let Err(e) = validation::activation(&body) {
                return error_response(e);
            }
            let req: CreateActivationRequest = serde_json::from_value(body)?;

            match create_activation(&clients, req).await {
                Ok(activation) => json_response(201, &activation),
                Err(e) => error_response(e),
            }
        }

        // GET /activations/{activation_id} - Get activation
        ("GET", p) if p.starts_with("/activations/") => {
            let activation_id = activation_id.ok_or("Missing activation_id")?;

            match clients.store.get_activation(&activation_id).await {
                Ok(activation) => json_response(200, &activation),
                Err(e) => error_response(e),
            }
        }

        // DELETE /activations/{activation_id} - Delete activation
        ("DELETE", p) if p.starts_with("/activations/") => {
            let activation_id = activation_id.ok_or("Missing activation_id")?;

            match delete_activation(&clients, &activation_id).await {
                Ok(_) => json_response(200, &DeleteResponse { success: true }),
                Err(e) => error_response(e),
            }
        }

        // Not found
        _ => Ok(Response::builder()
            .status(404)
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(&ErrorResponse::new(
                "NOT_FOUND",
                "Endpoint not found",
            ))?))?),
    }
}

/// Create the task, its patch rows, and enqueue it for the deployer.
async fn create_patch_task(
    clients: &Clients,
    req: CreatePatchTaskRequest,
) -> Result<PatchTaskResponse, Error> {
    // Every referenced template must exist and be enabled.
    let mut checked: Vec<&str> = Vec::new();
    for entry in &req.patches {
        if checked.contains(&entry.patch_type.as_str()) {
            continue;
        }
        let template = clients
            .store
            .get_template(TemplateKind::Patch, &entry.patch_type)
            .await?;
        if !template.enabled {
            return Err(Error::Validation(format!(
                "template {} is disabled",
                template.name
            )));
        }
        checked.push(&entry.patch_type);
    }

    let task = PatchTask::new(req.patches.len() as u32);
    let patches: Vec<DevicePatch> = req
        .patches
        .iter()
        .map(|entry| DevicePatch::from_request(&task.task_id, entry))
        .collect();

    clients.store.create_patch_task(&task, &patches).await?;

    let queue_url = std::env::var(QUEUE_URL_ENV)
        .map_err(|_| Error::Internal(format!("{} not set", QUEUE_URL_ENV)))?;
    let message = serde_json::to_string(&PatchTaskMessage {
        task_id: task.task_id.clone(),
    })?;

    clients
        .sqs
        .send_message()
        .queue_url(queue_url)
        .message_body(message)
        .send()
        .await
        .map_err(|e| Error::Internal(format!("enqueue failed: {}", e)))?;

    info!(task_id = %task.task_id, patches = patches.len(), "Created patch task");

    Ok(PatchTaskResponse { task, patches })
}

async fn get_patch_task(store: &FleetStore, task_id: &str) -> Result<PatchTaskResponse, Error> {
    let task = store.get_patch_task(task_id).await?;
    let patches = store.get_task_patches(task_id).await?;
    Ok(PatchTaskResponse { task, patches })
}

/// Create the SSM hybrid activation, then persist the row. A device holds at
/// most one activation.
async fn create_activation(
    clients: &Clients,
    req: CreateActivationRequest,
) -> Result<DeviceActivation, Error> {
    if clients
        .store
        .get_activation_by_device(&req.device_id)
        .await
        .is_ok()
    {
        return Err(Error::Conflict(format!(
            "device {} already has an activation",
            req.device_id
        )));
    }

    let iam_role = std::env::var(ACTIVATION_ROLE_ENV)
        .map_err(|_| Error::Internal(format!("{} not set", ACTIVATION_ROLE_ENV)))?;

    let result = clients
        .ssm
        .create_activation()
        .iam_role(iam_role)
        .default_instance_name(&req.device_id)
        .registration_limit(1)
        .send()
        .await
        .map_err(|e| Error::Internal(format!("SSM CreateActivation failed: {}", e)))?;

    let activation = DeviceActivation::new(
        result.activation_id().unwrap_or_default().to_string(),
        req.device_id,
        result.activation_code().unwrap_or_default().to_string(),
        std::env::var("AWS_REGION").unwrap_or_default(),
    );

    clients.store.save_activation(&activation).await?;

    info!(activation_id = %activation.activation_id, device_id = %activation.device_id, "Created activation");

    Ok(activation)
}

/// Revoke the SSM activation, then remove the row.
async fn delete_activation(clients: &Clients, activation_id: &str) -> Result<(), Error> {
    // 404 before touching SSM.
    clients.store.get_activation(activation_id).await?;

    clients
        .ssm
        .delete_activation()
        .activation_id(activation_id)
        .send()
        .await
        .map_err(|e| Error::Internal(format!("SSM DeleteActivation failed: {}", e)))?;

    clients.store.delete_activation(activation_id).await
}

fn parse_body(event: &Request) -> Result<serde_json::Value, LambdaError> {
    let body = event.body();
    let body_str = std::str::from_utf8(body).map_err(|_| "Invalid UTF-8 in body")?;
    Ok(serde_json::from_str(body_str)?)
}

fn parse_status(raw: &str) -> Result<PatchStatus, Error> {
    match raw {
        "scheduled" => Ok(PatchStatus::Scheduled),
        "in_progress" => Ok(PatchStatus::InProgress),
        "complete" => Ok(PatchStatus::Complete),
        "failed" => Ok(PatchStatus::Failed),
        other => Err(Error::Validation(format!("unknown status {}", other))),
    }
}

fn json_response<T: Serialize>(status: u16, body: &T) -> Result<Response<Body>, LambdaError> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(body)?))?)
}

fn error_response(e: Error) -> Result<Response<Body>, LambdaError> {
    error!(error = %e, "Request failed");
    let status = e.status_code();
    let body = ErrorResponse::new(e.code(), e.to_string());
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body)?))?)
}

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    run(service_fn(handler)).await
}
