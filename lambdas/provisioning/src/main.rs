//! FleetOps Provisioning Lambda
//!
//! Handles device groups and the association pipeline:
//! - POST /groupTemplates - Create or update group template
//! - GET /groupTemplates - List group templates
//! - GET /groupTemplates/{name} - Get group template
//! - GET /groupTemplates/{name}/versions/{version} - Get version snapshot
//! - DELETE /groupTemplates/{name} - Delete group template and versions
//! - POST /groups - Create group from a template
//! - GET /groups/{name} - Get group
//! - GET /groups/{name}/versions/{version} - Get membership snapshot
//! - GET /groups/{name}/devices - List devices in a group
//! - GET /devices/{device_id}/groups - List a device's groups
//! - POST /groupTasks - Associate devices with a group
//! - GET /groupTasks/{task_id} - Get task with its deployments

use aws_config::BehaviorVersion;
use fleetops_core::{
    validation, AssociationPipeline, CreateGroupRequest, CreateGroupTaskRequest, DeviceDeployment,
    DeviceGroupsResponse, Error, ErrorResponse, FleetStore, Group, GroupDevicesResponse,
    GroupTask, GroupTaskResponse, SaveTemplateRequest, TemplateKind, TemplateListResponse,
};
use lambda_http::{run, service_fn, Body, Error as LambdaError, Request, RequestExt, Response};
use serde::Serialize;
use tracing::{error, info};

const ARTIFACT_BUCKET_ENV: &str = "FLEETOPS_ARTIFACT_BUCKET";

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
}

async fn handler(event: Request) -> Result<Response<Body>, LambdaError> {
    let method = event.method().as_str();
    let path = event.uri().path().to_string();

    info!(method = %method, path = %path, "Processing provisioning request");

    // Initialize AWS clients
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let store = FleetStore::new(aws_sdk_dynamodb::Client::new(&config));
    let s3 = aws_sdk_s3::Client::new(&config);

    // Extract path parameters if present
    let path_params = event.path_parameters();
    let name = path_params.first("name").map(|s| s.to_string());
    let device_id = path_params.first("device_id").map(|s| s.to_string());
    let task_id = path_params.first("task_id").map(|s| s.to_string());

    // Route based on method and path
    match (method, path.as_str()) {
        // POST /groupTemplates - Create or update group template
        ("POST", "/groupTemplates") => {
            let body = parse_body(&event)?;
            if let Err(e) = validation::template(&body) {
                return error_response(e);
            }
            let req: SaveTemplateRequest = serde_json::from_value(body)?;

            match store.save_template(TemplateKind::Group, req).await {
                Ok(template) => {
                    let status = if template.version == 1 { 201 } else { 200 };
                    json_response(status, &template)
                }
                Err(e) => error_response(e),
            }
        }

        // GET /groupTemplates - List group templates
        ("GET", "/groupTemplates") => match store.list_templates(TemplateKind::Group).await {
            Ok(templates) => json_response(200, &TemplateListResponse { templates }),
            Err(e) => error_response(e),
        },

        // GET /groupTemplates/{name}/versions/{version} - Get version snapshot
        ("GET", p) if p.starts_with("/groupTemplates/") && p.contains("/versions/") => {
            let name = name.ok_or("Missing name")?;
            let version: u32 = path_params
                .first("version")
                .and_then(|s| s.parse().ok())
                .ok_or("Missing version")?;

            match store
                .get_template_version(TemplateKind::Group, &name, version)
                .await
            {
                Ok(template) => json_response(200, &template),
                Err(e) => error_response(e),
            }
        }

        // GET /groupTemplates/{name} - Get group template
        ("GET", p) if p.starts_with("/groupTemplates/") => {
            let name = name.ok_or("Missing name")?;

            match store.get_template(TemplateKind::Group, &name).await {
                Ok(template) => json_response(200, &template),
                Err(e) => error_response(e),
            }
        }

        // DELETE /groupTemplates/{name} - Delete group template and versions
        ("DELETE", p) if p.starts_with("/groupTemplates/") => {
            let name = name.ok_or("Missing name")?;

            match store.delete_template(TemplateKind::Group, &name).await {
                Ok(_) => json_response(200, &DeleteResponse { success: true }),
                Err(e) => error_response(e),
            }
        }

        // POST /groups - Create group from a template
        ("POST", "/groups") => {
            let body = parse_body(&event)?;
            if let Err(e) = validation::group(&body) {
                return error_response(e);
            }
            let req: CreateGroupRequest = serde_json::from_value(body)?;

            match create_group(&store, req).await {
                Ok(group) => json_response(201, &group),
                Err(e) => error_response(e),
            }
        }

        // GET /groups/{name}/versions/{version} - Get membership snapshot
        ("GET", p) if p.starts_with("/groups/") && p.contains("/versions/") => {
            let name = name.ok_or("Missing name")?;
            let version: u32 = path_params
                .first("version")
                .and_then(|s| s.parse().ok())
                .ok_or("Missing version")?;

            match store.get_group_version(&name, version).await {
                Ok(group_version) => json_response(200, &group_version),
                Err(e) => error_response(e),
            }
        }

        // GET /groups/{name} - Get group
        ("GET", p) if p.starts_with("/groups/") && !p.ends_with("/devices") => {
            let name = name.ok_or("Missing name")?;

            match store.get_group(&name).await {
                Ok(group) => json_response(200, &group),
                Err(e) => error_response(e),
            }
        }

        // GET /groups/{name}/devices - List devices in a group
        ("GET", p) if p.starts_with("/groups/") && p.ends_with("/devices") => {
            let name = name.ok_or("Missing name")?;

            let query_params = event.query_string_parameters();
            let count: i32 = query_params
                .first("count")
                .and_then(|s| s.parse().ok())
                .unwrap_or(25);
            let token = query_params.first("exclusiveStart").map(|s| s.to_string());

            match store.list_group_devices(&name, count, token.as_deref()).await {
                Ok(page) => json_response(
                    200,
                    &GroupDevicesResponse {
                        devices: page.items,
                        next_token: page.next_token,
                    },
                ),
                Err(e) => error_response(e),
            }
        }

        // GET /devices/{device_id}/groups - List a device's groups
        ("GET", p) if p.starts_with("/devices/") && p.ends_with("/groups") => {
            let device_id = device_id.ok_or("Missing device_id")?;

            let query_params = event.query_string_parameters();
            let count: i32 = query_params
                .first("count")
                .and_then(|s| s.parse().ok())
                .unwrap_or(25);
            let token = query_params.first("exclusiveStart").map(|s| s.to_string());

            match store
                .list_device_groups(&device_id, count, token.as_deref())
                .await
            {
                Ok(page) => json_response(
                    200,
                    &DeviceGroupsResponse {
                        groups: page.items,
                        next_token: page.next_token,
                    },
                ),
                Err(e) => error_response(e),
            }
        }

        // POST /groupTasks - Associate devices with a group
        ("POST", "/groupTasks") => {
            let body = parse_body(&event)?;
            if let Err(e) = validation::group_task(&body) {
                return error_response(e);
            }
            let req: CreateGroupTaskRequest = serde_json::from_value(body)?;

            match create_group_task(&store, &s3, req).await {
                Ok(response) => json_response(202, &response),
                Err(e) => error_response(e),
            }
        }

        // GET /groupTasks/{task_id} - Get task with deployments
        ("GET", p) if p.starts_with("/groupTasks/") => {
            let task_id = task_id.ok_or("Missing task_id")?;

            match get_group_task(&store, &task_id).await {
                Ok(response) => json_response(200, &response),
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

/// Create a group, pinning the template version it was provisioned from.
async fn create_group(store: &FleetStore, req: CreateGroupRequest) -> Result<Group, Error> {
    let template = store
        .get_template(TemplateKind::Group, &req.template_name)
        .await?;
    if !template.enabled {
        return Err(Error::Validation(format!(
            "template {} is disabled",
            template.name
        )));
    }

    let group = Group::new(req.name, req.template_name, template.version);
    store.create_group(&group).await?;

    info!(group = %group.name, template = %group.template_name, "Created group");

    Ok(group)
}

/// Create the task with scheduled deployments, then run the association
/// chain for each device in order.
async fn create_group_task(
    store: &FleetStore,
    s3: &aws_sdk_s3::Client,
    req: CreateGroupTaskRequest,
) -> Result<GroupTaskResponse, Error> {
    // The group must exist before any rows are written.
    store.get_group(&req.group_name).await?;

    let mut task = GroupTask::new(req.group_name.clone(), req.devices.len() as u32);
    let scheduled: Vec<DeviceDeployment> = req
        .devices
        .iter()
        .map(|device_id| DeviceDeployment::new(&task.task_id, &req.group_name, device_id))
        .collect();

    store.create_group_task(&task, &scheduled).await?;

    let bucket = std::env::var(ARTIFACT_BUCKET_ENV)
        .map_err(|_| Error::Internal(format!("{} not set", ARTIFACT_BUCKET_ENV)))?;
    let pipeline = AssociationPipeline::new(store, s3, bucket);

    let mut deployments = Vec::with_capacity(scheduled.len());
    for deployment in scheduled {
        deployments.push(pipeline.run(&mut task, deployment).await?);
    }

    info!(
        task_id = %task.task_id,
        success = task.success_count,
        failure = task.failure_count,
        "Processed group task"
    );

    Ok(GroupTaskResponse { task, deployments })
}

async fn get_group_task(store: &FleetStore, task_id: &str) -> Result<GroupTaskResponse, Error> {
    let task = store.get_group_task(task_id).await?;
    let deployments = store.get_task_deployments(task_id).await?;
    Ok(GroupTaskResponse { task, deployments })
}

fn parse_body(event: &Request) -> Result<serde_json::Value, LambdaError> {
    let body = event.body();
    let body_str = std::str::from_utf8(body).map_err(|_| "Invalid UTF-8 in body")?;
    Ok(serde_json::from_str(body_str)?)
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
