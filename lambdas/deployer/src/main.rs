//! FleetOps Deployer Lambda
//!
//! Triggered by SQS with one message per patch task. For each scheduled
//! patch in the task it resolves the device's managed instance and creates
//! the SSM State Manager association that applies the template's playbook.
//! The task summary tracks dispatch outcomes: a patch counts as dispatched
//! once its association exists; SSM drives the run from there.

use aws_config::BehaviorVersion;
use aws_lambda_events::event::sqs::SqsEventObj;
use aws_sdk_ssm::types::Target;
use chrono::Utc;
use fleetops_core::{
    DevicePatch, Error, FleetStore, PatchStatus, PatchTaskMessage, TaskStatus, TemplateKind,
};
use lambda_runtime::{run, service_fn, Error as LambdaError, LambdaEvent};
use std::collections::HashMap;
use tracing::{error, info, warn};

const ARTIFACT_BUCKET_ENV: &str = "FLEETOPS_ARTIFACT_BUCKET";

/// SSM document applying an Ansible playbook from S3.
const PLAYBOOK_DOCUMENT: &str = "AWS-ApplyAnsiblePlaybooks";

/// Process one task message: dispatch every scheduled patch.
async fn process_task(
    store: &FleetStore,
    ssm: &aws_sdk_ssm::Client,
    task_id: &str,
) -> Result<(), Error> {
    let mut task = store.get_patch_task(task_id).await?;
    let patches = store.get_task_patches(task_id).await?;

    info!(task_id = %task_id, patches = patches.len(), "Dispatching patch task");

    for mut patch in patches {
        if patch.status != PatchStatus::Scheduled {
            continue;
        }

        match dispatch_patch(store, ssm, &patch).await {
            Ok(association_id) => {
                patch.association_id = Some(association_id);
                patch.status = PatchStatus::InProgress;
                patch.status_message = None;
                task.success_count += 1;
            }
            Err(e) => {
                warn!(patch_id = %patch.patch_id, device_id = %patch.device_id, error = %e, "Dispatch failed");
                patch.status = PatchStatus::Failed;
                patch.status_message = Some(e.to_string());
                task.failure_count += 1;
            }
        }
        patch.updated_at = Utc::now();
        store.save_patch(&patch).await?;
    }

    task.status = TaskStatus::from_counts(task.patch_count, task.success_count, task.failure_count);
    task.updated_at = Utc::now();
    store.update_patch_task(&task).await?;

    info!(
        task_id = %task_id,
        dispatched = task.success_count,
        failed = task.failure_count,
        "Patch task processed"
    );

    Ok(())
}

/// Create the SSM association driving one patch. Returns the association id.
async fn dispatch_patch(
    store: &FleetStore,
    ssm: &aws_sdk_ssm::Client,
    patch: &DevicePatch,
) -> Result<String, Error> {
    let template = store
        .get_template(TemplateKind::Patch, &patch.patch_type)
        .await?;
    let activation = store.get_activation_by_device(&patch.device_id).await?;

    // Hybrid-activated devices register as managed instances; the activation
    // id is the join key.
    let instances = ssm
        .describe_instance_information()
        .filters(
            aws_sdk_ssm::types::InstanceInformationStringFilter::builder()
                .key("ActivationIds")
                .values(&activation.activation_id)
                .build()
                .map_err(|e| Error::Internal(e.to_string()))?,
        )
        .send()
        .await
        .map_err(|e| Error::Internal(format!("DescribeInstanceInformation failed: {}", e)))?;

    let instance_id = instances
        .instance_information_list()
        .first()
        .and_then(|info| info.instance_id())
        .ok_or_else(|| Error::TargetInstanceNotFound(patch.device_id.clone()))?
        .to_string();

    let bucket = std::env::var(ARTIFACT_BUCKET_ENV)
        .map_err(|_| Error::Internal(format!("{} not set", ARTIFACT_BUCKET_ENV)))?;

    let result = ssm
        .create_association()
        .name(PLAYBOOK_DOCUMENT)
        .association_name(format!("fleetops-{}", patch.patch_id))
        .targets(
            Target::builder()
                .key("InstanceIds")
                .values(instance_id)
                .build(),
        )
        .parameters("SourceType", vec!["S3".to_string()])
        .parameters(
            "SourceInfo",
            vec![source_info(&bucket, &template.payload_key)],
        )
        .parameters(
            "PlaybookFile",
            vec![playbook_file(&template.payload_key).to_string()],
        )
        .parameters(
            "ExtraVariables",
            vec![merge_extra_vars(&template.extra_vars, &patch.extra_vars)],
        )
        .send()
        .await
        .map_err(|e| Error::Internal(format!("CreateAssociation failed: {}", e)))?;

    let association_id = result
        .association_description()
        .and_then(|desc| desc.association_id())
        .ok_or_else(|| Error::Internal("no association id returned".to_string()))?
        .to_string();

    info!(
        patch_id = %patch.patch_id,
        device_id = %patch.device_id,
        association_id = %association_id,
        "Created association"
    );

    Ok(association_id)
}

/// S3 source descriptor for the playbook document.
fn source_info(bucket: &str, payload_key: &str) -> String {
    serde_json::json!({
        "path": format!("https://s3.amazonaws.com/{}/{}", bucket, payload_key)
    })
    .to_string()
}

/// The playbook file name is the last path component of the payload key.
fn playbook_file(payload_key: &str) -> &str {
    payload_key.rsplit('/').next().unwrap_or(payload_key)
}

/// Template defaults merged with per-patch overrides, rendered as the
/// space-separated `key=value` list the playbook document expects.
fn merge_extra_vars(
    template_vars: &HashMap<String, String>,
    patch_vars: &HashMap<String, String>,
) -> String {
    let mut merged: Vec<(&String, &String)> = template_vars
        .iter()
        .filter(|(key, _)| !patch_vars.contains_key(*key))
        .chain(patch_vars.iter())
        .collect();
    merged.sort();
    merged
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(" ")
}

async fn handler(event: LambdaEvent<SqsEventObj<PatchTaskMessage>>) -> Result<(), LambdaError> {
    let (payload, _context) = event.into_parts();

    info!(record_count = payload.records.len(), "Processing SQS batch");

    // Initialize AWS clients
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let store = FleetStore::new(aws_sdk_dynamodb::Client::new(&config));
    let ssm = aws_sdk_ssm::Client::new(&config);

    // Process each record
    for record in &payload.records {
        if let Err(e) = process_task(&store, &ssm, &record.body.task_id).await {
            error!(task_id = %record.body.task_id, error = %e, "Failed to process task");
            // Continue processing other records
        }
    }

    Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playbook_file_is_basename() {
        assert_eq!(playbook_file("playbooks/nginx/site.yml"), "site.yml");
        assert_eq!(playbook_file("site.yml"), "site.yml");
    }

    #[test]
    fn test_source_info_points_at_bucket() {
        let info = source_info("fleet-artifacts", "playbooks/nginx.yml");
        assert!(info.contains("https://s3.amazonaws.com/fleet-artifacts/playbooks/nginx.yml"));
    }

    #[test]
    fn test_merge_extra_vars_patch_wins() {
        let template = HashMap::from([
            ("port".to_string(), "80".to_string()),
            ("tls".to_string(), "off".to_string()),
        ]);
        let patch = HashMap::from([("port".to_string(), "8080".to_string())]);
        assert_eq!(merge_extra_vars(&template, &patch), "port=8080 tls=off");
    }

    #[test]
    fn test_merge_extra_vars_empty() {
        assert_eq!(merge_extra_vars(&HashMap::new(), &HashMap::new()), "");
    }
}
