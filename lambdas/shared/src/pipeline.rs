//! Device-association pipeline
//!
//! Associating a device with a group runs a linear chain of six steps, in
//! order, with no branching and no retries. The first failing step marks the
//! device's deployment failed and stops the chain for that device; the
//! outcome either way is folded into the owning group task.

use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::errors::{Error, Result};
use crate::models::{
    DeviceDeployment, Group, GroupAssociation, GroupTask, GroupVersion, Template,
};
use crate::store::{FleetStore, TemplateKind};

/// The six steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationStep {
    TemplateLookup,
    ActivationCheck,
    DuplicateGuard,
    GroupVersionBump,
    AssociationPersist,
    TaskProgress,
}

impl AssociationStep {
    /// The chain, in order.
    pub fn all() -> [AssociationStep; 6] {
        [
            AssociationStep::TemplateLookup,
            AssociationStep::ActivationCheck,
            AssociationStep::DuplicateGuard,
            AssociationStep::GroupVersionBump,
            AssociationStep::AssociationPersist,
            AssociationStep::TaskProgress,
        ]
    }
}

/// State threaded through the chain for one device.
struct AssociationContext {
    group_name: String,
    device_id: String,
    task_id: String,
    deployment: DeviceDeployment,
    group: Option<Group>,
    template: Option<Template>,
}

/// The config artifact uploaded per group version, pulled by the fleet.
#[derive(Serialize)]
struct GroupArtifact<'a> {
    group_name: &'a str,
    version: u32,
    template_name: &'a str,
    payload_key: &'a str,
    devices: &'a [String],
}

/// Runs the association chain against the store and artifact bucket.
pub struct AssociationPipeline<'a> {
    store: &'a FleetStore,
    s3: &'a aws_sdk_s3::Client,
    bucket: String,
}

impl<'a> AssociationPipeline<'a> {
    pub fn new(store: &'a FleetStore, s3: &'a aws_sdk_s3::Client, bucket: String) -> Self {
        Self { store, s3, bucket }
    }

    /// Run the chain for one device's scheduled deployment and fold the
    /// outcome into the task.
    pub async fn run(
        &self,
        task: &mut GroupTask,
        deployment: DeviceDeployment,
    ) -> Result<DeviceDeployment> {
        let mut ctx = AssociationContext {
            group_name: task.group_name.clone(),
            device_id: deployment.device_id.clone(),
            task_id: task.task_id.clone(),
            deployment,
            group: None,
            template: None,
        };

        for step in AssociationStep::all() {
            if let Err(e) = self.execute(step, task, &mut ctx).await {
                info!(
                    device_id = %ctx.device_id,
                    group = %ctx.group_name,
                    step = ?step,
                    error = %e,
                    "Association chain stopped"
                );
                ctx.deployment.fail(e.to_string());
                self.store.update_deployment(&ctx.deployment).await?;
                task.record_outcome(false);
                self.store.update_group_task(task).await?;
                return Ok(ctx.deployment);
            }
        }

        Ok(ctx.deployment)
    }

    async fn execute(
        &self,
        step: AssociationStep,
        task: &mut GroupTask,
        ctx: &mut AssociationContext,
    ) -> Result<()> {
        match step {
            AssociationStep::TemplateLookup => self.template_lookup(ctx).await,
            AssociationStep::ActivationCheck => self.activation_check(ctx).await,
            AssociationStep::DuplicateGuard => self.duplicate_guard(ctx).await,
            AssociationStep::GroupVersionBump => self.group_version_bump(ctx).await,
            AssociationStep::AssociationPersist => self.association_persist(ctx).await,
            AssociationStep::TaskProgress => self.task_progress(task, ctx).await,
        }
    }

    /// Resolve the group and its template; a disabled template rejects the
    /// device up front.
    async fn template_lookup(&self, ctx: &mut AssociationContext) -> Result<()> {
        let group = self.store.get_group(&ctx.group_name).await?;
        let template = self
            .store
            .get_template(TemplateKind::Group, &group.template_name)
            .await?;
        if !template.enabled {
            return Err(Error::Validation(format!(
                "template {} is disabled",
                template.name
            )));
        }
        ctx.group = Some(group);
        ctx.template = Some(template);
        Ok(())
    }

    /// The device must hold an activation.
    async fn activation_check(&self, ctx: &mut AssociationContext) -> Result<()> {
        self.store.get_activation_by_device(&ctx.device_id).await?;
        Ok(())
    }

    /// The device must not already be in the group.
    async fn duplicate_guard(&self, ctx: &AssociationContext) -> Result<()> {
        if self
            .store
            .get_association(&ctx.group_name, &ctx.device_id)
            .await?
            .is_some()
        {
            return Err(Error::Conflict(format!(
                "device {} is already in group {}",
                ctx.device_id, ctx.group_name
            )));
        }
        Ok(())
    }

    /// Write the next membership snapshot and its config artifact.
    async fn group_version_bump(&self, ctx: &mut AssociationContext) -> Result<()> {
        let group = ctx
            .group
            .as_mut()
            .ok_or_else(|| Error::Internal("group not resolved".to_string()))?;
        let template = ctx
            .template
            .as_ref()
            .ok_or_else(|| Error::Internal("template not resolved".to_string()))?;

        let mut devices = self.collect_group_devices(&ctx.group_name).await?;
        devices.push(ctx.device_id.clone());
        devices.sort();

        let version = group.version + 1;
        let artifact = GroupArtifact {
            group_name: &ctx.group_name,
            version,
            template_name: &template.name,
            payload_key: &template.payload_key,
            devices: &devices,
        };
        let body = serde_json::to_vec(&artifact)?;
        let checksum = artifact_checksum(&body);
        let artifact_key = artifact_key(&ctx.group_name, version);

        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&artifact_key)
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("artifact upload failed: {}", e)))?;

        self.store
            .save_group_version(&GroupVersion {
                group_name: ctx.group_name.clone(),
                version,
                devices,
                artifact_key,
                artifact_checksum: checksum,
                created_at: Utc::now(),
            })
            .await?;

        group.version = version;
        group.updated_at = Utc::now();
        self.store.update_group(group).await?;

        Ok(())
    }

    /// Write the association row.
    async fn association_persist(&self, ctx: &AssociationContext) -> Result<()> {
        self.store
            .save_association(&GroupAssociation::new(
                ctx.group_name.clone(),
                ctx.device_id.clone(),
                ctx.task_id.clone(),
            ))
            .await
    }

    /// Mark the deployment successful and fold it into the task summary.
    async fn task_progress(&self, task: &mut GroupTask, ctx: &mut AssociationContext) -> Result<()> {
        ctx.deployment.succeed();
        self.store.update_deployment(&ctx.deployment).await?;
        task.record_outcome(true);
        self.store.update_group_task(task).await
    }

    /// Drain the group's device listing across pages.
    async fn collect_group_devices(&self, group_name: &str) -> Result<Vec<String>> {
        let mut devices = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .store
                .list_group_devices(group_name, 100, token.as_deref())
                .await?;
            devices.extend(page.items);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(devices)
    }
}

/// S3 key of a group version's config artifact.
pub fn artifact_key(group_name: &str, version: u32) -> String {
    format!("groups/{}/versions/{}.json", group_name, version)
}

/// Hex-encoded SHA-256 of a config artifact.
pub fn artifact_checksum(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
