//! Instance lifecycle: create, start, stop, destroy, state polling.

use crate::api::{BlockDevice, LaunchSpec, VolumeFilter};
use crate::connection::{ConnectionManager, InstanceResource};
use crate::error::{AwsError, Result};
use crate::secgroup::resolve_security_groups;
use crate::userdata::render_user_data;
use muster_inventory::Inventory;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const MAX_POLL_COUNT: u32 = 30;

/// Outcome of a bounded state poll. Exhausting the poll budget is a
/// distinguishable result, not a silent return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached(String),
    TimedOut { target: String, last: String },
}

impl WaitOutcome {
    pub fn reached(&self) -> bool {
        matches!(self, WaitOutcome::Reached(_))
    }
}

impl std::fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitOutcome::Reached(state) => write!(f, "reached {}", state),
            WaitOutcome::TimedOut { target, last } => {
                write!(f, "gave up waiting for {} (last seen: {})", target, last)
            }
        }
    }
}

/// Result of `create`: the recorded resource plus, when waiting was
/// requested, the poll outcome.
#[derive(Debug)]
pub struct CreateOutcome {
    pub resource: InstanceResource,
    pub wait: Option<WaitOutcome>,
}

/// Ephemeral drives included at launch per instance type. Unlisted types
/// get none.
fn ephemeral_drive_count(instance_type: &str) -> usize {
    match instance_type {
        "c1.medium" => 1,
        "c1.xlarge" => 4,
        "c3.large" | "c3.xlarge" | "c3.4xlarge" | "c3.8xlarge" => 2,
        "cc2.8xlarge" => 4,
        "cg1.4xlarge" | "cr1.8xlarge" => 2,
        "d2.xlarge" => 3,
        "d2.2xlarge" => 6,
        "d2.4xlarge" => 12,
        "d2.8xlarge" => 24,
        "g2.2xlarge" => 1,
        "g2.8xlarge" => 2,
        "hi1.4xlarge" => 2,
        "hs1.8xlarge" => 24,
        "i2.xlarge" => 1,
        "i2.2xlarge" => 2,
        "i2.4xlarge" => 4,
        "i2.8xlarge" => 8,
        "m1.small" | "m1.medium" => 1,
        "m1.large" => 2,
        "m1.xlarge" => 4,
        "m2.xlarge" | "m2.2xlarge" => 1,
        "m2.4xlarge" => 2,
        "m3.medium" | "m3.large" => 1,
        "m3.xlarge" | "m3.2xlarge" => 2,
        "r3.large" | "r3.xlarge" | "r3.2xlarge" | "r3.4xlarge" => 1,
        "r3.8xlarge" => 2,
        _ => 0,
    }
}

/// Block device mapping handing the instance its ephemeral drives,
/// starting at `/dev/sdb`.
pub fn ephemeral_block_devices(instance_type: &str) -> Vec<BlockDevice> {
    (0..ephemeral_drive_count(instance_type))
        .map(|n| BlockDevice {
            device_name: format!("/dev/sd{}", (b'b' + n as u8) as char),
            virtual_name: Some(format!("ephemeral{}", n)),
        })
        .collect()
}

impl ConnectionManager {
    /// Live state string of the entity's instance.
    pub async fn instance_state(&self, inventory: &Inventory, entity: &str) -> Result<String> {
        let rec = inventory.instance(entity)?;
        let instance_id = rec
            .instance_id
            .as_deref()
            .ok_or_else(|| AwsError::NoInstance(entity.to_string()))?;
        let region = self.region_of(rec);
        let instance = self
            .api()
            .get_instance(&region, instance_id)
            .await?
            .ok_or_else(|| AwsError::NoInstance(entity.to_string()))?;
        Ok(instance.state)
    }

    /// Poll at a fixed interval until the target state is observed or the
    /// poll budget runs out.
    pub async fn wait_for_state(
        &self,
        inventory: &Inventory,
        entity: &str,
        target: &str,
        interval: Duration,
        max_polls: u32,
    ) -> Result<WaitOutcome> {
        let mut last = self.instance_state(inventory, entity).await?;
        let mut polls = 0;
        while last != target && polls < max_polls {
            tokio::time::sleep(interval).await;
            last = self.instance_state(inventory, entity).await?;
            polls += 1;
        }
        if last == target {
            Ok(WaitOutcome::Reached(last))
        } else {
            tracing::warn!(entity, target, last, "state poll exhausted");
            Ok(WaitOutcome::TimedOut {
                target: target.to_string(),
                last,
            })
        }
    }

    /// Launch the entity's instance if it does not exist yet.
    pub async fn create_instance(
        &self,
        inventory: &mut Inventory,
        entity: &str,
        wait: bool,
    ) -> Result<CreateOutcome> {
        let rec = inventory.instance(entity)?.clone();
        if let Some(existing) = &rec.instance_id {
            return Err(AwsError::AlreadyBound {
                entity: entity.to_string(),
                resource: format!("instance {}", existing),
            });
        }

        let image_id = rec
            .image_id
            .clone()
            .ok_or_else(|| AwsError::MissingImage(entity.to_string()))?;
        let instance_type = rec
            .instance_type
            .clone()
            .ok_or_else(|| AwsError::MissingInstanceType(entity.to_string()))?;
        let region = self.region_of(&rec);

        let block_devices = if rec.skip_ephemeral {
            Vec::new()
        } else {
            ephemeral_block_devices(&instance_type)
        };

        let user_data = render_user_data(entity, &rec)?;

        // VPC launches reference groups by id, classic launches by name.
        let resolved = resolve_security_groups(
            self.api(),
            &region,
            &rec.security_groups,
            &rec.security_group_ids,
            rec.vpc_id.as_deref(),
        )
        .await?;
        let (security_groups, security_group_ids) = if rec.vpc_id.is_some() {
            (Vec::new(), resolved.ids)
        } else {
            (resolved.names, Vec::new())
        };

        let spec = LaunchSpec {
            image_id,
            instance_type,
            key_name: rec.key_name.clone(),
            placement: rec.placement.clone(),
            subnet_id: rec.subnet_id.clone(),
            security_groups,
            security_group_ids,
            user_data,
            block_devices,
        };

        tracing::info!(entity, region, "launching instance");
        let instance = self.api().run_instance(&region, &spec).await?;
        self.api()
            .create_tag(&region, &instance.instance_id, "Name", entity)
            .await?;

        self.bind(inventory, entity)?;
        let resource = self.record_instance(inventory, entity, &instance)?;

        let wait_outcome = if wait {
            Some(
                self.wait_for_state(
                    inventory,
                    entity,
                    "running",
                    DEFAULT_POLL_INTERVAL,
                    MAX_POLL_COUNT,
                )
                .await?,
            )
        } else {
            None
        };

        Ok(CreateOutcome {
            resource,
            wait: wait_outcome,
        })
    }

    pub async fn start_instance(&self, inventory: &Inventory, entity: &str) -> Result<()> {
        let rec = inventory.instance(entity)?;
        let instance_id = rec
            .instance_id
            .as_deref()
            .ok_or_else(|| AwsError::NoInstance(entity.to_string()))?;
        let region = self.region_of(rec);
        tracing::info!(entity, instance_id, "starting instance");
        self.api().start_instance(&region, instance_id).await
    }

    pub async fn stop_instance(&self, inventory: &Inventory, entity: &str) -> Result<()> {
        let rec = inventory.instance(entity)?;
        let instance_id = rec
            .instance_id
            .as_deref()
            .ok_or_else(|| AwsError::NoInstance(entity.to_string()))?;
        let region = self.region_of(rec);
        tracing::info!(entity, instance_id, "stopping instance");
        self.api().stop_instance(&region, instance_id).await
    }

    /// Terminate the instance, best-effort delete its previously attached
    /// volumes, then delete the local entity. Volume failures are
    /// collected, not raised; destruction of the instance always wins.
    pub async fn destroy_instance(
        &self,
        inventory: &mut Inventory,
        entity: &str,
        wait: bool,
    ) -> Result<Vec<String>> {
        let rec = inventory.instance(entity)?.clone();
        let instance_id = rec
            .instance_id
            .clone()
            .ok_or_else(|| AwsError::NoInstance(entity.to_string()))?;
        let region = self.region_of(&rec);

        let volumes = self
            .api()
            .list_volumes(&region, &VolumeFilter::attached_to(&instance_id))
            .await?;

        tracing::info!(entity, %instance_id, "terminating instance");
        self.api().terminate_instance(&region, &instance_id).await?;

        let mut warnings = Vec::new();
        if wait {
            let outcome = self
                .wait_for_state(
                    inventory,
                    entity,
                    "terminated",
                    DEFAULT_POLL_INTERVAL,
                    MAX_POLL_COUNT,
                )
                .await?;
            if !outcome.reached() {
                warnings.push(format!("{}: {}", entity, outcome));
            }
        }

        for vol in &volumes {
            let device = vol
                .device
                .as_deref()
                .and_then(|d| d.rsplit('/').next())
                .unwrap_or("?");
            if let Err(err) = self.api().delete_volume(&region, &vol.volume_id).await {
                warnings.push(format!(
                    "Could not delete volume {} ({}) from {}, reason: {}",
                    device, vol.volume_id, entity, err
                ));
            }
        }

        inventory.remove(entity);
        Ok(warnings)
    }

    /// Console log output of the entity's instance.
    pub async fn console_output(&self, inventory: &Inventory, entity: &str) -> Result<String> {
        let rec = inventory.instance(entity)?;
        let instance_id = rec
            .instance_id
            .as_deref()
            .ok_or_else(|| AwsError::NoInstance(entity.to_string()))?;
        let region = self.region_of(rec);
        self.api().console_output(&region, instance_id).await
    }
}
