//! Connection managers.
//!
//! A connection manager owns the cloud client for one credential set and
//! one role (classic EC2 or VPC), guards the one-resource-per-entity
//! invariant, and writes converted cloud objects back onto the owning
//! entity's typed record.

use crate::api::{CloudInstance, CloudSecurityGroup, CloudSubnet, CloudVpc, Ec2Api};
use crate::error::{AwsError, Result};
use muster_inventory::{Inventory, ManagerRole, Record};
use serde::Serialize;
use std::sync::Arc;

/// Recorded resource snapshot for one instance entity, as shown by
/// `muster ec2 show`.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceResource {
    pub instance_id: String,
    pub image_id: Option<String>,
    pub region: Option<String>,
    pub placement: Option<String>,
    pub subnet_id: Option<String>,
    pub vpc_id: Option<String>,
}

pub struct ConnectionManager {
    name: String,
    role: ManagerRole,
    default_region: String,
    api: Arc<dyn Ec2Api>,
}

impl ConnectionManager {
    pub fn new(
        name: impl Into<String>,
        role: ManagerRole,
        default_region: impl Into<String>,
        api: Arc<dyn Ec2Api>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            default_region: default_region.into(),
            api,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ManagerRole {
        self.role
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    pub fn api(&self) -> &dyn Ec2Api {
        self.api.as_ref()
    }

    /// Region an instance entity operates in, falling back to the
    /// manager's default.
    pub fn region_of(&self, rec: &muster_inventory::InstanceRecord) -> String {
        rec.effective_region()
            .unwrap_or_else(|| self.default_region.clone())
    }

    /// Bind an instance entity to this manager. Binding is idempotent for
    /// the same manager; an entity bound elsewhere is rejected.
    pub fn bind(&self, inventory: &mut Inventory, entity: &str) -> Result<()> {
        let rec = inventory.instance(entity)?;
        match &rec.manager {
            Some(existing) if existing == &self.name => Ok(()),
            Some(existing) => Err(AwsError::AlreadyBound {
                entity: entity.to_string(),
                resource: format!("manager {}", existing),
            }),
            None => {
                inventory.instance_mut(entity)?.manager = Some(self.name.clone());
                tracing::debug!(entity, manager = %self.name, "bound entity");
                Ok(())
            }
        }
    }

    /// Copy a live instance's fields onto the owning entity's record and
    /// return the snapshot. An entity already holding a different live
    /// instance is a double allocation.
    pub fn record_instance(
        &self,
        inventory: &mut Inventory,
        entity: &str,
        instance: &CloudInstance,
    ) -> Result<InstanceResource> {
        {
            let rec = inventory.instance(entity)?;
            if let Some(existing) = &rec.instance_id {
                if existing != &instance.instance_id {
                    return Err(AwsError::AlreadyBound {
                        entity: entity.to_string(),
                        resource: format!("instance {}", existing),
                    });
                }
            }
        }
        let rec = inventory.instance_mut(entity)?;
        rec.instance_id = Some(instance.instance_id.clone());
        rec.image_id = instance.image_id.clone();
        rec.instance_type = instance.instance_type.clone();
        rec.key_name = instance.key_name.clone();
        rec.region = Some(instance.region.clone());
        rec.placement = instance.placement.clone();
        rec.subnet_id = instance.subnet_id.clone();
        rec.vpc_id = instance.vpc_id.clone();
        tracing::debug!(entity, instance_id = %instance.instance_id, "recorded instance resource");
        Ok(InstanceResource {
            instance_id: instance.instance_id.clone(),
            image_id: instance.image_id.clone(),
            region: Some(instance.region.clone()),
            placement: instance.placement.clone(),
            subnet_id: instance.subnet_id.clone(),
            vpc_id: instance.vpc_id.clone(),
        })
    }

    /// Snapshot of the recorded resource, from local state only.
    pub fn resource_snapshot(
        &self,
        inventory: &Inventory,
        entity: &str,
    ) -> Result<InstanceResource> {
        let rec = inventory.instance(entity)?;
        let instance_id = rec
            .instance_id
            .clone()
            .ok_or_else(|| AwsError::NoInstance(entity.to_string()))?;
        Ok(InstanceResource {
            instance_id,
            image_id: rec.image_id.clone(),
            region: rec.region.clone(),
            placement: rec.placement.clone(),
            subnet_id: rec.subnet_id.clone(),
            vpc_id: rec.vpc_id.clone(),
        })
    }

    pub fn record_vpc(
        &self,
        inventory: &mut Inventory,
        entity: &str,
        vpc: &CloudVpc,
    ) -> Result<()> {
        let ent = inventory.expect_mut(entity)?;
        ent.touch();
        match &mut ent.record {
            Record::Vpc(rec) => {
                rec.vpc_id = vpc.vpc_id.clone();
                rec.region = Some(vpc.region.clone());
                rec.cidr_block = vpc.cidr_block.clone();
                Ok(())
            }
            other => Err(AwsError::Inventory(
                muster_inventory::InventoryError::KindMismatch {
                    name: entity.to_string(),
                    expected: muster_inventory::EntityKind::Vpc,
                    found: other.kind(),
                },
            )),
        }
    }

    pub fn record_subnet(
        &self,
        inventory: &mut Inventory,
        entity: &str,
        subnet: &CloudSubnet,
    ) -> Result<()> {
        let ent = inventory.expect_mut(entity)?;
        ent.touch();
        match &mut ent.record {
            Record::Subnet(rec) => {
                rec.subnet_id = subnet.subnet_id.clone();
                rec.vpc_id = Some(subnet.vpc_id.clone());
                rec.region = Some(subnet.region.clone());
                rec.availability_zone = Some(subnet.availability_zone.clone());
                rec.cidr_block = subnet.cidr_block.clone();
                Ok(())
            }
            other => Err(AwsError::Inventory(
                muster_inventory::InventoryError::KindMismatch {
                    name: entity.to_string(),
                    expected: muster_inventory::EntityKind::Subnet,
                    found: other.kind(),
                },
            )),
        }
    }

    pub fn record_security_group(
        &self,
        inventory: &mut Inventory,
        entity: &str,
        group: &CloudSecurityGroup,
    ) -> Result<()> {
        let ent = inventory.expect_mut(entity)?;
        ent.touch();
        match &mut ent.record {
            Record::SecurityGroup(rec) => {
                rec.group_id = group.group_id.clone();
                rec.group_name = group.group_name.clone();
                rec.vpc_id = group.vpc_id.clone();
                Ok(())
            }
            other => Err(AwsError::Inventory(
                muster_inventory::InventoryError::KindMismatch {
                    name: entity.to_string(),
                    expected: muster_inventory::EntityKind::SecurityGroup,
                    found: other.kind(),
                },
            )),
        }
    }

    /// Every instance in the account together with its live state. When
    /// `regions` is empty the whole account is walked.
    pub async fn list_instance_resources(
        &self,
        regions: &[String],
    ) -> Result<Vec<CloudInstance>> {
        let names: Vec<String> = if regions.is_empty() {
            self.api
                .list_regions()
                .await?
                .into_iter()
                .map(|r| r.name)
                .collect()
        } else {
            regions.to_vec()
        };

        let mut all = Vec::new();
        for region in &names {
            all.extend(self.api.list_instances(region).await?);
        }
        Ok(all)
    }
}
