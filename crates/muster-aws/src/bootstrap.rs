//! One-shot account importer.
//!
//! Walks the cloud hierarchy depth first (regions, VPCs, subnets, zones,
//! security groups, instances) and get-or-creates the matching local
//! entities. Every step is idempotent, so running the import twice against
//! unchanged cloud state changes nothing.

use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::ipaddr::update_metadata;
use muster_inventory::{
    Inventory, Record, RegionRecord, SecurityGroupRecord, SubnetRecord, ZoneRecord,
};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Insert region entities into this pool.
    pub pool: Option<String>,
    /// Import instances as well as locations.
    pub import_instances: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            pool: None,
            import_instances: true,
        }
    }
}

/// Entities created by one import run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub regions: usize,
    pub vpcs: usize,
    pub subnets: usize,
    pub zones: usize,
    pub security_groups: usize,
    pub instances: usize,
}

impl BootstrapReport {
    pub fn total(&self) -> usize {
        self.regions + self.vpcs + self.subnets + self.zones + self.security_groups + self.instances
    }
}

/// Local entity name for a cloud instance: the `Name` tag lowercased with
/// spaces replaced, falling back to the instance id.
fn instance_entity_name(instance: &crate::api::CloudInstance) -> String {
    instance
        .name_tag()
        .map(|name| name.to_lowercase().replace(' ', "_"))
        .unwrap_or_else(|| instance.instance_id.clone())
}

pub struct Bootstrap {
    ec2: Arc<ConnectionManager>,
    vpc: Arc<ConnectionManager>,
}

impl Bootstrap {
    pub fn new(ec2: Arc<ConnectionManager>, vpc: Arc<ConnectionManager>) -> Self {
        Self { ec2, vpc }
    }

    pub async fn run(
        &self,
        inventory: &mut Inventory,
        opts: &BootstrapOptions,
    ) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();

        if let Some(pool) = &opts.pool {
            inventory.get_or_create(pool, Record::Pool)?;
        }

        let regions = self.ec2.api().list_regions().await?;
        for region in &regions {
            tracing::info!(region = %region.name, "importing region");
            if inventory.get(&region.name).is_none() {
                report.regions += 1;
            }
            inventory.get_or_create(
                &region.name,
                Record::Region(RegionRecord {
                    region: region.name.clone(),
                }),
            )?;

            // VPCs and the subnets inside them.
            for vpc in self.vpc.api().list_vpcs(&region.name).await? {
                if inventory.get(&vpc.vpc_id).is_none() {
                    report.vpcs += 1;
                }
                inventory.get_or_create(&vpc.vpc_id, Record::Vpc(Default::default()))?;
                self.vpc.record_vpc(inventory, &vpc.vpc_id, &vpc)?;
                inventory.insert(&region.name, &vpc.vpc_id)?;

                for subnet in self
                    .vpc
                    .api()
                    .list_subnets(&region.name, Some(&vpc.vpc_id), None)
                    .await?
                {
                    if inventory.get(&subnet.subnet_id).is_none() {
                        report.subnets += 1;
                    }
                    inventory.get_or_create(
                        &subnet.subnet_id,
                        Record::Subnet(SubnetRecord::default()),
                    )?;
                    self.vpc.record_subnet(inventory, &subnet.subnet_id, &subnet)?;
                    inventory.insert(&vpc.vpc_id, &subnet.subnet_id)?;
                }
            }

            // Availability zones, cross-linking the subnets they host.
            for zone in self.ec2.api().list_zones(&region.name).await? {
                if inventory.get(&zone.name).is_none() {
                    report.zones += 1;
                }
                inventory.get_or_create(
                    &zone.name,
                    Record::Zone(ZoneRecord {
                        placement: zone.name.clone(),
                    }),
                )?;
                inventory.insert(&region.name, &zone.name)?;

                for subnet in self
                    .vpc
                    .api()
                    .list_subnets(&region.name, None, Some(&zone.name))
                    .await?
                {
                    if inventory.get(&subnet.subnet_id).is_some() {
                        inventory.insert(&zone.name, &subnet.subnet_id)?;
                    }
                }
            }

            if let Some(pool) = &opts.pool {
                inventory.insert(pool, &region.name)?;
            }

            // Security groups, parented under their VPC when they have one.
            for group in self
                .vpc
                .api()
                .list_security_groups(&region.name, None)
                .await?
            {
                if inventory.get(&group.group_id).is_none() {
                    report.security_groups += 1;
                }
                inventory.get_or_create(
                    &group.group_id,
                    Record::SecurityGroup(SecurityGroupRecord::default()),
                )?;
                self.vpc
                    .record_security_group(inventory, &group.group_id, &group)?;
                let parent = group.vpc_id.as_deref().unwrap_or(&region.name);
                if inventory.get(parent).is_some() {
                    inventory.insert(parent, &group.group_id)?;
                }
            }

            if opts.import_instances {
                self.import_instances(inventory, &region.name, &mut report)
                    .await?;
            }
        }

        tracing::info!(created = report.total(), "bootstrap finished");
        Ok(report)
    }

    async fn import_instances(
        &self,
        inventory: &mut Inventory,
        region: &str,
        report: &mut BootstrapReport,
    ) -> Result<()> {
        for instance in self.ec2.api().list_instances(region).await? {
            // VPC instances belong to the VPC manager.
            let manager = if instance.vpc_id.is_some() && instance.subnet_id.is_some() {
                &self.vpc
            } else {
                &self.ec2
            };

            let name = instance_entity_name(&instance);
            tracing::debug!(%name, instance_id = %instance.instance_id, "importing instance");
            if inventory.get(&name).is_none() {
                report.instances += 1;
            }
            inventory.get_or_create(&name, Record::Instance(Box::default()))?;

            let placement = instance
                .subnet_id
                .clone()
                .or_else(|| instance.placement.clone());
            if let Some(parent) = placement {
                if inventory.get(&parent).is_some() {
                    inventory.insert(&parent, &name)?;
                }
            }

            for group_id in &instance.security_group_ids {
                if inventory.get(group_id).is_some() {
                    inventory.insert(group_id, &name)?;
                }
            }

            // Re-imports refresh the resource fields and IP metadata too.
            if inventory.instance(&name)?.manager.is_none() {
                manager.bind(inventory, &name)?;
            }
            manager.record_instance(inventory, &name, &instance)?;
            update_metadata(manager, inventory, &name).await?;
        }
        Ok(())
    }
}
