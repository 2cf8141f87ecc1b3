//! The cloud API seam.
//!
//! [`Ec2Api`] is the narrow surface Muster needs from EC2/VPC, expressed
//! over plain data structs so the resource managers never see SDK types.
//! Production code uses the `aws-sdk-ec2` backed implementation in
//! [`crate::client`]; tests drive the managers against an in-memory cloud.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudRegion {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudZone {
    pub name: String,
    pub region: String,
    pub state: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudVpc {
    pub vpc_id: String,
    pub region: String,
    pub cidr_block: Option<String>,
    pub state: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudSubnet {
    pub subnet_id: String,
    pub vpc_id: String,
    pub region: String,
    pub availability_zone: String,
    pub cidr_block: Option<String>,
    pub state: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudSecurityGroup {
    pub group_id: String,
    pub group_name: String,
    pub region: String,
    pub vpc_id: Option<String>,
    pub owner_id: Option<String>,
}

/// One live instance, flattened out of the reservation wrapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudInstance {
    pub instance_id: String,
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub key_name: Option<String>,
    pub region: String,
    pub placement: Option<String>,
    pub subnet_id: Option<String>,
    pub vpc_id: Option<String>,
    /// Verbatim cloud state string (`pending`, `running`, `stopping`,
    /// `stopped`, `shutting-down`, `terminated`).
    pub state: String,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl CloudInstance {
    /// Tag value under `Name`, if any.
    pub fn name_tag(&self) -> Option<&str> {
        self.tags.get("Name").map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudAddress {
    pub public_ip: String,
    pub region: String,
    pub allocation_id: Option<String>,
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudVolume {
    pub volume_id: String,
    pub size_gb: i32,
    pub availability_zone: String,
    /// Instance the volume is attached to, if any.
    pub attached_to: Option<String>,
    /// Attachment device path, e.g. `/dev/sdf`.
    pub device: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Ephemeral-drive slot in a launch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub device_name: String,
    pub virtual_name: Option<String>,
}

/// Everything needed to launch one instance.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    pub image_id: String,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub placement: Option<String>,
    pub subnet_id: Option<String>,
    /// Classic launches name their groups.
    pub security_groups: Vec<String>,
    /// VPC launches reference groups by id.
    pub security_group_ids: Vec<String>,
    pub user_data: Option<String>,
    pub block_devices: Vec<BlockDevice>,
}

#[derive(Debug, Clone, Default)]
pub struct VolumeFilter {
    /// Only volumes attached to this instance.
    pub attached_to: Option<String>,
    /// Only these volume ids. Empty means no id filter.
    pub volume_ids: Vec<String>,
}

impl VolumeFilter {
    pub fn attached_to(instance_id: impl Into<String>) -> Self {
        Self {
            attached_to: Some(instance_id.into()),
            ..Default::default()
        }
    }

    pub fn ids(volume_ids: Vec<String>) -> Self {
        Self {
            volume_ids,
            ..Default::default()
        }
    }
}

/// The EC2/VPC operations Muster depends on.
#[async_trait]
pub trait Ec2Api: Send + Sync {
    async fn list_regions(&self) -> Result<Vec<CloudRegion>>;

    async fn list_zones(&self, region: &str) -> Result<Vec<CloudZone>>;

    async fn list_vpcs(&self, region: &str) -> Result<Vec<CloudVpc>>;

    async fn get_vpc(&self, region: &str, vpc_id: &str) -> Result<Option<CloudVpc>>;

    /// Subnets in a region, optionally narrowed by VPC or availability
    /// zone.
    async fn list_subnets(
        &self,
        region: &str,
        vpc_id: Option<&str>,
        availability_zone: Option<&str>,
    ) -> Result<Vec<CloudSubnet>>;

    async fn get_subnet(&self, region: &str, subnet_id: &str) -> Result<Option<CloudSubnet>>;

    async fn list_security_groups(
        &self,
        region: &str,
        vpc_id: Option<&str>,
    ) -> Result<Vec<CloudSecurityGroup>>;

    async fn create_security_group(
        &self,
        region: &str,
        name: &str,
        description: &str,
        vpc_id: Option<&str>,
    ) -> Result<CloudSecurityGroup>;

    async fn list_instances(&self, region: &str) -> Result<Vec<CloudInstance>>;

    async fn get_instance(&self, region: &str, instance_id: &str)
        -> Result<Option<CloudInstance>>;

    async fn run_instance(&self, region: &str, spec: &LaunchSpec) -> Result<CloudInstance>;

    async fn start_instance(&self, region: &str, instance_id: &str) -> Result<()>;

    async fn stop_instance(&self, region: &str, instance_id: &str) -> Result<()>;

    async fn terminate_instance(&self, region: &str, instance_id: &str) -> Result<()>;

    async fn console_output(&self, region: &str, instance_id: &str) -> Result<String>;

    async fn create_tag(
        &self,
        region: &str,
        resource_id: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;

    async fn list_addresses(&self, region: &str) -> Result<Vec<CloudAddress>>;

    async fn allocate_address(&self, region: &str) -> Result<CloudAddress>;

    async fn associate_address(
        &self,
        region: &str,
        instance_id: &str,
        public_ip: &str,
    ) -> Result<()>;

    async fn release_address(&self, region: &str, public_ip: &str) -> Result<()>;

    async fn list_volumes(&self, region: &str, filter: &VolumeFilter) -> Result<Vec<CloudVolume>>;

    async fn create_volume(
        &self,
        region: &str,
        availability_zone: &str,
        size_gb: i32,
    ) -> Result<CloudVolume>;

    async fn attach_volume(
        &self,
        region: &str,
        volume_id: &str,
        instance_id: &str,
        device: &str,
    ) -> Result<()>;

    async fn delete_volume(&self, region: &str, volume_id: &str) -> Result<()>;
}
