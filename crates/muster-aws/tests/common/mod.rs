//! In-memory cloud used by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use muster_aws::{
    AwsError, CloudAddress, CloudInstance, CloudRegion, CloudSecurityGroup, CloudSubnet,
    CloudVolume, CloudVpc, CloudZone, Ec2Api, LaunchSpec, Result, VolumeFilter,
};
use std::collections::BTreeSet;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    regions: Vec<String>,
    zones: Vec<CloudZone>,
    vpcs: Vec<CloudVpc>,
    subnets: Vec<CloudSubnet>,
    groups: Vec<CloudSecurityGroup>,
    instances: Vec<CloudInstance>,
    addresses: Vec<CloudAddress>,
    volumes: Vec<CloudVolume>,
    fail_volume_delete: BTreeSet<String>,
    fail_volume_create: BTreeSet<i32>,
    next_id: u32,
}

impl State {
    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Mutable fake account. Seed it, run the managers against it, inspect it.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_region(&self, name: &str) {
        self.state.lock().unwrap().regions.push(name.to_string());
    }

    pub fn add_zone(&self, region: &str, name: &str) {
        self.state.lock().unwrap().zones.push(CloudZone {
            name: name.to_string(),
            region: region.to_string(),
            state: "available".to_string(),
        });
    }

    pub fn add_vpc(&self, region: &str, vpc_id: &str, cidr: &str) {
        self.state.lock().unwrap().vpcs.push(CloudVpc {
            vpc_id: vpc_id.to_string(),
            region: region.to_string(),
            cidr_block: Some(cidr.to_string()),
            state: "available".to_string(),
            is_default: false,
        });
    }

    pub fn add_subnet(&self, region: &str, vpc_id: &str, subnet_id: &str, zone: &str) {
        self.state.lock().unwrap().subnets.push(CloudSubnet {
            subnet_id: subnet_id.to_string(),
            vpc_id: vpc_id.to_string(),
            region: region.to_string(),
            availability_zone: zone.to_string(),
            cidr_block: None,
            state: "available".to_string(),
        });
    }

    pub fn add_group(&self, region: &str, group_id: &str, name: &str, vpc_id: Option<&str>) {
        self.state.lock().unwrap().groups.push(CloudSecurityGroup {
            group_id: group_id.to_string(),
            group_name: name.to_string(),
            region: region.to_string(),
            vpc_id: vpc_id.map(str::to_string),
            owner_id: None,
        });
    }

    pub fn add_instance(&self, instance: CloudInstance) {
        self.state.lock().unwrap().instances.push(instance);
    }

    pub fn add_address(&self, region: &str, public_ip: &str) {
        let mut state = self.state.lock().unwrap();
        let n = state.next();
        state.addresses.push(CloudAddress {
            public_ip: public_ip.to_string(),
            region: region.to_string(),
            allocation_id: Some(format!("eipalloc-{:08x}", n)),
            instance_id: None,
        });
    }

    pub fn add_volume(&self, volume: CloudVolume) {
        self.state.lock().unwrap().volumes.push(volume);
    }

    pub fn fail_volume_delete(&self, volume_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_volume_delete
            .insert(volume_id.to_string());
    }

    /// Make `create_volume` fail for volumes of this size.
    pub fn fail_volume_create(&self, size_gb: i32) {
        self.state
            .lock()
            .unwrap()
            .fail_volume_create
            .insert(size_gb);
    }

    pub fn clear_volume_create_failures(&self) {
        self.state.lock().unwrap().fail_volume_create.clear();
    }

    pub fn set_instance_state(&self, instance_id: &str, state: &str) {
        let mut guard = self.state.lock().unwrap();
        if let Some(inst) = guard
            .instances
            .iter_mut()
            .find(|i| i.instance_id == instance_id)
        {
            inst.state = state.to_string();
        }
    }

    pub fn group_count(&self) -> usize {
        self.state.lock().unwrap().groups.len()
    }

    pub fn instance(&self, instance_id: &str) -> Option<CloudInstance> {
        self.state
            .lock()
            .unwrap()
            .instances
            .iter()
            .find(|i| i.instance_id == instance_id)
            .cloned()
    }

    pub fn volume(&self, volume_id: &str) -> Option<CloudVolume> {
        self.state
            .lock()
            .unwrap()
            .volumes
            .iter()
            .find(|v| v.volume_id == volume_id)
            .cloned()
    }

    pub fn volume_count(&self) -> usize {
        self.state.lock().unwrap().volumes.len()
    }

    pub fn address(&self, public_ip: &str) -> Option<CloudAddress> {
        self.state
            .lock()
            .unwrap()
            .addresses
            .iter()
            .find(|a| a.public_ip == public_ip)
            .cloned()
    }
}

/// Seeded instance with the fields most tests care about.
pub fn make_instance(region: &str, instance_id: &str, state: &str) -> CloudInstance {
    CloudInstance {
        instance_id: instance_id.to_string(),
        region: region.to_string(),
        state: state.to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl Ec2Api for FakeCloud {
    async fn list_regions(&self) -> Result<Vec<CloudRegion>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .regions
            .iter()
            .map(|name| CloudRegion { name: name.clone() })
            .collect())
    }

    async fn list_zones(&self, region: &str) -> Result<Vec<CloudZone>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .zones
            .iter()
            .filter(|z| z.region == region)
            .cloned()
            .collect())
    }

    async fn list_vpcs(&self, region: &str) -> Result<Vec<CloudVpc>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .vpcs
            .iter()
            .filter(|v| v.region == region)
            .cloned()
            .collect())
    }

    async fn get_vpc(&self, region: &str, vpc_id: &str) -> Result<Option<CloudVpc>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .vpcs
            .iter()
            .find(|v| v.region == region && v.vpc_id == vpc_id)
            .cloned())
    }

    async fn list_subnets(
        &self,
        region: &str,
        vpc_id: Option<&str>,
        availability_zone: Option<&str>,
    ) -> Result<Vec<CloudSubnet>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .subnets
            .iter()
            .filter(|s| s.region == region)
            .filter(|s| vpc_id.map(|v| s.vpc_id == v).unwrap_or(true))
            .filter(|s| {
                availability_zone
                    .map(|z| s.availability_zone == z)
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn get_subnet(&self, region: &str, subnet_id: &str) -> Result<Option<CloudSubnet>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .subnets
            .iter()
            .find(|s| s.region == region && s.subnet_id == subnet_id)
            .cloned())
    }

    async fn list_security_groups(
        &self,
        region: &str,
        vpc_id: Option<&str>,
    ) -> Result<Vec<CloudSecurityGroup>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .groups
            .iter()
            .filter(|g| g.region == region)
            .filter(|g| vpc_id.map(|v| g.vpc_id.as_deref() == Some(v)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn create_security_group(
        &self,
        region: &str,
        name: &str,
        _description: &str,
        vpc_id: Option<&str>,
    ) -> Result<CloudSecurityGroup> {
        let mut state = self.state.lock().unwrap();
        let n = state.next();
        let group = CloudSecurityGroup {
            group_id: format!("sg-{:08x}", n),
            group_name: name.to_string(),
            region: region.to_string(),
            vpc_id: vpc_id.map(str::to_string),
            owner_id: None,
        };
        state.groups.push(group.clone());
        Ok(group)
    }

    async fn list_instances(&self, region: &str) -> Result<Vec<CloudInstance>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .instances
            .iter()
            .filter(|i| i.region == region)
            .cloned()
            .collect())
    }

    async fn get_instance(
        &self,
        region: &str,
        instance_id: &str,
    ) -> Result<Option<CloudInstance>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .instances
            .iter()
            .find(|i| i.region == region && i.instance_id == instance_id)
            .cloned())
    }

    async fn run_instance(&self, region: &str, spec: &LaunchSpec) -> Result<CloudInstance> {
        let mut state = self.state.lock().unwrap();
        let n = state.next();
        let instance = CloudInstance {
            instance_id: format!("i-{:08x}", n),
            image_id: Some(spec.image_id.clone()),
            instance_type: Some(spec.instance_type.clone()),
            key_name: spec.key_name.clone(),
            region: region.to_string(),
            placement: spec.placement.clone(),
            subnet_id: spec.subnet_id.clone(),
            vpc_id: None,
            state: "pending".to_string(),
            private_ip: Some("10.0.0.10".to_string()),
            public_ip: None,
            security_group_ids: spec.security_group_ids.clone(),
            tags: Default::default(),
        };
        state.instances.push(instance.clone());
        Ok(instance)
    }

    async fn start_instance(&self, region: &str, instance_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state
            .instances
            .iter_mut()
            .find(|i| i.region == region && i.instance_id == instance_id)
        {
            Some(inst) => {
                inst.state = "running".to_string();
                Ok(())
            }
            None => Err(AwsError::Api(format!(
                "InvalidInstanceID.NotFound: {}",
                instance_id
            ))),
        }
    }

    async fn stop_instance(&self, region: &str, instance_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state
            .instances
            .iter_mut()
            .find(|i| i.region == region && i.instance_id == instance_id)
        {
            Some(inst) => {
                inst.state = "stopped".to_string();
                Ok(())
            }
            None => Err(AwsError::Api(format!(
                "InvalidInstanceID.NotFound: {}",
                instance_id
            ))),
        }
    }

    async fn terminate_instance(&self, region: &str, instance_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state
            .instances
            .iter_mut()
            .find(|i| i.region == region && i.instance_id == instance_id)
        {
            Some(inst) => {
                inst.state = "terminated".to_string();
                Ok(())
            }
            None => Err(AwsError::Api(format!(
                "InvalidInstanceID.NotFound: {}",
                instance_id
            ))),
        }
    }

    async fn console_output(&self, _region: &str, instance_id: &str) -> Result<String> {
        Ok(format!("console log for {}", instance_id))
    }

    async fn create_tag(
        &self,
        _region: &str,
        resource_id: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(inst) = state
            .instances
            .iter_mut()
            .find(|i| i.instance_id == resource_id)
        {
            inst.tags.insert(key.to_string(), value.to_string());
            return Ok(());
        }
        if let Some(vol) = state
            .volumes
            .iter_mut()
            .find(|v| v.volume_id == resource_id)
        {
            vol.tags.insert(key.to_string(), value.to_string());
            return Ok(());
        }
        Err(AwsError::Api(format!(
            "InvalidID: resource {} not found",
            resource_id
        )))
    }

    async fn list_addresses(&self, region: &str) -> Result<Vec<CloudAddress>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .addresses
            .iter()
            .filter(|a| a.region == region)
            .cloned()
            .collect())
    }

    async fn allocate_address(&self, region: &str) -> Result<CloudAddress> {
        let mut state = self.state.lock().unwrap();
        let n = state.next();
        let address = CloudAddress {
            public_ip: format!("54.234.0.{}", n % 250 + 1),
            region: region.to_string(),
            allocation_id: Some(format!("eipalloc-{:08x}", n)),
            instance_id: None,
        };
        state.addresses.push(address.clone());
        Ok(address)
    }

    async fn associate_address(
        &self,
        region: &str,
        instance_id: &str,
        public_ip: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(addr) = state
            .addresses
            .iter_mut()
            .find(|a| a.region == region && a.public_ip == public_ip)
        {
            addr.instance_id = Some(instance_id.to_string());
        }
        match state
            .instances
            .iter_mut()
            .find(|i| i.region == region && i.instance_id == instance_id)
        {
            Some(inst) => {
                inst.public_ip = Some(public_ip.to_string());
                Ok(())
            }
            None => Err(AwsError::Api(format!(
                "InvalidInstanceID.NotFound: {}",
                instance_id
            ))),
        }
    }

    async fn release_address(&self, region: &str, public_ip: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .addresses
            .retain(|a| !(a.region == region && a.public_ip == public_ip));
        Ok(())
    }

    async fn list_volumes(&self, _region: &str, filter: &VolumeFilter) -> Result<Vec<CloudVolume>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .volumes
            .iter()
            .filter(|v| {
                filter
                    .attached_to
                    .as_deref()
                    .map(|id| v.attached_to.as_deref() == Some(id))
                    .unwrap_or(true)
            })
            .filter(|v| filter.volume_ids.is_empty() || filter.volume_ids.contains(&v.volume_id))
            .cloned()
            .collect())
    }

    async fn create_volume(
        &self,
        _region: &str,
        availability_zone: &str,
        size_gb: i32,
    ) -> Result<CloudVolume> {
        let mut state = self.state.lock().unwrap();
        if state.fail_volume_create.contains(&size_gb) {
            return Err(AwsError::Api(format!(
                "VolumeLimitExceeded: cannot create {} GiB volume",
                size_gb
            )));
        }
        let n = state.next();
        let volume = CloudVolume {
            volume_id: format!("vol-{:08x}", n),
            size_gb,
            availability_zone: availability_zone.to_string(),
            attached_to: None,
            device: None,
            tags: Default::default(),
        };
        state.volumes.push(volume.clone());
        Ok(volume)
    }

    async fn attach_volume(
        &self,
        _region: &str,
        volume_id: &str,
        instance_id: &str,
        device: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state
            .volumes
            .iter_mut()
            .find(|v| v.volume_id == volume_id)
        {
            Some(vol) => {
                vol.attached_to = Some(instance_id.to_string());
                vol.device = Some(device.to_string());
                Ok(())
            }
            None => Err(AwsError::Api(format!(
                "InvalidVolume.NotFound: {}",
                volume_id
            ))),
        }
    }

    async fn delete_volume(&self, _region: &str, volume_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_volume_delete.contains(volume_id) {
            return Err(AwsError::Api(format!(
                "VolumeInUse: {} is currently attached",
                volume_id
            )));
        }
        let before = state.volumes.len();
        state.volumes.retain(|v| v.volume_id != volume_id);
        if state.volumes.len() == before {
            return Err(AwsError::Api(format!(
                "InvalidVolume.NotFound: {}",
                volume_id
            )));
        }
        Ok(())
    }
}
