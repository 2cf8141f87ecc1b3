//! `aws-sdk-ec2` backed implementation of the [`Ec2Api`] seam.
//!
//! One SDK client is built lazily per region and memoized on the value,
//! so the cache lives exactly as long as the manager owning it.

use crate::api::{
    BlockDevice, CloudAddress, CloudInstance, CloudRegion, CloudSecurityGroup, CloudSubnet,
    CloudVolume, CloudVpc, CloudZone, Ec2Api, LaunchSpec, VolumeFilter,
};
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use aws_sdk_ec2::error::DisplayErrorContext;
use aws_sdk_ec2::types::{BlockDeviceMapping, Filter, InstanceType, Placement, Tag};
use base64::Engine;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Explicit static credentials for one account.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

fn api_err<E: std::error::Error + Send + Sync + 'static>(err: E) -> AwsError {
    AwsError::Api(DisplayErrorContext(err).to_string())
}

/// Live EC2 client with per-region connection memoization.
pub struct SdkEc2 {
    credentials: AwsCredentials,
    clients: Mutex<HashMap<String, aws_sdk_ec2::Client>>,
}

impl SdkEc2 {
    pub fn new(credentials: AwsCredentials) -> Self {
        Self {
            credentials,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self, region: &str) -> aws_sdk_ec2::Client {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(region) {
            return client.clone();
        }
        tracing::debug!(region, "building EC2 client");
        let credentials = aws_sdk_ec2::config::Credentials::new(
            self.credentials.access_key_id.clone(),
            self.credentials.secret_access_key.clone(),
            None,
            None,
            "muster",
        );
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .credentials_provider(credentials)
            .load()
            .await;
        let client = aws_sdk_ec2::Client::new(&config);
        clients.insert(region.to_string(), client.clone());
        client
    }
}

fn convert_instance(region: &str, inst: &aws_sdk_ec2::types::Instance) -> Option<CloudInstance> {
    Some(CloudInstance {
        instance_id: inst.instance_id()?.to_string(),
        image_id: inst.image_id().map(str::to_string),
        instance_type: inst.instance_type().map(|t| t.as_str().to_string()),
        key_name: inst.key_name().map(str::to_string),
        region: region.to_string(),
        placement: inst
            .placement()
            .and_then(|p| p.availability_zone())
            .map(str::to_string),
        subnet_id: inst.subnet_id().map(str::to_string),
        vpc_id: inst.vpc_id().map(str::to_string),
        state: inst
            .state()
            .and_then(|s| s.name())
            .map(|n| n.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        private_ip: inst.private_ip_address().map(str::to_string),
        public_ip: inst.public_ip_address().map(str::to_string),
        security_group_ids: inst
            .security_groups()
            .iter()
            .filter_map(|g| g.group_id())
            .map(str::to_string)
            .collect(),
        tags: inst
            .tags()
            .iter()
            .filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string())))
            .collect(),
    })
}

fn convert_volume(vol: &aws_sdk_ec2::types::Volume) -> Option<CloudVolume> {
    let attachment = vol.attachments().first();
    Some(CloudVolume {
        volume_id: vol.volume_id()?.to_string(),
        size_gb: vol.size().unwrap_or(0),
        availability_zone: vol.availability_zone().unwrap_or_default().to_string(),
        attached_to: attachment.and_then(|a| a.instance_id()).map(str::to_string),
        device: attachment.and_then(|a| a.device()).map(str::to_string),
        tags: vol
            .tags()
            .iter()
            .filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string())))
            .collect(),
    })
}

fn filter(name: &str, value: &str) -> Filter {
    Filter::builder().name(name).values(value).build()
}

#[async_trait]
impl Ec2Api for SdkEc2 {
    async fn list_regions(&self) -> Result<Vec<CloudRegion>> {
        let out = self
            .client("us-east-1")
            .await
            .describe_regions()
            .send()
            .await
            .map_err(api_err)?;
        Ok(out
            .regions()
            .iter()
            .filter_map(|r| r.region_name())
            .map(|name| CloudRegion {
                name: name.to_string(),
            })
            .collect())
    }

    async fn list_zones(&self, region: &str) -> Result<Vec<CloudZone>> {
        let out = self
            .client(region)
            .await
            .describe_availability_zones()
            .send()
            .await
            .map_err(api_err)?;
        Ok(out
            .availability_zones()
            .iter()
            .filter_map(|z| {
                Some(CloudZone {
                    name: z.zone_name()?.to_string(),
                    region: z.region_name().unwrap_or(region).to_string(),
                    state: z
                        .state()
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                })
            })
            .collect())
    }

    async fn list_vpcs(&self, region: &str) -> Result<Vec<CloudVpc>> {
        let out = self
            .client(region)
            .await
            .describe_vpcs()
            .send()
            .await
            .map_err(api_err)?;
        Ok(out
            .vpcs()
            .iter()
            .filter_map(|v| {
                Some(CloudVpc {
                    vpc_id: v.vpc_id()?.to_string(),
                    region: region.to_string(),
                    cidr_block: v.cidr_block().map(str::to_string),
                    state: v
                        .state()
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                    is_default: v.is_default().unwrap_or(false),
                })
            })
            .collect())
    }

    async fn get_vpc(&self, region: &str, vpc_id: &str) -> Result<Option<CloudVpc>> {
        let out = self
            .client(region)
            .await
            .describe_vpcs()
            .filters(filter("vpc-id", vpc_id))
            .send()
            .await
            .map_err(api_err)?;
        Ok(out.vpcs().iter().find_map(|v| {
            Some(CloudVpc {
                vpc_id: v.vpc_id()?.to_string(),
                region: region.to_string(),
                cidr_block: v.cidr_block().map(str::to_string),
                state: v
                    .state()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                is_default: v.is_default().unwrap_or(false),
            })
        }))
    }

    async fn list_subnets(
        &self,
        region: &str,
        vpc_id: Option<&str>,
        availability_zone: Option<&str>,
    ) -> Result<Vec<CloudSubnet>> {
        let mut req = self.client(region).await.describe_subnets();
        if let Some(vpc_id) = vpc_id {
            req = req.filters(filter("vpc-id", vpc_id));
        }
        if let Some(zone) = availability_zone {
            req = req.filters(filter("availability-zone", zone));
        }
        let out = req.send().await.map_err(api_err)?;
        Ok(out
            .subnets()
            .iter()
            .filter_map(|s| {
                Some(CloudSubnet {
                    subnet_id: s.subnet_id()?.to_string(),
                    vpc_id: s.vpc_id().unwrap_or_default().to_string(),
                    region: region.to_string(),
                    availability_zone: s.availability_zone().unwrap_or_default().to_string(),
                    cidr_block: s.cidr_block().map(str::to_string),
                    state: s
                        .state()
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                })
            })
            .collect())
    }

    async fn get_subnet(&self, region: &str, subnet_id: &str) -> Result<Option<CloudSubnet>> {
        let out = self
            .client(region)
            .await
            .describe_subnets()
            .filters(filter("subnet-id", subnet_id))
            .send()
            .await
            .map_err(api_err)?;
        Ok(out.subnets().iter().find_map(|s| {
            Some(CloudSubnet {
                subnet_id: s.subnet_id()?.to_string(),
                vpc_id: s.vpc_id().unwrap_or_default().to_string(),
                region: region.to_string(),
                availability_zone: s.availability_zone().unwrap_or_default().to_string(),
                cidr_block: s.cidr_block().map(str::to_string),
                state: s
                    .state()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            })
        }))
    }

    async fn list_security_groups(
        &self,
        region: &str,
        vpc_id: Option<&str>,
    ) -> Result<Vec<CloudSecurityGroup>> {
        let mut req = self.client(region).await.describe_security_groups();
        if let Some(vpc_id) = vpc_id {
            req = req.filters(filter("vpc-id", vpc_id));
        }
        let out = req.send().await.map_err(api_err)?;
        Ok(out
            .security_groups()
            .iter()
            .filter_map(|g| {
                Some(CloudSecurityGroup {
                    group_id: g.group_id()?.to_string(),
                    group_name: g.group_name().unwrap_or_default().to_string(),
                    region: region.to_string(),
                    vpc_id: g.vpc_id().map(str::to_string),
                    owner_id: g.owner_id().map(str::to_string),
                })
            })
            .collect())
    }

    async fn create_security_group(
        &self,
        region: &str,
        name: &str,
        description: &str,
        vpc_id: Option<&str>,
    ) -> Result<CloudSecurityGroup> {
        let out = self
            .client(region)
            .await
            .create_security_group()
            .group_name(name)
            .description(description)
            .set_vpc_id(vpc_id.map(str::to_string))
            .send()
            .await
            .map_err(api_err)?;
        Ok(CloudSecurityGroup {
            group_id: out.group_id().unwrap_or_default().to_string(),
            group_name: name.to_string(),
            region: region.to_string(),
            vpc_id: vpc_id.map(str::to_string),
            owner_id: None,
        })
    }

    async fn list_instances(&self, region: &str) -> Result<Vec<CloudInstance>> {
        let out = self
            .client(region)
            .await
            .describe_instances()
            .send()
            .await
            .map_err(api_err)?;
        Ok(out
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .filter_map(|i| convert_instance(region, i))
            .collect())
    }

    async fn get_instance(
        &self,
        region: &str,
        instance_id: &str,
    ) -> Result<Option<CloudInstance>> {
        let out = self
            .client(region)
            .await
            .describe_instances()
            .filters(filter("instance-id", instance_id))
            .send()
            .await
            .map_err(api_err)?;
        Ok(out
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .find_map(|i| convert_instance(region, i)))
    }

    async fn run_instance(&self, region: &str, spec: &LaunchSpec) -> Result<CloudInstance> {
        let mut req = self
            .client(region)
            .await
            .run_instances()
            .image_id(&spec.image_id)
            .instance_type(InstanceType::from(spec.instance_type.as_str()))
            .min_count(1)
            .max_count(1)
            .set_key_name(spec.key_name.clone())
            .set_subnet_id(spec.subnet_id.clone());
        if let Some(placement) = &spec.placement {
            req = req.placement(Placement::builder().availability_zone(placement).build());
        }
        for group in &spec.security_groups {
            req = req.security_groups(group);
        }
        for group_id in &spec.security_group_ids {
            req = req.security_group_ids(group_id);
        }
        if let Some(user_data) = &spec.user_data {
            req = req.user_data(base64::engine::general_purpose::STANDARD.encode(user_data));
        }
        for device in &spec.block_devices {
            req = req.block_device_mappings(
                BlockDeviceMapping::builder()
                    .device_name(&device.device_name)
                    .set_virtual_name(device.virtual_name.clone())
                    .build(),
            );
        }
        let out = req.send().await.map_err(api_err)?;
        out.instances()
            .first()
            .and_then(|i| convert_instance(region, i))
            .ok_or_else(|| AwsError::Api("run_instances returned no instance".to_string()))
    }

    async fn start_instance(&self, region: &str, instance_id: &str) -> Result<()> {
        self.client(region)
            .await
            .start_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn stop_instance(&self, region: &str, instance_id: &str) -> Result<()> {
        self.client(region)
            .await
            .stop_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn terminate_instance(&self, region: &str, instance_id: &str) -> Result<()> {
        self.client(region)
            .await
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn console_output(&self, region: &str, instance_id: &str) -> Result<String> {
        let out = self
            .client(region)
            .await
            .get_console_output()
            .instance_id(instance_id)
            .send()
            .await
            .map_err(api_err)?;
        let raw = out.output().unwrap_or_default();
        // The console log arrives base64 encoded.
        match base64::engine::general_purpose::STANDARD.decode(raw) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(_) => Ok(raw.to_string()),
        }
    }

    async fn create_tag(
        &self,
        region: &str,
        resource_id: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.client(region)
            .await
            .create_tags()
            .resources(resource_id)
            .tags(Tag::builder().key(key).value(value).build())
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn list_addresses(&self, region: &str) -> Result<Vec<CloudAddress>> {
        let out = self
            .client(region)
            .await
            .describe_addresses()
            .send()
            .await
            .map_err(api_err)?;
        Ok(out
            .addresses()
            .iter()
            .filter_map(|a| {
                Some(CloudAddress {
                    public_ip: a.public_ip()?.to_string(),
                    region: region.to_string(),
                    allocation_id: a.allocation_id().map(str::to_string),
                    instance_id: a.instance_id().map(str::to_string),
                })
            })
            .collect())
    }

    async fn allocate_address(&self, region: &str) -> Result<CloudAddress> {
        let out = self
            .client(region)
            .await
            .allocate_address()
            .send()
            .await
            .map_err(api_err)?;
        Ok(CloudAddress {
            public_ip: out.public_ip().unwrap_or_default().to_string(),
            region: region.to_string(),
            allocation_id: out.allocation_id().map(str::to_string),
            instance_id: None,
        })
    }

    async fn associate_address(
        &self,
        region: &str,
        instance_id: &str,
        public_ip: &str,
    ) -> Result<()> {
        // VPC addresses must be associated by allocation id.
        let allocation_id = self
            .list_addresses(region)
            .await?
            .into_iter()
            .find(|a| a.public_ip == public_ip)
            .and_then(|a| a.allocation_id);
        let mut req = self
            .client(region)
            .await
            .associate_address()
            .instance_id(instance_id);
        match allocation_id {
            Some(id) => req = req.allocation_id(id),
            None => req = req.public_ip(public_ip),
        }
        req.send().await.map_err(api_err)?;
        Ok(())
    }

    async fn release_address(&self, region: &str, public_ip: &str) -> Result<()> {
        let allocation_id = self
            .list_addresses(region)
            .await?
            .into_iter()
            .find(|a| a.public_ip == public_ip)
            .and_then(|a| a.allocation_id);
        let mut req = self.client(region).await.release_address();
        match allocation_id {
            Some(id) => req = req.allocation_id(id),
            None => req = req.public_ip(public_ip),
        }
        req.send().await.map_err(api_err)?;
        Ok(())
    }

    async fn list_volumes(&self, region: &str, vf: &VolumeFilter) -> Result<Vec<CloudVolume>> {
        let mut req = self.client(region).await.describe_volumes();
        if let Some(instance_id) = &vf.attached_to {
            req = req.filters(filter("attachment.instance-id", instance_id));
        }
        if !vf.volume_ids.is_empty() {
            req = req.set_volume_ids(Some(vf.volume_ids.clone()));
        }
        let out = req.send().await.map_err(api_err)?;
        Ok(out.volumes().iter().filter_map(convert_volume).collect())
    }

    async fn create_volume(
        &self,
        region: &str,
        availability_zone: &str,
        size_gb: i32,
    ) -> Result<CloudVolume> {
        let out = self
            .client(region)
            .await
            .create_volume()
            .availability_zone(availability_zone)
            .size(size_gb)
            .send()
            .await
            .map_err(api_err)?;
        Ok(CloudVolume {
            volume_id: out.volume_id().unwrap_or_default().to_string(),
            size_gb: out.size().unwrap_or(size_gb),
            availability_zone: availability_zone.to_string(),
            attached_to: None,
            device: None,
            tags: Default::default(),
        })
    }

    async fn attach_volume(
        &self,
        region: &str,
        volume_id: &str,
        instance_id: &str,
        device: &str,
    ) -> Result<()> {
        self.client(region)
            .await
            .attach_volume()
            .volume_id(volume_id)
            .instance_id(instance_id)
            .device(device)
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn delete_volume(&self, region: &str, volume_id: &str) -> Result<()> {
        self.client(region)
            .await
            .delete_volume()
            .volume_id(volume_id)
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }
}
