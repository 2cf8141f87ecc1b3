//! Cloud-backed entity capability.
//!
//! Entity records that mirror a live cloud object implement [`CloudBacked`]
//! independently; there is no driver inheritance chain. The owning
//! connection manager supplies the client.

use crate::api::{CloudInstance, CloudSubnet, CloudVpc};
use crate::connection::ConnectionManager;
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use muster_inventory::{InstanceRecord, SubnetRecord, VpcRecord};

/// A live cloud object fetched for one entity.
#[derive(Debug, Clone)]
pub enum LiveResource {
    Instance(CloudInstance),
    Vpc(CloudVpc),
    Subnet(CloudSubnet),
}

/// Capability of fetching the live cloud object behind a record.
#[async_trait]
pub trait CloudBacked {
    async fn fetch_live(&self, conn: &ConnectionManager) -> Result<LiveResource>;

    async fn current_state(&self, conn: &ConnectionManager) -> Result<String>;
}

#[async_trait]
impl CloudBacked for InstanceRecord {
    async fn fetch_live(&self, conn: &ConnectionManager) -> Result<LiveResource> {
        let instance_id = self
            .instance_id
            .as_deref()
            .ok_or_else(|| AwsError::NoInstance("<unbound instance>".to_string()))?;
        let region = conn.region_of(self);
        conn.api()
            .get_instance(&region, instance_id)
            .await?
            .map(LiveResource::Instance)
            .ok_or_else(|| AwsError::StaleResource(instance_id.to_string()))
    }

    async fn current_state(&self, conn: &ConnectionManager) -> Result<String> {
        match self.fetch_live(conn).await? {
            LiveResource::Instance(inst) => Ok(inst.state),
            _ => unreachable!("instance record fetched a non-instance"),
        }
    }
}

#[async_trait]
impl CloudBacked for VpcRecord {
    async fn fetch_live(&self, conn: &ConnectionManager) -> Result<LiveResource> {
        let region = self
            .region
            .clone()
            .unwrap_or_else(|| conn.default_region().to_string());
        conn.api()
            .get_vpc(&region, &self.vpc_id)
            .await?
            .map(LiveResource::Vpc)
            .ok_or_else(|| AwsError::StaleResource(self.vpc_id.clone()))
    }

    async fn current_state(&self, conn: &ConnectionManager) -> Result<String> {
        match self.fetch_live(conn).await? {
            LiveResource::Vpc(vpc) => Ok(vpc.state),
            _ => unreachable!("vpc record fetched a non-vpc"),
        }
    }
}

#[async_trait]
impl CloudBacked for SubnetRecord {
    async fn fetch_live(&self, conn: &ConnectionManager) -> Result<LiveResource> {
        let region = self
            .region
            .clone()
            .unwrap_or_else(|| conn.default_region().to_string());
        conn.api()
            .get_subnet(&region, &self.subnet_id)
            .await?
            .map(LiveResource::Subnet)
            .ok_or_else(|| AwsError::StaleResource(self.subnet_id.clone()))
    }

    async fn current_state(&self, conn: &ConnectionManager) -> Result<String> {
        match self.fetch_live(conn).await? {
            LiveResource::Subnet(subnet) => Ok(subnet.state),
            _ => unreachable!("subnet record fetched a non-subnet"),
        }
    }
}
