pub mod bootstrap;
pub mod ec2;
pub mod vpc;

use anyhow::Context;
use muster_aws::{AwsCredentials, ConnectionManager, SdkEc2};
use muster_inventory::{Inventory, ManagerRecord, ManagerRole, Record};
use std::sync::Arc;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Credential flags from the top-level command line, used only when a
/// manager entity has to be created.
#[derive(Debug, Clone, Default)]
pub struct AwsKeys {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Look up a connection manager entity, creating it from the credential
/// flags when missing, and build the live manager around its record.
pub fn connect(
    inventory: &mut Inventory,
    name: &str,
    role: ManagerRole,
    keys: &AwsKeys,
) -> anyhow::Result<ConnectionManager> {
    let rec = if inventory.get(name).is_some() {
        inventory.manager(name)?.clone()
    } else {
        let (key, secret) = keys
            .access_key_id
            .clone()
            .zip(keys.secret_access_key.clone())
            .with_context(|| {
                format!(
                    "connection manager '{}' does not exist: \
                     you must specify both an access key id and a secret key to create it",
                    name
                )
            })?;
        let rec = ManagerRecord::new(role, key, secret, DEFAULT_REGION);
        inventory.get_or_create(name, Record::Manager(rec.clone()))?;
        tracing::info!(manager = name, %role, "created connection manager");
        rec
    };

    let api = Arc::new(SdkEc2::new(AwsCredentials::new(
        rec.access_key_id.clone(),
        rec.secret_access_key.clone(),
    )));
    Ok(ConnectionManager::new(name, rec.role, rec.default_region, api))
}
