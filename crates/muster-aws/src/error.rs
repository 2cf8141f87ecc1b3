//! AWS layer error types

use muster_inventory::InventoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("No image specified for {0}")]
    MissingImage(String),

    #[error("No instance type specified for {0}")]
    MissingInstanceType(String),

    #[error("{entity} is already bound to {resource}")]
    AlreadyBound { entity: String, resource: String },

    #[error("{0} has no live instance")]
    NoInstance(String),

    #[error("Security group ids not present in the cloud: {0}")]
    UnknownSecurityGroupIds(String),

    #[error("{0} is not a valid IP address")]
    InvalidIp(String),

    #[error("{0} is not in a managed IP range")]
    UnmanagedIp(String),

    #[error("No reserved IP available in region {0}")]
    NoAvailableIp(String),

    #[error("{0} is not a running instance")]
    NotRunning(String),

    #[error("{0} no longer resolves in the cloud")]
    StaleResource(String),

    #[error("AWS API error: {0}")]
    Api(String),

    #[error("User data template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),
}

pub type Result<T> = std::result::Result<T, AwsError>;
