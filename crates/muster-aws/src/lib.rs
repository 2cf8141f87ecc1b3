//! EC2/VPC drivers and resource managers for Muster.
//!
//! This crate mirrors an AWS account's resource graph into the
//! [`muster_inventory`] store and drives instance lifecycle through it.
//! All cloud traffic goes through the [`Ec2Api`] seam; production code
//! uses the `aws-sdk-ec2` backed [`SdkEc2`] client, tests an in-memory
//! cloud.
//!
//! The moving parts:
//!
//! - [`ConnectionManager`] owns the client for one credential set and
//!   role, guards one-resource-per-entity, and records cloud objects onto
//!   typed entity records.
//! - instance lifecycle (`create`/`start`/`stop`/`destroy`) with bounded
//!   state polling that reports timeouts as [`WaitOutcome::TimedOut`].
//! - EBS and elastic-IP reconciliation between local records and live
//!   cloud state.
//! - [`Bootstrap`], the idempotent one-shot import of the whole account.

pub mod api;
pub mod bootstrap;
pub mod client;
pub mod connection;
pub mod drivers;
pub mod error;
pub mod instance;
pub mod ipaddr;
pub mod secgroup;
pub mod userdata;
pub mod volume;

pub use api::{
    BlockDevice, CloudAddress, CloudInstance, CloudRegion, CloudSecurityGroup, CloudSubnet,
    CloudVolume, CloudVpc, CloudZone, Ec2Api, LaunchSpec, VolumeFilter,
};
pub use bootstrap::{Bootstrap, BootstrapOptions, BootstrapReport};
pub use client::{AwsCredentials, SdkEc2};
pub use connection::{ConnectionManager, InstanceResource};
pub use drivers::{CloudBacked, LiveResource};
pub use error::{AwsError, Result};
pub use instance::{CreateOutcome, WaitOutcome, DEFAULT_POLL_INTERVAL, MAX_POLL_COUNT};
pub use ipaddr::{decode_ip, encode_ip, ensure_managed, IpManager, IP_BASE};
pub use secgroup::{resolve_security_groups, ResolvedGroups};
