//! Typed entity inventory for Muster.
//!
//! Every cloud concept Muster mirrors (region, availability zone, VPC,
//! subnet, security group, instance, manager) is stored as an [`Entity`]
//! carrying one validated [`Record`] variant, linked into a containment
//! graph. The store persists as a single JSON document and supports
//! snapshot transactions for multi-step reconciliation.

pub mod entity;
pub mod error;
pub mod store;

pub use entity::{
    Entity, EntityKind, InstanceRecord, ManagerRecord, ManagerRole, Record, RegionRecord,
    SecurityGroupRecord, SubnetRecord, VolumeSlot, VpcRecord, ZoneRecord,
};
pub use error::{InventoryError, Result};
pub use store::{Inventory, InventoryStore};
