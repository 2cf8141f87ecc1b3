//! Entity kinds and their typed records.
//!
//! Each entity kind carries an explicit struct instead of a free-form
//! attribute bag, so malformed data is rejected when it is written rather
//! than when it is read back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Kind of an inventory entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Region,
    Zone,
    Vpc,
    Subnet,
    SecurityGroup,
    Instance,
    Pool,
    Manager,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Region => "region",
            EntityKind::Zone => "zone",
            EntityKind::Vpc => "vpc",
            EntityKind::Subnet => "subnet",
            EntityKind::SecurityGroup => "security-group",
            EntityKind::Instance => "instance",
            EntityKind::Pool => "pool",
            EntityKind::Manager => "manager",
        };
        write!(f, "{}", s)
    }
}

/// Typed payload of an entity, one variant per kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Region(RegionRecord),
    Zone(ZoneRecord),
    Vpc(VpcRecord),
    Subnet(SubnetRecord),
    SecurityGroup(SecurityGroupRecord),
    Instance(Box<InstanceRecord>),
    Pool,
    Manager(ManagerRecord),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Region(_) => EntityKind::Region,
            Record::Zone(_) => EntityKind::Zone,
            Record::Vpc(_) => EntityKind::Vpc,
            Record::Subnet(_) => EntityKind::Subnet,
            Record::SecurityGroup(_) => EntityKind::SecurityGroup,
            Record::Instance(_) => EntityKind::Instance,
            Record::Pool => EntityKind::Pool,
            Record::Manager(_) => EntityKind::Manager,
        }
    }
}

/// EC2 region. The entity name equals the cloud region name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionRecord {
    pub region: String,
}

/// Availability zone. Placement is unique within its region.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub placement: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VpcRecord {
    pub vpc_id: String,
    pub region: Option<String>,
    pub cidr_block: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubnetRecord {
    pub subnet_id: String,
    pub vpc_id: Option<String>,
    pub region: Option<String>,
    pub availability_zone: Option<String>,
    pub cidr_block: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityGroupRecord {
    pub group_id: String,
    pub group_name: String,
    pub vpc_id: Option<String>,
}

/// Requested or provisioned EBS storage for one device slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VolumeSlot {
    /// Declared locally, volume not created yet.
    Requested { size_gb: i32 },
    /// Backed by a live cloud volume.
    Provisioned { volume_id: String },
}

/// One virtual server. At most one live cloud instance per entity; the
/// entity outlives termination unless explicitly destroyed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub key_name: Option<String>,
    pub region: Option<String>,
    pub placement: Option<String>,
    pub subnet_id: Option<String>,
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    pub user_data: Option<String>,
    #[serde(default)]
    pub skip_ephemeral: bool,
    /// Name of the connection manager this entity is bound to.
    pub manager: Option<String>,
    /// Live cloud instance id, set once the resource is recorded.
    pub instance_id: Option<String>,
    /// Device name (without the `/dev/` prefix) to EBS slot.
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeSlot>,
    /// Private address, encoded as offset from the IP base constant.
    pub private_ip: Option<i64>,
    /// Public address, encoded as offset from the IP base constant.
    pub public_ip: Option<i64>,
}

impl InstanceRecord {
    pub fn with_image(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    pub fn with_instance_type(mut self, instance_type: impl Into<String>) -> Self {
        self.instance_type = Some(instance_type.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_subnet(mut self, subnet_id: impl Into<String>) -> Self {
        self.subnet_id = Some(subnet_id.into());
        self
    }

    /// Region this instance lives in, falling back to the placement with
    /// its trailing zone letter removed (`us-east-1a` -> `us-east-1`).
    pub fn effective_region(&self) -> Option<String> {
        if let Some(region) = &self.region {
            return Some(region.clone());
        }
        self.placement.as_ref().map(|p| {
            let trimmed = p.trim_end_matches(|c: char| c.is_ascii_alphabetic());
            trimmed.to_string()
        })
    }
}

/// Role of a manager entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerRole {
    Ec2,
    Vpc,
    Ip,
}

impl std::fmt::Display for ManagerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerRole::Ec2 => write!(f, "ec2"),
            ManagerRole::Vpc => write!(f, "vpc"),
            ManagerRole::Ip => write!(f, "ip"),
        }
    }
}

/// Connection or IP manager: credentials plus, for the IP role, the set of
/// reserved elastic IPs keyed by region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerRecord {
    pub role: ManagerRole,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub default_region: String,
    /// (region, encoded address) reservations. Only the IP role writes
    /// here, but the field lives on every manager so one schema covers all
    /// roles.
    #[serde(default)]
    pub reserved_ips: BTreeSet<(String, i64)>,
}

impl ManagerRecord {
    pub fn new(
        role: ManagerRole,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        default_region: impl Into<String>,
    ) -> Self {
        Self {
            role,
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            default_region: default_region.into(),
            reserved_ips: BTreeSet::new(),
        }
    }
}

/// A named inventory object with its typed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub record: Record,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(name: impl Into<String>, record: Record) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            record,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.record.kind()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
