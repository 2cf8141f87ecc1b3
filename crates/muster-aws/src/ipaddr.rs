//! Elastic IP management.
//!
//! Addresses are stored as the signed offset of their u32 value from
//! `2^31`, the encoding the rest of the inventory understands. A static
//! table of EC2 public ranges (plus the internal 10/8 block) gates which
//! addresses the manager will accept.

use crate::api::Ec2Api;
use crate::connection::ConnectionManager;
use crate::error::{AwsError, Result};
use muster_inventory::Inventory;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

pub const IP_BASE: i64 = 2_147_483_648;

pub fn encode_ip(ip: Ipv4Addr) -> i64 {
    i64::from(u32::from(ip)) - IP_BASE
}

pub fn decode_ip(encoded: i64) -> Ipv4Addr {
    Ipv4Addr::from((encoded + IP_BASE) as u32)
}

/// Published EC2 public ranges per region, plus the internal block.
const EC2_IP_RANGES: &[(&str, &[&str])] = &[
    (
        "ap-northeast-1",
        &[
            "103.4.8.0/21",
            "175.41.192.0/18",
            "176.32.64.0/19",
            "176.34.0.0/18",
            "46.51.224.0/19",
            "54.248.0.0/15",
        ],
    ),
    (
        "ap-southeast-1",
        &[
            "122.248.192.0/18",
            "175.41.128.0/18",
            "46.137.192.0/18",
            "46.51.216.0/21",
            "54.251.0.0/16",
        ],
    ),
    (
        "eu-west-1",
        &[
            "176.34.128.0/17",
            "176.34.64.0/18",
            "46.137.0.0/17",
            "46.137.128.0/18",
            "46.51.128.0/18",
            "46.51.192.0/20",
            "54.246.0.0/16",
            "54.247.0.0/16",
            "79.125.0.0/17",
        ],
    ),
    ("sa-east-1", &["177.71.128.0/17", "54.232.0.0/16"]),
    (
        "us-east-1",
        &[
            "107.20.0.0/14",
            "174.129.0.0/16",
            "184.72.128.0/17",
            "184.72.64.0/18",
            "184.73.0.0/16",
            "204.236.192.0/18",
            "23.20.0.0/14",
            "50.16.0.0/15",
            "50.19.0.0/16",
            "54.234.0.0/15",
            "54.236.0.0/15",
            "54.242.0.0/15",
            "67.202.0.0/18",
            "72.44.32.0/19",
            "75.101.128.0/17",
        ],
    ),
    (
        "us-west-1",
        &[
            "184.169.128.0/17",
            "184.72.0.0/18",
            "204.236.128.0/18",
            "50.18.0.0/16",
            "54.241.0.0/16",
        ],
    ),
    ("us-west-2", &["50.112.0.0/16", "54.245.0.0/16"]),
    ("internal", &["10.0.0.0/8"]),
];

fn cidr_contains(cidr: &str, ip: u32) -> bool {
    let Some((base, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(base) = base.parse::<Ipv4Addr>() else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u32>() else {
        return false;
    };
    if prefix > 32 {
        return false;
    }
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    };
    (ip & mask) == (u32::from(base) & mask)
}

/// Region whose published range contains this address, if any.
pub fn managed_region(ip: Ipv4Addr) -> Option<&'static str> {
    let raw = u32::from(ip);
    EC2_IP_RANGES
        .iter()
        .find(|(_, ranges)| ranges.iter().any(|cidr| cidr_contains(cidr, raw)))
        .map(|(region, _)| *region)
}

/// Check that an address is inside a managed range and encode it.
pub fn ensure_managed(ip: Ipv4Addr) -> Result<i64> {
    if managed_region(ip).is_none() {
        return Err(AwsError::UnmanagedIp(ip.to_string()));
    }
    Ok(encode_ip(ip))
}

/// Refresh the record's encoded private/public addresses from the live
/// instance.
pub async fn update_metadata(
    conn: &ConnectionManager,
    inventory: &mut Inventory,
    entity: &str,
) -> Result<()> {
    let rec = inventory.instance(entity)?;
    let instance_id = rec
        .instance_id
        .clone()
        .ok_or_else(|| AwsError::NoInstance(entity.to_string()))?;
    let region = conn.region_of(rec);
    let live = conn
        .api()
        .get_instance(&region, &instance_id)
        .await?
        .ok_or_else(|| AwsError::NoInstance(entity.to_string()))?;

    let private = match &live.private_ip {
        Some(ip) => Some(encode_ip(
            ip.parse()
                .map_err(|_| AwsError::InvalidIp(ip.clone()))?,
        )),
        None => None,
    };
    let public = match &live.public_ip {
        Some(ip) => Some(encode_ip(
            ip.parse()
                .map_err(|_| AwsError::InvalidIp(ip.clone()))?,
        )),
        None => None,
    };

    let rec = inventory.instance_mut(entity)?;
    rec.private_ip = private;
    rec.public_ip = public;
    Ok(())
}

pub fn clear_metadata(inventory: &mut Inventory, entity: &str) -> Result<()> {
    let rec = inventory.instance_mut(entity)?;
    rec.private_ip = None;
    rec.public_ip = None;
    Ok(())
}

/// Tracks elastic IP reservations on a manager entity and hands addresses
/// to running instances.
pub struct IpManager {
    name: String,
    api: Arc<dyn Ec2Api>,
}

impl IpManager {
    pub fn new(name: impl Into<String>, api: Arc<dyn Ec2Api>) -> Self {
        Self {
            name: name.into(),
            api,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a previously allocated address, or allocate a fresh one from
    /// the cloud when none is given.
    pub async fn reserve_ip(
        &self,
        inventory: &mut Inventory,
        region: &str,
        ip: Option<Ipv4Addr>,
    ) -> Result<Ipv4Addr> {
        let encoded = match ip {
            Some(ip) => ensure_managed(ip)?,
            None => {
                let addr = self.api.allocate_address(region).await?;
                let parsed: Ipv4Addr = addr
                    .public_ip
                    .parse()
                    .map_err(|_| AwsError::InvalidIp(addr.public_ip.clone()))?;
                tracing::info!(region, ip = %parsed, "allocated elastic IP");
                encode_ip(parsed)
            }
        };
        inventory
            .manager_mut(&self.name)?
            .reserved_ips
            .insert((region.to_string(), encoded));
        Ok(decode_ip(encoded))
    }

    /// Reserved addresses grouped by region.
    pub fn reserved_ips(&self, inventory: &Inventory) -> Result<BTreeMap<String, Vec<Ipv4Addr>>> {
        let rec = inventory.manager(&self.name)?;
        let mut grouped: BTreeMap<String, Vec<Ipv4Addr>> = BTreeMap::new();
        for (region, encoded) in &rec.reserved_ips {
            grouped
                .entry(region.clone())
                .or_default()
                .push(decode_ip(*encoded));
        }
        Ok(grouped)
    }

    /// Reconcile local reservations against the cloud's live allocated
    /// address list: stale local records are removed, live addresses
    /// missing locally are added, and the intersection is untouched. All
    /// store writes happen inside one transaction.
    pub async fn update_reserved_ips(&self, inventory: &mut Inventory) -> Result<()> {
        let mut live: BTreeSet<(String, i64)> = BTreeSet::new();
        for region in self.api.list_regions().await? {
            for addr in self.api.list_addresses(&region.name).await? {
                let parsed: Ipv4Addr = addr
                    .public_ip
                    .parse()
                    .map_err(|_| AwsError::InvalidIp(addr.public_ip.clone()))?;
                live.insert((region.name.clone(), encode_ip(parsed)));
            }
        }

        inventory.transaction(|inventory| {
            let rec = inventory.manager_mut(&self.name)?;
            let local = rec.reserved_ips.clone();
            for stale in local.difference(&live) {
                tracing::debug!(region = %stale.0, ip = %decode_ip(stale.1), "dropping stale reservation");
                rec.reserved_ips.remove(stale);
            }
            for missing in live.difference(&local) {
                tracing::debug!(region = %missing.0, ip = %decode_ip(missing.1), "adding live reservation");
                rec.reserved_ips.insert(missing.clone());
            }
            Ok(())
        })
    }

    /// Associate the first unused reservation in the instance's region
    /// with a running instance and refresh its IP metadata.
    pub async fn allocate_to_instance(
        &self,
        inventory: &mut Inventory,
        conn: &ConnectionManager,
        entity: &str,
    ) -> Result<Ipv4Addr> {
        let state = conn.instance_state(inventory, entity).await?;
        if state != "running" {
            return Err(AwsError::NotRunning(entity.to_string()));
        }

        let rec = inventory.instance(entity)?.clone();
        let instance_id = rec
            .instance_id
            .clone()
            .ok_or_else(|| AwsError::NoInstance(entity.to_string()))?;
        let region = conn.region_of(&rec);

        let in_use: BTreeSet<i64> = inventory
            .of_kind(muster_inventory::EntityKind::Instance)
            .filter_map(|e| match &e.record {
                muster_inventory::Record::Instance(r) => r.public_ip,
                _ => None,
            })
            .collect();

        let manager = inventory.manager(&self.name)?;
        let candidate = manager
            .reserved_ips
            .iter()
            .find(|(r, encoded)| r == &region && !in_use.contains(encoded))
            .map(|(_, encoded)| *encoded)
            .ok_or_else(|| AwsError::NoAvailableIp(region.clone()))?;

        let ip = decode_ip(candidate);
        self.api
            .associate_address(&region, &instance_id, &ip.to_string())
            .await?;
        tracing::info!(entity, %ip, "associated elastic IP");

        update_metadata(conn, inventory, entity).await?;
        Ok(ip)
    }
}
