//! Security group resolution.
//!
//! Groups may be referenced by name or id. Unknown ids are an error;
//! unknown names are created on demand.

use crate::api::Ec2Api;
use crate::error::{AwsError, Result};
use std::collections::BTreeMap;

/// Groups resolved for a launch, keyed both ways.
#[derive(Debug, Clone, Default)]
pub struct ResolvedGroups {
    pub ids: Vec<String>,
    pub names: Vec<String>,
}

pub async fn resolve_security_groups(
    api: &dyn Ec2Api,
    region: &str,
    names: &[String],
    ids: &[String],
    vpc_id: Option<&str>,
) -> Result<ResolvedGroups> {
    let existing: BTreeMap<String, String> = api
        .list_security_groups(region, vpc_id)
        .await?
        .into_iter()
        .map(|g| (g.group_id, g.group_name))
        .collect();

    // A referenced id that the cloud does not know is unrecoverable.
    let unknown: Vec<&str> = ids
        .iter()
        .filter(|id| !existing.contains_key(*id))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(AwsError::UnknownSecurityGroupIds(unknown.join(",")));
    }

    let mut resolved: BTreeMap<String, String> = BTreeMap::new();
    for id in ids {
        if let Some(name) = existing.get(id) {
            resolved.insert(id.clone(), name.clone());
        }
    }

    for name in names {
        let known: Vec<(&String, &String)> =
            existing.iter().filter(|(_, n)| *n == name).collect();
        if known.is_empty() {
            let description = format!("Created on {}", chrono::Utc::now());
            tracing::info!(region, name, "creating security group");
            let group = api
                .create_security_group(region, name, &description, vpc_id)
                .await?;
            resolved.insert(group.group_id, group.group_name);
        } else {
            for (id, n) in known {
                resolved.insert(id.clone(), n.clone());
            }
        }
    }

    Ok(ResolvedGroups {
        ids: resolved.keys().cloned().collect(),
        names: resolved.values().cloned().collect(),
    })
}
