//! The inventory store: entity map, containment graph, persistence.

use crate::entity::{Entity, EntityKind, InstanceRecord, ManagerRecord, Record};
use crate::error::{InventoryError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;

const INVENTORY_VERSION: u32 = 1;

/// In-memory inventory: named entities plus parent -> children edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    version: u32,
    pub updated_at: DateTime<Utc>,
    entities: BTreeMap<String, Entity>,
    children: BTreeMap<String, BTreeSet<String>>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            version: INVENTORY_VERSION,
            updated_at: Utc::now(),
            entities: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Fetch the entity with this name, creating it from `record` if it
    /// does not exist. Idempotent by name; an existing entity of a
    /// different kind is an error.
    pub fn get_or_create(&mut self, name: &str, record: Record) -> Result<&mut Entity> {
        self.updated_at = Utc::now();
        match self.entities.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let existing = entry.into_mut();
                if existing.kind() != record.kind() {
                    return Err(InventoryError::KindMismatch {
                        name: name.to_string(),
                        expected: record.kind(),
                        found: existing.kind(),
                    });
                }
                Ok(existing)
            }
            Entry::Vacant(entry) => {
                tracing::debug!(name, kind = %record.kind(), "creating entity");
                Ok(entry.insert(Entity::new(name, record)))
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub fn expect(&self, name: &str) -> Result<&Entity> {
        self.entities
            .get(name)
            .ok_or_else(|| InventoryError::NotFound(name.to_string()))
    }

    pub fn expect_mut(&mut self, name: &str) -> Result<&mut Entity> {
        self.updated_at = Utc::now();
        self.entities
            .get_mut(name)
            .ok_or_else(|| InventoryError::NotFound(name.to_string()))
    }

    pub fn expect_kind(&self, name: &str, kind: EntityKind) -> Result<&Entity> {
        let entity = self.expect(name)?;
        if entity.kind() != kind {
            return Err(InventoryError::KindMismatch {
                name: name.to_string(),
                expected: kind,
                found: entity.kind(),
            });
        }
        Ok(entity)
    }

    /// Typed access to an instance entity's record.
    pub fn instance(&self, name: &str) -> Result<&InstanceRecord> {
        match &self.expect(name)?.record {
            Record::Instance(rec) => Ok(rec),
            other => Err(InventoryError::KindMismatch {
                name: name.to_string(),
                expected: EntityKind::Instance,
                found: other.kind(),
            }),
        }
    }

    pub fn instance_mut(&mut self, name: &str) -> Result<&mut InstanceRecord> {
        self.updated_at = Utc::now();
        let entity = self
            .entities
            .get_mut(name)
            .ok_or_else(|| InventoryError::NotFound(name.to_string()))?;
        entity.touch();
        match &mut entity.record {
            Record::Instance(rec) => Ok(rec),
            other => Err(InventoryError::KindMismatch {
                name: name.to_string(),
                expected: EntityKind::Instance,
                found: other.kind(),
            }),
        }
    }

    pub fn manager(&self, name: &str) -> Result<&ManagerRecord> {
        match &self.expect(name)?.record {
            Record::Manager(rec) => Ok(rec),
            other => Err(InventoryError::KindMismatch {
                name: name.to_string(),
                expected: EntityKind::Manager,
                found: other.kind(),
            }),
        }
    }

    pub fn manager_mut(&mut self, name: &str) -> Result<&mut ManagerRecord> {
        self.updated_at = Utc::now();
        let entity = self
            .entities
            .get_mut(name)
            .ok_or_else(|| InventoryError::NotFound(name.to_string()))?;
        entity.touch();
        match &mut entity.record {
            Record::Manager(rec) => Ok(rec),
            other => Err(InventoryError::KindMismatch {
                name: name.to_string(),
                expected: EntityKind::Manager,
                found: other.kind(),
            }),
        }
    }

    /// Delete an entity and every containment edge touching it.
    pub fn remove(&mut self, name: &str) -> Option<Entity> {
        let removed = self.entities.remove(name)?;
        self.children.remove(name);
        for set in self.children.values_mut() {
            set.remove(name);
        }
        self.updated_at = Utc::now();
        tracing::debug!(name, "removed entity");
        Some(removed)
    }

    /// Add a containment edge. Returns true when the edge is new.
    pub fn insert(&mut self, parent: &str, child: &str) -> Result<bool> {
        if parent == child {
            return Err(InventoryError::SelfContainment(parent.to_string()));
        }
        self.expect(parent)?;
        self.expect(child)?;
        self.updated_at = Utc::now();
        Ok(self
            .children
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string()))
    }

    pub fn contains(&self, parent: &str, child: &str) -> bool {
        self.children
            .get(parent)
            .map(|set| set.contains(child))
            .unwrap_or(false)
    }

    pub fn children(&self, parent: &str) -> Vec<&str> {
        self.children
            .get(parent)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn parents(&self, child: &str) -> Vec<&str> {
        self.children
            .iter()
            .filter(|(_, set)| set.contains(child))
            .map(|(parent, _)| parent.as_str())
            .collect()
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(move |e| e.kind() == kind)
    }

    /// Run `f` against the store, restoring the pre-call snapshot if it
    /// errors. Used around multi-step reconciliation.
    pub fn transaction<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
    {
        let snapshot = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                *self = snapshot;
                Err(err)
            }
        }
    }
}

/// Reads and writes the inventory JSON file, keeping a backup of the
/// previous revision on every save.
pub struct InventoryStore {
    path: PathBuf,
}

impl InventoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "inventory.json".to_string());
        self.path.with_file_name(format!("{}.backup", name))
    }

    /// Load the inventory, returning an empty store when the file does not
    /// exist yet.
    pub async fn load(&self) -> Result<Inventory> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "inventory file not found, starting empty");
            return Ok(Inventory::new());
        }
        let content = fs::read_to_string(&self.path).await?;
        let inventory: Inventory = serde_json::from_str(&content)?;
        if inventory.version > INVENTORY_VERSION {
            return Err(InventoryError::StateError(format!(
                "inventory version {} is newer than supported version {}",
                inventory.version, INVENTORY_VERSION
            )));
        }
        tracing::debug!(entities = inventory.len(), "loaded inventory");
        Ok(inventory)
    }

    pub async fn save(&self, inventory: &Inventory) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).await?;
            }
        }

        if self.path.exists() {
            let backup = self.backup_path();
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&self.path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(inventory)?;
        fs::write(&self.path, content).await?;
        tracing::debug!(entities = inventory.len(), path = %self.path.display(), "saved inventory");
        Ok(())
    }
}
