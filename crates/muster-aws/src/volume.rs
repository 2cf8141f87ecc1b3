//! EBS volume reconciliation.
//!
//! Local declarations and live attachment state are synced both ways:
//! requested devices get volumes created and attached, stale or stolen
//! volume ids are dropped locally, and attachments the inventory never
//! heard of are recorded. Attached volumes are always tagged
//! `<entity>:<device>`.

use crate::api::VolumeFilter;
use crate::connection::ConnectionManager;
use crate::error::{AwsError, Result};
use muster_inventory::{Inventory, VolumeSlot};

impl ConnectionManager {
    pub async fn reconcile_volumes(&self, inventory: &mut Inventory, entity: &str) -> Result<()> {
        let rec = inventory.instance(entity)?.clone();
        let instance_id = rec
            .instance_id
            .clone()
            .ok_or_else(|| AwsError::NoInstance(entity.to_string()))?;
        let region = self.region_of(&rec);

        // Take the zone from the live instance in case the local placement
        // has drifted.
        let live = self
            .api()
            .get_instance(&region, &instance_id)
            .await?
            .ok_or_else(|| AwsError::NoInstance(entity.to_string()))?;
        let zone = live
            .placement
            .clone()
            .or_else(|| rec.placement.clone())
            .unwrap_or_default();

        // Local -> cloud. Each slot is written back as soon as its cloud
        // calls succeed; a failure on a later device must not lose a
        // volume that was already created, or a retry would create it
        // twice.
        for (dev, slot) in &rec.volumes {
            let device = format!("/dev/{}", dev);
            let name_tag = format!("{}:{}", entity, device);
            match slot {
                VolumeSlot::Requested { size_gb } => {
                    tracing::info!(entity, device, size_gb, "creating volume");
                    let vol = self.api().create_volume(&region, &zone, *size_gb).await?;
                    inventory.instance_mut(entity)?.volumes.insert(
                        dev.clone(),
                        VolumeSlot::Provisioned {
                            volume_id: vol.volume_id.clone(),
                        },
                    );
                    self.api()
                        .attach_volume(&region, &vol.volume_id, &instance_id, &device)
                        .await?;
                    self.api()
                        .create_tag(&region, &vol.volume_id, "Name", &name_tag)
                        .await?;
                }
                VolumeSlot::Provisioned { volume_id } => {
                    let found = self
                        .api()
                        .list_volumes(&region, &VolumeFilter::ids(vec![volume_id.clone()]))
                        .await?;
                    match found.into_iter().next() {
                        None => {
                            // The recorded id no longer resolves.
                            tracing::warn!(entity, device, volume_id, "dropping stale volume");
                            inventory.instance_mut(entity)?.volumes.remove(dev);
                        }
                        Some(vol) => match vol.attached_to.as_deref() {
                            None => {
                                self.api()
                                    .attach_volume(&region, &vol.volume_id, &instance_id, &device)
                                    .await?;
                                self.api()
                                    .create_tag(&region, &vol.volume_id, "Name", &name_tag)
                                    .await?;
                            }
                            Some(owner) if owner == instance_id => {
                                if vol.tags.get("Name") != Some(&name_tag) {
                                    self.api()
                                        .create_tag(&region, &vol.volume_id, "Name", &name_tag)
                                        .await?;
                                }
                            }
                            Some(_) => {
                                // Attached to somebody else; it is not ours.
                                tracing::warn!(
                                    entity,
                                    device,
                                    volume_id,
                                    "volume attached elsewhere, dropping"
                                );
                                inventory.instance_mut(entity)?.volumes.remove(dev);
                            }
                        },
                    }
                }
            }
        }

        // Cloud -> local.
        let attached = self
            .api()
            .list_volumes(&region, &VolumeFilter::attached_to(&instance_id))
            .await?;
        for vol in &attached {
            let Some(device) = &vol.device else { continue };
            let dev = device.rsplit('/').next().unwrap_or(device).to_string();
            if !inventory.instance(entity)?.volumes.contains_key(&dev) {
                tracing::debug!(entity, device, volume_id = %vol.volume_id, "recording attached volume");
                inventory.instance_mut(entity)?.volumes.insert(
                    dev,
                    VolumeSlot::Provisioned {
                        volume_id: vol.volume_id.clone(),
                    },
                );
            }
            let name_tag = format!("{}:{}", entity, device);
            if vol.tags.get("Name") != Some(&name_tag) {
                self.api()
                    .create_tag(&region, &vol.volume_id, "Name", &name_tag)
                    .await?;
            }
        }

        Ok(())
    }
}
