//! Device registry
//!
//! Holds every known device keyed by id. All network calls run before the
//! write lock is taken; the lock only guards in-memory updates.

use std::net::Ipv4Addr;
use std::sync::Arc;

use futures::future::join_all;
use hdhr_api::{Device, DeviceId, DeviceMap, DeviceTransport, Tuner};
use parking_lot::RwLock;

use crate::error::{Result, StateError};

/// Known devices and their tuners
pub struct DeviceRegistry {
    transport: Arc<dyn DeviceTransport>,
    devices: RwLock<DeviceMap>,
}

impl DeviceRegistry {
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            devices: RwLock::new(DeviceMap::new()),
        }
    }

    /// Discover devices on `broadcast` and merge them into the registry
    ///
    /// Returns the ids of the devices that answered. Devices already known
    /// at the same address keep their tuners and details.
    pub async fn discover(&self, broadcast: Ipv4Addr) -> Result<Vec<DeviceId>> {
        let found = self.transport.discover(broadcast).await?;
        let ids: Vec<DeviceId> = found.iter().map(|d| d.id.clone()).collect();

        let mut devices = self.devices.write();
        for device in found {
            match devices.get(&device.id) {
                Some(existing) if existing.ip == device.ip => {
                    tracing::trace!(device_id = %device.id, "Device already known");
                }
                _ => {
                    tracing::info!(device_id = %device.id, ip = %device.ip, "Registered device");
                    devices.insert(device.id.clone(), device);
                }
            }
        }

        Ok(ids)
    }

    /// Add a device by address, replacing any entry with the same id
    ///
    /// The device's details are fetched before it is inserted.
    pub async fn add_device(&self, ip: Ipv4Addr) -> Result<Device> {
        let device = self.transport.add_device(ip).await?;
        let device = self.populate(device).await?;

        tracing::info!(device_id = %device.id, ip = %ip, tuners = device.tuners.len(), "Added device");
        self.devices.write().insert(device.id.clone(), device.clone());
        Ok(device)
    }

    async fn populate(&self, mut device: Device) -> Result<Device> {
        let details = self.transport.get_device_details(&device).await?;
        if device.tuners.is_empty() {
            device = device.with_tuner_count(details.tuner_count);
        }
        device.details = Some(details);
        Ok(device)
    }

    /// Re-query details for every device and update them in place
    ///
    /// Tuners are created only for devices that have none; existing tuners
    /// keep their identity. Devices that fail are left untouched and
    /// reported together in `StateError::RefreshFailed`.
    pub async fn refresh(&self) -> Result<()> {
        let devices = self.devices();
        let transport = &self.transport;

        let results = join_all(devices.iter().map(|device| async move {
            (device.id.clone(), transport.get_device_details(device).await)
        }))
        .await;

        let mut failures = Vec::new();
        {
            let mut map = self.devices.write();
            for (id, result) in results {
                match result {
                    Ok(details) => {
                        // Removed while the query was in flight
                        let Some(device) = map.get_mut(&id) else {
                            continue;
                        };
                        if device.tuners.is_empty() {
                            let tuners = Device::new(device.id.clone(), device.ip)
                                .with_tuner_count(details.tuner_count)
                                .tuners;
                            device.tuners = tuners;
                        }
                        device.details = Some(details);
                    }
                    Err(e) => {
                        tracing::warn!(device_id = %id, error = %e, "Device refresh failed");
                        failures.push((id, e));
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(StateError::RefreshFailed(failures))
        }
    }

    /// Forget a device; it is never removed otherwise
    pub fn remove(&self, id: &DeviceId) -> Option<Device> {
        let removed = self.devices.write().remove(id);
        if removed.is_some() {
            tracing::info!(device_id = %id, "Removed device");
        }
        removed
    }

    pub fn get(&self, id: &DeviceId) -> Option<Device> {
        self.devices.read().get(id).cloned()
    }

    /// Look up one tuner of a device
    pub fn tuner(&self, id: &DeviceId, index: u8) -> Result<Tuner> {
        let devices = self.devices.read();
        let device = devices
            .get(id)
            .ok_or_else(|| StateError::DeviceNotFound(id.clone()))?;
        device.tuner(index).cloned().ok_or(StateError::TunerNotFound {
            device_id: id.clone(),
            index,
        })
    }

    /// All devices, ordered by id
    pub fn devices(&self) -> Vec<Device> {
        self.devices.read().values().cloned().collect()
    }

    /// All tuners of all devices, ordered by device id then index
    pub fn tuners(&self) -> Vec<Tuner> {
        self.devices
            .read()
            .values()
            .flat_map(|d| d.tuners.iter().cloned())
            .collect()
    }

    pub fn snapshot(&self) -> DeviceMap {
        self.devices.read().clone()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    pub fn transport(&self) -> &Arc<dyn DeviceTransport> {
        &self.transport
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("device_count", &self.len())
            .finish()
    }
}
