//! Making a ramdisk visible to (and hiding it from) the host block layer.
//!
//! Ordering matters in both directions: [`RamDiskModule::load`] only registers a disk whose
//! backing store is already fully allocated, and [`RamDiskModule::unload`] unregisters the disk
//! before its store can be released. Requests reach a disk only through the registry, so neither
//! a half-built nor a torn-down disk is ever observable.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::RamDiskConfig;
use crate::device::{DiskInfo, RamDisk};
use crate::dispatch::DrainStats;
use crate::error::{RegistryError, Result};
use crate::request::RequestQueue;

/// Host-side table of visible block devices, keyed by disk name.
#[derive(Debug, Default)]
pub struct DiskRegistry {
    disks: Mutex<BTreeMap<String, Arc<RamDisk>>>,
}

impl DiskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, disk: Arc<RamDisk>) -> std::result::Result<DiskInfo, RegistryError> {
        let info = disk.info();
        let mut disks = self.lock();
        if disks
            .values()
            .any(|other| other.name() == info.name || other.info().major == info.major)
        {
            return Err(RegistryError::Busy {
                name: info.name,
                major: info.major,
            });
        }
        disks.insert(info.name.clone(), disk);
        tracing::info!(
            name = %info.name,
            major = info.major,
            capacity_sectors = info.capacity_sectors,
            "registered block device"
        );
        Ok(info)
    }

    pub fn unregister(&self, name: &str) -> std::result::Result<Arc<RamDisk>, RegistryError> {
        let disk = self
            .lock()
            .remove(name)
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))?;
        tracing::info!(name, "unregistered block device");
        Ok(disk)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<RamDisk>> {
        self.lock().get(name).cloned()
    }

    pub fn info(&self, name: &str) -> Option<DiskInfo> {
        self.lookup(name).map(|disk| disk.info())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Signals the named disk that `queue` has pending work and drains it.
    ///
    /// The registry lock is released before draining, so a concurrent `unregister` never waits
    /// on I/O. A drain that already holds its `Arc` finishes against a still-live store.
    pub fn submit(
        &self,
        name: &str,
        queue: &mut dyn RequestQueue,
    ) -> std::result::Result<DrainStats, RegistryError> {
        let disk = self
            .lookup(name)
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))?;
        Ok(disk.drain(queue))
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<RamDisk>>> {
        self.disks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A loaded ramdisk: allocated, registered, and owned until [`RamDiskModule::unload`].
#[derive(Debug)]
pub struct RamDiskModule {
    disk: Arc<RamDisk>,
    info: DiskInfo,
}

impl RamDiskModule {
    /// Allocates the disk and then registers it.
    ///
    /// Nothing is registered if allocation or validation fails.
    pub fn load(config: RamDiskConfig, registry: &DiskRegistry) -> Result<Self> {
        let disk = Arc::new(RamDisk::new(config)?);
        let info = registry.register(Arc::clone(&disk))?;
        Ok(Self { disk, info })
    }

    pub fn disk(&self) -> &Arc<RamDisk> {
        &self.disk
    }

    pub fn info(&self) -> &DiskInfo {
        &self.info
    }

    /// Unregisters the disk, then drops this module's handle to it.
    ///
    /// The backing store is freed once the last in-flight drain holding the disk returns.
    pub fn unload(self, registry: &DiskRegistry) -> Result<()> {
        registry.unregister(&self.info.name)?;
        drop(self.disk);
        tracing::info!(name = %self.info.name, "released ramdisk backing store");
        Ok(())
    }
}
