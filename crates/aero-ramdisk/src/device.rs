use std::sync::{Mutex, MutexGuard, PoisonError};

use bitflags::bitflags;

use crate::backing::BackingStore;
use crate::config::{OutOfRangePolicy, RamDiskConfig};
use crate::dispatch::{self, DrainStats};
use crate::error::{DeviceError, RequestError, Result};
use crate::request::{Request, RequestQueue};

bitflags! {
    /// Access mode the host opens the block device with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenMode: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

/// Registration metadata presented to the host block layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInfo {
    pub name: String,
    pub major: u32,
    pub first_minor: u32,
    /// Number of minors reserved for the disk. Always 1: the ramdisk has no partitions.
    pub minors: u32,
    pub capacity_sectors: u64,
    pub logical_block_size: u32,
}

/// RAM-backed block device.
///
/// The backing store sits behind a single mutex; every read or write of the store, including a
/// whole [`RamDisk::drain`] pass, happens while holding it.
#[derive(Debug)]
pub struct RamDisk {
    config: RamDiskConfig,
    size: u64,
    store: Mutex<BackingStore>,
}

impl RamDisk {
    /// Validates `config` and allocates the full, zeroed backing store.
    pub fn new(config: RamDiskConfig) -> Result<Self> {
        config.validate()?;
        let size = config.capacity_bytes();
        let store = match BackingStore::allocate(size) {
            Ok(store) => store,
            Err(err) => {
                tracing::error!(name = %config.name, size, "ramdisk backing store allocation failed");
                return Err(err);
            }
        };
        debug_assert_eq!(store.len(), size);
        Ok(Self {
            config,
            size,
            store: Mutex::new(store),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &RamDiskConfig {
        &self.config
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.size
    }

    pub fn sector_size(&self) -> u32 {
        self.config.sector_size
    }

    pub fn sector_count(&self) -> u32 {
        self.config.sector_count
    }

    pub fn out_of_range_policy(&self) -> OutOfRangePolicy {
        self.config.out_of_range
    }

    pub fn info(&self) -> DiskInfo {
        DiskInfo {
            name: self.config.name.clone(),
            major: self.config.major,
            first_minor: 0,
            minors: 1,
            capacity_sectors: u64::from(self.config.sector_count),
            logical_block_size: self.config.sector_size,
        }
    }

    /// Host open hook. Has no effect on the data path.
    pub fn open(&self, mode: OpenMode) -> std::result::Result<(), DeviceError> {
        tracing::info!(name = %self.config.name, ?mode, "open ramdisk");
        Ok(())
    }

    /// Host release hook. Has no effect on the data path.
    pub fn release(&self, mode: OpenMode) {
        tracing::info!(name = %self.config.name, ?mode, "release ramdisk");
    }

    /// Drains `queue` completely, completing every fetched request before returning.
    pub fn drain(&self, queue: &mut dyn RequestQueue) -> DrainStats {
        let mut store = self.lock_store();
        dispatch::drain_locked(self, &mut store, queue)
    }

    /// Runs a single request through the dispatcher.
    pub fn submit(&self, request: &Request) -> std::result::Result<(), RequestError> {
        let mut store = self.lock_store();
        let mut stats = DrainStats::default();
        dispatch::dispatch(self, &mut store, request, &mut stats)
    }

    /// Copy of the whole backing store.
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock_store().as_slice().to_vec()
    }

    // A panic while the lock is held can only interrupt a byte copy; the store keeps its length,
    // so the poisoned guard is still usable.
    fn lock_store(&self) -> MutexGuard<'_, BackingStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
