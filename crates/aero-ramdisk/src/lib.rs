#![forbid(unsafe_code)]

//! RAM-backed block device used by Aero's storage stack.
//!
//! The disk is a fixed-capacity byte buffer behind one lock. Hosts hand it requests through a
//! [`RequestQueue`] and call [`drain`] when the queue has work; every request is completed
//! synchronously, in order, before `drain` returns.
//!
//! - [`RamDisk`]: device descriptor owning the [`BackingStore`]
//! - [`drain`]: request dispatcher
//! - [`Segments`]: single-pass segment iterator with scoped page mappings
//! - [`DiskRegistry`] / [`RamDiskModule`]: load/unload ordering against the host block layer
//!
//! ```rust
//! use aero_ramdisk::{drain, Page, RamDisk, RamDiskConfig, Request, Segment, VecRequestQueue};
//!
//! let disk = RamDisk::new(RamDiskConfig::default()).unwrap();
//! let src = Page::from_vec(vec![0xAB; 512]);
//! let dst = Page::with_len(512);
//!
//! let mut queue = VecRequestQueue::new();
//! queue.push(Request::write(1, 0, vec![Segment::whole(src)]));
//! queue.push(Request::read(2, 0, vec![Segment::whole(dst.clone())]));
//! drain(&disk, &mut queue);
//!
//! assert!(dst.to_vec().iter().all(|b| *b == 0xAB));
//! ```

mod backing;
mod config;
mod device;
mod dispatch;
mod error;
mod lifecycle;
mod request;
mod segment;

pub use backing::BackingStore;
pub use config::{
    OutOfRangePolicy, RamDiskConfig, DEFAULT_DISK_NAME, DEFAULT_MAJOR, DEFAULT_SECTOR_COUNT,
    DEFAULT_SECTOR_SIZE, MIN_SECTOR_SIZE,
};
pub use device::{DiskInfo, OpenMode, RamDisk};
pub use dispatch::{drain, DrainStats};
pub use error::{BlkStatus, ConfigError, DeviceError, RegistryError, RequestError, Result};
pub use lifecycle::{DiskRegistry, RamDiskModule};
pub use request::{
    Completion, Direction, Page, Request, RequestOp, RequestQueue, Segment, VecRequestQueue,
    PAGE_SIZE,
};
pub use segment::{MappedSegment, SegmentRef, Segments};

#[cfg(all(test, not(target_arch = "wasm32")))]
mod proptests;
