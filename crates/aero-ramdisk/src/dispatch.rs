//! Request dispatcher: turns queued block requests into copies against the backing store.

use crate::backing::BackingStore;
use crate::config::OutOfRangePolicy;
use crate::device::RamDisk;
use crate::error::RequestError;
use crate::request::{Completion, Direction, Request, RequestQueue};

/// Counters for one drain pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub completed: u64,
    pub failed: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl DrainStats {
    pub fn requests(&self) -> u64 {
        self.completed + self.failed
    }
}

/// Drains every pending request from `queue` into `disk`.
///
/// Requests are processed in the order the queue yields them and each one is completed exactly
/// once before the next is fetched. The device lock is held for the whole pass.
pub fn drain(disk: &RamDisk, queue: &mut dyn RequestQueue) -> DrainStats {
    disk.drain(queue)
}

pub(crate) fn drain_locked(
    disk: &RamDisk,
    store: &mut BackingStore,
    queue: &mut dyn RequestQueue,
) -> DrainStats {
    let mut stats = DrainStats::default();
    while let Some(request) = queue.fetch() {
        let result = dispatch(disk, store, &request, &mut stats);
        match &result {
            Ok(()) => stats.completed += 1,
            Err(err) => {
                tracing::debug!(tag = request.tag, %err, "request failed");
                stats.failed += 1;
            }
        }
        queue.complete(Completion {
            tag: request.tag,
            result,
        });
    }
    tracing::trace!(
        name = disk.name(),
        completed = stats.completed,
        failed = stats.failed,
        "drain pass finished"
    );
    stats
}

pub(crate) fn dispatch(
    disk: &RamDisk,
    store: &mut BackingStore,
    request: &Request,
    stats: &mut DrainStats,
) -> Result<(), RequestError> {
    let Some(direction) = request.op.direction() else {
        tracing::warn!(tag = request.tag, op = ?request.op, "skip non-fs request");
        return Err(RequestError::UnsupportedRequestKind);
    };

    let total_len = request.total_len();
    tracing::debug!(
        tag = request.tag,
        sector = request.sector,
        bytes = total_len,
        ?direction,
        "request received"
    );

    let capacity = store.len();
    // An overflowing start offset saturates, which is past any capacity and therefore handled
    // by the out-of-range policy below like any other bad sector.
    let base_offset = request
        .sector
        .saturating_mul(u64::from(disk.sector_size()));
    let policy = disk.out_of_range_policy();

    // Validate before any byte moves so a failed request leaves the store untouched. Page bounds
    // hold regardless of policy; the device range is only all-or-nothing under `Reject`.
    for segment in &request.segments {
        segment.check_page_bounds()?;
    }
    if policy == OutOfRangePolicy::Reject {
        store.check_range(base_offset, total_len)?;
    }

    for seg in request.segments(base_offset) {
        let in_range = seg.device_end().is_some_and(|end| end <= capacity);
        if !in_range {
            match policy {
                OutOfRangePolicy::Reject => {
                    return Err(RequestError::OutOfRange {
                        offset: seg.device_offset(),
                        len: u64::from(seg.len()),
                        capacity,
                    });
                }
                OutOfRangePolicy::InRangePrefix => {
                    tracing::warn!(
                        tag = request.tag,
                        offset = seg.device_offset(),
                        len = seg.len(),
                        capacity,
                        "segment beyond device end; skipping rest of request"
                    );
                    break;
                }
            }
        }

        let mut mapped = seg.map()?;
        match direction {
            Direction::Write => {
                store.write_at(seg.device_offset(), &mapped)?;
                stats.bytes_written += u64::from(seg.len());
            }
            Direction::Read => {
                store.read_at(seg.device_offset(), &mut mapped)?;
                stats.bytes_read += u64::from(seg.len());
            }
        }
    }

    Ok(())
}
