//! Single-pass iteration over the segments of one request.
//!
//! Each yielded [`SegmentRef`] carries the device offset derived from the running sum of the
//! preceding segment lengths. The segment's bytes are only reachable through
//! [`SegmentRef::map`], whose guard bounds the borrow to one copy.

use std::ops::{Deref, DerefMut, Range};
use std::sync::MutexGuard;

use crate::error::RequestError;
use crate::request::Segment;

pub struct Segments<'a> {
    inner: std::slice::Iter<'a, Segment>,
    offset: u64,
}

impl<'a> Segments<'a> {
    pub fn new(segments: &'a [Segment], base_offset: u64) -> Self {
        Self {
            inner: segments.iter(),
            offset: base_offset,
        }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = SegmentRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let segment = self.inner.next()?;
        let device_offset = self.offset;
        // Saturate rather than wrap: a saturated offset is past any real capacity, so the
        // dispatcher's bounds check still rejects it.
        self.offset = self.offset.saturating_add(u64::from(segment.len));
        Some(SegmentRef {
            segment,
            device_offset,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Segments<'_> {}

#[derive(Clone, Copy)]
pub struct SegmentRef<'a> {
    segment: &'a Segment,
    device_offset: u64,
}

impl<'a> SegmentRef<'a> {
    pub fn device_offset(&self) -> u64 {
        self.device_offset
    }

    pub fn len(&self) -> u32 {
        self.segment.len
    }

    pub fn is_empty(&self) -> bool {
        self.segment.len == 0
    }

    pub fn page_offset(&self) -> u32 {
        self.segment.page_offset
    }

    /// Device byte offset one past the end of this segment, or `None` on overflow.
    pub fn device_end(&self) -> Option<u64> {
        self.device_offset.checked_add(u64::from(self.segment.len))
    }

    /// Maps the segment's bytes for the duration of one copy.
    ///
    /// The page stays locked until the returned guard is dropped.
    pub fn map(&self) -> Result<MappedSegment<'a>, RequestError> {
        let segment: &'a Segment = self.segment;
        let guard = segment.page.lock();
        let range = page_range(segment, guard.len())?;
        Ok(MappedSegment { guard, range })
    }
}

impl Segment {
    /// Checks that the segment lies inside its page without mapping it.
    pub fn check_page_bounds(&self) -> Result<(), RequestError> {
        page_range(self, self.page.len()).map(|_| ())
    }
}

fn page_range(segment: &Segment, page_len: usize) -> Result<Range<usize>, RequestError> {
    let start = segment.page_offset as usize;
    let end = start.checked_add(segment.len as usize);
    match end {
        Some(end) if end <= page_len => Ok(start..end),
        _ => Err(RequestError::BufferOutOfRange {
            page_offset: segment.page_offset,
            len: segment.len,
            page_len,
        }),
    }
}

/// Scoped view of exactly one segment's bytes inside its page.
pub struct MappedSegment<'a> {
    guard: MutexGuard<'a, Box<[u8]>>,
    range: Range<usize>,
}

impl Deref for MappedSegment<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[self.range.clone()]
    }
}

impl DerefMut for MappedSegment<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard[self.range.clone()]
    }
}
