use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{BlkStatus, RequestError};
use crate::segment::Segments;

pub const PAGE_SIZE: usize = 4096;

/// Host-owned memory that a request segment points into.
///
/// Cloning a `Page` clones the handle, not the bytes: the host keeps one clone to fill a write
/// buffer or to look at the result of a read, while the request carries another.
#[derive(Clone, Debug)]
pub struct Page {
    bytes: Arc<Mutex<Box<[u8]>>>,
}

impl Page {
    /// A zero-filled page of [`PAGE_SIZE`] bytes.
    pub fn new() -> Self {
        Self::with_len(PAGE_SIZE)
    }

    pub fn with_len(len: usize) -> Self {
        Self::from_vec(vec![0; len])
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(bytes.into_boxed_slice())),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the page contents out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().to_vec()
    }

    pub fn fill(&self, value: u8) {
        self.lock().fill(value);
    }

    /// Copies `src` into the page at `offset`. Fails without writing anything if `src` does not
    /// fit.
    pub fn write(&self, offset: u32, src: &[u8]) -> Result<(), RequestError> {
        let mut bytes = self.lock();
        let page_len = bytes.len();
        let start = offset as usize;
        match start.checked_add(src.len()) {
            Some(end) if end <= page_len => {
                bytes[start..end].copy_from_slice(src);
                Ok(())
            }
            _ => Err(RequestError::BufferOutOfRange {
                page_offset: offset,
                len: u32::try_from(src.len()).unwrap_or(u32::MAX),
                page_len,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<[u8]>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

/// One contiguous piece of a request: `len` bytes starting at `page_offset` inside `page`.
///
/// The device offset is not stored here; it is the running sum of the lengths of the segments
/// before this one, starting at the request's first sector.
#[derive(Clone, Debug)]
pub struct Segment {
    pub page: Page,
    pub page_offset: u32,
    pub len: u32,
}

impl Segment {
    pub fn new(page: Page, page_offset: u32, len: u32) -> Self {
        Self {
            page,
            page_offset,
            len,
        }
    }

    /// A segment covering a whole page.
    ///
    /// A segment length is a `u32`, so a page longer than `u32::MAX` bytes is covered only up to
    /// `u32::MAX` bytes. Split such pages into several segments with [`Segment::new`].
    pub fn whole(page: Page) -> Self {
        let len = u32::try_from(page.len()).unwrap_or(u32::MAX);
        Self::new(page, 0, len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOp {
    Read,
    Write,
    /// Driver-private/control request carrying an opaque opcode. Never serviced by the ramdisk.
    PassThrough { opcode: u32 },
}

impl RequestOp {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Self::Read => Some(Direction::Read),
            Self::Write => Some(Direction::Write),
            Self::PassThrough { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Request {
    /// Host-chosen identifier echoed back in the [`Completion`].
    pub tag: u64,
    pub op: RequestOp,
    pub sector: u64,
    pub segments: Vec<Segment>,
}

impl Request {
    pub fn read(tag: u64, sector: u64, segments: Vec<Segment>) -> Self {
        Self {
            tag,
            op: RequestOp::Read,
            sector,
            segments,
        }
    }

    pub fn write(tag: u64, sector: u64, segments: Vec<Segment>) -> Self {
        Self {
            tag,
            op: RequestOp::Write,
            sector,
            segments,
        }
    }

    pub fn pass_through(tag: u64, opcode: u32) -> Self {
        Self {
            tag,
            op: RequestOp::PassThrough { opcode },
            sector: 0,
            segments: Vec::new(),
        }
    }

    /// Total payload bytes across all segments.
    pub fn total_len(&self) -> u64 {
        self.segments.iter().map(|seg| u64::from(seg.len)).sum()
    }

    /// Starts a new single pass over the segments, with device offsets derived from
    /// `base_offset`.
    pub fn segments(&self, base_offset: u64) -> Segments<'_> {
        Segments::new(&self.segments, base_offset)
    }
}

/// Completion record handed back to the host for every fetched request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub tag: u64,
    pub result: Result<(), RequestError>,
}

impl Completion {
    pub fn status(&self) -> BlkStatus {
        BlkStatus::from_result(&self.result)
    }
}

/// Host submission queue the dispatcher pulls from.
pub trait RequestQueue {
    /// Fetches the next pending request, in submission order.
    fn fetch(&mut self) -> Option<Request>;

    /// Ends a request previously returned by [`RequestQueue::fetch`].
    fn complete(&mut self, completion: Completion);
}

/// In-memory FIFO queue that records completions.
#[derive(Debug, Default)]
pub struct VecRequestQueue {
    pending: VecDeque<Request>,
    completions: Vec<Completion>,
}

impl VecRequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a request.
    ///
    /// Returns `true` when the queue went from empty to non-empty, i.e. when the host should
    /// signal the device that work is pending.
    pub fn push(&mut self, request: Request) -> bool {
        let was_empty = self.pending.is_empty();
        self.pending.push_back(request);
        was_empty
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    pub fn take_completions(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.completions)
    }
}

impl FromIterator<Request> for VecRequestQueue {
    fn from_iter<I: IntoIterator<Item = Request>>(iter: I) -> Self {
        Self {
            pending: iter.into_iter().collect(),
            completions: Vec::new(),
        }
    }
}

impl RequestQueue for VecRequestQueue {
    fn fetch(&mut self) -> Option<Request> {
        self.pending.pop_front()
    }

    fn complete(&mut self, completion: Completion) {
        self.completions.push(completion);
    }
}
