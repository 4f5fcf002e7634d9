use crate::error::{DeviceError, RequestError};

/// Flat byte buffer standing in for the physical medium.
///
/// The length is fixed at allocation time and never changes afterwards.
pub struct BackingStore {
    data: Vec<u8>,
}

impl std::fmt::Debug for BackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackingStore")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl BackingStore {
    /// Allocates a zero-filled store of exactly `size` bytes.
    ///
    /// Allocation is fallible: a failed reservation is reported as
    /// [`DeviceError::AllocationFailure`] instead of aborting the process.
    pub fn allocate(size: u64) -> Result<Self, DeviceError> {
        let len = usize::try_from(size).map_err(|_| DeviceError::AllocationFailure { size })?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| DeviceError::AllocationFailure { size })?;
        data.resize(len, 0);
        Ok(Self { data })
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn check_range(&self, offset: u64, len: u64) -> Result<(), RequestError> {
        let capacity = self.len();
        let fits = offset
            .checked_add(len)
            .is_some_and(|end| end <= capacity);
        if !fits {
            return Err(RequestError::OutOfRange {
                offset,
                len,
                capacity,
            });
        }
        Ok(())
    }

    pub fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<(), RequestError> {
        let range = self.byte_range(offset, dst.len())?;
        dst.copy_from_slice(&self.data[range]);
        Ok(())
    }

    pub fn write_at(&mut self, offset: u64, src: &[u8]) -> Result<(), RequestError> {
        let range = self.byte_range(offset, src.len())?;
        self.data[range].copy_from_slice(src);
        Ok(())
    }

    fn byte_range(&self, offset: u64, len: usize) -> Result<std::ops::Range<usize>, RequestError> {
        self.check_range(offset, len as u64)?;
        // `check_range` bounds `offset + len` by the buffer length, which is a `usize`.
        let start = offset as usize;
        Ok(start..start + len)
    }
}
