use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Failure of a single block request.
///
/// Every variant is reported to the host exactly once, as the completion status of the request
/// that caused it. The dispatcher never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The request is a pass-through/control request rather than a plain read or write.
    #[error("unsupported request kind")]
    UnsupportedRequestKind,

    #[error("out of range: offset={offset} len={len} capacity={capacity}")]
    OutOfRange { offset: u64, len: u64, capacity: u64 },

    /// A segment addresses bytes past the end of its host page.
    #[error("segment buffer out of range: page_offset={page_offset} len={len} page_len={page_len}")]
    BufferOutOfRange {
        page_offset: u32,
        len: u32,
        page_len: usize,
    },
}

impl RequestError {
    pub fn status(&self) -> BlkStatus {
        BlkStatus::IoErr
    }
}

/// Status byte the host observes when a request completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlkStatus {
    Ok,
    IoErr,
}

impl BlkStatus {
    pub fn from_result(result: &std::result::Result<(), RequestError>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(err) => err.status(),
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for env var {0}")]
    InvalidEnv(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("block device {name:?} (major {major}) is already registered")]
    Busy { name: String, major: u32 },

    #[error("block device {0:?} is not registered")]
    NotRegistered(String),
}

/// Errors raised while creating, registering or tearing down a device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The backing store could not be allocated. The device is never registered.
    #[error("failed to allocate {size} bytes of backing store")]
    AllocationFailure { size: u64 },

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
