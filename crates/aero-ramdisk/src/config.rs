use crate::error::ConfigError;

pub const DEFAULT_DISK_NAME: &str = "aeroblk";
pub const DEFAULT_MAJOR: u32 = 240;
pub const DEFAULT_SECTOR_SIZE: u32 = 512;
pub const DEFAULT_SECTOR_COUNT: u32 = 1024;

/// Smallest sector size the host block layer accepts.
pub const MIN_SECTOR_SIZE: u32 = 512;

/// What the dispatcher does with a request that reaches past the end of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfRangePolicy {
    /// Fail the whole request with [`crate::RequestError::OutOfRange`] before any byte moves.
    #[default]
    Reject,
    /// Apply segments up to the first one that does not fit, skip the rest, and report success.
    InRangePrefix,
}

impl OutOfRangePolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "reject" => Some(Self::Reject),
            "prefix" | "in-range-prefix" => Some(Self::InRangePrefix),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RamDiskConfig {
    pub name: String,
    pub major: u32,
    pub sector_size: u32,
    pub sector_count: u32,
    pub out_of_range: OutOfRangePolicy,
}

impl Default for RamDiskConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DISK_NAME.to_string(),
            major: DEFAULT_MAJOR,
            sector_size: DEFAULT_SECTOR_SIZE,
            sector_count: DEFAULT_SECTOR_COUNT,
            out_of_range: OutOfRangePolicy::default(),
        }
    }
}

impl RamDiskConfig {
    /// Builds a config from `AERO_RAMDISK_*` environment variables.
    ///
    /// Unset variables fall back to [`RamDiskConfig::default`]. A variable that is set but cannot
    /// be parsed is an error rather than silently ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let name = std::env::var("AERO_RAMDISK_NAME").unwrap_or(defaults.name);
        let major = parse_env_u32("AERO_RAMDISK_MAJOR")?.unwrap_or(defaults.major);
        let sector_size =
            parse_env_u32("AERO_RAMDISK_SECTOR_SIZE")?.unwrap_or(defaults.sector_size);
        let sector_count = parse_env_u32("AERO_RAMDISK_SECTORS")?.unwrap_or(defaults.sector_count);
        let out_of_range = match std::env::var("AERO_RAMDISK_OUT_OF_RANGE") {
            Ok(raw) => OutOfRangePolicy::parse(&raw)
                .ok_or(ConfigError::InvalidEnv("AERO_RAMDISK_OUT_OF_RANGE"))?,
            Err(_) => defaults.out_of_range,
        };

        let cfg = Self {
            name,
            major,
            sector_size,
            sector_count,
            out_of_range,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("name must not be empty"));
        }
        if self.sector_count == 0 {
            return Err(ConfigError::Invalid("sector_count must be > 0"));
        }
        if self.sector_size < MIN_SECTOR_SIZE || !self.sector_size.is_power_of_two() {
            return Err(ConfigError::Invalid(
                "sector_size must be a power of two and at least 512",
            ));
        }
        if usize::try_from(self.capacity_bytes()).is_err() {
            return Err(ConfigError::Invalid("capacity does not fit in usize"));
        }
        Ok(())
    }

    pub fn capacity_bytes(&self) -> u64 {
        u64::from(self.sector_size) * u64::from(self.sector_count)
    }
}

fn parse_env_u32(var: &'static str) -> Result<Option<u32>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv(var)),
        Err(_) => Ok(None),
    }
}
