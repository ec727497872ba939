use bytemuck::{Pod, Zeroable};

use crate::error::{HeaderError, Result};
use crate::policy::QualityPolicy;

use super::{
    DEFAULT_BLOCK_SIZE, DEFAULT_COMPRESSION_LEVEL, DEFAULT_INDEX_INTERVAL, FILE_MAGIC,
    FILE_VERSION,
};

/// Reference names were checked for clustering while writing
pub const PRESENCE_SORT_CHECKED: u64 = 1 << 0;

/// Dataset configuration stored at the start of every file
///
/// This is stored identically in memory and on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct FileHeader {
    // File Type Metadata (8 bytes)
    /// File magic number
    magic: [u8; 7],
    /// File version number
    pub version: u8,

    // Data presence flags (8 bytes)
    /// A bitfield of dataset properties
    pub presence_flags: u64,

    // Record encoding (8 bytes)
    /// Code of the quality policy every record is stored under
    quality_policy: u8,
    padding: [u8; 7],

    // Configuration (24 bytes)
    /// zstd compression level
    pub compression_level: u64,
    /// Maximum block size in bytes
    pub block_size: u64,
    /// Position index sampling interval (0 = no index)
    pub index_interval: u64,

    /// Reserved for future use
    reserved: [u8; 16],
}
impl Default for FileHeader {
    fn default() -> Self {
        Self {
            magic: *FILE_MAGIC,
            version: FILE_VERSION,
            presence_flags: 0,
            quality_policy: QualityPolicy::default().as_u8(),
            padding: [0; 7],
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            block_size: DEFAULT_BLOCK_SIZE,
            index_interval: DEFAULT_INDEX_INTERVAL,
            reserved: [0; 16],
        }
    }
}

/// Flag getters and setters
impl FileHeader {
    pub fn set_sort_checked(&mut self) {
        self.presence_flags |= PRESENCE_SORT_CHECKED;
    }

    #[must_use]
    pub fn is_sort_checked(&self) -> bool {
        self.presence_flags & PRESENCE_SORT_CHECKED != 0
    }

    #[must_use]
    pub fn has_position_index(&self) -> bool {
        self.index_interval > 0
    }

    /// Returns the quality policy of the dataset
    #[must_use]
    pub fn quality_policy(&self) -> QualityPolicy {
        // validated by every constructor
        QualityPolicy::from_u8(self.quality_policy).unwrap_or_default()
    }
}

impl FileHeader {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Reads and validates a header from its on-disk bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != size_of::<Self>() {
            return Err(HeaderError::InvalidSize(bytes.len(), size_of::<Self>()).into());
        }
        let header: Self = bytemuck::pod_read_unaligned(bytes);
        if header.magic != *FILE_MAGIC {
            return Err(HeaderError::InvalidFileMagic(header.magic).into());
        }
        if header.version != FILE_VERSION {
            return Err(HeaderError::InvalidFormatVersion(header.version).into());
        }
        QualityPolicy::from_u8(header.quality_policy)?;
        if header.block_size == 0 {
            return Err(HeaderError::InvalidBlockSize(header.block_size).into());
        }
        Ok(header)
    }
}

/// Builds a [`FileHeader`] from optional settings
///
/// # Examples
///
/// ```
/// use binram::{FileHeaderBuilder, QualityPolicy};
///
/// let header = FileHeaderBuilder::new()
///     .with_quality_policy(QualityPolicy::Binned)
///     .with_index_interval(64)
///     .build();
/// assert_eq!(header.quality_policy(), QualityPolicy::Binned);
/// assert_eq!(header.index_interval, 64);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FileHeaderBuilder {
    quality_policy: Option<QualityPolicy>,
    compression_level: Option<u64>,
    block_size: Option<u64>,
    index_interval: Option<u64>,
    sort_check: bool,
}
impl FileHeaderBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_quality_policy(mut self, policy: QualityPolicy) -> Self {
        self.quality_policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_compression_level(mut self, level: u64) -> Self {
        self.compression_level = Some(level);
        self
    }

    /// Sets the maximum block size in bytes (0 falls back to the default)
    #[must_use]
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Sets the position index sampling interval (0 disables the index)
    #[must_use]
    pub fn with_index_interval(mut self, interval: u64) -> Self {
        self.index_interval = Some(interval);
        self
    }

    /// Marks the dataset as written with reference clustering checks
    #[must_use]
    pub fn with_sort_check(mut self, sort_check: bool) -> Self {
        self.sort_check = sort_check;
        self
    }

    #[must_use]
    pub fn build(self) -> FileHeader {
        let mut header = FileHeader {
            quality_policy: self.quality_policy.unwrap_or_default().as_u8(),
            compression_level: self
                .compression_level
                .unwrap_or(DEFAULT_COMPRESSION_LEVEL),
            block_size: self
                .block_size
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_BLOCK_SIZE),
            index_interval: self.index_interval.unwrap_or(DEFAULT_INDEX_INTERVAL),
            ..FileHeader::default()
        };
        if self.sort_check {
            header.set_sort_checked();
        }
        header
    }
}
