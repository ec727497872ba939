//! # binram
//!
//! A columnar binary store for sequence alignment records with indexed
//! region queries.
//!
//! Records are parsed from SAM text ([`SamParser`]), appended to a file of
//! zstd-compressed column blocks ([`RamWriter`]), and read back through a
//! memory-mapped, projection-aware row store ([`MmapReader`]). A sparse
//! [`PositionIndex`] gives region queries ([`RegionQuery`]) their starting row.
//!
//! Reference names are interned into caller-owned [`References`] tables that
//! are passed to every call converting between names and ids.
//!
//! ## Example
//!
//! ```no_run
//! use binram::{AlignmentRecord, FileHeader, MmapReader, QualityPolicy, RamWriter, References, SamParser};
//!
//! let mut refs = References::new();
//! let mut parser = SamParser::new(QualityPolicy::Phred33);
//! let mut record = AlignmentRecord::new();
//!
//! let handle = std::fs::File::create("reads.ram").unwrap();
//! let mut writer = RamWriter::new(handle, FileHeader::default()).unwrap();
//! let line = b"read1\t0\tchr1\t200\t60\t4M\t*\t0\t0\tACGT\tIIII";
//! if parser.parse_line(line, &mut refs, &mut record).unwrap() {
//!     writer.push(&record).unwrap();
//! }
//! writer.finish(&refs).unwrap();
//!
//! let mut reader = MmapReader::new("reads.ram").unwrap();
//! for hit in reader.query("chr1:150-250").unwrap() {
//!     hit.print(reader.references()).unwrap();
//! }
//! ```

pub mod cigar;
pub mod core;
pub mod error;
pub mod nuc;
mod parallel;
pub mod policy;
pub mod position;
mod read;
mod record;
mod refs;
mod region;
mod sam;
mod store;
mod write;

pub use cigar::Cigar;
pub use self::core::{FileHeader, FileHeaderBuilder};
pub use error::{Error, IntoBinramError, Result};
pub use parallel::RegionProcessor;
pub use policy::QualityPolicy;
pub use position::{FloorPolicy, PositionIndex, PositionIndexer};
pub use read::MmapReader;
pub use record::{AlignmentRecord, FLAG_UNMAPPED, MAX_OPT_FIELDS};
pub use refs::{ReferenceTable, References};
pub use region::{Region, RegionQuery};
pub use sam::{SamFormatter, SamParser};
pub use store::{MemoryStore, Projection, RowSink, RowStore};
pub use write::RamWriter;

pub const FILE_MAGIC: &[u8; 7] = b"RAMFILE";
pub const BLOCK_MAGIC: &[u8; 3] = b"BLK";
pub const INDEX_MAGIC: &[u8; 8] = b"RAMINDEX";

pub const FILE_VERSION: u8 = 1;

/// Schema version of the side tables written after the last block
pub const SIDE_TABLE_VERSION: u8 = 1;

pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;
pub const DEFAULT_COMPRESSION_LEVEL: u64 = 0;

/// Default position index sampling interval (every Nth row)
pub const DEFAULT_INDEX_INTERVAL: u64 = 256;
