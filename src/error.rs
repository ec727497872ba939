use std::error::Error as StdError;

use crate::QualityPolicy;

/// Custom Result type for binram operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the binram library, encompassing all possible error cases
/// that can occur while encoding, storing, and querying alignment records.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors related to file and block headers
    #[error("Error processing header: {0}")]
    HeaderError(#[from] HeaderError),

    /// Errors that occur during write operations
    #[error("Error writing file: {0}")]
    WriteError(#[from] WriteError),

    /// Errors that occur during read operations
    #[error("Error reading file: {0}")]
    ReadError(#[from] ReadError),

    /// Errors related to the embedded block index and side tables
    #[error("Error processing Index: {0}")]
    IndexError(#[from] IndexError),

    /// Errors raised by the field codecs
    #[error("Error in field codec: {0}")]
    CodecError(#[from] CodecError),

    /// Errors raised by record accessors
    #[error("Error in alignment record: {0}")]
    RecordError(#[from] RecordError),

    /// Errors raised by reference table lookups
    #[error("Error resolving reference: {0}")]
    ReferenceError(#[from] ReferenceError),

    /// Errors raised while parsing SAM text
    #[error("Error parsing SAM: {0}")]
    ParseError(#[from] ParseError),

    /// Errors raised while parsing or resolving a region query
    #[error("Error in region query: {0}")]
    QueryError(#[from] QueryError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    IoError(#[from] std::io::Error),

    /// UTF-8 conversion errors
    #[error("Error with UTF8: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// A worker thread panicked during parallel processing
    #[error("Worker thread panicked during parallel processing")]
    ThreadPanic,

    /// Generic errors for other unexpected situations
    #[error("Generic error: {0}")]
    GenericError(#[from] Box<dyn StdError + Send + Sync>),
}
impl Error {
    /// Checks if the error is a failed reference-name resolution
    ///
    /// Region queries against a name missing from the reference table fail with this error.
    /// It is terminal for that query only, so callers iterating over many regions
    /// can use this to report and move on.
    #[must_use]
    pub fn is_unknown_reference(&self) -> bool {
        matches!(self, Self::QueryError(QueryError::UnknownReference(_)))
    }

    /// Checks if the error is a bounds error on an indexed record field
    #[must_use]
    pub fn is_out_of_bounds(&self) -> bool {
        match self {
            Self::RecordError(err) => err.is_out_of_bounds(),
            Self::ReferenceError(ReferenceError::IdOutOfRange { .. })
            | Self::ReadError(ReadError::OutOfRange { .. }) => true,
            _ => false,
        }
    }
}

/// Errors specific to processing and validating file and block headers
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// The magic number in the file header does not match the expected value
    #[error("Invalid file magic: {0:?}")]
    InvalidFileMagic([u8; 7]),

    /// The format version in the header is not supported
    ///
    /// # Arguments
    /// * `u8` - The unsupported version number that was found
    #[error("Invalid format version: {0}")]
    InvalidFormatVersion(u8),

    /// The quality policy code stored in the header is unknown
    #[error("Invalid quality policy code: {0} - expecting [0,2]")]
    InvalidQualityPolicy(u8),

    /// The block size stored in the header cannot hold any record
    #[error("Invalid block size: {0}")]
    InvalidBlockSize(u64),

    /// The size of the data does not match what was specified in the header
    ///
    /// # Arguments
    /// * First `usize` - The actual number of bytes provided
    /// * Second `usize` - The expected number of bytes according to the header
    #[error("Invalid number of bytes provided: {0}. Expected: {1}")]
    InvalidSize(usize, usize),
}

/// Errors that can occur while reading stored alignment data
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// Attempted to access a row that is beyond the available range
    #[error("Requested record index ({requested_index}) is out of record range ({max_index})")]
    OutOfRange {
        requested_index: u64,
        max_index: u64,
    },

    /// The file appears to be truncated or corrupted
    ///
    /// # Arguments
    /// * `usize` - The byte position where the truncation was detected
    #[error(
        "Number of bytes in file does not match expectation - possibly truncated at byte pos {0}"
    )]
    FileTruncation(usize),

    /// A block header does not carry the block magic
    #[error("Invalid block header MAGIC found at byte pos {0}")]
    InvalidBlockHeaderMagic(usize),

    /// A block was written with a newer block layout
    #[error("Unsupported block version: {0}")]
    UnsupportedBlockVersion(u8),

    /// A decompressed column does not have the size recorded in its block header
    #[error("Column {column} decompressed to {actual} bytes, block header records {expected}")]
    ColumnSizeMismatch {
        column: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A length-prefixed entry runs past the end of its table
    #[error("Entry of {expected} bytes truncated after {actual} bytes")]
    TruncatedEntry { expected: u64, actual: u64 },

    /// The columns of a block decompress to more than the block size
    #[error("Block columns decompress to {size} bytes, exceeding the block size ({block_size})")]
    BlockSizeExceeded { size: u64, block_size: u64 },
}

/// Errors that can occur while writing alignment data
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// The record was encoded under a different quality policy than the writer
    #[error(
        "Cannot push record (quality policy: {actual:?}) with writer configuration (quality policy: {expected:?})"
    )]
    QualityPolicyMismatch {
        expected: QualityPolicy,
        actual: QualityPolicy,
    },

    /// When a record is too large to fit in a block of the configured size
    ///
    /// The first parameter is the record size, the second is the maximum block size
    #[error(
        "Encountered a record with embedded size {0} but the maximum block size is {1}. Rerun with increased block size."
    )]
    RecordSizeExceedsMaximumBlockSize(usize, usize),

    /// Attempting to write a record into a full block
    #[error(
        "Block(size: {block_size}) will be exceeded by record size {record_size}. Current size: {current_size}"
    )]
    BlockFull {
        current_size: usize,
        record_size: usize,
        block_size: usize,
    },

    /// The stored quality bytes do not cover the sequence
    #[error("Quality length ({qual_len}) does not match sequence length ({seq_len})")]
    QualityLengthMismatch { seq_len: usize, qual_len: usize },

    /// The packed sequence does not cover the sequence length
    ///
    /// Records whose sequence column was not loaded cannot be appended.
    #[error("Packed sequence of {packed_len} bytes cannot hold {seq_len} bases")]
    SequenceLengthMismatch { seq_len: usize, packed_len: usize },

    /// The writer already wrote its side tables
    #[error("Cannot push records after the writer was finished")]
    AlreadyFinished,
}

/// Errors related to the trailing block index and side tables
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    #[error("Invalid index header MAGIC found")]
    InvalidIndexHeaderMagic,

    #[error("Invalid index footer MAGIC found")]
    InvalidIndexFooterMagic,

    /// The file is too small to hold a header and a trailer
    #[error("File of {0} bytes is too small to hold a trailer")]
    MissingTrailer(usize),

    /// The side tables were written with an unknown schema
    #[error("Unsupported side table version: {0}")]
    UnsupportedVersion(u8),

    /// The decompressed side tables disagree with the index header
    ///
    /// The first parameter is the actual size, the second is the expected size
    #[error("Mismatch in size between decoded side tables: {0} and expected size {1}")]
    ByteSizeMismatch(u64, u64),
}

/// Errors raised by the sequence, quality, and CIGAR codecs
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// The packed sequence is too short for the requested logical length
    #[error("Packed sequence holds {actual} bytes but {expected} are needed")]
    TruncatedSequence { expected: usize, actual: usize },

    /// The stored quality bytes are too short for the requested logical length
    #[error("Stored quality holds {actual} bytes but {expected} are needed")]
    TruncatedQuality { expected: usize, actual: usize },

    /// A CIGAR string contains a character outside `MIDNSHP=X`
    #[error("Unknown CIGAR operation: {0:?}")]
    UnknownCigarOperation(char),

    /// A CIGAR operation is not preceded by a run length
    #[error("CIGAR operation {0:?} is missing its run length")]
    MissingCigarLength(char),

    /// A CIGAR string ends in digits with no operation
    #[error("CIGAR string ends with a dangling run length: {0}")]
    DanglingCigarLength(String),

    /// A CIGAR run length does not fit in 28 bits
    #[error("CIGAR run length {0} exceeds the 28-bit limit")]
    CigarRunTooLong(u64),

    /// A packed CIGAR word carries an opcode above 8
    #[error("Invalid packed CIGAR opcode: {0}")]
    InvalidCigarOpcode(u8),
}

/// Errors raised by [`AlignmentRecord`](crate::AlignmentRecord) accessors and setters
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("CIGAR operation index {index} out of range ({len} operations)")]
    CigarIndexOutOfRange { index: usize, len: usize },

    #[error("Optional field index {index} out of range ({len} fields)")]
    OptionalFieldIndexOutOfRange { index: usize, len: usize },

    /// The fixed optional-field capacity is exhausted
    #[error("Record already holds the maximum of {0} optional fields")]
    TooManyOptionalFields(usize),

    /// A quality string does not match the record's sequence length
    #[error("Quality length ({qual_len}) does not match sequence length ({seq_len})")]
    QualityLengthMismatch { seq_len: usize, qual_len: usize },
}
impl RecordError {
    #[must_use]
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(
            self,
            Self::CigarIndexOutOfRange { .. } | Self::OptionalFieldIndexOutOfRange { .. }
        )
    }
}

/// Errors raised by [`ReferenceTable`](crate::ReferenceTable) lookups
#[derive(thiserror::Error, Debug)]
pub enum ReferenceError {
    #[error("Reference id {id} out of range ({size} names interned)")]
    IdOutOfRange { id: i32, size: usize },
}

/// Errors raised while tokenizing SAM text
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("SAM line has {found} columns, expected at least 11")]
    TooFewColumns { found: usize },

    #[error("Invalid integer in {field}: {value:?}")]
    InvalidInteger { field: &'static str, value: String },
}

/// Errors raised while parsing and resolving region queries
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("Region {0:?} is missing the ':' delimiter")]
    MissingColon(String),

    #[error("Region {0:?} is missing the '-' delimiter")]
    MissingDash(String),

    #[error("Region {0:?} has an empty reference name")]
    EmptyName(String),

    /// A bound is not a positive integer
    #[error("Invalid region bound: {0:?}")]
    InvalidBound(String),

    #[error("Invalid range specified: start ({start}) is greater than end ({end})")]
    InvalidRange { start: i64, end: i64 },

    /// The region names a reference missing from the reference table
    #[error("Unknown reference name: {0}")]
    UnknownReference(String),
}

/// Trait for converting arbitrary errors into `Error`
pub trait IntoBinramError {
    fn into_binram_error(self) -> Error;
}

// Implement conversion for Box<dyn Error>
impl<E> IntoBinramError for E
where
    E: StdError + Send + Sync + 'static,
{
    fn into_binram_error(self) -> Error {
        Error::GenericError(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(thiserror::Error, Debug)]
    enum MyError {
        #[error("Custom error: {0}")]
        CustomError(String),
    }

    #[test]
    fn test_into_binram_error() {
        let my_error = MyError::CustomError(String::from("some error"));
        let binram_error = my_error.into_binram_error();
        assert!(matches!(binram_error, Error::GenericError(_)));
    }

    // ==================== Error helper Tests ====================

    #[test]
    fn test_is_unknown_reference() {
        let error = Error::from(QueryError::UnknownReference("chr3".to_string()));
        assert!(error.is_unknown_reference());

        let error = Error::from(QueryError::MissingColon("chr3".to_string()));
        assert!(!error.is_unknown_reference());
    }

    #[test]
    fn test_is_out_of_bounds() {
        let error = Error::from(RecordError::CigarIndexOutOfRange { index: 4, len: 3 });
        assert!(error.is_out_of_bounds());

        let error = Error::from(ReferenceError::IdOutOfRange { id: 9, size: 2 });
        assert!(error.is_out_of_bounds());

        let error = Error::from(RecordError::TooManyOptionalFields(30));
        assert!(!error.is_out_of_bounds());
    }

    // ==================== Display Tests ====================

    #[test]
    fn test_header_error_invalid_format_version() {
        let error = HeaderError::InvalidFormatVersion(9);
        assert!(format!("{error}").contains('9'));
    }

    #[test]
    fn test_read_error_out_of_range() {
        let error = ReadError::OutOfRange {
            requested_index: 150,
            max_index: 100,
        };
        let error_str = format!("{error}");
        assert!(error_str.contains("150"));
        assert!(error_str.contains("100"));
    }

    #[test]
    fn test_write_error_quality_policy_mismatch() {
        let error = WriteError::QualityPolicyMismatch {
            expected: QualityPolicy::Phred33,
            actual: QualityPolicy::Dropped,
        };
        let error_str = format!("{error}");
        assert!(error_str.contains("Phred33"));
        assert!(error_str.contains("Dropped"));
    }

    #[test]
    fn test_write_error_block_full() {
        let error = WriteError::BlockFull {
            current_size: 900,
            record_size: 200,
            block_size: 1024,
        };
        let error_str = format!("{error}");
        assert!(error_str.contains("900"));
        assert!(error_str.contains("200"));
        assert!(error_str.contains("1024"));
    }

    #[test]
    fn test_codec_error_unknown_cigar_operation() {
        let error = CodecError::UnknownCigarOperation('Q');
        assert!(format!("{error}").contains('Q'));
    }

    #[test]
    fn test_query_error_unknown_reference() {
        let error = QueryError::UnknownReference("chrUn".to_string());
        assert!(format!("{error}").contains("chrUn"));
    }

    #[test]
    fn test_parse_error_too_few_columns() {
        let error = ParseError::TooFewColumns { found: 7 };
        assert!(format!("{error}").contains('7'));
    }

    // ==================== Error Conversion Tests ====================

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::IoError(_)));
    }

    #[test]
    fn test_error_from_index_error() {
        let error: Error = IndexError::InvalidIndexFooterMagic.into();
        assert!(matches!(error, Error::IndexError(_)));
    }

    #[test]
    fn test_error_from_codec_error() {
        let error: Error = CodecError::CigarRunTooLong(1 << 30).into();
        assert!(matches!(error, Error::CodecError(_)));
    }
}
