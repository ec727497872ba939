use std::io;

use log::{info, warn};
use zstd::zstd_safe;

use crate::core::{BlockHeader, ColumnarBlock, FileHeader, Index, IndexFooter, IndexHeader, SideTables};
use crate::error::{Result, WriteError};
use crate::position::PositionIndexer;
use crate::record::AlignmentRecord;
use crate::refs::References;
use crate::store::RowSink;

/// Appends alignment records to a columnar file
///
/// The file header is written on construction. Records are buffered into
/// blocks of at most `block_size` bytes, and [`finish`](Self::finish) writes
/// the side tables (block index, reference tables, position index).
///
/// # Example
///
/// ```
/// use binram::{AlignmentRecord, FileHeader, RamWriter, References};
///
/// let mut refs = References::new();
/// let mut writer = RamWriter::new(Vec::new(), FileHeader::default()).unwrap();
///
/// let mut record = AlignmentRecord::new();
/// record.set_qname("read1");
/// record.set_rname("chr1", &mut refs);
/// record.set_pos(99);
/// record.set_seq(b"ACGT");
/// assert_eq!(writer.push(&record).unwrap(), 0);
///
/// writer.finish(&refs).unwrap();
/// assert_eq!(writer.num_records(), 1);
/// ```
pub struct RamWriter<W: io::Write> {
    /// Internal writer for the file
    inner: W,

    /// A reusable block for this writer
    block: ColumnarBlock,

    /// All block headers written by this writer
    headers: Vec<BlockHeader>,

    /// Compression context for the writer
    cctx: zstd_safe::CCtx<'static>,

    /// Samples record coordinates into the position index
    indexer: PositionIndexer,

    num_records: u64,
    finished: bool,
}
impl<W: io::Write> RamWriter<W> {
    /// Creates a new writer with the header written to the inner writer
    pub fn new(mut inner: W, header: FileHeader) -> Result<Self> {
        inner.write_all(header.as_bytes())?;

        let mut writer = Self {
            inner,
            block: ColumnarBlock::new(header),
            headers: Vec::default(),
            cctx: zstd_safe::CCtx::create(),
            indexer: PositionIndexer::new(header.index_interval),
            num_records: 0,
            finished: false,
        };
        writer.init_compressor()?;
        Ok(writer)
    }

    /// Sets the compression parameters from the header
    fn init_compressor(&mut self) -> Result<()> {
        self.cctx
            .set_parameter(zstd_safe::CParameter::CompressionLevel(
                self.block.header.compression_level as i32,
            ))
            .map_err(|e| io::Error::other(zstd_safe::get_error_name(e)))?;

        self.cctx
            .set_parameter(zstd_safe::CParameter::EnableLongDistanceMatching(true))
            .map_err(|e| io::Error::other(zstd_safe::get_error_name(e)))?;
        Ok(())
    }

    #[must_use]
    pub fn header(&self) -> FileHeader {
        self.block.header
    }

    /// Returns the number of records pushed so far
    #[must_use]
    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    /// Calculate the usage of the current block as a percentage
    #[must_use]
    pub fn usage(&self) -> f64 {
        self.block.usage()
    }

    /// Appends a record and returns its row ordinal
    ///
    /// The record must carry its sequence, and its quality bytes (if any)
    /// must be stored under the quality policy of the header.
    pub fn push(&mut self, record: &AlignmentRecord) -> Result<u64> {
        if self.finished {
            return Err(WriteError::AlreadyFinished.into());
        }
        if !self.block.can_fit(record) {
            self.flush()?;
        }
        self.block.push(record)?;

        let row = self.num_records;
        self.indexer.observe(record.refid(), record.pos(), row);
        self.num_records += 1;
        Ok(row)
    }

    /// Writes the current block if it holds any records
    pub fn flush(&mut self) -> Result<()> {
        if let Some(header) = self.block.flush_to(&mut self.inner, &mut self.cctx)? {
            self.headers.push(header);
        }
        Ok(())
    }

    /// Flushes the last block and writes the side tables
    ///
    /// No records can be pushed afterwards.
    pub fn finish(&mut self, refs: &References) -> Result<()> {
        if self.finished {
            return Err(WriteError::AlreadyFinished.into());
        }
        self.flush()?;

        let indexer = std::mem::replace(&mut self.indexer, PositionIndexer::new(0));
        if indexer.unsorted() > 0 {
            warn!(
                "{} rows were out of position order; region queries may miss records",
                indexer.unsorted()
            );
        }
        if refs.rname.sort_violations() > 0 {
            warn!(
                "{} reference names reappeared after a different reference; region queries may miss records",
                refs.rname.sort_violations()
            );
        }

        let tables = SideTables {
            index: Index::from_block_headers(&self.headers),
            refs: refs.clone(),
            positions: indexer.finish(),
        };
        let (u_bytes, z_tables) = tables.encoded(self.block.header.compression_level as i32)?;
        let header = IndexHeader::new(u_bytes, z_tables.len() as u64);
        let footer = IndexFooter::new(z_tables.len() as u64);

        self.inner.write_all(header.as_bytes())?;
        self.inner.write_all(&z_tables)?;
        self.inner.write_all(footer.as_bytes())?;
        self.inner.flush()?;
        self.finished = true;

        info!(
            "Wrote {} records in {} blocks ({} references, {} index entries)",
            self.num_records,
            self.headers.len(),
            tables.refs.rname.len(),
            tables.positions.len()
        );
        Ok(())
    }

    /// Consumes the writer and returns the inner writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}
impl<W: io::Write> RowSink for RamWriter<W> {
    fn append(&mut self, record: &AlignmentRecord) -> Result<u64> {
        self.push(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FileHeaderBuilder;
    use crate::policy::QualityPolicy;
    use crate::Error;

    fn record_at(refs: &mut References, name: &str, pos: i32) -> AlignmentRecord {
        let mut record = AlignmentRecord::new();
        record.set_qname(&format!("{name}_{pos}"));
        record.set_rname(name, refs);
        record.set_pos(pos);
        record.set_cigar("8M").unwrap();
        record.set_seq(b"ACGTACGT");
        record.set_qual(b"IIIIIIII", QualityPolicy::Phred33).unwrap();
        record
    }

    // ==================== Writer Tests ====================

    #[test]
    fn test_push_returns_row_ordinals() {
        let mut refs = References::new();
        let mut writer = RamWriter::new(Vec::new(), FileHeader::default()).unwrap();
        for (i, pos) in [10, 20, 30].into_iter().enumerate() {
            let record = record_at(&mut refs, "chr1", pos);
            assert_eq!(writer.push(&record).unwrap(), i as u64);
        }
        assert_eq!(writer.num_records(), 3);
        assert!(writer.usage() > 0.0);
    }

    #[test]
    fn test_header_is_written_first() {
        let header = FileHeaderBuilder::new().with_index_interval(8).build();
        let writer = RamWriter::new(Vec::new(), header).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), size_of::<FileHeader>());
        assert_eq!(FileHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_small_blocks_are_flushed() {
        let mut refs = References::new();
        let record = record_at(&mut refs, "chr1", 0);
        let header = FileHeaderBuilder::new()
            .with_block_size(record.size() as u64 * 2)
            .build();
        let mut writer = RamWriter::new(Vec::new(), header).unwrap();
        for pos in 0..5 {
            writer.push(&record_at(&mut refs, "chr1", pos)).unwrap();
        }
        writer.finish(&refs).unwrap();
        assert_eq!(writer.headers.len(), 3);
        assert_eq!(
            writer.headers.iter().map(|h| h.num_records).sum::<u64>(),
            5
        );
    }

    #[test]
    fn test_trailer_layout() {
        let mut refs = References::new();
        let mut writer = RamWriter::new(Vec::new(), FileHeader::default()).unwrap();
        writer.push(&record_at(&mut refs, "chr1", 5)).unwrap();
        writer.finish(&refs).unwrap();
        let bytes = writer.into_inner();

        let footer_start = bytes.len() - size_of::<IndexFooter>();
        let footer = IndexFooter::from_bytes(&bytes[footer_start..]).unwrap();
        let z_start = footer_start - footer.bytes as usize;
        let iheader_start = z_start - size_of::<IndexHeader>();
        let iheader = IndexHeader::from_bytes(&bytes[iheader_start..z_start]).unwrap();
        assert_eq!(iheader.z_bytes, footer.bytes);

        let tables = SideTables::decoded(&bytes[z_start..footer_start], iheader.u_bytes).unwrap();
        assert_eq!(tables.index.num_records(), 1);
        assert_eq!(tables.refs.rname.id_of("chr1"), Some(0));
        assert_eq!(tables.positions.get_row(0, 5), Some(0));
    }

    #[test]
    fn test_push_after_finish() {
        let mut refs = References::new();
        let mut writer = RamWriter::new(Vec::new(), FileHeader::default()).unwrap();
        writer.finish(&refs).unwrap();
        assert!(matches!(
            writer.push(&record_at(&mut refs, "chr1", 1)),
            Err(Error::WriteError(WriteError::AlreadyFinished))
        ));
        assert!(writer.finish(&refs).is_err());
    }

    #[test]
    fn test_rejected_record_keeps_row_count() {
        let mut refs = References::new();
        let header = FileHeaderBuilder::new()
            .with_quality_policy(QualityPolicy::Binned)
            .build();
        let mut writer = RamWriter::new(Vec::new(), header).unwrap();
        assert!(writer.push(&record_at(&mut refs, "chr1", 1)).is_err());
        assert_eq!(writer.num_records(), 0);
    }

    #[test]
    fn test_append_through_sink() {
        fn append_all<S: RowSink>(mut sink: S, records: &[AlignmentRecord]) -> Result<u64> {
            let mut last = 0;
            for record in records {
                last = sink.append(record)?;
            }
            Ok(last)
        }
        let mut refs = References::new();
        let records = [record_at(&mut refs, "chr1", 1), record_at(&mut refs, "chr2", 1)];
        let mut writer = RamWriter::new(Vec::new(), FileHeader::default()).unwrap();
        assert_eq!(append_all(&mut writer, &records).unwrap(), 1);
    }
}
