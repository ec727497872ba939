use std::io;

use bytemuck::cast_slice;
use log::debug;
use zstd::zstd_safe;

use crate::cigar::Cigar;
use crate::error::{ReadError, Result, WriteError};
use crate::nuc;
use crate::policy::QualityPolicy;
use crate::record::AlignmentRecord;
use crate::store::Projection;

use super::utils::{calculate_offsets, decompress_column, sized_compress, slice_and_increment};
use super::{BlockHeader, Column, FileHeader, NUM_COLUMNS};

/// Native buffers of the block columns
#[derive(Clone, Default)]
struct Columns {
    qname_len: Vec<u32>,
    qnames: Vec<u8>,
    flags: Vec<u16>,
    refids: Vec<i32>,
    pos: Vec<i32>,
    mapq: Vec<u8>,
    cigar_len: Vec<u32>,
    cigar: Vec<u32>,
    refnext: Vec<i32>,
    pnext: Vec<i32>,
    tlen: Vec<i32>,
    seq_len: Vec<u32>,
    seq: Vec<u8>,
    qual: Vec<u8>,
    opt_count: Vec<u32>,
    opt_len: Vec<u32>,
    opts: Vec<u8>,
}
impl Columns {
    fn clear(&mut self) {
        self.qname_len.clear();
        self.qnames.clear();
        self.flags.clear();
        self.refids.clear();
        self.pos.clear();
        self.mapq.clear();
        self.cigar_len.clear();
        self.cigar.clear();
        self.refnext.clear();
        self.pnext.clear();
        self.tlen.clear();
        self.seq_len.clear();
        self.seq.clear();
        self.qual.clear();
        self.opt_count.clear();
        self.opt_len.clear();
        self.opts.clear();
    }

    /// Little-endian byte view of a column
    fn bytes(&self, column: Column) -> &[u8] {
        match column {
            Column::QnameLen => cast_slice(&self.qname_len),
            Column::Qname => &self.qnames,
            Column::Flag => cast_slice(&self.flags),
            Column::RefId => cast_slice(&self.refids),
            Column::Pos => cast_slice(&self.pos),
            Column::Mapq => &self.mapq,
            Column::CigarLen => cast_slice(&self.cigar_len),
            Column::Cigar => cast_slice(&self.cigar),
            Column::RefNext => cast_slice(&self.refnext),
            Column::PNext => cast_slice(&self.pnext),
            Column::TLen => cast_slice(&self.tlen),
            Column::SeqLen => cast_slice(&self.seq_len),
            Column::Seq => &self.seq,
            Column::Qual => &self.qual,
            Column::OptCount => cast_slice(&self.opt_count),
            Column::OptLen => cast_slice(&self.opt_len),
            Column::Opt => &self.opts,
        }
    }

    fn decompress(
        &mut self,
        column: Column,
        src: &[u8],
        u_len: u64,
        dctx: &mut zstd_safe::DCtx,
    ) -> Result<()> {
        match column {
            Column::QnameLen => decompress_column(&mut self.qname_len, src, u_len, column, dctx),
            Column::Qname => decompress_column(&mut self.qnames, src, u_len, column, dctx),
            Column::Flag => decompress_column(&mut self.flags, src, u_len, column, dctx),
            Column::RefId => decompress_column(&mut self.refids, src, u_len, column, dctx),
            Column::Pos => decompress_column(&mut self.pos, src, u_len, column, dctx),
            Column::Mapq => decompress_column(&mut self.mapq, src, u_len, column, dctx),
            Column::CigarLen => decompress_column(&mut self.cigar_len, src, u_len, column, dctx),
            Column::Cigar => decompress_column(&mut self.cigar, src, u_len, column, dctx),
            Column::RefNext => decompress_column(&mut self.refnext, src, u_len, column, dctx),
            Column::PNext => decompress_column(&mut self.pnext, src, u_len, column, dctx),
            Column::TLen => decompress_column(&mut self.tlen, src, u_len, column, dctx),
            Column::SeqLen => decompress_column(&mut self.seq_len, src, u_len, column, dctx),
            Column::Seq => decompress_column(&mut self.seq, src, u_len, column, dctx),
            Column::Qual => decompress_column(&mut self.qual, src, u_len, column, dctx),
            Column::OptCount => decompress_column(&mut self.opt_count, src, u_len, column, dctx),
            Column::OptLen => decompress_column(&mut self.opt_len, src, u_len, column, dctx),
            Column::Opt => decompress_column(&mut self.opts, src, u_len, column, dctx),
        }
    }
}

/// Byte width of the columns holding exactly one value per record
fn record_width(column: Column) -> Option<usize> {
    match column {
        Column::Flag => Some(2),
        Column::Mapq => Some(1),
        Column::QnameLen
        | Column::RefId
        | Column::Pos
        | Column::CigarLen
        | Column::RefNext
        | Column::PNext
        | Column::TLen
        | Column::SeqLen
        | Column::OptCount => Some(4),
        Column::Qname
        | Column::Cigar
        | Column::Seq
        | Column::Qual
        | Column::OptLen
        | Column::Opt => None,
    }
}

fn check_size(column: Column, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ReadError::ColumnSizeMismatch {
            column: column.name(),
            expected,
            actual,
        }
        .into())
    }
}

/// A block of records where every field is stored in its own column.
#[derive(Clone, Default)]
pub struct ColumnarBlock {
    columns: Columns,

    /// Reusable zstd compression buffers, one per column
    z_columns: [Vec<u8>; NUM_COLUMNS],

    // per-record offsets into the variable-length columns (n + 1 entries)
    qname_offsets: Vec<usize>,
    cigar_offsets: Vec<usize>,
    seq_offsets: Vec<usize>,
    qual_offsets: Vec<usize>,
    opt_field_offsets: Vec<usize>,
    opt_offsets: Vec<usize>,

    /// Reusable buffer for missing quality bytes
    qbuf: Vec<u8>,

    /// Number of records in the block
    pub(crate) num_records: usize,

    /// Current size of this block (virtual)
    current_size: usize,

    /// Fields whose columns are currently decoded
    loaded: Projection,

    /// The file header (used for block configuration)
    ///
    /// Not to be confused with the `BlockHeader`
    pub(crate) header: FileHeader,
    policy: QualityPolicy,
}
impl ColumnarBlock {
    #[must_use]
    pub fn new(header: FileHeader) -> Self {
        Self {
            header,
            policy: header.quality_policy(),
            loaded: Projection::NONE,
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    #[must_use]
    pub fn num_records(&self) -> usize {
        self.num_records
    }

    /// Returns the fields whose columns are decoded
    #[must_use]
    pub fn loaded(&self) -> Projection {
        self.loaded
    }

    /// Calculate the usage of the block as a percentage
    #[must_use]
    pub fn usage(&self) -> f64 {
        self.current_size as f64 / self.header.block_size as f64
    }

    /// Clears the internal data structures
    pub(crate) fn clear(&mut self) {
        self.num_records = 0;
        self.current_size = 0;
        self.loaded = Projection::NONE;
        self.columns.clear();
        self.z_columns.iter_mut().for_each(Vec::clear);
        self.qname_offsets.clear();
        self.cigar_offsets.clear();
        self.seq_offsets.clear();
        self.qual_offsets.clear();
        self.opt_field_offsets.clear();
        self.opt_offsets.clear();
    }

    /// Bytes the record occupies once its quality is stored under the block policy
    fn stored_size(&self, record: &AlignmentRecord) -> usize {
        record.size() - record.qual_policy().stored_len(record.seq_len())
            + self.policy.stored_len(record.seq_len())
    }

    pub(crate) fn can_fit(&self, record: &AlignmentRecord) -> bool {
        self.current_size + self.stored_size(record) <= self.header.block_size as usize
    }

    /// Ensure that the record can be pushed into the block
    fn validate_record(&self, record: &AlignmentRecord) -> Result<()> {
        if !self.can_fit(record) {
            let record_size = self.stored_size(record);
            if record_size > self.header.block_size as usize {
                return Err(WriteError::RecordSizeExceedsMaximumBlockSize(
                    record_size,
                    self.header.block_size as usize,
                )
                .into());
            }
            return Err(WriteError::BlockFull {
                current_size: self.current_size,
                record_size: self.stored_size(record),
                block_size: self.header.block_size as usize,
            }
            .into());
        }

        let packed_len = record.packed_seq().map_or(0, <[u8]>::len);
        if packed_len != nuc::packed_len(record.seq_len()) {
            return Err(WriteError::SequenceLengthMismatch {
                seq_len: record.seq_len(),
                packed_len,
            }
            .into());
        }

        if let Some(qual) = record.stored_qual() {
            if record.qual_policy() != self.policy {
                return Err(WriteError::QualityPolicyMismatch {
                    expected: self.policy,
                    actual: record.qual_policy(),
                }
                .into());
            }
            if qual.len() != self.policy.stored_len(record.seq_len()) {
                return Err(WriteError::QualityLengthMismatch {
                    seq_len: record.seq_len(),
                    qual_len: qual.len(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Appends a record to the native columns
    ///
    /// A record without loaded quality bytes is stored as missing (`*`).
    pub fn push(&mut self, record: &AlignmentRecord) -> Result<()> {
        self.validate_record(record)?;

        let columns = &mut self.columns;
        columns.qname_len.push(record.qname().len() as u32);
        columns.qnames.extend_from_slice(record.qname().as_bytes());
        columns.flags.push(record.flag());
        columns.refids.push(record.refid());
        columns.pos.push(record.pos());
        columns.mapq.push(record.mapq());

        let ops = record.cigar().map_or(&[][..], Cigar::ops);
        columns.cigar_len.push(ops.len() as u32);
        columns.cigar.extend_from_slice(ops);

        columns.refnext.push(record.refnext());
        columns.pnext.push(record.pnext());
        columns.tlen.push(record.tlen());

        columns.seq_len.push(record.seq_len() as u32);
        columns
            .seq
            .extend_from_slice(record.packed_seq().unwrap_or_default());
        if let Some(qual) = record.stored_qual() {
            columns.qual.extend_from_slice(qual);
        } else {
            self.policy.encode_missing(record.seq_len(), &mut self.qbuf);
            columns.qual.extend_from_slice(&self.qbuf);
        }

        columns.opt_count.push(record.n_opts() as u32);
        for opt in record.opts() {
            columns.opt_len.push(opt.len() as u32);
            columns.opts.extend_from_slice(opt.as_bytes());
        }

        self.current_size += self.stored_size(record);
        self.num_records += 1;
        Ok(())
    }

    /// Compresses every column and writes the block
    ///
    /// Returns the written block header, or `None` for an empty block.
    pub fn flush_to<W: io::Write>(
        &mut self,
        writer: &mut W,
        cctx: &mut zstd_safe::CCtx,
    ) -> Result<Option<BlockHeader>> {
        if self.is_empty() {
            return Ok(None);
        }

        let mut z_len = [0; NUM_COLUMNS];
        let mut u_len = [0; NUM_COLUMNS];
        for column in Column::ALL {
            let bytes = self.columns.bytes(column);
            let z_buf = &mut self.z_columns[column as usize];
            z_buf.clear();
            if !bytes.is_empty() {
                sized_compress(z_buf, bytes, cctx)?;
            }
            u_len[column as usize] = bytes.len() as u64;
            z_len[column as usize] = z_buf.len() as u64;
        }

        let header = BlockHeader::new(self.num_records as u64, z_len, u_len);
        header.write(writer)?;
        for z_buf in &self.z_columns {
            writer.write_all(z_buf)?;
        }
        debug!(
            "Flushed block of {} records ({} -> {} bytes)",
            self.num_records,
            u_len.iter().sum::<u64>(),
            header.block_len()
        );

        self.clear();
        Ok(Some(header))
    }

    /// Decompresses the columns a projection needs from a block body
    pub fn decompress_from_bytes(
        &mut self,
        bytes: &[u8],
        header: BlockHeader,
        projection: Projection,
        dctx: &mut zstd_safe::DCtx,
    ) -> Result<()> {
        // clears the internal state
        self.clear();

        // every column of a block fits in the block size
        let size = Column::ALL
            .iter()
            .try_fold(0u64, |acc, column| acc.checked_add(header.u_len(*column)))
            .unwrap_or(u64::MAX);
        if size > self.header.block_size {
            return Err(ReadError::BlockSizeExceeded {
                size,
                block_size: self.header.block_size,
            }
            .into());
        }
        self.num_records = header.num_records as usize;

        let mut byte_offset = 0;
        for column in Column::ALL {
            let src = slice_and_increment(&mut byte_offset, header.z_len(column), bytes)?;
            if column.is_needed(projection) {
                self.columns
                    .decompress(column, src, header.u_len(column), dctx)?;
            }
        }
        self.loaded = projection;

        self.calculate_offsets()
    }

    /// Validates the decoded columns and builds the record offsets
    fn calculate_offsets(&mut self) -> Result<()> {
        let columns = &self.columns;
        let loaded = self.loaded;
        for column in Column::ALL {
            if let Some(width) = record_width(column) {
                if column.is_needed(loaded) {
                    check_size(column, self.num_records * width, columns.bytes(column).len())?;
                }
            }
        }

        if loaded.contains(Projection::QNAME) {
            calculate_offsets(
                columns.qname_len.iter().map(|len| *len as usize),
                &mut self.qname_offsets,
            );
            check_size(Column::Qname, total(&self.qname_offsets), columns.qnames.len())?;
        }
        if loaded.contains(Projection::CIGAR) {
            calculate_offsets(
                columns.cigar_len.iter().map(|len| *len as usize),
                &mut self.cigar_offsets,
            );
            check_size(Column::Cigar, total(&self.cigar_offsets), columns.cigar.len())?;
        }
        if loaded.contains(Projection::SEQ) {
            calculate_offsets(
                columns
                    .seq_len
                    .iter()
                    .map(|len| nuc::packed_len(*len as usize)),
                &mut self.seq_offsets,
            );
            check_size(Column::Seq, total(&self.seq_offsets), columns.seq.len())?;
        }
        if loaded.contains(Projection::QUAL) {
            let policy = self.policy;
            calculate_offsets(
                columns
                    .seq_len
                    .iter()
                    .map(|len| policy.stored_len(*len as usize)),
                &mut self.qual_offsets,
            );
            check_size(Column::Qual, total(&self.qual_offsets), columns.qual.len())?;
        }
        if loaded.contains(Projection::OPT) {
            calculate_offsets(
                columns.opt_count.iter().map(|count| *count as usize),
                &mut self.opt_field_offsets,
            );
            check_size(
                Column::OptLen,
                total(&self.opt_field_offsets),
                columns.opt_len.len(),
            )?;
            calculate_offsets(
                columns.opt_len.iter().map(|len| *len as usize),
                &mut self.opt_offsets,
            );
            check_size(Column::Opt, total(&self.opt_offsets), columns.opts.len())?;
        }
        Ok(())
    }

    /// Populates `record` with the projected fields of the record at `index`
    ///
    /// Fields whose columns are not decoded are left unpopulated.
    pub fn fill_record(
        &self,
        index: usize,
        projection: Projection,
        record: &mut AlignmentRecord,
    ) -> Result<()> {
        if index >= self.num_records {
            return Err(ReadError::OutOfRange {
                requested_index: index as u64,
                max_index: self.num_records as u64,
            }
            .into());
        }
        let projection = projection.intersection(self.loaded);
        let columns = &self.columns;

        record.clear();
        record.set_qual_policy(self.policy);
        if projection.contains(Projection::QNAME) {
            let range = self.qname_offsets[index]..self.qname_offsets[index + 1];
            record.set_qname(std::str::from_utf8(&columns.qnames[range])?);
        }
        if projection.contains(Projection::FLAG) {
            record.set_flag(columns.flags[index]);
        }
        if projection.contains(Projection::REFID) {
            record.set_refid(columns.refids[index]);
        }
        if projection.contains(Projection::POS) {
            record.set_pos(columns.pos[index]);
        }
        if projection.contains(Projection::MAPQ) {
            record.set_mapq(columns.mapq[index]);
        }
        if projection.contains(Projection::CIGAR) {
            let range = self.cigar_offsets[index]..self.cigar_offsets[index + 1];
            record.set_cigar_ops(Cigar::from_ops(columns.cigar[range].to_vec())?);
        }
        if projection.contains(Projection::REFNEXT) {
            record.set_refnext(columns.refnext[index]);
        }
        if projection.contains(Projection::PNEXT) {
            record.set_pnext(columns.pnext[index]);
        }
        if projection.contains(Projection::TLEN) {
            record.set_tlen(columns.tlen[index]);
        }
        if projection.needs_seq_len() {
            record.set_seq_len(columns.seq_len[index]);
        }
        if projection.contains(Projection::SEQ) {
            let range = self.seq_offsets[index]..self.seq_offsets[index + 1];
            record.set_packed_seq(columns.seq_len[index], &columns.seq[range]);
        }
        if projection.contains(Projection::QUAL) {
            let range = self.qual_offsets[index]..self.qual_offsets[index + 1];
            record.set_stored_qual(self.policy, &columns.qual[range]);
        }
        if projection.contains(Projection::OPT) {
            for field in self.opt_field_offsets[index]..self.opt_field_offsets[index + 1] {
                let range = self.opt_offsets[field]..self.opt_offsets[field + 1];
                record.push_opt(std::str::from_utf8(&columns.opts[range])?)?;
            }
        }
        Ok(())
    }
}

fn total(offsets: &[usize]) -> usize {
    offsets.last().copied().unwrap_or(0)
}
