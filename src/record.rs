//! Alignment records
//!
//! [`AlignmentRecord`] holds one SAM alignment with its sequence packed into
//! 4-bit codes and its qualities encoded under a [`QualityPolicy`].

use std::io;

use crate::cigar::Cigar;
use crate::error::{RecordError, Result};
use crate::nuc;
use crate::policy::QualityPolicy;
use crate::refs::{References, SAME_AS_PREVIOUS, UNMAPPED_ID};
use crate::sam::SamFormatter;
use crate::store::Projection;

/// Maximum number of optional fields a record holds
pub const MAX_OPT_FIELDS: usize = 30;

/// FLAG bit of a segment without alignment
pub const FLAG_UNMAPPED: u16 = 0x4;

/// A single alignment record
///
/// Positions are 0-based; the SAM text boundary ([`SamParser`](crate::SamParser)
/// and [`SamFormatter`]) converts to and from 1-based coordinates.
///
/// Variable-length fields are `None` when the record was read from a store
/// without loading their column. Their decoders then yield empty output.
///
/// # Example
///
/// ```
/// use binram::{AlignmentRecord, QualityPolicy, References};
///
/// let mut refs = References::new();
/// let mut record = AlignmentRecord::new();
/// record.set_qname("read1");
/// record.set_rname("chr1", &mut refs);
/// record.set_pos(99);
/// record.set_cigar("4M").unwrap();
/// record.set_seq(b"ACGT");
/// record.set_qual(b"IIII", QualityPolicy::Phred33).unwrap();
///
/// assert_eq!(record.rname(&refs).unwrap(), "chr1");
/// assert_eq!(record.seq_string().unwrap(), "ACGT");
/// assert_eq!(record.end(), 103);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRecord {
    qname: String,
    flag: u16,
    refid: i32,
    pos: i32,
    mapq: u8,
    cigar: Option<Cigar>,
    refnext: i32,
    pnext: i32,
    tlen: i32,

    /// Logical sequence length
    seq_len: u32,
    /// Packed 4-bit sequence
    seq: Option<Vec<u8>>,
    /// Quality bytes as stored under `qual_policy`
    qual: Option<Vec<u8>>,
    qual_policy: QualityPolicy,

    opts: Vec<String>,
}
impl Default for AlignmentRecord {
    fn default() -> Self {
        Self {
            qname: String::new(),
            flag: 0,
            refid: UNMAPPED_ID,
            pos: -1,
            mapq: 0,
            cigar: None,
            refnext: UNMAPPED_ID,
            pnext: -1,
            tlen: 0,
            seq_len: 0,
            seq: None,
            qual: None,
            qual_policy: QualityPolicy::default(),
            opts: Vec::new(),
        }
    }
}

/// Setters
impl AlignmentRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every field to its unpopulated state
    ///
    /// The quality policy is kept.
    pub fn clear(&mut self) {
        self.qname.clear();
        self.flag = 0;
        self.refid = UNMAPPED_ID;
        self.pos = -1;
        self.mapq = 0;
        self.cigar = None;
        self.refnext = UNMAPPED_ID;
        self.pnext = -1;
        self.tlen = 0;
        self.seq_len = 0;
        self.seq = None;
        self.qual = None;
        self.opts.clear();
    }

    pub fn set_qname(&mut self, qname: &str) {
        self.qname.clear();
        self.qname.push_str(qname);
    }

    pub fn set_flag(&mut self, flag: u16) {
        self.flag = flag;
    }

    pub fn set_refid(&mut self, refid: i32) {
        self.refid = refid;
    }

    /// Interns the reference name and stores its id
    pub fn set_rname(&mut self, name: &str, refs: &mut References) -> i32 {
        self.refid = refs.rname.intern(name);
        self.refid
    }

    /// Sets the 0-based leftmost position
    pub fn set_pos(&mut self, pos: i32) {
        self.pos = pos;
    }

    pub fn set_mapq(&mut self, mapq: u8) {
        self.mapq = mapq;
    }

    /// Parses and stores CIGAR text
    ///
    /// An unknown operation rejects the whole CIGAR.
    pub fn set_cigar(&mut self, text: &str) -> Result<()> {
        let cigar = self.cigar.get_or_insert_with(Cigar::default);
        cigar.parse_into(text)
    }

    pub fn set_cigar_ops(&mut self, cigar: Cigar) {
        self.cigar = Some(cigar);
    }

    pub fn set_refnext(&mut self, refnext: i32) {
        self.refnext = refnext;
    }

    /// Interns the next-segment reference name and stores its id
    ///
    /// `=` stands for this record's own reference, so RNAME must be set first.
    pub fn set_rnext(&mut self, name: &str, refs: &mut References) -> Result<i32> {
        self.refnext = if name == SAME_AS_PREVIOUS {
            let rname = refs.rname.name_of(self.refid)?;
            refs.rnext.intern(rname)
        } else {
            refs.rnext.intern(name)
        };
        Ok(self.refnext)
    }

    /// Sets the 0-based position of the next segment
    pub fn set_pnext(&mut self, pnext: i32) {
        self.pnext = pnext;
    }

    pub fn set_tlen(&mut self, tlen: i32) {
        self.tlen = tlen;
    }

    /// Packs and stores a nucleotide sequence
    ///
    /// `*` stores an empty sequence.
    pub fn set_seq(&mut self, seq: &[u8]) {
        let seq: &[u8] = if seq == b"*" { &[] } else { seq };
        let packed = self.seq.get_or_insert_with(Vec::new);
        nuc::encode(seq, packed);
        self.seq_len = seq.len() as u32;
    }

    /// Stores an already packed sequence of `len` bases
    pub(crate) fn set_packed_seq(&mut self, len: u32, packed: &[u8]) {
        let buffer = self.seq.get_or_insert_with(Vec::new);
        buffer.clear();
        buffer.extend_from_slice(packed);
        self.seq_len = len;
    }

    pub(crate) fn set_seq_len(&mut self, len: u32) {
        self.seq_len = len;
    }

    /// Encodes and stores a Phred+33 quality string under a policy
    ///
    /// `*` marks missing qualities. Any other string must match the sequence length.
    pub fn set_qual(&mut self, qual: &[u8], policy: QualityPolicy) -> Result<()> {
        self.qual_policy = policy;
        let stored = self.qual.get_or_insert_with(Vec::new);
        if qual == b"*" {
            policy.encode_missing(self.seq_len as usize, stored);
            return Ok(());
        }
        if qual.len() != self.seq_len as usize {
            stored.clear();
            return Err(RecordError::QualityLengthMismatch {
                seq_len: self.seq_len as usize,
                qual_len: qual.len(),
            }
            .into());
        }
        policy.encode(qual, stored);
        Ok(())
    }

    /// Stores quality bytes already encoded under `policy`
    pub(crate) fn set_stored_qual(&mut self, policy: QualityPolicy, stored: &[u8]) {
        self.qual_policy = policy;
        let buffer = self.qual.get_or_insert_with(Vec::new);
        buffer.clear();
        buffer.extend_from_slice(stored);
    }

    pub(crate) fn set_qual_policy(&mut self, policy: QualityPolicy) {
        self.qual_policy = policy;
    }

    /// Fills the record as an unaligned read
    ///
    /// The record gets FLAG 4, no reference, and an empty CIGAR. A missing
    /// quality string is stored as `*`.
    pub fn set_unaligned(
        &mut self,
        qname: &str,
        seq: &[u8],
        qual: Option<&[u8]>,
        policy: QualityPolicy,
    ) -> Result<()> {
        self.clear();
        self.set_qname(qname);
        self.flag = FLAG_UNMAPPED;
        self.cigar = Some(Cigar::default());
        self.set_seq(seq);
        self.set_qual(qual.unwrap_or(b"*"), policy)
    }

    /// Appends an optional field (`TAG:TYPE:VALUE`)
    pub fn push_opt(&mut self, field: &str) -> Result<()> {
        if self.opts.len() >= MAX_OPT_FIELDS {
            return Err(RecordError::TooManyOptionalFields(MAX_OPT_FIELDS).into());
        }
        self.opts.push(field.to_string());
        Ok(())
    }

    pub fn clear_opts(&mut self) {
        self.opts.clear();
    }

    /// Resets every field outside the projection to its unpopulated state
    pub fn retain(&mut self, projection: Projection) {
        if !projection.contains(Projection::QNAME) {
            self.qname.clear();
        }
        if !projection.contains(Projection::FLAG) {
            self.flag = 0;
        }
        if !projection.contains(Projection::REFID) {
            self.refid = UNMAPPED_ID;
        }
        if !projection.contains(Projection::POS) {
            self.pos = -1;
        }
        if !projection.contains(Projection::MAPQ) {
            self.mapq = 0;
        }
        if !projection.contains(Projection::CIGAR) {
            self.cigar = None;
        }
        if !projection.contains(Projection::REFNEXT) {
            self.refnext = UNMAPPED_ID;
        }
        if !projection.contains(Projection::PNEXT) {
            self.pnext = -1;
        }
        if !projection.contains(Projection::TLEN) {
            self.tlen = 0;
        }
        if !projection.needs_seq_len() {
            self.seq_len = 0;
        }
        if !projection.contains(Projection::SEQ) {
            self.seq = None;
        }
        if !projection.contains(Projection::QUAL) {
            self.qual = None;
        }
        if !projection.contains(Projection::OPT) {
            self.opts.clear();
        }
    }
}

/// Getters
impl AlignmentRecord {
    #[must_use]
    pub fn qname(&self) -> &str {
        &self.qname
    }

    #[must_use]
    pub fn flag(&self) -> u16 {
        self.flag
    }

    #[must_use]
    pub fn refid(&self) -> i32 {
        self.refid
    }

    /// Returns the reference name from the RNAME table
    pub fn rname<'r>(&self, refs: &'r References) -> Result<&'r str> {
        refs.rname.name_of(self.refid)
    }

    /// Returns the 0-based leftmost position
    #[must_use]
    pub fn pos(&self) -> i32 {
        self.pos
    }

    #[must_use]
    pub fn mapq(&self) -> u8 {
        self.mapq
    }

    /// Returns the CIGAR, or `None` if its column was not loaded
    #[must_use]
    pub fn cigar(&self) -> Option<&Cigar> {
        self.cigar.as_ref()
    }

    /// Returns the number of CIGAR operations
    #[must_use]
    pub fn n_cigar_ops(&self) -> usize {
        self.cigar.as_ref().map_or(0, Cigar::len)
    }

    pub fn cigar_op_len(&self, index: usize) -> Result<u32> {
        match &self.cigar {
            Some(cigar) => cigar.op_len(index),
            None => Err(RecordError::CigarIndexOutOfRange { index, len: 0 }.into()),
        }
    }

    pub fn cigar_op_code(&self, index: usize) -> Result<u8> {
        match &self.cigar {
            Some(cigar) => cigar.op_code(index),
            None => Err(RecordError::CigarIndexOutOfRange { index, len: 0 }.into()),
        }
    }

    /// Returns the CIGAR text
    ///
    /// No operations yield `*`, an unloaded column yields an empty string.
    #[must_use]
    pub fn cigar_string(&self) -> String {
        self.cigar.as_ref().map(Cigar::to_string).unwrap_or_default()
    }

    #[must_use]
    pub fn refnext(&self) -> i32 {
        self.refnext
    }

    /// Returns the next-segment reference name in SAM form
    ///
    /// Yields `=` when it names the same reference as RNAME.
    pub fn rnext<'r>(&self, refs: &'r References) -> Result<&'r str> {
        let rnext = refs.rnext.name_of(self.refnext)?;
        if self.refnext != UNMAPPED_ID && self.refid != UNMAPPED_ID {
            if let Ok(rname) = refs.rname.name_of(self.refid) {
                if rname == rnext {
                    return Ok(SAME_AS_PREVIOUS);
                }
            }
        }
        Ok(rnext)
    }

    /// Returns the 0-based position of the next segment
    #[must_use]
    pub fn pnext(&self) -> i32 {
        self.pnext
    }

    #[must_use]
    pub fn tlen(&self) -> i32 {
        self.tlen
    }

    /// Returns the logical sequence length
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.seq_len as usize
    }

    /// Returns the packed sequence, or `None` if its column was not loaded
    #[must_use]
    pub fn packed_seq(&self) -> Option<&[u8]> {
        self.seq.as_deref()
    }

    /// Returns the stored quality bytes, or `None` if their column was not loaded
    #[must_use]
    pub fn stored_qual(&self) -> Option<&[u8]> {
        self.qual.as_deref()
    }

    #[must_use]
    pub fn qual_policy(&self) -> QualityPolicy {
        self.qual_policy
    }

    /// Decodes the sequence into a caller-owned buffer
    pub fn decode_seq(&self, buffer: &mut Vec<u8>) -> Result<()> {
        nuc::decode(self.seq.as_deref().unwrap_or_default(), self.seq_len(), buffer)
    }

    /// Decodes the quality string into a caller-owned buffer
    pub fn decode_qual(&self, buffer: &mut Vec<u8>) -> Result<()> {
        self.qual_policy
            .decode(self.qual.as_deref(), self.seq_len(), buffer)
    }

    pub fn seq_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.decode_seq(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn qual_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.decode_qual(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    #[must_use]
    pub fn n_opts(&self) -> usize {
        self.opts.len()
    }

    pub fn opt(&self, index: usize) -> Result<&str> {
        self.opts.get(index).map(String::as_str).ok_or_else(|| {
            RecordError::OptionalFieldIndexOutOfRange {
                index,
                len: self.opts.len(),
            }
            .into()
        })
    }

    #[must_use]
    pub fn opts(&self) -> &[String] {
        &self.opts
    }

    /// Returns the exclusive end of the record's footprint (`pos + seq_len`)
    #[must_use]
    pub fn end(&self) -> i64 {
        i64::from(self.pos) + i64::from(self.seq_len)
    }

    /// Checks if the footprint reaches past `start` and begins at or before `end`
    ///
    /// Both bounds are 0-based and inclusive.
    #[must_use]
    pub fn overlaps(&self, start: i32, end: i32) -> bool {
        self.end() > i64::from(start) && self.pos <= end
    }

    /// Returns the number of stored bytes this record adds to a block
    #[must_use]
    pub fn size(&self) -> usize {
        const FIXED: usize = 4 + 2 + 4 + 4 + 1 + 4 + 4 + 4 + 4 + 4 + 4;
        FIXED
            + self.qname.len()
            + 4 * self.n_cigar_ops()
            + nuc::packed_len(self.seq_len())
            + self.qual_policy.stored_len(self.seq_len())
            + self.opts.iter().map(|opt| 4 + opt.len()).sum::<usize>()
    }

    /// Writes the record as a SAM line (with trailing newline)
    pub fn write_sam<W: io::Write>(&self, refs: &References, writer: &mut W) -> Result<()> {
        let mut formatter = SamFormatter::new();
        writer.write_all(formatter.format(self, refs)?)?;
        Ok(())
    }

    /// Prints the record as a SAM line to stdout
    pub fn print(&self, refs: &References) -> Result<()> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        self.write_sam(refs, &mut handle)
    }
}
