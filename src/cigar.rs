//! CIGAR encoding and decoding
//!
//! Every operation is packed into a single `u32` as `(run_length << 4) | opcode`
//! with opcodes indexed into `MIDNSHP=X`.

use std::fmt;

use crate::error::{CodecError, RecordError, Result};

/// The CIGAR operation alphabet, indexed by opcode
pub const CIGAR_OPS: &[u8; 9] = b"MIDNSHP=X";

/// The largest run length that fits in a packed operation
pub const MAX_RUN_LENGTH: u32 = (1 << 28) - 1;

/// Text form of an alignment without operations
pub const NO_CIGAR: &str = "*";

/// Returns the opcode of a CIGAR operation character
#[must_use]
pub fn opcode_of(op: u8) -> Option<u8> {
    CIGAR_OPS.iter().position(|c| *c == op).map(|i| i as u8)
}

/// Packs a run length and opcode into a single operation word
#[inline]
#[must_use]
pub fn pack_op(len: u32, opcode: u8) -> u32 {
    (len << 4) | u32::from(opcode)
}

/// A packed list of CIGAR operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Cigar {
    ops: Vec<u32>,
}
impl Cigar {
    /// Parses CIGAR text into packed operations
    ///
    /// `*` and the empty string both parse to an empty operation list.
    ///
    /// # Examples
    ///
    /// ```
    /// # use binram::Cigar;
    /// let cigar = Cigar::parse("8M2I4M").unwrap();
    /// assert_eq!(cigar.len(), 3);
    /// assert_eq!(cigar.to_string(), "8M2I4M");
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let mut cigar = Self::default();
        cigar.parse_into(text)?;
        Ok(cigar)
    }

    /// Parses CIGAR text into this list, replacing its operations
    ///
    /// On error the list is left empty.
    pub fn parse_into(&mut self, text: &str) -> Result<()> {
        self.ops.clear();
        if text.is_empty() || text == NO_CIGAR {
            return Ok(());
        }

        let mut run: Option<u64> = None;
        for c in text.bytes() {
            if c.is_ascii_digit() {
                let len = run.unwrap_or(0) * 10 + u64::from(c - b'0');
                if len > u64::from(MAX_RUN_LENGTH) {
                    self.ops.clear();
                    return Err(CodecError::CigarRunTooLong(len).into());
                }
                run = Some(len);
                continue;
            }
            let Some(opcode) = opcode_of(c) else {
                self.ops.clear();
                return Err(CodecError::UnknownCigarOperation(char::from(c)).into());
            };
            let Some(len) = run.take() else {
                self.ops.clear();
                return Err(CodecError::MissingCigarLength(char::from(c)).into());
            };
            self.ops.push(pack_op(len as u32, opcode));
        }

        if run.is_some() {
            self.ops.clear();
            return Err(CodecError::DanglingCigarLength(text.to_string()).into());
        }
        Ok(())
    }

    /// Builds a CIGAR from already packed operation words
    ///
    /// Every word must carry an opcode within `MIDNSHP=X`.
    pub fn from_ops(ops: Vec<u32>) -> Result<Self> {
        if let Some(op) = ops.iter().find(|op| (*op & 0xF) as usize >= CIGAR_OPS.len()) {
            return Err(CodecError::InvalidCigarOpcode((op & 0xF) as u8).into());
        }
        Ok(Self { ops })
    }

    /// Returns the packed operation words
    #[must_use]
    pub fn ops(&self) -> &[u32] {
        &self.ops
    }

    /// Returns the number of operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn op(&self, index: usize) -> Result<u32> {
        self.ops.get(index).copied().ok_or_else(|| {
            RecordError::CigarIndexOutOfRange {
                index,
                len: self.ops.len(),
            }
            .into()
        })
    }

    /// Returns the run length of the operation at `index`
    pub fn op_len(&self, index: usize) -> Result<u32> {
        self.op(index).map(|op| op >> 4)
    }

    /// Returns the opcode (0-8) of the operation at `index`
    pub fn op_code(&self, index: usize) -> Result<u8> {
        self.op(index).map(|op| (op & 0xF) as u8)
    }

    /// Returns the operation character of the operation at `index`
    pub fn op_char(&self, index: usize) -> Result<char> {
        self.op_code(index)
            .map(|code| char::from(CIGAR_OPS[code as usize]))
    }

    /// Writes the text form into a byte buffer
    ///
    /// An empty operation list writes `*`.
    pub fn write_text(&self, buffer: &mut Vec<u8>) {
        if self.ops.is_empty() {
            buffer.extend_from_slice(NO_CIGAR.as_bytes());
            return;
        }
        let mut itoa_buf = itoa::Buffer::new();
        for op in &self.ops {
            buffer.extend_from_slice(itoa_buf.format(op >> 4).as_bytes());
            buffer.push(CIGAR_OPS[(op & 0xF) as usize]);
        }
    }
}
impl fmt::Display for Cigar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = Vec::new();
        self.write_text(&mut buffer);
        f.write_str(&String::from_utf8_lossy(&buffer))
    }
}
