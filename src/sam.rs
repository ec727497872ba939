//! SAM text boundary
//!
//! [`SamParser`] fills an [`AlignmentRecord`] from one SAM line and
//! [`SamFormatter`] renders it back. These are the only places where
//! positions are converted between 1-based text and 0-based storage.

use std::str::FromStr;

use log::warn;
use memchr::memchr_iter;

use crate::error::{ParseError, Result};
use crate::policy::QualityPolicy;
use crate::record::{AlignmentRecord, MAX_OPT_FIELDS};
use crate::refs::References;

/// Number of mandatory SAM columns
pub const MANDATORY_COLUMNS: usize = 11;

/// Text written for an empty field
const EMPTY_FIELD: &[u8] = b"*";

fn trim_newline(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r'] = line {
        line = rest;
    }
    line
}

fn parse_int<T: FromStr>(field: &'static str, bytes: &[u8]) -> Result<T> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| {
            ParseError::InvalidInteger {
                field,
                value: String::from_utf8_lossy(bytes).into_owned(),
            }
            .into()
        })
}

/// Parses a 1-based position column into its 0-based value
fn parse_position(field: &'static str, bytes: &[u8]) -> Result<i32> {
    parse_int::<i32>(field, bytes)?
        .checked_sub(1)
        .ok_or_else(|| {
            ParseError::InvalidInteger {
                field,
                value: String::from_utf8_lossy(bytes).into_owned(),
            }
            .into()
        })
}

/// Parses SAM lines into alignment records
#[derive(Debug, Clone, Default)]
pub struct SamParser {
    policy: QualityPolicy,

    /// Number of records whose optional fields were cut at capacity
    truncated: usize,
}
impl SamParser {
    #[must_use]
    pub fn new(policy: QualityPolicy) -> Self {
        Self {
            policy,
            truncated: 0,
        }
    }

    #[must_use]
    pub fn policy(&self) -> QualityPolicy {
        self.policy
    }

    /// Returns the number of records that had optional fields dropped
    #[must_use]
    pub fn truncated(&self) -> usize {
        self.truncated
    }

    /// Parses one SAM line into `record`
    ///
    /// Header (`@`) and empty lines leave the record untouched and return `false`.
    /// A malformed line is an error and leaves the record in an unspecified state.
    pub fn parse_line(
        &mut self,
        line: &[u8],
        refs: &mut References,
        record: &mut AlignmentRecord,
    ) -> Result<bool> {
        let line = trim_newline(line);
        if line.is_empty() || line[0] == b'@' {
            return Ok(false);
        }

        // split the mandatory columns
        let mut fields: [&[u8]; MANDATORY_COLUMNS] = [&[]; MANDATORY_COLUMNS];
        let mut num_fields = 0;
        let mut start = 0;
        let mut tabs = memchr_iter(b'\t', line);
        while num_fields < MANDATORY_COLUMNS {
            if let Some(end) = tabs.next() {
                fields[num_fields] = &line[start..end];
                start = end + 1;
            } else {
                fields[num_fields] = &line[start..];
                start = line.len() + 1;
                num_fields += 1;
                break;
            }
            num_fields += 1;
        }
        if num_fields < MANDATORY_COLUMNS {
            return Err(ParseError::TooFewColumns { found: num_fields }.into());
        }

        record.clear();
        record.set_qname(std::str::from_utf8(fields[0])?);
        record.set_flag(parse_int("FLAG", fields[1])?);
        record.set_pos(parse_position("POS", fields[3])?);
        record.set_mapq(parse_int("MAPQ", fields[4])?);
        record.set_cigar(std::str::from_utf8(fields[5])?)?;
        record.set_pnext(parse_position("PNEXT", fields[7])?);
        record.set_tlen(parse_int("TLEN", fields[8])?);
        record.set_seq(fields[9]);
        record.set_qual(fields[10], self.policy)?;
        let rname = std::str::from_utf8(fields[2])?;
        let rnext = std::str::from_utf8(fields[6])?;

        // optional fields
        let mut dropped = 0;
        if start <= line.len() {
            let mut opts = line[start..].split(|c| *c == b'\t');
            for opt in opts.by_ref().take(MAX_OPT_FIELDS) {
                record.push_opt(std::str::from_utf8(opt)?)?;
            }
            dropped = opts.count();
        }

        // references are interned only once the whole line is accepted
        record.set_rname(rname, refs);
        record.set_rnext(rnext, refs)?;

        if dropped > 0 {
            self.truncated += 1;
            warn!(
                "Record {} has more than {MAX_OPT_FIELDS} optional fields: {dropped} value(s) truncated",
                record.qname()
            );
        }
        Ok(true)
    }
}

/// Renders alignment records as SAM lines using reusable buffers
#[derive(Clone, Default)]
pub struct SamFormatter {
    line: Vec<u8>,
    buffer: Vec<u8>,
    itoa: itoa::Buffer,
}
impl SamFormatter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push_field(&mut self, field: &[u8]) {
        if field.is_empty() {
            self.line.extend_from_slice(EMPTY_FIELD);
        } else {
            self.line.extend_from_slice(field);
        }
        self.line.push(b'\t');
    }

    fn push_int<I: itoa::Integer>(&mut self, value: I) {
        self.line.extend_from_slice(self.itoa.format(value).as_bytes());
        self.line.push(b'\t');
    }

    /// Formats a record as one SAM line terminated by a newline
    ///
    /// Empty text fields (including fields whose column was not loaded) are written as `*`.
    pub fn format(&mut self, record: &AlignmentRecord, refs: &References) -> Result<&[u8]> {
        self.line.clear();

        self.push_field(record.qname().as_bytes());
        self.push_int(record.flag());
        self.push_field(record.rname(refs)?.as_bytes());
        self.push_int(i64::from(record.pos()) + 1);
        self.push_int(record.mapq());

        // cigar
        {
            self.buffer.clear();
            if let Some(cigar) = record.cigar() {
                cigar.write_text(&mut self.buffer);
            }
            let buffer = std::mem::take(&mut self.buffer);
            self.push_field(&buffer);
            self.buffer = buffer;
        }

        self.push_field(record.rnext(refs)?.as_bytes());
        self.push_int(i64::from(record.pnext()) + 1);
        self.push_int(record.tlen());

        // sequence and quality
        {
            let mut buffer = std::mem::take(&mut self.buffer);
            record.decode_seq(&mut buffer)?;
            self.push_field(&buffer);
            record.decode_qual(&mut buffer)?;
            self.push_field(&buffer);
            self.buffer = buffer;
        }

        for opt in record.opts() {
            self.line.extend_from_slice(opt.as_bytes());
            self.line.push(b'\t');
        }

        // replace the trailing tab
        self.line.pop();
        self.line.push(b'\n');
        Ok(&self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    const LINE: &str =
        "read1\t99\tchr1\t200\t60\t2M1I3M\t=\t350\t156\tACGTAC\tIIII#I\tNM:i:1\tRG:Z:grp1\n";

    fn parse(line: &str, policy: QualityPolicy) -> Result<(AlignmentRecord, References)> {
        let mut refs = References::new();
        let mut record = AlignmentRecord::new();
        let mut parser = SamParser::new(policy);
        assert!(parser.parse_line(line.as_bytes(), &mut refs, &mut record)?);
        Ok((record, refs))
    }

    // ==================== Parser Tests ====================

    #[test]
    fn test_parse_line() {
        let (record, refs) = parse(LINE, QualityPolicy::Phred33).unwrap();
        assert_eq!(record.qname(), "read1");
        assert_eq!(record.flag(), 99);
        assert_eq!(record.rname(&refs).unwrap(), "chr1");
        assert_eq!(record.pos(), 199);
        assert_eq!(record.mapq(), 60);
        assert_eq!(record.cigar_string(), "2M1I3M");
        assert_eq!(record.rnext(&refs).unwrap(), "=");
        assert_eq!(record.pnext(), 349);
        assert_eq!(record.tlen(), 156);
        assert_eq!(record.seq_string().unwrap(), "ACGTAC");
        assert_eq!(record.qual_string().unwrap(), "IIII#I");
        assert_eq!(record.opts(), ["NM:i:1", "RG:Z:grp1"]);
    }

    #[test]
    fn test_header_and_empty_lines_are_skipped() {
        let mut refs = References::new();
        let mut record = AlignmentRecord::new();
        let mut parser = SamParser::default();
        assert!(!parser
            .parse_line(b"@SQ\tSN:chr1\tLN:1000\n", &mut refs, &mut record)
            .unwrap());
        assert!(!parser.parse_line(b"\r\n", &mut refs, &mut record).unwrap());
        assert!(refs.rname.is_empty());
    }

    #[test]
    fn test_crlf_is_stripped() {
        let line = "r\t0\tchr1\t1\t0\t4M\t*\t0\t0\tACGT\tIIII\r\n";
        let (record, _) = parse(line, QualityPolicy::Phred33).unwrap();
        assert_eq!(record.qual_string().unwrap(), "IIII");
        assert_eq!(record.n_opts(), 0);
    }

    #[test]
    fn test_too_few_columns() {
        let result = parse("r\t0\tchr1\t1\t0\t4M\t*\t0\t0\tACGT", QualityPolicy::Phred33);
        assert!(matches!(
            result,
            Err(Error::ParseError(ParseError::TooFewColumns { found: 10 }))
        ));
    }

    #[test]
    fn test_invalid_integer() {
        let result = parse(
            "r\t0\tchr1\tx1\t0\t4M\t*\t0\t0\tACGT\tIIII",
            QualityPolicy::Phred33,
        );
        assert!(matches!(
            result,
            Err(Error::ParseError(ParseError::InvalidInteger { field: "POS", .. }))
        ));
    }

    #[test]
    fn test_unknown_cigar_rejects_record() {
        let result = parse(
            "r\t0\tchr1\t1\t0\t2M2Q\t*\t0\t0\tACGT\tIIII",
            QualityPolicy::Phred33,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_optional_fields_truncated_at_capacity() {
        let mut line = String::from("r\t0\tchr1\t1\t0\t4M\t*\t0\t0\tACGT\tIIII");
        for i in 0..MAX_OPT_FIELDS + 2 {
            line.push_str(&format!("\tX{i}:i:{i}"));
        }
        let mut refs = References::new();
        let mut record = AlignmentRecord::new();
        let mut parser = SamParser::default();
        parser
            .parse_line(line.as_bytes(), &mut refs, &mut record)
            .unwrap();
        assert_eq!(record.n_opts(), MAX_OPT_FIELDS);
        assert_eq!(parser.truncated(), 1);
    }

    #[test]
    fn test_rejected_line_leaves_references_untouched() {
        let mut refs = References::new();
        let mut record = AlignmentRecord::new();
        let mut parser = SamParser::default();
        assert!(parser
            .parse_line(
                b"r1\t0\tchr1\t1\t0\t4M\t*\t0\t0\tACGT\tIIII",
                &mut refs,
                &mut record
            )
            .unwrap());

        let rejected = [
            "r2\t0\tchrX\t1\t0\t2Q\t*\t0\t0\tACGT\tIIII",
            "r2\t0\tchrX\t1\t0\t4M\tchrY\t0\t0\tACGT\tIII",
            "r2\t0\tchrX\t1\t0\t4M\tchrY\tx\t0\tACGT\tIIII",
        ];
        for line in rejected {
            assert!(parser
                .parse_line(line.as_bytes(), &mut refs, &mut record)
                .is_err());
        }
        assert_eq!(refs.rname.id_of("chrX"), None);
        assert_eq!(refs.rnext.id_of("chrY"), None);
        assert_eq!(refs.rname.len(), 1);

        // `=` still resolves to the last accepted reference
        assert!(parser
            .parse_line(
                b"r3\t0\t=\t5\t0\t4M\t*\t0\t0\tACGT\tIIII",
                &mut refs,
                &mut record
            )
            .unwrap());
        assert_eq!(record.rname(&refs).unwrap(), "chr1");
    }

    #[test]
    fn test_minimum_position_is_rejected() {
        for line in [
            "r\t0\tchr1\t-2147483648\t0\t4M\t*\t0\t0\tACGT\tIIII",
            "r\t0\tchr1\t1\t0\t4M\t*\t-2147483648\t0\tACGT\tIIII",
        ] {
            let result = parse(line, QualityPolicy::Phred33);
            assert!(matches!(
                result,
                Err(Error::ParseError(ParseError::InvalidInteger { .. }))
            ));
        }
        let (record, _) = parse(
            "r\t0\tchr1\t-2147483647\t0\t4M\t*\t0\t0\tACGT\tIIII",
            QualityPolicy::Phred33,
        )
        .unwrap();
        assert_eq!(record.pos(), i32::MIN);
    }

    // ==================== Formatter Tests ====================

    #[test]
    fn test_format_roundtrip() {
        let (record, refs) = parse(LINE, QualityPolicy::Phred33).unwrap();
        let mut formatter = SamFormatter::new();
        assert_eq!(formatter.format(&record, &refs).unwrap(), LINE.as_bytes());
    }

    #[test]
    fn test_format_unmapped_and_binned() {
        let line = "r2\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t\"5?I\n";
        let (record, refs) = parse(line, QualityPolicy::Binned).unwrap();
        let mut formatter = SamFormatter::new();
        let formatted = formatter.format(&record, &refs).unwrap();
        assert_eq!(formatted, b"r2\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t\"7BI\n");
    }

    #[test]
    fn test_format_dropped_quality() {
        let (record, refs) = parse(LINE, QualityPolicy::Dropped).unwrap();
        let mut formatter = SamFormatter::new();
        let formatted = String::from_utf8(formatter.format(&record, &refs).unwrap().to_vec())
            .unwrap();
        let columns: Vec<&str> = formatted.trim_end().split('\t').collect();
        assert_eq!(columns[9], "ACGTAC");
        assert_eq!(columns[10], "*");
    }
}
