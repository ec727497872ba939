//! Region queries over a position-sorted row store
//!
//! A query resolves its reference name, asks the [`PositionIndex`] for an
//! approximate starting row, and scans forward. Scanning only decodes the
//! [`LOCATION`](Projection::LOCATION) columns until a row is known to overlap
//! the region.

use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::error::{Error, QueryError, Result};
use crate::position::{FloorPolicy, PositionIndex};
use crate::record::AlignmentRecord;
use crate::refs::References;
use crate::store::{Projection, RowStore};

/// A reference interval with 0-based inclusive bounds
///
/// Parsed from and displayed as `name:start-end` with 1-based inclusive bounds.
///
/// # Example
///
/// ```
/// use binram::Region;
///
/// let region: Region = "chr1:150-250".parse().unwrap();
/// assert_eq!(region.name(), "chr1");
/// assert_eq!((region.start(), region.end()), (149, 249));
/// assert_eq!(region.to_string(), "chr1:150-250");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    name: String,
    start: i32,
    end: i32,
}
impl Region {
    /// Creates a region from 0-based inclusive bounds
    pub fn new(name: &str, start: i32, end: i32) -> Result<Self> {
        if name.is_empty() {
            return Err(QueryError::EmptyName(name.to_string()).into());
        }
        if start < 0 {
            return Err(QueryError::InvalidBound(start.to_string()).into());
        }
        if start > end {
            return Err(QueryError::InvalidRange {
                start: i64::from(start),
                end: i64::from(end),
            }
            .into());
        }
        Ok(Self {
            name: name.to_string(),
            start,
            end,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the 0-based first position
    #[must_use]
    pub fn start(&self) -> i32 {
        self.start
    }

    /// Returns the 0-based last position
    #[must_use]
    pub fn end(&self) -> i32 {
        self.end
    }
}

/// Parses a 1-based bound
fn parse_bound(text: &str) -> Result<i32> {
    match text.trim().parse::<i32>() {
        Ok(bound) if bound >= 1 => Ok(bound),
        _ => Err(QueryError::InvalidBound(text.to_string()).into()),
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let (name, range) = text
            .rsplit_once(':')
            .ok_or_else(|| QueryError::MissingColon(text.to_string()))?;
        if name.is_empty() {
            return Err(QueryError::EmptyName(text.to_string()).into());
        }
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| QueryError::MissingDash(text.to_string()))?;
        let start = parse_bound(start)?;
        let end = parse_bound(end)?;
        if start > end {
            return Err(QueryError::InvalidRange {
                start: i64::from(start),
                end: i64::from(end),
            }
            .into());
        }
        Ok(Self {
            name: name.to_string(),
            start: start - 1,
            end: end - 1,
        })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}",
            self.name,
            i64::from(self.start) + 1,
            i64::from(self.end) + 1
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartRow {
    /// Row of the index entry preceding the floor key (or the floor key itself)
    Indexed(u64),

    /// No usable index entry; scan the store from its first row
    ScanFromTop,
}

/// A region resolved against the reference table and position index
///
/// Resolution happens once; [`run`](Self::run) can then be executed against
/// any store holding the same rows.
#[derive(Debug, Clone)]
pub struct RegionQuery {
    region: Region,
    refid: i32,
    start_row: StartRow,
}
impl RegionQuery {
    /// Parses and resolves `name:start-end` under the default floor policy
    pub fn new(text: &str, refs: &References, index: &PositionIndex) -> Result<Self> {
        Self::with_policy(text.parse()?, refs, index, FloorPolicy::default())
    }

    /// Resolves a region under an explicit floor policy
    ///
    /// An unknown reference name is an error for this query only
    /// (see [`Error::is_unknown_reference`]).
    pub fn with_policy(
        region: Region,
        refs: &References,
        index: &PositionIndex,
        policy: FloorPolicy,
    ) -> Result<Self> {
        let refid = refs
            .rname
            .id_of(region.name())
            .filter(|id| *id >= 0)
            .ok_or_else(|| QueryError::UnknownReference(region.name().to_string()))?;

        let start_row = if index.is_empty() {
            debug!("No position index; {region} scans from the first row");
            StartRow::ScanFromTop
        } else {
            let floor = index.floor(refid, region.start(), policy).map(|row| {
                // widen by one sampling interval for reads starting before the floor key
                index
                    .preceding_row(refid, region.start(), policy)
                    .map_or(row, |prev| prev.min(row))
            });
            match floor.or_else(|| index.first_row_of(refid)) {
                Some(row) => StartRow::Indexed(row.max(0) as u64),
                None => {
                    debug!(
                        "Reference {} has no indexed rows; {region} scans from the first row",
                        region.name()
                    );
                    StartRow::ScanFromTop
                }
            }
        };

        Ok(Self {
            region,
            refid,
            start_row,
        })
    }

    #[must_use]
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Returns the resolved reference id
    #[must_use]
    pub fn refid(&self) -> i32 {
        self.refid
    }

    /// Steps back over preceding rows whose footprint still reaches the region
    ///
    /// The start row already lies one sampling interval before the floor key.
    /// From there the walk stops at the first row ending before the region, so
    /// a read starting further back is only found through a chain of
    /// overlapping rows.
    fn rewind<S: RowStore + ?Sized>(
        &self,
        store: &mut S,
        mut row: u64,
        scratch: &mut AlignmentRecord,
    ) -> Result<u64> {
        let start = i64::from(self.region.start);
        while row > 0 {
            store.get(row - 1, Projection::LOCATION, scratch)?;
            if scratch.refid() != self.refid || scratch.end() <= start {
                break;
            }
            row -= 1;
        }
        Ok(row)
    }

    /// Scans the store and passes every overlapping record to `emit`
    ///
    /// Rows must be clustered by reference and sorted by position within a
    /// reference. Emitted records carry every field. Returns the number of
    /// emitted records.
    pub fn run<S, F>(&self, store: &mut S, mut emit: F) -> Result<usize>
    where
        S: RowStore + ?Sized,
        F: FnMut(&AlignmentRecord) -> Result<()>,
    {
        let total = store.entry_count();
        let start = i64::from(self.region.start);

        let mut scratch = AlignmentRecord::new();
        let mut record = AlignmentRecord::new();
        let mut row = match self.start_row {
            StartRow::Indexed(row) => self.rewind(store, row.min(total), &mut scratch)?,
            StartRow::ScanFromTop => 0,
        };

        let mut on_reference = false;
        let mut emitted = 0;
        while row < total {
            store.get(row, Projection::LOCATION, &mut scratch)?;
            if scratch.refid() != self.refid {
                if on_reference {
                    break;
                }
                row += 1;
                continue;
            }
            on_reference = true;
            if scratch.pos() > self.region.end {
                break;
            }
            if scratch.end() > start {
                store.get(row, Projection::ALL, &mut record)?;
                emit(&record)?;
                emitted += 1;
            }
            row += 1;
        }
        Ok(emitted)
    }

    /// Collects every overlapping record
    pub fn collect<S: RowStore + ?Sized>(&self, store: &mut S) -> Result<Vec<AlignmentRecord>> {
        let mut records = Vec::new();
        self.run(store, |record| {
            records.push(record.clone());
            Ok(())
        })?;
        Ok(records)
    }
}
