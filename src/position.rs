//! Position index over `(refid, pos)` keys
//!
//! The index maps sampled record coordinates to their row ordinal and answers
//! floor queries: the row of the greatest indexed key less than or equal to
//! a requested coordinate. It only provides a starting row; callers still
//! scan the row store from there.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};

use crate::error::Result;

/// How a floor lookup treats a floor key on a different reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FloorPolicy {
    /// Only accept floor keys on the requested reference (default policy)
    #[default]
    SameReference,

    /// Accept the floor key whatever its reference
    ///
    /// A position before the first indexed entry of a reference then resolves
    /// to the trailing entry of the preceding reference.
    AnyReference,
}

/// An ordered map from `(refid, pos)` to row ordinal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionIndex {
    entries: BTreeMap<(i32, i32), i64>,
}
impl PositionIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the row of a coordinate
    pub fn add(&mut self, refid: i32, pos: i32, row: i64) {
        self.entries.insert((refid, pos), row);
    }

    /// Floor lookup under the [`SameReference`](FloorPolicy::SameReference) policy
    ///
    /// Returns `None` when no indexed key on `refid` is at or before `pos`.
    #[must_use]
    pub fn get_row(&self, refid: i32, pos: i32) -> Option<i64> {
        self.floor(refid, pos, FloorPolicy::SameReference)
    }

    /// Floor lookup under an explicit cross-reference policy
    ///
    /// Returns `None` when `(refid, pos)` is smaller than every stored key.
    #[must_use]
    pub fn floor(&self, refid: i32, pos: i32, policy: FloorPolicy) -> Option<i64> {
        let (&(floor_refid, _), &row) = self.entries.range(..=(refid, pos)).next_back()?;
        match policy {
            FloorPolicy::SameReference if floor_refid != refid => None,
            _ => Some(row),
        }
    }

    /// Returns the row of the entry just before the floor key of `(refid, pos)`
    ///
    /// The rows between the two entries span one sampling interval. Under
    /// [`SameReference`](FloorPolicy::SameReference) both keys must be on `refid`.
    #[must_use]
    pub fn preceding_row(&self, refid: i32, pos: i32, policy: FloorPolicy) -> Option<i64> {
        let mut keys = self.entries.range(..=(refid, pos)).rev();
        let (&(floor_refid, _), _) = keys.next()?;
        let (&(prev_refid, _), &row) = keys.next()?;
        match policy {
            FloorPolicy::SameReference if floor_refid != refid || prev_refid != refid => None,
            _ => Some(row),
        }
    }

    /// Returns the row of the first indexed entry of a reference
    #[must_use]
    pub fn first_row_of(&self, refid: i32) -> Option<i64> {
        self.entries
            .range((refid, i32::MIN)..=(refid, i32::MAX))
            .next()
            .map(|(_, &row)| row)
    }

    /// Returns the number of indexed entries of a reference
    #[must_use]
    pub fn entries_of(&self, refid: i32) -> usize {
        self.entries
            .range((refid, i32::MIN)..=(refid, i32::MAX))
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `((refid, pos), row)` in key order
    pub fn iter(&self) -> impl Iterator<Item = ((i32, i32), i64)> + '_ {
        self.entries.iter().map(|(key, row)| (*key, *row))
    }

    /// Writes the entries in key order
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(self.entries.len() as u64)?;
        for (&(refid, pos), &row) in &self.entries {
            writer.write_i32::<LittleEndian>(refid)?;
            writer.write_i32::<LittleEndian>(pos)?;
            writer.write_i64::<LittleEndian>(row)?;
        }
        Ok(())
    }

    /// Reads an index written by [`write_to`](Self::write_to)
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut index = Self::new();
        let num_entries = reader.read_u64::<LittleEndian>()?;
        for _ in 0..num_entries {
            let refid = reader.read_i32::<LittleEndian>()?;
            let pos = reader.read_i32::<LittleEndian>()?;
            let row = reader.read_i64::<LittleEndian>()?;
            index.add(refid, pos, row);
        }
        Ok(index)
    }
}

/// Builds a sparse [`PositionIndex`] while records are appended
///
/// Every `interval`-th row is indexed, as is the first row of every reference
/// run. Unmapped rows are never indexed. An interval of 0 builds no index.
#[derive(Debug, Clone)]
pub struct PositionIndexer {
    index: PositionIndex,
    interval: u64,
    last_refid: Option<i32>,
    last_pos: i32,

    /// Number of rows placed before their predecessor on the same reference
    unsorted: usize,
}
impl PositionIndexer {
    #[must_use]
    pub fn new(interval: u64) -> Self {
        Self {
            index: PositionIndex::new(),
            interval,
            last_refid: None,
            last_pos: i32::MIN,
            unsorted: 0,
        }
    }

    /// Records the coordinate of a newly appended row
    pub fn observe(&mut self, refid: i32, pos: i32, row: u64) {
        if self.interval == 0 || refid < 0 {
            return;
        }

        let new_run = self.last_refid != Some(refid);
        if !new_run && pos < self.last_pos {
            if self.unsorted == 0 {
                warn!(
                    "Row {row} (refid {refid}, pos {pos}) precedes row {} (pos {}): input is not sorted by position",
                    row.saturating_sub(1),
                    self.last_pos
                );
            }
            self.unsorted += 1;
        }

        if new_run || row % self.interval == 0 {
            self.index.add(refid, pos, row as i64);
        }
        self.last_refid = Some(refid);
        self.last_pos = pos;
    }

    /// Returns the number of out-of-order rows observed
    #[must_use]
    pub fn unsorted(&self) -> usize {
        self.unsorted
    }

    #[must_use]
    pub fn index(&self) -> &PositionIndex {
        &self.index
    }

    /// Consumes the indexer and returns the built index
    #[must_use]
    pub fn finish(self) -> PositionIndex {
        debug!(
            "Built position index with {} entries ({} unsorted rows)",
            self.index.len(),
            self.unsorted
        );
        self.index
    }
}
