//! Reference name interning
//!
//! Reference names are mapped to dense, 0-based ids in first-seen order.
//! `*` is the unmapped reference (id -1) and `=` refers back to the last
//! resolved reference.

use std::collections::HashMap;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::warn;

use crate::error::{ReadError, ReferenceError, Result};

/// Reference id of unmapped records
pub const UNMAPPED_ID: i32 = -1;

/// Text form of the unmapped reference
pub const UNMAPPED_NAME: &str = "*";

/// Text form of "same reference as before"
pub const SAME_AS_PREVIOUS: &str = "=";

/// An append-only table of interned reference names
#[derive(Debug, Clone)]
pub struct ReferenceTable {
    names: Vec<String>,
    name_to_id: HashMap<String, i32>,

    /// Id and name most recently resolved by [`intern`](Self::intern)
    last_id: i32,
    last_name: Option<String>,

    /// Flags names that reappear after another name was interned
    sort_check: bool,
    sort_violations: usize,
}
impl Default for ReferenceTable {
    fn default() -> Self {
        Self::new()
    }
}
impl ReferenceTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            name_to_id: HashMap::new(),
            last_id: UNMAPPED_ID,
            last_name: None,
            sort_check: false,
            sort_violations: 0,
        }
    }

    /// Creates a table that reports names reappearing out of order
    ///
    /// Records clustered by reference only ever re-intern the name of the
    /// current run. Any other known name signals unsorted input: it is logged,
    /// counted, and resolved to its existing id.
    #[must_use]
    pub fn with_sort_check() -> Self {
        Self {
            sort_check: true,
            ..Self::new()
        }
    }

    /// Interns a name and returns its id
    ///
    /// * Names starting with `*` resolve to -1 and are never stored.
    /// * `=` resolves to the last resolved id (-1 if nothing was resolved yet).
    /// * Known names resolve to their existing id.
    /// * Unknown names are appended at the next free id.
    pub fn intern(&mut self, name: &str) -> i32 {
        if name.starts_with(UNMAPPED_NAME) {
            return UNMAPPED_ID;
        }
        if name == SAME_AS_PREVIOUS {
            return self.last_id;
        }
        if self.last_name.as_deref() == Some(name) {
            return self.last_id;
        }

        let id = if let Some(&id) = self.name_to_id.get(name) {
            if self.sort_check {
                self.sort_violations += 1;
                warn!(
                    "Reference {name} already existing (id {id}): input is not sorted by reference"
                );
            }
            id
        } else {
            let id = self.names.len() as i32;
            self.names.push(name.to_string());
            self.name_to_id.insert(name.to_string(), id);
            id
        };

        self.last_id = id;
        self.last_name = Some(name.to_string());
        id
    }

    /// Returns the id of an already interned name without modifying the table
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.name_to_id.get(name).copied()
    }

    /// Returns the name of an id
    ///
    /// -1 maps to `*`; ids outside the table are an error.
    pub fn name_of(&self, id: i32) -> Result<&str> {
        if id == UNMAPPED_ID {
            return Ok(UNMAPPED_NAME);
        }
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.names.get(idx))
            .map(String::as_str)
            .ok_or_else(|| {
                ReferenceError::IdOutOfRange {
                    id,
                    size: self.names.len(),
                }
                .into()
            })
    }

    /// Returns the name of an id in "next reference" position
    ///
    /// Yields `=` when `id` equals `previous`, the id resolved just before,
    /// and the stored name otherwise.
    pub fn next_name_of(&self, id: i32, previous: i32) -> Result<&str> {
        if id != UNMAPPED_ID && id == previous {
            // still validate the id
            self.name_of(id)?;
            return Ok(SAME_AS_PREVIOUS);
        }
        self.name_of(id)
    }

    /// Returns the number of interned names
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the number of out-of-order re-insertions seen under sort checking
    #[must_use]
    pub fn sort_violations(&self) -> usize {
        self.sort_violations
    }

    /// Iterates over `(id, name)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(id, name)| (id as i32, name.as_str()))
    }

    /// Writes the names in id order
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.names.len() as u32)?;
        for name in &self.names {
            writer.write_u32::<LittleEndian>(name.len() as u32)?;
            writer.write_all(name.as_bytes())?;
        }
        Ok(())
    }

    /// Reads a table written by [`write_to`](Self::write_to)
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut table = Self::new();
        let num_names = reader.read_u32::<LittleEndian>()?;
        let mut buffer = Vec::new();
        for id in 0..num_names {
            let len = u64::from(reader.read_u32::<LittleEndian>()?);

            // grows with the bytes actually present
            buffer.clear();
            let actual = reader.by_ref().take(len).read_to_end(&mut buffer)? as u64;
            if actual != len {
                return Err(ReadError::TruncatedEntry {
                    expected: len,
                    actual,
                }
                .into());
            }
            let name = std::str::from_utf8(&buffer)?.to_string();
            table.name_to_id.insert(name.clone(), id as i32);
            table.names.push(name);
        }
        Ok(table)
    }
}

/// The reference tables of a dataset
///
/// RNAME and RNEXT are interned independently. This is the context passed
/// to every call that converts between reference names and ids.
#[derive(Debug, Clone, Default)]
pub struct References {
    pub rname: ReferenceTable,
    pub rnext: ReferenceTable,
}
impl References {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rname: ReferenceTable::new(),
            rnext: ReferenceTable::new(),
        }
    }

    /// Creates the tables with sort checking on the RNAME table
    #[must_use]
    pub fn with_sort_check() -> Self {
        Self {
            rname: ReferenceTable::with_sort_check(),
            rnext: ReferenceTable::new(),
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.rname.write_to(writer)?;
        self.rnext.write_to(writer)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let rname = ReferenceTable::read_from(reader)?;
        let rnext = ReferenceTable::read_from(reader)?;
        Ok(Self { rname, rnext })
    }
}
