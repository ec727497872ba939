use std::{fs, path::Path, sync::Arc, thread};

use log::warn;
use memmap2::Mmap;
use zstd::zstd_safe;

use crate::core::{
    BlockHeader, BlockRange, ColumnarBlock, FileHeader, IndexFooter, IndexHeader, SideTables,
};
use crate::error::{Error, IndexError, ReadError, Result};
use crate::parallel::RegionProcessor;
use crate::position::{FloorPolicy, PositionIndex};
use crate::record::AlignmentRecord;
use crate::refs::References;
use crate::region::{Region, RegionQuery};
use crate::store::{Projection, RowStore};

/// Locates and decodes the side tables at the end of a file
fn load_side_tables(bytes: &[u8]) -> Result<SideTables> {
    let min_len = size_of::<FileHeader>() + size_of::<IndexHeader>() + size_of::<IndexFooter>();
    if bytes.len() < min_len {
        return Err(IndexError::MissingTrailer(bytes.len()).into());
    }

    // Load the index footer
    let footer_start = bytes.len() - size_of::<IndexFooter>();
    let footer = IndexFooter::from_bytes(&bytes[footer_start..])?;

    // Find the coordinates of the compressed tables
    let z_start = footer_start
        .checked_sub(footer.bytes as usize)
        .filter(|start| *start >= size_of::<FileHeader>() + size_of::<IndexHeader>())
        .ok_or(IndexError::MissingTrailer(bytes.len()))?;
    let iheader = IndexHeader::from_bytes(&bytes[z_start - size_of::<IndexHeader>()..z_start])?;
    if iheader.z_bytes != footer.bytes {
        return Err(IndexError::ByteSizeMismatch(iheader.z_bytes, footer.bytes).into());
    }

    SideTables::decoded(&bytes[z_start..footer_start], iheader.u_bytes)
}

/// A memory-mapped reader for alignment files.
///
/// Rows are decoded one block at a time, and only the columns covering the
/// requested [`Projection`] are decompressed. The last decoded block is
/// cached and reused for any projection it covers.
///
/// Clones share the mapped file and side tables but own their block and
/// decompression context, so each thread works on its own clone.
pub struct MmapReader {
    inner: Arc<Mmap>,
    header: FileHeader,

    /// Block index, reference tables and position index
    tables: Arc<SideTables>,

    /// Reusable record block
    block: ColumnarBlock,

    /// Index of the block currently decoded
    block_idx: Option<usize>,

    /// Reusable decompression context
    dctx: zstd_safe::DCtx<'static>,

    floor_policy: FloorPolicy,
}
impl Clone for MmapReader {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            header: self.header,
            tables: self.tables.clone(),
            block: self.block.clone(),
            block_idx: self.block_idx,
            dctx: zstd_safe::DCtx::create(),
            floor_policy: self.floor_policy,
        }
    }
}
impl MmapReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = fs::File::open(path)?;

        // Load the mmap
        let inner = unsafe { Mmap::map(&file) }?;
        if inner.len() < size_of::<FileHeader>() {
            return Err(ReadError::FileTruncation(inner.len()).into());
        }

        // Build the header
        let header = FileHeader::from_bytes(&inner[..size_of::<FileHeader>()])?;
        let tables = load_side_tables(&inner)?;

        Ok(Self {
            inner: Arc::new(inner),
            header,
            tables: Arc::new(tables),
            block: ColumnarBlock::new(header),
            block_idx: None,
            dctx: zstd_safe::DCtx::create(),
            floor_policy: FloorPolicy::default(),
        })
    }

    #[must_use]
    pub fn header(&self) -> FileHeader {
        self.header
    }

    #[must_use]
    pub fn num_records(&self) -> u64 {
        self.tables.index.num_records()
    }

    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.tables.index.num_blocks()
    }

    #[must_use]
    pub fn references(&self) -> &References {
        &self.tables.refs
    }

    #[must_use]
    pub fn position_index(&self) -> &PositionIndex {
        &self.tables.positions
    }

    /// Sets how region queries treat floor keys on another reference
    pub fn set_floor_policy(&mut self, policy: FloorPolicy) {
        self.floor_policy = policy;
    }

    /// Decodes a block unless the cached one already covers the projection
    fn load_block(
        &mut self,
        block_idx: usize,
        range: BlockRange,
        mut projection: Projection,
    ) -> Result<()> {
        if self.block_idx == Some(block_idx) {
            if self.block.loaded().contains(projection) {
                return Ok(());
            }
            projection = projection.union(self.block.loaded());
        }

        let header_start = range.offset() as usize;
        let bytes = self
            .inner
            .get(header_start..)
            .ok_or(ReadError::FileTruncation(self.inner.len()))?;
        let block_header = BlockHeader::from_bytes(bytes, header_start)?;

        self.block_idx = None;
        self.block.decompress_from_bytes(
            &bytes[size_of::<BlockHeader>()..],
            block_header,
            projection,
            &mut self.dctx,
        )?;
        self.block_idx = Some(block_idx);
        Ok(())
    }

    /// Populates `record` with the projected fields of a row
    pub fn get(
        &mut self,
        row: u64,
        projection: Projection,
        record: &mut AlignmentRecord,
    ) -> Result<()> {
        let (block_idx, range, first_row) =
            self.tables.index.locate(row).ok_or(ReadError::OutOfRange {
                requested_index: row,
                max_index: self.num_records(),
            })?;
        self.load_block(block_idx, range, projection)?;
        self.block
            .fill_record((row - first_row) as usize, projection, record)
    }

    /// Returns every record overlapping a `name:start-end` region
    pub fn query(&mut self, region: &str) -> Result<Vec<AlignmentRecord>> {
        let mut records = Vec::new();
        self.query_with(region, |record| {
            records.push(record.clone());
            Ok(())
        })?;
        Ok(records)
    }

    /// Passes every record overlapping a `name:start-end` region to `emit`
    ///
    /// Returns the number of emitted records.
    pub fn query_with<F>(&mut self, region: &str, emit: F) -> Result<usize>
    where
        F: FnMut(&AlignmentRecord) -> Result<()>,
    {
        let tables = Arc::clone(&self.tables);
        let query = RegionQuery::with_policy(
            region.parse()?,
            &tables.refs,
            &tables.positions,
            self.floor_policy,
        )?;
        query.run(self, emit)
    }

    /// Processes a list of regions across threads
    ///
    /// Regions are split into contiguous chunks, one per thread (0 = all
    /// CPUs). Regions naming an unknown reference are skipped with a warning;
    /// any other error stops the thread and is returned.
    pub fn process_regions_parallel<P: RegionProcessor + 'static>(
        &self,
        regions: &[String],
        processor: P,
        num_threads: usize,
    ) -> Result<()> {
        let num_threads = if num_threads == 0 {
            num_cpus::get()
        } else {
            num_threads.min(num_cpus::get())
        };
        if regions.is_empty() {
            return Ok(()); // nothing to do
        }
        let regions_per_thread = regions.len().div_ceil(num_threads);

        let mut handles = Vec::new();
        for chunk in regions.chunks(regions_per_thread) {
            let mut t_reader = self.clone();
            let mut t_proc = processor.clone();
            let t_regions = chunk.to_vec();

            let thread_handle = thread::spawn(move || -> Result<()> {
                let tables = Arc::clone(&t_reader.tables);
                for text in &t_regions {
                    let region: Region = text.parse()?;
                    let query = match RegionQuery::with_policy(
                        region,
                        &tables.refs,
                        &tables.positions,
                        t_reader.floor_policy,
                    ) {
                        Ok(query) => query,
                        Err(e) if e.is_unknown_reference() => {
                            warn!("Skipping region {text}: {e}");
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    query.run(&mut t_reader, |record| {
                        t_proc.process_record(record, &tables.refs)
                    })?;
                    t_proc.on_region_complete(query.region())?;
                }
                Ok(())
            });
            handles.push(thread_handle);
        }

        for handle in handles {
            handle.join().map_err(|_| Error::ThreadPanic)??;
        }
        Ok(())
    }
}
impl RowStore for MmapReader {
    fn entry_count(&self) -> u64 {
        self.num_records()
    }

    fn get(
        &mut self,
        row: u64,
        projection: Projection,
        record: &mut AlignmentRecord,
    ) -> Result<()> {
        MmapReader::get(self, row, projection, record)
    }
}
