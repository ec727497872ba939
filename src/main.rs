use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use binram::{
    AlignmentRecord, FileHeaderBuilder, FloorPolicy, MmapReader, Projection, QualityPolicy,
    RamWriter, References, RegionProcessor, SamFormatter, SamParser, DEFAULT_BLOCK_SIZE,
    DEFAULT_COMPRESSION_LEVEL, DEFAULT_INDEX_INTERVAL,
};
use clap::{ArgAction, Parser, Subcommand};
use log::{info, warn};
use parking_lot::Mutex;
use seq_io::fastq::{self, Record};

/// Columnar storage and region queries for sequence alignments.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
struct Cli {
    /// Verbosity level (-v = info, -vv = debug)
    #[clap(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode SAM (or FASTQ) text into a binram file
    Encode {
        /// Input path (plain or compressed), `-` for stdin
        input: String,

        /// Output path
        #[clap(short = 'o', long)]
        output: String,

        /// Read FASTQ records as unaligned reads
        #[clap(long, action)]
        fastq: bool,

        /// Quality policy: phred33, binned or drop
        #[clap(short = 'q', long, default_value_t = QualityPolicy::Phred33)]
        quality: QualityPolicy,

        /// zstd compression level (0 = zstd default)
        #[clap(short = 'l', long, default_value_t = DEFAULT_COMPRESSION_LEVEL)]
        level: u64,

        /// Maximum block size in bytes
        #[clap(short = 'b', long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: u64,

        /// Index every Nth record (0 disables the position index)
        #[clap(short = 'i', long, default_value_t = DEFAULT_INDEX_INTERVAL)]
        index_interval: u64,

        /// Warn when a reference name reappears after a different reference
        #[clap(long, action)]
        strict_sort: bool,
    },

    /// Print records as SAM, either all of them or those overlapping regions
    View {
        /// Input binram file
        input: String,

        /// Regions as name:start-end (1-based, inclusive)
        regions: Vec<String>,

        /// Number of threads for region queries (0 = all CPUs)
        #[clap(short = 't', long, default_value_t = 1)]
        threads: usize,

        /// Accept position index floor keys from a preceding reference
        #[clap(long, action)]
        any_reference_floor: bool,
    },

    /// List the reference names and position index of a binram file
    Refs {
        /// Input binram file
        input: String,
    },
}

/// Opens a plain or compressed input, `-` being stdin
fn open_input(path: &str) -> Result<Box<dyn BufRead>> {
    let handle: Box<dyn io::Read> = if path == "-" {
        Box::new(io::stdin())
    } else {
        Box::new(fs::File::open(path).with_context(|| format!("Failed to open {path}"))?)
    };
    let (reader, _format) = niffler::get_reader(handle)?;
    Ok(Box::new(BufReader::new(reader)))
}

fn encode_sam<W: Write>(
    mut input: Box<dyn BufRead>,
    policy: QualityPolicy,
    refs: &mut References,
    writer: &mut RamWriter<W>,
) -> Result<()> {
    let mut parser = SamParser::new(policy);
    let mut record = AlignmentRecord::new();
    let mut line = Vec::new();
    let mut line_number = 0;
    let mut skipped = 0;
    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        line_number += 1;
        match parser.parse_line(&line, refs, &mut record) {
            Ok(true) => {
                writer
                    .push(&record)
                    .with_context(|| format!("Failed to store line {line_number}"))?;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Skipping line {line_number}: {e}");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {skipped} malformed lines");
    }
    if parser.truncated() > 0 {
        warn!(
            "{} records had optional fields truncated",
            parser.truncated()
        );
    }
    Ok(())
}

fn encode_fastq<W: Write>(
    input: Box<dyn BufRead>,
    policy: QualityPolicy,
    writer: &mut RamWriter<W>,
) -> Result<()> {
    let mut reader = fastq::Reader::new(input);
    let mut record = AlignmentRecord::new();
    while let Some(result) = reader.next() {
        let fq = result?;
        record.set_unaligned(fq.id()?, fq.seq(), Some(fq.qual()), policy)?;
        writer.push(&record)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn encode(
    input: &str,
    output: &str,
    fastq: bool,
    quality: QualityPolicy,
    level: u64,
    block_size: u64,
    index_interval: u64,
    strict_sort: bool,
) -> Result<()> {
    let header = FileHeaderBuilder::new()
        .with_quality_policy(quality)
        .with_compression_level(level)
        .with_block_size(block_size)
        .with_index_interval(index_interval)
        .with_sort_check(strict_sort)
        .build();
    let handle = BufWriter::new(
        fs::File::create(output).with_context(|| format!("Failed to create {output}"))?,
    );
    let mut writer = RamWriter::new(handle, header)?;
    let mut refs = if strict_sort {
        References::with_sort_check()
    } else {
        References::new()
    };

    let reader = open_input(input)?;
    if fastq {
        encode_fastq(reader, quality, &mut writer)?;
    } else {
        encode_sam(reader, quality, &mut refs, &mut writer)?;
    }
    writer.finish(&refs)?;
    info!("Encoded {} records into {output}", writer.num_records());
    Ok(())
}

type BoxedWriter = Box<dyn io::Write + Send>;

/// Buffers the SAM lines of a region and writes them once it completes
#[derive(Clone)]
struct SamProcessor {
    l_records: usize,
    l_buf: Vec<u8>,
    formatter: SamFormatter,

    records: Arc<Mutex<usize>>,
    writer: Arc<Mutex<BoxedWriter>>,
}
impl SamProcessor {
    fn new(writer: BoxedWriter) -> Self {
        Self {
            l_records: 0,
            l_buf: Vec::new(),
            formatter: SamFormatter::new(),
            records: Arc::new(Mutex::new(0)),
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    fn n_records(&self) -> usize {
        *self.records.lock()
    }
}
impl RegionProcessor for SamProcessor {
    fn process_record(
        &mut self,
        record: &AlignmentRecord,
        refs: &References,
    ) -> binram::Result<()> {
        self.l_buf
            .extend_from_slice(self.formatter.format(record, refs)?);
        self.l_records += 1;
        Ok(())
    }

    fn on_region_complete(&mut self, _region: &binram::Region) -> binram::Result<()> {
        {
            let mut writer = self.writer.lock();
            writer.write_all(&self.l_buf)?;
            writer.flush()?;
        }
        self.l_buf.clear();

        *self.records.lock() += self.l_records;
        self.l_records = 0;
        Ok(())
    }
}

fn view(input: &str, regions: &[String], threads: usize, any_reference_floor: bool) -> Result<()> {
    let mut reader = MmapReader::new(input).with_context(|| format!("Failed to open {input}"))?;
    if any_reference_floor {
        reader.set_floor_policy(FloorPolicy::AnyReference);
    }

    if regions.is_empty() {
        let refs = reader.references().clone();
        let mut out = BufWriter::new(io::stdout().lock());
        let mut formatter = SamFormatter::new();
        let mut record = AlignmentRecord::new();
        for row in 0..reader.num_records() {
            reader.get(row, Projection::ALL, &mut record)?;
            out.write_all(formatter.format(&record, &refs)?)?;
        }
        out.flush()?;
        return Ok(());
    }

    let processor = SamProcessor::new(Box::new(io::stdout()));
    reader.process_regions_parallel(regions, processor.clone(), threads)?;
    info!(
        "Wrote {} records from {} regions",
        processor.n_records(),
        regions.len()
    );
    Ok(())
}

fn list_refs(input: &str) -> Result<()> {
    let reader = MmapReader::new(input).with_context(|| format!("Failed to open {input}"))?;
    let refs = reader.references();
    let index = reader.position_index();

    let mut out = BufWriter::new(io::stdout().lock());
    writeln!(out, "#id\tname\tfirst_row\tindex_entries")?;
    for (id, name) in refs.rname.iter() {
        match index.first_row_of(id) {
            Some(row) => writeln!(out, "{id}\t{name}\t{row}\t{}", index.entries_of(id))?,
            None => writeln!(out, "{id}\t{name}\t*\t0")?,
        }
    }
    out.flush()?;

    info!(
        "{} records in {} blocks, {} index entries (interval {})",
        reader.num_records(),
        reader.num_blocks(),
        index.len(),
        reader.header().index_interval
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    match cli.command {
        Command::Encode {
            input,
            output,
            fastq,
            quality,
            level,
            block_size,
            index_interval,
            strict_sort,
        } => encode(
            &input,
            &output,
            fastq,
            quality,
            level,
            block_size,
            index_interval,
            strict_sort,
        ),
        Command::View {
            input,
            regions,
            threads,
            any_reference_floor,
        } => view(&input, &regions, threads, any_reference_floor),
        Command::Refs { input } => list_refs(&input),
    }
}
