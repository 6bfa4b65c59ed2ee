use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use indicatif::ProgressBar;
use log::info;
use needletail::{parse_fastx_file, FastxReader};
use rayon::prelude::*;

use lapwing::{logging, paf, EngineConfig, MapOptions, MinimizerEngine, Overlap, Sequence};

/// Queries are consumed in batches of at most this many bases.
const BATCH_BASES: usize = 1 << 30;

#[derive(Parser, Debug)]
#[command(
    name = "lapwing",
    version,
    about = "Minimizer-based sequence overlap finder",
    long_about = None
)]
struct Args {
    /// Target file in FASTA/FASTQ format (may be gzip-compressed)
    target: PathBuf,
    /// Query file; omit to map the targets against themselves
    sequences: Option<PathBuf>,

    /// Length of minimizers
    #[arg(short = 'k', long = "kmer-length", default_value_t = 15)]
    kmer_length: u32,
    /// Length of the sliding window from which minimizers are sampled
    #[arg(short = 'w', long = "window-length", default_value_t = 5)]
    window_length: u32,
    /// Use homopolymer-compressed minimizers
    #[arg(short = 'H', long = "hpc")]
    hpc: bool,
    /// Keep only the rightmost copy of tied window minima
    #[arg(short = 'r', long = "robust-winnowing")]
    robust_winnowing: bool,
    /// Threshold for ignoring the most frequent minimizers
    #[arg(short = 'f', long = "frequency-threshold", default_value_t = 0.001)]
    frequency: f64,
    /// Use only a portion of all query minimizers
    #[arg(short = 'M', long = "micromize")]
    micromize: bool,
    /// Fraction of the sketch kept by micromization (0 keeps len/k records)
    #[arg(short = 'p', long = "micromize-factor", default_value_t = 0.0)]
    micromize_factor: f64,
    /// Number of sketch records preserved at each sequence end
    #[arg(short = 'N', long = "end-anchors", default_value_t = 0)]
    end_anchors: u8,
    /// Map only the first and last <LEN> bases of each query
    #[arg(short = 'K', long = "begin-end-length", value_name = "LEN", default_value_t = 0)]
    begin_end_length: u32,
    /// Discard chains with chaining score less than <SCORE>
    #[arg(short = 'm', long = "chain-score", value_name = "SCORE", default_value_t = 100)]
    min_chain_score: u32,
    /// Stop chain elongation if there is no minimizer within <GAP> bases
    #[arg(short = 'g', long = "chain-gap", value_name = "GAP", default_value_t = 10_000)]
    max_chain_gap: u64,
    /// Discard chains consisting of fewer than <CNT> minimizers
    #[arg(short = 'n', long = "chain-minimizers", value_name = "CNT", default_value_t = 4)]
    min_chain_anchors: usize,
    /// Keep only the <N> best-scoring overlaps per query (0 keeps all)
    #[arg(short = 'b', long = "best-n", value_name = "N", default_value_t = 0)]
    best_n: usize,
    /// Window size of the hierarchical sketch reduction (0 disables)
    #[arg(short = 'i', long = "reduce-window", default_value_t = 0)]
    reduce_window: u32,
    /// Preset options: ava (-k19 -w5 -m100 -g10000 -n4) or
    /// map (-k19 -w10 -m40 -g5000 -n3); overrides -k/-w/-m/-g/-n
    #[arg(short = 'x', long = "preset", value_parser = ["ava", "map"])]
    preset: Option<String>,
    /// Number of threads
    #[arg(short = 't', long = "threads", default_value_t = 1)]
    threads: usize,
}

impl Args {
    fn apply_preset(&mut self) {
        match self.preset.as_deref() {
            Some("ava") => {
                self.kmer_length = 19;
                self.window_length = 5;
                self.min_chain_score = 100;
                self.max_chain_gap = 10_000;
                self.min_chain_anchors = 4;
            }
            Some("map") => {
                self.kmer_length = 19;
                self.window_length = 10;
                self.min_chain_score = 40;
                self.max_chain_gap = 5_000;
                self.min_chain_anchors = 3;
            }
            _ => {}
        }
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            kmer_len: self.kmer_length,
            window_len: self.window_length,
            min_chain_score: self.min_chain_score,
            max_chain_gap: self.max_chain_gap,
            min_chain_anchors: self.min_chain_anchors,
            best_n: self.best_n,
            reduce_window: self.reduce_window,
            robust_winnowing: self.robust_winnowing,
            hpc: self.hpc,
        }
    }
}

/// Streaming FASTA/FASTQ source assigning ids monotonically from 0.
struct SequenceSource {
    reader: Box<dyn FastxReader>,
    next_id: u32,
    path: PathBuf,
}

impl SequenceSource {
    fn open(path: &Path) -> Result<Self> {
        let reader = parse_fastx_file(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(SequenceSource {
            reader,
            next_id: 0,
            path: path.to_path_buf(),
        })
    }

    /// Read records until the batch holds at least `max_bases` bases.
    /// An empty batch signals end of input.
    fn next_batch(&mut self, max_bases: usize) -> Result<Vec<Sequence>> {
        let mut batch = Vec::new();
        let mut bases = 0;
        while bases < max_bases {
            match self.reader.next() {
                Some(record) => {
                    let record = record
                        .with_context(|| format!("invalid record in {}", self.path.display()))?;
                    let name = record_name(record.id());
                    let data = record.seq().into_owned();
                    bases += data.len();
                    batch.push(Sequence::new(self.next_id, name, data));
                    self.next_id += 1;
                }
                None => break,
            }
        }
        Ok(batch)
    }
}

/// Sequence name up to the first whitespace of the header.
fn record_name(id: &[u8]) -> String {
    let end = id
        .iter()
        .position(|&b| b == b' ' || b == b'\t')
        .unwrap_or(id.len());
    String::from_utf8_lossy(&id[..end]).into_owned()
}

fn run(args: &Args) -> Result<()> {
    let pool = Arc::new(
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads.max(1))
            .build()
            .context("failed to build thread pool")?,
    );

    info!(
        "using options: k = {}, w = {}, f = {}, M = {}, m = {}, g = {}, n = {}, t = {}",
        args.kmer_length,
        args.window_length,
        args.frequency,
        args.micromize,
        args.min_chain_score,
        args.max_chain_gap,
        args.min_chain_anchors,
        args.threads
    );

    let is_ava = args
        .sequences
        .as_ref()
        .map_or(true, |path| path == &args.target);

    let targets = SequenceSource::open(&args.target)?.next_batch(usize::MAX)?;
    if targets.is_empty() {
        return Err(anyhow!("no sequences in {}", args.target.display()));
    }
    info!("parsed {} target sequences", targets.len());

    let mut engine = MinimizerEngine::new(args.engine_config(), Arc::clone(&pool));
    engine.minimize(&targets)?;
    engine.filter(args.frequency)?;
    info!("minimized targets into {} index records", engine.index_size());

    let query_path = args.sequences.as_deref().unwrap_or(args.target.as_path());
    let mut queries = SequenceSource::open(query_path)?;

    let options = MapOptions {
        avoid_equal: is_ava,
        avoid_symmetric: is_ava,
        micromize: args.micromize,
        micromize_factor: args.micromize_factor,
        end_anchors: args.end_anchors,
    };

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    let mut mapped_total = 0u64;

    loop {
        let batch = queries.next_batch(BATCH_BASES)?;
        if batch.is_empty() {
            break;
        }

        let bar = ProgressBar::new(batch.len() as u64);
        let results: Vec<Vec<Overlap>> = pool.install(|| {
            batch
                .par_iter()
                .map(|query| {
                    let overlaps = if args.begin_end_length > 0 {
                        engine.map_begin_end(
                            query,
                            options.avoid_equal,
                            options.avoid_symmetric,
                            args.begin_end_length,
                        )
                    } else {
                        engine.map(query, &options)
                    };
                    bar.inc(1);
                    overlaps
                })
                .collect::<lapwing::Result<_>>()
        })?;
        bar.finish_and_clear();

        for (query, overlaps) in batch.iter().zip(&results) {
            for overlap in overlaps {
                let target = &targets[overlap.rhs_id as usize];
                paf::write_overlap(&mut writer, overlap, query, target)?;
            }
        }

        mapped_total += batch.len() as u64;
        info!("mapped {} sequences", mapped_total);
    }

    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let mut args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{}", err);
            return Ok(());
        }
        Err(err) => {
            eprint!("{}", err);
            std::process::exit(1);
        }
    };
    args.apply_preset();

    logging::init_logger();
    run(&args)
}
