//! lapwing — a minimizer-based sequence overlap finder.
//!
//! Reference sequences are sketched into compact sets of (fingerprint,
//! packed location) records, indexed into fingerprint buckets, and queries
//! are matched by chaining shared minimizers into collinear runs. The
//! result is coordinate overlaps, not alignments.
//!
//! The heavy lifting happens in three subsystems behind
//! [`MinimizerEngine`]: streaming sliding-window minimizer extraction with
//! optional homopolymer compression, robust winnowing, micromization, and
//! hierarchical reduction; a bucketed fingerprint index with
//! frequency-based pruning; and an anchor chainer built on radix sort and
//! patience longest-subsequence.
//!
//! All CPU-bound work runs on an injected rayon thread pool; the engine
//! borrows the pool and never shuts it down.

mod chain;
mod constants;
mod encoding;
mod index;
mod kernels;
mod sketch;
mod types;

pub mod engine;
pub mod error;
pub mod logging;
pub mod paf;

pub use engine::{EngineConfig, MapOptions, MinimizerEngine};
pub use error::{Error, Result};
pub use types::{Overlap, Sequence};
