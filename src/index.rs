//! Bucketed fingerprint index over reference sketch records.
//!
//! Records land in `1 << min(14, 2k)` buckets addressed by the low
//! fingerprint bits. Each bucket keeps its records sorted by fingerprint
//! and a map from fingerprint to the (offset, count) of its run, so a
//! lookup is one hash probe plus a slice. A frequency filter can compute
//! an occurrence ceiling above which fingerprints are ignored at query
//! time.

use rustc_hash::FxHashMap;

use crate::constants::MAX_BUCKET_BITS;
use crate::error::{Error, Result};
use crate::kernels::radix_sort;
use crate::types::SketchRecord;

/// Occurrence ceiling meaning "no pruning".
pub(crate) const OCCURRENCE_UNBOUNDED: u32 = u32::MAX;

/// One fingerprint bucket: records sorted by fingerprint plus the run map.
#[derive(Debug, Default)]
pub(crate) struct Bucket {
    pub(crate) records: Vec<SketchRecord>,
    map: FxHashMap<u64, (u32, u32)>,
}

impl Bucket {
    fn clear(&mut self) {
        self.records.clear();
        self.map.clear();
    }

    /// Sort records by fingerprint and rebuild the run map.
    pub(crate) fn finalize(&mut self, kmer_bits: u32) {
        radix_sort(&mut self.records, kmer_bits, |r| r.fp);

        self.map.clear();
        let mut run_start = 0;
        for i in 1..=self.records.len() {
            if i == self.records.len() || self.records[i].fp != self.records[run_start].fp {
                self.map.insert(
                    self.records[run_start].fp,
                    (run_start as u32, (i - run_start) as u32),
                );
                run_start = i;
            }
        }
    }

    fn lookup(&self, fp: u64) -> Option<&[SketchRecord]> {
        self.map.get(&fp).map(|&(start, count)| {
            &self.records[start as usize..(start + count) as usize]
        })
    }
}

/// The reference-side index: all sketch records of a batch, bucketed and
/// run-mapped, with the occurrence ceiling from the last `filter` call.
#[derive(Debug)]
pub(crate) struct PackedIndex {
    buckets: Vec<Bucket>,
    bucket_mask: u64,
    kmer_bits: u32,
    pub(crate) occurrence: u32,
}

impl PackedIndex {
    pub(crate) fn new(kmer_len: u32) -> Self {
        let bucket_count = 1usize << MAX_BUCKET_BITS.min(2 * kmer_len);
        let mut buckets = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, Bucket::default);
        PackedIndex {
            buckets,
            bucket_mask: bucket_count as u64 - 1,
            kmer_bits: 2 * kmer_len,
            occurrence: OCCURRENCE_UNBOUNDED,
        }
    }

    /// Drop every record and run map, keeping the bucket layout.
    pub(crate) fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    /// Append one record to its bucket. Caller finalizes afterwards.
    pub(crate) fn insert(&mut self, record: SketchRecord) {
        self.buckets[(record.fp & self.bucket_mask) as usize]
            .records
            .push(record);
    }

    /// Mutable view of the buckets so the engine can finalize them on its
    /// thread pool.
    pub(crate) fn buckets_mut(&mut self) -> &mut [Bucket] {
        &mut self.buckets
    }

    pub(crate) fn kmer_bits(&self) -> u32 {
        self.kmer_bits
    }

    /// All records sharing `fp`, or an empty slice.
    pub(crate) fn lookup(&self, fp: u64) -> &[SketchRecord] {
        self.buckets[(fp & self.bucket_mask) as usize]
            .lookup(fp)
            .unwrap_or(&[])
    }

    /// Total number of records across all buckets.
    pub(crate) fn size(&self) -> u64 {
        self.buckets.iter().map(|b| b.records.len() as u64).sum()
    }

    /// Set the occurrence ceiling so that roughly the most frequent
    /// `frequency` fraction of distinct fingerprints is ignored at query
    /// time. `frequency == 0` (or an empty index) disables pruning.
    pub(crate) fn filter(&mut self, frequency: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&frequency) {
            return Err(Error::invalid_argument(format!(
                "frequency must be in [0, 1], got {}",
                frequency
            )));
        }

        if frequency == 0.0 {
            self.occurrence = OCCURRENCE_UNBOUNDED;
            return Ok(());
        }

        let mut counts: Vec<u32> = self
            .buckets
            .iter()
            .flat_map(|b| b.map.values().map(|&(_, count)| count))
            .collect();

        if counts.is_empty() {
            self.occurrence = OCCURRENCE_UNBOUNDED;
            return Ok(());
        }

        let nth = (((1.0 - frequency) * counts.len() as f64) as usize).min(counts.len() - 1);
        let (_, selected, _) = counts.select_nth_unstable(nth);
        self.occurrence = *selected + 1;
        Ok(())
    }
}
