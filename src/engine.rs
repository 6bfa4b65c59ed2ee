//! The minimizer engine: sketches a reference batch into the index and
//! maps queries against it.
//!
//! The engine borrows an injected rayon thread pool for the engine's
//! lifetime and never shuts it down. Reference sketching and per-bucket
//! finalization run on the pool; only the driver touches bucket vectors in
//! between. `map*` calls are pure over the immutable index and may run
//! concurrently.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::chain::{chain, ChainParams};
use crate::constants::BEGIN_END_PENALTY_STEP;
use crate::error::Result;
use crate::index::PackedIndex;
use crate::kernels::radix_sort;
use crate::sketch::{self, SketchParams};
use crate::types::{Anchor, Overlap, Sequence, SketchRecord};

/// Engine construction parameters.
///
/// `kmer_len` is clamped to [1, 32]; everything else is taken as given.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub kmer_len: u32,
    pub window_len: u32,
    /// Discard chains scoring below this (the `-m` parameter).
    pub min_chain_score: u32,
    /// Stop chain elongation across query gaps larger than this (`-g`).
    pub max_chain_gap: u64,
    /// Discard chains with fewer shared minimizers than this (`-n`).
    pub min_chain_anchors: usize,
    /// Keep only the best-scoring N overlaps per query; 0 keeps all (`-b`).
    pub best_n: usize,
    /// Window size of the hierarchical sketch reduction; 0 disables (`-i`).
    pub reduce_window: u32,
    pub robust_winnowing: bool,
    pub hpc: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            kmer_len: 15,
            window_len: 5,
            min_chain_score: 100,
            max_chain_gap: 10_000,
            min_chain_anchors: 4,
            best_n: 0,
            reduce_window: 0,
            robust_winnowing: false,
            hpc: false,
        }
    }
}

/// Per-call options for [`MinimizerEngine::map`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MapOptions {
    /// Skip hits on the reference with the same id as the query.
    pub avoid_equal: bool,
    /// Skip hits on references with a smaller id than the query.
    pub avoid_symmetric: bool,
    /// Reduce the query sketch before probing the index.
    pub micromize: bool,
    /// Fraction of the sketch kept by micromization; 0 keeps `len / k`.
    pub micromize_factor: f64,
    /// Number of sketch records pinned at each sequence end.
    pub end_anchors: u8,
}

pub struct MinimizerEngine {
    sketch_params: SketchParams,
    chain_params: ChainParams,
    reduce_window: u32,
    index: PackedIndex,
    pool: Arc<ThreadPool>,
}

impl MinimizerEngine {
    pub fn new(config: EngineConfig, pool: Arc<ThreadPool>) -> Self {
        let kmer_len = config.kmer_len.clamp(1, 32);
        MinimizerEngine {
            sketch_params: SketchParams {
                kmer_len,
                window_len: config.window_len,
                hpc: config.hpc,
                robust_winnowing: config.robust_winnowing,
            },
            chain_params: ChainParams {
                kmer_len,
                min_score: config.min_chain_score,
                max_gap: config.max_chain_gap,
                min_anchors: config.min_chain_anchors,
                best_n: config.best_n,
            },
            reduce_window: config.reduce_window,
            index: PackedIndex::new(kmer_len),
            pool,
        }
    }

    /// Rebuild the index from a reference batch, clearing any previous
    /// contents first.
    pub fn minimize(&mut self, sequences: &[Sequence]) -> Result<()> {
        self.index.clear();
        if sequences.is_empty() {
            return Ok(());
        }

        let params = self.sketch_params;
        let sketches: Vec<Vec<SketchRecord>> = self.pool.install(|| {
            sequences
                .par_iter()
                .map(|seq| sketch::sketch(&seq.data, seq.id, &params))
                .collect::<Result<_>>()
        })?;

        for records in sketches {
            for record in records {
                self.index.insert(record);
            }
        }

        let bits = self.index.kmer_bits();
        self.pool.install(|| {
            self.index.buckets_mut().par_iter_mut().for_each(|bucket| {
                if !bucket.records.is_empty() {
                    bucket.finalize(bits);
                }
            });
        });

        Ok(())
    }

    /// Set the occurrence threshold so the most frequent `frequency`
    /// fraction of indexed fingerprints is ignored during mapping.
    pub fn filter(&mut self, frequency: f64) -> Result<()> {
        self.index.filter(frequency)
    }

    /// Total number of records in the index.
    pub fn index_size(&self) -> u64 {
        self.index.size()
    }

    /// Map one query against the prebuilt index. An empty index yields an
    /// empty result.
    pub fn map(&self, sequence: &Sequence, options: &MapOptions) -> Result<Vec<Overlap>> {
        let records = self.sketch_sequence(
            sequence,
            options.micromize,
            options.micromize_factor,
            options.end_anchors,
        )?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut anchors = Vec::new();
        for record in &records {
            let hits = self.index.lookup(record.fp);
            if hits.is_empty() || hits.len() as u32 > self.index.occurrence {
                continue;
            }
            for hit in hits {
                let rhs_id = hit.loc.seq_id();
                if options.avoid_equal && sequence.id == rhs_id {
                    continue;
                }
                if options.avoid_symmetric && sequence.id > rhs_id {
                    continue;
                }
                let same_strand = record.loc.is_reverse() == hit.loc.is_reverse();
                anchors.push(Anchor::new(
                    rhs_id,
                    same_strand,
                    record.loc.pos(),
                    hit.loc.pos(),
                ));
            }
        }

        Ok(chain(sequence.id, anchors, &self.chain_params))
    }

    /// Map a pair of sequences directly, without the index.
    pub fn map_pair(
        &self,
        lhs: &Sequence,
        rhs: &Sequence,
        micromize: bool,
        end_anchors: u8,
    ) -> Result<Vec<Overlap>> {
        let mut lhs_sketch = self.sketch_sequence(lhs, micromize, 0.0, end_anchors)?;
        if lhs_sketch.is_empty() {
            return Ok(Vec::new());
        }
        let mut rhs_sketch = self.sketch_sequence(rhs, false, 0.0, 0)?;
        if rhs_sketch.is_empty() {
            return Ok(Vec::new());
        }

        let bits = self.index.kmer_bits();
        radix_sort(&mut lhs_sketch, bits, |r| r.fp);
        radix_sort(&mut rhs_sketch, bits, |r| r.fp);

        let mut anchors = Vec::new();
        let mut j = 0;
        for lhs_record in &lhs_sketch {
            while j < rhs_sketch.len() {
                if lhs_record.fp < rhs_sketch[j].fp {
                    break;
                } else if lhs_record.fp == rhs_sketch[j].fp {
                    for hit in &rhs_sketch[j..] {
                        if hit.fp != lhs_record.fp {
                            break;
                        }
                        let same_strand = lhs_record.loc.is_reverse() == hit.loc.is_reverse();
                        anchors.push(Anchor::new(
                            rhs.id,
                            same_strand,
                            lhs_record.loc.pos(),
                            hit.loc.pos(),
                        ));
                    }
                    break;
                } else {
                    j += 1;
                }
            }
        }

        Ok(chain(lhs.id, anchors, &self.chain_params))
    }

    /// Map only the first and last `k_len` bases of a long query, then pair
    /// the candidate hit lists into one spanning overlap. Queries of at
    /// most `4 * k_len` bases fall back to the plain map.
    pub fn map_begin_end(
        &self,
        sequence: &Sequence,
        avoid_equal: bool,
        avoid_symmetric: bool,
        k_len: u32,
    ) -> Result<Vec<Overlap>> {
        let options = MapOptions {
            avoid_equal,
            avoid_symmetric,
            ..MapOptions::default()
        };

        let seq_len = sequence.data.len();
        if seq_len <= 4 * k_len as usize {
            return self.map(sequence, &options);
        }

        let begin_seq = Sequence::new(
            sequence.id,
            sequence.name.clone(),
            sequence.data[..k_len as usize].to_vec(),
        );
        let end_seq = Sequence::new(
            sequence.id,
            sequence.name.clone(),
            sequence.data[seq_len - k_len as usize..].to_vec(),
        );

        let begin_overlaps = self.map(&begin_seq, &options)?;
        let end_overlaps = self.map(&end_seq, &options)?;
        if begin_overlaps.is_empty() || end_overlaps.is_empty() {
            return Ok(Vec::new());
        }

        // Walk candidate pairs by increasing index sum so the best hits of
        // both lists are considered first; later pairs pay a growing
        // penalty on their length deviation.
        let mut best: Option<(usize, usize)> = None;
        let mut min_diff = f64::INFINITY;
        let mut penalty = 1.0f64;
        let max_index_sum = begin_overlaps.len() + end_overlaps.len() - 2;

        for index_sum in 0..=max_index_sum {
            for i in 0..=index_sum.min(begin_overlaps.len() - 1) {
                let j = index_sum - i;
                if j >= end_overlaps.len() {
                    continue;
                }

                let bov = &begin_overlaps[i];
                let eov = &end_overlaps[j];
                if bov.strand != eov.strand || bov.rhs_id != eov.rhs_id {
                    continue;
                }

                let (rhs_begin, rhs_end) = if eov.strand {
                    (bov.rhs_begin, eov.rhs_end)
                } else {
                    (eov.rhs_begin, bov.rhs_end)
                };
                if rhs_begin > rhs_end {
                    continue;
                }

                let candidate_len = (rhs_end - rhs_begin) as i64;
                let diff = penalty * (candidate_len - seq_len as i64).abs() as f64;
                if diff < min_diff {
                    best = Some((i, j));
                    min_diff = diff;
                }
            }
            penalty *= BEGIN_END_PENALTY_STEP;
        }

        let (bi, ej) = match best {
            Some(pair) => pair,
            None => return Ok(Vec::new()),
        };
        let bov = &begin_overlaps[bi];
        let eov = &end_overlaps[ej];

        let extension = (seq_len - k_len as usize) as u32;
        let (lhs_begin, lhs_end, rhs_begin, rhs_end) = if bov.strand {
            (bov.lhs_begin, eov.lhs_end + extension, bov.rhs_begin, eov.rhs_end)
        } else {
            (eov.lhs_begin, bov.lhs_end + extension, eov.rhs_begin, bov.rhs_end)
        };

        Ok(vec![Overlap {
            lhs_id: sequence.id,
            lhs_begin,
            lhs_end,
            rhs_id: bov.rhs_id,
            rhs_begin,
            rhs_end,
            score: (lhs_end - lhs_begin).max(rhs_end - rhs_begin),
            strand: bov.strand,
        }])
    }

    /// Sketch one sequence with the engine parameters plus the per-call
    /// micromization and reduction policies.
    fn sketch_sequence(
        &self,
        sequence: &Sequence,
        micromize: bool,
        micromize_factor: f64,
        end_anchors: u8,
    ) -> Result<Vec<SketchRecord>> {
        let mut records = sketch::sketch(&sequence.data, sequence.id, &self.sketch_params)?;

        if micromize {
            let take = if micromize_factor > 0.0 {
                (records.len() as f64 * micromize_factor) as usize
            } else {
                sequence.data.len() / self.sketch_params.kmer_len as usize
            };
            sketch::micromize(
                &mut records,
                take,
                end_anchors as usize,
                self.index.kmer_bits(),
            );
        }

        if self.reduce_window > 0 {
            records = sketch::reduce(records, self.reduce_window);
        }

        Ok(records)
    }
}
