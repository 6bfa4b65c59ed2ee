//! Anchor chaining.
//!
//! Anchors are sorted by their group key (reference id, relative strand,
//! approximate diagonal), grouped into diagonal bands, and each band is
//! reduced to its longest collinear run. Runs are split at large query
//! gaps, scored by the union coverage on both axes, and emitted as
//! overlaps.

use crate::constants::DIAGONAL_BAND;
use crate::kernels::{longest_subsequence, radix_sort};
use crate::types::{Anchor, Overlap};

/// Chaining parameters fixed for the lifetime of an engine.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChainParams {
    pub(crate) kmer_len: u32,
    pub(crate) min_score: u32,
    pub(crate) max_gap: u64,
    pub(crate) min_anchors: usize,
    pub(crate) best_n: usize,
}

/// Chain anchors of one query into scored overlaps.
pub(crate) fn chain(lhs_id: u32, mut anchors: Vec<Anchor>, params: &ChainParams) -> Vec<Overlap> {
    radix_sort(&mut anchors, 64, |a| a.group);
    anchors.push(Anchor::sentinel());

    // Maximal windows [j, i) whose group keys stay within one diagonal
    // band; windows touching the previous interval extend it.
    let mut intervals: Vec<(usize, usize)> = Vec::new();
    let mut j = 0;
    for i in 1..anchors.len() {
        if anchors[i].group - anchors[j].group > DIAGONAL_BAND {
            if i - j >= params.min_anchors {
                match intervals.last_mut() {
                    Some(last) if last.1 > j => last.1 = i,
                    _ => intervals.push((j, i)),
                }
            }
            j += 1;
            while j < i && anchors[i].group - anchors[j].group > DIAGONAL_BAND {
                j += 1;
            }
        }
    }

    let k = params.kmer_len;
    let sentinel_idx = anchors.len() - 1;

    let mut dst = Vec::new();
    for &(j, i) in &intervals {
        if i - j < params.min_anchors {
            continue;
        }

        radix_sort(&mut anchors[j..i], 64, |a| a.coords);
        let strand = anchors[j].same_strand();

        let mut indices = if strand {
            longest_subsequence(&anchors[j..i], |a, b| a < b)
        } else {
            longest_subsequence(&anchors[j..i], |a, b| a > b)
        };
        if indices.len() < params.min_anchors {
            continue;
        }

        // The global sentinel terminates the last sub-chain.
        indices.push(sentinel_idx - j);

        let mut l = 0;
        for c in 1..indices.len() {
            let lhs_gap = anchors[j + indices[c]].lhs_pos() as u64
                - anchors[j + indices[c - 1]].lhs_pos() as u64;
            if lhs_gap <= params.max_gap {
                continue;
            }
            if c - l < params.min_anchors {
                l = c;
                continue;
            }

            // Union coverage along each axis; opposite-strand rhs positions
            // are reflected so they increase with the chain.
            let mut lhs_matches = 0u32;
            let mut lhs_begin = 0u32;
            let mut lhs_end = 0u32;
            let mut rhs_matches = 0u32;
            let mut rhs_begin = 0u32;
            let mut rhs_end = 0u32;

            for m in l..c {
                let anchor = anchors[j + indices[m]];

                let lhs_pos = anchor.lhs_pos();
                if lhs_pos > lhs_end {
                    lhs_matches += lhs_end - lhs_begin;
                    lhs_begin = lhs_pos;
                }
                lhs_end = lhs_pos + k;

                let rhs_pos = if strand {
                    anchor.rhs_pos()
                } else {
                    (1u32 << 31) - (anchor.rhs_pos() + k - 1)
                };
                if rhs_pos > rhs_end {
                    rhs_matches += rhs_end - rhs_begin;
                    rhs_begin = rhs_pos;
                }
                rhs_end = rhs_pos + k;
            }
            lhs_matches += lhs_end - lhs_begin;
            rhs_matches += rhs_end - rhs_begin;

            if lhs_matches.min(rhs_matches) < params.min_score {
                l = c;
                continue;
            }

            let first = anchors[j + indices[l]];
            let last = anchors[j + indices[c - 1]];
            dst.push(Overlap {
                lhs_id,
                lhs_begin: first.lhs_pos(),
                lhs_end: k + last.lhs_pos(),
                rhs_id: anchors[j].rhs_id(),
                rhs_begin: if strand { first.rhs_pos() } else { last.rhs_pos() },
                rhs_end: k + if strand { last.rhs_pos() } else { first.rhs_pos() },
                score: lhs_matches.min(rhs_matches),
                strand,
            });

            l = c;
        }
    }

    if params.best_n > 0 && dst.len() > params.best_n {
        dst.sort_by(|a, b| b.score.cmp(&a.score));
        dst.truncate(params.best_n);
    }

    dst
}
