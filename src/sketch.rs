//! Minimizer sketching.
//!
//! Turns a coded sequence into an ordered list of (fingerprint, location)
//! records: every sliding window of `w` consecutive canonical k-mers
//! contributes its minimum fingerprint, found in amortized O(1) with a
//! monotonic deque. Optional policies: homopolymer compression, robust
//! winnowing, micromization, and a hierarchical second reduction pass.

use std::collections::VecDeque;

use crate::constants::WINDOW_DEQUE_CAPACITY;
use crate::encoding::{base_code, hash_kmer, kmer_mask, INVALID_CODE};
use crate::error::{Error, Result};
use crate::kernels::radix_sort;
use crate::types::{Location, SketchRecord};

/// Marks a window entry whose record has already been emitted.
const STORED: u64 = 1 << 63;

/// Sketching parameters fixed for the lifetime of an engine.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SketchParams {
    pub(crate) kmer_len: u32,
    pub(crate) window_len: u32,
    pub(crate) hpc: bool,
    pub(crate) robust_winnowing: bool,
}

/// Monotonic deque over (fingerprint, payload) pairs.
///
/// The tail is popped while it exceeds an incoming fingerprint, so entries
/// increase from the front and the front always holds the window minimum.
pub(crate) struct MinimizerWindow {
    entries: VecDeque<(u64, u64)>,
}

impl MinimizerWindow {
    pub(crate) fn new() -> Self {
        MinimizerWindow {
            entries: VecDeque::with_capacity(WINDOW_DEQUE_CAPACITY),
        }
    }

    /// Pop the tail while it exceeds `fp`, then append. Ties survive so
    /// every copy of the minimum stays available for emission.
    pub(crate) fn add(&mut self, fp: u64, payload: u64) {
        while let Some(&(tail_fp, _)) = self.entries.back() {
            if tail_fp > fp {
                self.entries.pop_back();
            } else {
                break;
            }
        }
        self.entries.push_back((fp, payload));
    }

    /// Evict front entries whose payload satisfies `expired`; returns
    /// whether anything was popped.
    pub(crate) fn evict_front_while<F>(&mut self, expired: F) -> bool
    where
        F: Fn(u64) -> bool,
    {
        let mut popped = false;
        while let Some(&(_, payload)) = self.entries.front() {
            if expired(payload) {
                self.entries.pop_front();
                popped = true;
            } else {
                break;
            }
        }
        popped
    }

    /// Drop duplicate minima from the front so only the rightmost copy of
    /// the current minimum remains.
    pub(crate) fn keep_rightmost_min(&mut self) {
        while self.entries.len() > 1 && self.entries[0].0 == self.entries[1].0 {
            self.entries.pop_front();
        }
    }

    /// Visit every front entry sharing the minimum fingerprint (only the
    /// first when `front_only`), with mutable access to its payload.
    pub(crate) fn for_each_min<F>(&mut self, front_only: bool, mut visit: F)
    where
        F: FnMut(u64, &mut u64),
    {
        let front_fp = match self.entries.front() {
            Some(&(fp, _)) => fp,
            None => return,
        };
        let limit = if front_only { 1 } else { self.entries.len() };
        for idx in 0..limit {
            let entry = &mut self.entries[idx];
            if entry.0 != front_fp {
                break;
            }
            visit(entry.0, &mut entry.1);
        }
    }
}

/// Sketch one sequence into (fingerprint, packed location) records.
///
/// Positions are start coordinates of the canonical k-mer in the original
/// sequence, also under homopolymer compression. Palindromic k-mers
/// (forward == reverse complement) never enter the window.
///
/// # Errors
/// `Error::InvalidCharacter` on the first byte outside {A, C, G, T, U}.
pub(crate) fn sketch(data: &[u8], seq_id: u32, params: &SketchParams) -> Result<Vec<SketchRecord>> {
    let k = params.kmer_len;
    let w = params.window_len;
    if (data.len() as u64) < k as u64 {
        return Ok(Vec::new());
    }

    let mask = kmer_mask(k);
    let shift = (k - 1) * 2;

    let mut forward: u64 = 0;
    let mut reverse: u64 = 0;

    let mut window = MinimizerWindow::new();
    let mut dst = Vec::with_capacity(data.len() / w.max(1) as usize + 2);

    // win_span/kmer_span advance once per input byte and contract over
    // homopolymer runs, so `i - span` stays an original-sequence coordinate.
    let mut win_span: u32 = 0;
    let mut kmer_span: u32 = 0;
    let mut base_cnt: u32 = 0;

    for i in 0..data.len() {
        if i > 0 {
            win_span += 1;
            kmer_span += 1;
        }

        let c = base_code(data[i]);
        if c == INVALID_CODE {
            return Err(Error::InvalidCharacter {
                byte: data[i],
                position: i,
            });
        }
        if params.hpc && i > 0 && base_code(data[i - 1]) == c {
            continue;
        }

        base_cnt += 1;
        if base_cnt > k {
            kmer_span -= 1;
            if params.hpc {
                let last = base_code(data[i - kmer_span as usize - 1]);
                while base_code(data[i - kmer_span as usize]) == last {
                    kmer_span -= 1;
                }
            }
        }

        let c = c as u64;
        forward = ((forward << 2) | c) & mask;
        reverse = (reverse >> 2) | ((c ^ 3) << shift);

        if base_cnt >= k {
            let pos = (i as u32 - kmer_span) as u64;
            if forward < reverse {
                window.add(hash_kmer(forward, mask), pos << 1);
            } else if forward > reverse {
                window.add(hash_kmer(reverse, mask), (pos << 1) | 1);
            }
        }

        if base_cnt >= k + w - 1 {
            window.for_each_min(params.robust_winnowing, |fp, payload| {
                if *payload & STORED == 0 {
                    dst.push(SketchRecord::new(fp, Location::new(seq_id, *payload)));
                    *payload |= STORED;
                }
            });

            win_span -= 1;
            if params.hpc {
                let last = base_code(data[i - win_span as usize - 1]);
                while base_code(data[i - win_span as usize]) == last {
                    win_span -= 1;
                }
            }
            let window_start = (i as u32 - win_span) as u64;
            let popped = window.evict_front_while(|payload| ((payload << 32) >> 33) < window_start);
            if params.robust_winnowing && popped {
                window.keep_rightmost_min();
            }
        }
    }

    Ok(dst)
}

/// Reduce a sketch to `take` records, preserving the first and last
/// `end_anchors` records and keeping the smallest-fingerprint portion of the
/// middle. A no-op when `take` covers the sketch or the preserved ends do.
pub(crate) fn micromize(
    records: &mut Vec<SketchRecord>,
    take: usize,
    end_anchors: usize,
    kmer_bits: u32,
) {
    let len = records.len();
    if take >= len || 2 * end_anchors >= len {
        return;
    }

    radix_sort(&mut records[end_anchors..len - end_anchors], kmer_bits, |r| {
        r.fp
    });

    if end_anchors < take {
        let tail: Vec<SketchRecord> = records[len - end_anchors..].to_vec();
        records.truncate(take - end_anchors);
        records.extend_from_slice(&tail);
    } else {
        records.truncate(take);
    }
}

/// Hierarchical reduction: one more window-minimum pass over an existing
/// sketch, keyed by fingerprint with window positions in sketch order.
pub(crate) fn reduce(records: Vec<SketchRecord>, reduce_win_sz: u32) -> Vec<SketchRecord> {
    if records.is_empty() {
        return records;
    }

    let win_sz = reduce_win_sz as usize;
    if win_sz > records.len() {
        let mut min_idx = 0;
        for i in 1..records.len() {
            if records[i].fp < records[min_idx].fp {
                min_idx = i;
            }
        }
        return vec![records[min_idx]];
    }

    let mut kept = Vec::new();
    let mut stored = vec![false; records.len()];
    let mut window = MinimizerWindow::new();

    fn collect(
        window: &mut MinimizerWindow,
        records: &[SketchRecord],
        stored: &mut [bool],
        kept: &mut Vec<SketchRecord>,
    ) {
        window.for_each_min(false, |_, payload| {
            let idx = *payload as usize;
            if !stored[idx] {
                stored[idx] = true;
                kept.push(records[idx]);
            }
        });
    }

    for (i, record) in records.iter().enumerate().take(win_sz) {
        window.add(record.fp, i as u64);
    }
    for i in win_sz..records.len() {
        collect(&mut window, &records, &mut stored, &mut kept);
        let window_start = (i - win_sz + 1) as u64;
        window.evict_front_while(|payload| payload < window_start);
        window.add(records[i].fp, i as u64);
    }
    collect(&mut window, &records, &mut stored, &mut kept);

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(k: u32, w: u32) -> SketchParams {
        SketchParams {
            kmer_len: k,
            window_len: w,
            hpc: false,
            robust_winnowing: false,
        }
    }

    /// Recompute the canonical fingerprint of `data[pos..pos + k]` directly.
    fn naive_fp(data: &[u8], pos: usize, k: u32) -> Option<u64> {
        let mask = kmer_mask(k);
        let mut fwd: u64 = 0;
        let mut rev: u64 = 0;
        for j in 0..k as usize {
            let c = base_code(data[pos + j]) as u64;
            fwd = (fwd << 2) | c;
            rev |= (c ^ 3) << (2 * j);
        }
        match fwd.cmp(&rev) {
            std::cmp::Ordering::Less => Some(hash_kmer(fwd, mask)),
            std::cmp::Ordering::Greater => Some(hash_kmer(rev, mask)),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Deterministic pseudo-random DNA for property tests.
    fn lcg_sequence(len: usize, mut state: u64) -> Vec<u8> {
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                b"ACGT"[(state >> 33) as usize % 4]
            })
            .collect()
    }

    fn revcomp(data: &[u8]) -> Vec<u8> {
        data.iter()
            .rev()
            .map(|b| match b {
                b'A' => b'T',
                b'C' => b'G',
                b'G' => b'C',
                _ => b'A',
            })
            .collect()
    }

    #[test]
    fn test_acgt_k3_w1() {
        // "ACG" and "CGT" share one canonical k-mer; "CGT" is the reverse
        // complement so its record carries the reverse strand flag.
        let records = sketch(b"ACGT", 0, &params(3, 1)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].loc.pos(), 0);
        assert!(!records[0].loc.is_reverse());
        assert_eq!(records[1].loc.pos(), 1);
        assert!(records[1].loc.is_reverse());
        assert_eq!(records[0].fp, records[1].fp);
    }

    #[test]
    fn test_too_short_sequence_is_empty() {
        assert!(sketch(b"AC", 0, &params(3, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_character() {
        let err = sketch(b"ACGTNACGT", 0, &params(3, 1)).unwrap_err();
        match err {
            Error::InvalidCharacter { byte, position } => {
                assert_eq!(byte, b'N');
                assert_eq!(position, 4);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_uracil_codes_as_thymine() {
        let dna = sketch(b"ACGTACGT", 0, &params(4, 2)).unwrap();
        let rna = sketch(b"ACGUACGU", 0, &params(4, 2)).unwrap();
        assert_eq!(dna, rna);
    }

    #[test]
    fn test_palindromic_kmers_are_skipped() {
        // ACGCGT equals its own reverse complement.
        let records = sketch(b"ACGCGTA", 0, &params(6, 1)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].loc.pos(), 1);
        assert!(records.iter().all(|r| r.loc.pos() != 0));
    }

    #[test]
    fn test_hpc_collapses_below_k() {
        // "AAAACCCC" compresses to "AC", shorter than k = 4.
        let plain = sketch(b"AAAACCCC", 0, &params(4, 2)).unwrap();
        assert!(!plain.is_empty());

        let mut hpc = params(4, 2);
        hpc.hpc = true;
        assert!(sketch(b"AAAACCCC", 0, &hpc).unwrap().is_empty());
    }

    #[test]
    fn test_hpc_matches_precompressed_fingerprints() {
        let seq = b"AAACCCGGGTTTACGTTTGGAACCACGGTTAACCGGTTAA";
        let mut compressed: Vec<u8> = Vec::new();
        for &b in seq.iter() {
            if compressed.last() != Some(&b) {
                compressed.push(b);
            }
        }

        let mut hpc = params(5, 3);
        hpc.hpc = true;
        let mut fps_hpc: Vec<u64> = sketch(seq, 0, &hpc)
            .unwrap()
            .iter()
            .map(|r| r.fp)
            .collect();
        let mut fps_plain: Vec<u64> = sketch(&compressed, 0, &params(5, 3))
            .unwrap()
            .iter()
            .map(|r| r.fp)
            .collect();
        fps_hpc.sort_unstable();
        fps_plain.sort_unstable();
        assert_eq!(fps_hpc, fps_plain);
    }

    #[test]
    fn test_hpc_positions_are_original_coordinates() {
        let mut hpc = params(3, 1);
        hpc.hpc = true;
        // "AAACGT" compresses to "ACG T"; the k-mer ACG starts at 0, CGT at 3.
        let records = sketch(b"AAACGT", 0, &hpc).unwrap();
        let positions: Vec<u32> = records.iter().map(|r| r.loc.pos()).collect();
        assert_eq!(positions, vec![0, 3]);
    }

    #[test]
    fn test_winnowing_cover_property() {
        // Every window of w consecutive k-mer starts must contribute at
        // least one record matching the window's minimum fingerprint.
        let (k, w) = (5u32, 3usize);
        let data = lcg_sequence(100, 0xBEEF);
        let records = sketch(&data, 0, &params(k, w as u32)).unwrap();

        let fps: Vec<Option<u64>> = (0..=data.len() - k as usize)
            .map(|p| naive_fp(&data, p, k))
            .collect();

        for record in &records {
            let pos = record.loc.pos() as usize;
            assert!(pos <= data.len() - k as usize);
            assert_eq!(Some(record.fp), fps[pos]);
        }

        for start in 0..=fps.len() - w {
            let win_min = fps[start..start + w].iter().flatten().min().copied();
            if let Some(min_fp) = win_min {
                let covered = records.iter().any(|r| {
                    let p = r.loc.pos() as usize;
                    p >= start && p < start + w && r.fp == min_fp
                });
                assert!(covered, "window at {} lost its minimum", start);
            }
        }
    }

    #[test]
    fn test_robust_winnowing_emits_single_copies() {
        // A homopolymer gives every k-mer the same fingerprint; plain
        // winnowing emits every position, robust winnowing only the
        // rightmost survivor per refill.
        let plain = sketch(b"AAAAAAAAAA", 0, &params(4, 3)).unwrap();
        assert_eq!(plain.len(), 7);

        let mut robust = params(4, 3);
        robust.robust_winnowing = true;
        let kept = sketch(b"AAAAAAAAAA", 0, &robust).unwrap();
        let positions: Vec<u32> = kept.iter().map(|r| r.loc.pos()).collect();
        assert_eq!(positions, vec![0, 2, 4]);
    }

    #[test]
    fn test_reverse_complement_invariance() {
        let data = lcg_sequence(200, 0x1234);
        let rc = revcomp(&data);

        let mut fwd: Vec<u64> = sketch(&data, 0, &params(15, 5))
            .unwrap()
            .iter()
            .map(|r| r.fp)
            .collect();
        let mut rev: Vec<u64> = sketch(&rc, 0, &params(15, 5))
            .unwrap()
            .iter()
            .map(|r| r.fp)
            .collect();
        fwd.sort_unstable();
        rev.sort_unstable();
        assert_eq!(fwd, rev);
    }

    #[test]
    fn test_micromize_noop_when_take_covers_sketch() {
        let data = lcg_sequence(100, 7);
        let mut records = sketch(&data, 0, &params(5, 3)).unwrap();
        let before = records.clone();
        let len = records.len();
        micromize(&mut records, len, 2, 10);
        assert_eq!(records, before);
    }

    #[test]
    fn test_micromize_preserves_end_anchors() {
        let data = lcg_sequence(300, 99);
        let mut records = sketch(&data, 0, &params(5, 3)).unwrap();
        let full = records.clone();
        let take = full.len() / 2;
        let n = 3;
        assert!(take > 2 * n);

        micromize(&mut records, take, n, 10);
        assert_eq!(records.len(), take);
        assert_eq!(&records[..n], &full[..n]);
        assert_eq!(&records[take - n..], &full[full.len() - n..]);

        // middle of the selection is the smallest-fingerprint middle records
        let mut middle_fps: Vec<u64> = full[n..full.len() - n].iter().map(|r| r.fp).collect();
        middle_fps.sort_unstable();
        for r in &records[n..take - n] {
            let rank = middle_fps.iter().position(|&fp| fp == r.fp).unwrap();
            assert!(rank < take - 2 * n + 1);
        }
    }

    #[test]
    fn test_reduce_window_larger_than_sketch() {
        let data = lcg_sequence(80, 11);
        let records = sketch(&data, 0, &params(5, 2)).unwrap();
        let min_fp = records.iter().map(|r| r.fp).min().unwrap();
        let reduced = reduce(records, 1000);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].fp, min_fp);
    }

    #[test]
    fn test_reduce_keeps_window_minima() {
        let data = lcg_sequence(200, 13);
        let records = sketch(&data, 0, &params(5, 2)).unwrap();
        let win: usize = 4;
        let reduced = reduce(records.clone(), win as u32);

        assert!(!reduced.is_empty());
        assert!(reduced.len() <= records.len());

        // each reduced record is the minimum of at least one input window
        for r in &reduced {
            let idx = records.iter().position(|x| x == r).unwrap();
            let hit = (0..=records.len().saturating_sub(win)).any(|s| {
                idx >= s
                    && idx < s + win
                    && records[s..s + win].iter().all(|x| x.fp >= r.fp)
            });
            assert!(hit);
        }
    }

    #[test]
    fn test_sketch_is_deterministic() {
        let data = lcg_sequence(500, 0xF00D);
        let a = sketch(&data, 3, &params(15, 5)).unwrap();
        let b = sketch(&data, 3, &params(15, 5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_k32_does_not_overflow() {
        let data = lcg_sequence(100, 0xABCD);
        let records = sketch(&data, 0, &params(32, 5)).unwrap();
        assert!(!records.is_empty());
        for r in &records {
            assert!(r.loc.pos() as usize <= data.len() - 32);
        }
    }
}
