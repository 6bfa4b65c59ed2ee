//! Constants used throughout the lapwing library for defaults and tuning.

/// Maximum number of fingerprint bits used to address index buckets.
/// The bucket count is `1 << min(MAX_BUCKET_BITS, 2k)`.
pub(crate) const MAX_BUCKET_BITS: u32 = 14;

/// Anchors whose group keys differ by at most this much share a diagonal
/// band and are chained together.
pub(crate) const DIAGONAL_BAND: u64 = 500;

/// Penalty growth per candidate-rank step in the begin-end pairing search.
pub(crate) const BEGIN_END_PENALTY_STEP: f64 = 1.08;

/// Preallocation for the sketcher's window deque. The monotonic deque
/// holds at most `w` live entries and the presets stay at w <= 10, so 64
/// absorbs even unusually wide windows without growing.
pub(crate) const WINDOW_DEQUE_CAPACITY: usize = 64;
