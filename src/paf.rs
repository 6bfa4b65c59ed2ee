//! PAF-like output formatting.
//!
//! One tab-separated line per overlap:
//! qname, qlen, qbegin, qend, strand(+/-), tname, tlen, tbegin, tend,
//! score, max(qspan, tspan), 255.

use std::io::{self, Write};

use crate::types::{Overlap, Sequence};

/// Write one overlap as a PAF line. The caller resolves the query and
/// target sequences; the overlap only carries their ids.
pub fn write_overlap<W: Write>(
    writer: &mut W,
    overlap: &Overlap,
    query: &Sequence,
    target: &Sequence,
) -> io::Result<()> {
    writeln!(
        writer,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t255",
        query.name,
        query.len(),
        overlap.lhs_begin,
        overlap.lhs_end,
        if overlap.strand { '+' } else { '-' },
        target.name,
        target.len(),
        overlap.rhs_begin,
        overlap.rhs_end,
        overlap.score,
        overlap.lhs_span().max(overlap.rhs_span()),
    )
}
