//! Keep only read pairs whose two mates are both present in a SAM stream.
//!
//! `samtools view <bam> <region>` emits every alignment overlapping the
//! region, so a pair straddling the boundary shows up with a single mate.
//! Such orphans break `samtools fastq -1/-2`, hence this filter.

use std::io::{BufRead, Write};

use rustc_hash::FxHashMap;

/// Strip a trailing `/1` or `/2` mate suffix from a read name.
pub fn extract_base_name(qname: &str) -> &str {
    if qname.ends_with("/1") || qname.ends_with("/2") {
        &qname[..qname.len() - 2]
    } else {
        qname
    }
}

/// Counts of a filter run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PairFilterStats {
    pub header_lines: usize,
    pub kept: usize,
    pub dropped: usize,
}

/// SAM flag bits of secondary and supplementary alignments.
const NON_PRIMARY: u16 = 0x100 | 0x800;

fn is_primary(line: &str) -> bool {
    line.split('\t')
        .nth(1)
        .and_then(|flag| flag.parse::<u16>().ok())
        .map_or(false, |flag| flag & NON_PRIMARY == 0)
}

/// Copy header lines and the primary records of read names seen exactly
/// twice from `input` to `output`, preserving order. Secondary and
/// supplementary alignments are dropped. Records are buffered in memory.
pub fn filter_paired_reads<R: BufRead, W: Write>(input: R, mut output: W) -> std::io::Result<PairFilterStats> {
    let mut stats = PairFilterStats::default();
    let mut records = Vec::new();
    let mut counts: FxHashMap<String, u32> = FxHashMap::default();

    for line in input.lines() {
        let line = line?;
        if line.starts_with('@') {
            writeln!(output, "{}", line)?;
            stats.header_lines += 1;
            continue;
        }
        if line.is_empty() {
            continue;
        }
        if !is_primary(&line) {
            stats.dropped += 1;
            continue;
        }
        let qname = extract_base_name(line.split('\t').next().unwrap_or(""));
        *counts.entry(qname.to_string()).or_insert(0) += 1;
        records.push(line);
    }

    for line in records {
        let qname = extract_base_name(line.split('\t').next().unwrap_or(""));
        if counts.get(qname).copied() == Some(2) {
            writeln!(output, "{}", line)?;
            stats.kept += 1;
        } else {
            stats.dropped += 1;
        }
    }
    output.flush()?;
    Ok(stats)
}
