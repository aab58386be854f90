//! Sequence identifiers of the reference FASTA and the variant file.

use std::io::BufRead;
use std::path::Path;

use needletail::parse_fastx_file;
use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::io::open_reader;

/// Identifier of the first record of a FASTA file (plain or gzip): the header
/// up to the first whitespace.
pub fn first_sequence_id(path: &Path) -> Result<String> {
    let parse_err = |reason: String| Error::Parse {
        string: path.display().to_string(),
        context: "reference FASTA",
        reason,
    };

    let mut reader = parse_fastx_file(path).map_err(|e| parse_err(e.to_string()))?;
    let record = reader
        .next()
        .ok_or_else(|| parse_err("no sequence records".to_string()))?
        .map_err(|e| parse_err(e.to_string()))?;

    let header = String::from_utf8_lossy(record.id()).into_owned();
    let id = header.split_whitespace().next().unwrap_or("").to_string();
    if id.is_empty() {
        return Err(parse_err("first record has an empty identifier".to_string()));
    }
    Ok(id)
}

/// Contigs a VCF refers to: the `CHROM` column of its records and the IDs of
/// its `##contig` header lines.
#[derive(Debug, Default)]
pub struct VcfContigs {
    pub records: FxHashSet<String>,
    pub declared: FxHashSet<String>,
}

impl VcfContigs {
    pub fn from_reader<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut contigs = VcfContigs::default();
        for line in reader.lines() {
            let line = line?;
            if let Some(meta) = line.strip_prefix("##contig=<") {
                if let Some(id) = contig_header_id(meta) {
                    contigs.declared.insert(id.to_string());
                }
            } else if line.starts_with('#') || line.is_empty() {
                continue;
            } else if let Some(chrom) = line.split('\t').next() {
                contigs.records.insert(chrom.to_string());
            }
        }
        Ok(contigs)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let reader = open_reader(path)?;
        VcfContigs::from_reader(reader).map_err(|e| Error::file_io(path, e))
    }

    /// Whether the VCF targets `seqid`. Records decide when there are any;
    /// a header-only VCF falls back to its contig declarations.
    pub fn references(&self, seqid: &str) -> bool {
        if self.records.is_empty() {
            self.declared.contains(seqid)
        } else {
            self.records.contains(seqid)
        }
    }
}

fn contig_header_id(meta: &str) -> Option<&str> {
    meta.trim_end_matches('>')
        .split(',')
        .find_map(|field| field.strip_prefix("ID="))
}
