//! Download nucleotide sequences one accession at a time through `efetch`.

use std::fs::File;
use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::error::{Error, Result};
use crate::io::open_reader;

/// Database and format passed to every request.
const DATABASE: &str = "nuccore";
const FORMAT: &str = "fasta";

/// Read accessions from a list file, one per line. Surrounding whitespace is
/// trimmed and blank lines are ignored.
pub fn read_accessions(path: &Path) -> Result<Vec<String>> {
    let reader = open_reader(path)?;
    let mut accessions = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| Error::file_io(path, e))?;
        let accession = line.trim();
        if !accession.is_empty() {
            accessions.push(accession.to_string());
        }
    }
    Ok(accessions)
}

pub fn fasta_path(output_dir: &Path, accession: &str) -> PathBuf {
    output_dir.join(format!("{}.fasta", accession))
}

/// The `efetch` invocation for one accession; stdout carries the FASTA.
pub fn efetch_command(efetch: &Path, accession: &str) -> Command {
    let mut command = Command::new(efetch);
    command.args(["-db", DATABASE, "-format", FORMAT, "-id", accession]);
    command
}

/// A finished download must be non-empty FASTA.
fn check_download(accession: &str, path: &Path) -> Result<()> {
    let mut first = [0u8; 1];
    let n = File::open(path)
        .and_then(|mut f| f.read(&mut first))
        .map_err(|e| Error::file_io(path, e))?;
    if n == 0 {
        return Err(Error::IncompleteDownload {
            accession: accession.to_string(),
            reason: "empty response".to_string(),
        });
    }
    if first[0] != b'>' {
        return Err(Error::IncompleteDownload {
            accession: accession.to_string(),
            reason: format!("{} does not start with a FASTA header", path.display()),
        });
    }
    Ok(())
}

/// Fetch one accession into `<output_dir>/<accession>.fasta`.
pub fn fetch_one(efetch: &Path, accession: &str, output_dir: &Path) -> Result<PathBuf> {
    let out_path = fasta_path(output_dir, accession);
    let out_file = File::create(&out_path).map_err(|e| Error::file_io(&out_path, e))?;

    let program = efetch.display().to_string();
    let output = efetch_command(efetch, accession)
        .stdin(Stdio::null())
        .stdout(Stdio::from(out_file))
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| Error::Spawn {
            step: format!("fetch {}", accession),
            program: program.clone(),
            source,
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        warn!("{} {}: {}", program, accession, stderr.trim());
    }
    if !output.status.success() {
        return Err(Error::Tool {
            step: format!("fetch {}", accession),
            program,
            status: output.status,
        });
    }

    check_download(accession, &out_path)?;
    Ok(out_path)
}

/// Fetch every accession sequentially, waiting `interval` between requests.
/// The remote service answers parallel or rapid requests with HTTP 429.
pub fn fetch_all(efetch: &Path, accessions: &[String], output_dir: &Path, interval: Duration) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir).map_err(|e| Error::file_io(output_dir, e))?;

    let mut written = Vec::with_capacity(accessions.len());
    for (i, accession) in accessions.iter().enumerate() {
        if i > 0 && !interval.is_zero() {
            thread::sleep(interval);
        }
        let path = fetch_one(efetch, accession, output_dir)?;
        info!("Downloaded {} ({}/{})", accession, i + 1, accessions.len());
        written.push(path);
    }
    Ok(written)
}
