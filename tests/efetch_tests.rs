#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use kml_commontools::efetch::{fetch_all, read_accessions};
use kml_commontools::Error;
use tempfile::TempDir;

/// A stand-in for efetch: prints a FASTA record named after the `-id` value,
/// or fails / prints nothing for the magic accessions. Written once per test
/// binary so no thread forks while the script is still open for writing.
fn fake_efetch() -> PathBuf {
    static DIR: OnceLock<TempDir> = OnceLock::new();
    let dir = DIR.get_or_init(|| {
        let dir = TempDir::new().unwrap();
        write_fake_efetch(dir.path());
        dir
    });
    dir.path().join("efetch")
}

fn write_fake_efetch(dir: &Path) {
    let path = dir.join("efetch");
    fs::write(
        &path,
        r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -id) id="$2"; shift 2 ;;
    *) shift ;;
  esac
done
case "$id" in
  FAIL) echo "HTTP 429 Too Many Requests" >&2; exit 1 ;;
  EMPTY) exit 0 ;;
esac
echo "warning: slow network" >&2
printf '>%s test\nACGTACGT\n' "$id"
"#,
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_reads_accession_list() {
    let tmp = TempDir::new().unwrap();
    let list = tmp.path().join("ids.txt");
    fs::write(&list, "NC_045512.2\n\n  MN908947.3  \n").unwrap();
    assert_eq!(read_accessions(&list).unwrap(), vec!["NC_045512.2", "MN908947.3"]);
}

#[test]
fn test_fetches_each_accession() {
    let tmp = TempDir::new().unwrap();
    let efetch = fake_efetch();
    let out_dir = tmp.path().join("seq-downloads");
    let accessions = vec!["NC_045512.2".to_string(), "MN908947.3".to_string()];

    let start = Instant::now();
    let written = fetch_all(&efetch, &accessions, &out_dir, Duration::from_millis(200)).unwrap();
    // one pause between two requests
    assert!(start.elapsed() >= Duration::from_millis(200));

    assert_eq!(written, vec![out_dir.join("NC_045512.2.fasta"), out_dir.join("MN908947.3.fasta")]);
    assert_eq!(
        fs::read_to_string(out_dir.join("MN908947.3.fasta")).unwrap(),
        ">MN908947.3 test\nACGTACGT\n"
    );
}

#[test]
fn test_failed_request_stops_the_run() {
    let tmp = TempDir::new().unwrap();
    let efetch = fake_efetch();
    let out_dir = tmp.path().join("out");
    let accessions = vec!["FAIL".to_string(), "NC_000001.11".to_string()];

    let err = fetch_all(&efetch, &accessions, &out_dir, Duration::ZERO).unwrap_err();
    assert!(matches!(err, Error::Tool { .. }), "unexpected error: {}", err);
    assert!(!out_dir.join("NC_000001.11.fasta").exists());
}

#[test]
fn test_empty_download_is_incomplete() {
    let tmp = TempDir::new().unwrap();
    let efetch = fake_efetch();
    let err = fetch_all(&efetch, &["EMPTY".to_string()], tmp.path(), Duration::ZERO).unwrap_err();
    assert!(matches!(err, Error::IncompleteDownload { .. }), "unexpected error: {}", err);
}
