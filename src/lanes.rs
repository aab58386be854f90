//! Merge the per-lane FASTQ files written by a demultiplexer.
//!
//! Input names follow the bcl2fastq convention
//! `<sample>_L<lane>_<read>_<chunk>.fastq.gz`, for example
//! `Tumor_S1_L002_R1_001.fastq.gz`. Every `(sample, read)` group is merged in
//! lane order into `<sample>_L001_<read>_001.fastq.gz`.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use fastq::{Parser, Record};
use log::{debug, info, warn};
use regex::Regex;

use crate::error::{Error, Result};
use crate::io::{create_gz_writer, open_reader};

fn lane_file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<sample>.+)_L(?P<lane>\d{3})_(?P<read>[RI]\d)_(?P<chunk>\d{3})\.fastq\.gz$")
            .expect("lane file pattern is valid")
    })
}

/// One demultiplexed FASTQ file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneFile {
    pub path: PathBuf,
    pub sample: String,
    pub lane: u32,
    pub read: String,
    pub chunk: u32,
}

impl LaneFile {
    /// Parse a lane file from its path; `None` when the name does not follow
    /// the `<sample>_L<lane>_<read>_<chunk>.fastq.gz` convention.
    pub fn parse(path: &Path) -> Option<LaneFile> {
        let name = path.file_name()?.to_str()?;
        let caps = lane_file_regex().captures(name)?;
        Some(LaneFile {
            path: path.to_path_buf(),
            sample: caps["sample"].to_string(),
            lane: caps["lane"].parse().ok()?,
            read: caps["read"].to_string(),
            chunk: caps["chunk"].parse().ok()?,
        })
    }
}

/// The files of one sample and read segment, merged into a single output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeJob {
    pub sample: String,
    pub read: String,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

pub fn merged_file_name(sample: &str, read: &str) -> String {
    format!("{}_L001_{}_001.fastq.gz", sample, read)
}

/// Group lane files into merge jobs. Jobs come out sorted by sample and read,
/// inputs within a job by lane then chunk.
pub fn plan_merge_jobs(files: Vec<LaneFile>, output_dir: &Path) -> Vec<MergeJob> {
    let mut groups: BTreeMap<(String, String), Vec<LaneFile>> = BTreeMap::new();
    for file in files {
        groups
            .entry((file.sample.clone(), file.read.clone()))
            .or_default()
            .push(file);
    }

    groups
        .into_iter()
        .map(|((sample, read), mut files)| {
            files.sort_by_key(|f| (f.lane, f.chunk));
            let output = output_dir.join(merged_file_name(&sample, &read));
            MergeJob {
                sample,
                read,
                inputs: files.into_iter().map(|f| f.path).collect(),
                output,
            }
        })
        .collect()
}

/// List the `*.fastq.gz` files of a directory as lane files, skipping names
/// that do not follow the lane convention.
pub fn scan_input_dir(input_dir: &Path) -> Result<Vec<LaneFile>> {
    let entries = std::fs::read_dir(input_dir).map_err(|e| Error::file_io(input_dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::file_io(input_dir, e))?.path();
        let is_fastq_gz = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.ends_with(".fastq.gz"));
        if !is_fastq_gz || !path.is_file() {
            continue;
        }
        match LaneFile::parse(&path) {
            Some(file) => files.push(file),
            None => warn!("Skipping {}: not a <sample>_L<lane>_<read>_<chunk>.fastq.gz name", path.display()),
        }
    }
    Ok(files)
}

/// Refuse jobs whose output would overwrite one of their own inputs, as
/// happens when the output directory is the input directory.
pub fn check_outputs_distinct(jobs: &[MergeJob]) -> Result<()> {
    for job in jobs {
        let output = match job.output.parent().map(std::fs::canonicalize) {
            Some(Ok(dir)) => match job.output.file_name() {
                Some(name) => dir.join(name),
                None => continue,
            },
            _ => continue,
        };
        for input in &job.inputs {
            let input = std::fs::canonicalize(input).map_err(|e| Error::file_io(input, e))?;
            if input == output {
                return Err(Error::Config(format!(
                    "merged output {} would overwrite its input; choose another output directory",
                    output.display()
                )));
            }
        }
    }
    Ok(())
}

/// Concatenate the records of every input into one gzip output. Returns the
/// number of records written.
pub fn merge_job(job: &MergeJob, compression_level: u32) -> Result<u64> {
    let mut writer = create_gz_writer(&job.output, compression_level)?;
    let mut records = 0u64;

    for input in &job.inputs {
        let reader = open_reader(input)?;
        let mut write_err = None;
        Parser::new(reader)
            .each(|record| match record.write(&mut writer) {
                Ok(_) => {
                    records += 1;
                    true
                }
                Err(e) => {
                    write_err = Some(e);
                    false
                }
            })
            .map_err(|e| Error::file_io(input, e))?;
        if let Some(e) = write_err {
            return Err(Error::file_io(&job.output, e));
        }
        debug!("Merged {} into {}", input.display(), job.output.display());
    }

    writer
        .finish()
        .and_then(|mut inner| inner.flush())
        .map_err(|e| Error::file_io(&job.output, e))?;
    Ok(records)
}

/// Summary of a finished merge run.
#[derive(Debug, Default)]
pub struct MergeSummary {
    pub jobs: usize,
    pub records: u64,
}

/// Run merge jobs on a pool of `threads` workers. Every job runs to
/// completion; failures are logged and reported together at the end.
pub fn run_merge_jobs(jobs: Vec<MergeJob>, threads: usize, compression_level: u32) -> Result<MergeSummary> {
    let total = jobs.len();
    let workers = threads.max(1).min(total.max(1));

    let (job_tx, job_rx): (Sender<MergeJob>, Receiver<MergeJob>) = bounded(workers * 2);
    let (result_tx, result_rx): (Sender<(MergeJob, Result<u64>)>, Receiver<(MergeJob, Result<u64>)>) =
        bounded(workers * 2);

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let rx = job_rx.clone();
        let tx = result_tx.clone();
        handles.push(thread::spawn(move || {
            while let Ok(job) = rx.recv() {
                let result = merge_job(&job, compression_level);
                if tx.send((job, result)).is_err() {
                    break;
                }
            }
        }));
    }
    drop(job_rx);
    drop(result_tx);

    // 单独线程派发任务, 主线程收集结果
    let feeder = thread::spawn(move || {
        for job in jobs {
            if job_tx.send(job).is_err() {
                break;
            }
        }
    });

    let mut summary = MergeSummary::default();
    let mut failed = 0usize;
    for (job, result) in result_rx.iter() {
        match result {
            Ok(records) => {
                info!("{} {}: {} records -> {}", job.sample, job.read, records, job.output.display());
                summary.jobs += 1;
                summary.records += records;
            }
            Err(e) => {
                log::error!("{} {}: {}", job.sample, job.read, e);
                failed += 1;
            }
        }
    }

    let _ = feeder.join();
    for handle in handles {
        let _ = handle.join();
    }

    if failed > 0 {
        return Err(Error::MergeFailed { failed, total });
    }
    Ok(summary)
}

/// Merge every lane group found in `input_dir` into `output_dir`.
pub fn merge_lanes(input_dir: &Path, output_dir: &Path, threads: usize, compression_level: u32) -> Result<MergeSummary> {
    info!("Merging FASTQ lanes in {}", input_dir.display());
    std::fs::create_dir_all(output_dir).map_err(|e| Error::file_io(output_dir, e))?;

    let files = scan_input_dir(input_dir)?;
    let jobs = plan_merge_jobs(files, output_dir);
    if jobs.is_empty() {
        warn!("No lane FASTQ files found in {}", input_dir.display());
        return Ok(MergeSummary::default());
    }
    check_outputs_distinct(&jobs)?;

    let summary = run_merge_jobs(jobs, threads, compression_level)?;
    info!("Merged {} files ({} records) into {}", summary.jobs, summary.records, output_dir.display());
    Ok(summary)
}
