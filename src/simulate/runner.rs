//! Execute a [`Plan`] step by step inside the job's working directory.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdout, Stdio};
use std::thread::{self, JoinHandle};

use log::{debug, info};

use super::plan::{Plan, Sink, Step};
use crate::error::{Error, Result};
use crate::io::create_gz_writer;
use crate::pairs::filter_paired_reads;

/// Rendered copy of the plan, written next to the intermediate files.
pub const SCRIPT_FILE: &str = "simulate.sh";
/// Captured stdout/stderr of every tool.
pub const LOG_FILE: &str = "simulate.log";

/// Matches `gzip` without a level flag.
const GZIP_LEVEL: u32 = 6;

/// Write the script record, then run every step in order. The first failing
/// step aborts the run; its output is in the log before the error returns.
pub fn run_plan(plan: &Plan, work_dir: &Path) -> Result<()> {
    let script = work_dir.join(SCRIPT_FILE);
    std::fs::write(&script, plan.render_script()).map_err(|e| Error::file_io(&script, e))?;

    let log_path = work_dir.join(LOG_FILE);
    let mut log = File::create(&log_path).map_err(|e| Error::file_io(&log_path, e))?;

    let total = plan.steps.len();
    for (i, step) in plan.steps.iter().enumerate() {
        info!("[{}/{}] {}", i + 1, total, step.name);
        let result = run_step(step, &mut log, &log_path);
        log.flush().map_err(|e| Error::file_io(&log_path, e))?;
        result?;
    }
    Ok(())
}

fn collect_stderr(child: &mut Child) -> JoinHandle<Vec<u8>> {
    let stderr = child.stderr.take();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut buf);
        }
        buf
    })
}

/// Consume the last program's stdout according to the step's sink.
fn drain_stdout(sink: &Sink, mut stdout: ChildStdout, captured: &mut Vec<u8>) -> Result<()> {
    match sink {
        Sink::Log => {
            stdout.read_to_end(captured)?;
        }
        Sink::PairedSam(path) => {
            let out = File::create(path).map_err(|e| Error::file_io(path, e))?;
            let stats = filter_paired_reads(BufReader::new(stdout), BufWriter::new(out))
                .map_err(|e| Error::file_io(path, e))?;
            info!(
                "Kept {} alignments of complete pairs, dropped {}",
                stats.kept, stats.dropped
            );
        }
        Sink::Gzip(path) => {
            let mut writer = create_gz_writer(path, GZIP_LEVEL)?;
            io::copy(&mut stdout, &mut writer)
                .and_then(|_| writer.finish())
                .and_then(|mut inner| inner.flush())
                .map_err(|e| Error::file_io(path, e))?;
        }
    }
    Ok(())
}

fn spawn_pipeline(step: &Step) -> Result<(Vec<(String, Child)>, Option<ChildStdout>)> {
    let mut children: Vec<(String, Child)> = Vec::with_capacity(step.pipeline.len());
    let mut upstream: Option<ChildStdout> = None;

    for invocation in &step.pipeline {
        let mut command = invocation.command();
        command
            .stdin(match upstream.take() {
                Some(out) => Stdio::from(out),
                None => Stdio::null(),
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match command.spawn() {
            Ok(mut child) => {
                upstream = child.stdout.take();
                children.push((invocation.program_name(), child));
            }
            Err(source) => {
                for (_, child) in children.iter_mut() {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                return Err(Error::Spawn {
                    step: step.name.clone(),
                    program: invocation.program_name(),
                    source,
                });
            }
        }
    }
    Ok((children, upstream))
}

fn run_step(step: &Step, log: &mut File, log_path: &Path) -> Result<()> {
    let rendered = step.render();
    debug!("{}", rendered);
    let log_err = |e: io::Error| Error::file_io(log_path, e);
    writeln!(log, "## {}\n$ {}", step.name, rendered).map_err(log_err)?;

    let (mut children, stdout) = spawn_pipeline(step)?;
    let stderr_handles: Vec<_> = children
        .iter_mut()
        .map(|(_, child)| collect_stderr(child))
        .collect();

    let mut captured = Vec::new();
    let sink_result = match stdout {
        Some(stdout) => drain_stdout(&step.sink, stdout, &mut captured),
        None => Ok(()),
    };

    let mut statuses = Vec::with_capacity(children.len());
    for (program, mut child) in children {
        let status = child.wait().map_err(|source| Error::Spawn {
            step: step.name.clone(),
            program: program.clone(),
            source,
        })?;
        statuses.push((program, status));
    }

    log.write_all(&captured).map_err(log_err)?;
    for handle in stderr_handles {
        let stderr = handle.join().unwrap_or_default();
        log.write_all(&stderr).map_err(log_err)?;
    }

    sink_result?;
    // pipefail: the first failing program decides
    if let Some((program, status)) = statuses.into_iter().find(|(_, s)| !s.success()) {
        return Err(Error::Tool {
            step: step.name.clone(),
            program,
            status,
        });
    }
    Ok(())
}
