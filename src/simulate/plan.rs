//! The external tool steps of a simulation, as typed invocations.
//!
//! Each step is a pipe chain of programs with explicit argument lists,
//! optionally ending in an in-process sink. Nothing goes through a shell; the
//! plan is only rendered to shell syntax as a record for the working
//! directory.

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::SimulationJob;

/// Read pairs drawn by the simulator before duplication and subsampling.
pub const SIMULATED_PAIRS: u32 = 10_000;

/// Paths of the external programs. Defaults resolve through `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub dwgsim: PathBuf,
    pub bwa: PathBuf,
    pub samtools: PathBuf,
    pub seqkit: PathBuf,
    pub seqtk: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        ToolPaths {
            dwgsim: PathBuf::from("dwgsim"),
            bwa: PathBuf::from("bwa"),
            samtools: PathBuf::from("samtools"),
            seqkit: PathBuf::from("seqkit"),
            seqtk: PathBuf::from("seqtk"),
        }
    }
}

/// One program with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    pub fn render(&self) -> String {
        let mut line = shell_quote(&self.program.to_string_lossy()).into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_quote(&arg.to_string_lossy()));
        }
        line
    }
}

/// Where the stdout of a step's last program goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    /// Into the job log.
    Log,
    /// Through the paired-read filter into a SAM file.
    PairedSam(PathBuf),
    /// Gzip-compressed into a file.
    Gzip(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub pipeline: Vec<Invocation>,
    pub sink: Sink,
}

impl Step {
    pub fn new(name: impl Into<String>, first: Invocation) -> Self {
        Step {
            name: name.into(),
            pipeline: vec![first],
            sink: Sink::Log,
        }
    }

    pub fn pipe(mut self, next: Invocation) -> Self {
        self.pipeline.push(next);
        self
    }

    pub fn sink(mut self, sink: Sink) -> Self {
        self.sink = sink;
        self
    }

    pub fn render(&self) -> String {
        let mut line = self
            .pipeline
            .iter()
            .map(Invocation::render)
            .collect::<Vec<_>>()
            .join(" \\\n    | ");
        match &self.sink {
            Sink::Log => {}
            Sink::PairedSam(path) => {
                let _ = write!(line, " \\\n    | kml-commontools filter-pairs > {}", shell_quote(&path.to_string_lossy()));
            }
            Sink::Gzip(path) => {
                let _ = write!(line, " \\\n    | gzip --force > {}", shell_quote(&path.to_string_lossy()));
            }
        }
        line
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn render_script(&self) -> String {
        let mut script = String::from("#!/bin/bash\nset -euo pipefail\n");
        for step in &self.steps {
            let _ = write!(script, "# {}\n{}\n", step.name, step.render());
        }
        script
    }
}

/// Quote a word for bash when it holds anything beyond a safe character set.
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    let safe = !word.is_empty()
        && word
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"_-./:=@%+,".contains(&b));
    if safe {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

fn tmp(job: &SimulationJob, file: &str) -> PathBuf {
    job.work_dir.join(file)
}

fn path_arg(path: &Path) -> &OsStr {
    path.as_os_str()
}

/// Build the simulation steps. `variants` switches on variant injection;
/// everything else is identical between the wild-type and variant plans.
pub fn build_plan(job: &SimulationJob, tools: &ToolPaths, variants: Option<&Path>) -> Plan {
    let threads = job.threads.to_string();
    let read_length = job.read_length.to_string();
    let dwgsim_prefix = tmp(job, "dwgsim");
    let align_bam = tmp(job, "align.bam");
    let target_sam = tmp(job, "target.sam");

    let mut steps = Vec::new();

    // 模拟数据: no sequencing errors, no random mutations
    let mut simulate = Invocation::new(&tools.dwgsim)
        .args(["-y", "0", "-e", "0", "-E", "0", "-r", "0", "-R", "0"])
        .arg("-N")
        .arg(SIMULATED_PAIRS.to_string())
        .args(["-1", read_length.as_str(), "-2", read_length.as_str()]);
    if let Some(vcf) = variants {
        simulate = simulate.arg("-v").arg(path_arg(vcf));
    }
    let simulate = simulate.arg(path_arg(&job.reference)).arg(path_arg(&dwgsim_prefix));
    steps.push(Step::new("simulate reads", simulate));

    // 比对数据
    let read_group = format!(r"@RG\tID:{0}\tPL:illumina\tSM:{0}", job.name);
    steps.push(
        Step::new(
            "align",
            Invocation::new(&tools.bwa)
                .args(["mem", "-t", threads.as_str(), "-M", "-Y", "-R", read_group.as_str()])
                .arg(path_arg(&job.reference))
                .arg(path_arg(&tmp(job, "dwgsim.bwa.read1.fastq.gz")))
                .arg(path_arg(&tmp(job, "dwgsim.bwa.read2.fastq.gz"))),
        )
        .pipe(Invocation::new(&tools.samtools).args(["view", "-@", threads.as_str(), "-hbS", "-"]))
        .pipe(
            Invocation::new(&tools.samtools)
                .args(["sort", "-@", threads.as_str(), "-o"])
                .arg(path_arg(&align_bam))
                .arg("-"),
        ),
    );
    steps.push(Step::new(
        "index",
        Invocation::new(&tools.samtools).arg("index").arg(path_arg(&align_bam)),
    ));

    // 圈定 target 区域
    steps.push(
        Step::new(
            "extract region",
            Invocation::new(&tools.samtools)
                .args(["view", "-h"])
                .arg(path_arg(&align_bam))
                .arg(job.region.to_string()),
        )
        .sink(Sink::PairedSam(target_sam.clone())),
    );
    steps.push(Step::new(
        "extract reads",
        Invocation::new(&tools.samtools)
            .arg("fastq")
            .arg("-1")
            .arg(path_arg(&tmp(job, "target_reads_align.1.fq.gz")))
            .arg("-2")
            .arg(path_arg(&tmp(job, "target_reads_align.2.fq.gz")))
            .arg(path_arg(&target_sam)),
    ));

    // 重复, 改序列名称, 并排序
    let dup_times = job.dup_times.to_string();
    for mate in [1, 2] {
        let aligned = tmp(job, &format!("target_reads_align.{}.fq.gz", mate));
        let raw1 = tmp(job, &format!("target_reads_dupfq.raw1.{}.fq.gz", mate));
        let raw2 = tmp(job, &format!("target_reads_dupfq.raw2.{}.fq.gz", mate));
        let sorted = tmp(job, &format!("target_reads_dupfq.{}.fq.gz", mate));

        steps.push(Step::new(
            format!("duplicate read {}", mate),
            Invocation::new(&tools.seqkit)
                .args(["dup", "--times", dup_times.as_str()])
                .arg(path_arg(&aligned))
                .arg("--out-file")
                .arg(path_arg(&raw1)),
        ));
        steps.push(Step::new(
            format!("rename read {}", mate),
            Invocation::new(&tools.seqkit)
                .arg("rename")
                .arg(path_arg(&raw1))
                .arg("--out-file")
                .arg(path_arg(&raw2)),
        ));
        steps.push(Step::new(
            format!("sort read {}", mate),
            Invocation::new(&tools.seqkit)
                .args(["sort", "--threads", threads.as_str(), "--by-name"])
                .arg(path_arg(&raw2))
                .arg("--out-file")
                .arg(path_arg(&sorted)),
        ));
    }

    let reads_per_mate = job.reads_per_mate().to_string();
    for (mate, output) in [(1, &job.read1), (2, &job.read2)] {
        let sorted = tmp(job, &format!("target_reads_dupfq.{}.fq.gz", mate));
        steps.push(
            Step::new(
                format!("subsample read {}", mate),
                Invocation::new(&tools.seqtk)
                    .arg("sample")
                    .arg(path_arg(&sorted))
                    .arg(&reads_per_mate),
            )
            .sink(Sink::Gzip(output.clone())),
        );
    }

    Plan { steps }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(shell_quote("/opt/bin/bwa"), "/opt/bin/bwa");
        assert_eq!(shell_quote("chr1:100-200"), "chr1:100-200");
        assert_eq!(shell_quote(r"@RG\tID:x"), r"'@RG\tID:x'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn renders_pipes_and_sinks() {
        let step = Step::new("demo", Invocation::new("samtools").args(["view", "-h", "in.bam"]))
            .pipe(Invocation::new("head"))
            .sink(Sink::Gzip(PathBuf::from("out dir/x.gz")));
        assert_eq!(
            step.render(),
            "samtools view -h in.bam \\\n    | head \\\n    | gzip --force > 'out dir/x.gz'"
        );
    }
}
