//! Simulate paired-end FASTQ reads over a genomic region, optionally carrying
//! the variants of a VCF.
//!
//! A [`SimulationJob`] is validated on construction: the region and the VCF
//! must name the same sequence as the first record of the reference. The
//! external tools run from a [`plan::Plan`] inside a per-job working
//! directory, which is removed once both outputs look complete.

pub mod plan;
pub mod reference;
pub mod region;
pub mod runner;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{Error, Result};
use crate::io::file_size;

pub use plan::{build_plan, Plan, ToolPaths};
pub use reference::{first_sequence_id, VcfContigs};
pub use region::Region;
pub use runner::{run_plan, LOG_FILE, SCRIPT_FILE};

/// Outputs at or below this size are treated as incomplete.
pub const MIN_OUTPUT_BYTES: u64 = 100;

pub const DEFAULT_DUP_TIMES: u32 = 2000;

/// Read pairs needed per mate file to reach `volume` base pairs.
pub fn reads_per_mate(volume: u64, read_length: u64) -> u64 {
    // ceil(ceil(v / r) / 2) == ceil(v / 2r), without overflowing 2r
    volume.div_ceil(read_length).div_ceil(2)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulationMode {
    /// Reference sequence only.
    WildType,
    /// Every read carries the variants (allele frequency 1).
    Homozygous,
    /// Not implemented; see [`simulate`].
    Heterozygous(f64),
}

impl SimulationMode {
    pub fn select(wild_type: bool, allele_freq: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&allele_freq) {
            return Err(Error::Config(format!(
                "variant allele frequency must be within [0, 1], got {}",
                allele_freq
            )));
        }
        Ok(if wild_type {
            SimulationMode::WildType
        } else if allele_freq == 1.0 {
            SimulationMode::Homozygous
        } else {
            SimulationMode::Heterozygous(allele_freq)
        })
    }
}

/// User-facing parameters of a simulation.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub reference: PathBuf,
    pub variants: Option<PathBuf>,
    pub output_prefix: PathBuf,
    pub wild_type: bool,
    pub variant_allele_freq: f64,
    pub region: String,
    pub data_volume: u64,
    pub read_length: u64,
    pub threads: usize,
    pub dup_times: u32,
}

/// A validated simulation with its derived paths.
#[derive(Debug, Clone)]
pub struct SimulationJob {
    pub reference: PathBuf,
    pub variants: Option<PathBuf>,
    pub mode: SimulationMode,
    pub region: Region,
    pub seqid: String,
    pub data_volume: u64,
    pub read_length: u64,
    pub threads: usize,
    pub dup_times: u32,
    /// Sample name used for the read group, the stem of the output prefix.
    pub name: String,
    pub work_dir: PathBuf,
    pub read1: PathBuf,
    pub read2: PathBuf,
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Check that the region and the VCF (when given) target `seqid`.
pub fn check_sequence_ids(seqid: &str, region: &Region, variants: Option<&Path>) -> Result<()> {
    if region.chrom != seqid {
        return Err(Error::Config(format!(
            "region {} is on {} but the reference sequence is {}",
            region, region.chrom, seqid
        )));
    }
    if let Some(vcf) = variants {
        let contigs = VcfContigs::from_path(vcf)?;
        if !contigs.references(seqid) {
            return Err(Error::Config(format!(
                "VCF {} has no variants on reference sequence {}",
                vcf.display(),
                seqid
            )));
        }
    }
    Ok(())
}

impl SimulationJob {
    /// Validate the configuration against the reference and VCF. Nothing is
    /// written to disk.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let mode = SimulationMode::select(config.wild_type, config.variant_allele_freq)?;
        if config.read_length == 0 {
            return Err(Error::Config("read length must be positive".to_string()));
        }
        if config.data_volume == 0 {
            return Err(Error::Config("data volume must be positive".to_string()));
        }
        if mode == SimulationMode::Homozygous && config.variants.is_none() {
            return Err(Error::Config(
                "a VCF is required to simulate variants (or pass --wild-type)".to_string(),
            ));
        }

        let region: Region = config
            .region
            .parse()
            .map_err(|e: Error| Error::Config(e.to_string()))?;

        info!("Checking sequence ids of reference, region and VCF");
        let seqid = first_sequence_id(&config.reference)?;
        check_sequence_ids(&seqid, &region, config.variants.as_deref())?;

        let name = config
            .output_prefix
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "output prefix {} has no file name",
                    config.output_prefix.display()
                ))
            })?;
        let out_dir = config.output_prefix.parent().unwrap_or_else(|| Path::new(""));
        let work_dir = out_dir.join(format!(".tmp-{}", name));

        Ok(SimulationJob {
            read1: with_suffix(&config.output_prefix, "_1.fq.gz"),
            read2: with_suffix(&config.output_prefix, "_2.fq.gz"),
            reference: config.reference,
            variants: config.variants,
            mode,
            region,
            seqid,
            data_volume: config.data_volume,
            read_length: config.read_length,
            threads: config.threads.max(1),
            dup_times: config.dup_times,
            name,
            work_dir,
        })
    }

    pub fn reads_per_mate(&self) -> u64 {
        reads_per_mate(self.data_volume, self.read_length)
    }

    fn variant_allele_freq(&self) -> f64 {
        match self.mode {
            SimulationMode::WildType => 0.0,
            SimulationMode::Homozygous => 1.0,
            SimulationMode::Heterozygous(af) => af,
        }
    }

    /// The steps for this job, or `None` for the unimplemented heterozygous
    /// case.
    pub fn plan(&self, tools: &ToolPaths) -> Option<Plan> {
        match self.mode {
            SimulationMode::WildType => Some(build_plan(self, tools, None)),
            SimulationMode::Homozygous => Some(build_plan(self, tools, self.variants.as_deref())),
            SimulationMode::Heterozygous(_) => None,
        }
    }

    pub fn outputs_complete(&self) -> bool {
        [&self.read1, &self.read2]
            .iter()
            .all(|p| file_size(p).map_or(false, |size| size > MIN_OUTPUT_BYTES))
    }

    /// Remove the working directory when both outputs exceed
    /// [`MIN_OUTPUT_BYTES`]; otherwise keep it for inspection. Returns whether
    /// it was removed.
    pub fn remove_work_dir(&self) -> Result<bool> {
        if !self.outputs_complete() {
            warn!("Keeping {}: outputs missing or too small", self.work_dir.display());
            return Ok(false);
        }
        if self.work_dir.exists() {
            info!("Removing temporary directory {}", self.work_dir.display());
            std::fs::remove_dir_all(&self.work_dir).map_err(|e| Error::file_io(&self.work_dir, e))?;
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationOutcome {
    Completed {
        read1: PathBuf,
        read2: PathBuf,
        work_dir_removed: bool,
    },
    /// Heterozygous allele frequencies are not simulated.
    Skipped,
}

/// Run a validated job: create the working directory, execute the plan and
/// clean up.
pub fn simulate(job: &SimulationJob, tools: &ToolPaths) -> Result<SimulationOutcome> {
    let plan = match job.plan(tools) {
        Some(plan) => plan,
        None => {
            // TODO: mix wild-type and variant reads once the expected ratio handling is agreed on
            warn!(
                "Heterozygous simulation (allele frequency {}) is not implemented, nothing written",
                job.variant_allele_freq()
            );
            return Ok(SimulationOutcome::Skipped);
        }
    };

    match job.mode {
        SimulationMode::WildType => info!("Simulating wild-type reads over {}", job.region),
        _ => info!("Simulating homozygous variant reads over {}", job.region),
    }
    info!(
        "{} bp at {} bp per read: {} reads per mate",
        job.data_volume,
        job.read_length,
        job.reads_per_mate()
    );

    std::fs::create_dir_all(&job.work_dir).map_err(|e| Error::file_io(&job.work_dir, e))?;
    run_plan(&plan, &job.work_dir)?;

    let work_dir_removed = job.remove_work_dir()?;
    info!("Wrote {} and {}", job.read1.display(), job.read2.display());
    Ok(SimulationOutcome::Completed {
        read1: job.read1.clone(),
        read2: job.read2.clone(),
        work_dir_removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_count_rounds_up() {
        assert_eq!(reads_per_mate(500_000_000, 150), 1_666_667);
        assert_eq!(reads_per_mate(300, 150), 1);
        assert_eq!(reads_per_mate(301, 150), 2);
        assert_eq!(reads_per_mate(1, 1), 1);
    }

    #[test]
    fn read_count_handles_huge_read_length() {
        assert_eq!(reads_per_mate(500, u64::MAX / 2 + 1), 1);
        assert_eq!(reads_per_mate(u64::MAX, u64::MAX), 1);
        assert_eq!(reads_per_mate(u64::MAX, 1), u64::MAX / 2 + 1);
    }

    #[test]
    fn selects_mode() {
        assert_eq!(SimulationMode::select(true, 0.05).unwrap(), SimulationMode::WildType);
        assert_eq!(SimulationMode::select(false, 1.0).unwrap(), SimulationMode::Homozygous);
        assert_eq!(
            SimulationMode::select(false, 0.5).unwrap(),
            SimulationMode::Heterozygous(0.5)
        );
        assert!(SimulationMode::select(false, 1.5).unwrap_err().is_config());
        assert!(SimulationMode::select(true, -0.1).is_err());
    }

    #[test]
    fn region_must_match_reference() {
        let region: Region = "chr2:1-100".parse().unwrap();
        let err = check_sequence_ids("chr1", &region, None).unwrap_err();
        assert!(err.is_config());
        // prefix of the reference id is not enough
        let region: Region = "chr1:1-100".parse().unwrap();
        assert!(check_sequence_ids("chr10", &region, None).is_err());
        assert!(check_sequence_ids("chr1", &region, None).is_ok());
    }
}
