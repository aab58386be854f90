use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::error;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Duration;

use kml_commontools::simulate::{self, SimulationConfig, SimulationJob, ToolPaths};
use kml_commontools::{efetch, lanes, pairs, symbols};

#[derive(Parser)]
#[command(name = "kml-commontools", version)]
#[command(about = "Helpers for a sequencing-data processing workflow")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge the per-lane FASTQ files of a bcl2fastq run
    MergeLanes(MergeLanesArgs),
    /// Download sequences for a list of accessions with efetch
    FetchSeqs(FetchSeqsArgs),
    /// Convert the Ensembl IDs of an expression matrix to gene symbols
    ConvertSymbols(ConvertSymbolsArgs),
    /// Simulate paired-end FASTQ from a reference genome and a VCF
    SimulateFq(SimulateFqArgs),
    /// Keep only complete read pairs of a SAM stream (stdin to stdout)
    FilterPairs,
}

#[derive(Args)]
struct MergeLanesArgs {
    #[arg(short = 'i', long, help = "bcl2fastq FASTQ output directory")]
    input_dir: PathBuf,

    #[arg(short = 'o', long, default_value = "merged_fastq", help = "Directory for the merged FASTQ files")]
    output_dir: PathBuf,

    #[arg(short = 't', long, default_value = "16", help = "Number of parallel merge jobs")]
    threads: usize,

    #[arg(short = 'c', long, default_value = "6", value_parser = clap::value_parser!(u32).range(0..=9), help = "Gzip compression level of the merged files")]
    compression_level: u32,
}

#[derive(Args)]
struct FetchSeqsArgs {
    #[arg(short = 'i', long, help = "Accession list, one per line")]
    input_list: PathBuf,

    #[arg(short = 'e', long, help = "Path of the efetch program")]
    efetch_path: PathBuf,

    #[arg(short = 'o', long, default_value = "seq-downloads", help = "Output directory")]
    output_dir: PathBuf,

    #[arg(long, default_value = "2", help = "Seconds to wait between requests")]
    interval: u64,
}

#[derive(Args)]
struct ConvertSymbolsArgs {
    #[arg(short = 'i', long, help = "Expression matrix (TSV) with a Geneid column of Ensembl IDs")]
    input_file: PathBuf,

    #[arg(short = 'm', long, help = "BioMart export with 'Gene stable ID' and 'Gene name' columns")]
    mart_tab: PathBuf,

    #[arg(short = 'o', long, default_value = "gene-symbol-count.tsv", help = "Converted expression matrix")]
    output_file: PathBuf,
}

#[derive(Args)]
struct SimulateFqArgs {
    #[arg(long, help = "Reference genome FASTA")]
    input_ref: PathBuf,

    #[arg(long, help = "Variant VCF")]
    input_vcf: Option<PathBuf>,

    #[arg(short = 'o', long, default_value = "simu-out", help = "Output prefix; writes <prefix>_1.fq.gz and <prefix>_2.fq.gz")]
    output_prefix: PathBuf,

    #[arg(long, help = "Simulate reference reads only; the allele frequency is ignored")]
    wild_type: bool,

    #[arg(long, default_value = "0.05", help = "Variant allele frequency, used with --input-vcf")]
    variant_allele_freq: f64,

    #[arg(long, help = "Region to simulate, chr:start-end")]
    region: String,

    #[arg(long, alias = "data-volumn", default_value = "500000000", help = "Simulated data volume in bp")]
    data_volume: u64,

    #[arg(long, default_value = "150", help = "Read length")]
    read_length: u64,

    #[arg(short = 't', long, default_value = "4", help = "Number of threads")]
    threads: usize,

    #[arg(long, default_value_t = simulate::DEFAULT_DUP_TIMES, help = "Duplication factor applied before subsampling; raise it for volumes above ~1 Gbp")]
    dup_times: u32,

    #[command(flatten)]
    tools: ToolArgs,
}

#[derive(Args)]
struct ToolArgs {
    #[arg(long, env = "DWGSIM", default_value = "dwgsim", help = "dwgsim executable")]
    dwgsim: PathBuf,

    #[arg(long, env = "BWA", default_value = "bwa", help = "bwa executable")]
    bwa: PathBuf,

    #[arg(long, env = "SAMTOOLS", default_value = "samtools", help = "samtools executable")]
    samtools: PathBuf,

    #[arg(long, env = "SEQKIT", default_value = "seqkit", help = "seqkit executable")]
    seqkit: PathBuf,

    #[arg(long, env = "SEQTK", default_value = "seqtk", help = "seqtk executable")]
    seqtk: PathBuf,
}

impl From<ToolArgs> for ToolPaths {
    fn from(args: ToolArgs) -> Self {
        ToolPaths {
            dwgsim: args.dwgsim,
            bwa: args.bwa,
            samtools: args.samtools,
            seqkit: args.seqkit,
            seqtk: args.seqtk,
        }
    }
}

fn run_merge_lanes(args: MergeLanesArgs) -> Result<()> {
    anyhow::ensure!(
        args.input_dir.is_dir(),
        "input directory {} does not exist",
        args.input_dir.display()
    );
    lanes::merge_lanes(&args.input_dir, &args.output_dir, args.threads, args.compression_level)?;
    Ok(())
}

fn run_fetch_seqs(args: FetchSeqsArgs) -> Result<()> {
    let accessions = efetch::read_accessions(&args.input_list)
        .with_context(|| format!("reading accession list {}", args.input_list.display()))?;
    efetch::fetch_all(
        &args.efetch_path,
        &accessions,
        &args.output_dir,
        Duration::from_secs(args.interval),
    )?;
    Ok(())
}

fn run_convert_symbols(args: ConvertSymbolsArgs) -> Result<()> {
    symbols::run(&args.input_file, &args.mart_tab, &args.output_file)?;
    Ok(())
}

fn run_simulate_fq(args: SimulateFqArgs) -> Result<()> {
    let job = SimulationJob::new(SimulationConfig {
        reference: args.input_ref,
        variants: args.input_vcf,
        output_prefix: args.output_prefix,
        wild_type: args.wild_type,
        variant_allele_freq: args.variant_allele_freq,
        region: args.region,
        data_volume: args.data_volume,
        read_length: args.read_length,
        threads: args.threads,
        dup_times: args.dup_times,
    })?;
    simulate::simulate(&job, &ToolPaths::from(args.tools))?;
    Ok(())
}

fn run_filter_pairs() -> Result<()> {
    let stdin = io::stdin().lock();
    let stdout = BufWriter::new(io::stdout().lock());
    let stats = pairs::filter_paired_reads(stdin, stdout)?;
    log::info!("Kept {} alignments, dropped {}", stats.kept, stats.dropped);
    Ok(())
}

impl Command {
    fn run(self) -> Result<()> {
        match self {
            Command::MergeLanes(args) => run_merge_lanes(args),
            Command::FetchSeqs(args) => run_fetch_seqs(args),
            Command::ConvertSymbols(args) => run_convert_symbols(args),
            Command::SimulateFq(args) => run_simulate_fq(args),
            Command::FilterPairs => run_filter_pairs(),
        }
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(err) = Cli::parse().command.run() {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
