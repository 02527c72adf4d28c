use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use exanno::annotate::client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use exanno::annotate::config::{
    AnnotateConfig, MissingSupportPolicy, DEFAULT_MAX_FAILURES, DEFAULT_THREADS,
};
use exanno::annotate::support::{SupportKeys, DEFAULT_ALT_KEY, DEFAULT_REF_KEY};
use std::path::PathBuf;
use std::time::Duration;

/// VCF annotation with ExAC frequency, consequence and read support
#[derive(Parser, Debug)]
#[command(author, version, about = "Annotate VCF variants with ExAC data and read support")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Annotate every variant of a VCF and write {prefix}_annotated.vcf
    Annotate(AnnotateArgs),
    /// Print a summary of a VCF's header and records
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SharedOptions {
    /// Print file details: per-variant fallbacks for annotate, all metadata lines for inspect
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// Path to input VCF file
    #[arg(short = 'i', long = "input", required = true)]
    pub input: PathBuf,

    /// Output prefix; the annotated file is written to {prefix}_annotated.vcf
    #[arg(short = 'p', long = "prefix", required = true)]
    pub prefix: String,

    /// Base URL of the ExAC variant endpoint
    #[arg(long = "base-url", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[arg(long = "timeout", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Give up on lookups after this many seconds and write nothing
    #[arg(long = "deadline")]
    pub deadline: Option<u64>,

    /// Abort after this many connection failures with no successful lookup (0 never aborts)
    #[arg(long = "max-failures", default_value_t = DEFAULT_MAX_FAILURES)]
    pub max_failures: usize,

    /// What to do with variants lacking read counts
    #[arg(long = "missing-support", value_enum, default_value_t = MissingSupportPolicy::Unknown)]
    pub missing_support: MissingSupportPolicy,

    /// INFO key with alternate allele observation counts
    #[arg(long = "alt-key", default_value = DEFAULT_ALT_KEY)]
    pub alt_key: String,

    /// INFO key with the reference allele observation count
    #[arg(long = "ref-key", default_value = DEFAULT_REF_KEY)]
    pub ref_key: String,

    /// Keep the input ID column instead of replacing it with chrom-pos-ref-alt
    #[arg(long = "preserve-ids")]
    pub preserve_ids: bool,

    /// Number of concurrent annotation lookups
    #[arg(short = 't', long = "threads", default_value_t = DEFAULT_THREADS)]
    pub threads: usize,

    /// Shared options
    #[command(flatten)]
    pub shared: SharedOptions,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to VCF file
    #[arg(required = true)]
    pub vcf: PathBuf,

    /// Shared options
    #[command(flatten)]
    pub shared: SharedOptions,
}

impl AnnotateArgs {
    fn config(self) -> AnnotateConfig {
        let mut config = AnnotateConfig::new(self.input, self.prefix);
        config.base_url = self.base_url;
        config.timeout = Duration::from_secs(self.timeout);
        config.deadline = self.deadline.map(Duration::from_secs);
        config.threads = self.threads.max(1);
        config.max_failures = self.max_failures;
        config.missing_support = self.missing_support;
        config.support_keys = SupportKeys {
            alt: self.alt_key,
            reference: self.ref_key,
        };
        config.preserve_ids = self.preserve_ids;
        config
    }

    pub fn run(self) -> Result<()> {
        use exanno::annotate::run_annotate;
        use exanno::diagnostics::LogReporter;

        let reporter = LogReporter::new(self.shared.verbose);
        let config = self.config();
        let client = config
            .build_client()
            .context("Failed to build HTTP client")?;

        let summary = run_annotate(&config, &client, &reporter)?;
        log::info!(
            "Annotated {} variants ({} without ExAC data, {} without read support) -> {}",
            summary.records,
            summary.degraded,
            summary.missing_support,
            summary.output.display()
        );
        Ok(())
    }
}

impl InspectArgs {
    pub fn run(self) -> Result<()> {
        use exanno::inspect::VcfSummary;

        let summary = VcfSummary::from_path(&self.vcf)
            .with_context(|| format!("Failed to read VCF: {}", self.vcf.display()))?;
        print!("{}", summary);
        if self.shared.verbose {
            println!("Other metadata ({}):", summary.metadata.len());
            for line in &summary.metadata {
                println!("  {}", line);
            }
        }
        Ok(())
    }
}

// Main entry point
pub fn main() -> Result<()> {
    use env_logger::Env;

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Annotate(args) => args.run(),
        Commands::Inspect(args) => args.run(),
    }
}
