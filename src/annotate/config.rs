use crate::annotate::client::{ExacClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::annotate::support::SupportKeys;
use crate::annotate::writer::output_path;
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_THREADS: usize = 4;
pub const DEFAULT_MAX_FAILURES: usize = 10;

/// What to do with a record that lacks the counts needed for read support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MissingSupportPolicy {
    /// Write `PSV=.` and keep going
    #[default]
    Unknown,
    /// Stop the run without writing output
    Abort,
}

#[derive(Debug, Clone)]
pub struct AnnotateConfig {
    pub input: PathBuf,
    pub prefix: String,
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Overall time allowed for lookups; the run is cancelled once it passes
    pub deadline: Option<Duration>,
    pub threads: usize,
    /// Systemic lookup failures tolerated before the first success (0 disables the check)
    pub max_failures: usize,
    pub missing_support: MissingSupportPolicy,
    pub support_keys: SupportKeys,
    /// Keep the input ID column instead of writing the variant key into it
    pub preserve_ids: bool,
}

impl AnnotateConfig {
    pub fn new(input: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            prefix: prefix.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            deadline: None,
            threads: DEFAULT_THREADS,
            max_failures: DEFAULT_MAX_FAILURES,
            missing_support: MissingSupportPolicy::default(),
            support_keys: SupportKeys::default(),
            preserve_ids: false,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        output_path(&self.prefix)
    }

    pub fn build_client(&self) -> Result<ExacClient, reqwest::Error> {
        ExacClient::new(&self.base_url, self.timeout)
    }
}
