pub mod client;
pub mod config;
pub mod support;
pub mod tags;
pub mod writer;

use crate::annotate::client::{AnnotationSource, Lookup, LookupError};
use crate::annotate::config::{AnnotateConfig, MissingSupportPolicy};
use crate::annotate::support::{compute, MissingFieldError, ReadSupport, SUPPORT_DECLARATION, SUPPORT_TAG};
use crate::annotate::tags::{compile, CompiledTags, HEADER_DECLARATIONS};
use crate::annotate::writer::write_annotated;
use crate::core::record::{read_vcf, FormatError};
use crate::core::utils::{create_progress_bar, create_spinner};
use crate::diagnostics::{DiagnosticEvent, Reporter};
use rayon::prelude::*;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Pipeline stages, in order, followed by the terminal failure states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loaded,
    Annotating { done: usize, total: usize },
    ReadSupportComputed,
    Assembled,
    Done,
    AbortedFormat,
    AbortedIO,
    AbortedLookup,
    AbortedReadSupport,
    Cancelled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Loaded => f.write_str("loaded"),
            Stage::Annotating { done, total } => write!(f, "annotating ({}/{})", done, total),
            Stage::ReadSupportComputed => f.write_str("read support computed"),
            Stage::Assembled => f.write_str("assembled"),
            Stage::Done => f.write_str("done"),
            Stage::AbortedFormat => f.write_str("aborted: malformed input"),
            Stage::AbortedIO => f.write_str("aborted: output not written"),
            Stage::AbortedLookup => f.write_str("aborted: annotation service unavailable"),
            Stage::AbortedReadSupport => f.write_str("aborted: read support fields missing"),
            Stage::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("malformed input VCF {}: {source}", path.display())]
    Format { path: PathBuf, source: FormatError },
    #[error("failed to write {} (input {}): {source}", output.display(), input.display())]
    Io {
        input: PathBuf,
        output: PathBuf,
        source: std::io::Error,
    },
    #[error(
        "annotation service unavailable while annotating {}: {failures} lookups failed before any succeeded, last error: {last}; {} not written",
        input.display(),
        output.display()
    )]
    ServiceUnavailable {
        input: PathBuf,
        output: PathBuf,
        failures: usize,
        last: LookupError,
    },
    #[error(
        "variant {key} ({}, line {line}): {source}; {} not written",
        input.display(),
        output.display()
    )]
    MissingField {
        input: PathBuf,
        output: PathBuf,
        key: String,
        line: u64,
        source: MissingFieldError,
    },
    #[error(
        "annotating {} cancelled after {completed} of {total} lookups, {} not written",
        input.display(),
        output.display()
    )]
    Cancelled {
        input: PathBuf,
        output: PathBuf,
        completed: usize,
        total: usize,
    },
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl AnnotateError {
    /// Terminal stage a run ends in when it fails with this error
    pub fn stage(&self) -> Stage {
        match self {
            AnnotateError::Format { .. } => Stage::AbortedFormat,
            AnnotateError::Io { .. } | AnnotateError::ThreadPool(_) => Stage::AbortedIO,
            AnnotateError::ServiceUnavailable { .. } => Stage::AbortedLookup,
            AnnotateError::MissingField { .. } => Stage::AbortedReadSupport,
            AnnotateError::Cancelled { .. } => Stage::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub output: PathBuf,
    pub records: usize,
    /// Records whose lookup fell back to unknown annotations
    pub degraded: usize,
    /// Records written with `PSV=.` because their counts were missing
    pub missing_support: usize,
}

/// Shared between lookup workers: trips on systemic failures and on the deadline
struct FailureTracker {
    limit: usize,
    deadline: Option<Instant>,
    reachable: AtomicBool,
    systemic: AtomicUsize,
    tripped: AtomicBool,
    cancelled: AtomicBool,
}

impl FailureTracker {
    fn new(limit: usize, deadline: Option<Instant>) -> Self {
        Self {
            limit,
            deadline,
            reachable: AtomicBool::new(false),
            systemic: AtomicUsize::new(0),
            tripped: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    fn should_skip(&self) -> bool {
        if self.tripped.load(Ordering::Relaxed) || self.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        self.check_deadline()
    }

    /// Cancels the run once the deadline has passed, including while lookups are in flight
    fn check_deadline(&self) -> bool {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancelled.store(true, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Time left before the deadline, used to cap each request
    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn record(&self, lookup: &Lookup) {
        match &lookup.degraded {
            Some(err) if err.is_systemic() => {
                let failures = self.systemic.fetch_add(1, Ordering::Relaxed) + 1;
                if self.limit > 0
                    && failures >= self.limit
                    && !self.reachable.load(Ordering::Relaxed)
                {
                    self.tripped.store(true, Ordering::Relaxed);
                }
            }
            // the service answered, even if it had nothing for this variant
            _ => self.reachable.store(true, Ordering::Relaxed),
        }
    }
}

/// Annotate `config.input` and write `{prefix}_annotated.vcf`.
///
/// Lookups fan out over a worker pool; results are gathered by record index so the output
/// keeps the input order. Per-record failures are absorbed as unknown values; only the
/// errors in [`AnnotateError`] stop the run, and then no output file is written.
pub fn run_annotate(
    config: &AnnotateConfig,
    source: &dyn AnnotationSource,
    reporter: &dyn Reporter,
) -> Result<RunSummary, AnnotateError> {
    let result = run_stages(config, source, reporter);
    if let Err(err) = &result {
        reporter.report(DiagnosticEvent::Stage(err.stage()));
    }
    result
}

fn run_stages(
    config: &AnnotateConfig,
    source: &dyn AnnotationSource,
    reporter: &dyn Reporter,
) -> Result<RunSummary, AnnotateError> {
    let output = config.output_path();

    let (header, mut table) = read_vcf(&config.input).map_err(|source| AnnotateError::Format {
        path: config.input.clone(),
        source,
    })?;
    reporter.report(DiagnosticEvent::Stage(Stage::Loaded));
    reporter.report(DiagnosticEvent::InputSummary {
        path: &config.input,
        header_lines: header.len(),
        records: table.len(),
    });
    reporter.report(DiagnosticEvent::Samples(
        header.sample_names().unwrap_or(table.sample_names()),
    ));
    for kind in ["INFO", "FORMAT"] {
        let declarations = header.declarations(kind);
        reporter.report(DiagnosticEvent::Schema {
            kind,
            declarations: &declarations,
        });
    }

    let total = table.len();
    reporter.report(DiagnosticEvent::Stage(Stage::Annotating { done: 0, total }));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()?;
    let tracker = FailureTracker::new(
        config.max_failures,
        config.deadline.map(|d| Instant::now() + d),
    );
    let pb = create_progress_bar(total);

    let annotated: Vec<(Option<LookupError>, CompiledTags)> = pool.install(|| {
        table
            .records()
            .par_iter()
            .map(|record| {
                let lookup = if tracker.should_skip() {
                    Lookup::degraded(LookupError::Skipped)
                } else {
                    let lookup = source.lookup_within(record.key(), tracker.remaining());
                    tracker.check_deadline();
                    tracker.record(&lookup);
                    lookup
                };
                pb.inc(1);
                (lookup.degraded, compile(&lookup.summary))
            })
            .collect()
    });
    pb.finish_and_clear();

    let completed = annotated
        .iter()
        .filter(|(err, _)| !matches!(err, Some(LookupError::Skipped)))
        .count();
    if tracker.cancelled.load(Ordering::Relaxed) || tracker.check_deadline() {
        return Err(AnnotateError::Cancelled {
            input: config.input.clone(),
            output,
            completed,
            total,
        });
    }
    if tracker.tripped.load(Ordering::Relaxed) {
        let last = annotated
            .iter()
            .rev()
            .find_map(|(err, _)| err.as_ref().filter(|e| e.is_systemic()))
            .cloned()
            .unwrap_or(LookupError::Skipped);
        return Err(AnnotateError::ServiceUnavailable {
            input: config.input.clone(),
            output,
            failures: tracker.systemic.load(Ordering::Relaxed),
            last,
        });
    }
    reporter.report(DiagnosticEvent::Stage(Stage::Annotating {
        done: completed,
        total,
    }));

    let mut degraded = 0;
    let mut missing_support = 0;
    for (record, (lookup_err, tags)) in table.records_mut().iter_mut().zip(&annotated) {
        let key = record.key().to_string();
        if let Some(err) = lookup_err {
            degraded += 1;
            reporter.report(DiagnosticEvent::LookupDegraded {
                key: &key,
                reason: &err.to_string(),
            });
        }

        let support = match compute(record, &config.support_keys) {
            Ok(support) => support,
            Err(err) => match config.missing_support {
                MissingSupportPolicy::Abort => {
                    return Err(AnnotateError::MissingField {
                        input: config.input.clone(),
                        output,
                        key,
                        line: record.line(),
                        source: err,
                    })
                }
                MissingSupportPolicy::Unknown => {
                    missing_support += 1;
                    reporter.report(DiagnosticEvent::ReadSupportMissing {
                        key: &key,
                        reason: &err.to_string(),
                    });
                    ReadSupport::unknown()
                }
            },
        };

        let mut info = record.info();
        tags.apply(&mut info);
        info.append(SUPPORT_TAG, support.value());
        record.set_info(&info);
        if !config.preserve_ids {
            record.set_id(&key);
        }
    }
    reporter.report(DiagnosticEvent::Stage(Stage::ReadSupportComputed));

    let spinner = create_spinner("Writing annotated VCF...");
    let declarations: Vec<&str> = HEADER_DECLARATIONS
        .iter()
        .copied()
        .chain(std::iter::once(SUPPORT_DECLARATION))
        .collect();
    let written = write_annotated(&output, &header, &declarations, &table);
    spinner.finish_and_clear();
    let replaced = written.map_err(|source| AnnotateError::Io {
        input: config.input.clone(),
        output: output.clone(),
        source,
    })?;
    for line in &replaced {
        reporter.report(DiagnosticEvent::ReplacedDeclaration(line));
    }
    reporter.report(DiagnosticEvent::Stage(Stage::Assembled));
    reporter.report(DiagnosticEvent::OutputWritten {
        path: &output,
        records: table.len(),
    });
    reporter.report(DiagnosticEvent::Stage(Stage::Done));

    Ok(RunSummary {
        output,
        records: total,
        degraded,
        missing_support,
    })
}
