//! Diagnostic events emitted while annotating, decoupled from how they are reported.

use crate::annotate::Stage;
use crate::core::header::Declaration;
use log::{log, Level};
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub enum DiagnosticEvent<'a> {
    /// The pipeline moved to a new stage
    Stage(Stage),
    /// Shape of the input file
    InputSummary {
        path: &'a Path,
        header_lines: usize,
        records: usize,
    },
    /// Sample columns of the input
    Samples(&'a [String]),
    /// Declarations of one kind (INFO, FORMAT) found in the input header
    Schema {
        kind: &'a str,
        declarations: &'a [Declaration],
    },
    /// An original header declaration replaced by one this run adds
    ReplacedDeclaration(&'a str),
    /// A lookup fell back to unknown annotations
    LookupDegraded { key: &'a str, reason: &'a str },
    /// Read support could not be computed for a record
    ReadSupportMissing { key: &'a str, reason: &'a str },
    /// The annotated file is in place
    OutputWritten { path: &'a Path, records: usize },
}

pub trait Reporter: Sync {
    fn report(&self, event: DiagnosticEvent<'_>);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: DiagnosticEvent<'_>) {}
}

/// Writes events through the `log` facade: `info` when verbose, `debug` otherwise.
#[derive(Debug, Clone, Copy)]
pub struct LogReporter {
    level: Level,
}

impl LogReporter {
    pub fn new(verbose: bool) -> Self {
        let level = if verbose { Level::Info } else { Level::Debug };
        Self { level }
    }
}

impl Reporter for LogReporter {
    fn report(&self, event: DiagnosticEvent<'_>) {
        let level = self.level;
        match event {
            DiagnosticEvent::Stage(stage) => log!(level, "Stage: {}", stage),
            DiagnosticEvent::InputSummary {
                path,
                header_lines,
                records,
            } => {
                log!(
                    level,
                    "{}: {} header lines, {} variants",
                    path.display(),
                    header_lines,
                    records
                );
            }
            DiagnosticEvent::Samples(samples) => {
                log!(level, "Samples in the input VCF: {}", samples.join(", "))
            }
            DiagnosticEvent::Schema { kind, declarations } => {
                log!(level, "{} fields:", kind);
                for decl in declarations {
                    log!(
                        level,
                        "  {}\t{}\t{}",
                        decl.id,
                        decl.number.as_deref().unwrap_or("."),
                        decl.description.as_deref().unwrap_or("")
                    );
                }
            }
            // Replacing a declaration changes the output header, so this one is always shown
            DiagnosticEvent::ReplacedDeclaration(line) => {
                log::warn!("Replacing existing header declaration: {}", line)
            }
            DiagnosticEvent::LookupDegraded { key, reason } => {
                log!(level, "{}: annotation unavailable ({})", key, reason)
            }
            DiagnosticEvent::ReadSupportMissing { key, reason } => {
                log!(level, "{}: read support unavailable ({})", key, reason)
            }
            DiagnosticEvent::OutputWritten { path, records } => {
                log!(level, "Wrote {} annotated variants to {}", records, path.display())
            }
        }
    }
}
