use crate::core::info::{InfoField, UNKNOWN};
use crate::core::record::VariantRecord;
use crate::core::utils::{format_decimal, round_to};
use thiserror::Error;

pub const SUPPORT_TAG: &str = "PSV";

pub const SUPPORT_DECLARATION: &str = r#"##INFO=<ID=PSV,Number=1,Type=Float,Description="Percentage of reads supporting the variant versus those supporting reference reads.">"#;

pub const DEFAULT_ALT_KEY: &str = "AO";
pub const DEFAULT_REF_KEY: &str = "RO";

const SUPPORT_DECIMALS: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissingFieldError {
    #[error("INFO has no '{0}' value")]
    Absent(String),
    #[error("INFO '{key}' is not a count: '{value}'")]
    Invalid { key: String, value: String },
}

/// INFO keys holding the alternate and reference observation counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportKeys {
    pub alt: String,
    pub reference: String,
}

impl Default for SupportKeys {
    fn default() -> Self {
        Self {
            alt: DEFAULT_ALT_KEY.to_string(),
            reference: DEFAULT_REF_KEY.to_string(),
        }
    }
}

/// Percentage of reads supporting the alternate allele(s); `None` when there are no reads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadSupport {
    pub percentage: Option<f64>,
}

impl ReadSupport {
    pub fn unknown() -> Self {
        Self { percentage: None }
    }

    /// Counts are summed in `u128`; any number of `u64` counts fits
    pub fn from_counts(alt_counts: &[u64], ref_count: u64) -> Self {
        let alt: u128 = alt_counts.iter().map(|&c| u128::from(c)).sum();
        let total = alt + u128::from(ref_count);
        if total == 0 {
            return Self::unknown();
        }
        let percentage = alt as f64 / total as f64 * 100.0;
        Self {
            percentage: Some(round_to(percentage, SUPPORT_DECIMALS)),
        }
    }

    pub fn value(&self) -> String {
        match self.percentage {
            Some(p) => format_decimal(p, SUPPORT_DECIMALS),
            None => UNKNOWN.to_string(),
        }
    }

    pub fn tag(&self) -> String {
        format!("{}={}", SUPPORT_TAG, self.value())
    }
}

fn lookup<'a>(info: &'a InfoField, key: &str) -> Result<&'a str, MissingFieldError> {
    match info.get(key) {
        Some(Some(value)) if !value.is_empty() => Ok(value),
        _ => Err(MissingFieldError::Absent(key.to_string())),
    }
}

fn parse_count(key: &str, value: &str) -> Result<u64, MissingFieldError> {
    value.trim().parse().map_err(|_| MissingFieldError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Read support of a record from its own INFO counts, located by key name.
///
/// Multiple comma-joined alternate counts are summed.
pub fn compute(record: &VariantRecord, keys: &SupportKeys) -> Result<ReadSupport, MissingFieldError> {
    let info = record.info();
    let alt = lookup(&info, &keys.alt)?;
    let reference = lookup(&info, &keys.reference)?;

    let alt_counts = alt
        .split(',')
        .map(|v| parse_count(&keys.alt, v))
        .collect::<Result<Vec<_>, _>>()?;
    let ref_count = parse_count(&keys.reference, reference)?;

    Ok(ReadSupport::from_counts(&alt_counts, ref_count))
}
