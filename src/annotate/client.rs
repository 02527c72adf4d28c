use crate::core::info::UNKNOWN;
use crate::core::record::VariantKey;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://exac.hms.harvard.edu/rest/variant/variant";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a single lookup produced no usable annotation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("service answered HTTP {0}")]
    Status(u16),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("payload has no '{0}'")]
    MissingContent(&'static str),
    #[error("lookup skipped, the run is stopping")]
    Skipped,
}

impl LookupError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LookupError::Timeout
        } else if err.is_decode() {
            LookupError::Malformed(err.to_string())
        } else {
            LookupError::Transport(err.to_string())
        }
    }

    /// Failures that point at the service rather than at one variant
    pub fn is_systemic(&self) -> bool {
        match self {
            LookupError::Transport(_) | LookupError::Timeout => true,
            LookupError::Status(code) => *code >= 500,
            _ => false,
        }
    }
}

/// Raw response of the variant endpoint; unknown keys are ignored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariantPayload {
    #[serde(default)]
    pub allele_freq: Option<f64>,
    #[serde(default)]
    pub vep_annotations: Option<Vec<VepAnnotation>>,
}

/// One annotation version (transcript) of a variant
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VepAnnotation {
    #[serde(rename = "Consequence", default)]
    pub consequence: Option<String>,
    #[serde(default)]
    pub major_consequence: Option<String>,
    #[serde(rename = "BIOTYPE", default)]
    pub biotype: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationSummary {
    /// As reported by the service; `None` when unknown
    pub allele_freq: Option<f64>,
    pub consequences: BTreeSet<String>,
    /// One entry per annotation version, most severe first
    pub major_consequences: Vec<String>,
    pub biotypes: BTreeSet<String>,
}

impl AnnotationSummary {
    /// Every field set to the unknown sentinel
    pub fn degraded() -> Self {
        Self {
            allele_freq: None,
            consequences: unknown_set(),
            major_consequences: vec![UNKNOWN.to_string()],
            biotypes: unknown_set(),
        }
    }

    /// Reduce a payload to the summary.
    ///
    /// The service lists versions most severe first, so the first major consequence is
    /// authoritative. Consequences and biotypes are unioned over all versions.
    pub fn from_payload(payload: VariantPayload) -> Result<Self, LookupError> {
        let allele_freq = payload
            .allele_freq
            .ok_or(LookupError::MissingContent("allele_freq"))?;
        let versions = payload
            .vep_annotations
            .ok_or(LookupError::MissingContent("vep_annotations"))?;

        let mut summary = Self {
            allele_freq: Some(allele_freq),
            consequences: BTreeSet::new(),
            major_consequences: Vec::with_capacity(versions.len().max(1)),
            biotypes: BTreeSet::new(),
        };

        if versions.is_empty() {
            summary.consequences = unknown_set();
            summary.major_consequences.push(UNKNOWN.to_string());
            summary.biotypes = unknown_set();
            return Ok(summary);
        }

        for version in versions {
            let consequence = or_unknown(version.consequence);
            let mut terms = consequence
                .split(['&', ','])
                .map(str::trim)
                .filter(|term| !term.is_empty())
                .peekable();
            if terms.peek().is_none() {
                summary.consequences.insert(UNKNOWN.to_string());
            }
            summary.consequences.extend(terms.map(str::to_string));

            summary
                .major_consequences
                .push(or_unknown(version.major_consequence));
            summary.biotypes.insert(or_unknown(version.biotype));
        }

        Ok(summary)
    }
}

fn unknown_set() -> BTreeSet<String> {
    BTreeSet::from([UNKNOWN.to_string()])
}

fn or_unknown(value: Option<String>) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => UNKNOWN.to_string(),
    }
}

/// Result of one lookup: always a summary, plus the reason when it is degraded
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub summary: AnnotationSummary,
    pub degraded: Option<LookupError>,
}

impl Lookup {
    pub fn degraded(err: LookupError) -> Self {
        Self {
            summary: AnnotationSummary::degraded(),
            degraded: Some(err),
        }
    }
}

/// A per-variant annotation service
pub trait AnnotationSource: Sync {
    fn fetch(&self, key: &VariantKey) -> Result<VariantPayload, LookupError>;

    /// Fetch, giving up once `budget` has elapsed. Sources without a timeout of their own
    /// fall back to `fetch`.
    fn fetch_within(&self, key: &VariantKey, _budget: Duration) -> Result<VariantPayload, LookupError> {
        self.fetch(key)
    }

    /// Never fails: any error degrades the summary to unknown values
    fn lookup(&self, key: &VariantKey) -> Lookup {
        self.lookup_within(key, None)
    }

    fn lookup_within(&self, key: &VariantKey, budget: Option<Duration>) -> Lookup {
        let fetched = match budget {
            Some(budget) => self.fetch_within(key, budget),
            None => self.fetch(key),
        };
        match fetched.and_then(AnnotationSummary::from_payload) {
            Ok(summary) => Lookup {
                summary,
                degraded: None,
            },
            Err(err) => Lookup::degraded(err),
        }
    }
}

/// HTTP client for the ExAC variant endpoint
pub struct ExacClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl ExacClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn url(&self, key: &VariantKey) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn get(&self, key: &VariantKey, timeout: Duration) -> Result<VariantPayload, LookupError> {
        let response = self
            .client
            .get(self.url(key))
            .timeout(timeout)
            .send()
            .map_err(LookupError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        response
            .json::<VariantPayload>()
            .map_err(LookupError::from_reqwest)
    }
}

impl AnnotationSource for ExacClient {
    fn fetch(&self, key: &VariantKey) -> Result<VariantPayload, LookupError> {
        self.get(key, self.timeout)
    }

    fn fetch_within(&self, key: &VariantKey, budget: Duration) -> Result<VariantPayload, LookupError> {
        self.get(key, budget.min(self.timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn payload(json: &str) -> VariantPayload {
        serde_json::from_str(json).unwrap()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_multi_version_reduction() {
        let summary = AnnotationSummary::from_payload(payload(
            r#"{
                "allele_freq": 0.00012345,
                "vep_annotations": [
                    {"Consequence": "missense_variant&stop_gained", "major_consequence": "missense_variant", "BIOTYPE": "protein_coding"},
                    {"Consequence": "", "major_consequence": "", "BIOTYPE": ""}
                ]
            }"#,
        ))
        .unwrap();

        assert_eq!(summary.allele_freq, Some(0.00012345));
        assert_eq!(
            summary.consequences,
            set(&[".", "missense_variant", "stop_gained"])
        );
        assert_eq!(summary.major_consequences, vec!["missense_variant", "."]);
        assert_eq!(summary.biotypes, set(&[".", "protein_coding"]));
    }

    #[test]
    fn test_union_across_versions() {
        let summary = AnnotationSummary::from_payload(payload(
            r#"{
                "allele_freq": 0.25,
                "vep_annotations": [
                    {"Consequence": "stop_gained", "major_consequence": "stop_gained", "BIOTYPE": "protein_coding"},
                    {"Consequence": "intron_variant&nc_transcript_variant", "major_consequence": "intron_variant", "BIOTYPE": "processed_transcript"},
                    {"Consequence": "stop_gained", "major_consequence": "stop_gained", "BIOTYPE": "protein_coding"}
                ]
            }"#,
        ))
        .unwrap();

        assert_eq!(summary.allele_freq, Some(0.25));
        assert_eq!(
            summary.consequences,
            set(&["intron_variant", "nc_transcript_variant", "stop_gained"])
        );
        assert_eq!(summary.major_consequences[0], "stop_gained");
        assert_eq!(summary.major_consequences.len(), 3);
        assert_eq!(summary.biotypes, set(&["processed_transcript", "protein_coding"]));
    }

    #[test]
    fn test_empty_version_list_keeps_frequency() {
        let summary = AnnotationSummary::from_payload(payload(
            r#"{"allele_freq": 0.0456, "vep_annotations": []}"#,
        ))
        .unwrap();

        assert_eq!(summary.allele_freq, Some(0.0456));
        assert_eq!(summary.consequences, set(&["."]));
        assert_eq!(summary.major_consequences, vec!["."]);
        assert_eq!(summary.biotypes, set(&["."]));
    }

    #[test]
    fn test_absent_fields_in_version_are_unknown() {
        let summary = AnnotationSummary::from_payload(payload(
            r#"{"allele_freq": 1, "vep_annotations": [{"Consequence": null}]}"#,
        ))
        .unwrap();

        assert_eq!(summary.consequences, set(&["."]));
        assert_eq!(summary.major_consequences, vec!["."]);
        assert_eq!(summary.biotypes, set(&["."]));
    }

    #[rstest]
    #[case(r#"{"vep_annotations": []}"#, "allele_freq")]
    #[case(r#"{"allele_freq": null, "vep_annotations": []}"#, "allele_freq")]
    #[case(r#"{"allele_freq": 0.1}"#, "vep_annotations")]
    #[case(r#"{}"#, "allele_freq")]
    fn test_missing_content(#[case] json: &str, #[case] field: &'static str) {
        let err = AnnotationSummary::from_payload(payload(json)).unwrap_err();
        assert_eq!(err, LookupError::MissingContent(field));
    }

    struct FailingSource;

    impl AnnotationSource for FailingSource {
        fn fetch(&self, _key: &VariantKey) -> Result<VariantPayload, LookupError> {
            Err(LookupError::Timeout)
        }
    }

    #[test]
    fn test_lookup_degrades_instead_of_failing() {
        let key = VariantKey::new("1", "100", "A", "T");
        let lookup = FailingSource.lookup(&key);

        assert_eq!(lookup.summary, AnnotationSummary::degraded());
        assert_eq!(lookup.degraded, Some(LookupError::Timeout));
    }

    #[rstest]
    #[case(LookupError::Transport("connection refused".into()), true)]
    #[case(LookupError::Timeout, true)]
    #[case(LookupError::Status(503), true)]
    #[case(LookupError::Status(404), false)]
    #[case(LookupError::Malformed("eof".into()), false)]
    #[case(LookupError::MissingContent("allele_freq"), false)]
    fn test_is_systemic(#[case] err: LookupError, #[case] expected: bool) {
        assert_eq!(err.is_systemic(), expected);
    }

    #[test]
    fn test_url() {
        let client = ExacClient::new("http://localhost:8080/rest/variant/variant/", DEFAULT_TIMEOUT)
            .unwrap();
        let key = VariantKey::new("22", "46615880", "T", "C");
        assert_eq!(
            client.url(&key),
            "http://localhost:8080/rest/variant/variant/22-46615880-T-C"
        );
    }
}
