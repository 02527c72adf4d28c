use crate::annotate::client::AnnotationSummary;
use crate::core::info::{InfoField, UNKNOWN};
use crate::core::utils::format_decimal;
use std::fmt;

pub const FREQUENCY_TAG: &str = "ExAC_AF";
pub const CONSEQUENCE_TAG: &str = "CSQ";
pub const MAJOR_CONSEQUENCE_TAG: &str = "Major_CSQ";
pub const BIOTYPE_TAG: &str = "BIOTYPE";

/// Header lines declaring the four annotation tags, in tag order
pub const HEADER_DECLARATIONS: [&str; 4] = [
    r#"##INFO=<ID=ExAC_AF,Number=A,Type=Float,Description="The ExAC allele frequency of the variant.">"#,
    r#"##INFO=<ID=CSQ,Number=A,Type=String,Description="The consequence(s) of the variant, such as missense variant, inframe deletion, etc.">"#,
    r#"##INFO=<ID=Major_CSQ,Number=A,Type=String,Description="The most severe consequence, as defined by Ensembl (https://useast.ensembl.org/info/genome/variation/prediction/predicted_data.html#consequences).">"#,
    r#"##INFO=<ID=BIOTYPE,Number=A,Type=String,Description="A gene or transcript classification, as defined by Ensembl (https://m.ensembl.org/info/genome/genebuild/biotypes.html).">"#,
];

/// Allele frequencies are reported to three decimals
pub const FREQUENCY_DECIMALS: i32 = 3;

/// The four annotation tags of one variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTags {
    pub frequency: String,
    pub consequences: String,
    pub major_consequence: String,
    pub biotypes: String,
}

impl CompiledTags {
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            (FREQUENCY_TAG, self.frequency.as_str()),
            (CONSEQUENCE_TAG, self.consequences.as_str()),
            (MAJOR_CONSEQUENCE_TAG, self.major_consequence.as_str()),
            (BIOTYPE_TAG, self.biotypes.as_str()),
        ]
    }

    /// Append the tags to an INFO field, replacing earlier instances
    pub fn apply(&self, info: &mut InfoField) {
        for (key, value) in self.pairs() {
            info.append(key, value);
        }
    }
}

impl fmt::Display for CompiledTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs().iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Turn a summary into tags. Sets are joined in lexicographic order so output is reproducible.
pub fn compile(summary: &AnnotationSummary) -> CompiledTags {
    let frequency = match summary.allele_freq {
        Some(freq) => format_decimal(freq, FREQUENCY_DECIMALS),
        None => UNKNOWN.to_string(),
    };

    CompiledTags {
        frequency,
        consequences: join_or_unknown(summary.consequences.iter()),
        major_consequence: summary
            .major_consequences
            .first()
            .cloned()
            .unwrap_or_else(|| UNKNOWN.to_string()),
        biotypes: join_or_unknown(summary.biotypes.iter()),
    }
}

// BTreeSet iteration is already sorted
fn join_or_unknown<'a>(terms: impl Iterator<Item = &'a String>) -> String {
    let joined = terms.map(String::as_str).collect::<Vec<_>>().join(",");
    if joined.is_empty() {
        UNKNOWN.to_string()
    } else {
        joined
    }
}
