use crate::core::header::{Declaration, META_PREFIX};
use crate::core::record::{read_vcf, FormatError};
use std::fmt;
use std::path::{Path, PathBuf};

/// Read-only overview of a VCF: shape, samples and declared fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcfSummary {
    pub path: PathBuf,
    pub header_lines: usize,
    pub records: usize,
    pub samples: Vec<String>,
    pub info: Vec<Declaration>,
    pub format: Vec<Declaration>,
    /// Metadata lines other than INFO/FORMAT declarations
    pub metadata: Vec<String>,
    /// False when the header was only readable line by line
    pub parsed: bool,
}

impl VcfSummary {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, FormatError> {
        let path = path.as_ref();
        let (header, table) = read_vcf(path)?;

        let metadata = header
            .lines()
            .iter()
            .filter(|line| {
                let kind = line.trim_start_matches(META_PREFIX);
                !kind.starts_with("INFO=") && !kind.starts_with("FORMAT=")
            })
            .cloned()
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            header_lines: header.len(),
            records: table.len(),
            samples: header
                .sample_names()
                .unwrap_or(table.sample_names())
                .to_vec(),
            info: header.declarations("INFO"),
            format: header.declarations("FORMAT"),
            metadata,
            parsed: header.is_parsed(),
        })
    }
}

fn write_declarations(f: &mut fmt::Formatter<'_>, kind: &str, decls: &[Declaration]) -> fmt::Result {
    writeln!(f, "{} fields ({}):", kind, decls.len())?;
    for decl in decls {
        writeln!(
            f,
            "  {}\t{}\t{}\t{}",
            decl.id,
            decl.number.as_deref().unwrap_or("."),
            decl.ty.as_deref().unwrap_or("."),
            decl.description.as_deref().unwrap_or("")
        )?;
    }
    Ok(())
}

impl fmt::Display for VcfSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.path.display())?;
        if !self.parsed {
            writeln!(f, "Header: not a valid VCF header, declarations read line by line")?;
        }
        writeln!(f, "Header lines: {}", self.header_lines)?;
        writeln!(f, "Variants: {}", self.records)?;
        if self.samples.is_empty() {
            writeln!(f, "Samples: none")?;
        } else {
            writeln!(f, "Samples ({}): {}", self.samples.len(), self.samples.join(", "))?;
        }
        write_declarations(f, "INFO", &self.info)?;
        write_declarations(f, "FORMAT", &self.format)
    }
}
