use crate::core::header::{HeaderLines, META_PREFIX};
use crate::core::info::InfoField;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

pub const CHROM: &str = "CHROM";
pub const POS: &str = "POS";
pub const ID: &str = "ID";
pub const REF: &str = "REF";
pub const ALT: &str = "ALT";
pub const INFO: &str = "INFO";
pub const FORMAT: &str = "FORMAT";

const IDENTITY_COLUMNS: [&str; 4] = [CHROM, POS, REF, ALT];

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("no column header line found, the table is empty")]
    Empty,
    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("line {line}: expected {expected} columns as declared by the header, found {found}")]
    ColumnCount { line: u64, expected: u64, found: u64 },
    #[error("line {line}: empty {column} field")]
    EmptyIdentity { line: u64, column: &'static str },
    #[error("line {line}: invalid position '{value}'")]
    InvalidPosition { line: u64, value: String },
    #[error("failed to read input: {0}")]
    Read(#[from] std::io::Error),
    #[error("malformed table: {0}")]
    Csv(csv::Error),
}

impl FormatError {
    fn from_csv(err: csv::Error, skipped: u64) -> Self {
        match err.kind() {
            csv::ErrorKind::UnequalLengths {
                pos,
                expected_len,
                len,
            } => FormatError::ColumnCount {
                line: pos.as_ref().map(|p| p.line()).unwrap_or(0) + skipped,
                expected: *expected_len,
                found: *len,
            },
            _ => FormatError::Csv(err),
        }
    }
}

/// `CHROM-POS-REF-ALT`, the lookup key of a variant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey(String);

impl VariantKey {
    pub fn new(chrom: &str, pos: &str, reference: &str, alternate: &str) -> Self {
        Self(format!("{}-{}-{}-{}", chrom, pos, reference, alternate))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Column positions resolved from the column header line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnIndex {
    chrom: usize,
    pos: usize,
    reference: usize,
    alternate: usize,
    info: usize,
    id: Option<usize>,
    format: Option<usize>,
}

impl ColumnIndex {
    fn resolve(names: &[String]) -> Result<Self, FormatError> {
        let find = |name: &'static str| names.iter().position(|n| n == name);
        let require = |name: &'static str| find(name).ok_or(FormatError::MissingColumn(name));

        Ok(Self {
            chrom: require(CHROM)?,
            pos: require(POS)?,
            reference: require(REF)?,
            alternate: require(ALT)?,
            info: require(INFO)?,
            id: find(ID),
            format: find(FORMAT),
        })
    }

    fn identity(&self) -> [usize; 4] {
        [self.chrom, self.pos, self.reference, self.alternate]
    }
}

/// One body row of the variant table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRecord {
    fields: Vec<String>,
    key: VariantKey,
    line: u64,
    info_idx: usize,
    id_idx: Option<usize>,
}

impl VariantRecord {
    fn new(fields: Vec<String>, columns: &ColumnIndex, line: u64) -> Result<Self, FormatError> {
        for (idx, column) in columns.identity().into_iter().zip(IDENTITY_COLUMNS) {
            if fields[idx].is_empty() {
                return Err(FormatError::EmptyIdentity { line, column });
            }
        }

        let pos = &fields[columns.pos];
        if !matches!(pos.parse::<u64>(), Ok(p) if p > 0) {
            return Err(FormatError::InvalidPosition {
                line,
                value: pos.clone(),
            });
        }

        let key = VariantKey::new(
            &fields[columns.chrom],
            pos,
            &fields[columns.reference],
            &fields[columns.alternate],
        );

        Ok(Self {
            fields,
            key,
            line,
            info_idx: columns.info,
            id_idx: columns.id,
        })
    }

    pub fn key(&self) -> &VariantKey {
        &self.key
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// 1-based line number in the input file
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn raw_info(&self) -> &str {
        &self.fields[self.info_idx]
    }

    /// INFO column parsed into a name-keyed map; rebuilt on every call
    pub fn info(&self) -> InfoField {
        InfoField::parse(self.raw_info())
    }

    pub fn set_info(&mut self, info: &InfoField) {
        self.fields[self.info_idx] = info.to_string();
    }

    /// Overwrite the ID column, if the table has one
    pub fn set_id(&mut self, id: &str) {
        if let Some(idx) = self.id_idx {
            self.fields[idx] = id.to_string();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantTable {
    columns: Vec<String>,
    format_idx: Option<usize>,
    records: Vec<VariantRecord>,
}

impl VariantTable {
    /// Parse a tab-delimited table after skipping `skip` metadata lines.
    ///
    /// The first remaining line is the column header; its leading `#` is stripped.
    pub fn parse<R: Read>(reader: R, skip: usize) -> Result<Self, FormatError> {
        let mut reader = BufReader::new(reader);
        let mut buf = String::new();
        for _ in 0..skip {
            buf.clear();
            if reader.read_line(&mut buf)? == 0 {
                return Err(FormatError::Empty);
            }
        }

        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .quoting(false)
            .flexible(false)
            .from_reader(reader);

        let skipped = skip as u64;
        let headers = rdr
            .headers()
            .map_err(|e| FormatError::from_csv(e, skipped))?
            .clone();
        if headers.is_empty() || headers.iter().all(str::is_empty) {
            return Err(FormatError::Empty);
        }

        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                if i == 0 {
                    name.trim_start_matches('#').to_string()
                } else {
                    name.to_string()
                }
            })
            .collect();
        let index = ColumnIndex::resolve(&columns)?;

        let mut records = Vec::new();
        for result in rdr.records() {
            let row = result.map_err(|e| FormatError::from_csv(e, skipped))?;
            let line = row.position().map(|p| p.line()).unwrap_or(0) + skipped;
            let fields = row.iter().map(str::to_string).collect();
            records.push(VariantRecord::new(fields, &index, line)?);
        }

        Ok(Self {
            columns,
            format_idx: index.format,
            records,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The column header line as it appears in a VCF
    pub fn header_line(&self) -> String {
        format!("#{}", self.columns.join("\t"))
    }

    /// Columns after FORMAT; a table without FORMAT has no samples
    pub fn sample_names(&self) -> &[String] {
        match self.format_idx {
            Some(idx) => &self.columns[idx + 1..],
            None => &[],
        }
    }

    pub fn records(&self) -> &[VariantRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [VariantRecord] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Number of leading `##` metadata lines
pub fn count_header_lines(text: &str) -> usize {
    text.lines()
        .take_while(|line| line.starts_with(META_PREFIX))
        .count()
}

/// Read a VCF into its metadata lines and body table
pub fn read_vcf<P: AsRef<Path>>(path: P) -> Result<(HeaderLines, VariantTable), FormatError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let skip = count_header_lines(&text);
    let table = VariantTable::parse(text.as_bytes(), skip)?;
    let lines = text.lines().take(skip).map(str::to_string).collect();
    let header = HeaderLines::with_columns(lines, &table.header_line());
    Ok((header, table))
}
