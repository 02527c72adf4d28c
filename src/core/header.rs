use log::debug;
use noodles::vcf;
use std::collections::HashSet;

/// Marker that starts every metadata line
pub const META_PREFIX: &str = "##";

/// A structured `##KIND=<ID=..,Number=..,Type=..,Description="..">` metadata line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: String,
    pub id: String,
    pub number: Option<String>,
    pub ty: Option<String>,
    pub description: Option<String>,
}

impl Declaration {
    /// Returns `None` for unstructured lines such as `##fileformat=VCFv4.2`
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix(META_PREFIX)?;
        let (kind, body) = rest.split_once('=')?;
        let body = body.strip_prefix('<')?.strip_suffix('>')?;

        let mut id = None;
        let mut number = None;
        let mut ty = None;
        let mut description = None;

        for field in split_unquoted(body) {
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };
            let value = value.trim_matches('"').to_string();
            match key {
                "ID" => id = Some(value),
                "Number" => number = Some(value),
                "Type" => ty = Some(value),
                "Description" => description = Some(value),
                _ => {}
            }
        }

        Some(Self {
            kind: kind.to_string(),
            id: id?,
            number,
            ty,
            description,
        })
    }
}

// Split on commas that are not inside double quotes
fn split_unquoted(body: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&body[start..]);
    fields
}

/// INFO `Number` as written in a VCF header (noodles-vcf does not implement `Display` for it)
fn info_number_str(number: vcf::header::record::value::map::info::Number) -> String {
    use vcf::header::record::value::map::info::Number;
    match number {
        Number::Count(n) => n.to_string(),
        Number::AlternateBases => "A".to_string(),
        Number::ReferenceAlternateBases => "R".to_string(),
        Number::Samples => "G".to_string(),
        Number::Unknown => ".".to_string(),
    }
}

/// FORMAT `Number` as written in a VCF header (noodles-vcf does not implement `Display` for it)
fn format_number_str(number: vcf::header::record::value::map::format::Number) -> String {
    use vcf::header::record::value::map::format::Number;
    match number {
        Number::Count(n) => n.to_string(),
        Number::AlternateBases => "A".to_string(),
        Number::ReferenceAlternateBases => "R".to_string(),
        Number::Samples => "G".to_string(),
        Number::LocalAlternateBases => "LA".to_string(),
        Number::LocalReferenceAlternateBases => "LR".to_string(),
        Number::LocalSamples => "LG".to_string(),
        Number::Ploidy => "P".to_string(),
        Number::BaseModifications => "M".to_string(),
        Number::Unknown => ".".to_string(),
    }
}

/// INFO/FORMAT declarations and sample names read through noodles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Schema {
    infos: Vec<Declaration>,
    formats: Vec<Declaration>,
    samples: Vec<String>,
}

impl Schema {
    fn from_header(header: &vcf::Header) -> Self {
        let infos = header
            .infos()
            .iter()
            .map(|(id, map)| Declaration {
                kind: "INFO".to_string(),
                id: id.to_string(),
                number: Some(info_number_str(map.number())),
                ty: Some(map.ty().to_string()),
                description: Some(map.description().to_string()),
            })
            .collect();
        let formats = header
            .formats()
            .iter()
            .map(|(id, map)| Declaration {
                kind: "FORMAT".to_string(),
                id: id.to_string(),
                number: Some(format_number_str(map.number())),
                ty: Some(map.ty().to_string()),
                description: Some(map.description().to_string()),
            })
            .collect();
        let samples = header.sample_names().iter().cloned().collect();

        Self {
            infos,
            formats,
            samples,
        }
    }

    fn declarations(&self, kind: &str) -> Option<&[Declaration]> {
        match kind {
            "INFO" => Some(self.infos.as_slice()),
            "FORMAT" => Some(self.formats.as_slice()),
            _ => None,
        }
    }
}

/// Ordered metadata lines of a VCF, kept verbatim
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderLines {
    lines: Vec<String>,
    schema: Option<Schema>,
}

impl HeaderLines {
    /// Raw lines only; declarations are read line by line
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines,
            schema: None,
        }
    }

    /// Lines plus the `#CHROM` column line, parsed as a VCF header.
    ///
    /// Headers noodles rejects are still usable: declarations then come from the raw lines.
    pub fn with_columns(lines: Vec<String>, column_line: &str) -> Self {
        let mut text = String::new();
        for line in lines.iter().map(String::as_str).chain([column_line]) {
            text.push_str(line);
            text.push('\n');
        }

        let schema = match text.parse::<vcf::Header>() {
            Ok(header) => Some(Schema::from_header(&header)),
            Err(e) => {
                debug!("Reading header declarations line by line, VCF header did not parse: {}", e);
                None
            }
        };

        Self { lines, schema }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether the header was read as a typed VCF header
    pub fn is_parsed(&self) -> bool {
        self.schema.is_some()
    }

    /// Sample names from the parsed header
    pub fn sample_names(&self) -> Option<&[String]> {
        self.schema.as_ref().map(|schema| schema.samples.as_slice())
    }

    /// All declarations of one kind (`INFO`, `FORMAT`, ...) in file order
    pub fn declarations(&self, kind: &str) -> Vec<Declaration> {
        if let Some(decls) = self.schema.as_ref().and_then(|schema| schema.declarations(kind)) {
            return decls.to_vec();
        }
        self.lines
            .iter()
            .filter_map(|line| Declaration::parse(line))
            .filter(|decl| decl.kind == kind)
            .collect()
    }

    fn declares(&self, kind: &str, id: &str) -> bool {
        match self.schema.as_ref().and_then(|schema| schema.declarations(kind)) {
            Some(decls) => decls.iter().any(|decl| decl.id == id),
            None => self
                .lines
                .iter()
                .filter_map(|line| Declaration::parse(line))
                .any(|decl| decl.kind == kind && decl.id == id),
        }
    }

    /// Original lines followed by `additions`, each addition exactly once.
    ///
    /// Original declarations sharing a kind and ID with an addition are dropped
    /// and returned separately so the caller can report them.
    pub fn merge<'a, S: AsRef<str>>(&'a self, additions: &'a [S]) -> (Vec<&'a str>, Vec<&'a str>) {
        let mut seen = HashSet::new();
        let additions: Vec<&str> = additions
            .iter()
            .map(|line| AsRef::<str>::as_ref(line))
            .filter(|line| seen.insert(*line))
            .collect();

        let replaced: HashSet<(String, String)> = additions
            .iter()
            .filter_map(|line| Declaration::parse(line))
            .filter(|decl| self.declares(&decl.kind, &decl.id))
            .map(|decl| (decl.kind, decl.id))
            .collect();

        let mut kept = Vec::with_capacity(self.lines.len() + additions.len());
        let mut dropped = Vec::new();
        for line in &self.lines {
            let stale = !replaced.is_empty()
                && Declaration::parse(line)
                    .map(|decl| replaced.contains(&(decl.kind, decl.id)))
                    .unwrap_or(false);
            if stale {
                dropped.push(line.as_str());
            } else {
                kept.push(line.as_str());
            }
        }
        kept.extend(additions);

        (kept, dropped)
    }
}
