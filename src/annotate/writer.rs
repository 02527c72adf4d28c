use crate::core::header::HeaderLines;
use crate::core::record::VariantTable;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const OUTPUT_SUFFIX: &str = "_annotated.vcf";

pub fn output_path(prefix: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", prefix, OUTPUT_SUFFIX))
}

fn create_tsv_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(inner)
}

/// Write the annotated VCF to `path`.
///
/// Header lines come first (original order, then each declaration once), followed by the
/// column header and the records. The file is assembled in a temporary file next to `path`
/// and only moved into place once fully written. Returns the original declarations that
/// were replaced by `declarations`.
pub fn write_annotated<S: AsRef<str>>(
    path: &Path,
    header: &HeaderLines,
    declarations: &[S],
    table: &VariantTable,
) -> io::Result<Vec<String>> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;

    let (lines, replaced) = header.merge(declarations);
    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        for line in &lines {
            writeln!(out, "{}", line)?;
        }
        writeln!(out, "{}", table.header_line())?;

        let mut body = create_tsv_writer(out);
        for record in table.records() {
            body.write_record(record.fields())?;
        }
        body.flush()?;
    }
    tmp.as_file().sync_all()?;

    tmp.persist(path).map_err(|e| e.error)?;

    Ok(replaced.into_iter().map(str::to_string).collect())
}
