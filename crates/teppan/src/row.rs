//! # Row Loader
//!
//! Reads the input table into an ordered list of [`RowRecord`]s. The table
//! must carry an `id` column plus every column the instruction template
//! interpolates; any other columns are kept on the record untouched.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use csv::ReaderBuilder;
use tracing::debug;
use crate::constant::{ID_COLUMN, TEMPLATE_FIELDS};
use crate::error::LoadError;

/// One input row: a caller-supplied identifier and its named text fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRecord {
    id: String,
    fields: BTreeMap<String, String>,
}

impl RowRecord {
    pub fn new<I, K, V>(id: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: id.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Look up a named field; the identifier is not a field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Parser configuration for the input table.
#[derive(Clone, Debug)]
pub struct CsvConfig {
    /// Field delimiter (default: b',').
    pub delimiter: u8,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

/// Load every row of the table at `path`, in file order.
pub fn load_rows(path: impl AsRef<Path>, cfg: &CsvConfig) -> Result<Vec<RowRecord>, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let rows = read_rows(file, cfg)?;
    debug!(path = %path.display(), rows = rows.len(), "loaded input table");
    Ok(rows)
}

/// Parse rows from any reader. The first record must be the header.
pub fn read_rows<R: Read>(reader: R, cfg: &CsvConfig) -> Result<Vec<RowRecord>, LoadError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(cfg.delimiter)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut names = HashSet::new();
    if let Some(repeated) = headers.iter().find(|h| !names.insert(*h)) {
        return Err(LoadError::DuplicateColumn(repeated.to_string()));
    }
    let id_idx = headers
        .iter()
        .position(|h| h == ID_COLUMN)
        .ok_or_else(|| LoadError::MissingColumn(ID_COLUMN.to_string()))?;
    if let Some(missing) = TEMPLATE_FIELDS
        .iter()
        .find(|field| !headers.iter().any(|h| h == **field))
    {
        return Err(LoadError::MissingColumn(missing.to_string()));
    }

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let id = record.get(id_idx).unwrap_or_default();
        if id.is_empty() {
            return Err(LoadError::EmptyId { line });
        }
        if !seen.insert(id.to_string()) {
            return Err(LoadError::DuplicateId { id: id.to_string(), line });
        }

        let fields = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(idx, _)| *idx != id_idx)
            .map(|(_, (name, value))| (name, value));
        rows.push(RowRecord::new(id, fields));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "id,architecture,code,performance,task\n";

    #[test]
    fn test_read_rows_in_order() {
        let data = format!(
            "{HEADER}r1,x86,\"for i in 0..n {{}}\",slow,Explain\nr2,arm,\"fn main() {{}}\",fast,Optimize\n"
        );
        let rows = read_rows(data.as_bytes(), &CsvConfig::default()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id(), "r1");
        assert_eq!(rows[0].field("architecture"), Some("x86"));
        assert_eq!(rows[0].field("code"), Some("for i in 0..n {}"));
        assert_eq!(rows[1].id(), "r2");
        assert_eq!(rows[1].field("task"), Some("Optimize"));
        // id is carried separately, never as a field
        assert_eq!(rows[0].field("id"), None);
    }

    #[test]
    fn test_multiline_quoted_code() {
        let data = format!("{HEADER}a,gpu,\"line one\nline two\",ok,Review\n");
        let rows = read_rows(data.as_bytes(), &CsvConfig::default()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].field("code"), Some("line one\nline two"));
    }

    #[test]
    fn test_extra_columns_are_kept() {
        let data = "task,id,notes,architecture,code,performance\nExplain,a,misc,x86,c,p\n";
        let rows = read_rows(data.as_bytes(), &CsvConfig::default()).unwrap();

        assert_eq!(rows[0].id(), "a");
        assert_eq!(rows[0].field("notes"), Some("misc"));
        assert_eq!(rows[0].field("task"), Some("Explain"));
    }

    #[test]
    fn test_missing_column() {
        let data = "id,architecture,code,task\na,x86,c,t\n";
        let err = read_rows(data.as_bytes(), &CsvConfig::default()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn(ref c) if c == "performance"));

        let data = "architecture,code,performance,task\nx86,c,p,t\n";
        let err = read_rows(data.as_bytes(), &CsvConfig::default()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn(ref c) if c == "id"));
    }

    #[test]
    fn test_empty_input_is_missing_columns() {
        let err = read_rows("".as_bytes(), &CsvConfig::default()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn(_)));
    }

    #[test]
    fn test_header_only_yields_no_rows() {
        let rows = read_rows(HEADER.as_bytes(), &CsvConfig::default()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_duplicate_and_empty_ids() {
        let data = format!("{HEADER}a,x,c,p,t\na,y,c,p,t\n");
        let err = read_rows(data.as_bytes(), &CsvConfig::default()).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateId { ref id, line: 3 } if id == "a"));

        let data = format!("{HEADER},x,c,p,t\n");
        let err = read_rows(data.as_bytes(), &CsvConfig::default()).unwrap_err();
        assert!(matches!(err, LoadError::EmptyId { line: 2 }));
    }

    #[test]
    fn test_repeated_header_is_rejected() {
        let data = "id,architecture,code,performance,task,task\na,x,c,p,t1,t2\n";
        let err = read_rows(data.as_bytes(), &CsvConfig::default()).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateColumn(ref c) if c == "task"));

        let data = "id,architecture,code,performance,task,id\na,x,c,p,t,b\n";
        let err = read_rows(data.as_bytes(), &CsvConfig::default()).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateColumn(ref c) if c == "id"));
    }

    #[test]
    fn test_ragged_row_is_malformed() {
        let data = format!("{HEADER}a,x,c\n");
        let err = read_rows(data.as_bytes(), &CsvConfig::default()).unwrap_err();
        assert!(matches!(err, LoadError::Csv(_)));
    }

    #[test]
    fn test_custom_delimiter() {
        let data = "id\tarchitecture\tcode\tperformance\ttask\na\tx86\tc, with comma\tp\tt\n";
        let rows = read_rows(data.as_bytes(), &CsvConfig { delimiter: b'\t' }).unwrap();
        assert_eq!(rows[0].field("code"), Some("c, with comma"));
    }

    #[test]
    fn test_load_rows_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{HEADER}a,x,c,p,t\nb,y,c,p,t\n").unwrap();

        let rows = load_rows(file.path(), &CsvConfig::default()).unwrap();
        assert_eq!(rows.iter().map(RowRecord::id).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_load_rows_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_rows(dir.path().join("absent.csv"), &CsvConfig::default()).unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }
}
