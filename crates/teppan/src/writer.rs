//! # Result Writer
//!
//! Serializes correlated records to a two-column `id,result` table, one row
//! per record, in the order given.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use csv::WriterBuilder;
use tracing::debug;
use crate::constant::{ID_COLUMN, RESULT_COLUMN};
use crate::correlate::OutputRecord;
use crate::error::WriteError;
use crate::row::CsvConfig;

/// Create (or truncate) `path` and write `records` to it.
pub fn write_results(
    path: impl AsRef<Path>,
    records: &[OutputRecord],
    cfg: &CsvConfig,
) -> Result<(), WriteError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| WriteError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    write_records(file, records, cfg)?;
    debug!(path = %path.display(), records = records.len(), "wrote output table");
    Ok(())
}

/// Write the header and `records` to any writer.
///
/// The header is always written, so an empty run still yields a valid table.
pub fn write_records<W: Write>(
    writer: W,
    records: &[OutputRecord],
    cfg: &CsvConfig,
) -> Result<(), WriteError> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .delimiter(cfg.delimiter)
        .from_writer(writer);
    wtr.write_record([ID_COLUMN, RESULT_COLUMN])?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}
