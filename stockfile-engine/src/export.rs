//! Semicolon-delimited CSV export and import
//!
//! The delimiter is escaped by substituting `,` inside text fields. This is
//! lossy: a name containing `;` comes back with `,` after an import.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::query::{parse_float, parse_int};
use crate::storage::Record;

/// First line of every exported file
pub const CSV_HEADER: &str = "id;name;quantity;price;supplier";

const DELIMITER: char = ';';
const SUBSTITUTE: char = ',';

fn escape(text: &str) -> String {
    text.replace(DELIMITER, &SUBSTITUTE.to_string())
}

/// Format one record as a CSV row, without line terminator
pub fn format_row(record: &Record) -> String {
    format!(
        "{};{};{};{:.2};{}",
        record.id,
        escape(&record.name),
        record.quantity,
        record.price,
        escape(&record.supplier)
    )
}

/// Write a header and one row per record, returning the row count
pub fn write_csv(path: &Path, records: &[Record]) -> StoreResult<usize> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{}", CSV_HEADER)?;
    for record in records {
        writeln!(out, "{}", format_row(record))?;
    }
    out.flush()?;
    Ok(records.len())
}

/// Parse one CSV line.
///
/// Returns `Ok(None)` for blank lines and the header. `line_number` is
/// 1-based and only used for error reporting.
pub fn parse_row(line: &str, line_number: usize) -> StoreResult<Option<Record>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with("id;") {
        return Ok(None);
    }

    let invalid = |reason: String| StoreError::InvalidCsv {
        line: line_number,
        reason,
    };

    let parts: Vec<&str> = line.split(DELIMITER).collect();
    if parts.len() < 5 {
        return Err(invalid(format!("expected 5 fields, found {}", parts.len())));
    }

    let id = parse_int(parts[0]).ok_or_else(|| invalid(format!("bad id {:?}", parts[0])))?;
    let quantity =
        parse_int(parts[2]).ok_or_else(|| invalid(format!("bad quantity {:?}", parts[2])))?;
    let price = parse_float(parts[3]).ok_or_else(|| invalid(format!("bad price {:?}", parts[3])))?;

    Ok(Some(Record::new(id, parts[1], quantity, price, parts[4])))
}
