//! Physical position resolution: where in the file an object's data lives.
//!
//! Pointer parameters take several shapes: a bare record number, a byte
//! quantity, a filename, or a `(filename, offset)` tuple. Record numbers and
//! byte quantities are 1-indexed. When a label gives table extent as rows but
//! never says where the table starts, the start is guessed by counting back
//! from the end of the file.

use std::path::Path;
use thiserror::Error;

use crate::label::LabelBlock;
use crate::overrides::Identifiers;
use crate::stream;
use crate::value::Value;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown data pointer format: {0}")]
    UnknownPointer(String),
    #[error("pointer gives start in records but record size is unknown")]
    UnknownRecordSize,
}

/// Physical extent of a table. When `as_rows` is true the table is a
/// delimited ASCII stream and `start`/`length` count rows; otherwise they
/// count bytes. `length` of `None` means the object runs to end of file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableProperties {
    pub start: i64,
    pub length: Option<i64>,
    pub as_rows: bool,
}

/// The filename cited by a pointer value, if any.
pub fn pointer_filename(target: &Value) -> Option<&str> {
    match target {
        Value::Text(name) => Some(name),
        Value::Sequence(items) => items.first().and_then(Value::as_str),
        _ => None,
    }
}

/// The positional part of a pointer value: the last element of a tuple,
/// otherwise the value itself.
fn positional_part(target: &Value) -> &Value {
    match target {
        Value::Sequence(items) => items.last().unwrap_or(target),
        other => other,
    }
}

/// First byte of an object's data, resolved from its pointer value.
///
/// Integers are 1-indexed record numbers; quantities in BYTES are 1-indexed
/// byte positions; other quantity units are treated as records; a bare
/// filename means the object starts at byte 0. An integer pointer with no
/// known record size falls back to counting the declared table extent back
/// from the end of the file.
pub fn data_start_byte(
    identifiers: &Identifiers,
    block: Option<&LabelBlock>,
    target: &Value,
    path: &Path,
) -> Result<i64, PositionError> {
    let record_bytes = block
        .and_then(|b| b.get_int("RECORD_BYTES"))
        .or(identifiers.record_bytes);
    match positional_part(target) {
        Value::Integer(t) => match record_bytes {
            Some(rb) => Ok(rb * (t - 1).max(0)),
            None => {
                let (Some(rows), Some(row_bytes)) = (identifiers.rows, identifiers.row_bytes)
                else {
                    return Err(PositionError::UnknownRecordSize);
                };
                count_from_bottom_of_file(path, rows, row_bytes)
            }
        },
        Value::Quantity(q) => {
            let value = q
                .value
                .as_int()
                .ok_or_else(|| PositionError::UnknownPointer(format!("{target:?}")))?;
            if q.units == "BYTES" {
                Ok(value - 1)
            } else if let Some(rb) = record_bytes {
                Ok(rb * (value - 1).max(0))
            } else {
                Err(PositionError::UnknownRecordSize)
            }
        }
        Value::Text(_) => Ok(0),
        other => Err(PositionError::UnknownPointer(format!("{other:?}"))),
    }
}

/// Guess a table's start byte by subtracting its declared size from the
/// physical size of the file. Usually right, not guaranteed.
fn count_from_bottom_of_file(
    path: &Path,
    rows: i64,
    row_bytes: i64,
) -> Result<i64, PositionError> {
    let size = stream::content_size(path)? as i64;
    Ok(size - rows * row_bytes)
}

/// Does this object look like a delimited ASCII stream with no explicit row
/// byte length? If so, positions are expressed in rows, not bytes.
fn check_delimiter_stream(identifiers: &Identifiers, name: &str, target: &Value) -> bool {
    if let Value::Quantity(q) = positional_part(target) {
        if q.units == "BYTES" {
            return false;
        }
    }
    if identifiers.record_bytes.is_some() {
        return false;
    }
    if identifiers.record_type.as_deref() != Some("STREAM") {
        return false;
    }
    ["ASCII", "SPREADSHEET", "HEADER"]
        .iter()
        .any(|t| name.contains(t))
}

/// Row or byte count of 'records' declared in a block, whichever exists.
fn extract_table_records(block: &LabelBlock) -> Option<i64> {
    block.get_int("RECORDS").or_else(|| block.get_int("ROWS"))
}

/// Start row and row count for a delimited ASCII table. The second tuple
/// element of the pointer, when present, is a 1-indexed start row.
fn table_row_position(n_records: Option<i64>, target: &Value) -> (Option<i64>, i64) {
    let start = match target {
        Value::Sequence(items) if items.len() > 1 => match &items[1] {
            Value::Quantity(q) => q.value.as_int().map(|v| v - 1).unwrap_or(0),
            Value::Integer(t) => t - 1,
            // a second element that is not a position: start at the top
            _ => 0,
        },
        _ => 0,
    };
    (n_records, start)
}

/// Byte length of a table, from an explicit BYTES parameter or a record
/// length times the record count. `None` when neither is determinable.
fn table_length(
    block: &LabelBlock,
    identifiers: &Identifiers,
    n_records: Option<i64>,
) -> Option<i64> {
    if let Some(bytes) = block.get_int("BYTES") {
        return Some(bytes);
    }
    let n = n_records?;
    let record_length = block.get_int("RECORD_BYTES").or_else(|| {
        block
            .get_int("ROW_BYTES")
            .map(|rb| rb + block.get_int("ROW_SUFFIX_BYTES").unwrap_or(0))
    });
    record_length
        .or(identifiers.record_bytes)
        .map(|len| len * n)
}

/// Physical position of a TABLE/SPREADSHEET/HISTOGRAM object.
pub fn table_position(
    identifiers: &Identifiers,
    block: &LabelBlock,
    target: &Value,
    name: &str,
    start_byte: i64,
) -> TableProperties {
    let n_records = extract_table_records(block);
    if check_delimiter_stream(identifiers, name, target) {
        let (length, start) = table_row_position(n_records, target);
        TableProperties {
            start,
            length,
            as_rows: true,
        }
    } else {
        TableProperties {
            start: start_byte,
            length: table_length(block, identifiers, n_records),
            as_rows: false,
        }
    }
}
