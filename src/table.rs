//! TABLE/SPREADSHEET/HISTOGRAM/ARRAY decoding.
//!
//! Binary tables decode record by record against a resolved [`TableSchema`]:
//! each field is cut from its absolute byte range and interpreted per its
//! element type. ASCII tables go through a parse cascade: the label's declared
//! delimiter first, then whitespace, then fixed-width column positions, then a
//! ragged last-ditch split.

use std::path::Path;
use std::sync::OnceLock;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use regex::Regex;
use thiserror::Error;

use crate::array::DataArray;
use crate::bits::{byte_string_to_bits, splice_bits};
use crate::dtypes::{resolve_sample_type, DtypeError, Dtype, ElementType, Endian};
use crate::label::LabelBlock;
use crate::position::TableProperties;
use crate::schema::{
    axis_items, parse_array_structure, ArrayStructure, FieldSchema, FormatLoader, SchemaError,
    TableSchema,
};
use crate::stream;

/// Characters stripped from both ends of every ASCII table element.
const PAD_CHARACTERS: &[char] = &[' ', '\t', '"', ','];

#[derive(Debug, Error)]
pub enum TableError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Dtype(#[from] DtypeError),
    #[error("unknown FIELD_DELIMITER: {0}")]
    UnknownFieldDelimiter(String),
    #[error("table data ends before its declared extent ({got} of {want} bytes)")]
    ShortRead { want: usize, got: usize },
    #[error("array data does not fit its declared axes: {0}")]
    BadArrayShape(String),
    #[error("a binary read requires a binary schema")]
    NotBinary,
}

/// One decoded column. Bit-string columns carry the names of their expanded
/// bit fields alongside the per-row field values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
    pub bit_field_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Text(Vec<String>),
    /// Per-row spliced bit fields of a bit-string column.
    Bits(Vec<Vec<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::U8(v) => v.len(),
            ColumnData::I8(v) => v.len(),
            ColumnData::U16(v) => v.len(),
            ColumnData::I16(v) => v.len(),
            ColumnData::U32(v) => v.len(),
            ColumnData::I32(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::F32(v) => v.len(),
            ColumnData::F64(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Bits(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row value widened to `f64`, for numeric columns.
    pub fn numeric_at(&self, row: usize) -> Option<f64> {
        match self {
            ColumnData::U8(v) => v.get(row).map(|&x| x as f64),
            ColumnData::I8(v) => v.get(row).map(|&x| x as f64),
            ColumnData::U16(v) => v.get(row).map(|&x| x as f64),
            ColumnData::I16(v) => v.get(row).map(|&x| x as f64),
            ColumnData::U32(v) => v.get(row).map(|&x| x as f64),
            ColumnData::I32(v) => v.get(row).map(|&x| x as f64),
            ColumnData::I64(v) => v.get(row).map(|&x| x as f64),
            ColumnData::F32(v) => v.get(row).map(|&x| x as f64),
            ColumnData::F64(v) => v.get(row).copied(),
            _ => None,
        }
    }

    pub fn text_at(&self, row: usize) -> Option<&str> {
        match self {
            ColumnData::Text(v) => v.get(row).map(String::as_str),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Decoded form of an ARRAY object: a plain numeric array, or a table of
/// records when the array's subobject declares structure.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayObject {
    Numeric(DataArray),
    Records(Table),
}

/// Decode a fixed-width binary table. `rows` defaults to 1 when the label
/// declares no row count, matching single-record objects like histograms.
pub fn read_binary_table(
    path: &Path,
    schema: &TableSchema,
    rows: Option<usize>,
    start_byte: u64,
) -> Result<Table, TableError> {
    let record_bytes = schema.record_bytes().ok_or(TableError::NotBinary)?;
    let rows = rows.unwrap_or(1);
    let want = rows * record_bytes;
    let raw = stream::read_range(path, start_byte, Some(want as u64))?;
    if raw.len() < want {
        if record_bytes == 0 || raw.len() / record_bytes == 0 {
            return Err(TableError::ShortRead {
                want,
                got: raw.len(),
            });
        }
        log::warn!(
            "table data ends early: {} of {} declared rows present",
            raw.len() / record_bytes,
            rows
        );
    }
    let nrows = if record_bytes == 0 {
        0
    } else {
        (raw.len() / record_bytes).min(rows)
    };
    let mut table = Table::default();
    for field in &schema.fields {
        if field.is_placeholder() || matches!(field.element, Some(ElementType::Void { .. })) {
            continue;
        }
        let column = decode_binary_column(&raw, record_bytes, nrows, field)?;
        table.columns.push(apply_field_scaling(column, field));
    }
    Ok(table)
}

fn decode_binary_column(
    raw: &[u8],
    record_bytes: usize,
    nrows: usize,
    field: &FieldSchema,
) -> Result<Column, TableError> {
    let element = field
        .element
        .clone()
        .ok_or(SchemaError::Underspecified)?;
    let offset = field.offset.ok_or(SchemaError::Underspecified)?;
    let width = element.bytes();
    let cell = |row: usize| &raw[row * record_bytes + offset..row * record_bytes + offset + width];
    let data = match element {
        ElementType::Int {
            bytes,
            signed,
            order,
        } => decode_int_column(raw, record_bytes, nrows, offset, bytes, signed, order),
        ElementType::Float { bytes: 4, order } => ColumnData::F32(
            (0..nrows)
                .map(|r| read_ordered_u32(cell(r), order))
                .map(f32::from_bits)
                .collect(),
        ),
        ElementType::Float { order, .. } => ColumnData::F64(
            (0..nrows)
                .map(|r| read_ordered_u64(cell(r), order))
                .map(f64::from_bits)
                .collect(),
        ),
        ElementType::IbmReal { bytes: 4, order } => {
            let converted: Vec<f64> = (0..nrows)
                .map(|r| ibm32_to_f64(read_ordered_u32(cell(r), order)))
                .collect();
            narrow_ibm_shorts(converted)
        }
        ElementType::IbmReal { order, .. } => ColumnData::F64(
            (0..nrows)
                .map(|r| ibm64_to_f64(read_ordered_u64(cell(r), order)))
                .collect(),
        ),
        ElementType::Text { .. } => ColumnData::Text(
            (0..nrows)
                .map(|r| decode_text(cell(r), &field.data_type))
                .collect(),
        ),
        ElementType::BitString { order, .. } => {
            if field.bit_fields.is_empty() {
                ColumnData::Text(
                    (0..nrows)
                        .map(|r| byte_string_to_bits(cell(r), order))
                        .collect(),
                )
            } else {
                ColumnData::Bits(
                    (0..nrows)
                        .map(|r| {
                            splice_bits(&byte_string_to_bits(cell(r), order), &field.bit_fields)
                        })
                        .collect(),
                )
            }
        }
        ElementType::Bool => ColumnData::Bool((0..nrows).map(|r| cell(r)[0] != 0).collect()),
        ElementType::VaxReal => return Err(DtypeError::VaxRealInTable.into()),
        ElementType::Void { .. } => ColumnData::Text(vec![String::new(); nrows]),
    };
    Ok(Column {
        name: field.name.clone(),
        data,
        bit_field_names: field.bit_fields.iter().map(|f| f.name.clone()).collect(),
    })
}

fn decode_int_column(
    raw: &[u8],
    record_bytes: usize,
    nrows: usize,
    offset: usize,
    bytes: usize,
    signed: bool,
    order: Endian,
) -> ColumnData {
    let cell = |row: usize| &raw[row * record_bytes + offset..row * record_bytes + offset + bytes];
    let rows = 0..nrows;
    match (bytes, signed, order) {
        (1, false, _) => ColumnData::U8(rows.map(|r| cell(r)[0]).collect()),
        (1, true, _) => ColumnData::I8(rows.map(|r| cell(r)[0] as i8).collect()),
        (2, false, Endian::Big) => {
            ColumnData::U16(rows.map(|r| BigEndian::read_u16(cell(r))).collect())
        }
        (2, false, Endian::Little) => {
            ColumnData::U16(rows.map(|r| LittleEndian::read_u16(cell(r))).collect())
        }
        (2, true, Endian::Big) => {
            ColumnData::I16(rows.map(|r| BigEndian::read_i16(cell(r))).collect())
        }
        (2, true, Endian::Little) => {
            ColumnData::I16(rows.map(|r| LittleEndian::read_i16(cell(r))).collect())
        }
        (4, false, Endian::Big) => {
            ColumnData::U32(rows.map(|r| BigEndian::read_u32(cell(r))).collect())
        }
        (4, false, Endian::Little) => {
            ColumnData::U32(rows.map(|r| LittleEndian::read_u32(cell(r))).collect())
        }
        (4, true, Endian::Big) => {
            ColumnData::I32(rows.map(|r| BigEndian::read_i32(cell(r))).collect())
        }
        (4, true, Endian::Little) => {
            ColumnData::I32(rows.map(|r| LittleEndian::read_i32(cell(r))).collect())
        }
        // 8-byte integers of either signedness decode to i64
        (_, _, order) => {
            ColumnData::I64(rows.map(|r| read_ordered_u64(cell(r), order) as i64).collect())
        }
    }
}

fn read_ordered_u32(buf: &[u8], order: Endian) -> u32 {
    match order {
        Endian::Big => BigEndian::read_u32(buf),
        Endian::Little => LittleEndian::read_u32(buf),
    }
}

fn read_ordered_u64(buf: &[u8], order: Endian) -> u64 {
    match order {
        Endian::Big => BigEndian::read_u64(buf),
        Endian::Little => LittleEndian::read_u64(buf),
    }
}

/// Unpack an IBM System/360 short real (as a 32-bit word) to `f64`.
fn ibm32_to_f64(ibm: u32) -> f64 {
    let sign = 1.0 - 2.0 * ((ibm >> 31 & 1) as f64);
    let exponent = ((ibm >> 24) & 0x7f) as f64;
    let mantissa = (ibm & 0x00ff_ffff) as f64 / (1u64 << 24) as f64;
    sign * mantissa * 16f64.powf(exponent - 64.0)
}

/// Unpack an IBM System/360 long real (as a 64-bit word) to `f64`.
fn ibm64_to_f64(ibm: u64) -> f64 {
    let sign = 1.0 - 2.0 * ((ibm >> 63 & 1) as f64);
    let exponent = ((ibm >> 56) & 0x7f) as f64;
    let mantissa = (ibm & 0x00ff_ffff_ffff_ffff) as f64 / (1u64 << 56) as f64;
    sign * mantissa * 16f64.powf(exponent - 64.0)
}

/// IBM shorts span a wider range than IEEE singles. Narrow a converted column
/// back to `f32` only when its magnitudes survive the round trip.
fn narrow_ibm_shorts(converted: Vec<f64>) -> ColumnData {
    let big = converted.iter().any(|v| v.abs() > f32::MAX as f64);
    let small = converted
        .iter()
        .map(|v| v.abs())
        .filter(|&a| a > 0.0)
        .any(|a| a < 1e-44);
    if big || small {
        ColumnData::F64(converted)
    } else {
        ColumnData::F32(converted.into_iter().map(|v| v as f32).collect())
    }
}

fn decode_text(bytes: &[u8], data_type: &str) -> String {
    let text = if data_type.contains("EBCDIC") {
        bytes.iter().map(|&b| ebcdic_char(b)).collect::<String>()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };
    text.trim_matches(PAD_CHARACTERS).to_string()
}

/// Decode one byte of the invariant EBCDIC subset (letters, digits, common
/// punctuation, identical across code pages 037 and 500).
fn ebcdic_char(b: u8) -> char {
    match b {
        0x40 => ' ',
        0x4B => '.',
        0x4C => '<',
        0x4D => '(',
        0x4E => '+',
        0x50 => '&',
        0x5A => '!',
        0x5B => '$',
        0x5C => '*',
        0x5D => ')',
        0x5E => ';',
        0x60 => '-',
        0x61 => '/',
        0x6B => ',',
        0x6C => '%',
        0x6D => '_',
        0x6E => '>',
        0x6F => '?',
        0x7A => ':',
        0x7B => '#',
        0x7C => '@',
        0x7D => '\'',
        0x7E => '=',
        0x7F => '"',
        0x81..=0x89 => (b - 0x81 + b'a') as char,
        0x91..=0x99 => (b - 0x91 + b'j') as char,
        0xA2..=0xA9 => (b - 0xA2 + b's') as char,
        0xC1..=0xC9 => (b - 0xC1 + b'A') as char,
        0xD1..=0xD9 => (b - 0xD1 + b'J') as char,
        0xE2..=0xE9 => (b - 0xE2 + b'S') as char,
        0xF0..=0xF9 => (b - 0xF0 + b'0') as char,
        _ => '\u{FFFD}',
    }
}

/// Apply a field's declared SCALING_FACTOR/OFFSET. Scaled numeric columns
/// promote to `f64`.
fn apply_field_scaling(column: Column, field: &FieldSchema) -> Column {
    let factor = field.scaling_factor.unwrap_or(1.0);
    let offset = field.value_offset.unwrap_or(0.0);
    if factor == 1.0 && offset == 0.0 {
        return column;
    }
    let n = column.data.len();
    let scaled: Option<Vec<f64>> = (0..n)
        .map(|r| column.data.numeric_at(r).map(|x| x * factor + offset))
        .collect();
    match scaled {
        Some(values) => Column {
            data: ColumnData::F64(values),
            ..column
        },
        None => column,
    }
}

/// The field delimiter an ASCII table declares, defaulting to comma.
fn check_explicit_delimiter(block: &LabelBlock) -> Result<char, TableError> {
    match block.get_str("FIELD_DELIMITER") {
        None => Ok(','),
        Some("COMMA") => Ok(','),
        Some("VERTICAL_BAR") => Ok('|'),
        Some("SEMICOLON") => Ok(';'),
        Some("TAB") => Ok('\t'),
        Some(other) => Err(TableError::UnknownFieldDelimiter(other.to_string())),
    }
}

/// Decode an ASCII table through the parse cascade.
pub fn read_ascii_table(
    path: &Path,
    schema: &TableSchema,
    block: &LabelBlock,
    props: &TableProperties,
) -> Result<Table, TableError> {
    let text = load_ascii_text(path, props)?;
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    let fields: Vec<&FieldSchema> = schema
        .fields
        .iter()
        .filter(|f| !f.is_placeholder())
        .collect();
    let sep = check_explicit_delimiter(block)?;
    let cells = try_delimited(&lines, sep, fields.len())
        .or_else(|| try_whitespace(&lines, fields.len()))
        .or_else(|| try_fixed_width(&lines, &fields))
        .unwrap_or_else(|| {
            log::warn!("no parse strategy matched this ASCII table; splitting raggedly");
            ragged_whitespace(&lines, fields.len())
        });
    let mut table = Table::default();
    for (ix, field) in fields.iter().enumerate() {
        let raw: Vec<&str> = cells.iter().map(|row| row[ix].as_str()).collect();
        let column = Column {
            name: field.name.clone(),
            data: type_ascii_column(&raw),
            bit_field_names: Vec::new(),
        };
        table.columns.push(apply_field_scaling(column, field));
    }
    Ok(table)
}

fn load_ascii_text(path: &Path, props: &TableProperties) -> Result<String, TableError> {
    if props.as_rows {
        let text = String::from_utf8_lossy(&stream::read_range(path, 0, None)?).into_owned();
        let start = props.start.max(0) as usize;
        let lines = text.lines().skip(start);
        let selected: Vec<&str> = match props.length {
            Some(n) => lines.take(n.max(0) as usize).collect(),
            None => lines.collect(),
        };
        Ok(selected.join("\r\n"))
    } else {
        let raw = stream::read_range(
            path,
            props.start.max(0) as u64,
            props.length.map(|n| n.max(0) as u64),
        )?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

fn strip_pad(cell: &str) -> String {
    cell.trim_matches(PAD_CHARACTERS).to_string()
}

/// Split every line at a delimiter; accepted only if each line yields exactly
/// the expected field count.
fn try_delimited(lines: &[&str], sep: char, expected: usize) -> Option<Vec<Vec<String>>> {
    let rows: Vec<Vec<String>> = lines
        .iter()
        .map(|line| line.split(sep).map(strip_pad).collect())
        .collect();
    rows.iter().all(|r| r.len() == expected).then_some(rows)
}

fn try_whitespace(lines: &[&str], expected: usize) -> Option<Vec<Vec<String>>> {
    let rows: Vec<Vec<String>> = lines
        .iter()
        .map(|line| line.split_whitespace().map(strip_pad).collect())
        .collect();
    rows.iter().all(|r| r.len() == expected).then_some(rows)
}

/// Cut fields at the byte positions the format definition declares. Only
/// usable when every field carries a position.
fn try_fixed_width(lines: &[&str], fields: &[&FieldSchema]) -> Option<Vec<Vec<String>>> {
    let colspecs: Option<Vec<(usize, usize)>> = fields
        .iter()
        .map(|f| Some((f.offset?, f.offset? + f.bytes?)))
        .collect();
    let colspecs = colspecs?;
    let rows = lines
        .iter()
        .map(|line| {
            colspecs
                .iter()
                .map(|&(start, end)| {
                    let start = start.min(line.len());
                    let end = end.min(line.len());
                    strip_pad(&line[start..end])
                })
                .collect()
        })
        .collect();
    Some(rows)
}

fn ragged_whitespace(lines: &[&str], expected: usize) -> Vec<Vec<String>> {
    lines
        .iter()
        .map(|line| {
            let mut row: Vec<String> = line.split_whitespace().map(strip_pad).collect();
            row.resize(expected, String::new());
            row
        })
        .collect()
}

/// Give an ASCII column the narrowest type that parses every cell: integer,
/// then float, then text.
fn type_ascii_column(raw: &[&str]) -> ColumnData {
    if let Ok(ints) = raw.iter().map(|c| c.parse::<i64>()).collect() {
        return ColumnData::I64(ints);
    }
    if let Ok(floats) = raw.iter().map(|c| c.parse::<f64>()).collect() {
        return ColumnData::F64(floats);
    }
    ColumnData::Text(raw.iter().map(|c| c.to_string()).collect())
}

/// Decode an ARRAY object: binary arrays element by element, ASCII arrays by
/// extracting every number in the file region.
pub fn read_array(
    path: &Path,
    name: &str,
    block: &LabelBlock,
    loader: &dyn FormatLoader,
    start_byte: u64,
) -> Result<ArrayObject, TableError> {
    let axes = axis_items(block);
    let count: usize = axes.iter().product();
    match parse_array_structure(name, block, loader)? {
        ArrayStructure::Ascii => {
            let data = read_ascii_array(path, block, &axes, start_byte)?;
            Ok(ArrayObject::Numeric(data))
        }
        ArrayStructure::Primitive(element) => {
            let data = read_primitive_array(path, &element, &axes, count, start_byte)?;
            Ok(ArrayObject::Numeric(data))
        }
        ArrayStructure::Structured(schema) => {
            let table = read_binary_table(path, &schema, Some(count.max(1)), start_byte)?;
            Ok(ArrayObject::Records(table))
        }
    }
}

fn read_primitive_array(
    path: &Path,
    element: &ElementType,
    axes: &[usize],
    count: usize,
    start_byte: u64,
) -> Result<DataArray, TableError> {
    let width = element.bytes();
    let raw = stream::read_range(path, start_byte, Some((count * width) as u64))?;
    if raw.len() < count * width {
        return Err(TableError::ShortRead {
            want: count * width,
            got: raw.len(),
        });
    }
    let flat = crate::image::decode_elements(&raw, element, count)?;
    flat.reshape(axes)
        .map_err(|e| TableError::BadArrayShape(e.to_string()))
}

fn number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[+-]?\d+\.?\d*").expect("static pattern compiles"))
}

fn read_ascii_array(
    path: &Path,
    block: &LabelBlock,
    axes: &[usize],
    start_byte: u64,
) -> Result<DataArray, TableError> {
    let text = String::from_utf8_lossy(&stream::read_range(path, start_byte, None)?).into_owned();
    let values: Vec<f64> = number_pattern()
        .find_iter(&text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    let flat = DataArray::from(ndarray::ArrayD::from_shape_vec(
        ndarray::IxDyn(&[values.len()]),
        values,
    )
    .map_err(|e| TableError::BadArrayShape(e.to_string()))?);
    let shaped = flat
        .reshape(axes)
        .map_err(|e| TableError::BadArrayShape(e.to_string()))?;
    // labels sometimes declare an integer element type for ASCII arrays
    let cast_to = match (block.get_str("DATA_TYPE"), block.get_int("BYTES")) {
        (Some(data_type), Some(bytes)) => {
            resolve_sample_type(data_type, bytes.max(0) as usize, true)
                .ok()
                .and_then(|e| e.dtype())
        }
        _ => None,
    };
    Ok(match cast_to {
        Some(dtype) if dtype != Dtype::F64 => shaped.cast(dtype),
        _ => shaped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{parse_table_structure, NoFormatFiles};
    use crate::value::{literalize, Value};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn block(pairs: &[(&str, &str)]) -> LabelBlock {
        let mut b = LabelBlock::new();
        for (k, v) in pairs {
            b.add(k.to_string(), literalize(v));
        }
        b
    }

    fn column_def(pairs: &[(&str, &str)]) -> Value {
        Value::Block(block(pairs))
    }

    fn write_temp(bytes: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().expect("temp file");
        f.write_all(bytes).expect("write");
        f
    }

    #[test]
    fn binary_table_round_trip() {
        let mut def = block(&[("INTERCHANGE_FORMAT", "BINARY"), ("ROW_BYTES", "6")]);
        def.add(
            "COLUMN".to_string(),
            column_def(&[
                ("NAME", "COUNT"),
                ("DATA_TYPE", "MSB_UNSIGNED_INTEGER"),
                ("START_BYTE", "1"),
                ("BYTES", "2"),
            ]),
        );
        def.add(
            "COLUMN".to_string(),
            column_def(&[
                ("NAME", "VALUE"),
                ("DATA_TYPE", "PC_REAL"),
                ("START_BYTE", "3"),
                ("BYTES", "4"),
            ]),
        );
        let schema = parse_table_structure("TABLE", &def, &NoFormatFiles).expect("resolves");
        let mut bytes = Vec::new();
        for (count, value) in [(7u16, 1.5f32), (300, -2.0)] {
            bytes.extend_from_slice(&count.to_be_bytes());
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let f = write_temp(&bytes);
        let table = read_binary_table(f.path(), &schema, Some(2), 0).expect("decodes");
        assert_eq!(
            table.column("COUNT").expect("column").data,
            ColumnData::U16(vec![7, 300])
        );
        assert_eq!(
            table.column("VALUE").expect("column").data,
            ColumnData::F32(vec![1.5, -2.0])
        );
    }

    #[test]
    fn booleans_and_scaling() {
        let mut def = block(&[("INTERCHANGE_FORMAT", "BINARY")]);
        def.add(
            "COLUMN".to_string(),
            column_def(&[
                ("NAME", "FLAG"),
                ("DATA_TYPE", "BOOLEAN"),
                ("START_BYTE", "1"),
                ("BYTES", "1"),
            ]),
        );
        def.add(
            "COLUMN".to_string(),
            column_def(&[
                ("NAME", "TEMP"),
                ("DATA_TYPE", "MSB_INTEGER"),
                ("START_BYTE", "2"),
                ("BYTES", "2"),
                ("SCALING_FACTOR", "0.5"),
                ("OFFSET", "100"),
            ]),
        );
        let schema = parse_table_structure("TABLE", &def, &NoFormatFiles).expect("resolves");
        let f = write_temp(&[1, 0, 10, 0, 0, 20]);
        let table = read_binary_table(f.path(), &schema, Some(2), 0).expect("decodes");
        assert_eq!(
            table.column("FLAG").expect("column").data,
            ColumnData::Bool(vec![true, false])
        );
        assert_eq!(
            table.column("TEMP").expect("column").data,
            ColumnData::F64(vec![105.0, 110.0])
        );
    }

    #[test]
    fn ibm_short_reals_convert() {
        // 0x41100000 is 1.0 in IBM S/360 short format
        assert_eq!(ibm32_to_f64(0x4110_0000), 1.0);
        assert_eq!(ibm32_to_f64(0xC110_0000), -1.0);
        assert_eq!(ibm64_to_f64(0x4110_0000_0000_0000), 1.0);
        match narrow_ibm_shorts(vec![1.0, -1.0]) {
            ColumnData::F32(v) => assert_eq!(v, vec![1.0, -1.0]),
            other => panic!("expected narrowing: {other:?}"),
        }
        match narrow_ibm_shorts(vec![1e40]) {
            ColumnData::F64(v) => assert_eq!(v, vec![1e40]),
            other => panic!("expected f64: {other:?}"),
        }
    }

    #[test]
    fn bit_strings_expand() {
        let mut bit_string = block(&[
            ("NAME", "FLAGS"),
            ("DATA_TYPE", "MSB_BIT_STRING"),
            ("START_BYTE", "1"),
            ("BYTES", "2"),
        ]);
        bit_string.add(
            "BIT_COLUMN".to_string(),
            column_def(&[
                ("NAME", "MODE"),
                ("BIT_DATA_TYPE", "MSB_UNSIGNED_INTEGER"),
                ("START_BIT", "1"),
                ("BITS", "3"),
            ]),
        );
        bit_string.add(
            "BIT_COLUMN".to_string(),
            column_def(&[
                ("NAME", "GAIN"),
                ("BIT_DATA_TYPE", "MSB_UNSIGNED_INTEGER"),
                ("START_BIT", "4"),
                ("BITS", "13"),
            ]),
        );
        let mut def = block(&[("INTERCHANGE_FORMAT", "BINARY")]);
        def.add("COLUMN".to_string(), Value::Block(bit_string));
        let schema = parse_table_structure("TABLE", &def, &NoFormatFiles).expect("resolves");
        let f = write_temp(&[0b1010_0111, 0b0011_1100]);
        let table = read_binary_table(f.path(), &schema, Some(1), 0).expect("decodes");
        let flags = table.column("FLAGS").expect("column");
        assert_eq!(flags.bit_field_names, vec!["MODE", "GAIN"]);
        assert_eq!(
            flags.data,
            ColumnData::Bits(vec![vec!["101".to_string(), "0011100111100".to_string()]])
        );
    }

    #[test]
    fn ascii_delimited_cascade() {
        let mut def = block(&[("INTERCHANGE_FORMAT", "ASCII")]);
        for name in ["A", "B", "C"] {
            def.add(
                "COLUMN".to_string(),
                column_def(&[("NAME", name), ("DATA_TYPE", "ASCII_REAL")]),
            );
        }
        let schema = parse_table_structure("TABLE", &def, &NoFormatFiles).expect("resolves");
        let f = write_temp(b"1, 2.5, \"x\"\r\n3, 4.5, \"y\"\r\n");
        let props = TableProperties {
            start: 0,
            length: None,
            as_rows: false,
        };
        let table = read_ascii_table(f.path(), &schema, &def, &props).expect("parses");
        assert_eq!(
            table.column("A").expect("column").data,
            ColumnData::I64(vec![1, 3])
        );
        assert_eq!(
            table.column("B").expect("column").data,
            ColumnData::F64(vec![2.5, 4.5])
        );
        assert_eq!(
            table.column("C").expect("column").data,
            ColumnData::Text(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn ascii_whitespace_fallback() {
        let mut def = block(&[("INTERCHANGE_FORMAT", "ASCII")]);
        for name in ["A", "B"] {
            def.add(
                "COLUMN".to_string(),
                column_def(&[("NAME", name), ("DATA_TYPE", "ASCII_INTEGER")]),
            );
        }
        let schema = parse_table_structure("TABLE", &def, &NoFormatFiles).expect("resolves");
        let f = write_temp(b"1 2\n3 4\n");
        let props = TableProperties {
            start: 0,
            length: None,
            as_rows: true,
        };
        let table = read_ascii_table(f.path(), &schema, &def, &props).expect("parses");
        assert_eq!(
            table.column("B").expect("column").data,
            ColumnData::I64(vec![2, 4])
        );
    }

    #[test]
    fn primitive_binary_array() {
        let def = block(&[
            ("INTERCHANGE_FORMAT", "BINARY"),
            ("DATA_TYPE", "MSB_INTEGER"),
            ("BYTES", "2"),
            ("AXIS_ITEMS", "(2, 3)"),
        ]);
        let mut bytes = Vec::new();
        for v in [1i16, 2, 3, 4, 5, 6] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        let f = write_temp(&bytes);
        let decoded = read_array(f.path(), "ARRAY", &def, &NoFormatFiles, 0).expect("decodes");
        let ArrayObject::Numeric(data) = decoded else {
            panic!("expected numeric array");
        };
        assert_eq!(data.shape(), &[2, 3]);
        assert_eq!(data.iter_f64().last(), Some(6.0));
    }

    #[test]
    fn ascii_array_extracts_numbers() {
        let def = block(&[("AXIS_ITEMS", "(2, 2)")]);
        let f = write_temp(b"1.5 -2.0\n3.25 4\n");
        let decoded = read_array(f.path(), "ARRAY", &def, &NoFormatFiles, 0).expect("decodes");
        let ArrayObject::Numeric(data) = decoded else {
            panic!("expected numeric array");
        };
        assert_eq!(data.shape(), &[2, 2]);
        let flat: Vec<f64> = data.iter_f64().collect();
        assert_eq!(flat, vec![1.5, -2.0, 3.25, 4.0]);
    }
}
