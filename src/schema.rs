//! Structure resolution for TABLE/SPREADSHEET/ARRAY/HISTOGRAM objects.
//!
//! PDS3 object definitions do not state usable byte offsets directly:
//! START_BYTE values are 1-indexed and relative to the innermost enclosing
//! CONTAINER/COLLECTION, containers repeat, columns hold multiple ITEMS, and
//! whole column sets get loaded by reference from external ^STRUCTURE format
//! files. This module flattens all of that into an ordered list of
//! [`FieldSchema`]s with absolute 0-based offsets from record start.

use thiserror::Error;

use crate::bits::BitField;
use crate::dtypes::{resolve_sample_type, DtypeError, ElementType, Endian};
use crate::label::{LabelBlock, LabelError};
use crate::value::Value;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(transparent)]
    Dtype(#[from] DtypeError),
    #[error(transparent)]
    Label(#[from] LabelError),
    #[error("this table's byte sizes are underspecified")]
    Underspecified,
    #[error("unable to locate external format file: {0}")]
    MissingFormatFile(String),
    #[error("ARRAY objects may only have one subobject (this one has {0})")]
    MultipleArraySubobjects(usize),
    #[error("BIT_ELEMENTs in ARRAYs are not supported")]
    BitElementInArray,
    #[error("ASCII histograms are not supported")]
    AsciiHistogram,
    #[error("a field cannot be narrower than its declared item offset")]
    ItemOffsetTooSmall,
}

/// Source of external `^STRUCTURE` format files. The product handle
/// implements this against the filesystem; tests stub it.
pub trait FormatLoader {
    fn load_format(&self, format_file: &str) -> Result<LabelBlock, SchemaError>;
}

/// A loader for labels with no external format references.
pub struct NoFormatFiles;

impl FormatLoader for NoFormatFiles {
    fn load_format(&self, format_file: &str) -> Result<LabelBlock, SchemaError> {
        Err(SchemaError::MissingFormatFile(format_file.to_string()))
    }
}

/// One flattened field of a record. Repetition (CONTAINER REPETITIONS,
/// COLUMN ITEMS, HISTOGRAM ITEMS) has already been unrolled, so fields with
/// the same declared name are distinct entries; `reindex_names` makes the
/// names unique again.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub data_type: String,
    /// Physical element type; populated for binary tables only.
    pub element: Option<ElementType>,
    /// 0-based absolute offset from record start. `None` for delimited ASCII
    /// fields with no byte-position information.
    pub offset: Option<usize>,
    /// 1-based declared start byte, relative to the enclosing block.
    pub start_byte: Option<usize>,
    pub bytes: Option<usize>,
    pub block_name: Option<String>,
    /// Declared fields of a bit-string column, already expanded.
    pub bit_fields: Vec<BitField>,
    /// Byte order inferred from BIT_COLUMN types, when it overrides the
    /// column's own declared order.
    pub bit_order: Option<Endian>,
    pub scaling_factor: Option<f64>,
    pub value_offset: Option<f64>,
}

impl FieldSchema {
    fn void(name: String, offset: usize, bytes: usize) -> FieldSchema {
        FieldSchema {
            name,
            data_type: "VOID".to_string(),
            element: Some(ElementType::Void { bytes }),
            offset: Some(offset),
            start_byte: Some(offset + 1),
            bytes: Some(bytes),
            block_name: None,
            bit_fields: Vec::new(),
            bit_order: None,
            scaling_factor: None,
            value_offset: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name.contains("PLACEHOLDER")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableFormat {
    /// Fixed-width binary records of this many bytes (prefix and suffix
    /// padding included).
    Binary { record_bytes: usize },
    /// Character records; the ASCII decoder picks a parse strategy.
    Ascii,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub fields: Vec<FieldSchema>,
    pub format: TableFormat,
}

impl TableSchema {
    pub fn is_ascii(&self) -> bool {
        matches!(self.format, TableFormat::Ascii)
    }

    pub fn record_bytes(&self) -> Option<usize> {
        match self.format {
            TableFormat::Binary { record_bytes } => Some(record_bytes),
            TableFormat::Ascii => None,
        }
    }
}

/// Resolved structure of an ARRAY object.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayStructure {
    /// ASCII interchange format: parsed as whitespace-separated numbers.
    Ascii,
    /// No subobject: a flat array of one element type.
    Primitive(ElementType),
    /// Subobject present: decode as records and flatten.
    Structured(TableSchema),
}

/// Is this probably an ASCII table, judging by its label block and name?
pub fn looks_like_ascii(block: &LabelBlock, name: &str) -> bool {
    name.contains("SPREADSHEET")
        || name.contains("ASCII")
        || block.get_str("INTERCHANGE_FORMAT") == Some("ASCII")
}

/// AXIS_ITEMS as a dimension list (a bare integer means one axis).
pub fn axis_items(block: &LabelBlock) -> Vec<usize> {
    match block.first("AXIS_ITEMS") {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|v| v.as_int())
            .map(|v| v.max(0) as usize)
            .collect(),
        Some(v) => v.as_int().map(|n| vec![n.max(0) as usize]).unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Resolve the full record structure of a TABLE, SPREADSHEET, or HISTOGRAM.
pub fn parse_table_structure(
    name: &str,
    block: &LabelBlock,
    loader: &dyn FormatLoader,
) -> Result<TableSchema, SchemaError> {
    let mut fields = if name.contains("HISTOGRAM") {
        histogram_fields(name, block)?
    } else {
        let mut walker = Walker { loader };
        let mut fields = Vec::new();
        walker.walk_object(block, 0, block.get_str("NAME"), &mut fields)?;
        fields
    };
    if fields
        .iter()
        .any(|f| f.data_type.contains("VAX") && f.data_type.contains("REAL"))
    {
        return Err(DtypeError::VaxRealInTable.into());
    }
    let ascii =
        fields.iter().any(|f| f.data_type.contains("ASCII")) || looks_like_ascii(block, name);
    let row_prefix = block.get_int("ROW_PREFIX_BYTES").map(|v| v.max(0) as usize);
    if let Some(prefix) = row_prefix {
        for field in &mut fields {
            if let Some(offset) = &mut field.offset {
                *offset += prefix;
            }
        }
    }
    if ascii {
        reindex_names(&mut fields);
        return Ok(TableSchema {
            fields,
            format: TableFormat::Ascii,
        });
    }
    // binary records need full byte-position information
    if fields.is_empty()
        || fields
            .iter()
            .any(|f| f.bytes.is_none() || f.offset.is_none())
    {
        return Err(SchemaError::Underspecified);
    }
    let end_byte = fields
        .iter()
        .map(|f| f.offset.unwrap_or(0) + f.bytes.unwrap_or(0))
        .max()
        .unwrap_or(0);
    // pad out to the declared row span so record striding stays aligned
    let mut pad = 0i64;
    if let Some(row_bytes) = block.get_int("ROW_BYTES") {
        pad += row_bytes + row_prefix.unwrap_or(0) as i64 - end_byte as i64;
    }
    if let Some(suffix) = block.get_int("ROW_SUFFIX_BYTES") {
        pad += suffix;
    }
    if pad > 0 {
        fields.push(FieldSchema::void(
            "PLACEHOLDER_0".to_string(),
            end_byte,
            pad as usize,
        ));
    }
    for field in &mut fields {
        if field.element.is_none() {
            let sample_bytes = field.bytes.unwrap_or(0);
            let mut element = resolve_sample_type(&field.data_type, sample_bytes, true)?;
            if let (ElementType::BitString { order, .. }, Some(inferred)) =
                (&mut element, field.bit_order)
            {
                *order = inferred;
            }
            field.element = Some(element);
        }
    }
    let record_bytes = fields
        .iter()
        .map(|f| f.offset.unwrap_or(0) + f.bytes.unwrap_or(0))
        .max()
        .unwrap_or(0);
    reindex_names(&mut fields);
    Ok(TableSchema {
        fields,
        format: TableFormat::Binary { record_bytes },
    })
}

/// Resolve the structure of an ARRAY object.
pub fn parse_array_structure(
    name: &str,
    block: &LabelBlock,
    loader: &dyn FormatLoader,
) -> Result<ArrayStructure, SchemaError> {
    if block.get_str("INTERCHANGE_FORMAT") != Some("BINARY") {
        return Ok(ArrayStructure::Ascii);
    }
    if array_subobject(block)?.is_none() {
        let data_type = block.get_str("DATA_TYPE").unwrap_or("");
        let bytes = block
            .get_int("BYTES")
            .ok_or(SchemaError::Underspecified)?
            .max(0) as usize;
        return Ok(ArrayStructure::Primitive(resolve_sample_type(
            data_type, bytes, true,
        )?));
    }
    let schema = parse_table_structure(name, block, loader)?;
    Ok(ArrayStructure::Structured(schema))
}

/// The single subobject of an ARRAY, if any. More than one is illegal.
fn array_subobject<'a>(
    block: &'a LabelBlock,
) -> Result<Option<(&'a str, &'a LabelBlock)>, SchemaError> {
    const SUBOBJECTS: [&str; 4] = ["ARRAY", "BIT_ELEMENT", "COLLECTION", "ELEMENT"];
    let found: Vec<(&str, &LabelBlock)> = SUBOBJECTS
        .iter()
        .filter_map(|&sub| block.block(sub).map(|b| (sub, b)))
        .collect();
    match found.len() {
        0 => Ok(None),
        1 => {
            if found[0].0 == "BIT_ELEMENT" {
                return Err(SchemaError::BitElementInArray);
            }
            Ok(Some(found[0]))
        }
        n => Err(SchemaError::MultipleArraySubobjects(n)),
    }
}

/// HISTOGRAM definitions are terse: the block itself describes one element,
/// repeated ITEMS times.
fn histogram_fields(name: &str, block: &LabelBlock) -> Result<Vec<FieldSchema>, SchemaError> {
    if block.get_str("INTERCHANGE_FORMAT") == Some("ASCII") {
        return Err(SchemaError::AsciiHistogram);
    }
    let items = block.get_int("ITEMS").unwrap_or(1).max(1) as usize;
    let item_bytes = block
        .get_int("ITEM_BYTES")
        .map(|v| v.max(0) as usize)
        .or_else(|| {
            block
                .get_int("BYTES")
                .map(|v| (v.max(0) as usize) / items.max(1))
        })
        .ok_or(SchemaError::Underspecified)?;
    let data_type = block
        .get_str("DATA_TYPE")
        .ok_or(SchemaError::Underspecified)?
        .replace(' ', "_");
    let base_name = block.get_str("NAME").unwrap_or(name).to_string();
    Ok((0..items)
        .map(|i| FieldSchema {
            name: base_name.clone(),
            data_type: data_type.clone(),
            element: None,
            offset: Some(i * item_bytes),
            start_byte: Some(i * item_bytes + 1),
            bytes: Some(item_bytes),
            block_name: block.get_str("NAME").map(str::to_string),
            bit_fields: Vec::new(),
            bit_order: None,
            scaling_factor: None,
            value_offset: None,
        })
        .collect())
}

struct Walker<'a> {
    loader: &'a dyn FormatLoader,
}

impl Walker<'_> {
    /// Flatten one object definition into fields, recursing into containers.
    /// `base` is the absolute 0-based offset of this block's frame.
    fn walk_object(
        &mut self,
        block: &LabelBlock,
        base: usize,
        block_name: Option<&str>,
        out: &mut Vec<FieldSchema>,
    ) -> Result<(), SchemaError> {
        let items = self.expanded_items(block)?;
        for (key, value) in &items {
            let Value::Block(def) = value else { continue };
            match key.as_str() {
                "COLUMN" | "FIELD" | "ELEMENT" => {
                    self.add_column(key, def, base, block_name, out)?;
                }
                "ARRAY" => {
                    if array_subobject(def)?.is_none() {
                        self.add_column(key, def, base, block_name, out)?;
                    } else {
                        self.add_array(def, base, out)?;
                    }
                }
                "CONTAINER" | "COLLECTION" => {
                    self.add_container(def, base, out)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// The block's entries with every `^STRUCTURE` reference replaced, in
    /// place, by the contents of the loaded format file. Loaded files may
    /// themselves reference further format files.
    fn expanded_items(
        &mut self,
        block: &LabelBlock,
    ) -> Result<Vec<(String, Value)>, SchemaError> {
        let mut items = Vec::new();
        for (key, value) in block.iter() {
            if key == "^STRUCTURE" {
                let format_file = match value {
                    Value::Text(name) => name.clone(),
                    // quantity-style pointers don't make sense for structures
                    other => other.as_str().unwrap_or_default().to_string(),
                };
                let loaded = self.loader.load_format(&format_file)?;
                items.extend(self.expanded_items(&loaded)?);
            } else {
                items.push((key.clone(), value.clone()));
            }
        }
        Ok(items)
    }

    fn add_column(
        &mut self,
        key: &str,
        def: &LabelBlock,
        base: usize,
        block_name: Option<&str>,
        out: &mut Vec<FieldSchema>,
    ) -> Result<(), SchemaError> {
        // columns occasionally carry their own ^STRUCTURE reference
        let def = if def.contains_key("^STRUCTURE") {
            let mut merged = LabelBlock::new();
            for (k, v) in self.expanded_items(def)? {
                merged.add(k, v);
            }
            merged
        } else {
            def.clone()
        };
        if def.contains_key("BIT_ELEMENT") {
            return Err(SchemaError::BitElementInArray);
        }
        let start_byte = def.get_int("START_BYTE").map(|v| v.max(1) as usize);
        let rel = start_byte.unwrap_or(1) - 1;
        let data_type = def
            .get_str("DATA_TYPE")
            .unwrap_or("")
            .replace(' ', "_");
        let items = def.get_int("ITEMS").map(|v| v.max(0) as usize);
        let item_bytes = def.get_int("ITEM_BYTES").map(|v| v.max(0) as usize);
        let item_offset = def.get_int("ITEM_OFFSET").map(|v| v.max(0) as usize);
        let bytes = def
            .get_int("BYTES")
            .map(|v| v.max(0) as usize)
            .or_else(|| Some(items? * item_bytes?));
        let name = def
            .get_str("NAME")
            .map(str::to_string)
            .unwrap_or_else(|| key.to_string());
        let (bit_fields, bit_order) = if data_type.contains("BIT_STRING") {
            parse_bit_columns(&def, &data_type, &name)
        } else {
            (Vec::new(), None)
        };
        let template = FieldSchema {
            name,
            data_type,
            element: None,
            offset: Some(base + rel),
            start_byte,
            bytes,
            block_name: block_name.map(str::to_string),
            bit_fields,
            bit_order,
            scaling_factor: def.get_f64("SCALING_FACTOR"),
            value_offset: def.get_f64("OFFSET"),
        };
        match (items, item_bytes) {
            (Some(n), Some(width)) if n > 0 => {
                let stride = match item_offset {
                    Some(stride) if stride < width => {
                        return Err(SchemaError::ItemOffsetTooSmall)
                    }
                    Some(stride) => stride,
                    None => width,
                };
                for i in 0..n {
                    let mut field = template.clone();
                    field.bytes = Some(width);
                    field.offset = Some(base + rel + i * stride);
                    field.start_byte = Some(rel + i * stride + 1);
                    out.push(field);
                }
            }
            _ => out.push(template),
        }
        Ok(())
    }

    fn add_container(
        &mut self,
        def: &LabelBlock,
        base: usize,
        out: &mut Vec<FieldSchema>,
    ) -> Result<(), SchemaError> {
        let reps = def.get_int("REPETITIONS").unwrap_or(1).max(1) as usize;
        let bytes = def.get_int("BYTES").map(|v| v.max(0) as usize);
        let start = def.get_int("START_BYTE").unwrap_or(1).max(1) as usize - 1;
        if reps > 1 && bytes.is_none() {
            return Err(SchemaError::Underspecified);
        }
        let name = def.get_str("NAME");
        for r in 0..reps {
            self.walk_object(def, base + start + r * bytes.unwrap_or(0), name, out)?;
        }
        Ok(())
    }

    /// ARRAY with a subobject inside a table: unroll the axis item count as
    /// repetitions of the subobject.
    fn add_array(
        &mut self,
        def: &LabelBlock,
        base: usize,
        out: &mut Vec<FieldSchema>,
    ) -> Result<(), SchemaError> {
        let n: usize = axis_items(def).iter().product();
        let Some((kind, sub)) = array_subobject(def)? else {
            return Ok(());
        };
        let start = def.get_int("START_BYTE").unwrap_or(1).max(1) as usize - 1;
        let stride = sub
            .get_int("BYTES")
            .map(|v| v.max(0) as usize)
            .or_else(|| {
                Some(
                    (sub.get_int("ITEMS")? * sub.get_int("ITEM_BYTES")?).max(0)
                        as usize,
                )
            })
            .ok_or(SchemaError::Underspecified)?;
        let mut shell = LabelBlock::new();
        shell.add(kind.to_string(), Value::Block(sub.clone()));
        for r in 0..n.max(1) {
            self.walk_object(&shell, base + start + r * stride, def.get_str("NAME"), out)?;
        }
        Ok(())
    }
}

/// Parse BIT_COLUMN subobjects of a bit-string column: expanded bit fields
/// plus an inferred byte order. When the bit columns' own types disagree with
/// the column's declared order, the bit columns win.
fn parse_bit_columns(
    def: &LabelBlock,
    column_data_type: &str,
    column_name: &str,
) -> (Vec<BitField>, Option<Endian>) {
    let mut fields = Vec::new();
    let mut saw_little = false;
    let mut saw_big = false;
    for bit_def in def.all("BIT_COLUMN").filter_map(Value::as_block) {
        let name = bit_def
            .get_str("NAME")
            .unwrap_or("BIT_COLUMN")
            .to_string();
        let bit_type = bit_def.get_str("BIT_DATA_TYPE").or(bit_def.get_str("DATA_TYPE"));
        if let Some(t) = bit_type {
            if t.contains("LSB") || t.contains("VAX") {
                saw_little = true;
            } else if t.contains("MSB") {
                saw_big = true;
            }
        }
        let Some(start_bit) = bit_def.get_int("START_BIT").map(|v| v.max(1) as usize) else {
            continue;
        };
        let bits = bit_def.get_int("BITS").unwrap_or(1).max(0) as usize;
        match (
            bit_def.get_int("ITEMS"),
            bit_def.get_int("ITEM_BITS"),
        ) {
            (Some(n), Some(item_bits)) if n > 1 => {
                for i in 0..n.max(0) as usize {
                    fields.push(BitField {
                        name: name.clone(),
                        start_bit: start_bit + i * item_bits.max(0) as usize,
                        bits: item_bits.max(0) as usize,
                    });
                }
            }
            _ => fields.push(BitField {
                name,
                start_bit,
                bits,
            }),
        }
    }
    let declared_little = column_data_type.contains("LSB") || column_data_type.contains("VAX");
    let inferred = if saw_little && !saw_big {
        Some(Endian::Little)
    } else if saw_big && !saw_little {
        Some(Endian::Big)
    } else {
        None
    };
    if let Some(order) = inferred {
        let inferred_little = order == Endian::Little;
        if inferred_little != declared_little {
            log::warn!(
                "bit columns of {column_name} declare a byte order that \
                 disagrees with {column_data_type}; using the bit columns'"
            );
        }
    }
    (fields, inferred)
}

/// Make field names unique by appending ascending indices to duplicates.
/// Duplicated RESERVED fields additionally embed their own 1-indexed start
/// byte, keeping padding fields identifiable by position.
pub fn reindex_names(fields: &mut [FieldSchema]) {
    let names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
    let mut handled: Vec<&String> = Vec::new();
    for name in &names {
        if handled.contains(&name) {
            continue;
        }
        handled.push(name);
        let indices: Vec<usize> = names
            .iter()
            .enumerate()
            .filter(|(_, n)| *n == name)
            .map(|(i, _)| i)
            .collect();
        if indices.len() < 2 {
            continue;
        }
        for (ix, &i) in indices.iter().enumerate() {
            let field = &mut fields[i];
            if name == "RESERVED" {
                let start = field
                    .start_byte
                    .or(field.offset.map(|o| o + 1))
                    .unwrap_or(0);
                field.name = format!("RESERVED_{start}_{ix}");
            } else {
                field.name = format!("{name}_{ix}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::literalize;

    fn block(pairs: &[(&str, &str)]) -> LabelBlock {
        let mut b = LabelBlock::new();
        for (k, v) in pairs {
            b.add(k.to_string(), literalize(v));
        }
        b
    }

    fn column(pairs: &[(&str, &str)]) -> Value {
        Value::Block(block(pairs))
    }

    #[test]
    fn flat_binary_table() {
        let mut table = block(&[("INTERCHANGE_FORMAT", "BINARY"), ("ROW_BYTES", "8")]);
        table.add(
            "COLUMN".to_string(),
            column(&[
                ("NAME", "A"),
                ("DATA_TYPE", "MSB_INTEGER"),
                ("START_BYTE", "1"),
                ("BYTES", "4"),
            ]),
        );
        table.add(
            "COLUMN".to_string(),
            column(&[
                ("NAME", "B"),
                ("DATA_TYPE", "IEEE_REAL"),
                ("START_BYTE", "5"),
                ("BYTES", "4"),
            ]),
        );
        let schema =
            parse_table_structure("TABLE", &table, &NoFormatFiles).expect("resolves");
        assert_eq!(schema.record_bytes(), Some(8));
        assert_eq!(schema.fields[0].offset, Some(0));
        assert_eq!(schema.fields[1].offset, Some(4));
    }

    #[test]
    fn repeated_container_strides() {
        let mut container = block(&[
            ("NAME", "PAIR"),
            ("START_BYTE", "3"),
            ("BYTES", "4"),
            ("REPETITIONS", "2"),
        ]);
        container.add(
            "COLUMN".to_string(),
            column(&[
                ("NAME", "X"),
                ("DATA_TYPE", "MSB_INTEGER"),
                ("START_BYTE", "1"),
                ("BYTES", "2"),
            ]),
        );
        container.add(
            "COLUMN".to_string(),
            column(&[
                ("NAME", "Y"),
                ("DATA_TYPE", "MSB_INTEGER"),
                ("START_BYTE", "3"),
                ("BYTES", "2"),
            ]),
        );
        let mut table = block(&[("INTERCHANGE_FORMAT", "BINARY")]);
        table.add(
            "COLUMN".to_string(),
            column(&[
                ("NAME", "ID"),
                ("DATA_TYPE", "MSB_UNSIGNED_INTEGER"),
                ("START_BYTE", "1"),
                ("BYTES", "2"),
            ]),
        );
        table.add("CONTAINER".to_string(), Value::Block(container));
        let schema =
            parse_table_structure("TABLE", &table, &NoFormatFiles).expect("resolves");
        let offsets: Vec<Option<usize>> =
            schema.fields.iter().map(|f| f.offset).collect();
        assert_eq!(
            offsets,
            vec![Some(0), Some(2), Some(4), Some(6), Some(8)]
        );
        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ID", "X_0", "Y_0", "X_1", "Y_1"]);
    }

    #[test]
    fn items_expand_with_offsets() {
        let mut table = block(&[("INTERCHANGE_FORMAT", "BINARY")]);
        table.add(
            "COLUMN".to_string(),
            column(&[
                ("NAME", "V"),
                ("DATA_TYPE", "MSB_INTEGER"),
                ("START_BYTE", "1"),
                ("ITEMS", "3"),
                ("ITEM_BYTES", "2"),
            ]),
        );
        let schema =
            parse_table_structure("TABLE", &table, &NoFormatFiles).expect("resolves");
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.fields[2].offset, Some(4));
        assert_eq!(schema.fields[2].name, "V_2");
        assert_eq!(schema.record_bytes(), Some(6));
    }

    #[test]
    fn reserved_names_embed_start_bytes() {
        let mut fields = vec![
            FieldSchema::void("RESERVED".to_string(), 0, 2),
            FieldSchema::void("RESERVED".to_string(), 2, 2),
        ];
        reindex_names(&mut fields);
        assert_eq!(fields[0].name, "RESERVED_1_0");
        assert_eq!(fields[1].name, "RESERVED_3_1");
    }

    #[test]
    fn vax_reals_rejected_in_tables() {
        let mut table = block(&[("INTERCHANGE_FORMAT", "BINARY")]);
        table.add(
            "COLUMN".to_string(),
            column(&[
                ("NAME", "V"),
                ("DATA_TYPE", "VAX_REAL"),
                ("START_BYTE", "1"),
                ("BYTES", "4"),
            ]),
        );
        assert!(matches!(
            parse_table_structure("TABLE", &table, &NoFormatFiles),
            Err(SchemaError::Dtype(DtypeError::VaxRealInTable))
        ));
    }

    #[test]
    fn row_bytes_pad_to_declared_span() {
        let mut table = block(&[
            ("INTERCHANGE_FORMAT", "BINARY"),
            ("ROW_BYTES", "10"),
            ("ROW_SUFFIX_BYTES", "2"),
        ]);
        table.add(
            "COLUMN".to_string(),
            column(&[
                ("NAME", "A"),
                ("DATA_TYPE", "MSB_INTEGER"),
                ("START_BYTE", "1"),
                ("BYTES", "4"),
            ]),
        );
        let schema =
            parse_table_structure("TABLE", &table, &NoFormatFiles).expect("resolves");
        assert_eq!(schema.record_bytes(), Some(12));
        let last = schema.fields.last().expect("placeholder");
        assert!(last.is_placeholder());
        assert_eq!(last.bytes, Some(8));
    }

    #[test]
    fn histogram_unrolls_items() {
        let hist = block(&[
            ("INTERCHANGE_FORMAT", "BINARY"),
            ("ITEMS", "4"),
            ("ITEM_BYTES", "4"),
            ("DATA_TYPE", "MSB_UNSIGNED_INTEGER"),
        ]);
        let schema =
            parse_table_structure("HISTOGRAM", &hist, &NoFormatFiles).expect("resolves");
        assert_eq!(schema.fields.len(), 4);
        assert_eq!(schema.record_bytes(), Some(16));
        assert_eq!(schema.fields[1].offset, Some(4));
    }
}
