//! The product handle: one label plus the data objects it points to.
//!
//! A [`Product`] parses the label eagerly and decodes data objects lazily,
//! caching each decoded object. [`Product::load`] propagates decode errors;
//! [`Product::get`] isolates them, so one malformed object never poisons the
//! rest of a product.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

use crate::array::MaskedArray;
use crate::image::{self, Image, ImageError};
use crate::label::{
    depointerize, get_pointers, pointerize, read_label, LabelBlock, LabelError, ParsedLabel,
    DEFAULT_PVL_LIMIT,
};
use crate::overrides::{Action, Identifiers, OverrideTable, Step};
use crate::position::{self, PositionError};
use crate::scaling::{self, ScaleError};
use crate::schema::{parse_table_structure, FormatLoader, SchemaError};
use crate::stream;
use crate::table::{self, ArrayObject, Table, TableError};
use crate::value::Value;

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Label(#[from] LabelError),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Scale(#[from] ScaleError),
    #[error("no object named {0} in this label")]
    NoSuchObject(String),
    #[error("{0}")]
    Unsupported(String),
    #[error("{0} is not a scalable array object")]
    NotScalable(String),
}

/// One decoded data object.
#[derive(Debug, Clone, PartialEq)]
pub enum DataObject {
    Table(Table),
    Image(Image),
    Array(ArrayObject),
    Text(String),
}

pub struct Product {
    label_path: PathBuf,
    data_dir: PathBuf,
    pub label: ParsedLabel,
    pub identifiers: Identifiers,
    overrides: OverrideTable,
    cache: RefCell<HashMap<String, Rc<DataObject>>>,
}

impl Product {
    /// Open a product from its label file (attached or detached).
    pub fn open(label_path: &Path) -> Result<Product, ProductError> {
        Product::open_with_overrides(label_path, OverrideTable::new())
    }

    /// Open a product with a mission-specific override catalog.
    pub fn open_with_overrides(
        label_path: &Path,
        overrides: OverrideTable,
    ) -> Result<Product, ProductError> {
        let label = read_label(label_path, DEFAULT_PVL_LIMIT)?;
        let identifiers = Identifiers::from_label(&label.block);
        let data_dir = match label_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Product {
            label_path: label_path.to_path_buf(),
            data_dir,
            label,
            identifiers,
            overrides,
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// Names of the data objects this label points to.
    pub fn objects(&self) -> Vec<String> {
        get_pointers(&self.label.block)
            .iter()
            .map(|p| depointerize(p).to_string())
            .filter(|name| name != "STRUCTURE" && name != "PDS_OBJECT")
            .collect()
    }

    /// The metadata block for an object, with any override patches applied.
    pub fn metablock(&self, name: &str) -> Option<LabelBlock> {
        let block = self.label.block.find_block(name)?.clone();
        match self.overrides.first_match(Step::Block, &self.identifiers, name) {
            Some(Action::PatchBlock(patches)) => Some(block.with_patches(patches)),
            _ => Some(block),
        }
    }

    /// The pointer target for an object: its own parameter, or the `^`-prefixed
    /// pointer when the plain name resolves to a block.
    fn target(&self, name: &str) -> Option<&Value> {
        match self.label.block.find(name) {
            Some(Value::Block(_)) | None => self.label.block.find(&pointerize(name)),
            other => other,
        }
    }

    /// The file holding an object's data: the one its pointer cites, resolved
    /// case-insensitively, or the label file itself for attached data.
    pub fn file_for(&self, name: &str) -> Result<PathBuf, ProductError> {
        let cited = self.target(name).and_then(position::pointer_filename);
        match cited {
            Some(file) => Ok(stream::check_cases(&self.data_dir.join(file))?),
            None => Ok(self.label_path.clone()),
        }
    }

    fn start_byte(
        &self,
        name: &str,
        block: Option<&LabelBlock>,
        target: &Value,
        path: &Path,
    ) -> Result<i64, ProductError> {
        if let Some(Action::SetStartByte(start)) =
            self.overrides
                .first_match(Step::StartByte, &self.identifiers, name)
        {
            return Ok(*start as i64);
        }
        Ok(position::data_start_byte(
            &self.identifiers,
            block,
            target,
            path,
        )?)
    }

    /// Decode an object, or return it from cache. Errors propagate.
    pub fn load(&self, name: &str) -> Result<Rc<DataObject>, ProductError> {
        if let Some(cached) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(cached));
        }
        let decoded = Rc::new(self.decode(name)?);
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&decoded));
        Ok(decoded)
    }

    /// Decode an object, swallowing failure: a malformed object logs a warning
    /// and returns `None` instead of failing the whole product.
    pub fn get(&self, name: &str) -> Option<Rc<DataObject>> {
        match self.load(name) {
            Ok(obj) => Some(obj),
            Err(e) => {
                log::warn!("unable to load {name}: {e}");
                None
            }
        }
    }

    /// Mask special constants and apply label scaling to an image or numeric
    /// array object.
    pub fn scaled(&self, name: &str) -> Result<MaskedArray, ProductError> {
        let object = self.load(name)?;
        let data = match &*object {
            DataObject::Image(image) => image.data.clone(),
            DataObject::Array(ArrayObject::Numeric(data)) => data.clone(),
            _ => return Err(ProductError::NotScalable(name.to_string())),
        };
        let block = self.metablock(name);
        Ok(scaling::mask_and_scale(block.as_ref(), data, None)?)
    }

    fn decode(&self, name: &str) -> Result<DataObject, ProductError> {
        if let Some(Action::Unsupported(reason)) =
            self.overrides
                .first_match(Step::Structure, &self.identifiers, name)
        {
            return Err(ProductError::Unsupported(reason.clone()));
        }
        let block = self.metablock(name);
        let target = self
            .target(name)
            .cloned()
            .ok_or_else(|| ProductError::NoSuchObject(name.to_string()))?;
        let path = self.file_for(name)?;
        if name.contains("IMAGE") || name.contains("QUBE") {
            let start = self.start_byte(name, block.as_ref(), &target, &path)?;
            let block = block.ok_or_else(|| ProductError::NoSuchObject(name.to_string()))?;
            let mut props = image::image_properties(name, &block)?;
            if let Some(Action::SetElementType(element)) =
                self.overrides
                    .first_match(Step::SampleType, &self.identifiers, name)
            {
                props.element = element.clone();
            }
            let image = image::read_image(&path, &props, start.max(0) as u64)?;
            return Ok(DataObject::Image(image));
        }
        if name.contains("TABLE") || name.contains("SPREADSHEET") || name.contains("HISTOGRAM") {
            let block = block.ok_or_else(|| ProductError::NoSuchObject(name.to_string()))?;
            let schema = parse_table_structure(name, &block, self)?;
            // delimited ASCII streams are positioned in rows; a byte start
            // may be uncomputable for them, and is never used
            let start = match self.start_byte(name, Some(&block), &target, &path) {
                Ok(start) => start,
                Err(_) if schema.is_ascii() => 0,
                Err(e) => return Err(e),
            };
            let props =
                position::table_position(&self.identifiers, &block, &target, name, start);
            let table = if schema.is_ascii() {
                table::read_ascii_table(&path, &schema, &block, &props)?
            } else {
                let rows = block
                    .get_int("ROWS")
                    .or_else(|| block.get_int("RECORDS"))
                    .map(|r| r.max(0) as usize);
                table::read_binary_table(&path, &schema, rows, props.start.max(0) as u64)?
            };
            return Ok(DataObject::Table(table));
        }
        if name.contains("ARRAY") {
            let start = self.start_byte(name, block.as_ref(), &target, &path)?;
            let block = block.ok_or_else(|| ProductError::NoSuchObject(name.to_string()))?;
            let array = table::read_array(&path, name, &block, self, start.max(0) as u64)?;
            return Ok(DataObject::Array(array));
        }
        if name.contains("HEADER") || name.contains("LABEL") {
            let start = self.start_byte(name, block.as_ref(), &target, &path)?;
            let length = block
                .as_ref()
                .and_then(|b| b.get_int("BYTES"))
                .map(|b| b.max(0) as u64);
            let raw = stream::read_range(&path, start.max(0) as u64, length)?;
            return Ok(DataObject::Text(
                String::from_utf8_lossy(&raw).into_owned(),
            ));
        }
        if name.contains("DESC") || name.contains("TEXT") {
            let raw = stream::read_range(&path, 0, None)?;
            return Ok(DataObject::Text(
                String::from_utf8_lossy(&raw).into_owned(),
            ));
        }
        Err(ProductError::Unsupported(format!(
            "no decoder for object {name}"
        )))
    }
}

impl FormatLoader for Product {
    /// Locate and parse an external `^STRUCTURE` format file. Searched next to
    /// the data, then in conventional LABEL/FORMAT subdirectories.
    fn load_format(&self, format_file: &str) -> Result<LabelBlock, SchemaError> {
        let candidates = [
            self.data_dir.clone(),
            self.data_dir.join("LABEL"),
            self.data_dir.join("label"),
            self.data_dir.join("FORMAT"),
            self.data_dir.join("format"),
        ];
        for dir in candidates {
            let Ok(path) = stream::check_cases(&dir.join(format_file)) else {
                continue;
            };
            let raw = stream::read_range(&path, 0, None)
                .map_err(|_| SchemaError::MissingFormatFile(format_file.to_string()))?;
            let parsed = crate::label::parse_pvl(&String::from_utf8_lossy(&raw), false);
            return Ok(parsed.block);
        }
        Err(SchemaError::MissingFormatFile(format_file.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnData;
    use std::fs;
    use tempfile::TempDir;

    const LABEL: &str = "\
PDS_VERSION_ID = PDS3\r
RECORD_TYPE = FIXED_LENGTH\r
RECORD_BYTES = 6\r
FILE_RECORDS = 2\r
^TABLE = (\"DATA.DAT\", 1)\r
OBJECT = TABLE\r
  INTERCHANGE_FORMAT = BINARY\r
  ROWS = 2\r
  ROW_BYTES = 6\r
  OBJECT = COLUMN\r
    NAME = COUNT\r
    DATA_TYPE = MSB_UNSIGNED_INTEGER\r
    START_BYTE = 1\r
    BYTES = 2\r
  END_OBJECT = COLUMN\r
  OBJECT = COLUMN\r
    NAME = VALUE\r
    DATA_TYPE = PC_REAL\r
    START_BYTE = 3\r
    BYTES = 4\r
  END_OBJECT = COLUMN\r
END_OBJECT = TABLE\r
END\r
";

    fn write_product(dir: &TempDir) -> PathBuf {
        let label_path = dir.path().join("test.lbl");
        fs::write(&label_path, LABEL).expect("write label");
        let mut data = Vec::new();
        for (count, value) in [(7u16, 1.5f32), (300, -2.0)] {
            data.extend_from_slice(&count.to_be_bytes());
            data.extend_from_slice(&value.to_le_bytes());
        }
        // lowercase on disk, uppercase in the label
        fs::write(dir.path().join("data.dat"), data).expect("write data");
        label_path
    }

    #[test]
    fn loads_a_detached_binary_table() {
        let dir = TempDir::new().expect("temp dir");
        let label_path = write_product(&dir);
        let product = Product::open(&label_path).expect("opens");
        assert_eq!(product.identifiers.record_bytes, Some(6));
        assert_eq!(product.objects(), vec!["TABLE"]);
        let object = product.load("TABLE").expect("decodes");
        let DataObject::Table(table) = &*object else {
            panic!("expected a table");
        };
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
    fn get_isolates_failures() {
        let dir = TempDir::new().expect("temp dir");
        let label_path = write_product(&dir);
        let product = Product::open(&label_path).expect("opens");
        assert!(product.get("NONEXISTENT").is_none());
        assert!(product.get("TABLE").is_some());
    }

    #[test]
    fn load_caches_decoded_objects() {
        let dir = TempDir::new().expect("temp dir");
        let label_path = write_product(&dir);
        let product = Product::open(&label_path).expect("opens");
        let first = product.load("TABLE").expect("decodes");
        let second = product.load("TABLE").expect("cached");
        assert!(Rc::ptr_eq(&first, &second));
    }
}
