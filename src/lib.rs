//! # pdsread — PDS3 planetary data product reader
//!
//! A reader for PDS3-style labeled data products: a permissive PVL label
//! parser, structure resolution for TABLE/ARRAY/HISTOGRAM objects (containers,
//! repeated items, external format files, bit columns), physical position
//! resolution, binary and ASCII table decoders, a multi-band image/qube
//! decoder, and special-constant masking with overflow-safe rescaling.
//!
//! ## Reading a product
//!
//! ```no_run
//! use pdsread::{DataObject, Product};
//!
//! # fn main() -> Result<(), pdsread::ProductError> {
//! let product = Product::open("products/m0402852.lbl".as_ref())?;
//! for name in product.objects() {
//!     match product.get(&name).as_deref() {
//!         Some(DataObject::Image(image)) => {
//!             println!("{name}: image {:?}", image.data.shape());
//!         }
//!         Some(DataObject::Table(table)) => {
//!             println!("{name}: table with {} rows", table.n_rows());
//!         }
//!         _ => {}
//!     }
//! }
//! // masked and rescaled pixels, sentinels excluded
//! let scaled = product.scaled("IMAGE")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! - [`label`]: PVL tokenizer/block parser, [`value`]: value literalizer
//! - [`schema`]: flattening object definitions into byte-accurate field lists
//! - [`position`]: pointer resolution to physical file positions
//! - [`table`], [`image`]: the decoders
//! - [`scaling`]: special constants, masking, overflow-safe scaling
//! - [`product`]: the lazy-loading handle tying everything together

pub mod array;
pub mod bits;
pub mod dtypes;
pub mod image;
pub mod label;
pub mod overrides;
pub mod position;
pub mod product;
pub mod scaling;
pub mod schema;
pub mod stream;
pub mod table;
pub mod value;

pub use array::{DataArray, MaskedArray};
pub use dtypes::{resolve_sample_type, Dtype, DtypeError, ElementType, Endian};
pub use image::{read_image, BandStorage, Image, ImageError, ImageProps};
pub use label::{parse_pvl, read_label, LabelBlock, LabelError, ParsedLabel};
pub use overrides::{Action, Identifiers, OverrideTable, Step};
pub use position::{data_start_byte, table_position, PositionError, TableProperties};
pub use product::{DataObject, Product, ProductError};
pub use scaling::{find_special_constants, mask_specials, scale_array, ScaleError};
pub use schema::{
    parse_array_structure, parse_table_structure, ArrayStructure, FieldSchema, FormatLoader,
    SchemaError, TableSchema,
};
pub use table::{read_ascii_table, read_binary_table, ArrayObject, Table, TableError};
pub use value::{literalize, Quantity, Value};
