//! End-to-end product decoding against synthetic on-disk products.

use std::fs;
use std::path::PathBuf;

use pdsread::table::ColumnData;
use pdsread::{DataObject, Dtype, Product};
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write file");
    path
}

#[test]
fn container_repetitions_decode_across_rows() {
    let label = "\
PDS_VERSION_ID = PDS3\r
RECORD_TYPE = FIXED_LENGTH\r
RECORD_BYTES = 10\r
^TABLE = (\"T.DAT\", 2)\r
OBJECT = TABLE\r
  INTERCHANGE_FORMAT = BINARY\r
  ROWS = 2\r
  ROW_BYTES = 10\r
  OBJECT = COLUMN\r
    NAME = ID\r
    DATA_TYPE = MSB_UNSIGNED_INTEGER\r
    START_BYTE = 1\r
    BYTES = 2\r
  END_OBJECT = COLUMN\r
  OBJECT = CONTAINER\r
    NAME = PAIR\r
    START_BYTE = 3\r
    BYTES = 4\r
    REPETITIONS = 2\r
    OBJECT = COLUMN\r
      NAME = X\r
      DATA_TYPE = MSB_INTEGER\r
      START_BYTE = 1\r
      BYTES = 2\r
    END_OBJECT = COLUMN\r
    OBJECT = COLUMN\r
      NAME = Y\r
      DATA_TYPE = MSB_INTEGER\r
      START_BYTE = 3\r
      BYTES = 2\r
    END_OBJECT = COLUMN\r
  END_OBJECT = CONTAINER\r
END_OBJECT = TABLE\r
END\r
";
    let dir = TempDir::new().expect("temp dir");
    let label_path = write(&dir, "prod.lbl", label.as_bytes());
    // the pointer cites record 2, so one full record of junk first
    let mut data = vec![0xEEu8; 10];
    for (id, x0, y0, x1, y1) in [(1u16, 10i16, -10i16, 20i16, -20i16), (2, 30, -30, 40, -40)] {
        data.extend_from_slice(&id.to_be_bytes());
        data.extend_from_slice(&x0.to_be_bytes());
        data.extend_from_slice(&y0.to_be_bytes());
        data.extend_from_slice(&x1.to_be_bytes());
        data.extend_from_slice(&y1.to_be_bytes());
    }
    write(&dir, "T.DAT", &data);

    let product = Product::open(&label_path).expect("opens");
    let object = product.load("TABLE").expect("decodes");
    let DataObject::Table(table) = &*object else {
        panic!("expected a table");
    };
    assert_eq!(table.n_rows(), 2);
    assert_eq!(
        table.column("ID").expect("column").data,
        ColumnData::U16(vec![1, 2])
    );
    assert_eq!(
        table.column("Y_0").expect("column").data,
        ColumnData::I16(vec![-10, -30])
    );
    assert_eq!(
        table.column("X_1").expect("column").data,
        ColumnData::I16(vec![20, 40])
    );
}

#[test]
fn band_storage_orders_decode_identically() {
    let label = "\
PDS_VERSION_ID = PDS3\r
RECORD_TYPE = FIXED_LENGTH\r
RECORD_BYTES = 6\r
^IMAGE = (\"BSQ.IMG\", 1)\r
^SI_IMAGE = (\"BIP.IMG\", 1)\r
OBJECT = IMAGE\r
  LINES = 2\r
  LINE_SAMPLES = 3\r
  BANDS = 2\r
  BAND_STORAGE_TYPE = BAND_SEQUENTIAL\r
  SAMPLE_TYPE = MSB_UNSIGNED_INTEGER\r
  SAMPLE_BITS = 8\r
END_OBJECT = IMAGE\r
OBJECT = SI_IMAGE\r
  LINES = 2\r
  LINE_SAMPLES = 3\r
  BANDS = 2\r
  BAND_STORAGE_TYPE = SAMPLE_INTERLEAVED\r
  SAMPLE_TYPE = MSB_UNSIGNED_INTEGER\r
  SAMPLE_BITS = 8\r
END_OBJECT = SI_IMAGE\r
END\r
";
    let dir = TempDir::new().expect("temp dir");
    let label_path = write(&dir, "prod.lbl", label.as_bytes());
    write(&dir, "BSQ.IMG", &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    write(&dir, "BIP.IMG", &[1, 7, 2, 8, 3, 9, 4, 10, 5, 11, 6, 12]);

    let product = Product::open(&label_path).expect("opens");
    let bsq = product.load("IMAGE").expect("decodes bsq");
    let bip = product.load("SI_IMAGE").expect("decodes bip");
    let (DataObject::Image(bsq), DataObject::Image(bip)) = (&*bsq, &*bip) else {
        panic!("expected images");
    };
    assert_eq!(bsq.data.shape(), &[2, 2, 3]);
    assert_eq!(bsq.data, bip.data);
    let flat: Vec<f64> = bsq.data.iter_f64().collect();
    assert_eq!(flat[..6], [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn byte_quantity_pointer_skips_exact_bytes() {
    let label = "\
PDS_VERSION_ID = PDS3\r
RECORD_TYPE = FIXED_LENGTH\r
RECORD_BYTES = 4\r
^TABLE = (\"T.DAT\", 25 <BYTES>)\r
OBJECT = TABLE\r
  INTERCHANGE_FORMAT = BINARY\r
  ROWS = 1\r
  ROW_BYTES = 4\r
  OBJECT = COLUMN\r
    NAME = WORD\r
    DATA_TYPE = MSB_UNSIGNED_INTEGER\r
    START_BYTE = 1\r
    BYTES = 4\r
  END_OBJECT = COLUMN\r
END_OBJECT = TABLE\r
END\r
";
    let dir = TempDir::new().expect("temp dir");
    let label_path = write(&dir, "prod.lbl", label.as_bytes());
    let mut data = vec![0u8; 24];
    data.extend_from_slice(&0x12345678u32.to_be_bytes());
    write(&dir, "T.DAT", &data);

    let product = Product::open(&label_path).expect("opens");
    let object = product.load("TABLE").expect("decodes");
    let DataObject::Table(table) = &*object else {
        panic!("expected a table");
    };
    assert_eq!(
        table.column("WORD").expect("column").data,
        ColumnData::U32(vec![0x12345678])
    );
}

#[test]
fn delimited_stream_positions_by_row() {
    let label = "\
PDS_VERSION_ID = PDS3\r
RECORD_TYPE = STREAM\r
^SPREADSHEET = (\"T.CSV\", 2)\r
OBJECT = SPREADSHEET\r
  ROWS = 2\r
  FIELDS = 2\r
  FIELD_DELIMITER = \"COMMA\"\r
  OBJECT = FIELD\r
    NAME = SOL\r
    DATA_TYPE = ASCII_INTEGER\r
  END_OBJECT = FIELD\r
  OBJECT = FIELD\r
    NAME = TEMP\r
    DATA_TYPE = ASCII_REAL\r
  END_OBJECT = FIELD\r
END_OBJECT = SPREADSHEET\r
END\r
";
    let dir = TempDir::new().expect("temp dir");
    let label_path = write(&dir, "prod.lbl", label.as_bytes());
    write(&dir, "T.CSV", b"SOL,TEMP\r\n10,-3.5\r\n11,-4.25\r\n12,IGNORED\r\n");

    let product = Product::open(&label_path).expect("opens");
    let object = product.load("SPREADSHEET").expect("decodes");
    let DataObject::Table(table) = &*object else {
        panic!("expected a table");
    };
    assert_eq!(
        table.column("SOL").expect("column").data,
        ColumnData::I64(vec![10, 11])
    );
    assert_eq!(
        table.column("TEMP").expect("column").data,
        ColumnData::F64(vec![-3.5, -4.25])
    );
}

#[test]
fn one_bad_object_does_not_poison_the_product() {
    let label = "\
PDS_VERSION_ID = PDS3\r
RECORD_TYPE = FIXED_LENGTH\r
RECORD_BYTES = 2\r
^TABLE = (\"T.DAT\", 1)\r
^BAD_TABLE = (\"T.DAT\", 1)\r
OBJECT = TABLE\r
  INTERCHANGE_FORMAT = BINARY\r
  ROWS = 1\r
  ROW_BYTES = 2\r
  OBJECT = COLUMN\r
    NAME = V\r
    DATA_TYPE = MSB_UNSIGNED_INTEGER\r
    START_BYTE = 1\r
    BYTES = 2\r
  END_OBJECT = COLUMN\r
END_OBJECT = TABLE\r
OBJECT = BAD_TABLE\r
  INTERCHANGE_FORMAT = BINARY\r
  ROWS = 1\r
  ROW_BYTES = 2\r
  OBJECT = COLUMN\r
    NAME = V\r
    DATA_TYPE = HOLOGRAM\r
    START_BYTE = 1\r
    BYTES = 2\r
  END_OBJECT = COLUMN\r
END_OBJECT = BAD_TABLE\r
END\r
";
    let dir = TempDir::new().expect("temp dir");
    let label_path = write(&dir, "prod.lbl", label.as_bytes());
    write(&dir, "T.DAT", &[0x01, 0x02]);

    let product = Product::open(&label_path).expect("opens");
    assert_eq!(product.objects(), vec!["TABLE", "BAD_TABLE"]);
    assert!(product.get("BAD_TABLE").is_none());
    let good = product.get("TABLE").expect("good object still loads");
    let DataObject::Table(table) = &*good else {
        panic!("expected a table");
    };
    assert_eq!(
        table.column("V").expect("column").data,
        ColumnData::U16(vec![0x0102])
    );
}

#[test]
fn header_objects_read_as_text() {
    let label = "\
PDS_VERSION_ID = PDS3\r
RECORD_TYPE = FIXED_LENGTH\r
RECORD_BYTES = 16\r
^HEADER = (\"T.DAT\", 1)\r
OBJECT = HEADER\r
  BYTES = 11\r
END_OBJECT = HEADER\r
END\r
";
    let dir = TempDir::new().expect("temp dir");
    let label_path = write(&dir, "prod.lbl", label.as_bytes());
    write(&dir, "T.DAT", b"CCSD3ZF0000binary follows");

    let product = Product::open(&label_path).expect("opens");
    let object = product.load("HEADER").expect("decodes");
    let DataObject::Text(text) = &*object else {
        panic!("expected text");
    };
    assert_eq!(text, "CCSD3ZF0000");
}

#[test]
fn scaled_image_masks_sentinels_and_applies_label_scaling() {
    let label = "\
PDS_VERSION_ID = PDS3\r
RECORD_TYPE = FIXED_LENGTH\r
RECORD_BYTES = 6\r
^IMAGE = (\"I.IMG\", 1)\r
OBJECT = IMAGE\r
  LINES = 1\r
  LINE_SAMPLES = 3\r
  SAMPLE_TYPE = MSB_INTEGER\r
  SAMPLE_BITS = 16\r
  MISSING_CONSTANT = -32768\r
  SCALING_FACTOR = 2.0\r
  OFFSET = 0.5\r
END_OBJECT = IMAGE\r
END\r
";
    let dir = TempDir::new().expect("temp dir");
    let label_path = write(&dir, "prod.lbl", label.as_bytes());
    let mut data = Vec::new();
    for v in [100i16, -32768, 3] {
        data.extend_from_slice(&v.to_be_bytes());
    }
    write(&dir, "I.IMG", &data);

    let product = Product::open(&label_path).expect("opens");
    let scaled = product.scaled("IMAGE").expect("scales");
    // a fractional offset forces the integer image to floating point
    assert_eq!(scaled.data.dtype(), Dtype::F32);
    let masked: Vec<bool> = scaled.mask.iter().copied().collect();
    assert_eq!(masked, vec![false, true, false]);
    let values: Vec<f64> = scaled.data.iter_f64().collect();
    assert_eq!(values[0], 200.5);
    assert_eq!(values[2], 6.5);
}
