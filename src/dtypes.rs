//! PDS3 sample types, element dtypes, and special-constant catalogs.
//!
//! The `(SAMPLE_TYPE, bytes)` pair decides how an element decodes; the type
//! name alone is not enough because several names are reused across widths
//! in the historical corpus.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DtypeError {
    #[error("unsupported data type: {0} ({1} bytes)")]
    Unsupported(String, usize),
    #[error("VAX reals are not supported in binary tables")]
    VaxRealInTable,
}

/// Byte order of a multi-byte element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// Resolved physical type of one element of a table column or image sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType {
    Int {
        bytes: usize,
        signed: bool,
        order: Endian,
    },
    Float {
        bytes: usize,
        order: Endian,
    },
    /// 4-byte VAX F-floating. Valid in images and qubes only.
    VaxReal,
    /// IBM System/360 packed real, 4 or 8 bytes.
    IbmReal { bytes: usize, order: Endian },
    /// Fixed-width ASCII text (also dates, times, ASCII-encoded numbers).
    Text { bytes: usize },
    /// Raw bytes interpreted as an ordered string of bits.
    BitString { bytes: usize, order: Endian },
    /// Padding with no interpretation.
    Void { bytes: usize },
    /// Single byte read as true/false.
    Bool,
}

impl ElementType {
    pub fn bytes(&self) -> usize {
        match self {
            ElementType::Int { bytes, .. }
            | ElementType::Float { bytes, .. }
            | ElementType::IbmReal { bytes, .. }
            | ElementType::Text { bytes }
            | ElementType::BitString { bytes, .. }
            | ElementType::Void { bytes } => *bytes,
            ElementType::VaxReal => 4,
            ElementType::Bool => 1,
        }
    }

    /// The in-memory dtype this element decodes to, if numeric.
    pub fn dtype(&self) -> Option<Dtype> {
        match self {
            ElementType::Int { bytes, signed, .. } => Some(match (bytes, signed) {
                (1, false) => Dtype::U8,
                (1, true) => Dtype::I8,
                (2, false) => Dtype::U16,
                (2, true) => Dtype::I16,
                (4, false) => Dtype::U32,
                (4, true) => Dtype::I32,
                _ => Dtype::I64,
            }),
            ElementType::Float { bytes, .. } => {
                Some(if *bytes == 8 { Dtype::F64 } else { Dtype::F32 })
            }
            ElementType::VaxReal => Some(Dtype::F32),
            ElementType::IbmReal { bytes, .. } => {
                Some(if *bytes == 8 { Dtype::F64 } else { Dtype::F32 })
            }
            _ => None,
        }
    }
}

/// Resolve a PDS3 `SAMPLE_TYPE`/`DATA_TYPE` name and byte width to an element
/// type. `in_table` rejects the formats only image decoding knows how to
/// convert.
pub fn resolve_sample_type(
    name: &str,
    bytes: usize,
    in_table: bool,
) -> Result<ElementType, DtypeError> {
    let name = name.trim().replace(' ', "_");
    let unsupported = || DtypeError::Unsupported(name.clone(), bytes);
    if name.contains("IBM") && name.contains("REAL") {
        if !matches!(bytes, 4 | 8) {
            return Err(unsupported());
        }
        let order = if name.contains("LSB") {
            Endian::Little
        } else {
            Endian::Big
        };
        return Ok(ElementType::IbmReal { bytes, order });
    }
    if name == "VAX_REAL" || name == "VAXG_REAL" {
        if in_table {
            return Err(DtypeError::VaxRealInTable);
        }
        if bytes != 4 {
            return Err(unsupported());
        }
        return Ok(ElementType::VaxReal);
    }
    let int = |signed, order| {
        if matches!(bytes, 1 | 2 | 4 | 8) {
            Ok(ElementType::Int {
                bytes,
                signed,
                order,
            })
        } else {
            Err(unsupported())
        }
    };
    let float = |order| {
        if matches!(bytes, 4 | 8) {
            Ok(ElementType::Float { bytes, order })
        } else {
            Err(unsupported())
        }
    };
    match name.as_str() {
        "MSB_INTEGER" | "INTEGER" | "MAC_INTEGER" | "SUN_INTEGER" => int(true, Endian::Big),
        "MSB_UNSIGNED_INTEGER"
        | "UNSIGNED_INTEGER"
        | "MAC_UNSIGNED_INTEGER"
        | "SUN_UNSIGNED_INTEGER" => int(false, Endian::Big),
        "LSB_INTEGER" | "PC_INTEGER" | "VAX_INTEGER" => int(true, Endian::Little),
        "LSB_UNSIGNED_INTEGER" | "PC_UNSIGNED_INTEGER" | "VAX_UNSIGNED_INTEGER" => {
            int(false, Endian::Little)
        }
        "IEEE_REAL" | "FLOAT" | "REAL" | "MAC_REAL" | "SUN_REAL" => float(Endian::Big),
        "PC_REAL" => float(Endian::Little),
        "ASCII_REAL" | "ASCII_INTEGER" | "ASCII_COMPLEX" | "DATE" | "TIME" | "CHARACTER"
        | "EBCDIC_CHARACTER" => Ok(ElementType::Text { bytes }),
        "MSB_BIT_STRING" => Ok(ElementType::BitString {
            bytes,
            order: Endian::Big,
        }),
        "LSB_BIT_STRING" | "VAX_BIT_STRING" => Ok(ElementType::BitString {
            bytes,
            order: Endian::Little,
        }),
        "BOOLEAN" => Ok(ElementType::Bool),
        _ => Err(unsupported()),
    }
}

/// In-memory element dtype of a decoded array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    I64,
    F32,
    F64,
}

impl Dtype {
    pub fn name(self) -> &'static str {
        match self {
            Dtype::U8 => "uint8",
            Dtype::I8 => "int8",
            Dtype::U16 => "uint16",
            Dtype::I16 => "int16",
            Dtype::U32 => "uint32",
            Dtype::I32 => "int32",
            Dtype::I64 => "int64",
            Dtype::F32 => "float32",
            Dtype::F64 => "float64",
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, Dtype::F32 | Dtype::F64)
    }

    /// Inclusive representable range for integer dtypes.
    pub fn int_range(self) -> Option<(i128, i128)> {
        match self {
            Dtype::U8 => Some((u8::MIN as i128, u8::MAX as i128)),
            Dtype::I8 => Some((i8::MIN as i128, i8::MAX as i128)),
            Dtype::U16 => Some((u16::MIN as i128, u16::MAX as i128)),
            Dtype::I16 => Some((i16::MIN as i128, i16::MAX as i128)),
            Dtype::U32 => Some((u32::MIN as i128, u32::MAX as i128)),
            Dtype::I32 => Some((i32::MIN as i128, i32::MAX as i128)),
            Dtype::I64 => Some((i64::MIN as i128, i64::MAX as i128)),
            Dtype::F32 | Dtype::F64 => None,
        }
    }
}

/// PDS3 special-constant parameter names that may appear in a label: the six
/// Standards names plus the combinatorial ISIS family (e.g.
/// `CORE_HIGH_REPR_SATURATION`). Some ISIS category prefixes historically
/// appear without a trailing underscore; the generated family preserves that.
pub fn is_special_constant_name(name: &str) -> bool {
    const BASIC: [&str; 6] = [
        "INVALID_CONSTANT",
        "MISSING_CONSTANT",
        "INFINITY_CONSTANT",
        "NOT_APPLICABLE_CONSTANT",
        "NULL_CONSTANT",
        "UNKNOWN_CONSTANT",
    ];
    if BASIC.contains(&name) {
        return true;
    }
    let rest = strip_any(name, &["CORE_", "BAND_SUFFIX_", "SAMPLE_SUFFIX", "LINE_SUFFIX"])
        .unwrap_or(name);
    let Some(rest) = strip_any(rest, &["HIGH_", "LOW_"]) else {
        return false;
    };
    let Some(rest) = strip_any(rest, &["INST_", "REPR_"]) else {
        return false;
    };
    matches!(rest, "NULL" | "SATURATION" | "SAT")
}

fn strip_any<'a>(name: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|p| name.strip_prefix(p))
}

/// Common "implicit" special constants never declared in labels: ISIS special
/// pixel values plus values suggested by the PDS3 Standards. Keyed by the
/// decoded dtype; a constant is only treated as special if it actually occurs
/// in the data. `u8` entries exist but callers skip them because 0 and 255
/// are overwhelmingly real data in 8-bit products.
pub fn implicit_constants(dtype: Dtype) -> Vec<(&'static str, f64)> {
    match dtype {
        Dtype::U8 => vec![("NULL", 0.0), ("ISIS_SAT_HIGH", 255.0)],
        Dtype::I8 => vec![],
        Dtype::I16 => vec![
            ("N/A", -32768.0),
            ("UNK", 32767.0),
            ("ISIS_LOW_INST_SAT", -32766.0),
            ("ISIS_LOW_REPR_SAT", -32767.0),
            ("ISIS_HIGH_INST_SAT", -32765.0),
            ("ISIS_HIGH_REPR_SAT", -32764.0),
        ],
        Dtype::U16 => vec![
            ("NULL", 0.0),
            ("N/A", 65533.0),
            ("UNK", 65534.0),
            ("ISIS_LOW_INST_SAT", 2.0),
            ("ISIS_LOW_REPR_SAT", 1.0),
            ("ISIS_HIGH_INST_SAT", 65534.0),
            ("ISIS_HIGH_REPR_SAT", 65535.0),
        ],
        // the historical N/A value really is missing a digit
        Dtype::I32 | Dtype::I64 => vec![("N/A", -214743648.0), ("UNK", 2147483647.0)],
        Dtype::U32 => vec![
            ("N/A", 4294967293.0),
            ("UNK", 4294967294.0),
            ("ISIS_NULL", 0xFF7FFFFBu32 as f64),
            ("ISIS_LOW_INST_SAT", 0xFF7FFFFDu32 as f64),
            ("ISIS_LOW_REPR_SAT", 0xFF7FFFFCu32 as f64),
            ("ISIS_HIGH_INST_SAT", 0xFF7FFFFEu32 as f64),
            ("ISIS_HIGH_REPR_SAT", 0xFF7FFFFFu32 as f64),
        ],
        Dtype::F32 => vec![
            ("NULL", -3.4028226550889045e38),
            ("N/A", -1e32),
            ("UNK", 1e32),
            ("ISIS_LOW_INST_SAT", f32::from_bits(0xFF7FFFFD) as f64),
            ("ISIS_LOW_REPR_SAT", f32::from_bits(0xFF7FFFFC) as f64),
            ("ISIS_HIGH_INST_SAT", f32::from_bits(0xFF7FFFFE) as f64),
            ("ISIS_HIGH_REPR_SAT", f32::from_bits(0xFF7FFFFF) as f64),
        ],
        Dtype::F64 => vec![("NULL", -3.4028226550889045e38)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_families() {
        assert_eq!(
            resolve_sample_type("MSB_INTEGER", 2, true).expect("resolves"),
            ElementType::Int {
                bytes: 2,
                signed: true,
                order: Endian::Big
            }
        );
        assert_eq!(
            resolve_sample_type("PC_UNSIGNED_INTEGER", 4, true).expect("resolves"),
            ElementType::Int {
                bytes: 4,
                signed: false,
                order: Endian::Little
            }
        );
    }

    #[test]
    fn vax_real_rejected_in_tables() {
        assert!(matches!(
            resolve_sample_type("VAX_REAL", 4, true),
            Err(DtypeError::VaxRealInTable)
        ));
        assert_eq!(
            resolve_sample_type("VAX_REAL", 4, false).expect("resolves"),
            ElementType::VaxReal
        );
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(resolve_sample_type("HOLOGRAM", 3, true).is_err());
        assert!(resolve_sample_type("IEEE_REAL", 3, true).is_err());
    }

    #[test]
    fn constant_name_family() {
        assert!(is_special_constant_name("MISSING_CONSTANT"));
        assert!(is_special_constant_name("CORE_HIGH_REPR_SATURATION"));
        assert!(is_special_constant_name("HIGH_INST_SAT"));
        assert!(is_special_constant_name("SAMPLE_SUFFIXLOW_REPR_NULL"));
        assert!(!is_special_constant_name("SCALING_FACTOR"));
        assert!(!is_special_constant_name("HIGH_WATER_MARK"));
    }
}
