//! Bit-string handling for BIT_COLUMN table fields.
//!
//! A bit-string column decodes to raw bytes; downstream consumers want the
//! individual bit fields declared by its BIT_COLUMN subobjects. The bytes are
//! rendered as one long '0'/'1' string (reversing byte order for
//! little-endian columns) and then spliced at the declared start bits.

use crate::dtypes::Endian;

/// One declared field inside a bit-string column. `start_bit` is 1-indexed,
/// as written in labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitField {
    pub name: String,
    pub start_bit: usize,
    pub bits: usize,
}

/// Render bytes as a bit string, most significant bit of each byte first.
/// Little-endian columns reverse the byte order first so declared start bits
/// count from the most significant end of the whole value.
pub fn byte_string_to_bits(bytes: &[u8], order: Endian) -> String {
    let mut out = String::with_capacity(bytes.len() * 8);
    let render = |out: &mut String, byte: u8| {
        for shift in (0..8).rev() {
            out.push(if byte >> shift & 1 == 1 { '1' } else { '0' });
        }
    };
    match order {
        Endian::Big => bytes.iter().for_each(|&b| render(&mut out, b)),
        Endian::Little => bytes.iter().rev().for_each(|&b| render(&mut out, b)),
    }
    out
}

/// Cut a bit string into the declared fields, `[start_bit-1, start_bit-1+bits)`
/// each, clamped to the string.
pub fn splice_bits(bit_string: &str, fields: &[BitField]) -> Vec<String> {
    fields
        .iter()
        .map(|f| {
            let start = (f.start_bit.saturating_sub(1)).min(bit_string.len());
            let end = (start + f.bits).min(bit_string.len());
            bit_string[start..end].to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(start_bit: usize, bits: usize) -> BitField {
        BitField {
            name: format!("F{start_bit}"),
            start_bit,
            bits,
        }
    }

    #[test]
    fn big_endian_bits() {
        assert_eq!(byte_string_to_bits(&[0b1010_0011], Endian::Big), "10100011");
        assert_eq!(
            byte_string_to_bits(&[0x01, 0x80], Endian::Big),
            "0000000110000000"
        );
    }

    #[test]
    fn little_endian_reverses_bytes() {
        assert_eq!(
            byte_string_to_bits(&[0x01, 0x80], Endian::Little),
            "1000000000000001"
        );
    }

    #[test]
    fn splice_covers_declared_fields() {
        let bits = byte_string_to_bits(&[0b1010_0111, 0b0011_1100], Endian::Big);
        let fields = [field(1, 3), field(4, 3), field(7, 4), field(11, 6)];
        let spliced = splice_bits(&bits, &fields);
        assert_eq!(spliced, vec!["101", "001", "1100", "111100"]);
    }

    #[test]
    fn splice_clamps_out_of_range() {
        let spliced = splice_bits("1010", &[field(3, 8)]);
        assert_eq!(spliced, vec!["10"]);
    }
}
