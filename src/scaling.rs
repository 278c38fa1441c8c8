//! Special-constant masking and label-driven rescaling.
//!
//! Special constants (instrument saturation markers, missing-data sentinels)
//! come from two places: explicit parameters in the object's label block and
//! well-known implicit values appropriate to the array's dtype. Masking
//! happens before scaling so sentinels never contaminate range computation.
//!
//! Scaling (`value * SCALING_FACTOR + OFFSET`) promotes the array to a dtype
//! chosen up front from the scaled range of the unmasked data, so integer
//! scaling can never silently wrap.

use thiserror::Error;

use crate::array::{DataArray, MaskedArray};
use crate::dtypes::{implicit_constants, is_special_constant_name, Dtype};
use crate::label::LabelBlock;
use crate::value::Value;

#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("unable to find a suitable data type for scaling")]
    NoSuitableDtype,
}

/// Promotion candidates for integer scaling, narrowest first.
const INT_CANDIDATES: [Dtype; 7] = [
    Dtype::U8,
    Dtype::I8,
    Dtype::U16,
    Dtype::I16,
    Dtype::U32,
    Dtype::I32,
    Dtype::I64,
];

/// Special constants applicable to an array: explicit constants from its
/// label block plus implicit dtype-appropriate constants that actually occur
/// in the data. A NaN entry marks the presence of non-finite values, which
/// the masking step treats as invalid wholesale.
///
/// Implicit constants are never attached to `u8` arrays; 0 and 255 are
/// overwhelmingly real data there.
pub fn find_special_constants(
    block: Option<&LabelBlock>,
    obj: &DataArray,
) -> Vec<(String, f64)> {
    let mut specials = Vec::new();
    if let Some(block) = block {
        for (key, value) in block.iter() {
            if !is_special_constant_name(key) {
                continue;
            }
            if let Some(v) = constant_value(value) {
                specials.push((key.clone(), v));
            }
        }
    }
    if obj.dtype() == Dtype::U8 {
        return specials;
    }
    if obj.has_nonfinite() {
        specials.push(("INVALIDS".to_string(), f64::NAN));
    }
    for (name, constant) in implicit_constants(obj.dtype()) {
        if obj.contains(constant) {
            specials.push((name.to_string(), constant));
        }
    }
    specials
}

/// Numeric value of an explicit special-constant parameter. Sequences take
/// their first element; the literal string "N/A" means the constant is
/// declared not to exist.
fn constant_value(value: &Value) -> Option<f64> {
    match value {
        Value::Text(t) if t == "N/A" => None,
        Value::Sequence(items) => items.first().and_then(Value::numeric),
        other => other.numeric(),
    }
}

/// Mask every element equal to a special constant. If any special is NaN,
/// all non-finite elements are masked as well.
pub fn mask_specials(data: DataArray, specials: &[(String, f64)]) -> MaskedArray {
    let values: Vec<f64> = specials.iter().map(|(_, v)| *v).collect();
    let mask_nonfinite = values.iter().any(|v| v.is_nan());
    let mut masked = MaskedArray::unmasked(data);
    if values.is_empty() {
        return masked;
    }
    let flags: Vec<bool> = masked
        .data
        .iter_f64()
        .map(|x| values.contains(&x) || (mask_nonfinite && !x.is_finite()))
        .collect();
    for (slot, flag) in masked.mask.iter_mut().zip(flags) {
        *slot = flag;
    }
    masked
}

/// Scale and offset parameters from a label block. Sequences declare
/// per-plane values. The flag reports whether every operand was written as
/// an integer literal, which decides whether integer arrays cast to float.
fn scale_params(block: Option<&LabelBlock>) -> (Vec<f64>, Vec<f64>, bool) {
    let extract = |key: &str, default: f64| -> (Vec<f64>, bool) {
        match block.and_then(|b| b.first(key)) {
            Some(Value::Sequence(items)) => {
                let values: Vec<f64> = items.iter().filter_map(Value::numeric).collect();
                let integral = items.iter().all(Value::is_integer_literal);
                if values.is_empty() {
                    (vec![default], true)
                } else {
                    (values, integral)
                }
            }
            Some(v) => match v.numeric() {
                Some(x) => (vec![x], v.is_integer_literal()),
                None => (vec![default], true),
            },
            None => (vec![default], true),
        }
    };
    let (scales, scales_integral) = extract("SCALING_FACTOR", 1.0);
    let (offsets, offsets_integral) = extract("OFFSET", 0.0);
    (scales, offsets, scales_integral && offsets_integral)
}

/// Apply label-declared scaling to an array.
///
/// When the block declares no effective scaling (`scale == 1, offset == 0`)
/// the input is returned untouched, same backing buffer and all; callers
/// working with enormous arrays rely on that. Otherwise the output dtype is
/// chosen before the arithmetic: integer scaling stays integral in the
/// narrowest dtype whose range holds the scaled extremes of the unmasked
/// data, and anything involving a non-integer operand goes to `float_dtype`
/// if given, `f32` if the scaled values fit, `f64` otherwise.
///
/// Sequence-valued SCALING_FACTOR/OFFSET scale each plane along the first
/// axis with its own parameters.
pub fn scale_array(
    block: Option<&LabelBlock>,
    obj: MaskedArray,
    float_dtype: Option<Dtype>,
) -> Result<MaskedArray, ScaleError> {
    let (scales, offsets, operands_integral) = scale_params(block);
    if scales.iter().all(|&s| s == 1.0) && offsets.iter().all(|&o| o == 0.0) {
        return Ok(obj);
    }
    let nplanes = scales.len().max(offsets.len());
    let per_plane = nplanes > 1 && obj.data.shape().first() == Some(&nplanes);
    if nplanes > 1 && !per_plane {
        log::warn!(
            "per-plane scaling declares {nplanes} planes but the array's \
             first axis does not match; using the first plane's parameters"
        );
    }
    let plane_len = if per_plane {
        obj.data.len() / nplanes
    } else {
        obj.data.len().max(1)
    };
    let param = |flat: usize| -> (f64, f64) {
        let ix = if per_plane { flat / plane_len } else { 0 };
        (
            scales.get(ix).copied().or(scales.last().copied()).unwrap_or(1.0),
            offsets.get(ix).copied().or(offsets.last().copied()).unwrap_or(0.0),
        )
    };
    let dtype = obj.data.dtype();
    let flags: Vec<bool> = obj.mask.iter().copied().collect();
    let to_float = !dtype.is_integer() || !operands_integral;
    let shape: Vec<usize> = obj.data.shape().to_vec();
    let data = if to_float {
        let values: Vec<f64> = obj
            .data
            .iter_f64()
            .enumerate()
            .map(|(i, x)| {
                let (s, o) = param(i);
                x * s + o
            })
            .collect();
        let fits_f32 = values
            .iter()
            .zip(&flags)
            .filter(|(_, &m)| !m)
            .all(|(v, _)| v.is_nan() || v.abs() <= f32::MAX as f64);
        let target = match (float_dtype, dtype) {
            (Some(ft), _) if dtype.is_integer() => ft,
            (_, Dtype::F64) => Dtype::F64,
            _ if fits_f32 => Dtype::F32,
            _ => Dtype::F64,
        };
        from_f64(values, &shape, target)
    } else {
        let int_params = |flat: usize| -> (i128, i128) {
            let (s, o) = param(flat);
            (s as i128, o as i128)
        };
        let values: Vec<i128> = (0..obj.data.len())
            .zip(obj.data.iter_f64())
            .map(|(i, x)| {
                let (s, o) = int_params(i);
                (x as i128) * s + o
            })
            .collect();
        let extent = values
            .iter()
            .zip(&flags)
            .filter(|(_, &m)| !m)
            .map(|(v, _)| *v)
            .fold(None::<(i128, i128)>, |acc, v| {
                Some(match acc {
                    None => (v, v),
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                })
            });
        let target = match extent {
            None => dtype,
            Some((lo, hi)) => {
                let fits = |d: Dtype| {
                    d.int_range()
                        .map(|(dlo, dhi)| dlo <= lo && hi <= dhi)
                        .unwrap_or(false)
                };
                if fits(dtype) {
                    dtype
                } else {
                    *INT_CANDIDATES
                        .iter()
                        .find(|&&d| fits(d))
                        .ok_or(ScaleError::NoSuitableDtype)?
                }
            }
        };
        from_i128(values, &shape, target)
    };
    Ok(MaskedArray {
        data,
        mask: obj.mask,
    })
}

/// Mask special constants then apply declared scaling, the standard
/// postprocessing pipeline for freshly decoded numeric objects.
pub fn mask_and_scale(
    block: Option<&LabelBlock>,
    data: DataArray,
    float_dtype: Option<Dtype>,
) -> Result<MaskedArray, ScaleError> {
    let specials = find_special_constants(block, &data);
    let masked = mask_specials(data, &specials);
    scale_array(block, masked, float_dtype)
}

fn from_f64(values: Vec<f64>, shape: &[usize], target: Dtype) -> DataArray {
    use ndarray::{ArrayD, IxDyn};
    let dim = IxDyn(shape);
    match target {
        Dtype::F32 => DataArray::F32(
            ArrayD::from_shape_vec(dim, values.into_iter().map(|v| v as f32).collect())
                .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[0]))),
        ),
        _ => DataArray::F64(
            ArrayD::from_shape_vec(dim, values).unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[0]))),
        ),
    }
}

fn from_i128(values: Vec<i128>, shape: &[usize], target: Dtype) -> DataArray {
    use ndarray::{ArrayD, IxDyn};
    macro_rules! build {
        ($ty:ty, $variant:ident) => {
            DataArray::$variant(
                ArrayD::from_shape_vec(
                    IxDyn(shape),
                    values.into_iter().map(|v| v as $ty).collect(),
                )
                .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[0]))),
            )
        };
    }
    match target {
        Dtype::U8 => build!(u8, U8),
        Dtype::I8 => build!(i8, I8),
        Dtype::U16 => build!(u16, U16),
        Dtype::I16 => build!(i16, I16),
        Dtype::U32 => build!(u32, U32),
        Dtype::I32 => build!(i32, I32),
        Dtype::I64 => build!(i64, I64),
        Dtype::F32 => build!(f32, F32),
        Dtype::F64 => build!(f64, F64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::literalize;
    use ndarray::{ArrayD, IxDyn};

    fn i16_array(values: &[i16]) -> DataArray {
        DataArray::I16(
            ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).expect("shape"),
        )
    }

    fn block(pairs: &[(&str, &str)]) -> LabelBlock {
        let mut b = LabelBlock::new();
        for (k, v) in pairs {
            b.add(k.to_string(), literalize(v));
        }
        b
    }

    #[test]
    fn identity_scaling_returns_same_buffer() {
        let arr = MaskedArray::unmasked(i16_array(&[1, 2, 3]));
        let before = arr.data.buffer_ptr();
        let block = block(&[("SCALING_FACTOR", "1"), ("OFFSET", "0")]);
        let out = scale_array(Some(&block), arr, None).expect("scales");
        assert_eq!(out.data.buffer_ptr(), before);
    }

    #[test]
    fn integer_scaling_promotes_without_wrapping() {
        let arr = MaskedArray::unmasked(i16_array(&[30000, -30000]));
        let block = block(&[("SCALING_FACTOR", "4")]);
        let out = scale_array(Some(&block), arr, None).expect("scales");
        assert_eq!(out.data.dtype(), Dtype::I32);
        let values: Vec<f64> = out.data.iter_f64().collect();
        assert_eq!(values, vec![120000.0, -120000.0]);
    }

    #[test]
    fn masked_sentinels_do_not_force_promotion() {
        let data = i16_array(&[10, 20, -32768]);
        let specials = vec![("N/A".to_string(), -32768.0)];
        let masked = mask_specials(data, &specials);
        let block = block(&[("SCALING_FACTOR", "2")]);
        let out = scale_array(Some(&block), masked, None).expect("scales");
        assert_eq!(out.data.dtype(), Dtype::I16);
        assert!(out.mask[IxDyn(&[2])]);
    }

    #[test]
    fn float_operands_cast_integers_to_float() {
        let arr = MaskedArray::unmasked(i16_array(&[2, 4]));
        let block = block(&[("SCALING_FACTOR", "0.5")]);
        let out = scale_array(Some(&block), arr, None).expect("scales");
        assert_eq!(out.data.dtype(), Dtype::F32);
        let values: Vec<f64> = out.data.iter_f64().collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn explicit_float_dtype_wins() {
        let arr = MaskedArray::unmasked(i16_array(&[2, 4]));
        let block = block(&[("OFFSET", "0.25")]);
        let out = scale_array(Some(&block), arr, Some(Dtype::F64)).expect("scales");
        assert_eq!(out.data.dtype(), Dtype::F64);
    }

    #[test]
    fn implicit_constants_skip_u8() {
        let data = DataArray::U8(
            ArrayD::from_shape_vec(IxDyn(&[2]), vec![0u8, 255]).expect("shape"),
        );
        assert!(find_special_constants(None, &data).is_empty());
        let data = i16_array(&[1, -32768]);
        let specials = find_special_constants(None, &data);
        assert!(specials.iter().any(|(n, v)| n == "N/A" && *v == -32768.0));
    }

    #[test]
    fn unrepresentable_scaling_is_an_error() {
        let arr = MaskedArray::unmasked(DataArray::I64(
            ArrayD::from_shape_vec(IxDyn(&[1]), vec![i64::MAX]).expect("shape"),
        ));
        let block = block(&[("SCALING_FACTOR", "2")]);
        assert!(matches!(
            scale_array(Some(&block), arr, None),
            Err(ScaleError::NoSuitableDtype)
        ));
    }

    #[test]
    fn per_plane_scaling() {
        let data = DataArray::I16(
            ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1i16, 2, 3, 4]).expect("shape"),
        );
        let block = block(&[("SCALING_FACTOR", "(2, 10)"), ("OFFSET", "(0, 1)")]);
        let out =
            scale_array(Some(&block), MaskedArray::unmasked(data), None).expect("scales");
        let values: Vec<f64> = out.data.iter_f64().collect();
        assert_eq!(values, vec![2.0, 4.0, 31.0, 41.0]);
    }
}
