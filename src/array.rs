//! Typed n-dimensional arrays decoded from data objects.
//!
//! [`DataArray`] wraps an `ndarray::ArrayD` of each supported element dtype
//! behind one enum so decoders and the scaling engine can pass arrays around
//! without generics at the API surface.

use ndarray::{ArrayD, Axis, IxDyn, Slice};

use crate::dtypes::Dtype;

#[derive(Debug, Clone, PartialEq)]
pub enum DataArray {
    U8(ArrayD<u8>),
    I8(ArrayD<i8>),
    U16(ArrayD<u16>),
    I16(ArrayD<i16>),
    U32(ArrayD<u32>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

macro_rules! each {
    ($self:expr, $arr:ident => $body:expr) => {
        match $self {
            DataArray::U8($arr) => $body,
            DataArray::I8($arr) => $body,
            DataArray::U16($arr) => $body,
            DataArray::I16($arr) => $body,
            DataArray::U32($arr) => $body,
            DataArray::I32($arr) => $body,
            DataArray::I64($arr) => $body,
            DataArray::F32($arr) => $body,
            DataArray::F64($arr) => $body,
        }
    };
}

macro_rules! each_wrap {
    ($self:expr, $arr:ident => $body:expr) => {
        match $self {
            DataArray::U8($arr) => DataArray::U8($body),
            DataArray::I8($arr) => DataArray::I8($body),
            DataArray::U16($arr) => DataArray::U16($body),
            DataArray::I16($arr) => DataArray::I16($body),
            DataArray::U32($arr) => DataArray::U32($body),
            DataArray::I32($arr) => DataArray::I32($body),
            DataArray::I64($arr) => DataArray::I64($body),
            DataArray::F32($arr) => DataArray::F32($body),
            DataArray::F64($arr) => DataArray::F64($body),
        }
    };
}

macro_rules! from_impl {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<ArrayD<$ty>> for DataArray {
            fn from(a: ArrayD<$ty>) -> Self {
                DataArray::$variant(a)
            }
        })*
    };
}

from_impl!(
    u8 => U8, i8 => I8, u16 => U16, i16 => I16,
    u32 => U32, i32 => I32, i64 => I64, f32 => F32, f64 => F64,
);

impl DataArray {
    pub fn dtype(&self) -> Dtype {
        match self {
            DataArray::U8(_) => Dtype::U8,
            DataArray::I8(_) => Dtype::I8,
            DataArray::U16(_) => Dtype::U16,
            DataArray::I16(_) => Dtype::I16,
            DataArray::U32(_) => Dtype::U32,
            DataArray::I32(_) => Dtype::I32,
            DataArray::I64(_) => Dtype::I64,
            DataArray::F32(_) => Dtype::F32,
            DataArray::F64(_) => Dtype::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        each!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        each!(self, a => a.ndim())
    }

    pub fn len(&self) -> usize {
        each!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address of the backing buffer. Only meaningful for identity checks
    /// (did an operation hand back the same allocation).
    pub fn buffer_ptr(&self) -> *const () {
        each!(self, a => a.as_ptr() as *const ())
    }

    /// Elements in logical (row-major) order, widened to `f64`.
    pub fn iter_f64(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        each!(self, a => Box::new(a.iter().map(|&x| x as f64)))
    }

    /// True if `value` occurs in the array, compared after widening to `f64`.
    pub fn contains(&self, value: f64) -> bool {
        self.iter_f64().any(|x| x == value)
    }

    /// True for float arrays holding any NaN or infinity.
    pub fn has_nonfinite(&self) -> bool {
        match self {
            DataArray::F32(a) => a.iter().any(|x| !x.is_finite()),
            DataArray::F64(a) => a.iter().any(|x| !x.is_finite()),
            _ => false,
        }
    }

    /// Min and max of elements whose mask flag is unset, as `f64`. `None` for
    /// an empty or fully masked array.
    pub fn range_f64(&self, mask: Option<&ArrayD<bool>>) -> Option<(f64, f64)> {
        let flags: Option<Vec<bool>> = mask.map(|m| m.iter().copied().collect());
        let mut out: Option<(f64, f64)> = None;
        for (i, x) in self.iter_f64().enumerate() {
            if flags.as_ref().is_some_and(|f| f.get(i).copied().unwrap_or(false)) {
                continue;
            }
            if x.is_nan() {
                continue;
            }
            out = Some(match out {
                None => (x, x),
                Some((lo, hi)) => (lo.min(x), hi.max(x)),
            });
        }
        out
    }

    /// Exact min and max for integer arrays, skipping masked elements.
    pub fn range_int(&self, mask: Option<&ArrayD<bool>>) -> Option<(i128, i128)> {
        if !self.dtype().is_integer() {
            return None;
        }
        let flags: Option<Vec<bool>> = mask.map(|m| m.iter().copied().collect());
        let mut out: Option<(i128, i128)> = None;
        let values: Box<dyn Iterator<Item = i128> + '_> =
            each!(self, a => Box::new(a.iter().map(|&x| x as i128)));
        for (i, x) in values.enumerate() {
            if flags.as_ref().is_some_and(|f| f.get(i).copied().unwrap_or(false)) {
                continue;
            }
            out = Some(match out {
                None => (x, x),
                Some((lo, hi)) => (lo.min(x), hi.max(x)),
            });
        }
        out
    }

    /// Elementwise numeric cast, `as`-conversion semantics.
    pub fn cast(&self, to: Dtype) -> DataArray {
        each!(self, a => match to {
            Dtype::U8 => DataArray::U8(a.mapv(|x| x as u8)),
            Dtype::I8 => DataArray::I8(a.mapv(|x| x as i8)),
            Dtype::U16 => DataArray::U16(a.mapv(|x| x as u16)),
            Dtype::I16 => DataArray::I16(a.mapv(|x| x as i16)),
            Dtype::U32 => DataArray::U32(a.mapv(|x| x as u32)),
            Dtype::I32 => DataArray::I32(a.mapv(|x| x as i32)),
            Dtype::I64 => DataArray::I64(a.mapv(|x| x as i64)),
            Dtype::F32 => DataArray::F32(a.mapv(|x| x as f32)),
            Dtype::F64 => DataArray::F64(a.mapv(|x| x as f64)),
        })
    }

    /// Move axis `from` to position `to`, keeping the order of the others.
    /// The result is repacked into standard layout.
    pub fn moveaxis(self, from: usize, to: usize) -> DataArray {
        let n = self.ndim();
        let mut order: Vec<usize> = (0..n).filter(|&i| i != from).collect();
        order.insert(to, from);
        each_wrap!(self, a => {
            a.permuted_axes(IxDyn(&order)).as_standard_layout().to_owned()
        })
    }

    /// Keep `[start, end)` along one axis, repacked into standard layout.
    pub fn slice_axis(&self, axis: usize, start: usize, end: usize) -> DataArray {
        each_wrap!(self, a => {
            a.slice_axis(Axis(axis), Slice::from(start..end))
                .as_standard_layout()
                .to_owned()
        })
    }

    pub fn reshape(self, shape: &[usize]) -> Result<DataArray, ndarray::ShapeError> {
        Ok(each_wrap!(self, a => a.into_shape_with_order(IxDyn(shape))?))
    }
}

/// An array plus a validity mask. `true` in the mask marks an element that is
/// a special constant (or non-finite) and must be excluded from computation.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedArray {
    pub data: DataArray,
    pub mask: ArrayD<bool>,
}

impl MaskedArray {
    pub fn unmasked(data: DataArray) -> MaskedArray {
        let mask = ArrayD::from_elem(IxDyn(data.shape()), false);
        MaskedArray { data, mask }
    }

    pub fn any_masked(&self) -> bool {
        self.mask.iter().any(|&m| m)
    }
}
