//! IMAGE and QUBE decoding.
//!
//! An image decodes in three stages: resolve an [`ImageProps`] from the label
//! block (dimensions, element type, padding from ISIS axplanes and line
//! prefixes/suffixes), read and decode the flat pixel buffer, then reshape per
//! the band storage type and cut away the padding planes.

use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use thiserror::Error;

use crate::array::DataArray;
use crate::dtypes::{resolve_sample_type, DtypeError, ElementType, Endian};
use crate::label::LabelBlock;
use crate::stream;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Dtype(#[from] DtypeError),
    #[error("image definition is missing {0}")]
    MissingParameter(String),
    #[error("cannot read a 3D image with no specified band storage type")]
    NoBandStorageType,
    #[error("{0} declared with no specified number of items")]
    AxplaneWithoutItems(String),
    #[error("axplanes declared with no specified axis order")]
    AxplaneWithoutAxnames,
    #[error("pre/suffix item size smaller than the array element size is not supported")]
    MisalignedAxplane,
    #[error("line pre/suffixes not aligned with the array element size are not supported")]
    MisalignedLinefix,
    #[error("objects with both line pre/suffixes and ISIS axplanes are not supported")]
    MixedFixes,
    #[error("ISIS axplanes along multiple axes are not supported")]
    MultiAxisAxplanes,
    #[error("line pre/suffixes are not supported for non-BIL multiband images")]
    LinefixBandStorage,
    #[error("image data ends before its declared extent ({got} of {want} bytes)")]
    ShortRead { want: usize, got: usize },
    #[error("image does not fit its declared dimensions: {0}")]
    BadShape(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandStorage {
    BandSequential,
    SampleInterleaved,
    LineInterleaved,
    /// ISIS2 qubes with no axis names; laid out band-sequentially.
    Isis2Qube,
}

/// Everything needed to cut an image out of a file: core dimensions, element
/// type, and the padding contributed by ISIS axplanes (whole planes of
/// prefix/suffix items along one axis) or conventional line prefixes/suffixes
/// (extra bytes on each line).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageProps {
    pub element: ElementType,
    pub nrows: usize,
    pub ncols: usize,
    pub nbands: usize,
    pub band_storage: Option<BandStorage>,
    pub rowpad: usize,
    pub colpad: usize,
    pub bandpad: usize,
    pub prefix_rows: Option<usize>,
    pub suffix_rows: Option<usize>,
    pub prefix_cols: Option<usize>,
    pub suffix_cols: Option<usize>,
    pub prefix_bands: Option<usize>,
    pub suffix_bands: Option<usize>,
    pub line_prefix_pix: usize,
    pub line_suffix_pix: usize,
}

impl ImageProps {
    /// Total elements in the file region, padding included.
    pub fn pixels(&self) -> usize {
        (self.nrows + self.rowpad)
            * (self.ncols + self.colpad + self.line_prefix_pix + self.line_suffix_pix)
            * (self.nbands + self.bandpad)
    }

    fn linepad(&self) -> usize {
        self.line_prefix_pix + self.line_suffix_pix
    }
}

/// A decoded image: the core array plus any stripped padding regions.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub data: DataArray,
    pub line_prefixes: Option<DataArray>,
    pub line_suffixes: Option<DataArray>,
    pub axplanes: Vec<(String, DataArray)>,
}

/// Resolve image properties for an IMAGE or QUBE block by name.
pub fn image_properties(name: &str, block: &LabelBlock) -> Result<ImageProps, ImageError> {
    if name.contains("QUBE") {
        generic_qube_properties(block)
    } else {
        generic_image_properties(block)
    }
}

fn require_int(block: &LabelBlock, key: &str) -> Result<usize, ImageError> {
    block
        .get_int(key)
        .map(|v| v.max(0) as usize)
        .ok_or_else(|| ImageError::MissingParameter(key.to_string()))
}

fn parse_band_storage(name: &str) -> Option<BandStorage> {
    match name {
        "BAND_SEQUENTIAL" => Some(BandStorage::BandSequential),
        "SAMPLE_INTERLEAVED" => Some(BandStorage::SampleInterleaved),
        "LINE_INTERLEAVED" => Some(BandStorage::LineInterleaved),
        _ => None,
    }
}

/// Image properties from a standard IMAGE definition.
pub fn generic_image_properties(block: &LabelBlock) -> Result<ImageProps, ImageError> {
    let sample_bits = require_int(block, "SAMPLE_BITS")?;
    let bytes_per_pixel = sample_bits / 8;
    let sample_type = block
        .get_str("SAMPLE_TYPE")
        .ok_or_else(|| ImageError::MissingParameter("SAMPLE_TYPE".to_string()))?;
    let element = resolve_sample_type(sample_type, bytes_per_pixel, false)?;
    let nrows = require_int(block, "LINES")?;
    let ncols = require_int(block, "LINE_SAMPLES")?;
    let (nbands, band_storage) = match block.get_int("BANDS") {
        Some(bands) => {
            let bands = bands.max(0) as usize;
            let storage = block.get_str("BAND_STORAGE_TYPE").and_then(|name| {
                let parsed = parse_band_storage(name);
                if parsed.is_none() {
                    log::warn!("unsupported BAND_STORAGE_TYPE={name}; guessing BAND_SEQUENTIAL");
                    return Some(BandStorage::BandSequential);
                }
                parsed
            });
            if storage.is_none() && bands > 1 {
                return Err(ImageError::NoBandStorageType);
            }
            (bands, storage)
        }
        None => (1, None),
    };
    let mut props = ImageProps {
        element,
        nrows,
        ncols,
        nbands,
        band_storage,
        rowpad: 0,
        colpad: 0,
        bandpad: 0,
        prefix_rows: None,
        suffix_rows: None,
        prefix_cols: None,
        suffix_cols: None,
        prefix_bands: None,
        suffix_bands: None,
        line_prefix_pix: 0,
        line_suffix_pix: 0,
    };
    apply_axplane_metadata(block, None, bytes_per_pixel.max(1), &mut props)?;
    apply_linefix_metadata(block, bytes_per_pixel.max(1), &mut props)?;
    Ok(props)
}

/// Image properties from an ISIS2-style QUBE definition. Dimensions come from
/// CORE_ITEMS ordered by AXIS_NAME; band storage falls back to the axis order
/// (ISIS axes are listed first-axis-fastest).
pub fn generic_qube_properties(block: &LabelBlock) -> Result<ImageProps, ImageError> {
    let core = block.block("CORE").unwrap_or(block);
    let bytes_per_pixel = require_int(core, "CORE_ITEM_BYTES")?;
    let item_type = core
        .get_str("CORE_ITEM_TYPE")
        .ok_or_else(|| ImageError::MissingParameter("CORE_ITEM_TYPE".to_string()))?;
    let element = resolve_sample_type(item_type, bytes_per_pixel, false)?;
    let core_items: Vec<usize> = core
        .first("CORE_ITEMS")
        .and_then(|v| v.as_sequence())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_int())
                .map(|v| v.max(0) as usize)
                .collect()
        })
        .ok_or_else(|| ImageError::MissingParameter("CORE_ITEMS".to_string()))?;
    let axnames: Option<Vec<String>> = block
        .first("AXIS_NAME")
        .or_else(|| core.first("AXIS_NAME"))
        .and_then(|v| v.as_sequence())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        });
    let (mut nrows, mut ncols, mut nbands) = (0, 0, 1);
    match &axnames {
        Some(names) => {
            for (name, &count) in names.iter().zip(&core_items) {
                match name.as_str() {
                    "LINE" => nrows = count,
                    "SAMPLE" => ncols = count,
                    "BAND" => nbands = count,
                    _ => {}
                }
            }
        }
        None => {
            nrows = core_items.get(2).copied().unwrap_or(0);
            ncols = core_items.first().copied().unwrap_or(0);
            nbands = core_items.get(1).copied().unwrap_or(1);
        }
    }
    let band_storage = match block.get_str("BAND_STORAGE_TYPE").and_then(parse_band_storage) {
        Some(storage) => Some(storage),
        None => match &axnames {
            // reversed: ISIS lists axes fastest-first
            Some(names) => {
                let reversed: Vec<&str> = names.iter().rev().map(String::as_str).collect();
                match reversed.as_slice() {
                    ["BAND", "LINE", "SAMPLE"] => Some(BandStorage::BandSequential),
                    ["LINE", "SAMPLE", "BAND"] => Some(BandStorage::SampleInterleaved),
                    ["LINE", "BAND", "SAMPLE"] => Some(BandStorage::LineInterleaved),
                    _ => Some(BandStorage::Isis2Qube),
                }
            }
            None => Some(BandStorage::Isis2Qube),
        },
    };
    let mut props = ImageProps {
        element,
        nrows,
        ncols,
        nbands,
        band_storage,
        rowpad: 0,
        colpad: 0,
        bandpad: 0,
        prefix_rows: None,
        suffix_rows: None,
        prefix_cols: None,
        suffix_cols: None,
        prefix_bands: None,
        suffix_bands: None,
        line_prefix_pix: 0,
        line_suffix_pix: 0,
    };
    apply_axplane_metadata(block, axnames.as_deref(), bytes_per_pixel.max(1), &mut props)?;
    apply_linefix_metadata(block, bytes_per_pixel.max(1), &mut props)?;
    Ok(props)
}

/// ISIS side/back/bottomplane metadata: `{AX}_{SIDE}_ITEM_BYTES` with a
/// matching `{SIDE}_ITEMS` count per axis.
fn apply_axplane_metadata(
    block: &LabelBlock,
    axnames: Option<&[String]>,
    bytes_per_pixel: usize,
    props: &mut ImageProps,
) -> Result<(), ImageError> {
    const AXES: [&str; 3] = ["BAND", "LINE", "SAMPLE"];
    const SIDES: [&str; 2] = ["PREFIX", "SUFFIX"];
    for ax in AXES {
        for side in SIDES {
            let key = format!("{ax}_{side}_ITEM_BYTES");
            let Some(item_bytes) = block.get_int(&key) else {
                continue;
            };
            let item_counts: Vec<usize> = match block
                .first(&format!("{side}_ITEMS"))
                .and_then(|v| v.as_sequence())
            {
                Some(items) => items
                    .iter()
                    .filter_map(|v| v.as_int())
                    .map(|v| v.max(0) as usize)
                    .collect(),
                None => return Err(ImageError::AxplaneWithoutItems(key)),
            };
            let Some(axnames) = axnames else {
                return Err(ImageError::AxplaneWithoutAxnames);
            };
            let Some(ax_ix) = axnames.iter().position(|n| n == ax) else {
                return Err(ImageError::AxplaneWithoutAxnames);
            };
            let fix_bytes = item_counts.get(ax_ix).copied().unwrap_or(0) * item_bytes.max(0) as usize;
            if fix_bytes % bytes_per_pixel != 0 {
                return Err(ImageError::MisalignedAxplane);
            }
            let fix_pix = fix_bytes / bytes_per_pixel;
            let (slot, pad) = match (ax, side) {
                ("BAND", "PREFIX") => (&mut props.prefix_bands, &mut props.bandpad),
                ("BAND", "SUFFIX") => (&mut props.suffix_bands, &mut props.bandpad),
                ("LINE", "PREFIX") => (&mut props.prefix_rows, &mut props.rowpad),
                ("LINE", "SUFFIX") => (&mut props.suffix_rows, &mut props.rowpad),
                ("SAMPLE", "PREFIX") => (&mut props.prefix_cols, &mut props.colpad),
                _ => (&mut props.suffix_cols, &mut props.colpad),
            };
            *slot = Some(fix_pix);
            *pad += fix_pix;
        }
    }
    Ok(())
}

/// Conventional line prefix/suffix metadata: `LINE_{SIDE}_BYTES` of extra
/// bytes on every line.
fn apply_linefix_metadata(
    block: &LabelBlock,
    bytes_per_pixel: usize,
    props: &mut ImageProps,
) -> Result<(), ImageError> {
    for (key, slot) in [
        ("LINE_PREFIX_BYTES", &mut props.line_prefix_pix),
        ("LINE_SUFFIX_BYTES", &mut props.line_suffix_pix),
    ] {
        let Some(fix_bytes) = block.get_int(key).filter(|&v| v > 0) else {
            continue;
        };
        let fix_bytes = fix_bytes as usize;
        if fix_bytes % bytes_per_pixel != 0 {
            return Err(ImageError::MisalignedLinefix);
        }
        *slot = fix_bytes / bytes_per_pixel;
    }
    Ok(())
}

/// Reject padding combinations with no defined layout.
fn check_fix_validity(props: &ImageProps) -> Result<(), ImageError> {
    let axpad = props.rowpad + props.colpad + props.bandpad;
    if props.linepad() > 0 && axpad > 0 {
        return Err(ImageError::MixedFixes);
    }
    let padded_axes = [props.rowpad, props.colpad, props.bandpad]
        .iter()
        .filter(|&&p| p > 0)
        .count();
    if padded_axes > 1 {
        return Err(ImageError::MultiAxisAxplanes);
    }
    if props.linepad() > 0
        && !matches!(
            props.band_storage,
            None | Some(BandStorage::LineInterleaved)
        )
    {
        return Err(ImageError::LinefixBandStorage);
    }
    Ok(())
}

/// Decode `count` flat elements from raw bytes. Shared by the image and
/// primitive-array readers.
pub fn decode_elements(
    raw: &[u8],
    element: &ElementType,
    count: usize,
) -> Result<DataArray, DtypeError> {
    use byteorder::{BigEndian, ByteOrder, LittleEndian};
    let width = element.bytes();
    if width == 0 {
        return Err(DtypeError::Unsupported(format!("{element:?}"), 0));
    }
    let cells = raw.chunks_exact(width).take(count);
    let build = |values: Vec<f64>| -> DataArray {
        DataArray::F64(ArrayD::from_shape_vec(IxDyn(&[values.len()]), values).unwrap_or_default())
    };
    let array = match element {
        ElementType::Int {
            bytes,
            signed,
            order,
        } => {
            macro_rules! ints {
                ($read:expr, $variant:ident) => {
                    DataArray::$variant(
                        ArrayD::from_shape_vec(
                            IxDyn(&[count.min(raw.len() / width.max(1))]),
                            cells.map($read).collect(),
                        )
                        .unwrap_or_default(),
                    )
                };
            }
            match (bytes, signed, order) {
                (1, false, _) => ints!(|c: &[u8]| c[0], U8),
                (1, true, _) => ints!(|c: &[u8]| c[0] as i8, I8),
                (2, false, Endian::Big) => ints!(BigEndian::read_u16, U16),
                (2, false, Endian::Little) => ints!(LittleEndian::read_u16, U16),
                (2, true, Endian::Big) => ints!(BigEndian::read_i16, I16),
                (2, true, Endian::Little) => ints!(LittleEndian::read_i16, I16),
                (4, false, Endian::Big) => ints!(BigEndian::read_u32, U32),
                (4, false, Endian::Little) => ints!(LittleEndian::read_u32, U32),
                (4, true, Endian::Big) => ints!(BigEndian::read_i32, I32),
                (4, true, Endian::Little) => ints!(LittleEndian::read_i32, I32),
                (_, _, Endian::Big) => ints!(|c: &[u8]| BigEndian::read_u64(c) as i64, I64),
                (_, _, Endian::Little) => {
                    ints!(|c: &[u8]| LittleEndian::read_u64(c) as i64, I64)
                }
            }
        }
        ElementType::Float { bytes: 4, order } => {
            let values: Vec<f32> = cells
                .map(|c| match order {
                    Endian::Big => f32::from_bits(BigEndian::read_u32(c)),
                    Endian::Little => f32::from_bits(LittleEndian::read_u32(c)),
                })
                .collect();
            DataArray::F32(
                ArrayD::from_shape_vec(IxDyn(&[values.len()]), values).unwrap_or_default(),
            )
        }
        ElementType::Float { order, .. } => build(
            cells
                .map(|c| match order {
                    Endian::Big => f64::from_bits(BigEndian::read_u64(c)),
                    Endian::Little => f64::from_bits(LittleEndian::read_u64(c)),
                })
                .collect(),
        ),
        ElementType::VaxReal => {
            let values: Vec<f32> = cells.map(vax32_to_f32).collect();
            DataArray::F32(
                ArrayD::from_shape_vec(IxDyn(&[values.len()]), values).unwrap_or_default(),
            )
        }
        ElementType::IbmReal { bytes: 4, order } => build(
            cells
                .map(|c| {
                    let word = match order {
                        Endian::Big => BigEndian::read_u32(c),
                        Endian::Little => LittleEndian::read_u32(c),
                    };
                    ibm_real(word as u64, 31, 24, 0x00ff_ffff)
                })
                .collect(),
        ),
        ElementType::IbmReal { order, .. } => build(
            cells
                .map(|c| {
                    let word = match order {
                        Endian::Big => BigEndian::read_u64(c),
                        Endian::Little => LittleEndian::read_u64(c),
                    };
                    ibm_real(word, 63, 56, 0x00ff_ffff_ffff_ffff)
                })
                .collect(),
        ),
        other => {
            return Err(DtypeError::Unsupported(
                format!("{other:?}"),
                other.bytes(),
            ))
        }
    };
    Ok(array)
}

fn ibm_real(word: u64, sign_bit: u32, exp_shift: u32, mantissa_mask: u64) -> f64 {
    let sign = 1.0 - 2.0 * ((word >> sign_bit & 1) as f64);
    let exponent = ((word >> exp_shift) & 0x7f) as f64;
    let mantissa = (word & mantissa_mask) as f64 / (1u64 << exp_shift) as f64;
    sign * mantissa * 16f64.powf(exponent - 64.0)
}

/// Convert a 4-byte VAX F-floating value: swap the two 16-bit words, then the
/// result is little-endian IEEE scaled by 4.
fn vax32_to_f32(c: &[u8]) -> f32 {
    f32::from_le_bytes([c[2], c[3], c[0], c[1]]) / 4.0
}

/// Read and decode an image from a file region.
pub fn read_image(
    path: &Path,
    props: &ImageProps,
    start_byte: u64,
) -> Result<Image, ImageError> {
    check_fix_validity(props)?;
    let pixels = props.pixels();
    let width = props.element.bytes();
    let want = pixels * width;
    let raw = stream::read_range(path, start_byte, Some(want as u64))?;
    if raw.len() < want {
        return Err(ImageError::ShortRead {
            want,
            got: raw.len(),
        });
    }
    let flat = decode_elements(&raw, &props.element, pixels)?;
    if props.nbands + props.bandpad <= 1 {
        decode_single_band(flat, props)
    } else {
        decode_multiband(flat, props)
    }
}

fn reshape(data: DataArray, shape: &[usize]) -> Result<DataArray, ImageError> {
    data.reshape(shape)
        .map_err(|e| ImageError::BadShape(e.to_string()))
}

fn decode_single_band(flat: DataArray, props: &ImageProps) -> Result<Image, ImageError> {
    let (image, line_prefixes, line_suffixes) = extract_linefix(
        flat,
        props.nrows,
        props.line_prefix_pix,
        props.line_suffix_pix,
    )?;
    let image = reshape(
        image,
        &[props.nrows + props.rowpad, props.ncols + props.colpad],
    )?;
    let (data, axplanes) = extract_axplanes(image, props);
    Ok(Image {
        data,
        line_prefixes,
        line_suffixes,
        axplanes,
    })
}

fn decode_multiband(flat: DataArray, props: &ImageProps) -> Result<Image, ImageError> {
    let bands = props.nbands + props.bandpad;
    let lines = props.nrows + props.rowpad;
    let samples = props.ncols + props.colpad;
    let storage = props
        .band_storage
        .unwrap_or(BandStorage::BandSequential);
    let (image, line_prefixes, line_suffixes) = match storage {
        BandStorage::BandSequential => (reshape(flat, &[bands, lines, samples])?, None, None),
        BandStorage::Isis2Qube => {
            log::warn!("qube has no resolvable axis order; guessing BAND_SEQUENTIAL");
            (reshape(flat, &[bands, lines, samples])?, None, None)
        }
        BandStorage::SampleInterleaved => (
            reshape(flat, &[lines, samples, bands])?.moveaxis(2, 0),
            None,
            None,
        ),
        BandStorage::LineInterleaved => {
            // every band's line carries its own prefix/suffix
            let (stripped, pre, suf) = extract_linefix(
                flat,
                lines * bands,
                props.line_prefix_pix,
                props.line_suffix_pix,
            )?;
            (
                reshape(stripped, &[lines, bands, samples])?.moveaxis(0, 1),
                pre,
                suf,
            )
        }
    };
    let (data, axplanes) = extract_axplanes(image, props);
    Ok(Image {
        data,
        line_prefixes,
        line_suffixes,
        axplanes,
    })
}

/// Strip conventional line prefixes/suffixes from a flat buffer: reshape to
/// one row per line and cut the declared columns off each end.
fn extract_linefix(
    flat: DataArray,
    nrows: usize,
    prefix_pix: usize,
    suffix_pix: usize,
) -> Result<(DataArray, Option<DataArray>, Option<DataArray>), ImageError> {
    if prefix_pix + suffix_pix == 0 || nrows == 0 {
        return Ok((flat, None, None));
    }
    let line_len = flat.len() / nrows;
    let mut image = reshape(flat, &[nrows, line_len])?;
    let mut suffix = None;
    let mut prefix = None;
    if suffix_pix > 0 {
        let cols = image.shape()[1];
        suffix = Some(image.slice_axis(1, cols - suffix_pix, cols));
        image = image.slice_axis(1, 0, cols - suffix_pix);
    }
    if prefix_pix > 0 {
        let cols = image.shape()[1];
        prefix = Some(image.slice_axis(1, 0, prefix_pix));
        image = image.slice_axis(1, prefix_pix, cols);
    }
    Ok((image, prefix, suffix))
}

/// Cut ISIS prefix/suffix planes off the named axes, in a fixed order, each
/// cut applying to the image left by the previous one.
fn extract_axplanes(mut image: DataArray, props: &ImageProps) -> (DataArray, Vec<(String, DataArray)>) {
    let mut axplanes = Vec::new();
    let plan: [(&str, &str, Option<usize>); 6] = [
        ("prefix", "row", props.prefix_rows),
        ("prefix", "col", props.prefix_cols),
        ("prefix", "band", props.prefix_bands),
        ("suffix", "row", props.suffix_rows),
        ("suffix", "col", props.suffix_cols),
        ("suffix", "band", props.suffix_bands),
    ];
    for (side, ax, count) in plan {
        let Some(count) = count.filter(|&c| c > 0) else {
            continue;
        };
        let axis = match (ax, image.ndim()) {
            ("band", 3) => 0,
            ("row", 3) => 1,
            ("col", 3) => 2,
            ("row", 2) => 0,
            ("col", 2) => 1,
            _ => {
                log::warn!("cannot cut a {ax} axplane from a {}D image", image.ndim());
                continue;
            }
        };
        let dim = image.shape()[axis];
        if count > dim {
            log::warn!("{side} {ax} plane of {count} exceeds axis length {dim}");
            continue;
        }
        let (plane, rest) = if side == "prefix" {
            (
                image.slice_axis(axis, 0, count),
                image.slice_axis(axis, count, dim),
            )
        } else {
            (
                image.slice_axis(axis, dim - count, dim),
                image.slice_axis(axis, 0, dim - count),
            )
        };
        axplanes.push((format!("{side}_{ax}s"), plane));
        image = rest;
    }
    (image, axplanes)
}
