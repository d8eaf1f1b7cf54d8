//! GeoTIFF input and output.
//!
//! Reads single-band rasters into a [`Grid`] and writes [`IntGrid`] results
//! back out with the georeferencing, projection keys and `GDAL_NODATA` tag
//! the source carried.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, compression::Lzw, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tiff::ColorType;
use worldpop_common::{GeoTransform, Grid, IntDataType, IntGrid, Projection};

use crate::config::DEFAULT_OUTPUT_NODATA;
use crate::conserve::{Conserved, RasterConserver};
use crate::error::{GridProcessorError, Result};
use crate::types::ConservationReport;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GEO_DOUBLE_PARAMS: u16 = 34736;
const TAG_GEO_ASCII_PARAMS: u16 = 34737;
const TAG_GDAL_NODATA: u16 = 42113;

/// Decoder buffer limit. A continental 100m raster is several GB.
const DECODE_LIMIT: usize = 2 * 1024 * 1024 * 1024;

/// Read the first band of a GeoTIFF file.
pub fn read_grid(path: impl AsRef<Path>) -> Result<Grid> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let grid = read_grid_from(file)?;

    tracing::debug!(
        path = %path.display(),
        width = grid.width,
        height = grid.height,
        nodata = ?grid.nodata,
        "Read raster"
    );

    Ok(grid)
}

/// Read the first band of a GeoTIFF from any seekable reader.
pub fn read_grid_from<R: Read + Seek>(reader: R) -> Result<Grid> {
    let raster = decode(reader)?;
    let data = decode_samples(raster.samples);

    Ok(Grid::new(
        data,
        raster.width,
        raster.height,
        raster.transform,
        raster.nodata,
        raster.projection,
    )?)
}

/// Read a conserved integer raster back without a float round trip.
///
/// The sample format decides the data type; float rasters are rejected. A
/// missing `GDAL_NODATA` tag falls back to [`DEFAULT_OUTPUT_NODATA`].
pub fn read_int_grid(path: impl AsRef<Path>) -> Result<IntGrid> {
    let raster = decode(File::open(path.as_ref())?)?;

    let (data, data_type) = match raster.samples {
        DecodingResult::I16(data) => (data.into_iter().map(i32::from).collect(), IntDataType::Int16),
        DecodingResult::I32(data) => (data, IntDataType::Int32),
        _ => {
            return Err(GridProcessorError::GeoTiff(format!(
                "{} is not a signed 16 or 32 bit raster",
                path.as_ref().display()
            )))
        }
    };

    let nodata = match raster.nodata {
        Some(v) if v.is_finite() && data_type.can_hold(v as i64) => v as i32,
        _ => DEFAULT_OUTPUT_NODATA,
    };

    Ok(IntGrid {
        data,
        width: raster.width,
        height: raster.height,
        transform: raster.transform,
        nodata,
        data_type,
        projection: raster.projection,
    })
}

struct DecodedRaster {
    width: usize,
    height: usize,
    transform: GeoTransform,
    projection: Projection,
    nodata: Option<f64>,
    samples: DecodingResult,
}

fn decode<R: Read + Seek>(reader: R) -> Result<DecodedRaster> {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = DECODE_LIMIT;
    limits.intermediate_buffer_size = DECODE_LIMIT;
    limits.ifd_value_size = DECODE_LIMIT;
    let mut decoder = Decoder::new(reader)?.with_limits(limits);

    match decoder.colortype()? {
        ColorType::Gray(_) => {}
        other => {
            return Err(GridProcessorError::GeoTiff(format!(
                "expected a single-band raster, found {:?}",
                other
            )))
        }
    }

    let (width, height) = decoder.dimensions()?;
    let transform = read_transform(&mut decoder)?;
    let projection = read_projection(&mut decoder);
    let nodata = read_nodata(&mut decoder);
    let samples = decoder.read_image()?;

    Ok(DecodedRaster {
        width: width as usize,
        height: height as usize,
        transform,
        projection,
        nodata,
        samples,
    })
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_TRANSFORMATION)) {
        if m.len() >= 8 {
            return Ok(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }

    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT));
    let pixel_scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE));

    if let (Ok(tiepoint), Ok(scale)) = (tiepoint, pixel_scale) {
        if tiepoint.len() >= 6 && scale.len() >= 2 {
            // Tiepoint [i, j, k, x, y, z] ties raster (i, j) to model (x, y)
            let (sx, sy) = (scale[0], scale[1]);
            let origin_x = tiepoint[3] - tiepoint[0] * sx;
            let origin_y = tiepoint[4] + tiepoint[1] * sy;
            return Ok(GeoTransform::north_up(origin_x, origin_y, sx, -sy));
        }
    }

    Err(GridProcessorError::invalid_metadata(
        "raster has neither a model transformation nor a tiepoint and pixel scale",
    ))
}

fn read_projection<R: Read + Seek>(decoder: &mut Decoder<R>) -> Projection {
    Projection {
        geo_key_directory: decoder
            .get_tag_u16_vec(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY))
            .unwrap_or_default(),
        geo_double_params: decoder
            .get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_GEO_DOUBLE_PARAMS))
            .unwrap_or_default(),
        geo_ascii_params: decoder
            .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GEO_ASCII_PARAMS))
            .ok(),
    }
}

/// GDAL_NODATA is an ASCII number, sometimes NUL or space padded.
fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let raw = decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA))
        .ok()?;
    parse_nodata(&raw)
}

fn parse_nodata(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    match trimmed.to_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        other => other.parse().ok(),
    }
}

fn decode_samples(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}

/// Write an integer grid as an LZW-compressed GeoTIFF.
pub fn write_int_grid(path: impl AsRef<Path>, grid: &IntGrid) -> Result<()> {
    let path = path.as_ref();
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let (width, height) = (grid.width as u32, grid.height as u32);

    match grid.data_type {
        IntDataType::Int16 => {
            let samples = grid
                .data
                .iter()
                .map(|&v| {
                    i16::try_from(v).map_err(|_| GridProcessorError::ValueOutOfRange {
                        value: v as i64,
                        data_type: IntDataType::Int16,
                    })
                })
                .collect::<Result<Vec<i16>>>()?;
            let mut image = encoder
                .new_image_with_compression::<colortype::GrayI16, _>(width, height, Lzw::default())?;
            write_georef(image.encoder(), &grid.transform, &grid.projection, Some(grid.nodata as f64))?;
            image.write_data(&samples)?;
        }
        IntDataType::Int32 => {
            let mut image = encoder
                .new_image_with_compression::<colortype::GrayI32, _>(width, height, Lzw::default())?;
            write_georef(image.encoder(), &grid.transform, &grid.projection, Some(grid.nodata as f64))?;
            image.write_data(&grid.data)?;
        }
    }

    tracing::debug!(
        path = %path.display(),
        width = grid.width,
        height = grid.height,
        data_type = %grid.data_type,
        "Wrote integer raster"
    );

    Ok(())
}

/// Write a float grid as an LZW-compressed GeoTIFF.
pub fn write_grid(path: impl AsRef<Path>, grid: &Grid) -> Result<()> {
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path.as_ref())?))?;
    let mut image = encoder.new_image_with_compression::<colortype::Gray32Float, _>(
        grid.width as u32,
        grid.height as u32,
        Lzw::default(),
    )?;
    write_georef(image.encoder(), &grid.transform, &grid.projection, grid.nodata)?;
    image.write_data(&grid.data)?;
    Ok(())
}

fn write_georef<W: Write + Seek, K: TiffKind>(
    dir: &mut tiff::encoder::DirectoryEncoder<'_, W, K>,
    transform: &GeoTransform,
    projection: &Projection,
    nodata: Option<f64>,
) -> Result<()> {
    if !transform.is_rotated() && transform.pixel_height < 0.0 {
        let scale = [transform.pixel_width, -transform.pixel_height, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
        dir.write_tag(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE), &scale[..])?;
        dir.write_tag(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT), &tiepoint[..])?;
    } else {
        let t = transform;
        let matrix = [
            t.pixel_width, t.row_rotation, 0.0, t.origin_x,
            t.col_rotation, t.pixel_height, 0.0, t.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(Tag::from_u16_exhaustive(TAG_MODEL_TRANSFORMATION), &matrix[..])?;
    }

    if !projection.is_empty() {
        dir.write_tag(
            Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY),
            &projection.geo_key_directory[..],
        )?;
        if !projection.geo_double_params.is_empty() {
            dir.write_tag(
                Tag::from_u16_exhaustive(TAG_GEO_DOUBLE_PARAMS),
                &projection.geo_double_params[..],
            )?;
        }
        if let Some(ascii) = &projection.geo_ascii_params {
            dir.write_tag(Tag::from_u16_exhaustive(TAG_GEO_ASCII_PARAMS), ascii.as_str())?;
        }
    }

    if let Some(nodata) = nodata {
        dir.write_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA), format_nodata(nodata).as_str())?;
    }

    Ok(())
}

fn format_nodata(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Conserve one GeoTIFF into another. `input` and `output` may be the same path.
pub fn conserve_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    conserver: &RasterConserver,
) -> Result<ConservationReport> {
    conserve_file_to_grid(input, output, conserver).map(|conserved| conserved.report)
}

/// Like [`conserve_file`], also handing back the written grid.
///
/// The result is written to a sibling temporary file first and renamed over
/// `output`, so a failed run never leaves a truncated raster behind.
pub fn conserve_file_to_grid(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    conserver: &RasterConserver,
) -> Result<Conserved> {
    let input = input.as_ref();
    let output = output.as_ref();

    let grid = read_grid(input)?;
    let conserved = conserver.conserve(&grid)?;
    drop(grid);

    let staging = staging_path(output);
    if let Err(e) = write_int_grid(&staging, &conserved.grid) {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }
    std::fs::rename(&staging, output)?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        orig_sum = conserved.report.orig_sum,
        output_sum = conserved.report.output_sum,
        "Conserved raster file"
    );

    Ok(conserved)
}

fn staging_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nodata_variants() {
        assert_eq!(parse_nodata("-99999"), Some(-99999.0));
        assert_eq!(parse_nodata("-3.4028234663852886e+38\0"), Some(-3.4028234663852886e38));
        assert_eq!(parse_nodata(" -9999 \0"), Some(-9999.0));
        assert!(parse_nodata("nan").unwrap().is_nan());
        assert_eq!(parse_nodata("none"), None);
    }

    #[test]
    fn test_format_nodata() {
        assert_eq!(format_nodata(-9999.0), "-9999");
        assert_eq!(format_nodata(-0.5), "-0.5");
        assert_eq!(format_nodata(f64::NAN), "nan");
    }

    #[test]
    fn test_staging_path_is_sibling() {
        let staging = staging_path(Path::new("/data/out/nga_f_0_2020.tif"));
        assert_eq!(staging, Path::new("/data/out/nga_f_0_2020.tif.partial"));
    }

    #[test]
    fn test_decode_samples_converts_integers() {
        let samples = decode_samples(DecodingResult::I16(vec![-1, 0, 7]));
        assert_eq!(samples, vec![-1.0, 0.0, 7.0]);
    }
}
