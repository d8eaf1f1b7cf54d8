//! PostGIS raster well-known binary.
//!
//! Encodes an [`IntTile`] the way `raster2pgsql` does: a little-endian
//! header with the georeferencing, one band with its no-data value, then the
//! cells row by row. The hex form can be cast with `'...'::raster`.

use worldpop_common::{IntDataType, IntTile, PopError, PopResult};

/// SRID WorldPop rasters are published in.
pub const DEFAULT_SRID: i32 = 4326;

const WKB_LITTLE_ENDIAN: u8 = 1;
const WKB_VERSION: u16 = 0;

const BAND_HAS_NODATA: u8 = 0x40;
const BAND_IS_NODATA: u8 = 0x20;

/// PostGIS band pixel types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PixelType {
    /// `16BSI`
    Int16 = 5,
    /// `32BSI`
    Int32 = 7,
}

impl PixelType {
    pub fn for_data_type(data_type: IntDataType) -> Self {
        match data_type {
            IntDataType::Int16 => Self::Int16,
            IntDataType::Int32 => Self::Int32,
        }
    }

    /// Name used by PostGIS functions such as `ST_MapAlgebra`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int16 => "16BSI",
            Self::Int32 => "32BSI",
        }
    }
}

/// Encode a tile as raster WKB.
pub fn encode_tile(tile: &IntTile, srid: i32) -> PopResult<Vec<u8>> {
    let width = u16::try_from(tile.width).map_err(|_| too_large("width", tile.width))?;
    let height = u16::try_from(tile.height).map_err(|_| too_large("height", tile.height))?;

    let pixel_type = PixelType::for_data_type(tile.data_type);
    let sample_size = match pixel_type {
        PixelType::Int16 => 2,
        PixelType::Int32 => 4,
    };

    let mut buf = Vec::with_capacity(61 + 1 + sample_size * (1 + tile.data.len()));

    // Header
    buf.push(WKB_LITTLE_ENDIAN);
    buf.extend_from_slice(&WKB_VERSION.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // band count
    let t = &tile.transform;
    for value in [
        t.pixel_width,
        t.pixel_height,
        t.origin_x,
        t.origin_y,
        t.row_rotation,
        t.col_rotation,
    ] {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf.extend_from_slice(&srid.to_le_bytes());
    buf.extend_from_slice(&width.to_le_bytes());
    buf.extend_from_slice(&height.to_le_bytes());

    // Band
    let mut flags = pixel_type as u8 | BAND_HAS_NODATA;
    if tile.is_all_nodata() {
        flags |= BAND_IS_NODATA;
    }
    buf.push(flags);

    let mut push_sample = |value: i32| -> PopResult<()> {
        match pixel_type {
            PixelType::Int16 => {
                let v = i16::try_from(value).map_err(|_| {
                    PopError::invalid_parameter("tile", format!("{} does not fit in 16BSI", value))
                })?;
                buf.extend_from_slice(&v.to_le_bytes());
            }
            PixelType::Int32 => buf.extend_from_slice(&value.to_le_bytes()),
        }
        Ok(())
    };

    push_sample(tile.nodata)?;
    for &value in &tile.data {
        push_sample(value)?;
    }

    Ok(buf)
}

/// Encode a tile as the uppercase hex string PostGIS accepts for `::raster`.
pub fn encode_tile_hex(tile: &IntTile, srid: i32) -> PopResult<String> {
    Ok(to_hex(&encode_tile(tile, srid)?))
}

fn to_hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

fn too_large(dimension: &str, value: usize) -> PopError {
    PopError::invalid_parameter(
        "tile",
        format!("{} {} exceeds the raster WKB limit of {}", dimension, value, u16::MAX),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldpop_common::GeoTransform;

    fn tile(data: Vec<i32>, data_type: IntDataType) -> IntTile {
        IntTile {
            index: 0,
            col_offset: 0,
            row_offset: 0,
            width: 2,
            height: 1,
            data,
            transform: GeoTransform::north_up(-1.0, 2.0, 0.5, -0.5),
            nodata: -9999,
            data_type,
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode_tile(&tile(vec![3, 4], IntDataType::Int16), DEFAULT_SRID).unwrap();

        assert_eq!(bytes[0], 1);
        assert_eq!(u16::from_le_bytes([bytes[3], bytes[4]]), 1);
        let scale_x = f64::from_le_bytes(bytes[5..13].try_into().unwrap());
        let scale_y = f64::from_le_bytes(bytes[13..21].try_into().unwrap());
        let origin_x = f64::from_le_bytes(bytes[21..29].try_into().unwrap());
        assert_eq!((scale_x, scale_y, origin_x), (0.5, -0.5, -1.0));
        assert_eq!(i32::from_le_bytes(bytes[53..57].try_into().unwrap()), 4326);
        assert_eq!(u16::from_le_bytes([bytes[57], bytes[58]]), 2);
        assert_eq!(u16::from_le_bytes([bytes[59], bytes[60]]), 1);
    }

    #[test]
    fn test_band_layout_int16() {
        let bytes = encode_tile(&tile(vec![3, 4], IntDataType::Int16), DEFAULT_SRID).unwrap();

        assert_eq!(bytes[61], 5 | 0x40);
        assert_eq!(i16::from_le_bytes([bytes[62], bytes[63]]), -9999);
        assert_eq!(i16::from_le_bytes([bytes[64], bytes[65]]), 3);
        assert_eq!(i16::from_le_bytes([bytes[66], bytes[67]]), 4);
        assert_eq!(bytes.len(), 68);
    }

    #[test]
    fn test_all_nodata_flag_and_int32() {
        let bytes =
            encode_tile(&tile(vec![-9999, -9999], IntDataType::Int32), DEFAULT_SRID).unwrap();
        assert_eq!(bytes[61], 7 | 0x40 | 0x20);
        assert_eq!(bytes.len(), 62 + 3 * 4);
    }

    #[test]
    fn test_hex_is_uppercase() {
        assert_eq!(to_hex(&[0x01, 0xab, 0xff]), "01ABFF");
        let hex = encode_tile_hex(&tile(vec![3, 4], IntDataType::Int16), 4326).unwrap();
        assert!(hex.starts_with("0100000100"));
        assert_eq!(hex.len(), 68 * 2);
    }

    #[test]
    fn test_int16_overflow_is_error() {
        assert!(encode_tile(&tile(vec![40_000, 0], IntDataType::Int16), DEFAULT_SRID).is_err());
    }
}
