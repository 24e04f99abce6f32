//! GeoTIFF georeferencing tags.
//!
//! Reads and writes tags 33550 (ModelPixelScale), 33922 (ModelTiepoint),
//! 34264 (ModelTransformation), 34735 (GeoKeyDirectory), 34737
//! (GeoAsciiParams) and 42113 (GDAL_NODATA).

use std::io::{Read, Seek, Write};

use tiff::decoder::Decoder;
use tiff::encoder::{DirectoryEncoder, TiffKind};
use tiff::tags::Tag;
use tracing::debug;

use crate::crs::CRS;
use crate::error::Result;
use crate::raster::{GeoTransform, GridGeometry};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GT_CITATION: u16 = 1026;
const GEOGRAPHIC_TYPE: u16 = 2048;
const GEOG_CITATION: u16 = 2049;
const PROJECTED_CS_TYPE: u16 = 3072;
const PCS_CITATION: u16 = 3073;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Georeferencing recovered from a GeoTIFF directory.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoMeta {
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
}

/// Read transform, CRS and nodata from the current image directory.
///
/// Missing tags are not an error: the transform falls back to the identity
/// grid and CRS/nodata to `None`.
pub fn read_geo_meta<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoMeta> {
    let transform = match read_transform(decoder)? {
        Some(t) => t,
        None => {
            debug!("no georeferencing tags, using identity transform");
            GeoTransform::default()
        }
    };

    Ok(GeoMeta {
        transform,
        crs: read_crs(decoder)?,
        nodata: read_nodata(decoder)?,
    })
}

fn find_f64_vec<R: Read + Seek>(decoder: &mut Decoder<R>, code: u16) -> Result<Option<Vec<f64>>> {
    match decoder.find_tag(geo_tag(code))? {
        Some(value) => Ok(Some(value.into_f64_vec()?)),
        None => Ok(None),
    }
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<GeoTransform>> {
    let scale = find_f64_vec(decoder, MODEL_PIXEL_SCALE)?;
    let tiepoint = find_f64_vec(decoder, MODEL_TIEPOINT)?;

    if let (Some(scale), Some(tiepoint)) = (&scale, &tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Ok(Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1])));
        }
    }

    // 4x4 row-major matrix
    if let Some(t) = find_f64_vec(decoder, MODEL_TRANSFORMATION)? {
        if t.len() >= 16 {
            return Ok(Some(GeoTransform {
                origin_x: t[3],
                origin_y: t[7],
                pixel_width: t[0],
                pixel_height: t[5],
                row_rotation: t[1],
                col_rotation: t[4],
            }));
        }
    }

    Ok(None)
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<CRS>> {
    let keys = match decoder.find_tag(geo_tag(GEO_KEY_DIRECTORY))? {
        Some(value) => value.into_u32_vec()?,
        None => return Ok(None),
    };
    let ascii = match decoder.find_tag(geo_tag(GEO_ASCII_PARAMS))? {
        Some(value) => Some(value.into_string()?),
        None => None,
    };
    Ok(crs_from_key_directory(&keys, ascii.as_deref()))
}

/// Find the EPSG code and citation in a GeoKeyDirectory.
///
/// Layout: `[version, revision, minor, count, (key_id, location, count, value)*]`.
/// Inline SHORT keys have location 0; ASCII keys point into GeoAsciiParams
/// with `value` as the offset and a `|` terminating each string.
fn crs_from_key_directory(keys: &[u32], ascii: Option<&str>) -> Option<CRS> {
    if keys.len() < 4 {
        return None;
    }
    let num_keys = keys[3] as usize;

    let mut projected = None;
    let mut geographic = None;
    let mut citation = None;
    for entry in keys[4..].chunks_exact(4).take(num_keys) {
        let (key_id, location, count, value) = (entry[0] as u16, entry[1], entry[2], entry[3]);
        if location == u32::from(GEO_ASCII_PARAMS) {
            if matches!(key_id, GT_CITATION | PCS_CITATION | GEOG_CITATION) && citation.is_none() {
                citation = ascii.and_then(|a| ascii_param(a, value as usize, count as usize));
            }
            continue;
        }
        // 0 and 32767 mean undefined and user-defined
        if location != 0 || value == 0 || value == 32767 {
            continue;
        }
        match key_id {
            PROJECTED_CS_TYPE => projected = Some(value),
            GEOGRAPHIC_TYPE => geographic = Some(value),
            _ => {}
        }
    }

    match (projected.or(geographic), citation) {
        (Some(code), Some(name)) => Some(CRS::from_epsg(code).with_citation(name)),
        (Some(code), None) => Some(CRS::from_epsg(code)),
        (None, Some(name)) => Some(CRS::from_citation(name)),
        (None, None) => None,
    }
}

fn ascii_param(ascii: &str, offset: usize, count: usize) -> Option<String> {
    let text = ascii.get(offset..(offset + count).min(ascii.len()))?;
    let text = text.trim_end_matches(['|', '\0']).trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>> {
    let text = match decoder.find_tag(geo_tag(GDAL_NODATA))? {
        Some(value) => value.into_string()?,
        None => return Ok(None),
    };
    Ok(parse_nodata(&text))
}

fn parse_nodata(text: &str) -> Option<f64> {
    let text = text.trim_end_matches('\0').trim();
    match text.to_ascii_lowercase().as_str() {
        "nan" | "-nan" => Some(f64::NAN),
        other => other.parse::<f64>().ok(),
    }
}

fn format_nodata(nodata: f64) -> String {
    if nodata.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", nodata)
    }
}

/// Build the GeoKeyDirectory for `crs`, plus GeoAsciiParams when it has a citation.
fn key_directory(crs: Option<&CRS>) -> (Vec<u16>, Option<String>) {
    let mut entries: Vec<[u16; 4]> = Vec::new();
    let mut ascii = None;

    let code = crs.and_then(|c| c.epsg()).and_then(|e| u16::try_from(e).ok());
    let model = match (crs, code) {
        (Some(crs), Some(_)) if crs.is_geographic() => Some(MODEL_TYPE_GEOGRAPHIC),
        (Some(_), Some(_)) => Some(MODEL_TYPE_PROJECTED),
        _ => None,
    };
    if let Some(model) = model {
        entries.push([GT_MODEL_TYPE, 0, 1, model]);
    }
    entries.push([GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA]);

    if let Some(name) = crs.and_then(|c| c.citation()) {
        let text = format!("{}|", name.replace('|', " "));
        entries.push([GT_CITATION, GEO_ASCII_PARAMS, text.len() as u16, 0]);
        ascii = Some(text);
    }
    match (model, code) {
        (Some(MODEL_TYPE_GEOGRAPHIC), Some(code)) => entries.push([GEOGRAPHIC_TYPE, 0, 1, code]),
        (Some(_), Some(code)) => entries.push([PROJECTED_CS_TYPE, 0, 1, code]),
        _ => {
            if let Some(crs) = crs.filter(|c| c.citation().is_none()) {
                debug!(crs = %crs, "CRS has no EPSG code or citation, not written");
            }
        }
    }

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.iter().flatten());
    (keys, ascii)
}

/// Write georeferencing for `geometry` (and optional nodata) into an image directory.
pub fn write_geo_tags<W, K>(
    directory: &mut DirectoryEncoder<'_, W, K>,
    geometry: &GridGeometry,
    nodata: Option<f64>,
) -> Result<()>
where
    W: Write + Seek,
    K: TiffKind,
{
    let gt = &geometry.transform;

    if gt.row_rotation == 0.0 && gt.col_rotation == 0.0 {
        let scale = [gt.pixel_width, -gt.pixel_height, 0.0];
        directory.write_tag(geo_tag(MODEL_PIXEL_SCALE), &scale[..])?;
        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        directory.write_tag(geo_tag(MODEL_TIEPOINT), &tiepoint[..])?;
    } else {
        let matrix = [
            gt.pixel_width, gt.row_rotation, 0.0, gt.origin_x,
            gt.col_rotation, gt.pixel_height, 0.0, gt.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        directory.write_tag(geo_tag(MODEL_TRANSFORMATION), &matrix[..])?;
    }

    let (keys, ascii) = key_directory(geometry.crs.as_ref());
    directory.write_tag(geo_tag(GEO_KEY_DIRECTORY), &keys[..])?;
    if let Some(ascii) = ascii {
        directory.write_tag(geo_tag(GEO_ASCII_PARAMS), ascii.as_str())?;
    }

    if let Some(nodata) = nodata {
        let text = format_nodata(nodata);
        directory.write_tag(geo_tag(GDAL_NODATA), text.as_str())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide(keys: &[u16]) -> Vec<u32> {
        keys.iter().map(|&k| k as u32).collect()
    }

    #[test]
    fn projected_key_directory_roundtrip() {
        let (keys, ascii) = key_directory(Some(&CRS::utm_north(44)));
        assert_eq!(&keys[..4], &[1, 1, 0, 3]);
        assert_eq!(ascii, None);
        assert_eq!(crs_from_key_directory(&wide(&keys), None), Some(CRS::from_epsg(32644)));
    }

    #[test]
    fn geographic_key_directory() {
        let (keys, _) = key_directory(Some(&CRS::wgs84()));
        assert!(keys.chunks(4).any(|k| k == [GT_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC]));
        assert_eq!(crs_from_key_directory(&wide(&keys), None), Some(CRS::wgs84()));
    }

    #[test]
    fn citation_is_carried_in_ascii_params() {
        let crs = CRS::utm_north(44).with_citation("WGS 84 / UTM zone 44N");
        let (keys, ascii) = key_directory(Some(&crs));
        assert_eq!(ascii.as_deref(), Some("WGS 84 / UTM zone 44N|"));
        // key ids stay sorted
        let ids: Vec<u16> = keys[4..].chunks(4).map(|k| k[0]).collect();
        assert_eq!(ids, vec![GT_MODEL_TYPE, GT_RASTER_TYPE, GT_CITATION, PROJECTED_CS_TYPE]);
        assert_eq!(crs_from_key_directory(&wide(&keys), ascii.as_deref()), Some(crs));

        let local = CRS::from_citation("Local mine grid");
        let (keys, ascii) = key_directory(Some(&local));
        assert_eq!(crs_from_key_directory(&wide(&keys), ascii.as_deref()), Some(local));
    }

    #[test]
    fn key_directory_without_crs() {
        let (keys, ascii) = key_directory(None);
        assert_eq!(ascii, None);
        assert_eq!(crs_from_key_directory(&wide(&keys), None), None);
    }

    #[test]
    fn user_defined_code_falls_back_to_citation() {
        let keys = [1, 1, 0, 2, 1026, 34737, 10, 0, 3072, 0, 1, 32767];
        assert_eq!(
            crs_from_key_directory(&keys, Some("Site grid|\0")),
            Some(CRS::from_citation("Site grid"))
        );
    }

    #[test]
    fn nodata_text() {
        assert_eq!(parse_nodata("0\0"), Some(0.0));
        assert_eq!(parse_nodata(" -9999 "), Some(-9999.0));
        assert!(parse_nodata("nan").map_or(false, f64::is_nan));
        assert_eq!(parse_nodata("none"), None);
        assert_eq!(format_nodata(0.0), "0");
        assert_eq!(format_nodata(f64::NAN), "nan");
    }
}
