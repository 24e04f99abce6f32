//! Coordinate reference systems as carried by GeoTIFF keys

use serde::{Deserialize, Serialize};
use std::fmt;

/// A CRS known by EPSG code, by citation text, or both.
///
/// Scenes of one tile share an EPSG code; the citation is kept for files
/// whose projection only has a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    epsg: Option<u32>,
    citation: Option<String>,
}

impl CRS {
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            citation: None,
        }
    }

    /// A CRS described only by its GeoTIFF citation.
    pub fn from_citation(citation: impl Into<String>) -> Self {
        Self {
            epsg: None,
            citation: Some(citation.into()),
        }
    }

    /// Attach a citation to an EPSG-coded CRS.
    pub fn with_citation(mut self, citation: impl Into<String>) -> Self {
        self.citation = Some(citation.into());
        self
    }

    /// WGS84 geographic (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// WGS84 / UTM zone `zone`, northern hemisphere (EPSG:326xx)
    pub fn utm_north(zone: u8) -> Self {
        Self::from_epsg(32600 + zone as u32)
    }

    /// WGS84 / UTM zone `zone`, southern hemisphere (EPSG:327xx)
    pub fn utm_south(zone: u8) -> Self {
        Self::from_epsg(32700 + zone as u32)
    }

    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn citation(&self) -> Option<&str> {
        self.citation.as_deref()
    }

    /// Whether coordinates are angular. Only EPSG codes can be classified.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(code) if (4000..5000).contains(&code))
    }

    /// UTM zone and hemisphere (`true` = north) for WGS84 UTM codes.
    pub fn utm_zone(&self) -> Option<(u8, bool)> {
        match self.epsg? {
            code @ 32601..=32660 => Some(((code - 32600) as u8, true)),
            code @ 32701..=32760 => Some(((code - 32700) as u8, false)),
            _ => None,
        }
    }

    /// Same EPSG code, or same citation when neither side has a code.
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        match (self.epsg, other.epsg) {
            (Some(a), Some(b)) => a == b,
            (None, None) => match (&self.citation, &other.citation) {
                (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.epsg, &self.citation) {
            (Some(code), Some(name)) => write!(f, "EPSG:{} ({})", code, name),
            (Some(code), None) => write!(f, "EPSG:{}", code),
            (None, Some(name)) => write!(f, "{}", name),
            (None, None) => write!(f, "unknown"),
        }
    }
}
