//! Class-pair counts, transition statistics and per-class area summary

use serde::Serialize;

use crate::maybe_rayon::*;
use covershift_core::raster::Raster;
use covershift_core::Result;

use super::classes::ClassScheme;
use super::transition::ensure_encodable;

const SLOTS: usize = 10;

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Area of one pixel in km² for a square pixel of `resolution_m` metres
pub fn pixel_area_sq_km(resolution_m: f64) -> f64 {
    resolution_m * resolution_m / 1e6
}

/// Pixel counts per class in each period and per class pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeCounts {
    pairs: [[u64; SLOTS]; SLOTS],
    t1: [u64; SLOTS],
    t2: [u64; SLOTS],
}

impl Default for ChangeCounts {
    fn default() -> Self {
        Self {
            pairs: [[0; SLOTS]; SLOTS],
            t1: [0; SLOTS],
            t2: [0; SLOTS],
        }
    }
}

impl ChangeCounts {
    /// Pixels classified `from` in the first period and `to` in the second
    pub fn pair(&self, from: u8, to: u8) -> u64 {
        self.pairs
            .get(from as usize)
            .and_then(|r| r.get(to as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Pixels of `class` in the first period
    pub fn first(&self, class: u8) -> u64 {
        self.t1.get(class as usize).copied().unwrap_or(0)
    }

    /// Pixels of `class` in the second period
    pub fn second(&self, class: u8) -> u64 {
        self.t2.get(class as usize).copied().unwrap_or(0)
    }

    fn merge(mut self, other: &ChangeCounts) -> Self {
        for i in 0..SLOTS {
            self.t1[i] += other.t1[i];
            self.t2[i] += other.t2[i];
            for j in 0..SLOTS {
                self.pairs[i][j] += other.pairs[i][j];
            }
        }
        self
    }
}

/// Count classes and class pairs of two aligned classification rasters.
///
/// Rows are counted independently and the partial histograms reduced.
pub fn count_changes(t1: &Raster<u8>, t2: &Raster<u8>) -> Result<ChangeCounts> {
    t1.geometry().ensure_aligned(&t2.geometry(), "change statistics")?;
    ensure_encodable(t1, "t1")?;
    ensure_encodable(t2, "t2")?;

    let (rows, cols) = t1.shape();
    let a = t1.view();
    let b = t2.view();

    let partials: Vec<ChangeCounts> = (0..rows)
        .into_par_iter()
        .map(|row| {
            let mut counts = ChangeCounts::default();
            for col in 0..cols {
                let (from, to) = (a[[row, col]] as usize, b[[row, col]] as usize);
                if from > 0 {
                    counts.t1[from] += 1;
                }
                if to > 0 {
                    counts.t2[to] += 1;
                }
                if from > 0 && to > 0 {
                    counts.pairs[from][to] += 1;
                }
            }
            counts
        })
        .collect();

    Ok(partials
        .iter()
        .fold(ChangeCounts::default(), |acc, p| acc.merge(p)))
}

/// One ordered class pair of the transition matrix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEntry {
    pub from: u8,
    pub to: u8,
    pub pixels: u64,
    /// Rounded to 3 decimals
    pub area_sq_km: f64,
    /// Share of all counted pairs, rounded to 2 decimals
    pub percentage: f64,
}

/// Transition matrix over every ordered pair of the class scheme.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionStatistics {
    /// Row-major in class-scheme order
    pub entries: Vec<TransitionEntry>,
    pub total_pixels: u64,
    pub pixel_area_sq_km: f64,
}

impl TransitionStatistics {
    pub fn from_counts(counts: &ChangeCounts, scheme: &ClassScheme, pixel_area_sq_km: f64) -> Self {
        let total_pixels: u64 = scheme
            .codes()
            .flat_map(|from| scheme.codes().map(move |to| (from, to)))
            .map(|(from, to)| counts.pair(from, to))
            .sum();

        let entries = scheme
            .codes()
            .flat_map(|from| scheme.codes().map(move |to| (from, to)))
            .map(|(from, to)| {
                let pixels = counts.pair(from, to);
                let percentage = if total_pixels == 0 {
                    0.0
                } else {
                    round_to(pixels as f64 / total_pixels as f64 * 100.0, 2)
                };
                TransitionEntry {
                    from,
                    to,
                    pixels,
                    area_sq_km: round_to(pixels as f64 * pixel_area_sq_km, 3),
                    percentage,
                }
            })
            .collect();

        Self {
            entries,
            total_pixels,
            pixel_area_sq_km,
        }
    }

    pub fn get(&self, from: u8, to: u8) -> Option<&TransitionEntry> {
        self.entries.iter().find(|e| e.from == from && e.to == to)
    }
}

/// Count and summarise transitions in one call.
pub fn transition_statistics(
    t1: &Raster<u8>,
    t2: &Raster<u8>,
    scheme: &ClassScheme,
    pixel_area_sq_km: f64,
) -> Result<TransitionStatistics> {
    let counts = count_changes(t1, t2)?;
    Ok(TransitionStatistics::from_counts(&counts, scheme, pixel_area_sq_km))
}

/// Area of one class in both periods
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassSummary {
    pub code: u8,
    pub name: String,
    pub area_t1_sq_km: f64,
    pub area_t2_sq_km: f64,
    pub net_change_sq_km: f64,
    /// `None` when the class is absent from the first period
    pub percent_change: Option<f64>,
}

/// Per-class area summary in class-scheme order.
///
/// Net and percent change are computed from unrounded areas.
pub fn summarize_counts(
    counts: &ChangeCounts,
    scheme: &ClassScheme,
    pixel_area_sq_km: f64,
) -> Vec<ClassSummary> {
    scheme
        .iter()
        .map(|entry| {
            let area_t1 = counts.first(entry.code) as f64 * pixel_area_sq_km;
            let area_t2 = counts.second(entry.code) as f64 * pixel_area_sq_km;
            let net = area_t2 - area_t1;
            let percent_change = if area_t1 == 0.0 {
                None
            } else {
                Some(round_to(net / area_t1 * 100.0, 2))
            };
            ClassSummary {
                code: entry.code,
                name: entry.name.clone(),
                area_t1_sq_km: round_to(area_t1, 3),
                area_t2_sq_km: round_to(area_t2, 3),
                net_change_sq_km: round_to(net, 3),
                percent_change,
            }
        })
        .collect()
}

/// Count and summarise class areas in one call.
pub fn class_summary(
    t1: &Raster<u8>,
    t2: &Raster<u8>,
    scheme: &ClassScheme,
    pixel_area_sq_km: f64,
) -> Result<Vec<ClassSummary>> {
    let counts = count_changes(t1, t2)?;
    Ok(summarize_counts(&counts, scheme, pixel_area_sq_km))
}
