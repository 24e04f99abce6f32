//! Tabular and JSON change products

use std::path::{Path, PathBuf};

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use covershift_core::io::OutputFile;
use covershift_core::{Error, Result};

use super::classes::ClassScheme;
use super::statistics::{ClassSummary, TransitionStatistics};

/// One row of the long-form transition table
#[derive(Debug, Serialize)]
struct TransitionRow<'a> {
    from_class: &'a str,
    to_class: &'a str,
    pixels: u64,
    area_sq_km: f64,
    percentage: f64,
}

fn class_name(scheme: &ClassScheme, code: u8) -> String {
    scheme
        .name(code)
        .map(str::to_string)
        .unwrap_or_else(|| code.to_string())
}

/// Write the transition matrix as a long-form CSV table.
pub fn write_transition_csv(
    stats: &TransitionStatistics,
    scheme: &ClassScheme,
    path: &Path,
) -> Result<PathBuf> {
    let mut out = OutputFile::create(path)?;
    {
        let mut writer = csv::Writer::from_writer(out.file_mut());
        for entry in &stats.entries {
            let (from, to) = (class_name(scheme, entry.from), class_name(scheme, entry.to));
            writer
                .serialize(TransitionRow {
                    from_class: &from,
                    to_class: &to,
                    pixels: entry.pixels,
                    area_sq_km: entry.area_sq_km,
                    percentage: entry.percentage,
                })
                .map_err(|e| Error::Other(format!("cannot write {}: {}", path.display(), e)))?;
        }
        writer.flush()?;
    }
    out.commit()
}

/// `from name -> to name -> area` in class-scheme order
struct MatrixJson<'a> {
    stats: &'a TransitionStatistics,
    scheme: &'a ClassScheme,
}

struct MatrixRow<'a> {
    from: u8,
    stats: &'a TransitionStatistics,
    scheme: &'a ClassScheme,
}

impl Serialize for MatrixJson<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.scheme.iter().map(|entry| {
            (
                entry.name.as_str(),
                MatrixRow {
                    from: entry.code,
                    stats: self.stats,
                    scheme: self.scheme,
                },
            )
        }))
    }
}

impl Serialize for MatrixRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.scheme.iter().map(|entry| {
            let area = self
                .stats
                .get(self.from, entry.code)
                .map(|e| e.area_sq_km)
                .unwrap_or(0.0);
            (entry.name.as_str(), area)
        }))
    }
}

/// `class name -> {area_<t1>_sq_km, area_<t2>_sq_km, net_change_sq_km, percent_change}`
struct SummaryJson<'a> {
    summary: &'a [ClassSummary],
    t1: &'a str,
    t2: &'a str,
}

struct SummaryEntry<'a> {
    class: &'a ClassSummary,
    t1_key: &'a str,
    t2_key: &'a str,
}

impl Serialize for SummaryJson<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let t1_key = format!("area_{}_sq_km", self.t1);
        let t2_key = format!("area_{}_sq_km", self.t2);
        let mut map = serializer.serialize_map(Some(self.summary.len()))?;
        for class in self.summary {
            map.serialize_entry(
                &class.name,
                &SummaryEntry {
                    class,
                    t1_key: &t1_key,
                    t2_key: &t2_key,
                },
            )?;
        }
        map.end()
    }
}

impl Serialize for SummaryEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry(self.t1_key, &self.class.area_t1_sq_km)?;
        map.serialize_entry(self.t2_key, &self.class.area_t2_sq_km)?;
        map.serialize_entry("net_change_sq_km", &self.class.net_change_sq_km)?;
        map.serialize_entry("percent_change", &self.class.percent_change)?;
        map.end()
    }
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<PathBuf> {
    let mut out = OutputFile::create(path)?;
    serde_json::to_writer_pretty(out.file_mut(), value)
        .map_err(|e| Error::Other(format!("cannot write {}: {}", path.display(), e)))?;
    out.commit()
}

/// Write the nested transition matrix JSON.
pub fn write_transition_json(
    stats: &TransitionStatistics,
    scheme: &ClassScheme,
    path: &Path,
) -> Result<PathBuf> {
    write_json(&MatrixJson { stats, scheme }, path)
}

/// Write the per-class summary JSON; `t1` and `t2` label the period keys.
pub fn write_summary_json(
    summary: &[ClassSummary],
    t1: &str,
    t2: &str,
    path: &Path,
) -> Result<PathBuf> {
    write_json(&SummaryJson { summary, t1, t2 }, path)
}

/// Summary JSON as a value, for callers that embed it elsewhere
pub fn summary_value(summary: &[ClassSummary], t1: &str, t2: &str) -> Result<serde_json::Value> {
    serde_json::to_value(SummaryJson { summary, t1, t2 }).map_err(|e| Error::Other(e.to_string()))
}
