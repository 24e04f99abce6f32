//! Land-cover change between two classified periods
//!
//! - Transition map: `from * 10 + to` per pixel, 0 where either period is invalid
//! - Transition probability: product of the two confidences
//! - Transition statistics: pixel counts, areas and shares per class pair
//! - Class summary: area per period, net and percent change

mod analyzer;
mod classes;
mod report;
mod statistics;
mod transition;

pub use analyzer::{ChangeAnalyzer, ChangeOutputs, ChangeParams, ChangeProducts, PeriodMaps};
pub use classes::{ClassEntry, ClassScheme};
pub use report::{summary_value, write_summary_json, write_transition_csv, write_transition_json};
pub use statistics::{
    class_summary, count_changes, pixel_area_sq_km, round_to, summarize_counts,
    transition_statistics, ChangeCounts, ClassSummary, TransitionEntry, TransitionStatistics,
};
pub use transition::{
    decode_transition, encode_transition, transition_map, transition_probability,
    MAX_TRANSITION_CLASS,
};
