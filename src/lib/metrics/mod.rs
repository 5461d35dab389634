//! Metrics file types and writers.
//!
//! - [`StatisticRow`] - one stage statistic as a TSV row
//! - [`writer`] - Metrics file I/O utilities

pub mod writer;

use serde::{Deserialize, Serialize};

use crate::statistics::Statistic;

pub use writer::{write_metrics, write_statistics};

/// A statistic flattened for a TSV file.
///
/// The value is stored as displayed, so percentages keep their `%` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticRow {
    /// Stage that reported the statistic.
    pub owner: String,
    /// Name of the statistic.
    pub name: String,
    /// Formatted value.
    pub value: String,
}

impl From<&Statistic> for StatisticRow {
    fn from(stat: &Statistic) -> Self {
        Self { owner: stat.owner.clone(), name: stat.name.clone(), value: stat.value.to_string() }
    }
}
