//! Rolling statistics and named statistic values.
//!
//! [`AverageWindow`] keeps the last `N` samples in a circular buffer together with a
//! running total, so the average of recent behavior is available in constant time
//! and constant memory. [`Statistic`] is the named value a stage appends when asked
//! to report on itself.

use serde::Serialize;
use std::fmt;

/// Number of samples kept by the stage's timing windows.
pub const DEFAULT_WINDOW_SIZE: usize = 64;

/// A fixed-capacity rolling window of `u64` samples.
///
/// Once `N` samples have been pushed, each new sample evicts the oldest one.
///
/// # Example
/// ```
/// use pakstream_lib::statistics::AverageWindow;
///
/// let mut window: AverageWindow<3> = AverageWindow::new();
/// assert_eq!(window.average(), 0.0);
/// window.push(10);
/// window.push(20);
/// window.push(30);
/// window.push(40); // evicts 10
/// assert_eq!(window.total(), 90);
/// assert_eq!(window.average(), 30.0);
/// ```
#[derive(Debug, Clone)]
pub struct AverageWindow<const N: usize> {
    samples: [u64; N],
    /// Index the next sample is written to.
    next: usize,
    /// Number of valid samples, at most `N`.
    recorded: usize,
    /// Sum of the valid samples.
    total: u128,
}

impl<const N: usize> AverageWindow<N> {
    /// Create an empty window.
    #[must_use]
    pub fn new() -> Self {
        const { assert!(N > 0, "an average window needs room for at least one sample") };
        Self { samples: [0; N], next: 0, recorded: 0, total: 0 }
    }

    /// Add a sample, evicting the oldest one if the window is full.
    pub fn push(&mut self, value: u64) {
        if self.recorded == N {
            self.total -= u128::from(self.samples[self.next]);
        } else {
            self.recorded += 1;
        }
        self.samples[self.next] = value;
        self.total += u128::from(value);
        self.next = (self.next + 1) % N;
    }

    /// Average of the recorded samples, or `0.0` when nothing has been recorded.
    #[must_use]
    pub fn average(&self) -> f64 {
        if self.recorded == 0 { 0.0 } else { self.total as f64 / self.recorded as f64 }
    }

    /// Sum of the recorded samples (saturating at `u64::MAX`).
    #[must_use]
    pub fn total(&self) -> u64 {
        u64::try_from(self.total).unwrap_or(u64::MAX)
    }

    /// Number of samples currently in the window.
    #[must_use]
    pub fn num_recorded(&self) -> usize {
        self.recorded
    }

    /// True if no sample has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded == 0
    }

    /// Maximum number of samples the window holds.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for AverageWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The value carried by a [`Statistic`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatisticValue {
    /// A count or other whole number.
    Integer(i64),
    /// A measured quantity.
    Float(f64),
    /// A fraction in `0.0..=1.0`, displayed as a percentage.
    Percentage(f64),
}

impl StatisticValue {
    /// The value as a float, regardless of kind.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match *self {
            StatisticValue::Integer(v) => v as f64,
            StatisticValue::Float(v) | StatisticValue::Percentage(v) => v,
        }
    }
}

impl fmt::Display for StatisticValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StatisticValue::Integer(v) => write!(f, "{v}"),
            StatisticValue::Float(v) => write!(f, "{v:.2}"),
            StatisticValue::Percentage(v) => write!(f, "{:.2}%", v * 100.0),
        }
    }
}

/// A named value reported by a pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistic {
    /// Name of the stage that reported the value.
    pub owner: String,
    /// Human-readable name of the value.
    pub name: String,
    /// The value itself.
    pub value: StatisticValue,
}

impl Statistic {
    /// Create a whole-number statistic.
    #[must_use]
    pub fn integer(owner: &str, name: &str, value: i64) -> Self {
        Self::new(owner, name, StatisticValue::Integer(value))
    }

    /// Create a floating-point statistic.
    #[must_use]
    pub fn float(owner: &str, name: &str, value: f64) -> Self {
        Self::new(owner, name, StatisticValue::Float(value))
    }

    /// Create a percentage statistic from a fraction.
    #[must_use]
    pub fn percentage(owner: &str, name: &str, fraction: f64) -> Self {
        Self::new(owner, name, StatisticValue::Percentage(fraction))
    }

    fn new(owner: &str, name: &str, value: StatisticValue) -> Self {
        Self { owner: owner.to_string(), name: name.to_string(), value }
    }
}

/// Find a statistic by name.
#[must_use]
pub fn find_statistic<'a>(statistics: &'a [Statistic], name: &str) -> Option<&'a Statistic> {
    statistics.iter().find(|s| s.name == name)
}
