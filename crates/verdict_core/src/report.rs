//! Read-only aggregation over a run snapshot.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::{ItemStatus, RunState, WorkItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn from_items(items: &[WorkItem]) -> Self {
        let mut counts = Self {
            total: items.len(),
            ..Self::default()
        };
        for item in items {
            match item.status() {
                ItemStatus::Pending => counts.pending += 1,
                ItemStatus::InFlight => counts.in_flight += 1,
                ItemStatus::Succeeded => counts.succeeded += 1,
                ItemStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn finished(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Fraction of items in a terminal state, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.finished() as f64 / self.total as f64
        }
    }
}

/// Accuracy over succeeded items that carry an expected label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccuracyStats {
    pub labelled: usize,
    pub correct: usize,
    pub incorrect: usize,
}

impl AccuracyStats {
    pub fn from_items(items: &[WorkItem]) -> Self {
        let mut stats = Self::default();
        for item in items {
            match item.matches_expected() {
                Some(true) => stats.correct += 1,
                Some(false) => stats.incorrect += 1,
                None => {}
            }
            if item.expected_label.is_some() && item.status() == ItemStatus::Succeeded {
                stats.labelled += 1;
            }
        }
        stats
    }

    pub fn percentage(&self) -> Option<f64> {
        if self.labelled == 0 {
            None
        } else {
            Some(self.correct as f64 * 100.0 / self.labelled as f64)
        }
    }

    /// Two-decimal percentage, `0.00%` when nothing is labelled.
    pub fn display_percentage(&self) -> String {
        format!("{:.2}%", self.percentage().unwrap_or(0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingStats {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed: Option<Duration>,
    /// Elapsed time divided by the number of succeeded items.
    pub average_per_success: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub counts: StatusCounts,
    pub accuracy: AccuracyStats,
    pub timing: TimingStats,
}

impl RunReport {
    pub fn from_state(state: &RunState) -> Self {
        let counts = StatusCounts::from_items(state.items());
        let accuracy = AccuracyStats::from_items(state.items());
        let timing = state.timing();
        let elapsed = timing.elapsed();
        let average_per_success = match (elapsed, i32::try_from(counts.succeeded)) {
            (Some(elapsed), Ok(succeeded)) if succeeded > 0 => Some(elapsed / succeeded),
            _ => None,
        };
        Self {
            counts,
            accuracy,
            timing: TimingStats {
                started_at: timing.started_at,
                ended_at: timing.ended_at,
                elapsed,
                average_per_success,
            },
        }
    }
}

/// Formats a duration as seconds with two decimals, e.g. `12.34s`.
pub fn format_seconds(duration: Duration) -> String {
    format!("{:.2}s", duration.num_milliseconds() as f64 / 1000.0)
}

/// Subset of items to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemFilter {
    #[default]
    All,
    Status(ItemStatus),
    Correct,
    Incorrect,
}

impl ItemFilter {
    pub fn matches(&self, item: &WorkItem) -> bool {
        match self {
            ItemFilter::All => true,
            ItemFilter::Status(status) => item.status() == *status,
            ItemFilter::Correct => item.matches_expected() == Some(true),
            ItemFilter::Incorrect => item.matches_expected() == Some(false),
        }
    }

    /// Matching items with their positional index.
    pub fn apply<'a>(&self, state: &'a RunState) -> Vec<(usize, &'a WorkItem)> {
        state
            .items()
            .iter()
            .enumerate()
            .filter(|(_, item)| self.matches(item))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown filter {0:?} (expected all, pending, in-flight, succeeded, failed, correct, incorrect)")]
pub struct UnknownFilter(pub String);

impl FromStr for ItemFilter {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ItemFilter::All),
            "pending" => Ok(ItemFilter::Status(ItemStatus::Pending)),
            "in-flight" | "in_flight" | "processing" => Ok(ItemFilter::Status(ItemStatus::InFlight)),
            "succeeded" | "success" => Ok(ItemFilter::Status(ItemStatus::Succeeded)),
            "failed" | "error" => Ok(ItemFilter::Status(ItemStatus::Failed)),
            "correct" => Ok(ItemFilter::Correct),
            "incorrect" => Ok(ItemFilter::Incorrect),
            _ => Err(UnknownFilter(s.to_string())),
        }
    }
}
