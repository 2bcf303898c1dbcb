//! Derived statistics over the audit lists.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{ErrorEntry, UpdateEntry};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// How often updates arrive, bucketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateFrequency {
    #[serde(rename = "multiple/day")]
    MultiplePerDay,
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "irregular")]
    Irregular,
    #[serde(rename = "not-applicable")]
    NotApplicable,
}

impl UpdateFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateFrequency::MultiplePerDay => "multiple/day",
            UpdateFrequency::Weekly => "weekly",
            UpdateFrequency::Monthly => "monthly",
            UpdateFrequency::Irregular => "irregular",
            UpdateFrequency::NotApplicable => "not-applicable",
        }
    }
}

impl fmt::Display for UpdateFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify the average gap between retained updates.
///
/// `updates` is newest first. The span runs from the oldest *retained* entry,
/// so once the bounded log has evicted entries this is an approximation.
pub fn update_frequency(updates: &[UpdateEntry]) -> UpdateFrequency {
    let (Some(newest), Some(oldest)) = (updates.first(), updates.last()) else {
        return UpdateFrequency::NotApplicable;
    };
    if updates.len() < 2 {
        return UpdateFrequency::NotApplicable;
    }

    let span_days = (newest.timestamp - oldest.timestamp).num_milliseconds() as f64 / MILLIS_PER_DAY;
    if span_days == 0.0 {
        return UpdateFrequency::MultiplePerDay;
    }

    let average_days = span_days / updates.len() as f64;
    if average_days < 1.0 {
        UpdateFrequency::MultiplePerDay
    } else if average_days < 7.0 {
        UpdateFrequency::Weekly
    } else if average_days < 30.0 {
        UpdateFrequency::Monthly
    } else {
        UpdateFrequency::Irregular
    }
}

/// `errors / updates × 100` to one decimal with a `%` suffix, `"N/A"` without updates.
///
/// Halves round away from zero, so 1 error in 16 updates is `6.3%`.
pub fn error_rate(update_count: usize, error_count: usize) -> String {
    if update_count == 0 {
        return "N/A".to_string();
    }
    let rate = (error_count as f64 * 1000.0 / update_count as f64).round() / 10.0;
    format!("{rate:.1}%")
}

/// Summary shown alongside the log viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total_updates: usize,
    pub total_errors: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
    pub update_frequency: UpdateFrequency,
    pub error_rate: String,
}

impl LogStats {
    /// Both lists newest first, as returned by the audit log.
    pub fn compute(updates: &[UpdateEntry], errors: &[ErrorEntry]) -> Self {
        Self {
            total_updates: updates.len(),
            total_errors: errors.len(),
            last_update: updates.first().map(|e| e.timestamp),
            last_error: errors.first().map(|e| e.timestamp),
            update_frequency: update_frequency(updates),
            error_rate: error_rate(updates.len(), errors.len()),
        }
    }
}
