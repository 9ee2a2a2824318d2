use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Per-head, per-instructional-hour rate used when nothing else is
/// configured.
pub const DEFAULT_HOURLY_RATE: f64 = 18_150.0;

/// How enrollment is converted into revenue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum Pricing {
    /// `enrollment * unit_price` for every operating month.
    PerHeadMonth { unit_price: f64 },
    /// `enrollment * hours * hourly_rate`, with the program's instructional
    /// hours spread evenly over its months.
    PerHeadHour { hourly_rate: f64 },
}

impl Default for Pricing {
    fn default() -> Self {
        Pricing::PerHeadHour {
            hourly_rate: DEFAULT_HOURLY_RATE,
        }
    }
}

impl Pricing {
    /// Revenue for one month, rounded to a whole currency unit.
    pub fn month_revenue(&self, enrollment: f64, hours: f64) -> i64 {
        let raw = match *self {
            Pricing::PerHeadMonth { unit_price } => enrollment * unit_price,
            Pricing::PerHeadHour { hourly_rate } => enrollment * hours * hourly_rate,
        };
        raw.round() as i64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    #[default]
    Arithmetic,
    Geometric,
    Flat,
}

/// Enrollment the decline curve trends toward in the final month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalBasis {
    /// The recorded completion headcount.
    #[default]
    Completed,
    /// Confirmed enrollment minus recorded dropouts.
    Retained,
}

/// Population rules behind the headline dashboard rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DashboardRules {
    /// Recruitment, completion and satisfaction consider programs ending in
    /// this year.
    pub reference_year: i32,
    /// Employment considers closed programs ending inside this window.
    pub employment_window_start: NaiveDate,
    pub employment_window_end: NaiveDate,
}

impl Default for DashboardRules {
    fn default() -> Self {
        Self {
            reference_year: 2025,
            employment_window_start: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap_or_default(),
            employment_window_end: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pricing: Pricing,
    pub model: ModelKind,
    pub terminal: TerminalBasis,
    pub dashboard: DashboardRules,
}

impl EngineConfig {
    pub fn per_head_month(unit_price: f64) -> Self {
        Self {
            pricing: Pricing::PerHeadMonth { unit_price },
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("invalid engine config in {}", path.display()))?;
        Ok(config)
    }
}
