use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::{Quarter, YearMonth};
use crate::error::{IngestError, OverrideError};

pub type ProgramId = Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgramStatus {
    #[default]
    Planned,
    InProgress,
    Closed,
}

impl ProgramStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramStatus::Planned => "planned",
            ProgramStatus::InProgress => "in-progress",
            ProgramStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgramStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "planned" | "scheduled" | "예정" | "개강예정" => Ok(ProgramStatus::Planned),
            "in-progress" | "in_progress" | "ongoing" | "진행" | "진행중" => {
                Ok(ProgramStatus::InProgress)
            }
            "closed" | "finished" | "종강" => Ok(ProgramStatus::Closed),
            _ => Err(IngestError::InvalidField {
                field: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// Operator-confirmed figures for one calendar month of a program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthOverride {
    pub enrollment: Option<u32>,
    pub hours: Option<f64>,
}

/// Sparse per-month overrides keyed by calendar month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonthlyOverrides(BTreeMap<YearMonth, MonthOverride>);

impl MonthlyOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, month: YearMonth) -> Option<&MonthOverride> {
        self.0.get(&month)
    }

    /// Merges into any existing entry for `month`; `None` fields leave the
    /// previous value in place.
    pub fn insert(&mut self, month: YearMonth, value: MonthOverride) {
        let entry = self.0.entry(month).or_default();
        if value.enrollment.is_some() {
            entry.enrollment = value.enrollment;
        }
        if value.hours.is_some() {
            entry.hours = value.hours;
        }
    }

    /// Places an override addressed by a `<n>M` token relative to the
    /// program's first operating month.
    pub fn place(
        &mut self,
        schedule: Option<&Schedule>,
        token: &str,
        value: MonthOverride,
    ) -> Result<YearMonth, OverrideError> {
        let index = parse_month_token(token)?;
        self.place_index(schedule, index, value)
    }

    /// Same as [`MonthlyOverrides::place`] with an already-parsed 1-based
    /// index.
    pub fn place_index(
        &mut self,
        schedule: Option<&Schedule>,
        index: u32,
        value: MonthOverride,
    ) -> Result<YearMonth, OverrideError> {
        let schedule = schedule.ok_or(OverrideError::NoSchedule)?;
        if let Some(hours) = value.hours.filter(|h| *h < 0.0) {
            return Err(OverrideError::NegativeHours { index, hours });
        }
        let month = schedule.month_at(index).ok_or(OverrideError::OutOfRange {
            index,
            duration: schedule.duration_months(),
        })?;
        self.insert(month, value);
        Ok(month)
    }
}

/// Parses a `<n>M` month-index token into its 1-based index.
pub fn parse_month_token(token: &str) -> Result<u32, OverrideError> {
    let trimmed = token.trim();
    let malformed = || OverrideError::MalformedToken(token.to_string());
    let digits = trimmed
        .strip_suffix('M')
        .or_else(|| trimmed.strip_suffix('m'))
        .ok_or_else(malformed)?;
    match digits.parse::<u32>() {
        Ok(0) | Err(_) => Err(malformed()),
        Ok(index) => Ok(index),
    }
}

/// The operating window of a program, in whole calendar months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub start: YearMonth,
    pub end: YearMonth,
}

impl Schedule {
    pub fn duration_months(&self) -> u32 {
        (self.start.months_until(self.end) + 1).max(1) as u32
    }

    pub fn months(&self) -> impl Iterator<Item = YearMonth> {
        YearMonth::range_inclusive(self.start, self.end)
    }

    /// Calendar month for a 1-based month index, if inside the schedule.
    pub fn month_at(&self, index: u32) -> Option<YearMonth> {
        (1..=self.duration_months())
            .contains(&index)
            .then(|| self.start.add_months(index - 1))
    }
}

/// One training cohort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub id: ProgramId,
    pub name: String,
    pub code: String,
    pub round: u32,
    pub year: Option<i32>,
    pub quarter: Option<Quarter>,
    pub category: Option<String>,
    pub status: ProgramStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub training_hours: f64,
    pub capacity: u32,
    pub confirmed_enrollment: u32,
    pub completed_count: u32,
    pub employed_count: u32,
    pub dropout_count: u32,
    pub workers: u32,
    pub employment_excluded: u32,
    pub completion_excluded: u32,
    pub satisfaction_score: Option<f64>,
    #[serde(default)]
    pub overrides: MonthlyOverrides,
}

impl ProgramRecord {
    /// `None` when either date is missing or the end precedes the start. A
    /// program starting and ending on the same day runs for one month.
    pub fn schedule(&self) -> Option<Schedule> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if start <= end => Some(Schedule {
                start: YearMonth::from_date(start),
                end: YearMonth::from_date(end),
            }),
            _ => None,
        }
    }

    pub fn duration_months(&self) -> Option<u32> {
        self.schedule().map(|s| s.duration_months())
    }

    /// `"name (round)"` label used for tables and chart series.
    pub fn label(&self) -> String {
        if self.round == 0 {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.round)
        }
    }

    /// Explicitly excluded employment (non-zero `employment_excluded` or
    /// `workers`) lifts the employed-vs-completed bound.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.completed_count > self.confirmed_enrollment {
            return Err(IngestError::CompletedExceedsConfirmed {
                completed: self.completed_count,
                confirmed: self.confirmed_enrollment,
            });
        }
        let employment_exempt = self.employment_excluded > 0 || self.workers > 0;
        if !employment_exempt && self.employed_count > self.completed_count {
            return Err(IngestError::EmployedExceedsCompleted {
                employed: self.employed_count,
                completed: self.completed_count,
            });
        }
        Ok(())
    }
}
