use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::calendar::Quarter;
use crate::ingest::{self, OverrideRow};
use crate::models::{ProgramRecord, ProgramStatus};

/// Narrowing constraints; `None` means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramQuery {
    pub year: Option<i32>,
    pub quarter: Option<Quarter>,
    pub category: Option<String>,
    pub status: Option<ProgramStatus>,
    pub name_like: Option<String>,
}

impl ProgramQuery {
    /// Blank text constraints are dropped rather than matched literally.
    pub fn normalized(mut self) -> Self {
        self.category = non_blank(self.category);
        self.name_like = non_blank(self.name_like).map(|needle| needle.to_lowercase());
        self
    }

    pub fn is_unconstrained(&self) -> bool {
        let query = self.clone().normalized();
        query.year.is_none()
            && query.quarter.is_none()
            && query.category.is_none()
            && query.status.is_none()
            && query.name_like.is_none()
    }

    pub fn matches(&self, program: &ProgramRecord) -> bool {
        if self.year.is_some_and(|year| program.year != Some(year)) {
            return false;
        }
        if self.quarter.is_some_and(|q| program.quarter != Some(q)) {
            return false;
        }
        if self.status.is_some_and(|s| program.status != s) {
            return false;
        }
        if let Some(category) = self.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            if program.category.as_deref().map(str::trim) != Some(category) {
                return false;
            }
        }
        if let Some(needle) = self.name_like.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            if !program.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }

    /// Matching programs in their original relative order.
    pub fn apply<'a>(&self, programs: &'a [ProgramRecord]) -> Vec<&'a ProgramRecord> {
        programs.iter().filter(|p| self.matches(p)).collect()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Values offered by the dashboard's filter dropdowns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOptions {
    /// Newest first.
    pub years: Vec<i32>,
    pub quarters: Vec<Quarter>,
    pub categories: Vec<String>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            years: Vec::new(),
            quarters: Quarter::ALL.to_vec(),
            categories: Vec::new(),
        }
    }
}

impl FilterOptions {
    pub fn collect(programs: &[ProgramRecord]) -> Self {
        let years: BTreeSet<i32> = programs.iter().filter_map(|p| p.year).collect();
        let quarters: BTreeSet<Quarter> = programs.iter().filter_map(|p| p.quarter).collect();
        let categories: BTreeSet<String> = programs
            .iter()
            .filter_map(|p| p.category.as_deref().map(str::trim))
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            years: years.into_iter().rev().collect(),
            quarters: if quarters.is_empty() {
                Quarter::ALL.to_vec()
            } else {
                quarters.into_iter().collect()
            },
            categories: categories.into_iter().collect(),
        }
    }
}

/// Programs and filter options fetched once per interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub programs: Vec<ProgramRecord>,
    pub options: FilterOptions,
}

impl Snapshot {
    pub fn from_programs(programs: Vec<ProgramRecord>) -> Self {
        Self {
            options: FilterOptions::collect(&programs),
            programs,
        }
    }

    /// Combines independently fetched parts. A failed part falls back to its
    /// default and the rest are still used.
    pub fn assemble(
        programs: anyhow::Result<Vec<ProgramRecord>>,
        overrides: anyhow::Result<Vec<OverrideRow>>,
        options: anyhow::Result<FilterOptions>,
    ) -> Self {
        let mut programs = programs.unwrap_or_else(|err| {
            warn!(error = %err, "program fetch failed, continuing with none");
            Vec::new()
        });
        let overrides = overrides.unwrap_or_else(|err| {
            warn!(error = %err, "override fetch failed, using modeled figures only");
            Vec::new()
        });
        let options = options.unwrap_or_else(|err| {
            warn!(error = %err, "filter option fetch failed, using defaults");
            FilterOptions::default()
        });

        ingest::attach_overrides(&mut programs, &overrides);
        Self { programs, options }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::YearMonth;
    use anyhow::anyhow;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn program(name: &str, year: i32, quarter: Quarter, category: &str) -> ProgramRecord {
        ProgramRecord {
            name: name.to_string(),
            year: Some(year),
            quarter: Some(quarter),
            category: Some(category.to_string()),
            ..Default::default()
        }
    }

    fn sample() -> Vec<ProgramRecord> {
        vec![
            program("Cloud Native Bootcamp", 2025, Quarter::Q1, "Platform"),
            program("Data Engineering", 2025, Quarter::Q2, "Data"),
            program("Applied ML", 2025, Quarter::Q1, "Data"),
            program("Cloud Security", 2024, Quarter::Q3, "Platform"),
        ]
    }

    #[test]
    fn quarter_filter_preserves_input_order() {
        let programs = sample();
        let query = ProgramQuery {
            quarter: Some(Quarter::Q1),
            ..Default::default()
        };
        let names: Vec<&str> = query.apply(&programs).iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Cloud Native Bootcamp", "Applied ML"]);
    }

    #[test]
    fn constraints_combine_conjunctively() {
        let programs = sample();
        let query = ProgramQuery {
            year: Some(2025),
            category: Some("Data".to_string()),
            name_like: Some("ENGINEER".to_string()),
            ..Default::default()
        };
        let matched = query.apply(&programs);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "Data Engineering");
    }

    #[test]
    fn blank_values_mean_no_constraint() {
        let programs = sample();
        let query = ProgramQuery {
            category: Some("   ".to_string()),
            name_like: Some(String::new()),
            ..Default::default()
        };
        assert!(query.is_unconstrained());
        assert_eq!(query.apply(&programs).len(), programs.len());
    }

    #[test]
    fn status_filter_excludes_other_states() {
        let mut programs = sample();
        programs[1].status = ProgramStatus::Closed;
        let query = ProgramQuery {
            status: Some(ProgramStatus::Closed),
            ..Default::default()
        };
        assert_eq!(query.apply(&programs).len(), 1);
    }

    #[test]
    fn options_are_distinct_and_years_descend() {
        let options = FilterOptions::collect(&sample());
        assert_eq!(options.years, vec![2025, 2024]);
        assert_eq!(options.quarters, vec![Quarter::Q1, Quarter::Q2, Quarter::Q3]);
        assert_eq!(options.categories, vec!["Data", "Platform"]);
        assert_eq!(FilterOptions::collect(&[]).quarters.len(), 4);
    }

    fn scheduled() -> ProgramRecord {
        ProgramRecord {
            id: Uuid::from_u128(7),
            name: "Cloud Native Bootcamp".to_string(),
            code: "CNB".to_string(),
            year: Some(2025),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 6),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 28),
            confirmed_enrollment: 20,
            ..Default::default()
        }
    }

    fn override_row() -> OverrideRow {
        OverrideRow {
            program_id: Some(Uuid::from_u128(7)),
            month: "2M".to_string(),
            enrollment: Some(18),
            ..Default::default()
        }
    }

    fn options() -> FilterOptions {
        FilterOptions {
            years: vec![2025],
            quarters: vec![Quarter::Q1],
            categories: vec!["Platform".to_string()],
        }
    }

    #[test]
    fn assemble_uses_every_part_that_arrived() {
        let snapshot = Snapshot::assemble(Ok(vec![scheduled()]), Ok(vec![override_row()]), Ok(options()));
        let feb = YearMonth::new(2025, 2).unwrap();
        assert_eq!(snapshot.programs[0].overrides.get(feb).and_then(|o| o.enrollment), Some(18));
        assert_eq!(snapshot.options, options());
    }

    #[test]
    fn failed_program_fetch_leaves_other_parts_intact() {
        let snapshot = Snapshot::assemble(Err(anyhow!("timeout")), Ok(vec![override_row()]), Ok(options()));
        assert!(snapshot.programs.is_empty());
        assert_eq!(snapshot.options, options());
    }

    #[test]
    fn failed_override_fetch_keeps_modeled_programs() {
        let snapshot = Snapshot::assemble(Ok(vec![scheduled()]), Err(anyhow!("timeout")), Ok(options()));
        assert_eq!(snapshot.programs.len(), 1);
        assert_eq!(snapshot.programs[0].overrides, Default::default());
        assert_eq!(snapshot.options, options());
    }

    #[test]
    fn failed_option_fetch_falls_back_to_default_options() {
        let snapshot = Snapshot::assemble(Ok(vec![scheduled()]), Ok(vec![override_row()]), Err(anyhow!("timeout")));
        assert_eq!(snapshot.programs.len(), 1);
        let feb = YearMonth::new(2025, 2).unwrap();
        assert!(snapshot.programs[0].overrides.get(feb).is_some());
        assert_eq!(snapshot.options, FilterOptions::default());
    }
}
