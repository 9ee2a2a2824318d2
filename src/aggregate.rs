use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::calendar::YearMonth;
use crate::engine::RevenueEngine;
use crate::models::{ProgramId, ProgramRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AggregationMode {
    /// Fixed January..December axis, every program summed into one series.
    YearOverview { year: i32 },
    /// Axis built from the selected programs' active months.
    Comparison,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramSeries {
    /// `None` for the summed year-overview series.
    pub program_id: Option<ProgramId>,
    pub label: String,
    pub values: Vec<i64>,
}

/// Chart-ready revenue series sharing one month axis. Each series has
/// exactly `axis.len()` values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedSeries {
    pub mode: AggregationMode,
    pub axis: Vec<YearMonth>,
    pub series: Vec<ProgramSeries>,
}

impl AggregatedSeries {
    pub fn is_empty(&self) -> bool {
        self.axis.is_empty() || self.series.is_empty()
    }
}

/// Revenue per calendar month summed over `programs`.
pub fn monthly_totals<'a, I>(engine: &RevenueEngine, programs: I) -> BTreeMap<YearMonth, i64>
where
    I: IntoIterator<Item = &'a ProgramRecord>,
{
    let mut totals = BTreeMap::new();
    for program in programs {
        for point in engine.curve(program) {
            *totals.entry(point.month).or_insert(0) += point.revenue;
        }
    }
    totals
}

/// With no explicit selection the chart shows one year of summed revenue;
/// otherwise the selected programs are compared side by side.
pub fn aggregate(
    engine: &RevenueEngine,
    programs: &[ProgramRecord],
    selection: &[ProgramId],
    year: i32,
) -> AggregatedSeries {
    if selection.is_empty() {
        year_overview(engine, programs, year)
    } else {
        compare(engine, programs, selection)
    }
}

pub fn year_overview<'a, I>(engine: &RevenueEngine, programs: I, year: i32) -> AggregatedSeries
where
    I: IntoIterator<Item = &'a ProgramRecord>,
{
    let totals = monthly_totals(engine, programs);
    let axis: Vec<YearMonth> = YearMonth::months_of_year(year).collect();
    let values = axis
        .iter()
        .map(|month| totals.get(month).copied().unwrap_or(0))
        .collect();

    AggregatedSeries {
        mode: AggregationMode::YearOverview { year },
        axis,
        series: vec![ProgramSeries {
            program_id: None,
            label: format!("{year} all programs"),
            values,
        }],
    }
}

/// Axis is the sorted union of months in which any selected program has
/// non-zero modeled or actual revenue. Selected ids missing from
/// `programs` are skipped; repeated ids count once.
pub fn compare(
    engine: &RevenueEngine,
    programs: &[ProgramRecord],
    selection: &[ProgramId],
) -> AggregatedSeries {
    let mut seen = HashSet::new();
    let mut axis_months = BTreeSet::new();
    let mut per_program: Vec<(&ProgramRecord, BTreeMap<YearMonth, i64>)> = Vec::new();

    for id in selection {
        if !seen.insert(*id) {
            continue;
        }
        let Some(program) = programs.iter().find(|p| p.id == *id) else {
            debug!(program = %id, "selected program not in snapshot, skipping");
            continue;
        };

        let mut revenue_by_month = BTreeMap::new();
        for point in engine.curve(program) {
            if point.revenue != 0 || point.modeled_revenue != 0 {
                axis_months.insert(point.month);
            }
            revenue_by_month.insert(point.month, point.revenue);
        }
        per_program.push((program, revenue_by_month));
    }

    let axis: Vec<YearMonth> = axis_months.into_iter().collect();
    let series = per_program
        .into_iter()
        .map(|(program, revenue_by_month)| ProgramSeries {
            program_id: Some(program.id),
            label: program.label(),
            values: axis
                .iter()
                .map(|month| revenue_by_month.get(month).copied().unwrap_or(0))
                .collect(),
        })
        .collect();

    AggregatedSeries {
        mode: AggregationMode::Comparison,
        axis,
        series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn engine() -> RevenueEngine {
        RevenueEngine::new(&EngineConfig::per_head_month(100.0))
    }

    fn program(start: (i32, u32), end: (i32, u32), confirmed: u32, completed: u32) -> ProgramRecord {
        ProgramRecord {
            id: Uuid::new_v4(),
            name: format!("Cohort {}-{}", start.0, start.1),
            start_date: NaiveDate::from_ymd_opt(start.0, start.1, 2),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, 26),
            confirmed_enrollment: confirmed,
            completed_count: completed,
            ..Default::default()
        }
    }

    fn keys(series: &AggregatedSeries) -> Vec<String> {
        series.axis.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn comparison_axis_is_union_of_active_months() {
        let a = program((2025, 1), (2025, 3), 30, 24);
        let b = program((2025, 2), (2025, 2), 10, 10);
        let programs = vec![a.clone(), b.clone()];

        let chart = aggregate(&engine(), &programs, &[a.id, b.id], 2025);
        assert_eq!(chart.mode, AggregationMode::Comparison);
        assert_eq!(keys(&chart), vec!["2025-01", "2025-02", "2025-03"]);
        assert_eq!(chart.series[0].values, vec![3000, 2700, 2400]);
        assert_eq!(chart.series[1].values, vec![0, 1000, 0]);
    }

    #[test]
    fn comparison_axis_crosses_years() {
        let late = program((2024, 11), (2025, 1), 12, 12);
        let early = program((2025, 6), (2025, 7), 8, 8);
        let programs = vec![late.clone(), early.clone()];

        let chart = compare(&engine(), &programs, &[early.id, late.id]);
        assert_eq!(
            keys(&chart),
            vec!["2024-11", "2024-12", "2025-01", "2025-06", "2025-07"]
        );
        assert_eq!(chart.series[0].label, early.label());
        assert_eq!(chart.series[0].values, vec![0, 0, 0, 800, 800]);
    }

    #[test]
    fn missing_and_repeated_selections_are_tolerated() {
        let a = program((2025, 1), (2025, 3), 30, 24);
        let programs = vec![a.clone()];

        let chart = compare(&engine(), &programs, &[Uuid::new_v4(), a.id, a.id]);
        assert_eq!(chart.series.len(), 1);
        assert_eq!(chart.axis.len(), 3);
    }

    #[test]
    fn months_without_revenue_stay_off_the_axis() {
        let empty = program((2025, 3), (2025, 4), 0, 0);
        let programs = vec![empty.clone()];

        let chart = compare(&engine(), &programs, &[empty.id]);
        assert!(chart.axis.is_empty());
        assert!(chart.is_empty());
        assert!(chart.series[0].values.is_empty());
    }

    #[test]
    fn empty_selection_sums_one_year() {
        let programs = vec![
            program((2024, 12), (2025, 2), 10, 10),
            program((2025, 2), (2025, 2), 5, 5),
        ];

        let chart = aggregate(&engine(), &programs, &[], 2025);
        assert_eq!(chart.mode, AggregationMode::YearOverview { year: 2025 });
        assert_eq!(chart.axis.len(), 12);
        assert_eq!(chart.series.len(), 1);
        assert_eq!(&chart.series[0].values[..3], &[1000, 1500, 0]);
        assert_eq!(chart.series[0].values.iter().sum::<i64>(), 2500);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let programs: Vec<ProgramRecord> = (1..=6)
            .map(|m| program((2025, m), (2025, m + 2), 10 + m, 5))
            .collect();
        let selection: Vec<ProgramId> = programs.iter().rev().map(|p| p.id).collect();

        let first = compare(&engine(), &programs, &selection);
        let second = compare(&engine(), &programs, &selection);
        assert_eq!(first, second);
        assert!(first.axis.windows(2).all(|w| w[0] < w[1]));
    }
}
