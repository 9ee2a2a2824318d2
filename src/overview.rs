//! Per-year headline counts and the start-ordered program timeline.

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{ProgramId, ProgramRecord, ProgramStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearCounts {
    pub year: i32,
    pub programs: usize,
    /// Sum of confirmed enrollment.
    pub students: u64,
}

pub fn year_counts<'a, I>(programs: I, year: i32) -> YearCounts
where
    I: IntoIterator<Item = &'a ProgramRecord>,
{
    let mut counts = YearCounts {
        year,
        programs: 0,
        students: 0,
    };
    for program in programs.into_iter().filter(|p| p.year == Some(year)) {
        counts.programs += 1;
        counts.students += u64::from(program.confirmed_enrollment);
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub program_id: ProgramId,
    pub label: String,
    pub category: Option<String>,
    pub status: ProgramStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Programs of `year` ordered by start date. Undated programs sort as if
/// they started on January 1st; the sort is stable otherwise.
pub fn timeline<'a, I>(programs: I, year: i32) -> Vec<TimelineEntry>
where
    I: IntoIterator<Item = &'a ProgramRecord>,
{
    let fallback = NaiveDate::from_ymd_opt(year, 1, 1);
    let mut entries: Vec<TimelineEntry> = programs
        .into_iter()
        .filter(|p| p.year == Some(year))
        .map(|p| TimelineEntry {
            program_id: p.id,
            label: p.label(),
            category: p.category.clone(),
            status: p.status,
            start_date: p.start_date,
            end_date: p.end_date,
        })
        .collect();
    entries.sort_by_key(|entry| entry.start_date.or(fallback));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(name: &str, year: i32, start: Option<(u32, u32)>, confirmed: u32) -> ProgramRecord {
        ProgramRecord {
            name: name.to_string(),
            year: Some(year),
            start_date: start.and_then(|(m, d)| NaiveDate::from_ymd_opt(year, m, d)),
            confirmed_enrollment: confirmed,
            ..Default::default()
        }
    }

    #[test]
    fn counts_only_the_requested_year() {
        let programs = vec![
            program("Backend", 2025, Some((3, 3)), 20),
            program("Frontend", 2025, Some((1, 6)), 18),
            program("Legacy", 2024, Some((9, 2)), 30),
        ];
        assert_eq!(
            year_counts(&programs, 2025),
            YearCounts {
                year: 2025,
                programs: 2,
                students: 38
            }
        );
        assert_eq!(year_counts(&programs, 2023).programs, 0);
    }

    #[test]
    fn timeline_orders_by_start_with_undated_first() {
        let programs = vec![
            program("Backend", 2025, Some((3, 3)), 20),
            program("Frontend", 2025, Some((1, 6)), 18),
            program("Unscheduled", 2025, None, 10),
            program("Legacy", 2024, Some((9, 2)), 30),
        ];
        let labels: Vec<String> = timeline(&programs, 2025).into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["Unscheduled", "Frontend", "Backend"]);
    }
}
