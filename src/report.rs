use std::fmt::Write;

use crate::aggregate;
use crate::config::DashboardRules;
use crate::engine::RevenueEngine;
use crate::filter::ProgramQuery;
use crate::kpi::{self, RuleSet};
use crate::models::ProgramRecord;
use crate::overview;
use crate::revenue::{self, RevenueTotals};

fn describe_query(query: &ProgramQuery) -> String {
    let query = query.clone().normalized();
    let mut parts = Vec::new();
    if let Some(year) = query.year {
        parts.push(format!("year {year}"));
    }
    if let Some(quarter) = query.quarter {
        parts.push(quarter.to_string());
    }
    if let Some(category) = query.category {
        parts.push(format!("category {category}"));
    }
    if let Some(status) = query.status {
        parts.push(format!("status {status}"));
    }
    if let Some(name) = query.name_like {
        parts.push(format!("name containing \"{name}\""));
    }

    if parts.is_empty() {
        "all programs".to_string()
    } else {
        parts.join(", ")
    }
}

fn write_totals(output: &mut String, totals: &RevenueTotals) {
    let _ = writeln!(output, "- Expected: {}", totals.expected);
    let _ = writeln!(output, "- Actual: {}", totals.actual);
    let _ = writeln!(output, "- Gap: {}", totals.gap);
    let _ = writeln!(output, "- Capacity ceiling: {}", totals.max);
}

/// Markdown summary of an already-filtered program set.
pub fn build_report(
    engine: &RevenueEngine,
    rules: &DashboardRules,
    query: &ProgramQuery,
    programs: &[&ProgramRecord],
) -> String {
    let revenue = revenue::reconcile(engine, programs.iter().copied());
    let monthly = aggregate::monthly_totals(engine, programs.iter().copied());
    let kpis = kpi::kpis_for(programs, RuleSet::Dashboard, rules);

    let mut output = String::new();
    let _ = writeln!(output, "# Training Revenue Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} programs, {} model)",
        describe_query(query),
        programs.len(),
        engine.model().name()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Outcomes");

    if programs.is_empty() {
        let _ = writeln!(output, "No programs recorded for this selection.");
    } else {
        let _ = writeln!(output, "- Recruitment rate: {:.2}%", kpis.recruitment_rate);
        let _ = writeln!(output, "- Completion rate: {:.2}%", kpis.completion_rate);
        let _ = writeln!(output, "- Employment rate: {:.2}%", kpis.employment_rate);
        let _ = writeln!(
            output,
            "- Satisfaction: {:.2} / 5 ({:.2}%)",
            kpis.satisfaction,
            kpis.satisfaction_percent()
        );
    }

    let mut years: Vec<i32> = programs.iter().filter_map(|p| p.year).collect();
    years.sort_unstable_by(|a, b| b.cmp(a));
    years.dedup();

    let _ = writeln!(output);
    let _ = writeln!(output, "## Programs by Year");

    if years.is_empty() {
        let _ = writeln!(output, "No program years recorded for this selection.");
    } else {
        for year in years {
            let counts = overview::year_counts(programs.iter().copied(), year);
            let _ = writeln!(
                output,
                "- {}: {} programs, {} students",
                counts.year, counts.programs, counts.students
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Revenue Totals");
    write_totals(&mut output, &revenue.totals);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Revenue by Program");

    if revenue.items.is_empty() {
        let _ = writeln!(output, "No programs recorded for this selection.");
    } else {
        for item in &revenue.items {
            let started = item
                .start_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "undated".to_string());
            let _ = writeln!(
                output,
                "- {} round {} (started {}, {} months): expected {}, actual {}, gap {}",
                item.program,
                item.round,
                started,
                item.duration_months,
                item.totals.expected,
                item.totals.actual,
                item.totals.gap
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Revenue");

    if monthly.is_empty() {
        let _ = writeln!(output, "No scheduled months in this selection.");
    } else {
        for (month, total) in &monthly {
            let _ = writeln!(output, "- {month}: {total}");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Quarter;
    use crate::config::EngineConfig;
    use chrono::NaiveDate;

    fn program() -> ProgramRecord {
        ProgramRecord {
            name: "Backend Bootcamp".to_string(),
            round: 2,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 6),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 28),
            capacity: 12,
            confirmed_enrollment: 10,
            completed_count: 8,
            ..Default::default()
        }
    }

    #[test]
    fn report_lists_programs_and_months() {
        let engine = RevenueEngine::new(&EngineConfig::per_head_month(100.0));
        let mut record = program();
        record.year = Some(2025);
        let query = ProgramQuery {
            quarter: Some(Quarter::Q1),
            ..Default::default()
        };
        let report = build_report(&engine, &DashboardRules::default(), &query, &[&record]);

        assert!(report.contains("Generated for Q1 (1 programs, arithmetic model)"));
        assert!(report.contains("- Expected: 2700"));
        assert!(report.contains("Backend Bootcamp round 2 (started 2025-01-06, 3 months)"));
        assert!(report.contains("- 2025-02: 900"));
        assert!(report.contains("- 2025: 1 programs, 10 students"));
    }

    #[test]
    fn empty_selection_says_so() {
        let engine = RevenueEngine::default();
        let report = build_report(
            &engine,
            &DashboardRules::default(),
            &ProgramQuery::default(),
            &[],
        );
        assert!(report.contains("Generated for all programs"));
        assert!(report.contains("No programs recorded for this selection."));
        assert!(report.contains("No scheduled months in this selection."));
        assert!(report.contains("- Gap: 0"));
    }
}
