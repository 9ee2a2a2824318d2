//! Outcome rates over a program set: recruitment, completion, employment and
//! satisfaction.

use std::collections::BTreeMap;

use chrono::Datelike;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::calendar::{Quarter, YearMonth};
use crate::config::DashboardRules;
use crate::models::{ProgramRecord, ProgramStatus};

/// Rates are percentages rounded to two decimals; satisfaction keeps the
/// 0-5 survey scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Kpis {
    pub recruitment_rate: f64,
    pub completion_rate: f64,
    pub employment_rate: f64,
    pub satisfaction: f64,
}

impl Kpis {
    /// Satisfaction rescaled from 0-5 to 0-100.
    pub fn satisfaction_percent(&self) -> f64 {
        round2(self.satisfaction / 5.0 * 100.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RuleSet {
    /// Every rate over the whole set.
    Raw,
    /// Each rate over its own population, see [`DashboardRules`].
    #[default]
    Dashboard,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    Year,
    #[default]
    Quarter,
    Month,
    Program,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiBucket {
    pub key: String,
    #[serde(flatten)]
    pub kpis: Kpis,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn rate(numerator: i64, denominator: i64) -> f64 {
    if denominator <= 0 {
        0.0
    } else {
        round2(numerator as f64 / denominator as f64 * 100.0)
    }
}

pub fn calc_kpis<'a, I>(programs: I) -> Kpis
where
    I: IntoIterator<Item = &'a ProgramRecord>,
{
    let mut capacity = 0i64;
    let mut confirmed = 0i64;
    let mut completed = 0i64;
    let mut employed = 0i64;
    let mut completion_excluded = 0i64;
    let mut employment_excluded = 0i64;
    let mut workers = 0i64;
    let mut satisfaction_sum = 0.0;
    let mut satisfaction_count = 0usize;

    for program in programs {
        capacity += i64::from(program.capacity);
        confirmed += i64::from(program.confirmed_enrollment);
        completed += i64::from(program.completed_count);
        employed += i64::from(program.employed_count);
        completion_excluded += i64::from(program.completion_excluded);
        employment_excluded += i64::from(program.employment_excluded);
        workers += i64::from(program.workers);
        if let Some(score) = program.satisfaction_score {
            satisfaction_sum += score;
            satisfaction_count += 1;
        }
    }

    Kpis {
        recruitment_rate: rate(confirmed, capacity),
        completion_rate: rate(completed, confirmed - completion_excluded),
        employment_rate: rate(employed, completed - (employment_excluded + workers)),
        satisfaction: if satisfaction_count == 0 {
            0.0
        } else {
            round2(satisfaction_sum / satisfaction_count as f64)
        },
    }
}

/// Recruitment over programs ending in the reference year; completion and
/// satisfaction over those that are also closed; employment over closed
/// programs that ended inside the employment window.
pub fn dashboard_kpis(programs: &[&ProgramRecord], rules: &DashboardRules) -> Kpis {
    let ends_in_reference_year =
        |p: &ProgramRecord| p.end_date.is_some_and(|d| d.year() == rules.reference_year);
    let closed = |p: &ProgramRecord| p.status == ProgramStatus::Closed;
    let ended_in_window = |p: &ProgramRecord| {
        p.end_date.is_some_and(|d| {
            rules.employment_window_start <= d && d <= rules.employment_window_end
        })
    };

    let recruited = calc_kpis(programs.iter().copied().filter(|p| ends_in_reference_year(*p)));
    let finished = calc_kpis(
        programs
            .iter()
            .copied()
            .filter(|p| ends_in_reference_year(*p) && closed(*p)),
    );
    let placed = calc_kpis(
        programs
            .iter()
            .copied()
            .filter(|p| closed(*p) && ended_in_window(*p)),
    );

    Kpis {
        recruitment_rate: recruited.recruitment_rate,
        completion_rate: finished.completion_rate,
        employment_rate: placed.employment_rate,
        satisfaction: finished.satisfaction,
    }
}

pub fn kpis_for(programs: &[&ProgramRecord], rule_set: RuleSet, rules: &DashboardRules) -> Kpis {
    match rule_set {
        RuleSet::Raw => calc_kpis(programs.iter().copied()),
        RuleSet::Dashboard => dashboard_kpis(programs, rules),
    }
}

fn bucket_key(program: &ProgramRecord, granularity: Granularity) -> Option<String> {
    let end_month = program.end_date.map(YearMonth::from_date);
    let key = match granularity {
        Granularity::Year => end_month
            .map(|m| m.year())
            .or(program.year)
            .map(|y| y.to_string()),
        Granularity::Quarter => program
            .quarter
            .or_else(|| end_month.map(|m| m.quarter()))
            .map(|q| q.to_string()),
        Granularity::Month => end_month.map(|m| m.to_string()),
        Granularity::Program => Some(program.name.trim().to_string()),
    };
    key.filter(|k| !k.is_empty())
}

/// Groups programs by `granularity` and computes rates per group. Quarter
/// buckets always cover Q1..Q4, zero-filled; other buckets appear only when
/// populated, in ascending key order. Programs without a key are dropped.
pub fn kpis_by(
    programs: &[&ProgramRecord],
    granularity: Granularity,
    rule_set: RuleSet,
    rules: &DashboardRules,
) -> Vec<KpiBucket> {
    let mut buckets: BTreeMap<String, Vec<&ProgramRecord>> = BTreeMap::new();
    for program in programs {
        if let Some(key) = bucket_key(program, granularity) {
            buckets.entry(key).or_default().push(*program);
        }
    }

    if granularity == Granularity::Quarter {
        return Quarter::ALL
            .iter()
            .map(|quarter| {
                let key = quarter.to_string();
                let kpis = buckets
                    .get(&key)
                    .map(|members| kpis_for(members, rule_set, rules))
                    .unwrap_or_default();
                KpiBucket { key, kpis }
            })
            .collect();
    }

    buckets
        .into_iter()
        .map(|(key, members)| KpiBucket {
            kpis: kpis_for(&members, rule_set, rules),
            key,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn closed_program(end: (i32, u32, u32)) -> ProgramRecord {
        ProgramRecord {
            name: "Backend Bootcamp".to_string(),
            status: ProgramStatus::Closed,
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2),
            capacity: 30,
            confirmed_enrollment: 24,
            completed_count: 20,
            employed_count: 12,
            completion_excluded: 4,
            employment_excluded: 2,
            workers: 2,
            satisfaction_score: Some(4.5),
            ..Default::default()
        }
    }

    #[test]
    fn raw_rates_use_adjusted_denominators() {
        let program = closed_program((2025, 3, 31));
        let kpis = calc_kpis([&program]);
        assert_eq!(kpis.recruitment_rate, 80.0);
        assert_eq!(kpis.completion_rate, 100.0);
        assert_eq!(kpis.employment_rate, 75.0);
        assert_eq!(kpis.satisfaction, 4.5);
        assert_eq!(kpis.satisfaction_percent(), 90.0);
    }

    #[test]
    fn empty_denominators_yield_zero() {
        let kpis = calc_kpis(std::iter::empty());
        assert_eq!(kpis, Kpis::default());
    }

    #[test]
    fn satisfaction_averages_only_reported_scores() {
        let mut silent = closed_program((2025, 3, 31));
        silent.satisfaction_score = None;
        let mut rated = closed_program((2025, 3, 31));
        rated.satisfaction_score = Some(4.0);
        assert_eq!(calc_kpis([&silent, &rated]).satisfaction, 4.0);
    }

    #[test]
    fn dashboard_rules_pick_separate_populations() {
        let rules = DashboardRules::default();
        let in_window = closed_program((2025, 3, 31));
        let mut open = closed_program((2025, 11, 30));
        open.status = ProgramStatus::InProgress;
        open.completed_count = 0;
        let mut last_year = closed_program((2024, 9, 30));
        last_year.employed_count = 16;

        let set = vec![&in_window, &open, &last_year];
        let kpis = dashboard_kpis(&set, &rules);
        assert_eq!(kpis.recruitment_rate, 80.0);
        assert_eq!(kpis.completion_rate, 100.0);
        assert_eq!(kpis.employment_rate, round2(28.0 / 32.0 * 100.0));
    }

    #[test]
    fn quarter_buckets_are_always_four() {
        let mut program = closed_program((2025, 8, 29));
        program.quarter = None;
        let set = vec![&program];
        let buckets = kpis_by(&set, Granularity::Quarter, RuleSet::Raw, &DashboardRules::default());
        let keys: Vec<&str> = buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["Q1", "Q2", "Q3", "Q4"]);
        assert_eq!(buckets[0].kpis, Kpis::default());
        assert_eq!(buckets[2].kpis.recruitment_rate, 80.0);
    }

    #[test]
    fn month_buckets_follow_end_month() {
        let a = closed_program((2025, 8, 29));
        let b = closed_program((2025, 2, 14));
        let set = vec![&a, &b];
        let buckets = kpis_by(&set, Granularity::Month, RuleSet::Raw, &DashboardRules::default());
        let keys: Vec<&str> = buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["2025-02", "2025-08"]);
    }
}
