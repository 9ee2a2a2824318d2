use std::cmp::Ordering;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use chrono::NaiveDate;
use serde::Serialize;

use crate::calendar::{Quarter, YearMonth};
use crate::config::Pricing;
use crate::engine::RevenueEngine;
use crate::models::{ProgramId, ProgramRecord};

/// Expected (modeled), actual (override-aware), gap and no-attrition
/// ceiling. `gap == expected - actual` for every value built here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RevenueTotals {
    pub expected: i64,
    pub actual: i64,
    pub gap: i64,
    pub max: i64,
}

impl RevenueTotals {
    pub fn new(expected: i64, actual: i64, max: i64) -> Self {
        Self {
            expected,
            actual,
            gap: expected - actual,
            max,
        }
    }
}

impl Add for RevenueTotals {
    type Output = RevenueTotals;

    fn add(self, rhs: Self) -> Self::Output {
        RevenueTotals::new(
            self.expected + rhs.expected,
            self.actual + rhs.actual,
            self.max + rhs.max,
        )
    }
}

impl AddAssign for RevenueTotals {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for RevenueTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(RevenueTotals::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramRevenue {
    pub program_id: ProgramId,
    pub program: String,
    pub round: u32,
    pub quarter: Option<Quarter>,
    pub start_date: Option<NaiveDate>,
    pub duration_months: u32,
    pub totals: RevenueTotals,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RevenueReport {
    pub totals: RevenueTotals,
    pub items: Vec<ProgramRevenue>,
}

/// Revenue if nobody left: confirmed headcount billed for every month.
pub fn max_revenue(program: &ProgramRecord, pricing: &Pricing) -> i64 {
    let Some(duration) = program.duration_months() else {
        return 0;
    };
    let confirmed = program.confirmed_enrollment as f64;
    let raw = match *pricing {
        Pricing::PerHeadMonth { unit_price } => confirmed * duration as f64 * unit_price,
        Pricing::PerHeadHour { hourly_rate } => {
            confirmed * program.training_hours.max(0.0) * hourly_rate
        }
    };
    raw.round() as i64
}

pub fn reconcile_program(engine: &RevenueEngine, program: &ProgramRecord) -> ProgramRevenue {
    let curve = engine.curve(program);
    let expected: i64 = curve.iter().map(|p| p.modeled_revenue).sum();
    let actual: i64 = curve.iter().map(|p| p.revenue).sum();

    ProgramRevenue {
        program_id: program.id,
        program: program.name.clone(),
        round: program.round,
        quarter: program.quarter,
        start_date: program.start_date,
        duration_months: curve.len() as u32,
        totals: RevenueTotals::new(expected, actual, max_revenue(program, engine.pricing())),
    }
}

/// Reconciles an already-filtered program set. Rows come back newest start
/// first, undated programs last.
pub fn reconcile<'a, I>(engine: &RevenueEngine, programs: I) -> RevenueReport
where
    I: IntoIterator<Item = &'a ProgramRecord>,
{
    let mut items: Vec<ProgramRevenue> = programs
        .into_iter()
        .map(|program| reconcile_program(engine, program))
        .collect();
    items.sort_by(newest_start_first);

    RevenueReport {
        totals: items.iter().map(|item| item.totals).sum(),
        items,
    }
}

fn newest_start_first(a: &ProgramRevenue, b: &ProgramRevenue) -> Ordering {
    match (a.start_date, b.start_date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.program_id.cmp(&b.program_id))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSnapshotItem {
    pub program_id: ProgramId,
    pub program: String,
    pub round: u32,
    pub month_index: u32,
    pub modeled_revenue: i64,
    pub revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSnapshot {
    pub month: YearMonth,
    pub total: i64,
    pub items: Vec<MonthSnapshotItem>,
}

/// Every program operating in `month`, highest revenue first.
pub fn month_snapshot<'a, I>(engine: &RevenueEngine, programs: I, month: YearMonth) -> MonthSnapshot
where
    I: IntoIterator<Item = &'a ProgramRecord>,
{
    let mut items: Vec<MonthSnapshotItem> = programs
        .into_iter()
        .filter_map(|program| {
            let point = engine
                .curve(program)
                .into_iter()
                .find(|point| point.month == month)?;
            Some(MonthSnapshotItem {
                program_id: program.id,
                program: program.name.clone(),
                round: program.round,
                month_index: point.month_index,
                modeled_revenue: point.modeled_revenue,
                revenue: point.revenue,
            })
        })
        .collect();
    items.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then_with(|| a.program_id.cmp(&b.program_id))
    });

    MonthSnapshot {
        month,
        total: items.iter().map(|item| item.revenue).sum(),
        items,
    }
}
