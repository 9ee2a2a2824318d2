use serde::Serialize;
use tracing::debug;

use crate::calendar::YearMonth;
use crate::config::Pricing;
use crate::models::ProgramRecord;
use crate::projection::ProjectionModel;

/// One operating month of a program. `modeled_*` fields come from the
/// projection model; the unprefixed fields apply operator overrides on top.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCurvePoint {
    pub month: YearMonth,
    pub month_index: u32,
    pub modeled_enrollment: f64,
    pub enrollment: f64,
    pub modeled_hours: f64,
    pub hours: f64,
    pub modeled_revenue: i64,
    pub revenue: i64,
    pub overridden: bool,
}

/// Produces one point per calendar month from start to end inclusive, or an
/// empty curve when the program has no valid schedule.
pub fn generate_curve(
    program: &ProgramRecord,
    model: &dyn ProjectionModel,
    pricing: &Pricing,
) -> Vec<MonthlyCurvePoint> {
    let Some(schedule) = program.schedule() else {
        debug!(program = %program.id, name = %program.name, "no valid schedule, empty curve");
        return Vec::new();
    };

    let duration = schedule.duration_months();
    let modeled_hours = program.training_hours.max(0.0) / duration as f64;

    schedule
        .months()
        .zip(1..)
        .map(|(month, month_index)| {
            let modeled_enrollment = model.enrollment(program, month_index).max(0.0);
            let overrides = program.overrides.get(month);
            let enrollment = overrides
                .and_then(|o| o.enrollment)
                .map(f64::from)
                .unwrap_or(modeled_enrollment);
            let hours = overrides.and_then(|o| o.hours).unwrap_or(modeled_hours);
            let overridden =
                overrides.is_some_and(|o| o.enrollment.is_some() || o.hours.is_some());

            MonthlyCurvePoint {
                month,
                month_index,
                modeled_enrollment,
                enrollment,
                modeled_hours,
                hours,
                modeled_revenue: pricing.month_revenue(modeled_enrollment, modeled_hours),
                revenue: pricing.month_revenue(enrollment, hours),
                overridden,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MonthOverride, MonthlyOverrides};
    use crate::projection::ArithmeticDecline;
    use chrono::NaiveDate;

    fn program_a() -> ProgramRecord {
        ProgramRecord {
            name: "Data Engineering".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 6),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 28),
            confirmed_enrollment: 30,
            completed_count: 24,
            training_hours: 480.0,
            ..Default::default()
        }
    }

    const PRICE: Pricing = Pricing::PerHeadMonth { unit_price: 100.0 };

    #[test]
    fn curve_follows_arithmetic_decline() {
        let curve = generate_curve(&program_a(), &ArithmeticDecline::default(), &PRICE);
        let revenue: Vec<i64> = curve.iter().map(|p| p.revenue).collect();
        assert_eq!(revenue, vec![3000, 2700, 2400]);
        assert_eq!(curve[0].month.to_string(), "2025-01");
        assert_eq!(curve[2].month_index, 3);
        assert!(curve.iter().all(|p| !p.overridden));
    }

    #[test]
    fn override_replaces_enrollment_but_keeps_model() {
        let mut program = program_a();
        let mut overrides = MonthlyOverrides::new();
        overrides
            .place(
                program.schedule().as_ref(),
                "2M",
                MonthOverride {
                    enrollment: Some(20),
                    hours: None,
                },
            )
            .unwrap();
        program.overrides = overrides;

        let curve = generate_curve(&program, &ArithmeticDecline::default(), &PRICE);
        assert_eq!(curve[1].modeled_enrollment, 27.0);
        assert_eq!(curve[1].enrollment, 20.0);
        assert_eq!(curve[1].modeled_revenue, 2700);
        assert_eq!(curve[1].revenue, 2000);
        assert!(curve[1].overridden);
    }

    #[test]
    fn hourly_pricing_spreads_hours_and_honours_hour_overrides() {
        let mut program = program_a();
        let month = YearMonth::new(2025, 3).unwrap();
        program.overrides.insert(
            month,
            MonthOverride {
                enrollment: None,
                hours: Some(100.0),
            },
        );
        let pricing = Pricing::PerHeadHour { hourly_rate: 10.0 };

        let curve = generate_curve(&program, &ArithmeticDecline::default(), &pricing);
        assert_eq!(curve[0].hours, 160.0);
        assert_eq!(curve[0].revenue, 30 * 160 * 10);
        assert_eq!(curve[2].modeled_revenue, 24 * 160 * 10);
        assert_eq!(curve[2].revenue, 24 * 100 * 10);
    }

    #[test]
    fn invalid_schedule_yields_empty_curve() {
        let mut program = program_a();
        program.end_date = None;
        assert!(generate_curve(&program, &ArithmeticDecline::default(), &PRICE).is_empty());

        program.end_date = NaiveDate::from_ymd_opt(2024, 12, 1);
        assert!(generate_curve(&program, &ArithmeticDecline::default(), &PRICE).is_empty());
    }
}
