use crate::config::{EngineConfig, Pricing};
use crate::curve::{generate_curve, MonthlyCurvePoint};
use crate::models::ProgramRecord;
use crate::projection::{model_for, ProjectionModel};

/// Pricing plus the projection model that every computation pass shares.
/// Holds no mutable state, so one engine can serve concurrent passes.
pub struct RevenueEngine {
    pricing: Pricing,
    model: Box<dyn ProjectionModel>,
}

impl RevenueEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            pricing: config.pricing,
            model: model_for(config.model, config.terminal),
        }
    }

    pub fn with_model(pricing: Pricing, model: Box<dyn ProjectionModel>) -> Self {
        Self { pricing, model }
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn model(&self) -> &dyn ProjectionModel {
        self.model.as_ref()
    }

    pub fn curve(&self, program: &ProgramRecord) -> Vec<MonthlyCurvePoint> {
        generate_curve(program, self.model.as_ref(), &self.pricing)
    }
}

impl Default for RevenueEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionModel;
    use chrono::NaiveDate;

    /// Loses a fixed headcount every month after the first.
    struct StepDown(f64);

    impl ProjectionModel for StepDown {
        fn enrollment(&self, program: &ProgramRecord, month_index: u32) -> f64 {
            (program.confirmed_enrollment as f64 - self.0 * (month_index - 1) as f64).max(0.0)
        }

        fn name(&self) -> &'static str {
            "step-down"
        }
    }

    #[test]
    fn custom_model_drives_the_curve() {
        let engine = RevenueEngine::with_model(
            Pricing::PerHeadMonth { unit_price: 100.0 },
            Box::new(StepDown(5.0)),
        );
        let program = ProgramRecord {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 6),
            end_date: NaiveDate::from_ymd_opt(2025, 4, 25),
            confirmed_enrollment: 12,
            ..Default::default()
        };

        assert_eq!(engine.model().name(), "step-down");
        let revenue: Vec<i64> = engine.curve(&program).iter().map(|p| p.revenue).collect();
        assert_eq!(revenue, vec![1200, 700, 200, 0]);
    }
}
