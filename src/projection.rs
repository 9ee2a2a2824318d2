//! Enrollment projection strategies.
//!
//! A projection maps `(program, month_index)` to a modeled headcount. Curve
//! generation, reconciliation and aggregation only ever see the trait, so a
//! different attrition assumption can be swapped in through configuration.

use crate::config::{ModelKind, TerminalBasis};
use crate::models::ProgramRecord;

pub trait ProjectionModel: Send + Sync {
    /// Modeled enrollment for the 1-based `month_index`. Never negative.
    fn enrollment(&self, program: &ProgramRecord, month_index: u32) -> f64;

    fn name(&self) -> &'static str;
}

/// Headcount the curve trends toward by the final month, capped at the
/// confirmed enrollment so no model ever projects growth.
pub fn terminal_enrollment(program: &ProgramRecord, basis: TerminalBasis) -> f64 {
    let terminal = match basis {
        TerminalBasis::Completed => program.completed_count,
        TerminalBasis::Retained => program
            .confirmed_enrollment
            .saturating_sub(program.dropout_count),
    };
    terminal.min(program.confirmed_enrollment) as f64
}

pub fn model_for(kind: ModelKind, terminal: TerminalBasis) -> Box<dyn ProjectionModel> {
    match kind {
        ModelKind::Arithmetic => Box::new(ArithmeticDecline { terminal }),
        ModelKind::Geometric => Box::new(GeometricDecay { terminal }),
        ModelKind::Flat => Box::new(Flat),
    }
}

/// Total attrition spread evenly over the months after the first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticDecline {
    pub terminal: TerminalBasis,
}

impl ArithmeticDecline {
    /// Zero for single-month programs and programs without a schedule.
    pub fn decline_per_month(&self, program: &ProgramRecord) -> f64 {
        let duration = program.duration_months().unwrap_or(1);
        if duration <= 1 {
            return 0.0;
        }
        let attrition = program.confirmed_enrollment as f64 - terminal_enrollment(program, self.terminal);
        attrition / (duration - 1) as f64
    }
}

impl ProjectionModel for ArithmeticDecline {
    fn enrollment(&self, program: &ProgramRecord, month_index: u32) -> f64 {
        let steps = month_index.saturating_sub(1) as f64;
        let modeled = program.confirmed_enrollment as f64 - steps * self.decline_per_month(program);
        modeled.max(0.0)
    }

    fn name(&self) -> &'static str {
        "arithmetic"
    }
}

/// Constant-ratio decay from confirmed to terminal enrollment.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometricDecay {
    pub terminal: TerminalBasis,
}

impl GeometricDecay {
    pub fn monthly_ratio(&self, program: &ProgramRecord) -> f64 {
        let duration = program.duration_months().unwrap_or(1);
        let confirmed = program.confirmed_enrollment as f64;
        if duration <= 1 || confirmed <= 0.0 {
            return 1.0;
        }
        let retained = terminal_enrollment(program, self.terminal) / confirmed;
        retained.powf(1.0 / (duration - 1) as f64)
    }
}

impl ProjectionModel for GeometricDecay {
    fn enrollment(&self, program: &ProgramRecord, month_index: u32) -> f64 {
        let steps = month_index.saturating_sub(1) as i32;
        let modeled = program.confirmed_enrollment as f64 * self.monthly_ratio(program).powi(steps);
        modeled.max(0.0)
    }

    fn name(&self) -> &'static str {
        "geometric"
    }
}

/// No attrition: every month carries the confirmed enrollment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flat;

impl ProjectionModel for Flat {
    fn enrollment(&self, program: &ProgramRecord, _month_index: u32) -> f64 {
        program.confirmed_enrollment as f64
    }

    fn name(&self) -> &'static str {
        "flat"
    }
}
