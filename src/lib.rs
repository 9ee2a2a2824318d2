//! Revenue projection and outcome reporting for scheduled training programs.
//!
//! Each program's confirmed enrollment is projected month by month through
//! a [`projection::ProjectionModel`], priced, and reconciled against
//! operator overrides to give expected, actual and gap figures.

pub mod aggregate;
pub mod calendar;
pub mod config;
pub mod curve;
pub mod db;
pub mod engine;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod kpi;
pub mod models;
pub mod overview;
pub mod projection;
pub mod report;
pub mod revenue;

pub use calendar::{Quarter, YearMonth};
pub use config::{EngineConfig, Pricing};
pub use engine::RevenueEngine;
pub use error::{IngestError, OverrideError};
pub use models::{MonthOverride, MonthlyOverrides, ProgramId, ProgramRecord, ProgramStatus};
