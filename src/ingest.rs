//! CSV ingestion of program records and monthly overrides.
//!
//! Rows that fail validation are logged and skipped so one bad line never
//! hides the rest of a file.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::calendar::{parse_date, Quarter, YearMonth};
use crate::error::IngestError;
use crate::models::{MonthOverride, ProgramRecord, ProgramStatus};

/// One program as exported from the operations sheet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramRow {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub code: String,
    pub round: Option<u32>,
    pub year: Option<i32>,
    pub quarter: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub training_hours: Option<f64>,
    pub capacity: Option<i64>,
    pub confirmed: Option<i64>,
    pub completed: Option<i64>,
    pub employed: Option<i64>,
    pub dropouts: Option<i64>,
    pub workers: Option<i64>,
    pub employment_excluded: Option<i64>,
    pub completion_excluded: Option<i64>,
    pub satisfaction: Option<f64>,
}

/// One operator override, addressed either by program id or by code and
/// round. `month` is a `<n>M` token relative to the program's start.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverrideRow {
    pub program_id: Option<Uuid>,
    pub program_code: Option<String>,
    pub round: Option<u32>,
    pub month: String,
    pub enrollment: Option<i64>,
    pub hours: Option<f64>,
}

fn count(field: &'static str, value: Option<i64>) -> Result<u32, IngestError> {
    let value = value.unwrap_or(0);
    if value < 0 {
        return Err(IngestError::NegativeCount { field, value });
    }
    u32::try_from(value).map_err(|_| IngestError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn date(field: &'static str, raw: Option<&str>) -> Result<Option<chrono::NaiveDate>, IngestError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(text) => parse_date(text)
            .map(Some)
            .ok_or_else(|| IngestError::InvalidField {
                field,
                value: text.to_string(),
            }),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryFrom<ProgramRow> for ProgramRecord {
    type Error = IngestError;

    /// Year and quarter fall back to the start date when not supplied. The
    /// code is required since `(code, round)` identifies a program on import.
    fn try_from(row: ProgramRow) -> Result<Self, Self::Error> {
        let code = row.code.trim();
        if code.is_empty() {
            return Err(IngestError::MissingField("code"));
        }
        let code = code.to_string();
        let start_date = date("start_date", row.start_date.as_deref())?;
        let end_date = date("end_date", row.end_date.as_deref())?;
        let start_month = start_date.map(YearMonth::from_date);

        let quarter = match non_blank(row.quarter) {
            Some(raw) => Some(raw.parse::<Quarter>()?),
            None => start_month.map(|m| m.quarter()),
        };
        let status = match non_blank(row.status) {
            Some(raw) => raw.parse::<ProgramStatus>()?,
            None => ProgramStatus::default(),
        };
        let training_hours = row.training_hours.unwrap_or(0.0);
        if training_hours < 0.0 {
            return Err(IngestError::InvalidField {
                field: "training_hours",
                value: training_hours.to_string(),
            });
        }

        let record = ProgramRecord {
            id: row.id.unwrap_or_else(Uuid::new_v4),
            name: row.name.trim().to_string(),
            code,
            round: row.round.unwrap_or(0),
            year: row.year.or(start_month.map(|m| m.year())),
            quarter,
            category: non_blank(row.category),
            status,
            start_date,
            end_date,
            training_hours,
            capacity: count("capacity", row.capacity)?,
            confirmed_enrollment: count("confirmed", row.confirmed)?,
            completed_count: count("completed", row.completed)?,
            employed_count: count("employed", row.employed)?,
            dropout_count: count("dropouts", row.dropouts)?,
            workers: count("workers", row.workers)?,
            employment_excluded: count("employment_excluded", row.employment_excluded)?,
            completion_excluded: count("completion_excluded", row.completion_excluded)?,
            satisfaction_score: row.satisfaction,
            overrides: Default::default(),
        };
        record.validate()?;
        Ok(record)
    }
}

/// Parses program rows, skipping (and logging) any that fail.
pub fn read_programs<R: Read>(reader: R) -> Vec<ProgramRecord> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut programs = Vec::new();

    for (line, result) in csv_reader.deserialize::<ProgramRow>().enumerate() {
        let converted = result
            .map_err(IngestError::from)
            .and_then(ProgramRecord::try_from);
        match converted {
            Ok(program) => programs.push(program),
            Err(err) => warn!(row = line + 1, error = %err, "skipping program row"),
        }
    }

    programs
}

pub fn load_programs(path: &Path) -> Result<Vec<ProgramRecord>, IngestError> {
    let file = std::fs::File::open(path)?;
    Ok(read_programs(file))
}

pub fn read_overrides<R: Read>(reader: R) -> Vec<OverrideRow> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    csv_reader
        .deserialize::<OverrideRow>()
        .enumerate()
        .filter_map(|(line, result)| match result {
            Ok(row) => Some(row),
            Err(err) => {
                warn!(row = line + 1, error = %err, "skipping override row");
                None
            }
        })
        .collect()
}

pub fn load_overrides(path: &Path) -> Result<Vec<OverrideRow>, IngestError> {
    let file = std::fs::File::open(path)?;
    Ok(read_overrides(file))
}

fn resolve<'a>(programs: &'a mut [ProgramRecord], row: &OverrideRow) -> Option<&'a mut ProgramRecord> {
    if let Some(id) = row.program_id {
        return programs.iter_mut().find(|p| p.id == id);
    }
    let code = row.program_code.as_deref()?.trim();
    programs
        .iter_mut()
        .find(|p| p.code == code && row.round.map_or(true, |r| p.round == r))
}

fn override_value(row: &OverrideRow) -> Result<MonthOverride, IngestError> {
    let enrollment = match row.enrollment {
        Some(value) => Some(count("enrollment", Some(value))?),
        None => None,
    };
    Ok(MonthOverride {
        enrollment,
        hours: row.hours,
    })
}

fn apply_override(programs: &mut [ProgramRecord], row: &OverrideRow) -> Result<(), IngestError> {
    let program = resolve(programs, row).ok_or_else(|| {
        IngestError::UnknownProgram(
            row.program_id
                .map(|id| id.to_string())
                .or_else(|| row.program_code.clone())
                .unwrap_or_default(),
        )
    })?;
    let value = override_value(row)?;
    let schedule = program.schedule();
    program.overrides.place(schedule.as_ref(), &row.month, value)?;
    Ok(())
}

/// Attaches override rows to their programs, returning how many landed.
/// Rows naming unknown programs or invalid months are logged and skipped.
pub fn attach_overrides(programs: &mut [ProgramRecord], rows: &[OverrideRow]) -> usize {
    let mut applied = 0;
    for row in rows {
        match apply_override(programs, row) {
            Ok(()) => applied += 1,
            Err(err) => warn!(month = %row.month, error = %err, "skipping override"),
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAMS: &str = "\
id,name,code,round,year,quarter,category,status,start_date,end_date,training_hours,capacity,confirmed,completed,employed,dropouts,workers,employment_excluded,completion_excluded,satisfaction
5e8a2c17-6b3d-4f90-a1c4-72d9e0b6f358,Data Engineering,DE-01,3,2025,Q1,Data,closed,2025-01-06,2025-03-28,480,30,30,24,18,6,1,0,0,4.6
,Cloud Native,CN-02,1,,,Platform,in-progress,2025.04.07,2025.08.29,600,25,20,,,,,,,
,Broken Row,BR-01,1,2025,Q2,Data,planned,2025-04-01,2025-06-30,100,10,10,12,0,0,0,0,0,
";

    #[test]
    fn reads_valid_rows_and_skips_invalid_ones() {
        let programs = read_programs(PROGRAMS.as_bytes());
        assert_eq!(programs.len(), 2);

        let de = &programs[0];
        assert_eq!(de.status, ProgramStatus::Closed);
        assert_eq!(de.duration_months(), Some(3));
        assert_eq!(de.satisfaction_score, Some(4.6));

        let cn = &programs[1];
        assert_eq!(cn.year, Some(2025));
        assert_eq!(cn.quarter, Some(Quarter::Q2));
        assert_eq!(cn.completed_count, 0);
        assert_eq!(cn.satisfaction_score, None);
    }

    #[test]
    fn rows_without_a_code_are_rejected() {
        let csv = "\
name,code,round,start_date,end_date,confirmed
Alpha,,,2025-01-06,2025-02-28,10
Beta,  ,,2025-03-03,2025-04-30,12
Gamma,GM-01,,2025-03-03,2025-04-30,12
";
        let programs = read_programs(csv.as_bytes());
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].code, "GM-01");

        let row = ProgramRow {
            name: "Alpha".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ProgramRecord::try_from(row),
            Err(IngestError::MissingField("code"))
        ));
    }

    #[test]
    fn negative_counts_are_rejected() {
        let row = ProgramRow {
            name: "Negative".to_string(),
            code: "NG-01".to_string(),
            confirmed: Some(-3),
            ..Default::default()
        };
        assert!(matches!(
            ProgramRecord::try_from(row),
            Err(IngestError::NegativeCount { field: "confirmed", .. })
        ));
    }

    #[test]
    fn overrides_attach_by_id_or_code() {
        let mut programs = read_programs(PROGRAMS.as_bytes());
        let overrides = "\
program_id,program_code,round,month,enrollment,hours
5e8a2c17-6b3d-4f90-a1c4-72d9e0b6f358,,,2M,25,
,CN-02,1,5M,18,120
,CN-02,1,6M,18,
,XX-99,,1M,5,
5e8a2c17-6b3d-4f90-a1c4-72d9e0b6f358,,,month2,25,
";
        let rows = read_overrides(overrides.as_bytes());
        assert_eq!(attach_overrides(&mut programs, &rows), 2);

        let feb = YearMonth::new(2025, 2).unwrap();
        assert_eq!(programs[0].overrides.get(feb).and_then(|o| o.enrollment), Some(25));
        let aug = YearMonth::new(2025, 8).unwrap();
        assert_eq!(programs[1].overrides.get(aug).and_then(|o| o.hours), Some(120.0));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("programs.csv");
        std::fs::write(&path, PROGRAMS).unwrap();
        assert_eq!(load_programs(&path).unwrap().len(), 2);
        assert!(load_programs(&dir.path().join("missing.csv")).is_err());
    }
}
