use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::calendar::Quarter;
use crate::filter::{FilterOptions, ProgramQuery, Snapshot};
use crate::ingest::{self, OverrideRow};
use crate::models::{parse_month_token, MonthOverride, MonthlyOverrides, ProgramRecord, ProgramStatus};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn to_db(value: u32, field: &str) -> anyhow::Result<i32> {
    i32::try_from(value).with_context(|| format!("{field} {value} does not fit the database column"))
}

fn from_db(row: &PgRow, column: &str) -> anyhow::Result<u32> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).with_context(|| format!("negative {column}: {value}"))
}

async fn upsert_program(pool: &PgPool, program: &ProgramRecord) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO training_dashboard.programs
        (id, name, code, round, year, quarter, category, status, start_date, end_date,
         training_hours, capacity, confirmed, completed, employed, dropouts, workers,
         employment_excluded, completion_excluded, satisfaction)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        ON CONFLICT (code, round) DO UPDATE
        SET name = EXCLUDED.name, year = EXCLUDED.year, quarter = EXCLUDED.quarter,
            category = EXCLUDED.category, status = EXCLUDED.status,
            start_date = EXCLUDED.start_date, end_date = EXCLUDED.end_date,
            training_hours = EXCLUDED.training_hours, capacity = EXCLUDED.capacity,
            confirmed = EXCLUDED.confirmed, completed = EXCLUDED.completed,
            employed = EXCLUDED.employed, dropouts = EXCLUDED.dropouts,
            workers = EXCLUDED.workers, employment_excluded = EXCLUDED.employment_excluded,
            completion_excluded = EXCLUDED.completion_excluded,
            satisfaction = EXCLUDED.satisfaction
        RETURNING id
        "#,
    )
    .bind(program.id)
    .bind(&program.name)
    .bind(&program.code)
    .bind(to_db(program.round, "round")?)
    .bind(program.year)
    .bind(program.quarter.map(|q| q.as_str()))
    .bind(program.category.as_deref())
    .bind(program.status.as_str())
    .bind(program.start_date)
    .bind(program.end_date)
    .bind(program.training_hours)
    .bind(to_db(program.capacity, "capacity")?)
    .bind(to_db(program.confirmed_enrollment, "confirmed")?)
    .bind(to_db(program.completed_count, "completed")?)
    .bind(to_db(program.employed_count, "employed")?)
    .bind(to_db(program.dropout_count, "dropouts")?)
    .bind(to_db(program.workers, "workers")?)
    .bind(to_db(program.employment_excluded, "employment_excluded")?)
    .bind(to_db(program.completion_excluded, "completion_excluded")?)
    .bind(program.satisfaction_score)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

async fn upsert_override(
    pool: &PgPool,
    program_id: Uuid,
    month_index: u32,
    value: MonthOverride,
) -> anyhow::Result<u64> {
    let enrollment = value
        .enrollment
        .map(|e| to_db(e, "enrollment"))
        .transpose()?;
    let result = sqlx::query(
        r#"
        INSERT INTO training_dashboard.monthly_overrides
        (program_id, month_index, enrollment, hours)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (program_id, month_index) DO UPDATE
        SET enrollment = COALESCE(EXCLUDED.enrollment, training_dashboard.monthly_overrides.enrollment),
            hours = COALESCE(EXCLUDED.hours, training_dashboard.monthly_overrides.hours)
        "#,
    )
    .bind(program_id)
    .bind(to_db(month_index, "month_index")?)
    .bind(enrollment)
    .bind(value.hours)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

fn seed_programs() -> anyhow::Result<Vec<ProgramRecord>> {
    let date = |y: i32, m: u32, d: u32| NaiveDate::from_ymd_opt(y, m, d).context("invalid date");

    let programs = vec![
        ProgramRecord {
            id: Uuid::parse_str("7b1e0c42-5a9d-4f36-9e21-0d84c6f3a915")?,
            name: "Cloud Native Backend".to_string(),
            code: "CNB".to_string(),
            round: 3,
            year: Some(2025),
            quarter: Some(Quarter::Q1),
            category: Some("Platform".to_string()),
            status: ProgramStatus::Closed,
            start_date: Some(date(2025, 1, 6)?),
            end_date: Some(date(2025, 6, 27)?),
            training_hours: 960.0,
            capacity: 30,
            confirmed_enrollment: 28,
            completed_count: 22,
            employed_count: 15,
            dropout_count: 6,
            workers: 1,
            satisfaction_score: Some(4.6),
            ..Default::default()
        },
        ProgramRecord {
            id: Uuid::parse_str("c4f28a90-13e7-4b5c-8d06-6a2f91e7b3d4")?,
            name: "Applied Data Engineering".to_string(),
            code: "ADE".to_string(),
            round: 1,
            year: Some(2025),
            quarter: Some(Quarter::Q2),
            category: Some("Data".to_string()),
            status: ProgramStatus::InProgress,
            start_date: Some(date(2025, 4, 14)?),
            end_date: Some(date(2025, 10, 31)?),
            training_hours: 840.0,
            capacity: 25,
            confirmed_enrollment: 25,
            completed_count: 20,
            dropout_count: 2,
            ..Default::default()
        },
        ProgramRecord {
            id: Uuid::parse_str("19d6e3b5-8c40-4a7f-b2e9-f05a37c8d162")?,
            name: "Product Design Sprint".to_string(),
            code: "PDS".to_string(),
            round: 2,
            year: Some(2025),
            quarter: Some(Quarter::Q3),
            category: Some("Design".to_string()),
            status: ProgramStatus::Planned,
            start_date: Some(date(2025, 9, 1)?),
            end_date: Some(date(2025, 9, 30)?),
            training_hours: 160.0,
            capacity: 20,
            confirmed_enrollment: 16,
            completed_count: 16,
            ..Default::default()
        },
    ];
    Ok(programs)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let programs = seed_programs()?;
    for program in &programs {
        upsert_program(pool, program).await?;
    }

    let overrides = [
        (programs[0].id, 4, MonthOverride { enrollment: Some(23), hours: Some(160.0) }),
        (programs[0].id, 5, MonthOverride { enrollment: Some(22), hours: None }),
        (programs[1].id, 2, MonthOverride { enrollment: Some(24), hours: Some(120.0) }),
    ];
    for (program_id, month_index, value) in overrides {
        upsert_override(pool, program_id, month_index, value).await?;
    }

    Ok(())
}

fn program_from_row(row: &PgRow) -> anyhow::Result<ProgramRecord> {
    let quarter: Option<String> = row.try_get("quarter")?;
    let status: String = row.try_get("status")?;

    let program = ProgramRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        round: from_db(row, "round")?,
        year: row.try_get("year")?,
        quarter: quarter.map(|q| q.parse()).transpose()?,
        category: row.try_get("category")?,
        status: status.parse()?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        training_hours: row.try_get("training_hours")?,
        capacity: from_db(row, "capacity")?,
        confirmed_enrollment: from_db(row, "confirmed")?,
        completed_count: from_db(row, "completed")?,
        employed_count: from_db(row, "employed")?,
        dropout_count: from_db(row, "dropouts")?,
        workers: from_db(row, "workers")?,
        employment_excluded: from_db(row, "employment_excluded")?,
        completion_excluded: from_db(row, "completion_excluded")?,
        satisfaction_score: row.try_get("satisfaction")?,
        overrides: MonthlyOverrides::new(),
    };
    program.validate()?;
    Ok(program)
}

/// Programs matching the query's year, quarter, category and status.
/// Name matching is left to [`ProgramQuery::apply`].
pub async fn fetch_programs(pool: &PgPool, query: &ProgramQuery) -> anyhow::Result<Vec<ProgramRecord>> {
    let query = query.clone().normalized();
    let mut sql = String::from("SELECT * FROM training_dashboard.programs WHERE TRUE");
    let mut position = 0;
    let mut next = || {
        position += 1;
        position
    };

    if query.year.is_some() {
        sql.push_str(&format!(" AND year = ${}", next()));
    }
    if query.quarter.is_some() {
        sql.push_str(&format!(" AND quarter = ${}", next()));
    }
    if query.category.is_some() {
        sql.push_str(&format!(" AND category = ${}", next()));
    }
    if query.status.is_some() {
        sql.push_str(&format!(" AND status = ${}", next()));
    }
    sql.push_str(" ORDER BY start_date NULLS LAST, id");

    let mut rows = sqlx::query(&sql);
    if let Some(year) = query.year {
        rows = rows.bind(year);
    }
    if let Some(quarter) = query.quarter {
        rows = rows.bind(quarter.as_str());
    }
    if let Some(category) = query.category.as_deref() {
        rows = rows.bind(category);
    }
    if let Some(status) = query.status {
        rows = rows.bind(status.as_str());
    }

    let records = rows.fetch_all(pool).await?;
    let mut programs = Vec::with_capacity(records.len());
    for row in &records {
        match program_from_row(row) {
            Ok(program) => programs.push(program),
            Err(err) => warn!(error = %err, "skipping unreadable program row"),
        }
    }

    Ok(programs)
}

pub async fn fetch_overrides(pool: &PgPool) -> anyhow::Result<Vec<OverrideRow>> {
    let records = sqlx::query(
        "SELECT program_id, month_index, enrollment, hours \
         FROM training_dashboard.monthly_overrides \
         ORDER BY program_id, month_index",
    )
    .fetch_all(pool)
    .await?;

    let mut overrides = Vec::with_capacity(records.len());
    for row in records {
        let month_index: i32 = row.get("month_index");
        let enrollment: Option<i32> = row.get("enrollment");
        overrides.push(OverrideRow {
            program_id: Some(row.get("program_id")),
            month: format!("{month_index}M"),
            enrollment: enrollment.map(i64::from),
            hours: row.get("hours"),
            ..Default::default()
        });
    }

    Ok(overrides)
}

pub async fn fetch_filter_options(pool: &PgPool) -> anyhow::Result<FilterOptions> {
    let years: Vec<i32> = sqlx::query_scalar(
        "SELECT DISTINCT year FROM training_dashboard.programs WHERE year IS NOT NULL ORDER BY year DESC",
    )
    .fetch_all(pool)
    .await?;
    let quarters: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT quarter FROM training_dashboard.programs WHERE quarter IS NOT NULL ORDER BY quarter",
    )
    .fetch_all(pool)
    .await?;
    let categories: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT category FROM training_dashboard.programs \
         WHERE category IS NOT NULL AND category <> '' ORDER BY category",
    )
    .fetch_all(pool)
    .await?;

    let quarters: Vec<Quarter> = quarters.iter().filter_map(|q| q.parse().ok()).collect();
    Ok(FilterOptions {
        years,
        quarters: if quarters.is_empty() {
            Quarter::ALL.to_vec()
        } else {
            quarters
        },
        categories,
    })
}

/// Fetches programs, overrides and filter options concurrently. A failed
/// fetch degrades to its default instead of failing the snapshot.
pub async fn load_snapshot(pool: &PgPool, query: &ProgramQuery) -> Snapshot {
    let (programs, overrides, options) = tokio::join!(
        fetch_programs(pool, query),
        fetch_overrides(pool),
        fetch_filter_options(pool),
    );

    Snapshot::assemble(programs, overrides, options)
}

pub async fn import_programs(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let programs = ingest::load_programs(csv_path)
        .with_context(|| format!("failed to read {}", csv_path.display()))?;

    for program in &programs {
        upsert_program(pool, program).await?;
    }
    info!(count = programs.len(), "imported programs");

    Ok(programs.len())
}

async fn find_program(pool: &PgPool, row: &OverrideRow) -> anyhow::Result<Option<ProgramRecord>> {
    let record = match (row.program_id, row.program_code.as_deref()) {
        (Some(id), _) => {
            sqlx::query("SELECT * FROM training_dashboard.programs WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?
        }
        (None, Some(code)) => {
            sqlx::query(
                "SELECT * FROM training_dashboard.programs \
                 WHERE code = $1 AND ($2::INTEGER IS NULL OR round = $2) \
                 ORDER BY round DESC LIMIT 1",
            )
            .bind(code.trim())
            .bind(row.round.map(|r| to_db(r, "round")).transpose()?)
            .fetch_optional(pool)
            .await?
        }
        (None, None) => None,
    };
    record.as_ref().map(program_from_row).transpose()
}

/// Imports override rows, validating each month token against the target
/// program's schedule before it is stored.
pub async fn import_overrides(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let rows = ingest::load_overrides(csv_path)
        .with_context(|| format!("failed to read {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for row in &rows {
        let Some(program) = find_program(pool, row).await? else {
            warn!(month = %row.month, "override names an unknown program, skipping");
            continue;
        };
        let value = MonthOverride {
            enrollment: match row.enrollment {
                Some(e) => Some(u32::try_from(e).context("negative override enrollment")?),
                None => None,
            },
            hours: row.hours,
        };

        let schedule = program.schedule();
        let placed = parse_month_token(&row.month).and_then(|index| {
            MonthlyOverrides::new()
                .place_index(schedule.as_ref(), index, value)
                .map(|_| index)
        });
        let month_index = match placed {
            Ok(index) => index,
            Err(err) => {
                warn!(program = %program.id, error = %err, "skipping override");
                continue;
            }
        };

        if upsert_override(pool, program.id, month_index, value).await? > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
