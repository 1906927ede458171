use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::ScoredParameter;
use crate::trends::Observation;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Stores one scoring run and all of its rows atomically.
pub async fn record_run(
    pool: &PgPool,
    site_id: &str,
    recorded_on: NaiveDate,
    source: &str,
    scored: &[ScoredParameter],
) -> anyhow::Result<Uuid> {
    let run_id = Uuid::new_v4();
    let mut tx = pool.begin().await.context("failed to open transaction")?;

    sqlx::query(
        r#"
        INSERT INTO envrisk.scoring_runs (id, site_id, recorded_on, source)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(run_id)
    .bind(site_id)
    .bind(recorded_on)
    .bind(source)
    .execute(&mut *tx)
    .await
    .context("failed to insert scoring run")?;

    for row in scored {
        sqlx::query(
            r#"
            INSERT INTO envrisk.scored_readings
            (id, run_id, parameter, canonical_name, value_raw, numeric_value, unit, score, status, category)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(run_id)
        .bind(&row.reading.parameter_name)
        .bind(&row.canonical_name)
        .bind(&row.reading.value_raw)
        .bind(row.numeric_value)
        .bind(&row.reading.unit)
        .bind(i16::from(row.score.value()))
        .bind(&row.status)
        .bind(row.category().label())
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert reading {}", row.reading.parameter_name))?;
    }

    tx.commit().await.context("failed to commit scoring run")?;
    Ok(run_id)
}

/// Numeric history of a site since `since_date`, oldest first.
pub async fn fetch_observations(
    pool: &PgPool,
    site_id: &str,
    since_date: NaiveDate,
) -> anyhow::Result<Vec<Observation>> {
    let records = sqlx::query(
        r#"
        SELECT r.recorded_on, sr.canonical_name, sr.numeric_value
        FROM envrisk.scored_readings sr
        JOIN envrisk.scoring_runs r ON r.id = sr.run_id
        WHERE r.site_id = $1
          AND r.recorded_on >= $2
          AND sr.numeric_value IS NOT NULL
        ORDER BY r.recorded_on, sr.canonical_name
        "#,
    )
    .bind(site_id)
    .bind(since_date)
    .fetch_all(pool)
    .await
    .context("failed to load monitoring history")?;

    let mut observations = Vec::with_capacity(records.len());
    for row in records {
        observations.push(Observation {
            recorded_on: row.get("recorded_on"),
            parameter: row.get("canonical_name"),
            value: row.get("numeric_value"),
        });
    }

    Ok(observations)
}
