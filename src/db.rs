use anyhow::Context;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::DailyRecord;
use crate::store::read_csv_rows;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Upserts every CSV row keyed on `(user_id, record_date)`. Returns the number
/// of rows written.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let rows = read_csv_rows(csv_path)?;
    let mut written = 0usize;

    for row in rows {
        let (user_id, record) = row.into_record();
        let result = sqlx::query(
            r#"
            INSERT INTO recovery_attribution.daily_records
            (id, user_id, record_date, recovery_value, sleep_duration,
             sleep_consistency, exercise_value, nutrition_value)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, record_date) DO UPDATE
            SET recovery_value = EXCLUDED.recovery_value,
                sleep_duration = EXCLUDED.sleep_duration,
                sleep_consistency = EXCLUDED.sleep_consistency,
                exercise_value = EXCLUDED.exercise_value,
                nutrition_value = EXCLUDED.nutrition_value
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user_id)
        .bind(record.date)
        .bind(record.recovery_value)
        .bind(record.sleep_duration)
        .bind(record.sleep_consistency)
        .bind(record.exercise_value)
        .bind(record.nutrition_value)
        .execute(pool)
        .await
        .with_context(|| format!("failed to upsert {} for {}", record.date, user_id))?;

        if result.rows_affected() > 0 {
            written += 1;
        }
    }

    Ok(written)
}

pub async fn fetch_records(pool: &PgPool, user_id: &str) -> anyhow::Result<Vec<DailyRecord>> {
    let rows = sqlx::query(
        "SELECT record_date, recovery_value, sleep_duration, sleep_consistency, \
         exercise_value, nutrition_value \
         FROM recovery_attribution.daily_records \
         WHERE user_id = $1 \
         ORDER BY record_date ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(DailyRecord {
            date: row.try_get("record_date")?,
            recovery_value: row.try_get("recovery_value")?,
            sleep_duration: row.try_get("sleep_duration")?,
            sleep_consistency: row.try_get("sleep_consistency")?,
            exercise_value: row.try_get("exercise_value")?,
            nutrition_value: row.try_get("nutrition_value")?,
        });
    }

    Ok(records)
}

pub async fn list_users(pool: &PgPool) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT DISTINCT user_id FROM recovery_attribution.daily_records ORDER BY user_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|row| row.get("user_id")).collect())
}
