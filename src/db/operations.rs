use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::ResultRecord;
use crate::storage::ExternalResultStore;
use crate::types::AppResult;

/// PostgreSQL-backed result store.
///
/// Each result is written as a job row plus a result row in one transaction.
/// Inserts ignore existing ids so replaying a record is harmless.
pub struct PgResultStore {
    pool: PgPool,
}

// Note: runtime query_as (no DATABASE_URL needed at compile time)
#[derive(Debug, sqlx::FromRow)]
struct ResultRow {
    id: String,
    job_type: String,
    payload: serde_json::Value,
    result: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<ResultRow> for ResultRecord {
    type Error = serde_json::Error;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        Ok(ResultRecord {
            id: row.id,
            job_type: row.job_type,
            payload: serde_json::from_value(row.payload)?,
            result: row.result,
            created_at: row.created_at,
        })
    }
}

const SELECT_RESULTS: &str = r#"
    SELECT j.id, j.type AS job_type, j.payload, r.result, r.created_at
    FROM analysis_jobs j
    JOIN analysis_results r ON r.job_id = j.id
"#;

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExternalResultStore for PgResultStore {
    async fn save(&self, record: &ResultRecord) -> AppResult<()> {
        let payload = serde_json::to_value(&record.payload)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO analysis_jobs (id, type, payload, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(&record.job_type)
        .bind(payload)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO analysis_results (job_id, result, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(&record.result)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<ResultRecord>> {
        let row = sqlx::query_as::<_, ResultRow>(&format!("{} WHERE j.id = $1", SELECT_RESULTS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(ResultRecord::try_from).transpose()?)
    }

    async fn list(&self, limit: usize) -> AppResult<Vec<ResultRecord>> {
        let rows = sqlx::query_as::<_, ResultRow>(&format!(
            "{} ORDER BY r.created_at DESC LIMIT $1",
            SELECT_RESULTS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .map(ResultRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
