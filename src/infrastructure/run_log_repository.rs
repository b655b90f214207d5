//! Run log persistence: one row per sync run

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::domain::{RunLogEntry, RunLogSink, StoreError};

#[derive(Clone)]
pub struct SqlRunLog {
    pool: SqlitePool,
}

impl SqlRunLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunLogSink for SqlRunLog {
    async fn record_run(&self, entry: &RunLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO run_log
            (source_name, script_status, data_available, data_scraped, total_record_count,
             failure_reason, comments, source_status, newly_added_count, deleted_source,
             deleted_source_count, removal_date, run_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.source_name)
        .bind(entry.script_status.as_str())
        .bind(entry.data_available)
        .bind(entry.data_scraped)
        .bind(entry.total_record_count)
        .bind(&entry.failure_reason)
        .bind(&entry.comments)
        .bind(entry.source_status.as_str())
        .bind(entry.newly_added_count)
        .bind(entry.deleted_source)
        .bind(entry.deleted_source_count)
        .bind(entry.removal_date)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!("Run log written for {} ({})", entry.source_name, entry.script_status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RunContext, RunOutcome, SourceStatus};
    use crate::infrastructure::database_connection::DatabaseConnection;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn entry_round_trips_with_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("log.db").display());
        let db = DatabaseConnection::new(&url, 1).await.unwrap();
        db.migrate().await.unwrap();
        let sink = SqlRunLog::new(db.pool().clone());

        let date = NaiveDate::from_ymd_opt(2025, 4, 11).unwrap();
        let ctx = RunContext::new("ras_sez", SourceStatus::Active, date)
            .with_snapshot(3, 60)
            .with_reconciliation(0, 2);
        let entry = RunLogEntry::from_run(&RunOutcome::DeletionsOnly(2), &ctx, Some(58));
        sink.record_run(&entry).await.unwrap();

        let row: (String, String, Option<i64>, Option<i64>, bool, Option<NaiveDate>) = sqlx::query_as(
            "SELECT script_status, comments, data_scraped, deleted_source_count, deleted_source, removal_date FROM run_log",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();

        assert_eq!(row.0, "Success");
        assert_eq!(row.1, "2 data are deleted in the website");
        assert_eq!(row.2, None);
        assert_eq!(row.3, Some(2));
        assert!(row.4);
        assert_eq!(row.5, Some(date));
    }
}
