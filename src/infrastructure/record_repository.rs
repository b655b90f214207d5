//! SQLite-backed store of persisted order rows

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::domain::{NaturalKey, PersistedSet, Record, RecordStore, StoreError};

/// Record store scoped to one source; rows of other sources are invisible.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    source_name: String,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool, source_name: impl Into<String>) -> Self {
        Self {
            pool,
            source_name: source_name.into(),
        }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn all_known_keys(&self) -> Result<PersistedSet, StoreError> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT order_type, order_no, name_of_party, ra_file_no
            FROM orders
            WHERE source_name = ?
            "#,
        )
        .bind(&self.source_name)
        .fetch_all(&self.pool)
        .await?;

        let keys: PersistedSet = rows
            .into_iter()
            .map(|(order_type, order_no, party, ra_file_no)| {
                NaturalKey::new(order_type, order_no, party, ra_file_no)
            })
            .collect();
        debug!("Loaded {} persisted keys for {}", keys.len(), self.source_name);
        Ok(keys)
    }

    async fn append_records(&self, records: &[Record]) -> Result<u64, StoreError> {
        let scraped_at = Utc::now();
        // dropping the transaction without commit rolls everything back
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO orders
                (source_name, office, order_type, order_no, order_date, name_of_party, ra_file_no,
                 category, iec, issued_by, text_of_order, attachment, pdf_name, pdf_path, scraped_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&self.source_name)
            .bind(&record.office)
            .bind(&record.order_type)
            .bind(&record.order_no)
            .bind(&record.order_date)
            .bind(&record.name_of_party)
            .bind(&record.ra_file_no)
            .bind(&record.category)
            .bind(&record.iec)
            .bind(&record.issued_by)
            .bind(&record.text_of_order)
            .bind(&record.attachment_url)
            .bind(&record.pdf_name)
            .bind(&record.pdf_path)
            .bind(scraped_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Persisted {} records for {}", records.len(), self.source_name);
        Ok(records.len() as u64)
    }

    async fn row_count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE source_name = ?")
            .bind(&self.source_name)
            .fetch_one(&self.pool)
            .await?;
        u64::try_from(count).map_err(|_| StoreError::InvalidCount(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;

    async fn store(dir: &tempfile::TempDir, source: &str) -> SqliteRecordStore {
        let url = format!("sqlite:{}", dir.path().join("orders.db").display());
        let db = DatabaseConnection::new(&url, 1).await.unwrap();
        db.migrate().await.unwrap();
        SqliteRecordStore::new(db.pool().clone(), source)
    }

    fn record(order_no: &str) -> Record {
        Record {
            order_type: "Adjudication".into(),
            order_no: order_no.into(),
            name_of_party: "Acme".into(),
            ra_file_no: "RA-1".into(),
            pdf_path: Some("/pdf_download/x.pdf".into()),
            ..Record::default()
        }
    }

    #[tokio::test]
    async fn appended_keys_are_known_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, "ras_sez").await;
        assert!(store.all_known_keys().await.unwrap().is_empty());

        let written = store.append_records(&[record("1"), record("2")]).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.row_count().await.unwrap(), 2);

        let keys = store.all_known_keys().await.unwrap();
        assert!(keys.contains(&record("1").natural_key()));
        assert!(keys.contains(&record("2").natural_key()));
    }

    #[tokio::test]
    async fn sources_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let first = store(&dir, "first").await;
        first.append_records(&[record("1")]).await.unwrap();

        let second = SqliteRecordStore::new(first.pool.clone(), "second");
        assert_eq!(second.row_count().await.unwrap(), 0);
        assert!(second.all_known_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, "ras_sez").await;
        store.append_records(&[record("1")]).await.unwrap();

        sqlx::query("DROP TABLE orders").execute(&store.pool).await.unwrap();
        sqlx::query(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, source_name TEXT NOT NULL, office TEXT, order_type TEXT, \
             order_no TEXT UNIQUE, order_date TEXT, name_of_party TEXT, ra_file_no TEXT, category TEXT, iec TEXT, \
             issued_by TEXT, text_of_order TEXT, attachment TEXT, pdf_name TEXT, pdf_path TEXT, scraped_at DATETIME)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let result = store.append_records(&[record("7"), record("8"), record("7")]).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(store.row_count().await.unwrap(), 0);
    }
}
