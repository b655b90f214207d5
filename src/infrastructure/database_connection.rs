// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        let db_path = Path::new(db_path);
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Ensure the database file exists by creating it if necessary
        if !tokio::fs::try_exists(db_path).await.unwrap_or(false) {
            tokio::fs::File::create(db_path).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_orders_sql = r#"
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_name TEXT NOT NULL,
                office TEXT NOT NULL DEFAULT '',
                order_type TEXT NOT NULL DEFAULT '',
                order_no TEXT NOT NULL DEFAULT '',
                order_date TEXT,
                name_of_party TEXT NOT NULL DEFAULT '',
                ra_file_no TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                iec TEXT NOT NULL DEFAULT '',
                issued_by TEXT NOT NULL DEFAULT '',
                text_of_order TEXT NOT NULL DEFAULT '',
                attachment TEXT,
                pdf_name TEXT,
                pdf_path TEXT,
                scraped_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_run_log_sql = r#"
            CREATE TABLE IF NOT EXISTS run_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_name TEXT NOT NULL,
                script_status TEXT NOT NULL,
                data_available INTEGER,
                data_scraped INTEGER,
                total_record_count INTEGER,
                failure_reason TEXT,
                comments TEXT,
                source_status TEXT NOT NULL,
                newly_added_count INTEGER,
                deleted_source BOOLEAN NOT NULL DEFAULT 0,
                deleted_source_count INTEGER,
                removal_date DATE,
                run_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        // Natural key lookups; duplicates are tolerated, so the index is not unique
        let create_orders_key_index_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_orders_natural_key
            ON orders (source_name, order_type, order_no, name_of_party, ra_file_no)
        "#;

        let create_run_log_index_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_run_log_source ON run_log (source_name, run_at)
        "#;

        sqlx::query(create_orders_sql).execute(&self.pool).await?;
        sqlx::query(create_run_log_sql).execute(&self.pool).await?;
        sqlx::query(create_orders_key_index_sql).execute(&self.pool).await?;
        sqlx::query(create_run_log_index_sql).execute(&self.pool).await?;

        Ok(())
    }
}
