use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use super::{StagingError, StagingRepository, StagingResult, StagingRow};
use crate::config::StagingConfig;

/// Name of the staging table for one account/table pair.
///
/// Characters outside `[A-Za-z0-9_]` become `_`.
pub fn staging_table_name(account: &str, table: &str) -> StagingResult<String> {
    if account.is_empty() || table.is_empty() {
        return Err(StagingError::InvalidTableName(format!("{account}_{table}")));
    }
    Ok(format!("{account}_{table}")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect())
}

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Connection pool for the staging database file shared by every target.
#[derive(Clone)]
pub struct StagingDatabase {
    pool: SqlitePool,
}

impl StagingDatabase {
    pub async fn open(config: &StagingConfig) -> StagingResult<Self> {
        if config.create_if_missing
            && let Some(parent) = Path::new(&config.path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StagingError::Io(e, parent.to_path_buf()))?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&config.path)
                    .create_if_missing(config.create_if_missing)
                    .journal_mode(if config.wal_mode {
                        SqliteJournalMode::Wal
                    } else {
                        SqliteJournalMode::Delete
                    })
                    .busy_timeout(Duration::from_millis(config.busy_timeout_ms)),
            )
            .await?;

        tracing::debug!(path = %config.path, "Opened staging database");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (and create if missing) the staging table for a target.
    pub async fn repository(
        &self,
        account: &str,
        table: &str,
    ) -> StagingResult<Arc<dyn StagingRepository>> {
        let name = staging_table_name(account, table)?;
        let repo = SqliteStagingRepo::open(self.pool.clone(), name).await?;
        Ok(Arc::new(repo))
    }

    /// Number of identifiers staged for a target, or `None` when it has no table.
    pub async fn staged_rows(&self, account: &str, table: &str) -> StagingResult<Option<u64>> {
        let name = staging_table_name(account, table)?;
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(&name)
        .fetch_one(&self.pool)
        .await?;
        if exists == 0 {
            return Ok(None);
        }

        let count: i64 = sqlx::query_scalar(&format!(r#"SELECT COUNT(*) FROM "{name}""#))
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(count.max(0) as u64))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Staging buffer for one target, stored as a SQLite table.
pub struct SqliteStagingRepo {
    pool: SqlitePool,
    table: String,
}

impl SqliteStagingRepo {
    /// Open the table `name`, creating it when it does not exist yet.
    pub async fn open(pool: SqlitePool, name: impl Into<String>) -> StagingResult<Self> {
        let table = name.into();
        if !is_valid_identifier(&table) {
            return Err(StagingError::InvalidTableName(table));
        }

        let repo = Self { pool, table };
        repo.create_table().await?;
        Ok(repo)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn create_table(&self) -> StagingResult<()> {
        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}" (
                partition_key TEXT NOT NULL,
                row_key TEXT NOT NULL,
                PRIMARY KEY (partition_key, row_key)
            )
            "#,
            self.table
        );
        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StagingRepository for SqliteStagingRepo {
    async fn has_rows(&self) -> StagingResult<bool> {
        let query = format!(r#"SELECT EXISTS (SELECT 1 FROM "{}")"#, self.table);
        let exists: i64 = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        Ok(exists != 0)
    }

    async fn count_rows(&self) -> StagingResult<u64> {
        let query = format!(r#"SELECT COUNT(*) FROM "{}""#, self.table);
        let count: i64 = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn get_rows(&self, limit: usize) -> StagingResult<Vec<StagingRow>> {
        let query = format!(
            r#"
            SELECT partition_key, row_key
            FROM "{}"
            ORDER BY partition_key
            LIMIT ?
            "#,
            self.table
        );

        let rows = sqlx::query_as::<_, (String, String)>(&query)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(partition_key, row_key)| StagingRow {
                partition_key,
                row_key,
            })
            .collect())
    }

    async fn insert(&self, rows: &[StagingRow]) -> StagingResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let query = format!(
            r#"INSERT OR IGNORE INTO "{}" (partition_key, row_key) VALUES (?, ?)"#,
            self.table
        );
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(&query)
                .bind(&row.partition_key)
                .bind(&row.row_key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, rows: &[StagingRow]) -> StagingResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let query = format!(
            r#"DELETE FROM "{}" WHERE partition_key = ? AND row_key = ?"#,
            self.table
        );
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(&query)
                .bind(&row.partition_key)
                .bind(&row.row_key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn drop_table(&self) -> StagingResult<()> {
        let query = format!(r#"DROP TABLE IF EXISTS "{}""#, self.table);
        sqlx::query(&query).execute(&self.pool).await?;
        tracing::debug!(table = %self.table, "Dropped staging table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    fn rows(partition_key: &str, count: usize) -> Vec<StagingRow> {
        (0..count)
            .map(|i| StagingRow::new(partition_key, format!("{i:03}")))
            .collect()
    }

    #[test]
    fn test_staging_table_name_sanitises() {
        assert_eq!(
            staging_table_name("acct", "Alerts").unwrap(),
            "acct_Alerts"
        );
        assert_eq!(
            staging_table_name("my-acct", "a\"b c").unwrap(),
            "my_acct_a_b_c"
        );
        assert!(matches!(
            staging_table_name("", "Alerts"),
            Err(StagingError::InvalidTableName(_))
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_unsafe_name() {
        let pool = memory_pool().await;
        let result = SqliteStagingRepo::open(pool, "x\"; DROP TABLE y; --").await;
        assert!(matches!(result, Err(StagingError::InvalidTableName(_))));
    }

    #[tokio::test]
    async fn test_insert_count_and_ignore_duplicates() {
        let repo = SqliteStagingRepo::open(memory_pool().await, "acct_Alerts")
            .await
            .unwrap();
        assert!(!repo.has_rows().await.unwrap());

        repo.insert(&rows("A", 10)).await.unwrap();
        repo.insert(&rows("A", 15)).await.unwrap();

        assert!(repo.has_rows().await.unwrap());
        assert_eq!(repo.count_rows().await.unwrap(), 15);
    }

    #[tokio::test]
    async fn test_get_rows_ordered_by_partition() {
        let repo = SqliteStagingRepo::open(memory_pool().await, "acct_Alerts")
            .await
            .unwrap();
        repo.insert(&rows("C", 2)).await.unwrap();
        repo.insert(&rows("A", 2)).await.unwrap();
        repo.insert(&rows("B", 2)).await.unwrap();

        let fetched = repo.get_rows(4).await.unwrap();
        assert_eq!(fetched.len(), 4);
        let partitions: Vec<_> = fetched.iter().map(|r| r.partition_key.as_str()).collect();
        assert_eq!(partitions, vec!["A", "A", "B", "B"]);

        assert_eq!(repo.get_rows(100).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_delete_removes_only_given_rows() {
        let repo = SqliteStagingRepo::open(memory_pool().await, "acct_Alerts")
            .await
            .unwrap();
        let staged = rows("A", 5);
        repo.insert(&staged).await.unwrap();

        let mut to_delete = staged[..3].to_vec();
        to_delete.push(StagingRow::new("Z", "missing"));
        repo.delete(&to_delete).await.unwrap();

        let remaining = repo.get_rows(10).await.unwrap();
        assert_eq!(remaining, staged[3..].to_vec());
    }

    #[tokio::test]
    async fn test_drop_table_is_idempotent() {
        let pool = memory_pool().await;
        let db = StagingDatabase::from_pool(pool.clone());
        let repo = SqliteStagingRepo::open(pool, "acct_Alerts").await.unwrap();
        repo.insert(&rows("A", 3)).await.unwrap();
        assert_eq!(db.staged_rows("acct", "Alerts").await.unwrap(), Some(3));

        repo.drop_table().await.unwrap();
        repo.drop_table().await.unwrap();
        assert_eq!(db.staged_rows("acct", "Alerts").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_staged_rows_does_not_create_table() {
        let db = StagingDatabase::from_pool(memory_pool().await);
        assert_eq!(db.staged_rows("acct", "Other").await.unwrap(), None);
        assert_eq!(db.staged_rows("acct", "Other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = StagingConfig {
            path: dir
                .path()
                .join("nested/staging.db")
                .to_string_lossy()
                .into_owned(),
            ..StagingConfig::default()
        };

        let db = StagingDatabase::open(&config).await.unwrap();
        let repo = db.repository("acct", "Alerts").await.unwrap();
        repo.insert(&rows("A", 7)).await.unwrap();
        db.close().await;

        let db = StagingDatabase::open(&config).await.unwrap();
        let repo = db.repository("acct", "Alerts").await.unwrap();
        assert_eq!(repo.count_rows().await.unwrap(), 7);
        db.close().await;
    }
}
