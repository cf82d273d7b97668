//! SQLite 存储后端实现
//!
//! 使用 sqlx 提供原生异步 SQLite 存储支持

use crate::error::{WhitelistError, WhitelistResult};
use crate::storage::backend::WhitelistBackend;
use crate::types::WhitelistEntry;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, trace};

/// 白名单表名
pub const TABLE_NAME: &str = "whitelist";

/// 数据库打开方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// 文件不存在时创建（create-db / import-csv）
    CreateIfMissing,
    /// 只打开已有文件（run），文件不存在视为表结构缺失
    ExistingOnly,
}

/// SQLite 存储后端
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl SqliteBackend {
    /// 打开 SQLite 数据库
    ///
    /// # Arguments
    /// * `path` - 数据库文件路径
    /// * `mode` - 打开方式
    /// * `max_connections` - 连接池最大连接数
    pub async fn open(path: &Path, mode: OpenMode, max_connections: u32) -> WhitelistResult<Self> {
        if mode == OpenMode::ExistingOnly && !path.is_file() {
            return Err(WhitelistError::SchemaMissing(path.display().to_string()));
        }

        // 创建连接选项并启用 WAL 模式
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(mode == OpenMode::CreateIfMissing)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // 创建连接池，每个请求按需借用连接
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| {
                WhitelistError::Internal(format!(
                    "Failed to connect to SQLite at {}: {e}",
                    path.display()
                ))
            })?;

        info!(
            "SQLite whitelist store opened: path={}, mode={:?}, max_connections={}",
            path.display(),
            mode,
            max_connections
        );

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl WhitelistBackend for SqliteBackend {
    async fn ensure_schema(&self) -> WhitelistResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS whitelist (
                address TEXT PRIMARY KEY COLLATE NOCASE,
                nonce TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| WhitelistError::Internal(format!("Failed to create whitelist table: {e}")))?;

        debug!("Whitelist table initialized");
        Ok(())
    }

    async fn schema_exists(&self) -> WhitelistResult<bool> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        )
        .bind(TABLE_NAME)
        .fetch_one(&self.pool)
        .await?;

        Ok(count == 1)
    }

    async fn insert_if_absent(&self, entry: &WhitelistEntry) -> WhitelistResult<bool> {
        // 单条语句完成“检查 + 插入”，唯一性由 SQLite 保证。
        // 显式 COLLATE NOCASE 兼容没有列排序规则的旧表。
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO whitelist (address, nonce, start_time, end_time)
               SELECT ?1, ?2, ?3, ?4
               WHERE NOT EXISTS (
                   SELECT 1 FROM whitelist WHERE address = ?1 COLLATE NOCASE
               )"#,
        )
        .bind(&entry.address)
        .bind(&entry.nonce)
        .bind(&entry.start_time)
        .bind(&entry.end_time)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;
        if inserted {
            debug!("Inserted whitelist entry for {}", entry.address);
        } else {
            debug!("Whitelist entry for {} already exists, skipped", entry.address);
        }

        Ok(inserted)
    }

    async fn get_entry(&self, address: &str) -> WhitelistResult<Option<WhitelistEntry>> {
        let row = sqlx::query_as::<_, (String, String, String, String)>(
            r#"SELECT address, nonce, start_time, end_time
               FROM whitelist
               WHERE address = ?1 COLLATE NOCASE
               ORDER BY rowid
               LIMIT 1"#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((address, nonce, start_time, end_time)) => {
                trace!("Whitelist entry found for {}", address);
                Ok(Some(WhitelistEntry {
                    address,
                    nonce,
                    start_time,
                    end_time,
                }))
            }
            None => {
                trace!("No whitelist entry for {}", address);
                Ok(None)
            }
        }
    }

    async fn entry_count(&self) -> WhitelistResult<u64> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM whitelist")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    fn backend_name(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_timestamp;
    use chrono::{DateTime, Utc};
    use tempfile::{TempDir, tempdir};

    fn ts(raw: &str) -> DateTime<Utc> {
        parse_timestamp(raw).unwrap()
    }

    fn addr(hex_byte: &str) -> String {
        format!("0x{}", hex_byte.repeat(20))
    }

    async fn create_test_backend() -> (SqliteBackend, TempDir) {
        let temp_dir = tempdir().unwrap();
        let backend = SqliteBackend::open(
            &temp_dir.path().join("whitelist.sqlite"),
            OpenMode::CreateIfMissing,
            4,
        )
        .await
        .unwrap();
        backend.ensure_schema().await.unwrap();
        (backend, temp_dir)
    }

    fn sample_entry(address: &str, nonce: &str) -> WhitelistEntry {
        WhitelistEntry::new(
            address,
            nonce,
            ts("2024-01-01T00:00:00Z"),
            ts("2024-01-02T00:00:00Z"),
        )
    }

    #[tokio::test]
    async fn test_schema_lifecycle() {
        let temp_dir = tempdir().unwrap();
        let backend = SqliteBackend::open(
            &temp_dir.path().join("whitelist.sqlite"),
            OpenMode::CreateIfMissing,
            2,
        )
        .await
        .unwrap();

        assert!(!backend.schema_exists().await.unwrap());
        backend.ensure_schema().await.unwrap();
        assert!(backend.schema_exists().await.unwrap());

        // 重复创建不报错
        backend.ensure_schema().await.unwrap();
        assert!(backend.schema_exists().await.unwrap());
        assert_eq!(backend.entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_existing_only_requires_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("missing.sqlite");

        let result = SqliteBackend::open(&path, OpenMode::ExistingOnly, 2).await;
        assert!(matches!(result, Err(WhitelistError::SchemaMissing(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let (backend, _temp_dir) = create_test_backend().await;
        let address = addr("aa");

        assert!(
            backend
                .insert_if_absent(&sample_entry(&address, "0x4000"))
                .await
                .unwrap()
        );

        let nonce = backend
            .lookup_valid_nonce(&address, ts("2024-01-01T12:00:00Z"))
            .await
            .unwrap();
        assert_eq!(nonce.as_deref(), Some("0x4000"));

        let nonce = backend
            .lookup_valid_nonce(&address, ts("2024-01-03T00:00:00Z"))
            .await
            .unwrap();
        assert_eq!(nonce, None);
    }

    #[tokio::test]
    async fn test_lookup_on_empty_store() {
        let (backend, _temp_dir) = create_test_backend().await;
        let nonce = backend
            .lookup_valid_nonce(&addr("11"), Utc::now())
            .await
            .unwrap();
        assert_eq!(nonce, None);
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_first_write_wins() {
        let (backend, _temp_dir) = create_test_backend().await;
        let address = addr("bb");

        assert!(
            backend
                .insert_if_absent(&sample_entry(&address, "0x4000"))
                .await
                .unwrap()
        );
        assert!(
            !backend
                .insert_if_absent(&sample_entry(&address, "0x4000"))
                .await
                .unwrap()
        );

        let later = WhitelistEntry::new(
            &address,
            "0x9999",
            ts("2030-01-01T00:00:00Z"),
            ts("2031-01-01T00:00:00Z"),
        );
        assert!(!backend.insert_if_absent(&later).await.unwrap());

        let stored = backend.get_entry(&address).await.unwrap().unwrap();
        assert_eq!(stored, sample_entry(&address, "0x4000"));
        assert_eq!(backend.entry_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_case_insensitive_match_and_uniqueness() {
        let (backend, _temp_dir) = create_test_backend().await;
        let upper = format!("0x{}", "AB".repeat(20));
        let lower = upper.to_lowercase();

        assert!(
            backend
                .insert_if_absent(&sample_entry(&upper, "0x4000"))
                .await
                .unwrap()
        );
        // 仅大小写不同的地址不能共存
        assert!(
            !backend
                .insert_if_absent(&sample_entry(&lower, "0x1"))
                .await
                .unwrap()
        );
        assert_eq!(backend.entry_count().await.unwrap(), 1);

        let at = ts("2024-01-01T12:00:00Z");
        let by_upper = backend.lookup_valid_nonce(&upper, at).await.unwrap();
        let by_lower = backend.lookup_valid_nonce(&lower, at).await.unwrap();
        assert_eq!(by_upper.as_deref(), Some("0x4000"));
        assert_eq!(by_upper, by_lower);

        // 地址按写入时的形式保存
        let stored = backend.get_entry(&lower).await.unwrap().unwrap();
        assert_eq!(stored.address, upper);
    }

    #[tokio::test]
    async fn test_wildcards_are_not_patterns() {
        let (backend, _temp_dir) = create_test_backend().await;
        backend
            .insert_if_absent(&sample_entry(&addr("cc"), "0x4000"))
            .await
            .unwrap();

        let at = ts("2024-01-01T12:00:00Z");
        for query in ["%", "0x%", "0x________________________________________", "' OR '1'='1"] {
            assert_eq!(
                backend.lookup_valid_nonce(query, at).await.unwrap(),
                None,
                "query {query:?} must not match"
            );
        }
    }

    #[tokio::test]
    async fn test_legacy_table_without_collation() {
        let (backend, _temp_dir) = create_test_backend().await;
        sqlx::query("DROP TABLE whitelist")
            .execute(&backend.pool)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE whitelist (address TEXT PRIMARY KEY, nonce TEXT NOT NULL, start_time TEXT NOT NULL, end_time TEXT NOT NULL)",
        )
        .execute(&backend.pool)
        .await
        .unwrap();
        assert!(backend.schema_exists().await.unwrap());

        let upper = format!("0x{}", "DE".repeat(20));
        assert!(
            backend
                .insert_if_absent(&sample_entry(&upper, "0x4000"))
                .await
                .unwrap()
        );
        assert!(
            !backend
                .insert_if_absent(&sample_entry(&upper.to_lowercase(), "0x1"))
                .await
                .unwrap()
        );

        let nonce = backend
            .lookup_valid_nonce(&upper.to_lowercase(), ts("2024-01-01T12:00:00Z"))
            .await
            .unwrap();
        assert_eq!(nonce.as_deref(), Some("0x4000"));
    }

    #[tokio::test]
    async fn test_legacy_case_variants_resolve_to_first_written() {
        let (backend, _temp_dir) = create_test_backend().await;
        sqlx::query("DROP TABLE whitelist")
            .execute(&backend.pool)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE whitelist (address TEXT PRIMARY KEY, nonce TEXT NOT NULL, start_time TEXT NOT NULL, end_time TEXT NOT NULL)",
        )
        .execute(&backend.pool)
        .await
        .unwrap();

        // 旧表可能已存在仅大小写不同的重复地址；按写入顺序插入小写在后的行
        let upper = format!("0x{}", "AB".repeat(20));
        let lower = upper.to_lowercase();
        for (address, nonce) in [(&upper, "0x4000"), (&lower, "0x1")] {
            sqlx::query(
                "INSERT INTO whitelist (address, nonce, start_time, end_time) VALUES (?1, ?2, '2024-01-01T00:00:00Z', '2024-01-02T00:00:00Z')",
            )
            .bind(address)
            .bind(nonce)
            .execute(&backend.pool)
            .await
            .unwrap();
        }

        for query in [&upper, &lower] {
            let entry = backend.get_entry(query).await.unwrap().unwrap();
            assert_eq!(entry.address, upper);
            assert_eq!(entry.nonce, "0x4000");
        }
    }

    #[tokio::test]
    async fn test_concurrent_inserts_keep_single_row() {
        let (backend, _temp_dir) = create_test_backend().await;
        let address = addr("ef");

        let mut handles = Vec::new();
        for i in 0..8 {
            let backend = backend.clone();
            let entry = sample_entry(&address, &format!("0x{i}"));
            handles.push(tokio::spawn(async move {
                backend.insert_if_absent(&entry).await.unwrap()
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(backend.entry_count().await.unwrap(), 1);
    }
}
