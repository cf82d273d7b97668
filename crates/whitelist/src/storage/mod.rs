//! 白名单存储模块
//!
//! # 设计
//!
//! - `WhitelistBackend` trait 定义统一的异步接口
//! - `SqliteBackend` 为唯一实现，基于 sqlx 连接池
//! - 上层通过 `WhitelistStore`（共享 trait object）访问，每个请求从连接池借用连接

use std::path::Path;
use std::sync::Arc;

pub mod backend;
pub mod sqlite;

use crate::error::{WhitelistError, WhitelistResult};

pub use backend::WhitelistBackend;
pub use sqlite::{OpenMode, SqliteBackend, TABLE_NAME};

/// 共享的白名单存储句柄
pub type WhitelistStore = Arc<dyn WhitelistBackend>;

/// 打开已有数据库并确认表结构存在
///
/// 供服务启动使用：数据库文件不存在或缺少 whitelist 表时返回 `SchemaMissing`，
/// 不会创建任何东西。
pub async fn open_existing_store(path: &Path, max_connections: u32) -> WhitelistResult<WhitelistStore> {
    let backend = SqliteBackend::open(path, OpenMode::ExistingOnly, max_connections).await?;
    if !backend.schema_exists().await? {
        backend.close().await;
        return Err(WhitelistError::SchemaMissing(path.display().to_string()));
    }
    Ok(Arc::new(backend))
}

/// 打开（必要时创建）数据库并创建表结构
pub async fn create_store(path: &Path, max_connections: u32) -> WhitelistResult<WhitelistStore> {
    let backend = SqliteBackend::open(path, OpenMode::CreateIfMissing, max_connections).await?;
    backend.ensure_schema().await?;
    Ok(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_existing_store_without_file() {
        let temp_dir = tempdir().unwrap();
        let result = open_existing_store(&temp_dir.path().join("none.sqlite"), 2).await;
        assert!(matches!(result, Err(WhitelistError::SchemaMissing(_))));
    }

    #[tokio::test]
    async fn test_open_existing_store_without_table() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("empty.sqlite");

        // 只创建文件，不建表
        let backend = SqliteBackend::open(&path, OpenMode::CreateIfMissing, 1)
            .await
            .unwrap();
        backend.close().await;

        let result = open_existing_store(&path, 2).await;
        assert!(matches!(result, Err(WhitelistError::SchemaMissing(_))));
    }

    #[tokio::test]
    async fn test_create_then_open_existing() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("whitelist.sqlite");

        let store = create_store(&path, 2).await.unwrap();
        assert_eq!(store.backend_name(), "SQLite");
        drop(store);

        let store = open_existing_store(&path, 2).await.unwrap();
        assert!(store.schema_exists().await.unwrap());
        assert_eq!(store.entry_count().await.unwrap(), 0);
    }
}
