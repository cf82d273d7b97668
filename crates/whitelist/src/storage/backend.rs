//! 白名单存储后端抽象接口

use crate::error::WhitelistResult;
use crate::types::WhitelistEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 白名单存储后端抽象接口
///
/// 只负责一张扁平表：创建/检查表结构、首写生效的插入、按地址查询。
/// 地址比较一律大小写不敏感且为精确匹配。
#[async_trait]
pub trait WhitelistBackend: Send + Sync {
    /// 创建表（如不存在），可重复调用
    async fn ensure_schema(&self) -> WhitelistResult<()>;

    /// 检查表是否存在，不做任何创建
    async fn schema_exists(&self) -> WhitelistResult<bool>;

    /// 地址不存在时插入记录
    ///
    /// # Returns
    /// * `Ok(true)` - 已插入
    /// * `Ok(false)` - 地址（忽略大小写）已存在，未做任何修改
    async fn insert_if_absent(&self, entry: &WhitelistEntry) -> WhitelistResult<bool>;

    /// 按地址读取原始记录（不检查有效期）
    async fn get_entry(&self, address: &str) -> WhitelistResult<Option<WhitelistEntry>>;

    /// 查询地址在 `as_of` 时刻的有效 nonce
    ///
    /// 记录不存在与记录不在有效期内都返回 `Ok(None)`。
    async fn lookup_valid_nonce(
        &self,
        address: &str,
        as_of: DateTime<Utc>,
    ) -> WhitelistResult<Option<String>> {
        Ok(self
            .get_entry(address)
            .await?
            .filter(|entry| entry.is_valid_at(as_of))
            .map(|entry| entry.nonce))
    }

    /// 记录总数
    async fn entry_count(&self) -> WhitelistResult<u64>;

    /// 后端名称
    fn backend_name(&self) -> &'static str;
}
