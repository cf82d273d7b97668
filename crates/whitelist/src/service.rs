//! Nonce 查询服务
//!
//! 给定地址，返回当前有效的 nonce 或未命中哨兵值。无副作用。

use crate::error::{WhitelistError, WhitelistResult};
use crate::storage::WhitelistStore;
use crate::types::NonceResult;
use chrono::{DateTime, Utc};
use tracing::trace;

/// Nonce 查询服务
#[derive(Clone)]
pub struct NonceLookupService {
    store: WhitelistStore,
}

impl NonceLookupService {
    pub fn new(store: WhitelistStore) -> Self {
        Self { store }
    }

    /// 底层存储
    pub fn store(&self) -> &WhitelistStore {
        &self.store
    }

    /// 以当前 UTC 时间查询地址的 nonce
    pub async fn resolve(&self, address: &str) -> WhitelistResult<NonceResult> {
        self.resolve_at(address, Utc::now()).await
    }

    /// 以指定时间查询地址的 nonce
    ///
    /// 地址为空返回 `InvalidInput`，此时不访问存储。
    /// 记录不存在或不在有效期内都返回 `NonceResult::Absent`。
    pub async fn resolve_at(
        &self,
        address: &str,
        as_of: DateTime<Utc>,
    ) -> WhitelistResult<NonceResult> {
        if address.is_empty() {
            return Err(WhitelistError::InvalidInput("address is required".into()));
        }

        let result = NonceResult::from(self.store.lookup_valid_nonce(address, as_of).await?);
        trace!("Resolved nonce for {}: valid={}", address, result.is_valid());
        Ok(result)
    }
}
