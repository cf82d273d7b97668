//! 白名单服务配置
//!
//! 控制导入时的默认 nonce、源数据时区偏移以及连接池大小

use crate::error::{WhitelistError, WhitelistResult};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

/// 导入记录未提供 nonce 时使用的默认值
pub const DEFAULT_NONCE: &str = "0x4000";

fn default_nonce() -> String {
    DEFAULT_NONCE.to_string()
}

fn default_max_connections() -> u32 {
    10
}

/// 白名单服务配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WhitelistServiceConfig {
    /// 导入时写入的默认 nonce
    ///
    /// CSV 中没有 nonce 列（或该列为空）时使用此值。
    #[serde(default = "default_nonce")]
    pub default_nonce: String,

    /// 源数据的时区偏移（分钟）
    ///
    /// 表格中的时间是人工录入的本地时间，导入时按此偏移换算为 UTC。
    /// 例如 UTC+8 填 480，UTC-5 填 -300。
    #[serde(default)]
    pub source_utc_offset_minutes: i32,

    /// SQLite 连接池最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for WhitelistServiceConfig {
    fn default() -> Self {
        Self {
            default_nonce: default_nonce(),
            source_utc_offset_minutes: 0,
            max_connections: default_max_connections(),
        }
    }
}

impl WhitelistServiceConfig {
    /// 获取源数据时区偏移
    pub fn source_offset(&self) -> WhitelistResult<FixedOffset> {
        self.source_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                WhitelistError::Config(format!(
                    "source_utc_offset_minutes out of range: {}",
                    self.source_utc_offset_minutes
                ))
            })
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.default_nonce.trim().is_empty() {
            errors.push("whitelist.default_nonce cannot be empty".to_string());
        }

        if let Err(e) = self.source_offset() {
            errors.push(e.to_string());
        }

        if self.max_connections == 0 {
            errors.push("whitelist.max_connections must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
