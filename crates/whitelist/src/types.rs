//! 白名单服务数据类型定义

use crate::error::{WhitelistError, WhitelistResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 唯一支持的 JSON-RPC 方法
pub const GET_TRANSACTION_COUNT: &str = "eth_getTransactionCount";

/// JSON-RPC 协议版本
pub const JSONRPC_VERSION: &str = "2.0";

/// 地址不在白名单或不在有效期内时返回的 nonce（即 hex(0)）
pub const ABSENT_NONCE: &str = "0x0";

/// 存储时间戳格式：UTC，秒精度，`Z` 后缀
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

static ADDRESS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap());

/// 检查地址是否为 `0x` + 40 位十六进制字符
pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_PATTERN.is_match(address)
}

/// 将 UTC 时间格式化为存储格式
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// 解析存储的时间戳
///
/// 标准格式为 `YYYY-MM-DDTHH:MM:SSZ`；不带时区后缀的旧数据按 UTC 处理。
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// 白名单记录（唯一的持久化实体）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    /// 地址（大小写不敏感的主键）
    pub address: String,
    /// 原样返回给调用方的 nonce
    pub nonce: String,
    /// 有效期开始（含）
    pub start_time: String,
    /// 有效期结束（含）
    pub end_time: String,
}

impl WhitelistEntry {
    pub fn new(
        address: impl Into<String>,
        nonce: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            address: address.into(),
            nonce: nonce.into(),
            start_time: format_timestamp(&start),
            end_time: format_timestamp(&end),
        }
    }

    /// 判断记录在 `as_of` 时刻是否有效
    ///
    /// 窗口两端均包含在内。时间无法解析或 start > end 的记录永远无效。
    pub fn is_valid_at(&self, as_of: DateTime<Utc>) -> bool {
        match (
            parse_timestamp(&self.start_time),
            parse_timestamp(&self.end_time),
        ) {
            (Some(start), Some(end)) => start <= as_of && as_of <= end,
            _ => false,
        }
    }
}

/// nonce 查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonceResult {
    /// 地址在白名单内且处于有效期
    Valid(String),
    /// 无记录或已过期（两者对调用方不可区分）
    Absent,
}

impl NonceResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, NonceResult::Valid(_))
    }

    /// 转换为 JSON-RPC `result` 字段：存储的 nonce 原样返回，未命中返回 `0x0`
    pub fn into_rpc_result(self) -> String {
        match self {
            NonceResult::Valid(nonce) => nonce,
            NonceResult::Absent => ABSENT_NONCE.to_string(),
        }
    }
}

impl From<Option<String>> for NonceResult {
    fn from(nonce: Option<String>) -> Self {
        nonce.map_or(NonceResult::Absent, NonceResult::Valid)
    }
}

/// `eth_getTransactionCount` 请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionCountRequest {
    /// 查询地址
    pub address: String,
    /// 区块标签，仅为协议兼容而接收，不参与查询
    pub block_tag: Option<String>,
}

impl TransactionCountRequest {
    /// 从 HTTP 请求 body 解析
    ///
    /// - body 不是 JSON 对象 → `InvalidInput`
    /// - method 不是 `eth_getTransactionCount` → `InvalidRequestMethod`
    /// - params 缺失或地址为空 → `InvalidInput`
    pub fn from_body(body: &[u8]) -> WhitelistResult<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| WhitelistError::InvalidInput(format!("malformed JSON body: {e}")))?;

        let object = value
            .as_object()
            .ok_or_else(|| WhitelistError::InvalidInput("request must be a JSON object".into()))?;

        let method = object.get("method").and_then(Value::as_str).unwrap_or("");
        if method != GET_TRANSACTION_COUNT {
            return Err(WhitelistError::InvalidRequestMethod(method.to_string()));
        }

        let params = object
            .get("params")
            .and_then(Value::as_array)
            .ok_or_else(|| WhitelistError::InvalidInput("params must be an array".into()))?;

        let address = params
            .first()
            .and_then(Value::as_str)
            .filter(|address| !address.is_empty())
            .ok_or_else(|| WhitelistError::InvalidInput("address is required".into()))?;

        let block_tag = params.get(1).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            address: address.to_string(),
            block_tag,
        })
    }
}

/// JSON-RPC 成功响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: u64,
    pub result: String,
}

impl RpcResponse {
    pub fn new(result: String) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: 1,
            result,
        }
    }
}
