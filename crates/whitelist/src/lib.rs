//! Whitelist - 基于时间窗口的地址白名单与 nonce 查询服务
//!
//! 提供以下功能：
//! 1. 白名单存储：地址大小写不敏感、首写生效、按有效期判断（SQLite）
//! 2. 从表格导出的 CSV 批量导入白名单记录
//! 3. `eth_getTransactionCount` JSON-RPC 网关：有效地址返回存储的 nonce，否则返回 `0x0`

pub mod config;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod service;
pub mod storage;
pub mod types;

// Re-export commonly used items
pub use config::WhitelistServiceConfig;
pub use error::{WhitelistError, WhitelistResult};
pub use handlers::{GatewayState, create_gateway_state, create_router};
pub use ingest::{IngestReport, RecordIngester};
pub use metrics::register_whitelist_metrics;
pub use service::NonceLookupService;
pub use storage::{
    OpenMode, SqliteBackend, WhitelistBackend, WhitelistStore, create_store, open_existing_store,
};
pub use types::{NonceResult, RpcResponse, WhitelistEntry};
