//! # nonce-gate
//!
//! 基于时间窗口白名单的 `eth_getTransactionCount` JSON-RPC 网关

pub mod service;

// Re-export commonly used types
pub use noncegate_common::config::GateConfig;
pub use service::{ServiceManager, WhitelistHttpService};
