//! nonce-gate 通用基础设施
//!
//! 配置加载与校验、全局 Prometheus 指标

pub mod config;
pub mod metrics;

pub use config::GateConfig;
