//! 白名单服务 Prometheus 指标

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

lazy_static! {
    /// JSON-RPC 请求总数，按 HTTP 状态码分类
    pub static ref RPC_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("rpc_requests_total", "Total number of JSON-RPC requests")
            .namespace("noncegate"),
        &["status"]
    ).unwrap();

    pub static ref RPC_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("rpc_request_duration_seconds", "JSON-RPC request duration in seconds")
            .namespace("noncegate")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["status"]
    ).unwrap();

    /// nonce 查询结果（valid / absent）
    pub static ref NONCE_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nonce_lookups_total", "Total number of nonce lookups by outcome")
            .namespace("noncegate"),
        &["outcome"]
    ).unwrap();

    /// 导入行数（inserted / duplicate / skipped）
    pub static ref INGESTED_ROWS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ingested_rows_total", "Total number of ingested whitelist records by result")
            .namespace("noncegate"),
        &["result"]
    ).unwrap();
}

/// 注册白名单 metrics 到指定 registry
pub fn register_whitelist_metrics(registry: &prometheus::Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(RPC_REQUESTS_TOTAL.clone()))?;
    registry.register(Box::new(RPC_REQUEST_DURATION.clone()))?;
    registry.register(Box::new(NONCE_LOOKUPS_TOTAL.clone()))?;
    registry.register(Box::new(INGESTED_ROWS_TOTAL.clone()))?;
    Ok(())
}

/// 记录一次 RPC 请求
pub(crate) fn observe_rpc_request(status: u16, duration_secs: f64) {
    let status = status.to_string();
    RPC_REQUEST_DURATION
        .with_label_values(&[status.as_str()])
        .observe(duration_secs);
    RPC_REQUESTS_TOTAL
        .with_label_values(&[status.as_str()])
        .inc();
}
