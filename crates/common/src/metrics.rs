//! Prometheus 监控指标模块
//!
//! 提供全局 Registry、进程级指标以及导出功能

use lazy_static::lazy_static;
use prometheus::{IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::Once;

static METRICS_INIT: Once = Once::new();

lazy_static! {
    /// 全局 Prometheus Registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// 构建信息，值恒为 1
    pub static ref BUILD_INFO: IntGaugeVec = IntGaugeVec::new(
        Opts::new("build_info", "Build information of the running binary")
            .namespace("noncegate"),
        &["version"]
    ).unwrap();

    /// 启动时白名单中的记录数
    pub static ref WHITELIST_ENTRIES: IntGauge = IntGauge::with_opts(
        Opts::new("whitelist_entries", "Number of whitelist entries at startup")
            .namespace("noncegate")
    ).unwrap();
}

/// 注册所有指标到全局 Registry
///
/// 可重复调用，只有第一次调用会真正注册。
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let mut result = Ok(());

    METRICS_INIT.call_once(|| {
        let register_result = (|| {
            REGISTRY.register(Box::new(BUILD_INFO.clone()))?;
            REGISTRY.register(Box::new(WHITELIST_ENTRIES.clone()))?;
            whitelist::register_whitelist_metrics(&REGISTRY)?;
            Ok::<(), prometheus::Error>(())
        })();

        if let Err(e) = register_result {
            result = Err(e);
        }
    });

    BUILD_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1);

    result
}

/// 导出 Prometheus 文本格式的指标
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_is_idempotent() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_export_metrics() {
        register_metrics().unwrap();

        WHITELIST_ENTRIES.set(42);
        whitelist::metrics::RPC_REQUESTS_TOTAL
            .with_label_values(&["200"])
            .inc();

        let output = export_metrics();
        assert!(
            output.contains("noncegate_whitelist_entries 42"),
            "Output should contain whitelist_entries metric. Output: {}",
            output
        );
        assert!(output.contains("noncegate_rpc_requests_total"));
        assert!(output.contains("noncegate_build_info"));
    }
}
