//! 白名单 JSON-RPC 网关 HTTP 服务
//!
//! 将 `whitelist` crate 的网关路由挂载到根路径

use crate::service::{HttpRouterService, info::ServiceInfo};
use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use tracing::info;
use whitelist::{GatewayState, create_router};

/// 白名单网关 HTTP 服务实现
///
/// 网关状态（含已校验表结构的连接池）由调用方预先创建，
/// 表结构缺失的错误因此在启动阶段就能暴露。
pub struct WhitelistHttpService {
    info: ServiceInfo,
    state: GatewayState,
}

impl std::fmt::Debug for WhitelistHttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhitelistHttpService")
            .field("info", &self.info)
            .finish()
    }
}

impl WhitelistHttpService {
    pub fn new(state: GatewayState) -> Self {
        Self {
            info: ServiceInfo::new(
                "Whitelist Gateway",
                Some("eth_getTransactionCount - 基于时间窗口白名单的 nonce 查询".to_string()),
            ),
            state,
        }
    }
}

#[async_trait]
impl HttpRouterService for WhitelistHttpService {
    fn info(&self) -> &ServiceInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ServiceInfo {
        &mut self.info
    }

    async fn build_router(&mut self) -> Result<Router> {
        info!("Building whitelist gateway router");
        let router = create_router(self.state.clone());
        info!("Whitelist gateway router built successfully");
        Ok(router)
    }

    fn route_prefix(&self) -> &str {
        "/"
    }
}
