//! 服务管理模块
//!
//! 提供 HTTP 路由服务的通用抽象与生命周期管理
//!
//! ## 核心概念
//!
//! - `HttpRouterService`: HTTP 路由服务的核心 trait，提供 axum 路由器
//! - `ServiceInfo`: 服务的基本信息
//! - `ServiceManager`: 服务管理器，合并路由并负责启动与优雅关闭

pub mod http;
pub mod info;
pub mod manager;
pub mod trace;

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use info::ServiceInfo;
use std::fmt::Debug;
use tracing::info;
use url::Url;

// 重新导出服务实现
pub use http::WhitelistHttpService;

// 重新导出核心组件
pub use info::ServiceStatus;
pub use manager::ServiceManager;

/// HTTP路由服务的核心 trait - 为 axum 提供路由器
#[async_trait]
pub trait HttpRouterService: Send + Sync + Debug {
    /// 获取服务信息
    fn info(&self) -> &ServiceInfo;

    /// 获取可变的服务信息
    fn info_mut(&mut self) -> &mut ServiceInfo;

    /// 构建axum路由器
    async fn build_router(&mut self) -> Result<Router>;

    /// 服务启动回调（路由器已构建并启动后调用）
    async fn on_start(&mut self, base_url: Url) -> Result<()> {
        self.info_mut().set_running(base_url);
        Ok(())
    }

    /// 服务停止回调
    async fn on_stop(&mut self) -> Result<()> {
        info!("HTTP router service '{}' stopped", self.info().name);
        self.info_mut().status = ServiceStatus::Unknown;
        Ok(())
    }

    /// 获取路由前缀，"/" 表示挂载在根路径
    fn route_prefix(&self) -> &str;
}
