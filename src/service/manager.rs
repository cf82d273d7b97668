//! 服务管理器模块 - 负责合并 HTTP 路由并管理服务生命周期

use super::HttpRouterService;
use crate::service::trace::http_trace_layer;
use anyhow::{Context, Result};
use axum::Router;
use noncegate_common::config::GateConfig;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::{error, info};
use url::Url;

/// 服务管理器，负责管理多个 HTTP 路由服务的生命周期
#[derive(Debug)]
pub struct ServiceManager {
    services: Vec<Box<dyn HttpRouterService>>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
    config: GateConfig,
    local_addr: Option<SocketAddr>,
}

impl ServiceManager {
    /// 创建新的服务管理器
    pub fn new(config: GateConfig, shutdown_tx: tokio::sync::broadcast::Sender<()>) -> Self {
        Self {
            services: Vec::new(),
            shutdown_tx,
            config,
            local_addr: None,
        }
    }

    /// 添加服务到管理器
    pub fn add_service(&mut self, service: Box<dyn HttpRouterService>) {
        info!("Adding service '{}' to manager", service.info().name);
        self.services.push(service);
    }

    /// 实际监听的地址（启动后可用）
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 构建合并后的路由器
    ///
    /// 任一服务构建路由失败都会中止启动。
    pub async fn build_app(&mut self) -> Result<Router> {
        let mut app = Router::new();

        for service in &mut self.services {
            let route_prefix = service.route_prefix().to_string();
            let service_name = service.info().name.clone();

            let router = service
                .build_router()
                .await
                .with_context(|| format!("Failed to build router for service '{service_name}'"))?;

            info!(
                "Adding route '{}' for service '{}'",
                route_prefix, service_name
            );
            app = if route_prefix.is_empty() || route_prefix == "/" {
                app.merge(router)
            } else {
                app.nest(&route_prefix, router)
            };
        }

        info!("Adding /metrics endpoint for Prometheus");
        app = app
            .route("/metrics", axum::routing::get(metrics_handler))
            .layer(http_trace_layer());

        Ok(app)
    }

    /// 启动 HTTP 服务器
    ///
    /// 返回服务器任务句柄；收到关闭信号后优雅退出。
    pub async fn start_all(&mut self) -> Result<JoinHandle<()>> {
        info!(
            "Starting HTTP server with {} route services (environment: {})",
            self.services.len(),
            self.config.env
        );

        let app = self.build_app().await?;

        let bind_addr = self.config.bind.http.bind_addr();
        let addr: SocketAddr = bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address '{bind_addr}'"))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to address '{addr}'"))?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        info!("HTTP server listening on {}", local_addr);

        let public_url = Url::parse(&format!(
            "http://{}:{}",
            self.config.bind.http.domain_name,
            local_addr.port()
        ))
        .context("Failed to parse HTTP URL")?;
        for service in &mut self.services {
            if let Err(e) = service.on_start(public_url.clone()).await {
                error!("Failed to start service '{}': {:?}", service.info().name, e);
                service.info_mut().set_error(e.to_string());
            }
        }
        if !self.services.iter().any(|service| service.info().is_running()) {
            anyhow::bail!("No HTTP route service started successfully");
        }

        // 在启动任务前订阅，避免错过紧随其后的关闭信号
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let shutdown_tx = self.shutdown_tx.clone();
        let handle = tokio::spawn(async move {
            let server = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server received shutdown signal");
            });
            if let Err(e) = server.await {
                error!("HTTP server error: {}", e);
                let _ = shutdown_tx.send(());
            }
            info!("HTTP server stopped");
        });

        Ok(handle)
    }

    /// Stop all services
    pub async fn stop_all(&mut self) -> Result<()> {
        info!("Stopping all services");

        let _ = self.shutdown_tx.send(());
        for service in &mut self.services {
            service.on_stop().await?;
        }

        info!("All services stopped");
        Ok(())
    }
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> String {
    noncegate_common::metrics::export_metrics()
}
