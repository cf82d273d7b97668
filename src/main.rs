//! nonce-gate 主程序
//!
//! 基于时间窗口白名单的 `eth_getTransactionCount` JSON-RPC 网关，
//! 以及建库、CSV 导入等离线命令

mod cli;
mod error;
mod observability;
mod service;

use anyhow::Context;
use clap::Parser;
use noncegate_common::config::GateConfig;
use observability::init_observability;
use service::{ServiceManager, WhitelistHttpService};
use std::path::{Path, PathBuf};
use whitelist::{RecordIngester, create_gateway_state, create_store};

use tracing::{error, info, warn};

macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        println!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

use cli::{Cli, Commands};
use error::{Error, Result};

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test { config_file } => {
            let config_path = config_file.unwrap_or_else(|| cli.config.clone());
            ApplicationLauncher::test_config_file(&config_path)
        }
        command => {
            let config = ApplicationLauncher::load_config(&cli.config)?;

            // Create Tokio runtime（before running the application）
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            runtime.block_on(ApplicationLauncher::run_command(config, command))
        }
    }
}

impl ApplicationLauncher {
    /// Find config file with fallback locations
    ///
    /// 显式指定的文件必须存在；默认位置都找不到时返回 `None`（使用默认配置）。
    fn find_config_file(provided_path: &Path) -> Result<Option<PathBuf>> {
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                bootstrap_info!("Using provided config file: {:?}", provided_path);
                return Ok(Some(provided_path.to_path_buf()));
            } else {
                bootstrap_error!("Provided config file not found: {:?}", provided_path);
                return Err(Error::custom(format!(
                    "Config file not found: {provided_path:?}"
                )));
            }
        }

        let fallback_paths = [
            // 1. Current working directory
            PathBuf::from("config.toml"),
            // 2. System config directory
            PathBuf::from("/etc/nonce-gate/config.toml"),
        ];

        for path in &fallback_paths {
            if path.exists() {
                bootstrap_info!("Found config file: {:?}", path);
                return Ok(Some(path.clone()));
            }
        }

        bootstrap_info!("No config file found, using built-in defaults");
        Ok(None)
    }

    /// 加载并验证配置
    fn load_config(provided_path: &Path) -> Result<GateConfig> {
        let config = match Self::find_config_file(provided_path)? {
            Some(config_path) => match GateConfig::from_file(&config_path) {
                Ok(config) => config,
                Err(e) => {
                    bootstrap_error!("❌ 配置加载失败: {}", e);
                    return Err(Error::Config(e));
                }
            },
            None => GateConfig::default(),
        };

        if let Err(errors) = config.validate() {
            let mut has_critical_errors = false;
            for (i, err) in errors.iter().enumerate() {
                if err.starts_with("Warning:") {
                    bootstrap_info!("  {}. ⚠️  {}", i + 1, err);
                } else {
                    bootstrap_error!("  {}. ❌ {}", i + 1, err);
                    has_critical_errors = true;
                }
            }
            if has_critical_errors {
                return Err(Error::service_validation("配置验证失败，请修复上述错误"));
            }
        }

        Ok(config)
    }

    /// 测试配置文件是否有效
    fn test_config_file(config_path: &Path) -> Result<()> {
        // Initialize basic logging for test command
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();

        match GateConfig::from_file(config_path) {
            Ok(config) => {
                info!("✅ 配置文件解析成功: {:?}", config_path);

                match config.validate() {
                    Ok(()) => {
                        info!("✅ 配置验证通过");
                    }
                    Err(errors) => {
                        error!("❌ 配置验证发现问题:");
                        for (i, err) in errors.iter().enumerate() {
                            if err.starts_with("Warning:") {
                                info!("  {}. ⚠️  {}", i + 1, err);
                            } else {
                                error!("  {}. ❌ {}", i + 1, err);
                            }
                        }
                        let has_errors = errors.iter().any(|e| !e.starts_with("Warning:"));
                        if has_errors {
                            return Err(Error::service_validation("配置验证失败"));
                        }
                    }
                }

                info!("✅ 完整配置验证通过");
                Ok(())
            }
            Err(e) => {
                error!("❌ 配置文件解析失败: {}", e);
                Err(Error::service_validation(format!("配置解析失败: {e}")))
            }
        }
    }

    /// 按子命令分发
    async fn run_command(mut config: GateConfig, command: Commands) -> Result<()> {
        match command {
            Commands::Run {
                port,
                db_path,
                create_db,
            } => {
                if let Some(port) = port {
                    config.bind.http.port = port;
                }
                if let Some(db_path) = db_path {
                    config.db_path = db_path;
                }
                let _observability_guard = init_observability(&config)?;
                Self::run_gateway(config, create_db).await
            }
            Commands::CreateDb { db_path } => {
                if let Some(db_path) = db_path {
                    config.db_path = db_path;
                }
                let _observability_guard = init_observability(&config)?;
                Self::create_database(&config).await
            }
            Commands::ImportCsv {
                csv_file,
                db_path,
                nonce,
                utc_offset_minutes,
            } => {
                if let Some(db_path) = db_path {
                    config.db_path = db_path;
                }
                if let Some(nonce) = nonce {
                    config.whitelist.default_nonce = nonce;
                }
                if let Some(offset) = utc_offset_minutes {
                    config.whitelist.source_utc_offset_minutes = offset;
                }
                let _observability_guard = init_observability(&config)?;
                Self::import_csv(&config, &csv_file).await
            }
            Commands::Test { .. } => {
                unreachable!("test command is handled before the runtime starts")
            }
        }
    }

    /// 确保数据库所在目录存在
    fn ensure_db_dir(db_path: &Path) -> Result<()> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
        Ok(())
    }

    /// create-db：创建数据库文件与表结构
    async fn create_database(config: &GateConfig) -> Result<()> {
        Self::ensure_db_dir(&config.db_path)?;
        let store = create_store(&config.db_path, config.whitelist.max_connections).await?;
        let entries = store.entry_count().await?;

        info!("Whitelist schema ready at {}", config.db_path.display());
        bootstrap_info!(
            "✅ Database ready: {} ({} entries)",
            config.db_path.display(),
            entries
        );
        Ok(())
    }

    /// import-csv：离线导入白名单
    async fn import_csv(config: &GateConfig, csv_file: &Path) -> Result<()> {
        if let Err(errors) = config.whitelist.validate() {
            for err in &errors {
                bootstrap_error!("  ❌ {}", err);
            }
            return Err(Error::service_validation("白名单导入参数无效"));
        }

        Self::ensure_db_dir(&config.db_path)?;
        let store = create_store(&config.db_path, config.whitelist.max_connections).await?;
        let ingester = RecordIngester::from_config(store, &config.whitelist)?;
        let report = ingester.ingest_path(csv_file).await?;

        bootstrap_info!(
            "✅ Import finished: rows={}, skipped={}, inserted={}, duplicates={}",
            report.rows_read,
            report.rows_skipped,
            report.inserted,
            report.duplicates
        );
        if report.rows_skipped > 0 {
            warn!(
                "{} rows were skipped, see warnings above for details",
                report.rows_skipped
            );
        }
        Ok(())
    }

    /// run：启动 JSON-RPC 网关
    async fn run_gateway(config: GateConfig, create_db: bool) -> Result<()> {
        info!("🚀 启动 nonce-gate");

        if create_db {
            Self::ensure_db_dir(&config.db_path)?;
            create_store(&config.db_path, config.whitelist.max_connections).await?;
            info!("✅ 数据库表结构已就绪");
        }

        // 表结构缺失时拒绝启动
        let state = match create_gateway_state(&config.whitelist, &config.db_path).await {
            Ok(state) => state,
            Err(e) => {
                let e = Error::from(e);
                bootstrap_error!("Error: {}", e);
                if e.is_schema_missing() {
                    bootstrap_error!(
                        "The database schema is incorrect. Use `create-db` or `run --create-db` to create a new database."
                    );
                }
                return Err(e);
            }
        };

        if let Err(e) = noncegate_common::metrics::register_metrics() {
            warn!(
                "Prometheus metrics registration warning (may already be registered): {}",
                e
            );
        }
        let entries = state.lookup.store().entry_count().await?;
        noncegate_common::metrics::WHITELIST_ENTRIES.set(entries as i64);

        // 初始化全局关闭通道
        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(10);
        setup_ctrl_c_handler(shutdown_tx.clone()).await;

        let mut service_manager = ServiceManager::new(config.clone(), shutdown_tx.clone());
        service_manager.add_service(Box::new(WhitelistHttpService::new(state)));

        let handle = service_manager
            .start_all()
            .await
            .map_err(|e| Error::service_startup(format!("{e:#}")))?;
        Self::display_service_info(&config, &service_manager, entries);

        handle.await?;
        service_manager.stop_all().await?;

        info!("🛑 所有服务已安全关闭");
        Ok(())
    }

    /// 显示服务信息
    fn display_service_info(config: &GateConfig, manager: &ServiceManager, entries: u64) {
        let port = manager
            .local_addr()
            .map_or(config.bind.http.port, |addr| addr.port());
        let http_url = format!("http://{}:{}", config.bind.http.domain_name, port);

        info!("✅ 所有服务已启动");
        info!("📡 HTTP 服务器监听在: {}", http_url);
        info!("🗄️  白名单数据库: {} ({} entries)", config.db_path.display(), entries);
        info!("🔧 可用的API端点:");
        info!("  - {}/ (POST eth_getTransactionCount)", http_url);
        info!("  - {}/health", http_url);
        info!("  - {}/metrics", http_url);
        bootstrap_info!("Starting server on port {}...", port);
    }
}

/// 设置Ctrl-C信号处理程序
async fn setup_ctrl_c_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听Ctrl-C信号: {}", e);
            return;
        }
        info!("收到Ctrl-C信号，开始优雅关闭...");
        let _ = shutdown_tx.send(());
    });
}
