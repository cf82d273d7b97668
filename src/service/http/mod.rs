//! HTTP服务模块
//!
//! 管理HTTP相关的服务

mod gateway;

pub use gateway::WhitelistHttpService;
