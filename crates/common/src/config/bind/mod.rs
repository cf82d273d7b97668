pub mod http;

pub use crate::config::bind::http::HttpBindConfig;
use serde::{Deserialize, Serialize};

/// 网络绑定配置
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct BindConfig {
    /// HTTP 服务绑定配置
    #[serde(default)]
    pub http: HttpBindConfig,
}
