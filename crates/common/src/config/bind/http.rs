use serde::{Deserialize, Serialize};

/// HTTP 服务绑定配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpBindConfig {
    /// 域名
    ///
    /// 仅用于启动日志中展示可访问的 URL。
    #[serde(default = "default_domain_name")]
    pub domain_name: String,

    /// 绑定 IP 地址
    ///
    /// 通常使用 "0.0.0.0" 监听所有接口。
    #[serde(default = "default_ip")]
    pub ip: String,

    /// 绑定端口
    ///
    /// JSON-RPC 网关监听的端口号，默认 8000。
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_domain_name() -> String {
    "localhost".to_string()
}

fn default_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for HttpBindConfig {
    fn default() -> Self {
        Self {
            domain_name: default_domain_name(),
            ip: default_ip(),
            port: default_port(),
        }
    }
}

impl HttpBindConfig {
    /// 绑定地址，形如 `0.0.0.0:8000`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
