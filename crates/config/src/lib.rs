//! reward-config - 配置加载库

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

/// 环境变量前缀，嵌套字段使用 `__` 分隔（如 `STOCK_LEDGER_DATABASE__URL`）
pub const ENV_PREFIX: &str = "STOCK_LEDGER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    // 开发环境: 10, 生产环境: 50
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 50,
        _ => 10,
    }
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否输出 JSON 格式日志
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 库存账本配置
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// 是否强制门店范围过滤（空范围 = 无权限）
    #[serde(default = "default_enforce_store_scope")]
    pub enforce_store_scope: bool,
    /// 业务时区偏移，决定“自然日”的边界
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    /// 特殊出库列表默认条数
    #[serde(default = "default_case_list_limit")]
    pub case_list_limit: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enforce_store_scope: default_enforce_store_scope(),
            utc_offset: default_utc_offset(),
            case_list_limit: default_case_list_limit(),
        }
    }
}

fn default_enforce_store_scope() -> bool {
    true
}

fn default_utc_offset() -> String {
    "+07:00".to_string()
}

fn default_case_list_limit() -> u32 {
    20
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(config_dir).extract()?;
        Ok(config)
    }

    /// 配置来源：default.toml < {APP_ENV}.toml < 环境变量
    pub fn figment(config_dir: &str) -> Figment {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}

#[cfg(test)]
mod tests;
