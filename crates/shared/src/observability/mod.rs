//! 统一可观测性模块
//!
//! 提供 metrics、tracing、logging 的统一初始化和管理。
//! 规则引擎的宿主通过单一入口点配置可观测性，确保一致的日志格式和指标命名。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识日志和指标的来源
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// 日志级别（如 "info", "debug"）
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 是否启用 JSON 格式日志
    #[serde(default)]
    pub json_logs: bool,

    /// 是否注册指标描述；指标是否导出取决于宿主安装的 recorder
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_service_name() -> String {
    "unknown-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            json_logs: false,
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ObservabilityConfig {
    /// 从环境变量加载配置
    pub fn from_env(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| default_log_level()),
            json_logs: std::env::var("JSON_LOGS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or_else(|_| default_metrics_enabled()),
        }
    }

    /// 注入服务名
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }
}

/// 统一初始化可观测性
///
/// 安装全局 tracing subscriber 并注册指标描述。
/// 指标的导出（Prometheus 等）由宿主自行安装 recorder，
/// 未安装 recorder 时所有指标记录均为空操作。
///
/// # Example
///
/// ```ignore
/// let config = ObservabilityConfig::from_env("my-site");
/// ruleflow_shared::observability::init(&config)?;
/// ```
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    tracing::init(config)?;

    if config.metrics_enabled {
        metrics::describe();
    }

    info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        metrics_enabled = config.metrics_enabled,
        "Observability initialized"
    );

    Ok(())
}
