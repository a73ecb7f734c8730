//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

pub use crate::observability::ObservabilityConfig;

/// 规则引擎配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 未显式指定 order 的规则使用的默认排序值
    pub default_rule_order: i64,
    /// 相同告警消息的抑制窗口（秒），0 表示不抑制
    pub warning_rate_limit_seconds: u64,
    /// 是否在 debug 级别输出每个条件的评估结果
    pub trace_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_rule_order: 10,
            warning_rate_limit_seconds: 0,
            trace_enabled: false,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub engine: EngineConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（RULEFLOW_ 前缀，双下划线分隔层级，如 RULEFLOW_ENGINE__TRACE_ENABLED -> engine.trace_enabled）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("RULEFLOW_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(Path::new(&config_dir), service_name, &env)
    }

    /// 从指定目录加载配置
    pub fn load_from(
        config_dir: &Path,
        service_name: &str,
        env: &str,
    ) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .set_default("observability.service_name", service_name)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            .add_source(
                Environment::with_prefix("RULEFLOW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
