//! 日志初始化模块
//!
//! 基于 tracing-subscriber 构建日志管道，支持环境变量覆盖日志级别，
//! 以及人类可读和 JSON 两种输出格式。

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::ObservabilityConfig;

/// 构建环境过滤器
///
/// 优先使用 RUST_LOG，其次使用配置中的日志级别，均无效时回退到 info。
pub fn build_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化 tracing
///
/// 全局 subscriber 只能安装一次，重复调用返回错误。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = build_filter(config);

    let fmt_layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_falls_back() {
        let config = ObservabilityConfig {
            log_level: "not a [valid] directive".to_string(),
            ..Default::default()
        };
        // 非法的日志级别不应该 panic
        let _ = build_filter(&config);
    }
}
