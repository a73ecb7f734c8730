//! 内置动作
//!
//! HTTP 输出不在引擎内完成，响应类动作把效果写入上下文的 `response` 段，
//! 由宿主在执行结束后统一应用：
//!
//! - `set_header`: `response.headers.<name>`
//! - `redirect`: `response.redirect = {url, status}`
//! - `block`: `response.status` 与 `response.body`
//! - `cache`: `response.headers.cache-control`
//! - `set_context`: 任意路径
//! - `log`: 通过 tracing 输出

use super::{Action, ActionFactory};
use crate::comparator::{as_numeric, to_php_string};
use crate::context::ExecutionContext;
use crate::error::{Result, RuleError};
use crate::models::ActionDescriptor;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// 设置响应头
#[derive(Debug, Clone)]
pub struct SetHeaderAction {
    descriptor: ActionDescriptor,
    name: String,
    value: Value,
}

impl SetHeaderAction {
    pub fn new(descriptor: &ActionDescriptor) -> Result<Self> {
        let name = required_str(descriptor, "name")?.to_lowercase();
        let value = required_value(descriptor, "value")?.clone();
        Ok(Self {
            descriptor: descriptor.clone(),
            name,
            value,
        })
    }
}

impl Action for SetHeaderAction {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        let value = to_php_string(&ctx.resolve_value(&self.value));
        ctx.set(&format!("response.headers.{}", self.name), Value::String(value));
        Ok(())
    }
}

/// 重定向
#[derive(Debug, Clone)]
pub struct RedirectAction {
    descriptor: ActionDescriptor,
    url: String,
    status: u64,
}

impl RedirectAction {
    pub const DEFAULT_STATUS: u64 = 302;

    pub fn new(descriptor: &ActionDescriptor) -> Result<Self> {
        let url = required_str(descriptor, "url")?.to_string();
        let status = u64_option(descriptor, "status", Self::DEFAULT_STATUS)?;
        if !(300..400).contains(&status) {
            return Err(RuleError::ParseError(format!(
                "redirect.status 必须是 3xx 状态码，实际为 {}",
                status
            )));
        }

        Ok(Self {
            descriptor: descriptor.clone(),
            url,
            status,
        })
    }
}

impl Action for RedirectAction {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        let url = ctx.resolve(&self.url);
        ctx.set("response.redirect", json!({"url": url, "status": self.status}));
        Ok(())
    }
}

/// 拒绝请求
#[derive(Debug, Clone)]
pub struct BlockAction {
    descriptor: ActionDescriptor,
    status: u64,
    message: String,
}

impl BlockAction {
    pub const DEFAULT_STATUS: u64 = 403;
    pub const DEFAULT_MESSAGE: &'static str = "Forbidden";

    pub fn new(descriptor: &ActionDescriptor) -> Result<Self> {
        Ok(Self {
            descriptor: descriptor.clone(),
            status: u64_option(descriptor, "status", Self::DEFAULT_STATUS)?,
            message: descriptor
                .option_str("message")
                .unwrap_or(Self::DEFAULT_MESSAGE)
                .to_string(),
        })
    }
}

impl Action for BlockAction {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        ctx.set("response.status", json!(self.status));
        ctx.set("response.body", Value::String(ctx.resolve(&self.message)));
        Ok(())
    }
}

/// 缓存控制，`ttl` 为 0 时禁止缓存
#[derive(Debug, Clone)]
pub struct CacheAction {
    descriptor: ActionDescriptor,
    ttl: u64,
}

impl CacheAction {
    pub const DEFAULT_TTL: u64 = 3600;

    pub fn new(descriptor: &ActionDescriptor) -> Result<Self> {
        Ok(Self {
            descriptor: descriptor.clone(),
            ttl: u64_option(descriptor, "ttl", Self::DEFAULT_TTL)?,
        })
    }

    fn header_value(&self) -> String {
        if self.ttl == 0 {
            "no-store".to_string()
        } else {
            format!("public, max-age={}", self.ttl)
        }
    }
}

impl Action for CacheAction {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        ctx.set(
            "response.headers.cache-control",
            Value::String(self.header_value()),
        );
        Ok(())
    }
}

/// 写入上下文
#[derive(Debug, Clone)]
pub struct SetContextAction {
    descriptor: ActionDescriptor,
    path: String,
    value: Value,
}

impl SetContextAction {
    pub fn new(descriptor: &ActionDescriptor) -> Result<Self> {
        Ok(Self {
            descriptor: descriptor.clone(),
            path: required_str(descriptor, "path")?.to_string(),
            value: descriptor.option("value").cloned().unwrap_or(Value::Null),
        })
    }
}

impl Action for SetContextAction {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        let value = ctx.resolve_value(&self.value);
        ctx.set(&self.path, value);
        Ok(())
    }
}

/// 输出日志
#[derive(Debug, Clone)]
pub struct LogAction {
    descriptor: ActionDescriptor,
    message: String,
    level: String,
}

impl LogAction {
    pub fn new(descriptor: &ActionDescriptor) -> Result<Self> {
        Ok(Self {
            descriptor: descriptor.clone(),
            message: required_str(descriptor, "message")?.to_string(),
            level: descriptor
                .option_str("level")
                .unwrap_or("info")
                .to_lowercase(),
        })
    }
}

impl Action for LogAction {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        let message = ctx.resolve(&self.message);
        match self.level.as_str() {
            "error" => error!(target: "rule_engine::action", "{}", message),
            "warn" | "warning" => warn!(target: "rule_engine::action", "{}", message),
            "debug" => debug!(target: "rule_engine::action", "{}", message),
            "trace" => trace!(target: "rule_engine::action", "{}", message),
            _ => info!(target: "rule_engine::action", "{}", message),
        }
        Ok(())
    }
}

fn required_value<'a>(descriptor: &'a ActionDescriptor, key: &str) -> Result<&'a Value> {
    descriptor
        .option(key)
        .filter(|value| !value.is_null())
        .ok_or_else(|| RuleError::missing_field(descriptor.action_type.as_str(), key))
}

fn required_str<'a>(descriptor: &'a ActionDescriptor, key: &str) -> Result<&'a str> {
    descriptor
        .option_str(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| RuleError::missing_field(descriptor.action_type.as_str(), key))
}

/// 读取非负整数配置，接受数值与数值字符串
fn u64_option(descriptor: &ActionDescriptor, key: &str, default: u64) -> Result<u64> {
    let Some(raw) = descriptor.option(key) else {
        return Ok(default);
    };

    match as_numeric(raw) {
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as u64),
        _ => Err(RuleError::ParseError(format!(
            "{}.{} 必须是非负整数，实际为 {}",
            descriptor.action_type, key, raw
        ))),
    }
}

fn factory<A, F>(build: F) -> ActionFactory
where
    A: Action + 'static,
    F: Fn(&ActionDescriptor) -> Result<A> + Send + Sync + 'static,
{
    Arc::new(move |descriptor: &ActionDescriptor| -> Result<Box<dyn Action>> {
        Ok(Box::new(build(descriptor)?))
    })
}

/// 内置动作类型及其工厂
pub fn builtin_factories() -> Vec<(&'static str, ActionFactory)> {
    vec![
        ("set_header", factory(SetHeaderAction::new)),
        ("redirect", factory(RedirectAction::new)),
        ("block", factory(BlockAction::new)),
        ("cache", factory(CacheAction::new)),
        ("set_context", factory(SetContextAction::new)),
        ("log", factory(LogAction::new)),
    ]
}
