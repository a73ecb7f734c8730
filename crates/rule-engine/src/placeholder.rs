//! 占位符解析
//!
//! 替换字符串中的 `{category.path}` 占位符。优先使用为 category 注册的自定义解析器，
//! 否则把 category 当作上下文顶层键并沿 path 查找。
//! 任何解析失败都原样保留占位符文本，调用方不会得到空串或错误。

use crate::comparator::{is_scalar, to_php_string};
use crate::context::ExecutionContext;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// 匹配 `{...}` 形式的占位符
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").unwrap());

/// 自定义占位符解析器：接收上下文与 category 之后的路径段
pub type PlaceholderFn =
    Arc<dyn Fn(&ExecutionContext, &[&str]) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// 占位符解析器
#[derive(Clone, Default)]
pub struct PlaceholderResolver {
    resolvers: HashMap<String, PlaceholderFn>,
}

impl PlaceholderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册自定义解析器，覆盖同名 category
    pub fn register<F>(&mut self, category: impl Into<String>, resolver: F) -> &mut Self
    where
        F: Fn(&ExecutionContext, &[&str]) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.resolvers.insert(category.into(), Arc::new(resolver));
        self
    }

    /// 注册已包装的解析器
    pub fn register_fn(
        &mut self,
        category: impl Into<String>,
        resolver: PlaceholderFn,
    ) -> &mut Self {
        self.resolvers.insert(category.into(), resolver);
        self
    }

    /// 已注册的自定义 category
    pub fn categories(&self) -> Vec<&str> {
        self.resolvers.keys().map(String::as_str).collect()
    }

    /// 清空自定义解析器
    pub fn clear(&mut self) {
        self.resolvers.clear();
    }

    /// 替换字符串中的全部占位符
    pub fn resolve(&self, template: &str, ctx: &ExecutionContext) -> String {
        if !template.contains('{') {
            return template.to_string();
        }

        PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                self.resolve_token(&caps[1], ctx)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// 递归替换 JSON 值中所有字符串的占位符
    pub fn resolve_value(&self, value: &Value, ctx: &ExecutionContext) -> Value {
        match value {
            Value::String(s) => Value::String(self.resolve(s, ctx)),
            Value::Array(arr) => {
                Value::Array(arr.iter().map(|v| self.resolve_value(v, ctx)).collect())
            }
            Value::Object(obj) => {
                let mut resolved = Map::new();
                for (k, v) in obj {
                    resolved.insert(k.clone(), self.resolve_value(v, ctx));
                }
                Value::Object(resolved)
            }
            _ => value.clone(),
        }
    }

    /// 解析单个占位符，失败返回 None
    fn resolve_token(&self, token: &str, ctx: &ExecutionContext) -> Option<String> {
        let mut parts = token.split('.');
        let category = parts.next()?;
        let path: Vec<&str> = parts.collect();

        if let Some(resolver) = self.resolvers.get(category) {
            return match resolver(ctx, &path) {
                Ok(Some(value)) if !value.is_null() => Some(to_php_string(&value)),
                Ok(_) => None,
                Err(e) => {
                    debug!(token = %token, error = %e, "自定义占位符解析失败，保留原文");
                    None
                }
            };
        }

        let mut current = ctx.get(category)?;
        for segment in path {
            current = match current {
                Value::Object(mut map) => map.remove(segment)?,
                _ => return None,
            };
        }

        is_scalar(&current).then(|| to_php_string(&current))
    }
}

impl fmt::Debug for PlaceholderResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaceholderResolver")
            .field("categories", &self.categories())
            .finish()
    }
}
