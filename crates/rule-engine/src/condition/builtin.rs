//! 内置条件
//!
//! | 类型 | 实际值来源 |
//! |------|-----------|
//! | `request_url` | `request.path`，缺失时取 `request.url` |
//! | `request_method` | `request.method` |
//! | `request_header` | `request.headers.<小写 name>` |
//! | `request_param` | `request.params.<name>` |
//! | `cookie` | `request.cookies.<name>` |
//! | `context` | 任意 `path` |
//! | `day_of_week` | `time.now`（RFC 3339）或当前 UTC 时间的星期 |
//! | `post_author` / `post_category` / `post_tag` | 文章实体，按 ID、slug、名称多字段匹配 |

use super::field_match::{FieldSet, ID_SLUG_NAME};
use super::{Condition, ConditionFactory};
use crate::comparator::ValueComparator;
use crate::context::ExecutionContext;
use crate::error::{Result, RuleError};
use crate::models::ConditionDescriptor;
use chrono::{DateTime, Datelike, Utc, Weekday};
use serde_json::Value;
use std::sync::Arc;

/// 按路径从上下文取值的条件
///
/// 依次尝试各候选路径，取第一个非 null 的值
#[derive(Debug, Clone)]
pub struct ContextPathCondition {
    descriptor: ConditionDescriptor,
    paths: Vec<String>,
}

impl ContextPathCondition {
    pub fn new(descriptor: ConditionDescriptor, paths: Vec<String>) -> Self {
        Self { descriptor, paths }
    }

    pub fn request_url(descriptor: &ConditionDescriptor) -> Result<Self> {
        Ok(Self::new(
            descriptor.clone(),
            vec!["request.path".to_string(), "request.url".to_string()],
        ))
    }

    pub fn request_method(descriptor: &ConditionDescriptor) -> Result<Self> {
        Ok(Self::new(descriptor.clone(), vec!["request.method".to_string()]))
    }

    /// 请求头名称统一转为小写
    pub fn request_header(descriptor: &ConditionDescriptor) -> Result<Self> {
        let name = required_option(descriptor, "name")?.to_lowercase();
        Ok(Self::new(
            descriptor.clone(),
            vec![format!("request.headers.{}", name)],
        ))
    }

    pub fn request_param(descriptor: &ConditionDescriptor) -> Result<Self> {
        let name = required_option(descriptor, "name")?;
        Ok(Self::new(
            descriptor.clone(),
            vec![format!("request.params.{}", name)],
        ))
    }

    pub fn cookie(descriptor: &ConditionDescriptor) -> Result<Self> {
        let name = required_option(descriptor, "name")?;
        Ok(Self::new(
            descriptor.clone(),
            vec![format!("request.cookies.{}", name)],
        ))
    }

    pub fn context(descriptor: &ConditionDescriptor) -> Result<Self> {
        let path = required_option(descriptor, "path")?.to_string();
        Ok(Self::new(descriptor.clone(), vec![path]))
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

impl Condition for ContextPathCondition {
    fn descriptor(&self) -> &ConditionDescriptor {
        &self.descriptor
    }

    fn actual_value(&self, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        Ok(self
            .paths
            .iter()
            .filter_map(|path| ctx.get(path))
            .find(|value| !value.is_null())
            .unwrap_or(Value::Null))
    }
}

/// 星期条件，实际值为小写英文全称（如 `saturday`）
#[derive(Debug, Clone)]
pub struct DayOfWeekCondition {
    descriptor: ConditionDescriptor,
}

impl DayOfWeekCondition {
    pub fn new(descriptor: &ConditionDescriptor) -> Result<Self> {
        Ok(Self {
            descriptor: descriptor.clone(),
        })
    }

    fn now(ctx: &ExecutionContext) -> anyhow::Result<DateTime<Utc>> {
        match ctx.get("time.now") {
            Some(Value::String(raw)) => Ok(DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| anyhow::anyhow!("time.now 不是合法的 RFC 3339 时间: {}", e))?
                .with_timezone(&Utc)),
            _ => Ok(Utc::now()),
        }
    }
}

impl Condition for DayOfWeekCondition {
    fn descriptor(&self) -> &ConditionDescriptor {
        &self.descriptor
    }

    fn actual_value(&self, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        let weekday = Self::now(ctx)?.weekday();
        Ok(Value::String(weekday_name(weekday).to_string()))
    }

    /// 星期名称大小写不敏感
    fn compare(&self, actual: &Value, expected: &Value) -> bool {
        let expected = lowercase_strings(expected);
        ValueComparator::compare(actual, &expected, &self.descriptor.operator)
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn lowercase_strings(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_lowercase()),
        Value::Array(arr) => Value::Array(arr.iter().map(lowercase_strings).collect()),
        other => other.clone(),
    }
}

/// 实体条件：实际值是一个或一组实体，按候选字段集合匹配
#[derive(Debug, Clone)]
pub struct EntityCondition {
    descriptor: ConditionDescriptor,
    entity_path: &'static str,
    fields: FieldSet,
}

impl EntityCondition {
    pub fn new(
        descriptor: ConditionDescriptor,
        entity_path: &'static str,
        fields: FieldSet,
    ) -> Self {
        Self {
            descriptor,
            entity_path,
            fields,
        }
    }

    pub fn post_author(descriptor: &ConditionDescriptor) -> Result<Self> {
        Ok(Self::new(descriptor.clone(), "post.author", ID_SLUG_NAME))
    }

    pub fn post_category(descriptor: &ConditionDescriptor) -> Result<Self> {
        Ok(Self::new(descriptor.clone(), "post.categories", ID_SLUG_NAME))
    }

    pub fn post_tag(descriptor: &ConditionDescriptor) -> Result<Self> {
        Ok(Self::new(descriptor.clone(), "post.tags", ID_SLUG_NAME))
    }
}

impl Condition for EntityCondition {
    fn descriptor(&self) -> &ConditionDescriptor {
        &self.descriptor
    }

    fn actual_value(&self, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        Ok(ctx.get(self.entity_path).unwrap_or(Value::Null))
    }

    fn compare(&self, actual: &Value, expected: &Value) -> bool {
        self.fields.matches(actual, expected, &self.descriptor.operator)
    }
}

fn required_option<'a>(descriptor: &'a ConditionDescriptor, key: &str) -> Result<&'a str> {
    descriptor
        .option_str(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| RuleError::missing_field(descriptor.condition_type.as_str(), key))
}

fn factory<C, F>(build: F) -> ConditionFactory
where
    C: Condition + 'static,
    F: Fn(&ConditionDescriptor) -> Result<C> + Send + Sync + 'static,
{
    Arc::new(move |descriptor: &ConditionDescriptor| -> Result<Box<dyn Condition>> {
        Ok(Box::new(build(descriptor)?))
    })
}

/// 内置条件类型及其工厂
pub fn builtin_factories() -> Vec<(&'static str, ConditionFactory)> {
    vec![
        ("request_url", factory(ContextPathCondition::request_url)),
        ("request_method", factory(ContextPathCondition::request_method)),
        ("request_header", factory(ContextPathCondition::request_header)),
        ("request_param", factory(ContextPathCondition::request_param)),
        ("cookie", factory(ContextPathCondition::cookie)),
        ("context", factory(ContextPathCondition::context)),
        ("day_of_week", factory(DayOfWeekCondition::new)),
        ("post_author", factory(EntityCondition::post_author)),
        ("post_category", factory(EntityCondition::post_category)),
        ("post_tag", factory(EntityCondition::post_tag)),
    ]
}
