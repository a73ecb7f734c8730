//! 规则引擎领域模型

use crate::comparator::is_truthy;
use crate::operators::{MatchType, Operator};
use crate::registry::CUSTOM_TYPE;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// 规则默认排序值
pub const DEFAULT_RULE_ORDER: i64 = 10;

/// 规则定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// 越小越先执行
    #[serde(default = "default_order")]
    pub order: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub conditions: Vec<ConditionDescriptor>,
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
    #[serde(default)]
    pub metadata: RuleMetadata,
}

fn default_order() -> i64 {
    DEFAULT_RULE_ORDER
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            order: DEFAULT_RULE_ORDER,
            enabled: true,
            match_type: MatchType::All,
            conditions: Vec::new(),
            actions: Vec::new(),
            metadata: RuleMetadata::default(),
        }
    }

    /// 规则依赖的外部包
    pub fn required_packages(&self) -> &[String] {
        &self.metadata.required_packages
    }
}

/// 规则元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleMetadata {
    /// 规则运行所需的外部包
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_packages: Vec<String>,
    /// 宿主侧挂载点（如 WordPress hook 名称）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 条件描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDescriptor {
    #[serde(rename = "type")]
    pub condition_type: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
    /// 期望值为数组时的组合方式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    /// 条件类型特有的配置（如请求头名称）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_operator() -> String {
    Operator::Eq.as_str().to_string()
}

impl ConditionDescriptor {
    /// 创建条件描述，操作符由期望值推断
    pub fn new(condition_type: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            condition_type: condition_type.into(),
            operator: Operator::detect(&value).as_str().to_string(),
            value,
            match_type: None,
            extra: Map::new(),
        }
    }

    /// 创建显式指定操作符的条件描述
    pub fn with_operator(
        condition_type: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            operator: operator.into(),
            value: value.into(),
            match_type: None,
            extra: Map::new(),
        }
    }

    /// 附加配置项
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// 期望值的结构化形式
    ///
    /// 数组期望值未指定组合方式时取 any
    pub fn expected(&self) -> ExpectedValue {
        match &self.value {
            Value::Null => ExpectedValue::Absent,
            Value::Array(values) => ExpectedValue::List {
                values: values.clone(),
                match_type: self.match_type.unwrap_or(MatchType::Any),
            },
            other => ExpectedValue::Scalar(other.clone()),
        }
    }

    /// 读取字符串配置项
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// 实际构造的条件类型：`custom` 按 `name` 指向回调
    pub fn resolved_type(&self) -> &str {
        resolve_custom(&self.condition_type, self.option_str("name"))
    }
}

/// 条件期望值
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedValue {
    /// 未配置期望值（存在性判断）
    Absent,
    /// 单个期望值
    Scalar(Value),
    /// 多个期望值及其组合方式
    List {
        values: Vec<Value>,
        match_type: MatchType,
    },
}

/// 动作描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(rename = "type")]
    pub action_type: String,
    /// 执行成功后锁定该动作类型，后续规则不再执行同类型动作
    #[serde(
        rename = "_locked",
        default,
        deserialize_with = "deserialize_truthy",
        skip_serializing_if = "is_false"
    )]
    pub locked: bool,
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

fn deserialize_truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(is_truthy(&value))
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ActionDescriptor {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            locked: false,
            config: Map::new(),
        }
    }

    /// 附加配置项
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// 标记为锁定
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// 读取配置项
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// 读取字符串配置项
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// 实际构造的动作类型，也是动作锁定的粒度：`custom` 按 `name` 指向回调
    pub fn resolved_type(&self) -> &str {
        resolve_custom(&self.action_type, self.option_str("name"))
    }
}

fn resolve_custom<'a>(item_type: &'a str, name: Option<&'a str>) -> &'a str {
    match (item_type, name) {
        (CUSTOM_TYPE, Some(name)) => name,
        _ => item_type,
    }
}

/// 单次执行的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub rules_processed: u64,
    pub rules_skipped: u64,
    pub rules_matched: u64,
    pub actions_executed: u64,
}

/// 聚合后的错误摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    /// 聚合键（如 `condition:request_url`）
    pub key: String,
    pub count: u64,
    pub last_message: String,
}

/// 执行结果
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    #[serde(flatten)]
    pub stats: ExecutionStats,
    /// 执行结束时上下文的物化快照
    pub context: Value,
    /// 本次执行中聚合的条件/动作错误
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorSummary>,
}
