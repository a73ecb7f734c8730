//! 规则构建器
//!
//! 以链式调用构造规则描述：
//!
//! ```ignore
//! let rule = RuleBuilder::new("guest-admin-redirect")
//!     .title("未登录访问后台时跳转登录页")
//!     .order(5)
//!     .when(
//!         Conditions::new()
//!             .request_url("/wp-admin/*")
//!             .context_value("user.logged_in", false),
//!     )
//!     .then(Actions::new().redirect("/login").locked())
//!     .build();
//! ```

use crate::error::{Result, RuleError};
use crate::models::{ActionDescriptor, ConditionDescriptor, Rule};
use crate::operators::{MatchType, Operator};
use crate::registry::{CUSTOM_TYPE, ComponentRegistry};
use ruleflow_shared::config::EngineConfig;
use serde_json::{Value, json};
use tracing::debug;

/// 规则构建器
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    rule: Rule,
}

impl RuleBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self { rule: Rule::new(id) }
    }

    /// 使用配置中的默认排序值
    pub fn with_config(id: impl Into<String>, config: &EngineConfig) -> Self {
        Self::new(id).order(config.default_rule_order)
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.rule.title = title.into();
        self
    }

    pub fn order(mut self, order: i64) -> Self {
        self.rule.order = order;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.rule.enabled = enabled;
        self
    }

    pub fn match_type(mut self, match_type: MatchType) -> Self {
        self.rule.match_type = match_type;
        self
    }

    pub fn match_all(self) -> Self {
        self.match_type(MatchType::All)
    }

    pub fn match_any(self) -> Self {
        self.match_type(MatchType::Any)
    }

    pub fn match_none(self) -> Self {
        self.match_type(MatchType::None)
    }

    /// 声明依赖的外部包
    pub fn requires(mut self, package: impl Into<String>) -> Self {
        let package = package.into();
        if !self.rule.metadata.required_packages.contains(&package) {
            self.rule.metadata.required_packages.push(package);
        }
        self
    }

    pub fn hook(mut self, hook: impl Into<String>) -> Self {
        self.rule.metadata.hook = Some(hook.into());
        self
    }

    /// 附加任意元数据
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.rule.metadata.extra.insert(key.into(), value.into());
        self
    }

    pub fn when(mut self, conditions: Conditions) -> Self {
        self.rule.conditions.extend(conditions.items);
        self
    }

    pub fn then(mut self, actions: Actions) -> Self {
        self.rule.actions.extend(actions.items);
        self
    }

    pub fn build(self) -> Rule {
        self.rule
    }

    /// 构造规则，并根据注册表推导规则依赖的包
    ///
    /// 条件或动作类型未注册时返回错误
    pub fn build_with(self, registry: &ComponentRegistry) -> Result<Rule> {
        let mut rule = self.rule;

        for condition in &rule.conditions {
            let item_type = condition.resolved_type();
            if !registry.has_condition(item_type) {
                return Err(RuleError::UnknownConditionType(item_type.to_string()));
            }
        }
        for action in &rule.actions {
            let item_type = action.resolved_type();
            if !registry.has_action(item_type) {
                return Err(RuleError::UnknownActionType(item_type.to_string()));
            }
        }

        let item_types: Vec<String> = rule
            .conditions
            .iter()
            .map(|c| c.resolved_type().to_string())
            .chain(rule.actions.iter().map(|a| a.resolved_type().to_string()))
            .collect();

        for item_type in item_types {
            let Some(package) = registry.package_for(&item_type) else {
                continue;
            };
            if !rule.metadata.required_packages.contains(&package) {
                debug!(rule_id = %rule.id, item_type = %item_type, package = %package, "推导规则依赖包");
                rule.metadata.required_packages.push(package);
            }
        }

        Ok(rule)
    }
}

/// 条件列表构建器
///
/// `operator`、`match_type`、`with` 作用于最近添加的条件
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    items: Vec<ConditionDescriptor>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加条件，操作符由期望值推断
    pub fn add(mut self, condition_type: impl Into<String>, value: impl Into<Value>) -> Self {
        self.items.push(ConditionDescriptor::new(condition_type, value));
        self
    }

    /// 添加显式指定操作符的条件
    pub fn add_with(
        mut self,
        condition_type: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.items.push(ConditionDescriptor::with_operator(
            condition_type,
            operator.as_str(),
            value,
        ));
        self
    }

    pub fn operator(mut self, operator: Operator) -> Self {
        if let Some(last) = self.items.last_mut() {
            last.operator = operator.as_str().to_string();
        }
        self
    }

    pub fn match_type(mut self, match_type: MatchType) -> Self {
        if let Some(last) = self.items.last_mut() {
            last.match_type = Some(match_type);
        }
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Some(last) = self.items.last_mut() {
            last.extra.insert(key.into(), value.into());
        }
        self
    }

    pub fn request_url(self, pattern: impl Into<Value>) -> Self {
        self.add("request_url", pattern)
    }

    pub fn request_method(self, method: impl Into<Value>) -> Self {
        self.add("request_method", method)
    }

    pub fn request_header(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add("request_header", value).with("name", Value::String(name.into()))
    }

    pub fn request_param(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add("request_param", value).with("name", Value::String(name.into()))
    }

    pub fn cookie(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add("cookie", value).with("name", Value::String(name.into()))
    }

    /// 任意上下文路径
    pub fn context_value(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add("context", value).with("path", Value::String(path.into()))
    }

    pub fn post_author(self, author: impl Into<Value>) -> Self {
        self.add("post_author", author)
    }

    pub fn post_category(self, category: impl Into<Value>) -> Self {
        self.add("post_category", category)
    }

    pub fn post_tag(self, tag: impl Into<Value>) -> Self {
        self.add("post_tag", tag)
    }

    pub fn day_of_week(self, day: impl Into<Value>) -> Self {
        self.add("day_of_week", day)
    }

    pub fn is_weekend(self) -> Self {
        self.add_with("day_of_week", Operator::In, json!(["saturday", "sunday"]))
    }

    /// 已注册的自定义条件回调
    pub fn custom(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add(CUSTOM_TYPE, value).with("name", Value::String(name.into()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<ConditionDescriptor> {
        self.items
    }
}

/// 动作列表构建器
#[derive(Debug, Clone, Default)]
pub struct Actions {
    items: Vec<ActionDescriptor>,
}

impl Actions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加动作，`config` 为对象时其字段作为动作配置
    pub fn add(mut self, action_type: impl Into<String>, config: Value) -> Self {
        let mut descriptor = ActionDescriptor::new(action_type);
        if let Value::Object(config) = config {
            descriptor.config.extend(config);
        }
        self.items.push(descriptor);
        self
    }

    /// 锁定最近添加的动作
    pub fn locked(mut self) -> Self {
        if let Some(last) = self.items.last_mut() {
            last.locked = true;
        }
        self
    }

    pub fn set_header(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let (name, value): (String, Value) = (name.into(), value.into());
        self.add("set_header", json!({"name": name, "value": value}))
    }

    pub fn redirect(self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.add("redirect", json!({"url": url}))
    }

    pub fn redirect_with_status(self, url: impl Into<String>, status: u16) -> Self {
        let url: String = url.into();
        self.add("redirect", json!({"url": url, "status": status}))
    }

    pub fn block(self, message: impl Into<String>) -> Self {
        let message: String = message.into();
        self.add("block", json!({"message": message}))
    }

    pub fn cache(self, ttl: u64) -> Self {
        self.add("cache", json!({"ttl": ttl}))
    }

    pub fn set_context(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        let (path, value): (String, Value) = (path.into(), value.into());
        self.add("set_context", json!({"path": path, "value": value}))
    }

    pub fn log(self, message: impl Into<String>) -> Self {
        let message: String = message.into();
        self.add("log", json!({"message": message}))
    }

    /// 已注册的自定义动作回调
    pub fn custom(self, name: impl Into<String>, config: Value) -> Self {
        let name = name.into();
        let mut actions = self.add(CUSTOM_TYPE, config);
        if let Some(last) = actions.items.last_mut() {
            last.config.insert("name".to_string(), Value::String(name));
        }
        actions
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<ActionDescriptor> {
        self.items
    }
}
