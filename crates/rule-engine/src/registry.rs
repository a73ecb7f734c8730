//! 组件注册表
//!
//! 按类型字符串索引条件工厂与动作工厂，是引擎把描述变成可执行组件的唯一入口。
//! 同时持有自定义回调、自定义占位符解析器与包注册表。
//!
//! ## 使用示例
//!
//! ```ignore
//! use rule_engine::registry::ComponentRegistry;
//!
//! let mut registry = ComponentRegistry::with_defaults();
//! registry.register_custom_condition("is_vip", |ctx, _desc| {
//!     Ok(ctx.get("user.tier").is_some_and(|tier| tier == "vip"))
//! });
//!
//! let ctx = registry.new_context();
//! ```

use crate::action::{self, Action, ActionCallback, ActionFactory, CallbackAction};
use crate::condition::{self, CallbackCondition, Condition, ConditionCallback, ConditionFactory};
use crate::context::ExecutionContext;
use crate::error::{Result, RuleError};
use crate::models::{ActionDescriptor, ConditionDescriptor};
use crate::package::{Package, PackageRegistry};
use crate::placeholder::PlaceholderResolver;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// 通过 `name` 键路由到自定义回调的保留类型
pub const CUSTOM_TYPE: &str = "custom";

/// 组件注册表
///
/// 注册阶段需要 `&mut self`，构建完成后通常包装为 `Arc` 交给引擎共享只读使用。
pub struct ComponentRegistry {
    conditions: HashMap<String, ConditionFactory>,
    actions: HashMap<String, ActionFactory>,
    custom_conditions: HashMap<String, ConditionCallback>,
    custom_actions: HashMap<String, ActionCallback>,
    placeholders: PlaceholderResolver,
    packages: PackageRegistry,
}

impl ComponentRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            conditions: HashMap::new(),
            actions: HashMap::new(),
            custom_conditions: HashMap::new(),
            custom_actions: HashMap::new(),
            placeholders: PlaceholderResolver::new(),
            packages: PackageRegistry::new(),
        }
    }

    /// 创建包含全部内置条件与动作的注册表
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_builtins();

        info!(
            conditions = registry.conditions.len(),
            actions = registry.actions.len(),
            "内置条件与动作注册完成"
        );

        registry
    }

    fn register_builtins(&mut self) {
        for (condition_type, factory) in condition::builtin::builtin_factories() {
            self.conditions.insert(condition_type.to_string(), factory);
        }
        for (action_type, factory) in action::builtin::builtin_factories() {
            self.actions.insert(action_type.to_string(), factory);
        }
    }

    /// 注册条件工厂，同名类型被替换
    pub fn register_condition<F>(
        &mut self,
        condition_type: impl Into<String>,
        factory: F,
    ) -> &mut Self
    where
        F: Fn(&ConditionDescriptor) -> Result<Box<dyn Condition>> + Send + Sync + 'static,
    {
        let condition_type = condition_type.into();
        debug!(condition_type = %condition_type, "注册条件类型");
        self.conditions.insert(condition_type, Arc::new(factory));
        self
    }

    /// 注册动作工厂，同名类型被替换
    pub fn register_action<F>(&mut self, action_type: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ActionDescriptor) -> Result<Box<dyn Action>> + Send + Sync + 'static,
    {
        let action_type = action_type.into();
        debug!(action_type = %action_type, "注册动作类型");
        self.actions.insert(action_type, Arc::new(factory));
        self
    }

    /// 注册自定义条件回调
    ///
    /// 可以通过 `{"type": "custom", "name": <name>}` 引用，也可以直接把 name 当作类型
    pub fn register_custom_condition<F>(
        &mut self,
        name: impl Into<String>,
        callback: F,
    ) -> &mut Self
    where
        F: Fn(&ExecutionContext, &ConditionDescriptor) -> anyhow::Result<bool>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        debug!(name = %name, "注册自定义条件");
        self.custom_conditions.insert(name, Arc::new(callback));
        self
    }

    /// 注册自定义动作回调
    pub fn register_custom_action<F>(&mut self, name: impl Into<String>, callback: F) -> &mut Self
    where
        F: Fn(&ExecutionContext, &ActionDescriptor) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(name = %name, "注册自定义动作");
        self.custom_actions.insert(name, Arc::new(callback));
        self
    }

    /// 注册自定义占位符解析器
    pub fn register_placeholder<F>(&mut self, category: impl Into<String>, resolver: F) -> &mut Self
    where
        F: Fn(&ExecutionContext, &[&str]) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.placeholders.register(category, resolver);
        self
    }

    /// 当前占位符解析器的快照
    pub fn placeholder_resolver(&self) -> Arc<PlaceholderResolver> {
        Arc::new(self.placeholders.clone())
    }

    /// 创建使用本注册表占位符解析器的上下文
    pub fn new_context(&self) -> ExecutionContext {
        ExecutionContext::new().with_placeholders(self.placeholder_resolver())
    }

    /// 由描述构造条件
    pub fn create_condition(&self, descriptor: &ConditionDescriptor) -> Result<Box<dyn Condition>> {
        let condition_type = descriptor.condition_type.as_str();

        if condition_type == CUSTOM_TYPE {
            let name = descriptor
                .option_str("name")
                .ok_or_else(|| RuleError::missing_field(CUSTOM_TYPE, "name"))?;
            return self.callback_condition(name, descriptor).ok_or_else(|| {
                RuleError::UnknownConditionType(format!("{}:{}", CUSTOM_TYPE, name))
            });
        }

        if let Some(factory) = self.conditions.get(condition_type) {
            return factory(descriptor);
        }

        self.callback_condition(condition_type, descriptor)
            .ok_or_else(|| RuleError::UnknownConditionType(condition_type.to_string()))
    }

    fn callback_condition(
        &self,
        name: &str,
        descriptor: &ConditionDescriptor,
    ) -> Option<Box<dyn Condition>> {
        self.custom_conditions.get(name).map(|callback| {
            Box::new(CallbackCondition::new(name, descriptor.clone(), callback.clone()))
                as Box<dyn Condition>
        })
    }

    /// 由描述构造动作
    pub fn create_action(&self, descriptor: &ActionDescriptor) -> Result<Box<dyn Action>> {
        let action_type = descriptor.action_type.as_str();

        if action_type == CUSTOM_TYPE {
            let name = descriptor
                .option_str("name")
                .ok_or_else(|| RuleError::missing_field(CUSTOM_TYPE, "name"))?;
            return self
                .callback_action(name, descriptor)
                .ok_or_else(|| RuleError::UnknownActionType(format!("{}:{}", CUSTOM_TYPE, name)));
        }

        if let Some(factory) = self.actions.get(action_type) {
            return factory(descriptor);
        }

        self.callback_action(action_type, descriptor)
            .ok_or_else(|| RuleError::UnknownActionType(action_type.to_string()))
    }

    fn callback_action(
        &self,
        name: &str,
        descriptor: &ActionDescriptor,
    ) -> Option<Box<dyn Action>> {
        self.custom_actions.get(name).map(|callback| {
            Box::new(CallbackAction::new(name, descriptor.clone(), callback.clone()))
                as Box<dyn Action>
        })
    }

    /// 条件类型是否可构造
    pub fn has_condition(&self, condition_type: &str) -> bool {
        self.conditions.contains_key(condition_type)
            || self.custom_conditions.contains_key(condition_type)
    }

    /// 动作类型是否可构造
    pub fn has_action(&self, action_type: &str) -> bool {
        self.actions.contains_key(action_type) || self.custom_actions.contains_key(action_type)
    }

    /// 全部可用的条件类型（排序后）
    pub fn condition_types(&self) -> Vec<String> {
        sorted_keys(self.conditions.keys().chain(self.custom_conditions.keys()))
    }

    /// 全部可用的动作类型（排序后）
    pub fn action_types(&self) -> Vec<String> {
        sorted_keys(self.actions.keys().chain(self.custom_actions.keys()))
    }

    /// 注册包
    pub fn register_package(&mut self, package: Package) -> &mut Self {
        self.packages.register(package);
        self
    }

    pub fn packages(&self) -> &PackageRegistry {
        &self.packages
    }

    pub fn packages_mut(&mut self) -> &mut PackageRegistry {
        &mut self.packages
    }

    /// 提供指定条件或动作类型的包
    pub fn package_for(&self, item_type: &str) -> Option<String> {
        self.packages.package_for_type(item_type).map(str::to_string)
    }

    /// 清空自定义回调、自定义占位符与包，仅保留内置组件
    pub fn reset(&mut self) {
        self.conditions.clear();
        self.actions.clear();
        self.custom_conditions.clear();
        self.custom_actions.clear();
        self.placeholders.clear();
        self.packages.reset();
        self.register_builtins();
        debug!("组件注册表已重置");
    }
}

fn sorted_keys<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut keys: Vec<String> = keys.cloned().collect();
    keys.sort();
    keys.dedup();
    keys
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("conditions", &self.condition_types())
            .field("actions", &self.action_types())
            .field("placeholders", &self.placeholders)
            .field("packages", &self.packages.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_defaults() {
        let registry = ComponentRegistry::with_defaults();
        assert!(registry.has_condition("request_url"));
        assert!(registry.has_condition("post_tag"));
        assert!(registry.has_action("redirect"));
        assert!(registry.has_action("log"));
        assert!(!registry.has_action("request_url"));
    }

    #[test]
    fn test_unknown_types() {
        let registry = ComponentRegistry::with_defaults();

        let err = registry
            .create_condition(&ConditionDescriptor::new("geo_country", "NL"))
            .err()
            .unwrap();
        assert!(matches!(err, RuleError::UnknownConditionType(ref t) if t == "geo_country"));

        let err = registry
            .create_action(&ActionDescriptor::new("send_sms"))
            .err()
            .unwrap();
        assert!(matches!(err, RuleError::UnknownActionType(_)));
    }

    #[test]
    fn test_custom_condition_by_name_and_type() {
        let mut registry = ComponentRegistry::with_defaults();
        registry.register_custom_condition("is_vip", |ctx, _desc| {
            Ok(ctx.get("user.tier").is_some_and(|tier| tier == "vip"))
        });

        let ctx = ExecutionContext::from_value(json!({"user": {"tier": "vip"}}));

        let by_name = ConditionDescriptor::new(CUSTOM_TYPE, Value::Null).with("name", "is_vip");
        assert!(registry.create_condition(&by_name).unwrap().matches(&ctx).unwrap());

        let by_type = ConditionDescriptor::new("is_vip", Value::Null);
        let cond = registry.create_condition(&by_type).unwrap();
        assert_eq!(cond.condition_type(), "is_vip");
        assert!(cond.matches(&ctx).unwrap());
    }

    #[test]
    fn test_custom_without_name() {
        let registry = ComponentRegistry::with_defaults();
        let desc = ConditionDescriptor::new(CUSTOM_TYPE, Value::Null);
        assert!(matches!(
            registry.create_condition(&desc).err(),
            Some(RuleError::MissingField { .. })
        ));

        let desc = ActionDescriptor::new(CUSTOM_TYPE).with("name", "nope");
        assert!(matches!(
            registry.create_action(&desc).err(),
            Some(RuleError::UnknownActionType(ref t)) if t == "custom:nope"
        ));
    }

    #[test]
    fn test_custom_action() {
        let mut registry = ComponentRegistry::with_defaults();
        registry.register_custom_action("flag", |ctx, desc| {
            ctx.set("flags.last", desc.option("value").cloned().unwrap_or_default());
            Ok(())
        });

        let ctx = ExecutionContext::new();
        let desc = ActionDescriptor::new(CUSTOM_TYPE).with("name", "flag").with("value", 7);
        registry.create_action(&desc).unwrap().execute(&ctx).unwrap();
        assert_eq!(ctx.get("flags.last"), Some(json!(7)));
    }

    #[test]
    fn test_register_condition_factory_overrides_builtin() {
        let mut registry = ComponentRegistry::with_defaults();
        registry.register_condition("request_method", |desc| {
            Ok(Box::new(condition::ContextPathCondition::new(
                desc.clone(),
                vec!["server.method".to_string()],
            )))
        });

        let ctx = ExecutionContext::from_value(json!({"server": {"method": "PUT"}}));
        let cond = registry
            .create_condition(&ConditionDescriptor::new("request_method", "PUT"))
            .unwrap();
        assert!(cond.matches(&ctx).unwrap());
    }

    #[test]
    fn test_placeholders_shared_with_context() {
        let mut registry = ComponentRegistry::with_defaults();
        registry.register_placeholder("env", |_ctx, path| {
            Ok(match path {
                ["region"] => Some(json!("eu-west-1")),
                _ => None,
            })
        });

        let ctx = registry.new_context();
        assert_eq!(ctx.resolve("{env.region}/{env.zone}"), "eu-west-1/{env.zone}");
    }

    #[test]
    fn test_package_lookup_and_reset() {
        let mut registry = ComponentRegistry::with_defaults();
        registry.register_custom_condition("cart_total", |_, _| Ok(true));
        registry.register_package(Package::new("woocommerce").provides_condition("cart_total"));
        registry.register_placeholder("shop", |_, _| Ok(None));

        assert_eq!(registry.package_for("cart_total").as_deref(), Some("woocommerce"));
        assert_eq!(registry.package_for("request_url"), None);

        registry.reset();
        assert!(!registry.has_condition("cart_total"));
        assert!(registry.has_condition("request_url"));
        assert!(registry.packages().is_empty());
        assert!(registry.placeholder_resolver().categories().is_empty());
    }
}
