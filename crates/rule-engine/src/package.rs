//! 包注册表
//!
//! 包是一组条件/动作类型的提供方，可以声明对其他包的依赖。
//! 加载一个包时先按深度优先加载其全部依赖；依赖缺失或存在循环时加载失败。
//! 已加载的包集合就是引擎判断规则是否可运行时默认使用的可用包集合。

use crate::error::{Result, RuleError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// 包定义
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// 该包提供的条件类型
    #[serde(default)]
    pub conditions: Vec<String>,
    /// 该包提供的动作类型
    #[serde(default)]
    pub actions: Vec<String>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn provides_condition(mut self, condition_type: impl Into<String>) -> Self {
        self.conditions.push(condition_type.into());
        self
    }

    pub fn provides_action(mut self, action_type: impl Into<String>) -> Self {
        self.actions.push(action_type.into());
        self
    }

    /// 是否提供指定的条件或动作类型
    pub fn provides(&self, item_type: &str) -> bool {
        self.conditions.iter().any(|t| t == item_type)
            || self.actions.iter().any(|t| t == item_type)
    }
}

/// 包注册表
#[derive(Debug, Default)]
pub struct PackageRegistry {
    /// 按包名排序，同一类型由多个包提供时取名称最小者
    packages: BTreeMap<String, Package>,
    loaded: BTreeSet<String>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册包，同名包被替换
    pub fn register(&mut self, package: Package) -> &mut Self {
        debug!(
            package = %package.name,
            dependencies = ?package.dependencies,
            "注册包"
        );
        self.packages.insert(package.name.clone(), package);
        self
    }

    /// 获取包定义
    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// 包是否已注册
    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// 计算加载顺序：依赖在前，目标包在最后
    pub fn resolve_order(&self, name: &str) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut visiting = Vec::new();
        let mut done = HashSet::new();
        self.visit(name, &mut visiting, &mut done, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        visiting: &mut Vec<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if done.contains(name) {
            return Ok(());
        }

        if let Some(start) = visiting.iter().position(|n| n == name) {
            let mut cycle = visiting[start..].to_vec();
            cycle.push(name.to_string());
            return Err(RuleError::DependencyCycle(cycle));
        }

        let package = self
            .packages
            .get(name)
            .ok_or_else(|| RuleError::MissingPackage(name.to_string()))?;

        visiting.push(name.to_string());
        for dependency in &package.dependencies {
            self.visit(dependency, visiting, done, order)?;
        }
        visiting.pop();

        done.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// 加载包及其依赖
    ///
    /// 已加载的包不会重复加载；返回本次新加载的包名（按加载顺序）。
    /// 依赖解析失败时不加载任何包。
    pub fn load(&mut self, name: &str) -> Result<Vec<String>> {
        let order = self.resolve_order(name)?;

        let newly_loaded: Vec<String> = order
            .into_iter()
            .filter(|package| self.loaded.insert(package.clone()))
            .collect();

        if !newly_loaded.is_empty() {
            info!(package = %name, loaded = ?newly_loaded, "包加载完成");
        }

        Ok(newly_loaded)
    }

    /// 加载全部已注册的包，失败的包记录告警后跳过
    pub fn load_all(&mut self) -> BTreeSet<String> {
        let mut names: Vec<String> = self.packages.keys().cloned().collect();
        names.sort();

        for name in names {
            if let Err(e) = self.load(&name) {
                warn!(package = %name, error = %e, "包加载失败");
            }
        }

        self.loaded.clone()
    }

    /// 已加载的包集合
    pub fn loaded(&self) -> BTreeSet<String> {
        self.loaded.clone()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains(name)
    }

    /// 查找提供指定条件或动作类型的包
    pub fn package_for_type(&self, item_type: &str) -> Option<&str> {
        self.packages
            .values()
            .find(|package| package.provides(item_type))
            .map(|package| package.name.as_str())
    }

    /// 已注册的包名
    pub fn names(&self) -> Vec<String> {
        self.packages.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// 清空全部注册与加载状态
    pub fn reset(&mut self) {
        self.packages.clear();
        self.loaded.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PackageRegistry {
        let mut registry = PackageRegistry::new();
        registry
            .register(Package::new("core"))
            .register(
                Package::new("woocommerce")
                    .depends_on("core")
                    .provides_condition("cart_total"),
            )
            .register(
                Package::new("subscriptions")
                    .depends_on("woocommerce")
                    .depends_on("core")
                    .provides_action("renew_subscription"),
            );
        registry
    }

    #[test]
    fn test_resolve_order_dependencies_first() {
        let registry = registry();
        assert_eq!(
            registry.resolve_order("subscriptions").unwrap(),
            vec!["core", "woocommerce", "subscriptions"]
        );
    }

    #[test]
    fn test_load_is_idempotent() {
        let mut registry = registry();

        let first = registry.load("woocommerce").unwrap();
        assert_eq!(first, vec!["core", "woocommerce"]);

        let second = registry.load("subscriptions").unwrap();
        assert_eq!(second, vec!["subscriptions"]);

        assert!(registry.load("subscriptions").unwrap().is_empty());
        assert_eq!(
            registry.loaded(),
            BTreeSet::from([
                "core".to_string(),
                "subscriptions".to_string(),
                "woocommerce".to_string(),
            ])
        );
    }

    #[test]
    fn test_missing_dependency() {
        let mut registry = PackageRegistry::new();
        registry.register(Package::new("seo").depends_on("analytics"));

        let err = registry.load("seo").unwrap_err();
        assert!(matches!(err, RuleError::MissingPackage(ref name) if name == "analytics"));
        assert!(!registry.is_loaded("seo"));
    }

    #[test]
    fn test_dependency_cycle_reports_path() {
        let mut registry = PackageRegistry::new();
        registry
            .register(Package::new("a").depends_on("b"))
            .register(Package::new("b").depends_on("c"))
            .register(Package::new("c").depends_on("a"));

        match registry.load("a").unwrap_err() {
            RuleError::DependencyCycle(path) => assert_eq!(path, vec!["a", "b", "c", "a"]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.loaded().is_empty());
    }

    #[test]
    fn test_load_all_skips_broken_packages() {
        let mut registry = registry();
        registry.register(Package::new("broken").depends_on("nowhere"));

        let loaded = registry.load_all();
        assert_eq!(loaded.len(), 3);
        assert!(!loaded.contains("broken"));
    }

    #[test]
    fn test_package_for_type() {
        let registry = registry();
        assert_eq!(registry.package_for_type("cart_total"), Some("woocommerce"));
        assert_eq!(registry.package_for_type("renew_subscription"), Some("subscriptions"));
        assert_eq!(registry.package_for_type("request_url"), None);
    }

    #[test]
    fn test_package_for_shared_type_is_stable() {
        let mut registry = PackageRegistry::new();
        registry
            .register(Package::new("zeta").provides_condition("geo_country"))
            .register(Package::new("alpha").provides_condition("geo_country"))
            .register(Package::new("mid").provides_condition("geo_country"));

        assert_eq!(registry.package_for_type("geo_country"), Some("alpha"));
        assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_reset() {
        let mut registry = registry();
        registry.load_all();
        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.loaded().is_empty());
    }
}
