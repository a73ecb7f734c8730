//! 规则存储管理
//!
//! 使用 DashMap 提供线程安全的规则集合，支持规则的加载、更新、删除和批量操作。
//! 规则按 `order` 升序、同序按注册先后排列后交给引擎执行。

use crate::error::{Result, RuleError};
use crate::models::Rule;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
struct StoredRule {
    rule: Rule,
    /// 注册序号，重新注册时更新
    sequence: u64,
}

/// 规则存储
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    rules: Arc<DashMap<String, StoredRule>>,
    sequence: Arc<AtomicU64>,
}

impl RuleStore {
    /// 创建新的规则存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取当前存储的规则数量
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 加载规则，同 ID 的旧规则被替换
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub fn load(&self, rule: Rule) -> Result<()> {
        validate(&rule)?;

        let rule_id = rule.id.clone();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let replaced = self
            .rules
            .insert(rule_id.clone(), StoredRule { rule, sequence })
            .is_some();

        if replaced {
            info!("规则已替换: {}", rule_id);
        } else {
            info!("规则已加载: {}", rule_id);
        }
        Ok(())
    }

    /// 加载规则（从 JSON 字符串）
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<String> {
        let rule: Rule =
            serde_json::from_str(json).map_err(|e| RuleError::ParseError(e.to_string()))?;
        let rule_id = rule.id.clone();
        self.load(rule)?;
        Ok(rule_id)
    }

    /// 更新已存在的规则
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub fn update(&self, rule: Rule) -> Result<()> {
        if !self.rules.contains_key(&rule.id) {
            warn!("更新不存在的规则: {}", rule.id);
            return Err(RuleError::RuleNotFound(rule.id));
        }

        self.load(rule)
    }

    /// 删除规则
    #[instrument(skip(self))]
    pub fn delete(&self, rule_id: &str) -> Result<()> {
        if self.rules.remove(rule_id).is_some() {
            info!("规则已删除: {}", rule_id);
            Ok(())
        } else {
            warn!("删除不存在的规则: {}", rule_id);
            Err(RuleError::RuleNotFound(rule_id.to_string()))
        }
    }

    /// 获取规则
    pub fn get(&self, rule_id: &str) -> Option<Rule> {
        self.rules.get(rule_id).map(|r| r.rule.clone())
    }

    /// 检查规则是否存在
    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.contains_key(rule_id)
    }

    /// 获取所有规则 ID（按执行顺序）
    pub fn list_ids(&self) -> Vec<String> {
        self.sorted().into_iter().map(|rule| rule.id).collect()
    }

    /// 按执行顺序返回全部规则
    ///
    /// `order` 升序，同序按注册先后
    pub fn sorted(&self) -> Vec<Rule> {
        let mut entries: Vec<StoredRule> = self.rules.iter().map(|r| r.value().clone()).collect();
        entries.sort_by_key(|entry| (entry.rule.order, entry.sequence));
        entries.into_iter().map(|entry| entry.rule).collect()
    }

    /// 批量加载规则
    ///
    /// 单条失败只记录告警，返回成功加载的规则 ID
    #[instrument(skip(self, rules))]
    pub fn load_batch(&self, rules: Vec<Rule>) -> Vec<String> {
        let mut loaded_ids = Vec::with_capacity(rules.len());
        let mut errors = Vec::new();

        for rule in rules {
            let rule_id = rule.id.clone();
            match self.load(rule) {
                Ok(()) => loaded_ids.push(rule_id),
                Err(e) => errors.push((rule_id, e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {:?}", errors);
        }

        info!("批量加载完成: {} 成功, {} 失败", loaded_ids.len(), errors.len());
        loaded_ids
    }

    /// 清空所有规则
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rules.len();
        self.rules.clear();
        info!("已清空 {} 条规则", count);
    }

    /// 获取规则统计信息
    pub fn stats(&self) -> RuleStoreStats {
        let mut stats = RuleStoreStats::default();
        for entry in self.rules.iter() {
            let rule = &entry.rule;
            stats.rules_count += 1;
            if rule.enabled {
                stats.enabled_count += 1;
            }
            stats.total_conditions += rule.conditions.len();
            stats.total_actions += rule.actions.len();
        }
        stats
    }
}

/// 加载前校验：ID 与每个条件、动作的类型都不能为空
fn validate(rule: &Rule) -> Result<()> {
    if rule.id.trim().is_empty() {
        return Err(RuleError::ParseError("规则 ID 不能为空".to_string()));
    }

    if let Some(index) = rule
        .conditions
        .iter()
        .position(|c| c.condition_type.trim().is_empty())
    {
        return Err(RuleError::ParseError(format!(
            "规则 {} 的第 {} 个条件缺少类型",
            rule.id,
            index + 1
        )));
    }

    if let Some(index) = rule
        .actions
        .iter()
        .position(|a| a.action_type.trim().is_empty())
    {
        return Err(RuleError::ParseError(format!(
            "规则 {} 的第 {} 个动作缺少类型",
            rule.id,
            index + 1
        )));
    }

    Ok(())
}

/// 规则存储统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleStoreStats {
    /// 规则总数
    pub rules_count: usize,
    /// 启用的规则数
    pub enabled_count: usize,
    /// 所有规则的条件总数
    pub total_conditions: usize,
    /// 所有规则的动作总数
    pub total_actions: usize,
}
