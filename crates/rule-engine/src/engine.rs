//! 规则引擎
//!
//! 按调用方给定的顺序逐条处理规则：
//!
//! 1. 检查规则依赖的包是否可用，缺失则跳过
//! 2. 已停用的规则静默结束（既不计入跳过也不计入匹配）
//! 3. 按 match_type 评估全部条件（不短路）
//! 4. 匹配后依次执行动作，并维护跨规则的动作类型锁
//!
//! 单个条件或动作的失败只影响它自己，`execute` 总是返回统计结果。

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::logging::{ErrorAggregator, ItemKind, LogRateLimiter};
use crate::models::{ActionDescriptor, ConditionDescriptor, ExecutionReport, ExecutionStats, Rule};
use crate::operators::MatchType;
use crate::registry::ComponentRegistry;
use ruleflow_shared::config::EngineConfig;
use ruleflow_shared::observability::metrics;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// 规则引擎
///
/// 每个请求使用独立的引擎实例；注册表可在实例之间共享。
pub struct RuleEngine {
    registry: Arc<ComponentRegistry>,
    stats: ExecutionStats,
    /// 动作类型 -> 锁定它的规则 ID
    locked_actions: HashMap<String, String>,
    available_packages: BTreeSet<String>,
    errors: ErrorAggregator,
    limiter: LogRateLimiter,
    trace_enabled: bool,
}

impl RuleEngine {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            stats: ExecutionStats::default(),
            locked_actions: HashMap::new(),
            available_packages: BTreeSet::new(),
            errors: ErrorAggregator::new(),
            limiter: LogRateLimiter::disabled(),
            trace_enabled: false,
        }
    }

    pub fn with_config(registry: Arc<ComponentRegistry>, config: &EngineConfig) -> Self {
        let mut engine = Self::new(registry);
        engine.limiter =
            LogRateLimiter::new(Duration::from_secs(config.warning_rate_limit_seconds));
        engine.trace_enabled = config.trace_enabled;
        engine
    }

    /// 启用条件评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// 最近一次执行的统计
    pub fn stats(&self) -> ExecutionStats {
        self.stats
    }

    /// 当前生效的动作锁
    pub fn locked_actions(&self) -> &HashMap<String, String> {
        &self.locked_actions
    }

    pub fn available_packages(&self) -> &BTreeSet<String> {
        &self.available_packages
    }

    /// 执行一组规则
    ///
    /// `rules` 必须已经按执行顺序排好；`allowed_packages` 为 None 时
    /// 使用注册表中已加载的包。
    #[instrument(skip_all, fields(rules = rules.len()))]
    pub fn execute(
        &mut self,
        rules: &[Rule],
        ctx: &ExecutionContext,
        allowed_packages: Option<&BTreeSet<String>>,
    ) -> ExecutionReport {
        let start = Instant::now();

        self.stats = ExecutionStats::default();
        self.locked_actions.clear();
        self.limiter.prune();
        self.available_packages = match allowed_packages {
            Some(packages) => packages.clone(),
            None => self.registry.packages().loaded(),
        };

        for rule in rules {
            self.process_rule(rule, ctx);
        }

        let errors = self.errors.flush();
        let stats = self.stats;

        metrics::record_rule_execution(
            stats.rules_processed,
            stats.rules_skipped,
            stats.rules_matched,
            stats.actions_executed,
            start.elapsed().as_secs_f64(),
        );

        debug!(
            processed = stats.rules_processed,
            skipped = stats.rules_skipped,
            matched = stats.rules_matched,
            actions = stats.actions_executed,
            failures = errors.len(),
            "规则执行完成"
        );

        ExecutionReport {
            stats,
            context: ctx.snapshot(),
            errors,
        }
    }

    fn process_rule(&mut self, rule: &Rule, ctx: &ExecutionContext) {
        self.stats.rules_processed += 1;

        let missing: Vec<&str> = rule
            .required_packages()
            .iter()
            .filter(|package| !self.available_packages.contains(package.as_str()))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            self.stats.rules_skipped += 1;
            let message = format!(
                "规则 {} 缺少依赖包 [{}]，可用包 [{}]",
                rule.id,
                missing.join(", "),
                self.available_packages.iter().cloned().collect::<Vec<_>>().join(", ")
            );
            if self.limiter.allow(&message) {
                warn!(rule_id = %rule.id, missing = ?missing, "{}", message);
            }
            return;
        }

        if !rule.enabled {
            return;
        }

        if !self.check_conditions(&rule.conditions, rule.match_type, ctx) {
            return;
        }

        self.stats.rules_matched += 1;
        debug!(rule_id = %rule.id, "规则匹配");

        self.execute_actions(&rule.actions, &rule.id, ctx);
    }

    /// 按 match_type 评估一组条件
    ///
    /// 空集合：all 与 none 成立，any 不成立。
    /// 非空集合先评估全部条件再组合结果；失败的条件计为 false 并进入错误聚合。
    pub fn check_conditions(
        &mut self,
        conditions: &[ConditionDescriptor],
        match_type: MatchType,
        ctx: &ExecutionContext,
    ) -> bool {
        if conditions.is_empty() {
            return match match_type {
                MatchType::All | MatchType::None => true,
                MatchType::Any => false,
            };
        }

        let results: Vec<bool> = conditions
            .iter()
            .map(|descriptor| {
                let matched = match self.evaluate_condition(descriptor, ctx) {
                    Ok(matched) => matched,
                    Err(e) => {
                        let condition_type = descriptor.resolved_type();
                        self.errors
                            .record(ItemKind::Condition, condition_type, e.to_string());
                        false
                    }
                };

                if self.trace_enabled {
                    debug!(
                        condition_type = %descriptor.condition_type,
                        operator = %descriptor.operator,
                        expected = %descriptor.value,
                        matched,
                        "条件评估"
                    );
                }

                matched
            })
            .collect();

        match_type.aggregate(&results)
    }

    fn evaluate_condition(
        &self,
        descriptor: &ConditionDescriptor,
        ctx: &ExecutionContext,
    ) -> Result<bool> {
        self.registry.create_condition(descriptor)?.matches(ctx)
    }

    /// 依次执行动作
    ///
    /// 已被锁定的动作类型跳过；动作成功执行后才会按 `_locked` 标记加锁。
    pub fn execute_actions(
        &mut self,
        actions: &[ActionDescriptor],
        rule_id: &str,
        ctx: &ExecutionContext,
    ) {
        for descriptor in actions {
            let action_type = descriptor.resolved_type();

            if let Some(locked_by) = self.locked_actions.get(action_type) {
                let message = format!(
                    "动作 {} 已被规则 {} 锁定，跳过规则 {} 中的该动作",
                    action_type, locked_by, rule_id
                );
                if self.limiter.allow(&message) {
                    warn!(
                        rule_id = %rule_id,
                        action_type = %action_type,
                        locked_by = %locked_by,
                        "{}",
                        message
                    );
                }
                continue;
            }

            match self.execute_action(descriptor, ctx) {
                Ok(()) => {
                    self.stats.actions_executed += 1;
                    if descriptor.locked {
                        self.locked_actions
                            .insert(action_type.to_string(), rule_id.to_string());
                    }
                }
                Err(e) => {
                    self.errors.record(ItemKind::Action, action_type, e.to_string());
                }
            }
        }
    }

    fn execute_action(&self, descriptor: &ActionDescriptor, ctx: &ExecutionContext) -> Result<()> {
        self.registry.create_action(descriptor)?.execute(ctx)
    }
}
