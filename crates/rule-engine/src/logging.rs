//! 引擎日志
//!
//! 两种日志通道：
//!
//! - 聚合：条件与动作的失败可能在每个请求中大量重复，先按 `类别:类型` 计数，
//!   在一次执行结束时每个键只输出一条汇总告警
//! - 限流：包缺失、动作锁冲突等即时告警，在窗口期内相同消息只输出一次（窗口为 0 时不限流）

use crate::models::ErrorSummary;
use ruleflow_shared::observability::metrics;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::warn;

/// 失败项类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemKind {
    Condition,
    Action,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Condition => "condition",
            Self::Action => "action",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Pending {
    count: u64,
    last_message: String,
}

/// 错误聚合器
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    pending: BTreeMap<(ItemKind, String), Pending>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次失败
    pub fn record(&mut self, kind: ItemKind, item_type: &str, message: impl Into<String>) {
        let message = message.into();
        self.pending
            .entry((kind, item_type.to_string()))
            .and_modify(|entry| {
                entry.count += 1;
                entry.last_message.clone_from(&message);
            })
            .or_insert(Pending {
                count: 1,
                last_message: message,
            });
    }

    /// 待输出的失败总次数
    pub fn pending_count(&self) -> u64 {
        self.pending.values().map(|entry| entry.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 输出汇总告警并清空
    ///
    /// 每个键一条告警，同时累加失败计数指标
    pub fn flush(&mut self) -> Vec<ErrorSummary> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|((kind, item_type), entry)| {
                let key = format!("{}:{}", kind, item_type);
                warn!(
                    key = %key,
                    count = entry.count,
                    last_error = %entry.last_message,
                    "规则组件执行失败"
                );
                metrics::record_item_failure(kind.as_str(), &item_type, entry.count);

                ErrorSummary {
                    key,
                    count: entry.count,
                    last_message: entry.last_message,
                }
            })
            .collect()
    }
}

/// 按消息内容限流
#[derive(Debug)]
pub struct LogRateLimiter {
    window: Duration,
    last_logged: HashMap<String, Instant>,
}

impl LogRateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_logged: HashMap::new(),
        }
    }

    /// 不限流
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        !self.window.is_zero()
    }

    /// 判断消息是否应该输出，输出时记录时间
    pub fn allow(&mut self, message: &str) -> bool {
        self.allow_at(message, Instant::now())
    }

    fn allow_at(&mut self, message: &str, now: Instant) -> bool {
        if !self.is_enabled() {
            return true;
        }

        match self.last_logged.get(message) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                self.last_logged.insert(message.to_string(), now);
                true
            }
        }
    }

    /// 清除已过期的记录
    pub fn prune(&mut self) {
        self.prune_at(Instant::now());
    }

    fn prune_at(&mut self, now: Instant) {
        let window = self.window;
        self.last_logged
            .retain(|_, last| now.duration_since(*last) < window);
    }

    /// 仍在抑制窗口内记录的消息数
    pub fn tracked(&self) -> usize {
        self.last_logged.len()
    }
}

impl Default for LogRateLimiter {
    fn default() -> Self {
        Self::disabled()
    }
}
