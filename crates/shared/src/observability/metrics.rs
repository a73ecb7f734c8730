//! 指标模块
//!
//! 基于 metrics crate 的门面 API 记录规则引擎的执行指标。
//! 导出方式由宿主安装的 recorder 决定。

/// 注册指标描述
///
/// 这些描述会出现在导出端（如 Prometheus）的 HELP 注释中
pub fn describe() {
    metrics::describe_counter!("rule_engine_executions_total", "Total number of engine passes");
    metrics::describe_counter!("rule_engine_rules_processed_total", "Rules visited by the engine");
    metrics::describe_counter!(
        "rule_engine_rules_skipped_total",
        "Rules skipped for missing packages"
    );
    metrics::describe_counter!("rule_engine_rules_matched_total", "Rules whose conditions matched");
    metrics::describe_counter!(
        "rule_engine_actions_executed_total",
        "Actions executed successfully"
    );
    metrics::describe_counter!("rule_engine_item_failures_total", "Condition and action failures");
    metrics::describe_histogram!(
        "rule_engine_execution_duration_seconds",
        "Engine pass duration in seconds"
    );
}

/// 记录一次引擎执行
#[inline]
pub fn record_rule_execution(
    processed: u64,
    skipped: u64,
    matched: u64,
    actions_executed: u64,
    duration_secs: f64,
) {
    metrics::counter!("rule_engine_executions_total").increment(1);
    metrics::counter!("rule_engine_rules_processed_total").increment(processed);
    metrics::counter!("rule_engine_rules_skipped_total").increment(skipped);
    metrics::counter!("rule_engine_rules_matched_total").increment(matched);
    metrics::counter!("rule_engine_actions_executed_total").increment(actions_executed);
    metrics::histogram!("rule_engine_execution_duration_seconds").record(duration_secs);
}

/// 记录条件或动作的失败
#[inline]
pub fn record_item_failure(kind: &str, item_type: &str, count: u64) {
    metrics::counter!(
        "rule_engine_item_failures_total",
        "kind" => kind.to_string(),
        "type" => item_type.to_string()
    )
    .increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        describe();
        record_rule_execution(3, 1, 1, 2, 0.001);
        record_item_failure("condition", "request_url", 1);
        record_item_failure("action", "redirect", 2);
    }
}
