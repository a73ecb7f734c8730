//! 条件
//!
//! 条件包装一份不可变的条件描述，从上下文取出实际值，
//! 替换期望值中的占位符后交给比较器判断。

pub mod builtin;
pub mod custom;
pub mod field_match;

use crate::comparator::ValueComparator;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::models::{ConditionDescriptor, ExpectedValue};
use serde_json::Value;
use std::sync::Arc;

pub use builtin::{ContextPathCondition, DayOfWeekCondition, EntityCondition};
pub use custom::{CallbackCondition, ConditionCallback};

/// 条件工厂：由描述构造条件实例，配置错误在构造时返回
pub type ConditionFactory =
    Arc<dyn Fn(&ConditionDescriptor) -> Result<Box<dyn Condition>> + Send + Sync>;

/// 条件 Trait
///
/// 具体条件只需提供描述和实际值的获取方式；
/// 需要多字段匹配等特殊比较逻辑的条件可以覆盖 `compare`。
pub trait Condition: Send + Sync {
    /// 条件的描述
    fn descriptor(&self) -> &ConditionDescriptor;

    /// 从上下文获取实际值
    ///
    /// 可能触发上下文数据段的惰性加载；错误不在此处吞掉，由引擎统一处理
    fn actual_value(&self, ctx: &ExecutionContext) -> anyhow::Result<Value>;

    /// 稳定的类型标识
    fn condition_type(&self) -> &str {
        &self.descriptor().condition_type
    }

    /// 比较实际值与单个期望值
    fn compare(&self, actual: &Value, expected: &Value) -> bool {
        ValueComparator::compare(actual, expected, &self.descriptor().operator)
    }

    /// 判断条件是否成立
    fn matches(&self, ctx: &ExecutionContext) -> Result<bool> {
        evaluate(self, ctx)
    }
}

/// 条件评估的通用流程
///
/// 1. 获取实际值
/// 2. 期望值为数组时逐个替换占位符并比较，按 match_type 组合
/// 3. 否则替换字符串期望值中的占位符后比较
pub fn evaluate<C>(condition: &C, ctx: &ExecutionContext) -> Result<bool>
where
    C: Condition + ?Sized,
{
    let actual = condition.actual_value(ctx)?;

    let matched = match condition.descriptor().expected() {
        ExpectedValue::List { values, match_type } => {
            let results: Vec<bool> = values
                .iter()
                .map(|expected| condition.compare(&actual, &resolve_expected(expected, ctx)))
                .collect();
            match_type.aggregate(&results)
        }
        ExpectedValue::Scalar(expected) => {
            condition.compare(&actual, &resolve_expected(&expected, ctx))
        }
        ExpectedValue::Absent => condition.compare(&actual, &Value::Null),
    };

    Ok(matched)
}

/// 只替换字符串期望值中的占位符
fn resolve_expected(expected: &Value, ctx: &ExecutionContext) -> Value {
    match expected {
        Value::String(s) => Value::String(ctx.resolve(s)),
        other => other.clone(),
    }
}
