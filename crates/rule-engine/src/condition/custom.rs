//! 回调条件
//!
//! 通过注册表按名称登记的闭包条件，适合一次性的宿主侧判断逻辑。

use super::Condition;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::models::ConditionDescriptor;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 条件回调
pub type ConditionCallback =
    Arc<dyn Fn(&ExecutionContext, &ConditionDescriptor) -> anyhow::Result<bool> + Send + Sync>;

/// 以回调实现的条件
///
/// 回调直接给出匹配结果，不经过比较器
pub struct CallbackCondition {
    descriptor: ConditionDescriptor,
    name: String,
    callback: ConditionCallback,
}

impl CallbackCondition {
    pub fn new(
        name: impl Into<String>,
        descriptor: ConditionDescriptor,
        callback: ConditionCallback,
    ) -> Self {
        Self {
            descriptor,
            name: name.into(),
            callback,
        }
    }

    /// 回调名称
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Condition for CallbackCondition {
    fn descriptor(&self) -> &ConditionDescriptor {
        &self.descriptor
    }

    fn actual_value(&self, _ctx: &ExecutionContext) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }

    fn matches(&self, ctx: &ExecutionContext) -> Result<bool> {
        Ok((self.callback)(ctx, &self.descriptor)?)
    }
}

impl fmt::Debug for CallbackCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackCondition")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_callback_receives_descriptor() {
        let callback: ConditionCallback = Arc::new(
            |ctx: &ExecutionContext, desc: &ConditionDescriptor| -> anyhow::Result<bool> {
                let threshold = desc.value.as_i64().unwrap_or(0);
                Ok(ctx.get("cart.total").and_then(|v| v.as_i64()).unwrap_or(0) > threshold)
            },
        );

        let ctx = ExecutionContext::from_value(json!({"cart": {"total": 120}}));
        let cond = CallbackCondition::new(
            "cart_over",
            ConditionDescriptor::new("custom", 100).with("name", "cart_over"),
            callback,
        );

        assert!(cond.matches(&ctx).unwrap());
        assert_eq!(cond.name(), "cart_over");
        assert_eq!(cond.condition_type(), "custom");
    }

    #[test]
    fn test_callback_error_propagates() {
        let callback: ConditionCallback = Arc::new(
            |_: &ExecutionContext, _: &ConditionDescriptor| -> anyhow::Result<bool> {
                anyhow::bail!("geo lookup failed")
            },
        );
        let descriptor = ConditionDescriptor::new("geo", Value::Null);
        let cond = CallbackCondition::new("geo", descriptor, callback);

        let err = cond.matches(&ExecutionContext::new()).unwrap_err();
        assert!(err.to_string().contains("geo lookup failed"));
    }
}
