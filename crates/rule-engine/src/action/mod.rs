//! 动作
//!
//! 规则匹配后按顺序执行的副作用。动作可以在执行前用上下文替换配置中的占位符。

pub mod builtin;
pub mod custom;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::models::ActionDescriptor;
use std::sync::Arc;

pub use builtin::{
    BlockAction, CacheAction, LogAction, RedirectAction, SetContextAction, SetHeaderAction,
};
pub use custom::{ActionCallback, CallbackAction};

/// 动作 Trait
pub trait Action: Send + Sync {
    /// 动作的描述
    fn descriptor(&self) -> &ActionDescriptor;

    /// 稳定的类型标识，也是动作锁定的粒度
    fn action_type(&self) -> &str {
        &self.descriptor().action_type
    }

    /// 执行动作
    fn execute(&self, ctx: &ExecutionContext) -> Result<()>;
}

/// 动作工厂：由描述构造动作实例，配置错误在构造时返回
pub type ActionFactory = Arc<dyn Fn(&ActionDescriptor) -> Result<Box<dyn Action>> + Send + Sync>;
