//! 回调动作

use super::Action;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::models::ActionDescriptor;
use std::fmt;
use std::sync::Arc;

/// 动作回调
pub type ActionCallback =
    Arc<dyn Fn(&ExecutionContext, &ActionDescriptor) -> anyhow::Result<()> + Send + Sync>;

/// 以回调实现的动作
pub struct CallbackAction {
    descriptor: ActionDescriptor,
    name: String,
    callback: ActionCallback,
}

impl CallbackAction {
    pub fn new(
        name: impl Into<String>,
        descriptor: ActionDescriptor,
        callback: ActionCallback,
    ) -> Self {
        Self {
            descriptor,
            name: name.into(),
            callback,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Action for CallbackAction {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    fn action_type(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        (self.callback)(ctx, &self.descriptor)?;
        Ok(())
    }
}

impl fmt::Debug for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackAction")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}
