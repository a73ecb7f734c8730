//! 规则匹配与动作分发引擎
//!
//! 开发者以 `when(条件) -> then(动作)` 的形式声明规则，请求到来时引擎在惰性构建的
//! 上下文上评估条件，并对匹配的规则立即、按顺序执行动作。提供：
//! - 宽松类型的比较操作符（通配符、正则、集合、存在性等）
//! - 惰性、带记忆的执行上下文与 `{category.path}` 占位符
//! - 可注册的条件/动作组件与包依赖解析
//! - 跨规则的动作类型锁定与执行统计
//!
//! ```ignore
//! use rule_engine::{Actions, ComponentRegistry, Conditions, RuleBuilder, RuleEngine, RuleStore};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ComponentRegistry::with_defaults());
//! let store = RuleStore::new();
//! store.load(
//!     RuleBuilder::new("block-xmlrpc")
//!         .when(Conditions::new().request_url("/xmlrpc.php"))
//!         .then(Actions::new().block("XML-RPC disabled"))
//!         .build(),
//! )?;
//!
//! let ctx = registry.new_context();
//! ctx.register_provider("request", || Ok(serde_json::json!({"request": {"path": "/xmlrpc.php"}})));
//!
//! let report = RuleEngine::new(registry).execute(&store.sorted(), &ctx, None);
//! ```

pub mod action;
pub mod builder;
pub mod comparator;
pub mod condition;
pub mod context;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod operators;
pub mod package;
pub mod placeholder;
pub mod registry;
pub mod store;

pub use action::Action;
pub use builder::{Actions, Conditions, RuleBuilder};
pub use comparator::ValueComparator;
pub use condition::Condition;
pub use context::ExecutionContext;
pub use engine::RuleEngine;
pub use error::{Result, RuleError};
pub use models::{
    ActionDescriptor, ConditionDescriptor, ErrorSummary, ExecutionReport, ExecutionStats, Rule,
    RuleMetadata,
};
pub use operators::{MatchType, Operator};
pub use package::{Package, PackageRegistry};
pub use placeholder::PlaceholderResolver;
pub use registry::ComponentRegistry;
pub use store::{RuleStore, RuleStoreStats};
