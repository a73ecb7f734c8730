//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("无效的操作符: {0}")]
    InvalidOperator(String),

    #[error("未知的条件类型: {0}")]
    UnknownConditionType(String),

    #[error("未知的动作类型: {0}")]
    UnknownActionType(String),

    #[error("缺少必填字段: {item_type}.{field}")]
    MissingField { item_type: String, field: String },

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("包未注册: {0}")]
    MissingPackage(String),

    #[error("包依赖存在循环: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("运行时错误: {0}")]
    Runtime(#[from] anyhow::Error),
}

impl RuleError {
    /// 缺少必填字段
    pub fn missing_field(item_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            item_type: item_type.into(),
            field: field.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
