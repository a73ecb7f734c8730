//! 规则操作符定义

use crate::error::RuleError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // 字符串相等
    Eq,
    Neq,

    // 数值比较
    Gt,
    Gte,
    Lt,
    Lte,

    // 通配符 / 正则
    Like,
    NotLike,
    Regexp,

    // 集合
    In,
    NotIn,

    // 存在性
    Exists,
    NotExists,

    // 布尔
    Is,
    IsNot,
}

impl Operator {
    /// 操作符的规范文本形式
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::Regexp => "REGEXP",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Exists => "EXISTS",
            Self::NotExists => "NOT EXISTS",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
        }
    }

    /// 是否为否定型操作符
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            Self::Neq | Self::NotLike | Self::NotIn | Self::NotExists | Self::IsNot
        )
    }

    /// 否定型操作符对应的肯定形式，其余原样返回
    pub fn positive(&self) -> Self {
        match self {
            Self::Neq => Self::Eq,
            Self::NotLike => Self::Like,
            Self::NotIn => Self::In,
            Self::NotExists => Self::Exists,
            Self::IsNot => Self::Is,
            other => *other,
        }
    }

    /// 根据期望值推断操作符
    ///
    /// 数组 -> IN，布尔 -> IS，null -> EXISTS，
    /// 含 `*` 或 `?` 的字符串 -> LIKE，以 `/` 开头的字符串 -> REGEXP，其余 -> =
    pub fn detect(value: &Value) -> Self {
        match value {
            Value::Array(_) => Self::In,
            Value::Bool(_) => Self::Is,
            Value::Null => Self::Exists,
            Value::String(s) if s.contains('*') || s.contains('?') => Self::Like,
            Value::String(s) if s.starts_with('/') => Self::Regexp,
            _ => Self::Eq,
        }
    }
}

impl FromStr for Operator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_uppercase().as_str() {
            "=" => Self::Eq,
            "!=" => Self::Neq,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            "LIKE" => Self::Like,
            "NOT LIKE" => Self::NotLike,
            "REGEXP" => Self::Regexp,
            "IN" => Self::In,
            "NOT IN" => Self::NotIn,
            "EXISTS" => Self::Exists,
            "NOT EXISTS" => Self::NotExists,
            "IS" => Self::Is,
            "IS NOT" => Self::IsNot,
            _ => return Err(RuleError::InvalidOperator(s.to_string())),
        };
        Ok(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 多值匹配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// 全部为真（AND）
    #[default]
    All,
    /// 至少一个为真（OR）
    Any,
    /// 全部为假（NOR）
    None,
}

impl MatchType {
    /// 聚合一组布尔结果
    ///
    /// 空集合：All -> true，None -> true，Any -> false
    pub fn aggregate(&self, results: &[bool]) -> bool {
        match self {
            Self::All => !results.contains(&false),
            Self::Any => results.contains(&true),
            Self::None => !results.contains(&true),
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Any => write!(f, "any"),
            Self::None => write!(f, "none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_is_case_insensitive_and_trimmed() {
        assert_eq!(" like ".parse::<Operator>().unwrap(), Operator::Like);
        assert_eq!("not in".parse::<Operator>().unwrap(), Operator::NotIn);
        assert_eq!("Is Not".parse::<Operator>().unwrap(), Operator::IsNot);
        assert!("CONTAINS".parse::<Operator>().is_err());
    }

    #[test]
    fn test_detect() {
        assert_eq!(Operator::detect(&json!(["a", "b"])), Operator::In);
        assert_eq!(Operator::detect(&json!(true)), Operator::Is);
        assert_eq!(Operator::detect(&json!(null)), Operator::Exists);
        assert_eq!(Operator::detect(&json!("/admin/*")), Operator::Like);
        assert_eq!(Operator::detect(&json!("/^\\/wp-/")), Operator::Regexp);
        assert_eq!(Operator::detect(&json!("GET")), Operator::Eq);
        assert_eq!(Operator::detect(&json!(42)), Operator::Eq);
    }

    #[test]
    fn test_negative_operators() {
        assert!(Operator::NotIn.is_negative());
        assert_eq!(Operator::NotIn.positive(), Operator::In);
        assert!(!Operator::Like.is_negative());
        assert_eq!(Operator::Gt.positive(), Operator::Gt);
    }

    #[test]
    fn test_match_type_empty_policy() {
        assert!(MatchType::All.aggregate(&[]));
        assert!(!MatchType::Any.aggregate(&[]));
        assert!(MatchType::None.aggregate(&[]));
    }

    #[test]
    fn test_match_type_aggregate() {
        assert!(!MatchType::All.aggregate(&[true, false]));
        assert!(MatchType::Any.aggregate(&[false, true]));
        assert!(MatchType::None.aggregate(&[false, false]));
        assert!(!MatchType::None.aggregate(&[false, true]));
    }
}
