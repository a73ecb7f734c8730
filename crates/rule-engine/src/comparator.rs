//! 值比较器
//!
//! 实现全部比较操作符的语义。比较遵循宽松类型规则：
//! 相等与集合判断按字符串形式比较，数值比较要求两侧都是数值或数值字符串，
//! 布尔比较按真值判断。

use crate::operators::Operator;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::warn;

/// 数值字符串格式：可选空白、符号、小数、指数
static NUMERIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?\s*$").unwrap()
});

/// `/pattern/flags` 中允许出现的修饰符
const REGEX_FLAGS: &str = "imsxuUAD";

/// 值比较器
pub struct ValueComparator;

impl ValueComparator {
    /// 按操作符文本比较
    ///
    /// 操作符大小写不敏感；无法识别的操作符记录告警并返回 false
    pub fn compare(actual: &Value, expected: &Value, operator: &str) -> bool {
        match operator.parse::<Operator>() {
            Ok(op) => Self::compare_with(actual, expected, op),
            Err(_) => {
                warn!(operator = %operator, "未知的比较操作符，按不匹配处理");
                false
            }
        }
    }

    /// 按已解析的操作符比较
    pub fn compare_with(actual: &Value, expected: &Value, operator: Operator) -> bool {
        match operator {
            Operator::Eq => Self::equals(actual, expected),
            Operator::Neq => !Self::equals(actual, expected),
            Operator::Gt => Self::numeric(actual, expected, |a, b| a > b),
            Operator::Gte => Self::numeric(actual, expected, |a, b| a >= b),
            Operator::Lt => Self::numeric(actual, expected, |a, b| a < b),
            Operator::Lte => Self::numeric(actual, expected, |a, b| a <= b),
            Operator::Like => Self::like(actual, expected),
            Operator::NotLike => !Self::like(actual, expected),
            Operator::Regexp => Self::regexp(actual, expected),
            Operator::In => Self::in_list(actual, expected),
            Operator::NotIn => !Self::in_list(actual, expected),
            Operator::Exists => exists(actual),
            Operator::NotExists => !exists(actual),
            Operator::Is => is_truthy(actual) == is_truthy(expected),
            Operator::IsNot => is_truthy(actual) != is_truthy(expected),
        }
    }

    /// 字符串形式相等
    fn equals(actual: &Value, expected: &Value) -> bool {
        to_php_string(actual) == to_php_string(expected)
    }

    /// 数值比较，任一侧不是数值时返回 false
    fn numeric<F>(actual: &Value, expected: &Value, cmp: F) -> bool
    where
        F: Fn(f64, f64) -> bool,
    {
        match (as_numeric(actual), as_numeric(expected)) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => false,
        }
    }

    /// 通配符匹配（大小写不敏感，整串匹配）
    fn like(actual: &Value, expected: &Value) -> bool {
        let pattern = to_php_string(expected);
        match wildcard_regex(&pattern) {
            Ok(regex) => regex.is_match(&to_php_string(actual)),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "通配符模式编译失败");
                false
            }
        }
    }

    /// 正则匹配
    ///
    /// `/.../flags` 形式按正则处理，其余按通配符模式处理
    fn regexp(actual: &Value, expected: &Value) -> bool {
        let pattern = to_php_string(expected);
        let compiled = match split_delimited(&pattern) {
            Some((body, flags)) => delimited_regex(body, flags),
            None => wildcard_regex(&pattern),
        };

        match compiled {
            Ok(regex) => regex.is_match(&to_php_string(actual)),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "正则表达式编译失败");
                false
            }
        }
    }

    /// 集合包含检查，期望值先转换为列表
    fn in_list(actual: &Value, expected: &Value) -> bool {
        let needle = to_php_string(actual);
        to_list(expected)
            .iter()
            .any(|item| to_php_string(item) == needle)
    }
}

/// 将通配符模式编译为正则：`*` 匹配任意个字符，`?` 匹配单个字符
pub fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let body = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");

    RegexBuilder::new(&format!("^{}$", body))
        .case_insensitive(true)
        .build()
}

/// 拆分 `/body/flags`，不是定界形式时返回 None
fn split_delimited(pattern: &str) -> Option<(&str, &str)> {
    let rest = pattern.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let (body, flags) = (&rest[..end], &rest[end + 1..]);

    if flags.chars().all(|c| REGEX_FLAGS.contains(c)) {
        Some((body, flags))
    } else {
        None
    }
}

fn delimited_regex(body: &str, flags: &str) -> Result<Regex, regex::Error> {
    let source = if flags.contains('A') {
        format!("^(?:{})", body)
    } else {
        body.to_string()
    };

    RegexBuilder::new(&source)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .swap_greed(flags.contains('U'))
        .build()
}

/// 值的字符串形式
///
/// null -> ""，true -> "1"，false -> ""，整数原样，浮点数取最短表示，
/// 数组与对象序列化为 JSON
pub fn to_php_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) => f.to_string(),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// 数值或数值字符串转换为 f64
pub fn as_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if NUMERIC_PATTERN.is_match(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 真值判断：null、false、0、0.0、""、"0"、空数组与空对象为假
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(obj) => !obj.is_empty(),
    }
}

/// 存在性判断：真值，或字符串 "0"，或整数 0
pub fn exists(value: &Value) -> bool {
    if is_truthy(value) {
        return true;
    }

    match value {
        Value::String(s) => s == "0",
        Value::Number(n) => !n.is_f64() && n.as_i64() == Some(0),
        _ => false,
    }
}

/// 是否为标量（字符串、数值、布尔）
pub fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// 将期望值转换为列表：数组取元素，对象取值，null 为空，其余包装为单元素
pub fn to_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(arr) => arr.clone(),
        Value::Object(obj) => obj.values().cloned().collect(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}
