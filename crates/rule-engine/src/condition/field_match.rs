//! 多字段匹配
//!
//! 作者、分类、标签等实体可以通过 ID、slug 或名称中的任意一个被匹配。
//! 肯定型操作符要求任一实体的任一字段命中；否定型操作符取反。
//! 实体不存在时，否定型操作符视为成立，肯定型操作符视为不成立。

use crate::comparator::ValueComparator;
use crate::operators::Operator;
use serde_json::{Map, Value};
use tracing::warn;

/// 候选字段集合
#[derive(Debug, Clone, Copy)]
pub struct FieldSet {
    fields: &'static [&'static str],
}

/// 常见的 ID / slug / 名称组合
pub const ID_SLUG_NAME: FieldSet = FieldSet::new(&["id", "slug", "name"]);

impl FieldSet {
    pub const fn new(fields: &'static [&'static str]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.fields
    }

    /// 用操作符比较实体集合与期望值
    ///
    /// `entities` 可以是单个对象、对象数组或 null
    pub fn matches(&self, entities: &Value, expected: &Value, operator: &str) -> bool {
        let operator = match operator.parse::<Operator>() {
            Ok(op) => op,
            Err(_) => {
                warn!(operator = %operator, "未知的比较操作符，按不匹配处理");
                return false;
            }
        };

        let entities = entity_list(entities);
        if entities.is_empty() {
            return operator.is_negative();
        }

        let positive = operator.positive();
        let found = entities.iter().any(|entity| {
            self.fields
                .iter()
                .filter_map(|field| entity.get(*field))
                .any(|candidate| ValueComparator::compare_with(candidate, expected, positive))
        });

        if operator.is_negative() { !found } else { found }
    }
}

fn entity_list(entities: &Value) -> Vec<&Map<String, Value>> {
    match entities {
        Value::Object(map) => vec![map],
        Value::Array(arr) => arr.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}
