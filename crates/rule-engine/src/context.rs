//! 执行上下文
//!
//! 惰性、带记忆的键值树。每个顶层键可以注册一个提供者，
//! 提供者在该键首次被访问时执行且最多执行一次，返回的部分树深度合并进数据树。
//! 路径使用点号分隔，如 `request.headers.user-agent`。

use crate::placeholder::PlaceholderResolver;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// 上下文提供者：返回以顶层键为根的部分树，如 `{"request": {...}}`
pub type Provider = Arc<dyn Fn() -> anyhow::Result<Value> + Send + Sync>;

#[derive(Default)]
struct ContextState {
    data: Map<String, Value>,
    loaded: HashSet<String>,
}

/// 执行上下文
///
/// 每次请求创建一个实例，执行结束后取快照并丢弃。
/// 提供者失败时记录告警，对应数据段在整个生命周期内保持缺失，不重试。
pub struct ExecutionContext {
    state: Mutex<ContextState>,
    providers: Mutex<HashMap<String, Provider>>,
    placeholders: Arc<PlaceholderResolver>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ContextState::default()),
            providers: Mutex::new(HashMap::new()),
            placeholders: Arc::new(PlaceholderResolver::default()),
        }
    }

    /// 以已有数据创建上下文（数据视为已物化，但不标记任何键为已加载）
    pub fn from_value(data: Value) -> Self {
        let ctx = Self::new();
        if let Value::Object(map) = data {
            ctx.state.lock().data = map;
        }
        ctx
    }

    /// 指定占位符解析器
    pub fn with_placeholders(mut self, resolver: Arc<PlaceholderResolver>) -> Self {
        self.placeholders = resolver;
        self
    }

    /// 注册提供者，覆盖同名键的旧提供者
    pub fn register_provider<F>(&self, key: impl Into<String>, provider: F) -> &Self
    where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.providers.lock().insert(key.into(), Arc::new(provider));
        self
    }

    /// 加载顶层键
    ///
    /// 幂等：已加载的键直接返回。执行提供者之前先标记为已加载，
    /// 防止提供者之间相互触发造成循环。
    pub fn load(&self, key: &str) -> &Self {
        if !self.state.lock().loaded.insert(key.to_string()) {
            return self;
        }

        let provider = self.providers.lock().get(key).cloned();
        let Some(provider) = provider else {
            return self;
        };

        match provider() {
            Ok(Value::Object(partial)) => {
                merge_distinct(&mut self.state.lock().data, partial);
                debug!(key = %key, "上下文数据段已加载");
            }
            Ok(other) => {
                warn!(key = %key, returned = %other, "上下文提供者返回的不是对象，已忽略");
            }
            Err(e) => {
                warn!(key = %key, error = %e, "上下文提供者执行失败");
            }
        }

        self
    }

    /// 顶层键是否已加载
    pub fn is_loaded(&self, key: &str) -> bool {
        self.state.lock().loaded.contains(key)
    }

    /// 获取路径对应的值
    ///
    /// 自动加载路径的第一段；任意一段缺失或遇到非容器值时返回 None。
    /// 数组可以用数字下标访问，如 `post.categories.0.slug`。
    pub fn get(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        self.load(first);

        let state = self.state.lock();
        let mut current = state.data.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current.clone())
    }

    /// 获取路径对应的值，缺失时返回默认值
    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).unwrap_or(default)
    }

    /// 路径存在且不为 null
    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some_and(|v| !v.is_null())
    }

    /// 设置路径对应的值，按需创建中间对象并覆盖叶子
    pub fn set(&self, path: &str, value: Value) -> &Self {
        let segments: Vec<&str> = path.split('.').collect();
        set_path(&mut self.state.lock().data, &segments, value);
        self
    }

    /// 替换字符串中的 `{category.path}` 占位符
    pub fn resolve(&self, template: &str) -> String {
        self.placeholders.resolve(template, self)
    }

    /// 递归替换 JSON 值中字符串的占位符
    pub fn resolve_value(&self, value: &Value) -> Value {
        self.placeholders.resolve_value(value, self)
    }

    /// 当前已物化数据的快照，不触发任何加载
    pub fn snapshot(&self) -> Value {
        Value::Object(self.state.lock().data.clone())
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ExecutionContext")
            .field("data", &state.data)
            .field("loaded", &state.loaded)
            .field("providers", &self.providers.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// 沿路径写入叶子，中间节点不存在或不是对象时替换为对象
fn set_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            map.insert(leaf.to_string(), value);
        }
        [head, rest @ ..] => match map.entry(head.to_string()).or_insert(Value::Null) {
            Value::Object(child) => set_path(child, rest, value),
            slot => {
                let mut child = Map::new();
                set_path(&mut child, rest, value);
                *slot = Value::Object(child);
            }
        },
    }
}

/// 深度合并：对象递归合并，其余值后者覆盖前者
pub fn merge_distinct(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, incoming) in source {
        if let Value::Object(incoming_map) = incoming {
            if let Some(Value::Object(existing)) = target.get_mut(&key) {
                merge_distinct(existing, incoming_map);
                continue;
            }
            target.insert(key, Value::Object(incoming_map));
        } else {
            target.insert(key, incoming);
        }
    }
}
