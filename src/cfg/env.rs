//! 环境变量覆盖
//!
//! 配置树中的每个叶子路径都会映射到一个环境变量名：
//! 路径各段（前面加上前缀和子配置名）用分隔符连接后转为大写，
//! 例如 `["databaseConfig", "host"]` 对应 `DATABASECONFIG_HOST`

use serde_json::{Map, Number, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// 环境变量查询函数
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// 没有类型模板的叶子（例如 `Option<String>` 字段，默认值为 null）如何转换环境变量的值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Untyped {
    /// 保留原始字符串
    Raw,
    /// 按 YAML 标量推断为数字、布尔值或数组
    Infer,
}

/// 环境变量覆盖器
///
/// # 示例
/// ```
/// use rustx_conf::cfg::{EnvOverlay, Untyped};
///
/// let overlay = EnvOverlay::new("_").with_lookup(|key| {
///     (key == "DATABASECONFIG_HOST").then(|| "example.com".to_string())
/// });
///
/// let mut tree = serde_json::json!({"databaseConfig": {"host": "localhost", "port": 5432}});
/// overlay.apply(&mut tree, &serde_json::Value::Null, &[], Untyped::Raw);
/// assert_eq!(tree["databaseConfig"]["host"], "example.com");
/// assert_eq!(tree["databaseConfig"]["port"], 5432);
/// ```
#[derive(Clone)]
pub struct EnvOverlay {
    prefix: String,
    delimiter: String,
    lookup: EnvLookup,
}

impl EnvOverlay {
    /// 使用进程环境变量创建
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            prefix: String::new(),
            delimiter: delimiter.into(),
            lookup: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    /// 环境变量名前缀，例如 `APP` 对应 `APP_DATABASECONFIG_HOST`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// 替换环境变量查询函数
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Arc::new(lookup);
        self
    }

    pub fn with_shared_lookup(mut self, lookup: EnvLookup) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 计算路径对应的环境变量名
    pub fn env_key<S: AsRef<str>>(&self, path: &[S]) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(path.len() + 1);
        if !self.prefix.is_empty() {
            parts.push(&self.prefix);
        }
        parts.extend(path.iter().map(|s| s.as_ref()));
        parts.join(self.delimiter.as_str()).to_uppercase()
    }

    /// 用环境变量覆盖配置树
    ///
    /// - `tree`: 从配置源解码（并提取子配置）后的树
    /// - `skeleton`: 目标类型默认值序列化后的树，用于发现配置源中没有出现的键
    /// - `base`: 子配置路径，参与环境变量名计算
    /// - `untyped`: 没有类型模板的叶子的转换方式
    ///
    /// 返回实际生效的环境变量数量
    pub fn apply(
        &self,
        tree: &mut JsonValue,
        skeleton: &JsonValue,
        base: &[&str],
        untyped: Untyped,
    ) -> usize {
        if tree.is_null() {
            *tree = JsonValue::Object(Map::new());
        }
        if !tree.is_object() {
            return 0;
        }

        // 配置源中的值优先作为类型模板
        let mut leaves: BTreeMap<Vec<String>, JsonValue> = BTreeMap::new();
        collect_leaves(skeleton, &mut Vec::new(), &mut leaves);
        collect_leaves(tree, &mut Vec::new(), &mut leaves);

        let mut applied = 0;
        for (path, template) in leaves {
            let mut full: Vec<&str> = base.to_vec();
            full.extend(path.iter().map(String::as_str));

            if let Some(raw) = (self.lookup)(&self.env_key(full.as_slice())) {
                set_path(tree, &path, coerce(raw, &template, untyped));
                applied += 1;
            }
        }
        applied
    }
}

impl fmt::Debug for EnvOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvOverlay")
            .field("prefix", &self.prefix)
            .field("delimiter", &self.delimiter)
            .finish_non_exhaustive()
    }
}

/// 收集所有叶子路径，对象以外的值（包括数组和 null）都视为叶子
fn collect_leaves(
    value: &JsonValue,
    prefix: &mut Vec<String>,
    out: &mut BTreeMap<Vec<String>, JsonValue>,
) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                prefix.push(key.clone());
                collect_leaves(child, prefix, out);
                prefix.pop();
            }
        }
        leaf if !prefix.is_empty() => {
            out.insert(prefix.clone(), leaf.clone());
        }
        _ => {}
    }
}

/// 按路径写入，中间节点不存在或不是对象时替换为对象
fn set_path(tree: &mut JsonValue, path: &[String], value: JsonValue) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut node = tree;
    for key in parents {
        let map = ensure_object(node);
        node = map
            .entry(key.clone())
            .or_insert_with(|| JsonValue::Object(Map::new()));
    }
    ensure_object(node).insert(last.clone(), value);
}

fn ensure_object(node: &mut JsonValue) -> &mut Map<String, JsonValue> {
    if !node.is_object() {
        *node = JsonValue::Object(Map::new());
    }
    match node {
        JsonValue::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

/// 按模板类型转换环境变量的值，转换失败时保留原始字符串，由反序列化报告类型错误
fn coerce(raw: String, template: &JsonValue, untyped: Untyped) -> JsonValue {
    match template {
        JsonValue::String(_) => JsonValue::String(raw),
        JsonValue::Bool(_) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => JsonValue::Bool(true),
            "false" | "0" => JsonValue::Bool(false),
            _ => JsonValue::String(raw),
        },
        JsonValue::Number(_) => parse_number(raw.trim())
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::String(raw)),
        JsonValue::Array(items) => {
            if let Ok(value @ JsonValue::Array(_)) = serde_json::from_str::<JsonValue>(&raw) {
                return value;
            }
            let item_template = items.first().cloned().unwrap_or(JsonValue::Null);
            JsonValue::Array(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| coerce(s.to_string(), &item_template, untyped))
                    .collect(),
            )
        }
        _ => match untyped {
            Untyped::Raw => JsonValue::String(raw),
            Untyped::Infer => infer(raw),
        },
    }
}

fn parse_number(s: &str) -> Option<Number> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(n.into());
    }
    if let Ok(n) = s.parse::<u64>() {
        return Some(n.into());
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

/// 没有类型模板时按 YAML 标量推断
fn infer(raw: String) -> JsonValue {
    match serde_yaml::from_str::<JsonValue>(&raw) {
        Ok(value @ (JsonValue::Bool(_) | JsonValue::Number(_) | JsonValue::Array(_))) => value,
        _ => JsonValue::String(raw),
    }
}
