//! 结构化配置读取器
//!
//! 读取流程：配置源解码 → 提取子配置 → 补齐默认值 → 环境变量覆盖 → 反序列化为目标类型

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::PathBuf;

use super::env::{EnvOverlay, Untyped};
use super::error::ConfigError;
use super::source::ConfigSource;

/// 结构化配置读取器
///
/// 配置源中缺少的字段取目标类型 `Default` 中的值，不会报 missing field。
///
/// 子配置名忽略大小写，但结构体字段按 serde 规则区分大小写：
/// 配置中的 `HTTPListener`、`databaseConfig` 这类键需要用 `#[serde(rename = "...")]` 对应
///
/// # 示例
/// ```
/// use rustx_conf::cfg::{ConfigReader, ReaderSource};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Deserialize, Serialize)]
/// struct DatabaseConfig {
///     host: String,
///     port: u16,
/// }
///
/// let data = r#"{"databaseConfig": {"host": "localhost", "port": 5432}}"#;
/// let reader = ConfigReader::new(ReaderSource::from_reader(data.as_bytes(), "json"))
///     .with_env(None);
///
/// let config: DatabaseConfig = reader.unmarshal(Some("databaseConfig")).unwrap();
/// assert_eq!(config.host, "localhost");
/// ```
pub struct ConfigReader {
    source: Box<dyn ConfigSource>,
    env: Option<EnvOverlay>,
    key_delimiter: String,
}

impl ConfigReader {
    /// 创建读取器，默认开启环境变量覆盖，分隔符为 `_`
    pub fn new(source: impl ConfigSource + 'static) -> Self {
        Self::from_boxed(Box::new(source))
    }

    pub fn from_boxed(source: Box<dyn ConfigSource>) -> Self {
        Self {
            source,
            env: Some(EnvOverlay::new("_")),
            key_delimiter: "_".to_string(),
        }
    }

    /// 设置环境变量覆盖，None 表示关闭
    pub fn with_env(mut self, env: Option<EnvOverlay>) -> Self {
        self.env = env;
        self
    }

    /// 子配置嵌套路径的分隔符
    pub fn with_key_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.key_delimiter = delimiter.into();
        self
    }

    pub fn source_name(&self) -> String {
        self.source.name()
    }

    pub fn watch_path(&self) -> anyhow::Result<Option<PathBuf>> {
        self.source.watch_path()
    }

    pub fn env(&self) -> Option<&EnvOverlay> {
        self.env.as_ref()
    }

    /// 读取配置源的当前内容
    pub fn read(&self) -> Result<JsonValue, ConfigError> {
        self.source
            .read()
            .map(|value| value.into_value())
            .map_err(|source| ConfigError::SourceRead {
                source_name: self.source.name(),
                source,
                example: None,
            })
    }

    /// 提取子配置
    ///
    /// 依次尝试精确匹配、忽略大小写匹配、按分隔符拆分的嵌套路径，
    /// 子配置不存在或不是对象时返回 None
    pub fn sub<'a>(tree: &'a JsonValue, section: &str, delimiter: &str) -> Option<&'a JsonValue> {
        let found = lookup_key(tree, section).or_else(|| {
            if delimiter.is_empty() || !section.contains(delimiter) {
                return None;
            }
            section
                .split(delimiter)
                .try_fold(tree, |node, part| lookup_key(node, part))
        })?;

        found.is_object().then_some(found)
    }

    /// 解码为目标类型
    ///
    /// `section` 为 None 或空字符串时解码整个配置。
    /// 没有类型模板的环境变量先按字符串解码，失败后再按推断出的标量类型重试一次
    pub fn unmarshal<T>(&self, section: Option<&str>) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        let section = section.filter(|s| !s.is_empty());
        let mut tree = self.read()?;

        if let Some(section) = section {
            tree = Self::sub(&tree, section, &self.key_delimiter)
                .cloned()
                .ok_or_else(|| ConfigError::SectionNotFound {
                    section: section.to_string(),
                    example: None,
                })?;
        }

        let skeleton = serde_json::to_value(T::default()).unwrap_or_default();
        fill_defaults(&mut tree, &skeleton);

        let decode = |tree: JsonValue| {
            serde_json::from_value::<T>(tree).map_err(|source| ConfigError::Unmarshal {
                section: section.map(str::to_string),
                source,
                example: None,
            })
        };

        let Some(env) = &self.env else {
            return decode(tree);
        };

        let base: Vec<&str> = section.into_iter().collect();
        let mut raw = tree.clone();
        if env.apply(&mut raw, &skeleton, &base, Untyped::Raw) == 0 {
            return decode(raw);
        }

        match decode(raw) {
            Ok(value) => Ok(value),
            Err(err) => {
                env.apply(&mut tree, &skeleton, &base, Untyped::Infer);
                decode(tree).map_err(|_| err)
            }
        }
    }
}

impl fmt::Debug for ConfigReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigReader")
            .field("source", &self.source.name())
            .field("env", &self.env)
            .field("key_delimiter", &self.key_delimiter)
            .finish()
    }
}

/// 用默认值补齐配置树中缺少（或为 null）的键，两边都是对象时递归
fn fill_defaults(tree: &mut JsonValue, defaults: &JsonValue) {
    let (JsonValue::Object(map), JsonValue::Object(defaults)) = (tree, defaults) else {
        return;
    };

    for (key, default) in defaults {
        match map.get_mut(key) {
            Some(value) if !value.is_null() => fill_defaults(value, default),
            _ => {
                map.insert(key.clone(), default.clone());
            }
        }
    }
}

fn lookup_key<'a>(node: &'a JsonValue, key: &str) -> Option<&'a JsonValue> {
    let map = node.as_object()?;
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}
