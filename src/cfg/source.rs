//! 配置源抽象
//!
//! 配置源只负责把原始内容解码成统一的 JSON 树，
//! 子配置提取、环境变量覆盖和反序列化由 ConfigReader 完成

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::path::PathBuf;

/// 配置值包装，提供类型转换能力
///
/// # 示例
/// ```
/// use rustx_conf::cfg::ConfigValue;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct DatabaseConfig {
///     host: String,
///     port: u16,
/// }
///
/// let value = ConfigValue::new(serde_json::json!({"host": "localhost", "port": 5432}));
/// let config: DatabaseConfig = value.into_type().unwrap();
/// assert_eq!(config.port, 5432);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValue(pub JsonValue);

impl ConfigValue {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    /// 空对象
    pub fn empty() -> Self {
        Self(JsonValue::Object(Map::new()))
    }

    /// 转换为指定类型（消费 self）
    pub fn into_type<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.0)?)
    }

    /// 引用方式转换为指定类型
    pub fn as_type<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.0.clone())?)
    }

    pub fn as_value(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_value(self) -> JsonValue {
        self.0
    }
}

/// 配置来源抽象
///
/// 文件、内存数据、纯环境变量等来源都实现此 trait，
/// 用户也可以实现自己的来源并通过 `LoaderBuilder::source` 注入
pub trait ConfigSource: Send + Sync {
    /// 解码配置源的当前内容
    ///
    /// 每次调用都应反映来源的最新状态，文件来源会重新读取磁盘
    fn read(&self) -> Result<ConfigValue>;

    /// 来源名称，用于错误信息和日志
    fn name(&self) -> String;

    /// 需要监听的文件，不支持监听的来源返回 `Ok(None)`
    ///
    /// 支持监听但暂时无法确定文件时（例如在查找目录中找不到）返回错误
    fn watch_path(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

impl<S: ConfigSource + ?Sized> ConfigSource for Box<S> {
    fn read(&self) -> Result<ConfigValue> {
        (**self).read()
    }

    fn name(&self) -> String {
        (**self).name()
    }

    fn watch_path(&self) -> Result<Option<PathBuf>> {
        (**self).watch_path()
    }
}
