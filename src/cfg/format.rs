//! 配置格式
//!
//! 所有格式统一解析为 serde_json::Value，后续的子配置提取、环境变量覆盖和反序列化都与格式无关

use anyhow::Result;
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::error::ConfigError;

/// 支持的配置格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigFormat {
    Json,
    Json5,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// 按查找顺序排列的文件扩展名
    pub const EXTENSIONS: [&'static str; 5] = ["json", "json5", "yaml", "yml", "toml"];

    /// 根据文件扩展名识别格式
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        path.extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ConfigError::UnsupportedFormat(format!(
                    "missing file extension: {}",
                    path.display()
                ))
            })?
            .parse()
    }

    /// 解析配置内容
    ///
    /// 空文档（例如空的 YAML 文件）解析为空对象
    pub fn parse(&self, content: &str) -> Result<JsonValue> {
        let value: JsonValue = match self {
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Json5 => json5::from_str(content)?,
            ConfigFormat::Yaml if content.trim().is_empty() => JsonValue::Null,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        };

        if value.is_null() {
            return Ok(JsonValue::Object(Map::new()));
        }
        Ok(value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Json5 => "json5",
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
        }
    }
}

impl FromStr for ConfigFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ConfigFormat::Json),
            "json5" => Ok(ConfigFormat::Json5),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
