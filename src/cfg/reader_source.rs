//! 内存配置源
//!
//! 从任意 `std::io::Read` 一次性读入内容，之后每次 `read` 都重新解码这份内容

use anyhow::{anyhow, Result};
use std::io::Read;

use super::error::ConfigError;
use super::format::ConfigFormat;
use super::source::{ConfigSource, ConfigValue};

/// 内存配置源
///
/// 构造时的读取错误和格式错误不会立即返回，而是在 `read` 时作为读取错误上报，
/// 这样构造阶段的失败同样会走默认值回退或 panic 的策略
///
/// # 示例
/// ```
/// use rustx_conf::cfg::{ConfigSource, ReaderSource};
///
/// let data = r#"{"host": "remote.example.com", "port": 5432}"#;
/// let source = ReaderSource::from_reader(data.as_bytes(), "json");
/// assert_eq!(source.read().unwrap().as_value()["port"], 5432);
/// ```
#[derive(Debug, Clone)]
pub struct ReaderSource {
    content: Result<String, String>,
    format: Result<ConfigFormat, String>,
}

impl ReaderSource {
    pub fn new(content: impl Into<String>, format: ConfigFormat) -> Self {
        Self {
            content: Ok(content.into()),
            format: Ok(format),
        }
    }

    /// 从 reader 读入内容，`config_type` 为格式名称
    pub fn from_reader(mut reader: impl Read, config_type: &str) -> Self {
        let mut content = String::new();
        let content = match reader.read_to_string(&mut content) {
            Ok(_) => Ok(content),
            Err(e) => Err(format!("failed to read config stream: {}", e)),
        };

        Self {
            content,
            format: config_type.parse().map_err(|e: ConfigError| e.to_string()),
        }
    }
}

impl ConfigSource for ReaderSource {
    fn read(&self) -> Result<ConfigValue> {
        let format = self.format.as_ref().map_err(|e| anyhow!("{}", e))?;
        let content = self.content.as_ref().map_err(|e| anyhow!("{}", e))?;
        Ok(ConfigValue::new(format.parse(content)?))
    }

    fn name(&self) -> String {
        match &self.format {
            Ok(format) => format!("reader ({})", format),
            Err(_) => "reader".to_string(),
        }
    }
}
