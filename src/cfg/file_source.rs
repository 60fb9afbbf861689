//! 文件配置源
//!
//! 支持指定文件路径，或者在多个目录中按名称查找配置文件，
//! 格式优先使用显式指定的类型，否则根据扩展名识别

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::format::ConfigFormat;
use super::source::{ConfigSource, ConfigValue};

/// 文件配置源的配置
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileSourceConfig {
    /// 配置文件路径，设置后忽略 config_name 和 search_paths
    pub file_path: Option<String>,
    /// 显式指定格式（json/json5/yaml/yml/toml）
    pub config_type: Option<String>,
    /// 查找模式下的文件名（不含扩展名）
    pub config_name: Option<String>,
    /// 查找模式下的目录列表，按顺序查找
    pub search_paths: Vec<String>,
}

/// 文件配置源
///
/// 每次 `read` 都会重新读取磁盘内容
///
/// # 示例
/// ```no_run
/// use rustx_conf::cfg::{ConfigSource, FileSource, FileSourceConfig};
///
/// // 直接指定文件
/// let source = FileSource::from_path("config.yml");
///
/// // 在 ./conf 和 /etc/app 中查找 app.{json,json5,yaml,yml,toml}
/// let source = FileSource::new(FileSourceConfig {
///     config_name: Some("app".to_string()),
///     search_paths: vec!["./conf".to_string(), "/etc/app".to_string()],
///     ..Default::default()
/// });
/// let value = source.read().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileSource {
    file_path: Option<PathBuf>,
    config_type: Option<String>,
    config_name: String,
    search_paths: Vec<PathBuf>,
}

impl FileSource {
    pub fn new(config: FileSourceConfig) -> Self {
        Self {
            file_path: config.file_path.map(PathBuf::from),
            config_type: config.config_type,
            config_name: config.config_name.unwrap_or_else(|| "config".to_string()),
            search_paths: config.search_paths.into_iter().map(PathBuf::from).collect(),
        }
    }

    /// 直接从文件路径创建
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            file_path: Some(path.as_ref().to_path_buf()),
            config_type: None,
            config_name: "config".to_string(),
            search_paths: Vec::new(),
        }
    }

    /// 确定实际读取的文件及其格式
    pub fn resolve(&self) -> Result<(PathBuf, ConfigFormat)> {
        let path = match &self.file_path {
            Some(path) => path.clone(),
            None => self.find_config_file()?,
        };

        let format = match &self.config_type {
            Some(config_type) => config_type.parse()?,
            None => ConfigFormat::from_path(&path)?,
        };
        Ok((path, format))
    }

    /// 在查找目录中查找第一个存在的配置文件
    fn find_config_file(&self) -> Result<PathBuf> {
        for dir in &self.search_paths {
            for ext in ConfigFormat::EXTENSIONS {
                let path = dir.join(format!("{}.{}", self.config_name, ext));
                if path.is_file() {
                    return Ok(path);
                }
            }
        }
        Err(anyhow!(
            "config file \"{}\" not found in {:?}",
            self.config_name,
            self.search_paths
        ))
    }
}

impl From<FileSourceConfig> for FileSource {
    fn from(config: FileSourceConfig) -> Self {
        FileSource::new(config)
    }
}

impl ConfigSource for FileSource {
    fn read(&self) -> Result<ConfigValue> {
        let (path, format) = self.resolve()?;
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow!("{}: {}", path.display(), e))?;
        let value = format
            .parse(&content)
            .map_err(|e| anyhow!("{} ({}): {}", path.display(), format, e))?;
        Ok(ConfigValue::new(value))
    }

    fn name(&self) -> String {
        match &self.file_path {
            Some(path) => format!("file {}", path.display()),
            None => format!("file \"{}\" in {:?}", self.config_name, self.search_paths),
        }
    }

    fn watch_path(&self) -> Result<Option<PathBuf>> {
        match &self.file_path {
            Some(path) => Ok(Some(path.clone())),
            None => self.find_config_file().map(Some),
        }
    }
}
