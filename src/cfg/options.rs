//! 加载器选项
//!
//! `LoaderConfig` 是可以写进配置文件的纯数据结构，
//! `LoaderBuilder` 按调用顺序应用选项，后面的调用覆盖前面的

use garde::Validate;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use super::env::{EnvLookup, EnvOverlay};
use super::env_source::EnvSource;
use super::error::ConfigError;
use super::file_source::{FileSource, FileSourceConfig};
use super::format::ConfigFormat;
use super::loader::{Configuration, Loader, OnChangeFunc};
use super::logger::{LogLogger, Logger};
use super::reader::ConfigReader;
use super::reader_source::ReaderSource;
use super::source::ConfigSource;
use crate::fs::FileWatcherConfig;

/// 未指定任何配置源时使用的文件
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// 加载器配置
///
/// 配置源的选择顺序：`only_env` → `config_file` → `config_paths` + `config_name` → `config.yml`
///
/// # 示例
/// ```
/// use rustx_conf::cfg::LoaderConfig;
///
/// let config: LoaderConfig = serde_json::from_str(r#"{
///     "config_file": "/etc/app/config.yml",
///     "sub_section": "databaseConfig",
///     "watcher": { "debounce_delay_ms": 200 }
/// }"#).unwrap();
///
/// assert_eq!(config.key_delimiter, "_");
/// assert_eq!(config.watcher.worker_threads, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, SmartDefault, Validate)]
#[serde(default)]
pub struct LoaderConfig {
    /// 配置文件路径
    #[garde(skip)]
    pub config_file: Option<String>,

    /// 配置格式，不设置时根据扩展名识别
    #[garde(custom(known_config_type))]
    pub config_type: Option<String>,

    /// 查找模式下的文件名（不含扩展名），默认 `config`
    #[garde(skip)]
    pub config_name: Option<String>,

    /// 查找模式下的目录列表
    #[garde(skip)]
    pub config_paths: Vec<String>,

    /// 只解析指定的子配置
    #[garde(skip)]
    pub sub_section: Option<String>,

    /// 关闭环境变量覆盖
    #[default = false]
    #[garde(skip)]
    pub disable_automatic_env: bool,

    /// 环境变量名前缀
    #[garde(skip)]
    pub env_prefix: String,

    /// 环境变量名和嵌套子配置路径的分隔符
    #[default = "_"]
    #[garde(length(min = 1))]
    pub key_delimiter: String,

    /// 只从环境变量读取
    #[default = false]
    #[garde(skip)]
    pub only_env: bool,

    /// 构造时不自动解析，需要手动调用 `parse`
    #[default = false]
    #[garde(skip)]
    pub disable_auto_parse: bool,

    /// 解析失败时附在错误信息后的示例配置
    #[garde(skip)]
    pub example_text: Option<String>,

    /// 文件监听配置
    #[garde(dive)]
    pub watcher: FileWatcherConfig,
}

/// 加载器构造器
///
/// # 示例
/// ```
/// use rustx_conf::cfg::Loader;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
/// struct DatabaseConfig {
///     host: String,
///     port: u16,
/// }
///
/// let data = r#"{"databaseConfig": {"host": "localhost", "port": 5432}}"#;
///
/// let loader = Loader::<DatabaseConfig>::builder()
///     .config_reader(data.as_bytes(), "json")
///     .sub_section("databaseConfig")
///     .disable_automatic_env()
///     .build();
///
/// assert_eq!(loader.load().host, "localhost");
/// assert_eq!(loader.load().port, 5432);
/// ```
pub struct LoaderBuilder<T> {
    config: LoaderConfig,
    /// 显式选择的配置源，优先于 config 中的文件设置
    source: Option<Box<dyn ConfigSource>>,
    default: Option<T>,
    on_change: Option<Box<OnChangeFunc>>,
    logger: Arc<dyn Logger>,
    env_lookup: Option<EnvLookup>,
}

impl<T: Configuration> LoaderBuilder<T> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::from_config(LoaderConfig::default())
    }

    /// 以 LoaderConfig 为初始选项
    pub fn from_config(config: LoaderConfig) -> Self {
        Self {
            config,
            source: None,
            default: None,
            on_change: None,
            logger: Arc::new(LogLogger),
            env_lookup: None,
        }
    }

    /// 从文件读取
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self.config.only_env = false;
        self.source = None;
        self
    }

    /// 显式指定文件格式
    pub fn config_type(mut self, config_type: impl Into<String>) -> Self {
        self.config.config_type = Some(config_type.into());
        self
    }

    /// 从任意 reader 读取，`config_type` 为格式名称；这种来源不支持监听
    pub fn config_reader(mut self, reader: impl Read, config_type: &str) -> Self {
        self.source = Some(Box::new(ReaderSource::from_reader(reader, config_type)));
        self
    }

    /// 在这些目录中查找配置文件
    pub fn config_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.config_paths = paths.into_iter().map(Into::into).collect();
        self.config.config_file = None;
        self.config.only_env = false;
        self.source = None;
        self
    }

    /// 查找模式下的文件名（不含扩展名）
    pub fn config_name(mut self, name: impl Into<String>) -> Self {
        self.config.config_name = Some(name.into());
        self
    }

    /// 使用自定义配置源
    pub fn source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// 只从环境变量读取，字段来自目标类型默认值的结构
    pub fn only_env(mut self) -> Self {
        self.config.only_env = true;
        self.config.disable_automatic_env = false;
        self.source = None;
        self
    }

    pub fn disable_automatic_env(mut self) -> Self {
        self.config.disable_automatic_env = true;
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.env_prefix = prefix.into();
        self
    }

    pub fn key_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.config.key_delimiter = delimiter.into();
        self
    }

    /// 只解析指定的子配置
    pub fn sub_section(mut self, section: impl Into<String>) -> Self {
        self.config.sub_section = Some(section.into());
        self
    }

    /// 每次重新加载之后调用
    pub fn on_change<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&ConfigError>) + Send + Sync + 'static,
    {
        self.on_change = Some(Box::new(f));
        self
    }

    /// 解析失败时附在错误信息后的示例配置
    pub fn example_text(mut self, text: impl Into<String>) -> Self {
        self.config.example_text = Some(text.into());
        self
    }

    /// 构造时解析失败则使用该默认值，而不是 panic
    pub fn default(mut self, value: T) -> Self {
        self.default = Some(value);
        self
    }

    /// 构造时不解析，调用方需要先 `parse` 再 `load`
    pub fn disable_auto_parse(mut self) -> Self {
        self.config.disable_auto_parse = true;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn watcher_config(mut self, config: FileWatcherConfig) -> Self {
        self.config.watcher = config;
        self
    }

    /// 替换环境变量查询函数，默认读取进程环境变量
    pub fn env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env_lookup = Some(Arc::new(lookup));
        self
    }

    /// 创建加载器
    ///
    /// 自动解析失败时：设置了默认值则使用默认值，否则返回错误
    pub fn try_build(self) -> Result<Loader<T>, ConfigError> {
        self.config
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        let LoaderBuilder {
            config,
            source,
            default,
            on_change,
            logger,
            env_lookup,
        } = self;

        let source: Box<dyn ConfigSource> = match source {
            Some(source) => source,
            None if config.only_env => Box::new(EnvSource),
            None => Box::new(FileSource::new(file_source_config(&config))),
        };

        let env = (!config.disable_automatic_env || config.only_env).then(|| {
            let env = EnvOverlay::new(config.key_delimiter.as_str())
                .with_prefix(config.env_prefix.as_str());
            match env_lookup {
                Some(lookup) => env.with_shared_lookup(lookup),
                None => env,
            }
        });

        let reader = ConfigReader::from_boxed(source)
            .with_env(env)
            .with_key_delimiter(config.key_delimiter.as_str());

        let loader = Loader::assemble(
            reader,
            config.sub_section,
            config.example_text,
            on_change,
            logger,
            config.watcher,
        );

        if !config.disable_auto_parse {
            if let Err(e) = loader.parse() {
                match default {
                    Some(value) => loader.store(value),
                    None => return Err(e),
                }
            }
        }

        Ok(loader)
    }

    /// 创建加载器
    ///
    /// # Panics
    ///
    /// 自动解析失败且没有设置默认值时 panic，配置是进程运行的前提
    pub fn build(self) -> Loader<T> {
        match self.try_build() {
            Ok(loader) => loader,
            Err(e) => panic!("Failed to load config: {}", e),
        }
    }
}

impl<T> fmt::Debug for LoaderBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderBuilder")
            .field("config", &self.config)
            .field("has_source", &self.source.is_some())
            .field("has_default", &self.default.is_some())
            .finish_non_exhaustive()
    }
}

fn known_config_type(value: &Option<String>, _ctx: &()) -> garde::Result {
    match value {
        Some(config_type) => config_type
            .parse::<ConfigFormat>()
            .map(|_| ())
            .map_err(|e| garde::Error::new(e.to_string())),
        None => Ok(()),
    }
}

fn file_source_config(config: &LoaderConfig) -> FileSourceConfig {
    let file_path = match (&config.config_file, config.config_paths.is_empty()) {
        (Some(file), _) => Some(file.clone()),
        (None, true) => Some(DEFAULT_CONFIG_FILE.to_string()),
        (None, false) => None,
    };

    FileSourceConfig {
        file_path,
        config_type: config.config_type.clone(),
        config_name: config.config_name.clone(),
        search_paths: config.config_paths.clone(),
    }
}
