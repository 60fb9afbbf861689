//! cfg 模块 - 配置加载
//!
//! 把文件、内存数据或环境变量中的配置解码为用户定义的类型，
//! 支持子配置、环境变量覆盖、默认值回退以及文件变化后的热加载

pub mod env;
pub mod env_source;
pub mod error;
pub mod file_source;
pub mod format;
pub mod loader;
pub mod logger;
pub mod options;
pub mod reader;
pub mod reader_source;
pub mod snapshot;
pub mod source;

// 重新导出公共 API
pub use env::{EnvLookup, EnvOverlay, Untyped};
pub use env_source::EnvSource;
pub use error::ConfigError;
pub use file_source::{FileSource, FileSourceConfig};
pub use format::ConfigFormat;
pub use loader::{new_dynamic, Configuration, Dynamic, Loader, OnChangeFunc};
pub use logger::{LogFields, LogLogger, Logger, NopLogger};
pub use options::{LoaderBuilder, LoaderConfig, DEFAULT_CONFIG_FILE};
pub use reader::ConfigReader;
pub use reader_source::ReaderSource;
pub use snapshot::Snapshot;
pub use source::{ConfigSource, ConfigValue};
