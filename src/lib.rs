//! rustx-conf - 类型化配置加载
//!
//! 把配置文件、内存数据或环境变量绑定到用户定义的结构体，
//! 配置快照无锁读取，文件变化时在后台整体替换。
//!
//! ## 模块
//!
//! - **cfg**: 配置源、环境变量覆盖、快照与加载器
//! - **fs**: 文件监听
//!
//! ## 示例
//!
//! ```no_run
//! use rustx_conf::cfg::Loader;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Deserialize, Serialize)]
//! struct DatabaseConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! let dynamic = Loader::<DatabaseConfig>::builder()
//!     .config_file("config.yml")
//!     .sub_section("databaseConfig")
//!     .on_change(|err| match err {
//!         Some(e) => eprintln!("reload failed: {}", e),
//!         None => println!("config reloaded"),
//!     })
//!     .build()
//!     .start_watcher();
//!
//! println!("{}:{}", dynamic.load().host, dynamic.load().port);
//! ```
//!
//! ## 字段映射
//!
//! 子配置名忽略大小写；结构体字段按 serde 规则区分大小写，
//! 配置中的 `HTTPListener`、`databaseConfig` 这类键需要用 `#[serde(rename = "...")]` 对应，
//! 没有对应上的字段取 `Default` 中的值。
//!
//! ```
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Deserialize, Serialize)]
//! struct GlobalConfig {
//!     #[serde(rename = "HTTPListener")]
//!     http_listener: String,
//! }
//! ```

pub mod cfg;
pub mod fs;

// 重新导出主要的公共 API
pub use cfg::{
    new_dynamic, ConfigError, ConfigSource, Dynamic, Loader, LoaderBuilder, LoaderConfig, Logger,
};

pub use fs::{FileEvent, FileWatcher, FileWatcherConfig};
