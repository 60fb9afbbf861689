//! 文件系统操作模块
//!
//! 提供文件监听功能

pub mod watcher;

pub use watcher::{FileEvent, FileWatcher, FileWatcherConfig};
