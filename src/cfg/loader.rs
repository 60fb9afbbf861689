//! 配置加载器
//!
//! Loader 持有配置快照和读取器：
//! - `parse` 同步读取并解码，成功后整体替换快照，失败时保留旧快照
//! - `start_watcher` 只在第一次调用时启动文件监听，每次文件变化都会重新解析并通知回调

use arc_swap::ArcSwapOption;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::error::ConfigError;
use super::logger::Logger;
use super::options::{LoaderBuilder, LoaderConfig};
use super::reader::ConfigReader;
use super::snapshot::Snapshot;
use crate::fs::{FileEvent, FileWatcher, FileWatcherConfig};

/// 配置变化回调，参数为本次重新加载的错误，成功时为 None
pub type OnChangeFunc = dyn Fn(Option<&ConfigError>) + Send + Sync;

struct ChangeCallback(Box<OnChangeFunc>);

/// 可以作为配置类型的约束
///
/// `Serialize + Default` 用于生成环境变量覆盖的键结构
pub trait Configuration: DeserializeOwned + Serialize + Default + Send + Sync + 'static {}

impl<T> Configuration for T where T: DeserializeOwned + Serialize + Default + Send + Sync + 'static {}

pub(crate) struct LoaderInner<T> {
    snapshot: Snapshot<T>,
    reader: ConfigReader,
    sub_section: Option<String>,
    example_text: Option<String>,
    on_change: ArcSwapOption<ChangeCallback>,
    logger: Arc<dyn Logger>,
    watch_started: AtomicBool,
    watcher_config: FileWatcherConfig,
    watcher: OnceCell<FileWatcher>,
}

/// 配置加载器
///
/// 克隆开销很小，所有克隆共享同一份快照和监听状态
///
/// # 示例
/// ```no_run
/// use rustx_conf::cfg::Loader;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Deserialize, Serialize)]
/// struct DatabaseConfig {
///     host: String,
///     port: u16,
/// }
///
/// let loader = Loader::<DatabaseConfig>::builder()
///     .config_file("config.yml")
///     .sub_section("databaseConfig")
///     .build();
///
/// let dynamic = loader.start_watcher();
/// println!("host: {}", dynamic.load().host);
/// ```
pub struct Loader<T> {
    inner: Arc<LoaderInner<T>>,
}

impl<T> Clone for Loader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Configuration> Loader<T> {
    pub fn builder() -> LoaderBuilder<T> {
        LoaderBuilder::new()
    }

    /// 从 LoaderConfig 创建
    ///
    /// # Panics
    ///
    /// 与 `LoaderBuilder::build` 相同：自动解析失败且没有默认值时 panic
    pub fn new(config: LoaderConfig) -> Self {
        LoaderBuilder::from_config(config).build()
    }

    /// 从 LoaderConfig 创建，失败时返回错误而不是 panic
    pub fn try_new(config: LoaderConfig) -> Result<Self, ConfigError> {
        LoaderBuilder::from_config(config).try_build()
    }

    pub(crate) fn assemble(
        reader: ConfigReader,
        sub_section: Option<String>,
        example_text: Option<String>,
        on_change: Option<Box<OnChangeFunc>>,
        logger: Arc<dyn Logger>,
        watcher_config: FileWatcherConfig,
    ) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                snapshot: Snapshot::new(),
                reader,
                sub_section: sub_section.filter(|s| !s.is_empty()),
                example_text: example_text.filter(|s| !s.is_empty()),
                on_change: ArcSwapOption::new(on_change.map(|f| Arc::new(ChangeCallback(f)))),
                logger,
                watch_started: AtomicBool::new(false),
                watcher_config,
                watcher: OnceCell::new(),
            }),
        }
    }

    /// 直接发布一份配置，用于构造时的默认值回退
    pub(crate) fn store(&self, value: T) {
        self.inner.snapshot.store(value);
    }

    /// 同步解析配置源，成功后替换快照
    ///
    /// 失败时快照保持不变，错误中附带示例配置（如果设置了）
    pub fn parse(&self) -> Result<(), ConfigError> {
        self.inner.parse()
    }

    /// 读取当前配置
    ///
    /// # Panics
    ///
    /// 关闭了自动解析并且还没有成功 `parse` 过时 panic
    pub fn load(&self) -> Arc<T> {
        self.inner.snapshot.load()
    }

    /// 读取当前配置，还没有成功解析过时返回 None
    pub fn try_load(&self) -> Option<Arc<T>> {
        self.inner.snapshot.try_load()
    }

    /// 替换配置变化回调，下一次重新加载时生效
    pub fn set_on_change_func<F>(&self, f: F)
    where
        F: Fn(Option<&ConfigError>) + Send + Sync + 'static,
    {
        self.inner
            .on_change
            .store(Some(Arc::new(ChangeCallback(Box::new(f)))));
    }

    /// 开始监听配置文件
    ///
    /// 只有第一次调用会启动监听，之后的调用直接返回句柄。
    /// 配置源不支持监听或者启动失败时记录日志并通知回调，不会 panic
    pub fn start_watcher(&self) -> Dynamic<T> {
        if self
            .inner
            .watch_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Err(e) = self.inner.watch(Arc::downgrade(&self.inner)) {
                self.inner.logger.error(
                    "Failed to start config watcher",
                    &[("source", &self.inner.reader.source_name()), ("error", &e)],
                );
                self.inner.notify(Some(&e));
            }
        }

        Dynamic {
            loader: self.clone(),
        }
    }

    /// `start_watcher` 的别名
    pub fn start_dynamic_reload(&self) -> Dynamic<T> {
        self.start_watcher()
    }

    /// 后台文件监听是否在运行
    pub fn is_watching(&self) -> bool {
        self.inner.watcher.get().is_some()
    }
}

impl<T: Configuration> LoaderInner<T> {
    fn parse(&self) -> Result<(), ConfigError> {
        let value: T = self
            .reader
            .unmarshal(self.sub_section.as_deref())
            .map_err(|e| e.with_example(self.example_text.as_deref()))?;
        self.snapshot.store(value);
        Ok(())
    }

    fn watch(&self, this: Weak<Self>) -> Result<(), ConfigError> {
        let path = self
            .reader
            .watch_path()
            .map_err(|e| {
                ConfigError::Watch(format!(
                    "cannot watch {}: {}",
                    self.reader.source_name(),
                    e
                ))
            })?
            .ok_or_else(|| {
                ConfigError::Watch(format!(
                    "{} does not support watching",
                    self.reader.source_name()
                ))
            })?;

        let watcher = FileWatcher::new(self.watcher_config.clone())
            .map_err(|e| ConfigError::Watch(e.to_string()))?;

        // 回调只持有弱引用，所有 Loader 句柄释放后监听线程随之退出
        watcher
            .watch(&path, move |event| {
                if let Some(inner) = this.upgrade() {
                    inner.on_file_event(event);
                }
            })
            .map_err(|e| ConfigError::Watch(e.to_string()))?;

        self.logger
            .info("Config watcher started", &[("path", &path.display())]);
        let _ = self.watcher.set(watcher);
        Ok(())
    }

    fn on_file_event(&self, event: FileEvent) {
        match event {
            FileEvent::Created(_) | FileEvent::Modified(_) | FileEvent::Renamed(_) => {
                self.reload()
            }
            FileEvent::Deleted(path) => {
                self.logger.info(
                    "Config file removed, keeping current config",
                    &[("path", &path.display())],
                );
            }
            FileEvent::Error(err) => {
                let e = ConfigError::Watch(err);
                self.logger.error("Config watcher error", &[("error", &e)]);
                self.notify(Some(&e));
            }
        }
    }

    fn reload(&self) {
        let source = self.reader.source_name();
        let result = self.parse();
        match &result {
            Ok(()) => self
                .logger
                .info("Config reloaded successfully", &[("source", &source)]),
            Err(e) => self
                .logger
                .error("Failed to reload config", &[("source", &source), ("error", e)]),
        }
        self.notify(result.as_ref().err());
    }

    fn notify(&self, err: Option<&ConfigError>) {
        if let Some(callback) = self.on_change.load_full() {
            (callback.0)(err);
        }
    }
}

impl<T> fmt::Debug for Loader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("reader", &self.inner.reader)
            .field("sub_section", &self.inner.sub_section)
            .field("logger", &self.inner.logger)
            .field("watching", &self.inner.watcher.get().is_some())
            .finish_non_exhaustive()
    }
}

/// 动态配置句柄，由 `Loader::start_watcher` 返回
pub struct Dynamic<T> {
    loader: Loader<T>,
}

impl<T> Clone for Dynamic<T> {
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
        }
    }
}

impl<T: Configuration> Dynamic<T> {
    /// 读取最新配置
    pub fn load(&self) -> Arc<T> {
        self.loader.load()
    }

    pub fn set_on_change_func<F>(&self, f: F)
    where
        F: Fn(Option<&ConfigError>) + Send + Sync + 'static,
    {
        self.loader.set_on_change_func(f);
    }

    pub fn loader(&self) -> &Loader<T> {
        &self.loader
    }
}

impl<T> fmt::Debug for Dynamic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dynamic")
            .field("loader", &self.loader)
            .finish()
    }
}

/// 创建加载器并立即开始监听，返回句柄和首次加载的配置
///
/// # Panics
///
/// 与 `LoaderBuilder::build` 相同；关闭了自动解析时，首次读取也会 panic
pub fn new_dynamic<T: Configuration>(builder: LoaderBuilder<T>) -> (Dynamic<T>, Arc<T>) {
    let dynamic = builder.build().start_watcher();
    let value = dynamic.load();
    (dynamic, value)
}
