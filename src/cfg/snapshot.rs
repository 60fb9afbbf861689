//! 配置快照
//!
//! 基于 ArcSwap 的原子引用：新配置在外部完整构造后整体替换，
//! 读取方无锁、不阻塞，永远不会看到构造到一半的值

use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::Arc;

/// 配置快照存储
///
/// 多个并发 `store` 之间没有额外的顺序保证，最后完成替换的一方生效
pub struct Snapshot<T> {
    current: ArcSwapOption<T>,
}

impl<T> Snapshot<T> {
    /// 创建空快照
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
        }
    }

    /// 发布新配置
    pub fn store(&self, value: T) {
        self.store_arc(Arc::new(value));
    }

    pub fn store_arc(&self, value: Arc<T>) {
        self.current.store(Some(value));
    }

    /// 读取当前配置
    ///
    /// # Panics
    ///
    /// 在第一次成功 `store` 之前调用会 panic，
    /// Loader 保证构造完成前已经写入，只有关闭自动解析又没有调用 parse 时才会出现
    pub fn load(&self) -> Arc<T> {
        match self.current.load_full() {
            Some(value) => value,
            None => panic!("config loaded before the first successful parse"),
        }
    }

    pub fn try_load(&self) -> Option<Arc<T>> {
        self.current.load_full()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_none()
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("current", &self.current.load_full())
            .finish()
    }
}
