//! 文件监听器
//!
//! 监听文件系统事件，当文件变化时触发回调

use anyhow::{anyhow, Result};
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use garde::Validate;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 文件事件
#[derive(Debug, Clone, PartialEq)]
pub enum FileEvent {
    /// 文件被创建
    Created(PathBuf),
    /// 文件内容被修改，或者符号链接指向了新的文件
    Modified(PathBuf),
    /// 文件被重命名（包括编辑器先写临时文件再重命名覆盖的保存方式）
    Renamed(PathBuf),
    /// 文件被删除
    Deleted(PathBuf),
    /// 发生错误
    Error(String),
}

impl FileEvent {
    /// 是否意味着文件内容可能已经变化
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            FileEvent::Created(_) | FileEvent::Modified(_) | FileEvent::Renamed(_)
        )
    }
}

/// 文件监听器配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, SmartDefault, Validate)]
#[serde(default)]
pub struct FileWatcherConfig {
    /// 执行回调的工作线程数
    #[default = 1]
    #[garde(range(min = 1))]
    pub worker_threads: usize,
    /// 事件防抖延迟（同一文件的多次变化只处理最后一次），单位：毫秒
    #[default = 100]
    #[garde(skip)]
    pub debounce_delay_ms: u64,
}

impl FileWatcherConfig {
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }
}

type Handler = Arc<dyn Fn(FileEvent) + Send + Sync>;

/// 监听请求（用于在事件循环中添加监听）
struct WatchRequest {
    entry: WatchEntry,
    reply: Sender<Result<(), String>>,
}

/// 一个被监听的文件
struct WatchEntry {
    /// 用户给出的路径（父目录已规范化，文件名保持原样）
    path: PathBuf,
    /// 路径是符号链接时，其最终指向的文件
    target: Option<PathBuf>,
    handler: Handler,
}

impl WatchEntry {
    fn matches(&self, path: &Path) -> bool {
        self.path == path || self.target.as_deref() == Some(path)
    }

    /// 需要监听的目录
    fn dirs(&self) -> Vec<PathBuf> {
        [Some(&self.path), self.target.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|p| p.parent().map(Path::to_path_buf))
            .collect()
    }
}

/// 文件监听器
///
/// 监听指定文件的变化，当文件被创建、修改、重命名或删除时触发回调
///
/// # 架构说明
///
/// - **单一 notify watcher**：监听所有文件所在的目录，按文件路径分发事件
/// - **单一事件循环线程**：接收 notify 原始事件，进行防抖去重
/// - **Rayon 线程池**：创建时初始化一次，用于执行回调
///
/// 监听目录而不是文件本身，这样先删除再创建、或者重命名覆盖的保存方式也能被感知；
/// 文件是符号链接时同时监听链接和它指向的文件，链接改指向时触发 `Modified`
///
/// # 示例
///
/// ```no_run
/// use rustx_conf::fs::{FileEvent, FileWatcher, FileWatcherConfig};
///
/// let watcher = FileWatcher::new(FileWatcherConfig::default()).unwrap();
///
/// watcher.watch("/path/to/config.yml", |event| {
///     match event {
///         FileEvent::Error(err) => eprintln!("watch error: {}", err),
///         event if event.is_change() => println!("changed: {:?}", event),
///         _ => {}
///     }
/// }).unwrap();
/// ```
pub struct FileWatcher {
    /// 监听请求发送通道
    watch_request_tx: Sender<WatchRequest>,
    /// 事件循环线程句柄
    _event_thread: thread::JoinHandle<()>,
}

impl FileWatcher {
    /// 使用配置创建文件监听器，启动事件循环线程
    pub fn new(config: FileWatcherConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!("invalid file watcher config: {}", e))?;

        let (watch_request_tx, watch_request_rx) = unbounded::<WatchRequest>();
        let (notify_tx, notify_rx) = unbounded();

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = notify_tx.send(res);
        })?;

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("rustx-conf-watch-{}", i))
            .build()?;

        let event_loop = EventLoop {
            watcher,
            thread_pool,
            debounce_delay: config.debounce_delay(),
            entries: Vec::new(),
            watched_dirs: HashSet::new(),
            pending: HashMap::new(),
        };

        let event_thread = thread::Builder::new()
            .name("rustx-conf-watcher".to_string())
            .spawn(move || event_loop.run(watch_request_rx, notify_rx))?;

        Ok(Self {
            watch_request_tx,
            _event_thread: event_thread,
        })
    }

    /// 监听指定文件
    ///
    /// 文件可以暂时不存在，但父目录必须存在；路径指向目录时返回错误
    pub fn watch<F>(&self, filepath: impl AsRef<Path>, handler: F) -> Result<()>
    where
        F: Fn(FileEvent) + Send + Sync + 'static,
    {
        let filepath = filepath.as_ref();

        if filepath.exists() && !filepath.is_file() {
            return Err(anyhow!("path is not a file: {}", filepath.display()));
        }

        let path = normalize(filepath)?;
        let target = if std::fs::symlink_metadata(filepath)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
        {
            dunce::canonicalize(filepath).ok()
        } else {
            None
        };

        let (reply_tx, reply_rx) = bounded(1);
        self.watch_request_tx
            .send(WatchRequest {
                entry: WatchEntry {
                    path,
                    target,
                    handler: Arc::new(handler),
                },
                reply: reply_tx,
            })
            .map_err(|e| anyhow!("failed to send watch request: {}", e))?;

        reply_rx
            .recv()
            .map_err(|e| anyhow!("watcher event loop stopped: {}", e))?
            .map_err(|e| anyhow!("failed to watch {}: {}", filepath.display(), e))
    }
}

impl Default for FileWatcher {
    /// # Panics
    ///
    /// 无法创建系统文件监听或线程时 panic
    fn default() -> Self {
        match Self::new(FileWatcherConfig::default()) {
            Ok(watcher) => watcher,
            Err(e) => panic!("Failed to create FileWatcher: {}", e),
        }
    }
}

// 注意：FileWatcher 不需要显式实现 Drop
// drop 时请求通道关闭，事件循环线程随之退出并释放 notify watcher

/// 规范化路径：父目录 canonicalize，文件名保持原样（不解析符号链接）
fn normalize(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("cannot get file name: {}", path.display()))?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !parent.exists() {
        return Err(anyhow!("parent directory does not exist: {}", parent.display()));
    }

    Ok(dunce::canonicalize(&parent)?.join(file_name))
}

/// 把 notify 事件转换为文件事件，`position` 为路径在事件中的下标
///
/// 文件被重命名走（`mv config.yml config.bak`）视为删除，被重命名过来视为重命名
fn to_file_event(kind: &EventKind, position: usize, path: &Path) -> Option<FileEvent> {
    let path = path.to_path_buf();
    match kind {
        EventKind::Create(_) => Some(FileEvent::Created(path)),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FileEvent::Deleted(path)),
        // Both 事件的路径依次是旧路径和新路径
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if position == 0 => {
            Some(FileEvent::Deleted(path))
        }
        EventKind::Modify(ModifyKind::Name(_)) => Some(FileEvent::Renamed(path)),
        EventKind::Modify(_) => Some(FileEvent::Modified(path)),
        EventKind::Remove(_) => Some(FileEvent::Deleted(path)),
        _ => None,
    }
}

/// 事件循环线程的状态
struct EventLoop {
    watcher: RecommendedWatcher,
    thread_pool: rayon::ThreadPool,
    debounce_delay: Duration,
    entries: Vec<WatchEntry>,
    watched_dirs: HashSet<PathBuf>,
    /// 事件去重缓存：entry 下标 -> (event, timestamp)
    pending: HashMap<usize, (FileEvent, Instant)>,
}

impl EventLoop {
    fn run(
        mut self,
        watch_request_rx: Receiver<WatchRequest>,
        notify_rx: Receiver<notify::Result<notify::Event>>,
    ) {
        let tick = (self.debounce_delay / 2).max(Duration::from_millis(10));

        loop {
            crossbeam::select! {
                recv(watch_request_rx) -> result => match result {
                    Ok(req) => {
                        let result = self.add(req.entry);
                        let _ = req.reply.send(result);
                    }
                    // 通道关闭，FileWatcher 已被 drop
                    Err(_) => break,
                },
                recv(notify_rx) -> result => match result {
                    Ok(Ok(event)) => self.on_event(event),
                    Ok(Err(e)) => self.broadcast_error(e.to_string()),
                    Err(_) => break,
                },
                default(tick) => {}
            }

            self.flush();
        }
    }

    fn add(&mut self, entry: WatchEntry) -> Result<(), String> {
        for dir in entry.dirs() {
            self.watch_dir(dir)?;
        }
        self.entries.push(entry);
        Ok(())
    }

    fn watch_dir(&mut self, dir: PathBuf) -> Result<(), String> {
        if self.watched_dirs.contains(&dir) {
            return Ok(());
        }
        self.watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| e.to_string())?;
        self.watched_dirs.insert(dir);
        Ok(())
    }

    fn on_event(&mut self, event: notify::Event) {
        let now = Instant::now();

        for (position, path) in event.paths.iter().enumerate() {
            let path = normalize(path).unwrap_or_else(|_| path.clone());

            for (index, entry) in self.entries.iter().enumerate() {
                if !entry.matches(&path) {
                    continue;
                }
                let Some(file_event) = to_file_event(&event.kind, position, &entry.path) else {
                    continue;
                };
                self.pending.insert(index, (file_event, now));
            }
        }

        self.retarget_symlinks(now);
    }

    /// 符号链接改指向时（例如 Kubernetes ConfigMap 的原子更新），链接本身可能没有事件
    fn retarget_symlinks(&mut self, now: Instant) {
        let mut new_dirs = Vec::new();

        for (index, entry) in self.entries.iter_mut().enumerate() {
            let Some(old_target) = entry.target.clone() else {
                continue;
            };
            let Ok(new_target) = dunce::canonicalize(&entry.path) else {
                continue;
            };
            if new_target != old_target {
                if let Some(dir) = new_target.parent() {
                    new_dirs.push(dir.to_path_buf());
                }
                entry.target = Some(new_target);
                self.pending
                    .insert(index, (FileEvent::Modified(entry.path.clone()), now));
            }
        }

        for dir in new_dirs {
            if let Err(e) = self.watch_dir(dir) {
                self.broadcast_error(e);
            }
        }
    }

    fn broadcast_error(&self, message: String) {
        let handlers: Vec<Handler> = self.entries.iter().map(|e| e.handler.clone()).collect();
        self.thread_pool.install(|| {
            handlers
                .into_par_iter()
                .for_each(|handler| handler(FileEvent::Error(message.clone())));
        });
    }

    /// 处理超过防抖延迟没有新事件的缓存事件，每个文件只处理最后一个
    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let now = Instant::now();
        let debounce_delay = self.debounce_delay;
        let mut events_to_process = Vec::new();

        self.pending.retain(|index, (event, time)| {
            if now.duration_since(*time) >= debounce_delay {
                events_to_process.push((*index, event.clone()));
                false
            } else {
                true
            }
        });

        if events_to_process.is_empty() {
            return;
        }

        let entries = &self.entries;
        self.thread_pool.install(|| {
            events_to_process
                .into_par_iter()
                .for_each(|(index, event)| (entries[index].handler)(event));
        });
    }
}
