//! 加载器日志接口
//!
//! 每个 Loader 持有自己的 Logger 实例，不存在全局默认日志器

use std::fmt::{self, Display, Write};

/// 日志字段
pub type LogFields<'a> = &'a [(&'a str, &'a dyn Display)];

/// 加载器使用的日志接口
pub trait Logger: Send + Sync {
    fn info(&self, msg: &str, fields: LogFields<'_>);

    fn error(&self, msg: &str, fields: LogFields<'_>);
}

/// 转发到 `log` 门面的默认实现
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLogger;

impl Logger for LogLogger {
    fn info(&self, msg: &str, fields: LogFields<'_>) {
        log::info!(target: "rustx_conf", "{}", render(msg, fields));
    }

    fn error(&self, msg: &str, fields: LogFields<'_>) {
        log::error!(target: "rustx_conf", "{}", render(msg, fields));
    }
}

/// 丢弃所有日志
#[derive(Debug, Clone, Copy, Default)]
pub struct NopLogger;

impl Logger for NopLogger {
    fn info(&self, _msg: &str, _fields: LogFields<'_>) {}

    fn error(&self, _msg: &str, _fields: LogFields<'_>) {}
}

/// 渲染为 `msg key=value key=value`
pub fn render(msg: &str, fields: LogFields<'_>) -> String {
    let mut line = msg.to_string();
    for (key, value) in fields {
        // 写入 String 不会失败
        let _ = write!(line, " {}={}", key, value);
    }
    line
}

impl fmt::Debug for dyn Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Logger")
    }
}
