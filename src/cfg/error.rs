//! 配置加载错误
//!
//! 区分读取失败、子配置缺失、反序列化失败三类错误，
//! 设置了示例配置时，错误信息末尾会附带示例，方便用户直接复制

use thiserror::Error;

/// 配置加载相关错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置源读取或解码失败
    #[error("failed to read config from {source_name}: {source}{}", example_hint(.example))]
    SourceRead {
        source_name: String,
        #[source]
        source: anyhow::Error,
        example: Option<String>,
    },

    /// 指定的子配置不存在
    #[error("section not found in config: \"{section}\"{}", example_hint(.example))]
    SectionNotFound {
        section: String,
        example: Option<String>,
    },

    /// 配置数据无法映射到目标类型
    #[error("failed to unmarshal {}: {source}{}", unmarshal_target(.section), example_hint(.example))]
    Unmarshal {
        section: Option<String>,
        #[source]
        source: serde_json::Error,
        example: Option<String>,
    },

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid loader config: {0}")]
    InvalidConfig(String),

    #[error("failed to watch config: {0}")]
    Watch(String),
}

impl ConfigError {
    /// 附加示例配置
    ///
    /// 只对读取、子配置、反序列化三类错误生效
    pub fn with_example(mut self, text: Option<&str>) -> Self {
        let text = match text {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => return self,
        };

        match &mut self {
            ConfigError::SourceRead { example, .. }
            | ConfigError::SectionNotFound { example, .. }
            | ConfigError::Unmarshal { example, .. } => *example = Some(text),
            _ => {}
        }
        self
    }

    pub fn is_section_not_found(&self) -> bool {
        matches!(self, ConfigError::SectionNotFound { .. })
    }

    pub fn is_source_read(&self) -> bool {
        matches!(self, ConfigError::SourceRead { .. })
    }

    pub fn is_unmarshal(&self) -> bool {
        matches!(self, ConfigError::Unmarshal { .. })
    }
}

fn example_hint(example: &Option<String>) -> String {
    match example {
        Some(text) => format!("\nExample Config:\n{}\n", text),
        None => String::new(),
    }
}

fn unmarshal_target(section: &Option<String>) -> String {
    match section {
        Some(section) => format!("section {}", section),
        None => "config".to_string(),
    }
}
