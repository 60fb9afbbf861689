//! 纯环境变量配置源
//!
//! 本身不提供任何数据，所有字段都由环境变量覆盖填充，
//! 可用的键来自目标类型默认值序列化后的结构

use anyhow::Result;

use super::source::{ConfigSource, ConfigValue};

/// 纯环境变量配置源
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn read(&self) -> Result<ConfigValue> {
        Ok(ConfigValue::empty())
    }

    fn name(&self) -> String {
        "environment".to_string()
    }
}
