use std::path::Path;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 队列管理器配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 单文件大小上限（字节），None 表示不限制
    pub max_file_size: Option<u64>,

    /// 允许的 mime 类型，支持 "image/*" 通配；None 表示全部允许
    pub allowed_mime_types: Option<Vec<String>>,

    /// 事件广播缓冲大小
    pub event_capacity: usize,

    /// 命令通道缓冲大小
    pub command_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_file_size: None,
            allowed_mime_types: None,
            // 最大缓存 256 个事件
            event_capacity: 256,
            command_capacity: 100,
        }
    }
}

impl QueueConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
