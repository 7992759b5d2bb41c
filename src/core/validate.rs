use thiserror::Error;
use crate::config::QueueConfig;
use super::types::{FileDescriptor, UploadItem};

/// 入队前的校验失败原因，被拒绝的文件不会进入队列
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("file is empty")]
    EmptyFile,

    #[error("file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("unsupported mime type: {mime_type}")]
    UnsupportedType { mime_type: String },
}

/// 一个被拒绝的文件及其原因
#[derive(Debug, Clone)]
pub struct RejectedFile {
    pub descriptor: FileDescriptor,
    pub reason: RejectReason,
}

/// `add_files` 的结果：部分成功，不是全有或全无
#[derive(Debug)]
pub struct Admission {
    pub admitted: Vec<UploadItem>,
    pub rejected: Vec<RejectedFile>,
}

/// 校验协作方接口，在条目入队前调用
pub trait FileValidator: Send + Sync {
    fn validate(&self, descriptor: &FileDescriptor) -> Result<(), RejectReason>;
}

/// 基于配置上限的默认校验器
pub struct LimitValidator {
    max_file_size: Option<u64>,
    allowed_mime_types: Option<Vec<String>>,
}

impl LimitValidator {
    pub fn new(max_file_size: Option<u64>, allowed_mime_types: Option<Vec<String>>) -> Self {
        Self {
            max_file_size,
            allowed_mime_types,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.max_file_size, config.allowed_mime_types.clone())
    }

    fn mime_allowed(&self, mime_type: &str) -> bool {
        let Some(allowed) = &self.allowed_mime_types else {
            return true;
        };

        allowed.iter().any(|entry| {
            // "image/*" 形式的通配
            match entry.strip_suffix("/*") {
                Some(prefix) => mime_type
                    .split('/')
                    .next()
                    .is_some_and(|main| main == prefix),
                None => entry == mime_type,
            }
        })
    }
}

impl FileValidator for LimitValidator {
    fn validate(&self, descriptor: &FileDescriptor) -> Result<(), RejectReason> {
        if descriptor.size == 0 {
            return Err(RejectReason::EmptyFile);
        }

        if let Some(limit) = self.max_file_size {
            if descriptor.size > limit {
                return Err(RejectReason::TooLarge { limit });
            }
        }

        if !self.mime_allowed(&descriptor.mime_type) {
            return Err(RejectReason::UnsupportedType {
                mime_type: descriptor.mime_type.clone(),
            });
        }

        Ok(())
    }
}
