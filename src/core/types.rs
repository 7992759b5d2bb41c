use std::collections::HashMap;
use std::path::PathBuf;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;
use super::validate::Admission;

/// 队列归属方标识（一个 UI 界面一个队列）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 上传条目唯一标识
///
/// 全局唯一（跨所有 owner），由 owner id 加随机后缀组成，永不复用。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ItemId(String);

impl ItemId {
    pub(crate) fn generate(owner: &OwnerId) -> Self {
        Self(format!("{}-{}", owner.as_str(), Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 文件描述信息，可序列化，保存在队列状态里
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }
}

/// 文件内容句柄
///
/// 刻意不实现 Clone / Serialize：内容句柄只存在于 payload 侧表中，
/// 队列状态快照、diff 都不会复制它。
#[derive(Debug)]
pub enum PayloadSource {
    File(PathBuf),
    Bytes(Bytes),
}

/// 服务端返回的上传结果元数据
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadMetadata {
    pub url: String,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl UploadMetadata {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extra: HashMap::new(),
        }
    }
}

/// 单个条目的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ItemStatus {
    /// 已选择（未进入上传批次）
    Selected,
    /// 等待上传（在队列中）
    Waiting,
    /// 上传中
    Uploading,
    /// 已完成
    Completed,
    /// 失败（含取消）
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }
}

/// 失败类别，取消与传输错误区分开
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ErrorReason {
    Cancelled,
    Network,
    Server,
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorReason::Cancelled => write!(f, "cancelled"),
            ErrorReason::Network => write!(f, "network"),
            ErrorReason::Server => write!(f, "server"),
        }
    }
}

/// 队列中的一个上传条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadItem {
    pub id: ItemId,
    pub owner_id: OwnerId,
    pub descriptor: FileDescriptor,
    pub status: ItemStatus,
    /// 0-100，结算后冻结用于展示
    pub progress: u8,
    pub bytes_transferred: u64,
    pub error_reason: Option<ErrorReason>,
    pub error: Option<String>,
    pub metadata: Option<UploadMetadata>,
    /// 当前是否占用该 owner 的传输通道（每个 owner 最多一个）
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl UploadItem {
    pub(crate) fn new(owner_id: OwnerId, descriptor: FileDescriptor) -> Self {
        Self {
            id: ItemId::generate(&owner_id),
            owner_id,
            descriptor,
            status: ItemStatus::Selected,
            progress: 0,
            bytes_transferred: 0,
            error_reason: None,
            error: None,
            metadata: None,
            active: false,
            created_at: Utc::now(),
            started_at: None,
            settled_at: None,
        }
    }
}

/// 队列级状态，由所有条目状态推导
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum QueueStatus {
    Idle,
    Selected,
    Uploading,
    Completed,
    Failed,
}

impl QueueStatus {
    /// The one definition of "what does this batch look like overall".
    pub fn derive(items: &[UploadItem]) -> Self {
        if items.is_empty() {
            return QueueStatus::Idle;
        }
        if items.iter().all(|item| item.status == ItemStatus::Completed) {
            return QueueStatus::Completed;
        }
        if items
            .iter()
            .any(|item| matches!(item.status, ItemStatus::Uploading | ItemStatus::Waiting))
        {
            return QueueStatus::Uploading;
        }
        if items.iter().any(|item| item.status == ItemStatus::Failed) {
            return QueueStatus::Failed;
        }

        QueueStatus::Selected
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

/// 一次提交的文件：描述信息 + 内容句柄
#[derive(Debug)]
pub struct FileSubmission {
    pub descriptor: FileDescriptor,
    pub payload: PayloadSource,
}

impl FileSubmission {
    pub fn new(descriptor: FileDescriptor, payload: PayloadSource) -> Self {
        Self { descriptor, payload }
    }

    /// In-memory submission; the descriptor size is taken from the buffer.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            descriptor: FileDescriptor::new(name, data.len() as u64, mime_type),
            payload: PayloadSource::Bytes(data),
        }
    }
}

/// 队列事件
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// 新条目入队
    ItemsAdded {
        owner_id: OwnerId,
        item_ids: Vec<ItemId>,
    },

    /// 条目状态变更
    StateChanged {
        id: ItemId,
        old_status: ItemStatus,
        new_status: ItemStatus,
    },

    /// 进度更新（仅在条目持有传输通道时发出）
    Progress {
        id: ItemId,
        percent: u8,
        bytes_transferred: u64,
    },

    /// 条目首次完成，同一条目最多发一次
    ItemCompleted { item: UploadItem },

    /// 某 owner 的整批结算完毕，同一批次最多发一次
    BatchSettled {
        owner_id: OwnerId,
        succeeded: Vec<UploadItem>,
        failed: Vec<UploadItem>,
    },
}

/// 管理器命令
pub(crate) enum ManagerCommand {
    AddFiles {
        owner_id: OwnerId,
        files: Vec<FileSubmission>,
        reply: oneshot::Sender<Admission>,
    },
    StartUpload {
        owner_id: OwnerId,
        reply: oneshot::Sender<()>,
    },
    RemoveFile {
        id: ItemId,
        reply: oneshot::Sender<()>,
    },
    CancelItem {
        id: ItemId,
        reply: oneshot::Sender<()>,
    },
    CancelAll {
        owner_id: OwnerId,
        reply: oneshot::Sender<()>,
    },
    RetryItem {
        id: ItemId,
        reply: oneshot::Sender<()>,
    },
    RetryAllFailed {
        owner_id: OwnerId,
        reply: oneshot::Sender<()>,
    },
    ResetForMoreFiles {
        owner_id: OwnerId,
        reply: oneshot::Sender<()>,
    },
    CleanSettled {
        owner_id: OwnerId,
        reply: oneshot::Sender<usize>,
    },
    TeardownOwner {
        owner_id: OwnerId,
        reply: oneshot::Sender<()>,
    },
    GetItems {
        owner_id: OwnerId,
        reply: oneshot::Sender<Vec<UploadItem>>,
    },
    GetStatus {
        owner_id: OwnerId,
        reply: oneshot::Sender<QueueStatus>,
    },
    GetActiveItem {
        owner_id: OwnerId,
        reply: oneshot::Sender<Option<ItemId>>,
    },
}

// 静态断言确保类型是 Send 的
const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<UploadItem>();
        assert_send::<QueueEvent>();
        assert_send::<FileSubmission>();
        assert_send::<ManagerCommand>();
    }
};
