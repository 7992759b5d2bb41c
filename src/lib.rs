pub mod core;
pub mod config;

// 重新导出核心类型
pub use crate::core::{
    Admission,
    ErrorReason,
    FileDescriptor,
    FileSubmission,
    FileValidator,
    FilteredEventReceiver,
    ItemId,
    ItemStatus,
    LimitValidator,
    OwnerId,
    OwnerQueue,
    PayloadSource,
    ProgressHandle,
    QueueError,
    QueueEvent,
    QueueStatus,
    QueueStore,
    RejectReason,
    RejectedFile,
    Result,
    TransportError,
    TransportErrorKind,
    UploadItem,
    UploadManager,
    UploadManagerBuilder,
    UploadManagerHandle,
    UploadMetadata,
    UploadTransport,
};
pub use crate::config::QueueConfig;
