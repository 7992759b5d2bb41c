mod callbacks;
mod driver;
mod errors;
mod manager;
mod payload;
mod store;
mod traits;
mod types;
mod validate;

pub use errors::{QueueError, Result, TransportError, TransportErrorKind};
pub use manager::{
    FilteredEventReceiver,
    OwnerQueue,
    UploadManager,
    UploadManagerBuilder,
    UploadManagerHandle,
};
pub use store::{QueueStore, StatusChange, Transition};
pub use traits::{ProgressHandle, UploadTransport};
pub use types::{
    ErrorReason,
    FileDescriptor,
    FileSubmission,
    ItemId,
    ItemStatus,
    OwnerId,
    PayloadSource,
    QueueEvent,
    QueueStatus,
    UploadItem,
    UploadMetadata,
};
pub use validate::{Admission, FileValidator, LimitValidator, RejectReason, RejectedFile};
