use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::mpsc;
use super::driver::DriverEvent;
use super::errors::TransportError;
use super::types::{ItemId, PayloadSource, UploadMetadata};

/// 传输协作方接口 - 真正执行上传的一方实现此 trait
///
/// 管理器保证：同一 owner 同时最多只有一个 `send_upload` 调用在途。
/// 取消通过包裹在外的 CancellationToken 完成，实现方不必自己处理中止。
#[async_trait]
pub trait UploadTransport: Send + Sync + 'static {
    /// 执行一次上传，经 `progress` 汇报 0-100 的进度，
    /// 成功时返回服务端分配的元数据。
    async fn send_upload(
        &self,
        payload: Arc<PayloadSource>,
        progress: ProgressHandle,
    ) -> Result<UploadMetadata, TransportError>;
}

/// 进度回传句柄，跟随一次派发，过期事件会被驱动层丢弃
#[derive(Clone)]
pub struct ProgressHandle {
    pub(crate) id: ItemId,
    pub(crate) seq: u64,
    pub(crate) tx: mpsc::UnboundedSender<DriverEvent>,
}

impl ProgressHandle {
    /// Report progress for the in-flight upload. Safe to call from any task;
    /// events arriving after settlement or cancellation are dropped.
    pub fn report(&self, percent: u8, bytes_transferred: u64) {
        let _ = self.tx.send(DriverEvent::Progress {
            id: self.id.clone(),
            seq: self.seq,
            percent: percent.min(100),
            bytes_transferred,
        });
    }
}
