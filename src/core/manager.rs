use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::config::QueueConfig;
use super::driver::DriverWorker;
use super::errors::{QueueError, Result};
use super::traits::UploadTransport;
use super::types::{
    FileSubmission,
    ItemId,
    ManagerCommand,
    OwnerId,
    QueueEvent,
    QueueStatus,
    UploadItem,
};
use super::validate::{Admission, FileValidator, LimitValidator};

/// 上传队列管理器句柄
///
/// 可自由克隆；所有操作都转发给后台工作任务，按到达顺序串行执行。
#[derive(Clone)]
pub struct UploadManager {
    command_tx: mpsc::Sender<ManagerCommand>,
    event_tx: broadcast::Sender<QueueEvent>,
}

/// 管理器 + 后台工作任务
pub struct UploadManagerHandle {
    pub manager: UploadManager,
    pub worker_handle: JoinHandle<()>,
}

impl UploadManagerHandle {
    /// Shut the worker down and wait for it to finish. Any other
    /// `UploadManager` clone still alive keeps the worker running.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.manager);
        self.worker_handle
            .await
            .map_err(|err| QueueError::WorkerPanic(err.to_string()))
    }
}

pub struct UploadManagerBuilder {
    config: QueueConfig,
    validator: Option<Arc<dyn FileValidator>>,
}

impl UploadManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
            validator: None,
        }
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// 替换默认的上限校验器。
    pub fn validator(mut self, validator: Arc<dyn FileValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn build(self, transport: Arc<dyn UploadTransport>) -> UploadManagerHandle {
        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(LimitValidator::from_config(&self.config)));

        let (command_tx, command_rx) = mpsc::channel(self.config.command_capacity);
        let (event_tx, _) = broadcast::channel(self.config.event_capacity);

        let worker_handle = tokio::spawn(DriverWorker::run(
            transport,
            validator,
            command_rx,
            event_tx.clone(),
        ));

        UploadManagerHandle {
            manager: UploadManager { command_tx, event_tx },
            worker_handle,
        }
    }
}

impl Default for UploadManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadManager {
    pub fn new(transport: Arc<dyn UploadTransport>) -> UploadManagerHandle {
        UploadManagerBuilder::new().build(transport)
    }

    pub fn builder() -> UploadManagerBuilder {
        UploadManagerBuilder::new()
    }

    /// 绑定某个 owner 的操作句柄。
    pub fn owner(&self, owner_id: impl Into<OwnerId>) -> OwnerQueue {
        OwnerQueue {
            owner_id: owner_id.into(),
            manager: self.clone(),
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ManagerCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| QueueError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| QueueError::ManagerShutdown)
    }

    /// Add files to one owner's queue. Validation happens up front; the
    /// result lists what was admitted and what was rejected and why.
    pub async fn add_files(
        &self,
        owner_id: &OwnerId,
        files: Vec<FileSubmission>,
    ) -> Result<Admission> {
        let owner_id = owner_id.clone();
        self.request(|reply| ManagerCommand::AddFiles { owner_id, files, reply })
            .await
    }

    /// Promote selected items to the upload queue and start the lane.
    pub async fn start_upload(&self, owner_id: &OwnerId) -> Result<()> {
        let owner_id = owner_id.clone();
        self.request(|reply| ManagerCommand::StartUpload { owner_id, reply })
            .await
    }

    /// Remove one item; a live upload is cancelled first.
    pub async fn remove_file(&self, id: &ItemId) -> Result<()> {
        let id = id.clone();
        self.request(|reply| ManagerCommand::RemoveFile { id, reply })
            .await
    }

    /// Cancel one item.
    pub async fn cancel_item(&self, id: &ItemId) -> Result<()> {
        let id = id.clone();
        self.request(|reply| ManagerCommand::CancelItem { id, reply })
            .await
    }

    /// Cancel every uploading/waiting item of one owner.
    pub async fn cancel_all(&self, owner_id: &OwnerId) -> Result<()> {
        let owner_id = owner_id.clone();
        self.request(|reply| ManagerCommand::CancelAll { owner_id, reply })
            .await
    }

    /// Retry one failed item.
    pub async fn retry_item(&self, id: &ItemId) -> Result<()> {
        let id = id.clone();
        self.request(|reply| ManagerCommand::RetryItem { id, reply })
            .await
    }

    /// Retry every failed item of one owner.
    pub async fn retry_all_failed(&self, owner_id: &OwnerId) -> Result<()> {
        let owner_id = owner_id.clone();
        self.request(|reply| ManagerCommand::RetryAllFailed { owner_id, reply })
            .await
    }

    /// Accept more files into a settled queue as a fresh batch.
    pub async fn reset_for_more_files(&self, owner_id: &OwnerId) -> Result<()> {
        let owner_id = owner_id.clone();
        self.request(|reply| ManagerCommand::ResetForMoreFiles { owner_id, reply })
            .await
    }

    /// Drop all settled items; returns how many were removed.
    pub async fn clean_settled(&self, owner_id: &OwnerId) -> Result<usize> {
        let owner_id = owner_id.clone();
        self.request(|reply| ManagerCommand::CleanSettled { owner_id, reply })
            .await
    }

    /// Tear one owner down: abort its transfer, drop its items and payloads.
    pub async fn teardown_owner(&self, owner_id: &OwnerId) -> Result<()> {
        let owner_id = owner_id.clone();
        self.request(|reply| ManagerCommand::TeardownOwner { owner_id, reply })
            .await
    }

    /// Snapshot of one owner's items, in queue order.
    pub async fn items(&self, owner_id: &OwnerId) -> Result<Vec<UploadItem>> {
        let owner_id = owner_id.clone();
        self.request(|reply| ManagerCommand::GetItems { owner_id, reply })
            .await
    }

    /// Aggregate status of one owner's queue.
    pub async fn queue_status(&self, owner_id: &OwnerId) -> Result<QueueStatus> {
        let owner_id = owner_id.clone();
        self.request(|reply| ManagerCommand::GetStatus { owner_id, reply })
            .await
    }

    /// Id of the item currently holding the owner's transfer lane.
    pub async fn active_item(&self, owner_id: &OwnerId) -> Result<Option<ItemId>> {
        let owner_id = owner_id.clone();
        self.request(|reply| ManagerCommand::GetActiveItem { owner_id, reply })
            .await
    }

    /// 订阅事件
    ///
    /// 注意：
    /// - 如果接收速度跟不上发送速度，可能会丢失事件（lagged error）
    /// - 每个订阅者都会收到完整的事件副本
    pub fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredEventReceiver<F>
    where
        F: Fn(&QueueEvent) -> bool,
    {
        FilteredEventReceiver {
            receiver: self.event_tx.subscribe(),
            filter,
        }
    }
}

/// 过滤的事件接收器
pub struct FilteredEventReceiver<F> {
    receiver: broadcast::Receiver<QueueEvent>,
    filter: F,
}

impl<F> FilteredEventReceiver<F>
where
    F: Fn(&QueueEvent) -> bool,
{
    pub async fn recv(&mut self) -> Result<QueueEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if (self.filter)(&event) {
                return Ok(event);
            }
        }
    }
}

/// 某个 owner 的队列句柄，暴露按 owner 的完整操作面
#[derive(Clone)]
pub struct OwnerQueue {
    owner_id: OwnerId,
    manager: UploadManager,
}

impl OwnerQueue {
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub async fn add_files(&self, files: Vec<FileSubmission>) -> Result<Admission> {
        self.manager.add_files(&self.owner_id, files).await
    }

    pub async fn start_upload(&self) -> Result<()> {
        self.manager.start_upload(&self.owner_id).await
    }

    pub async fn remove_file(&self, id: &ItemId) -> Result<()> {
        self.manager.remove_file(id).await
    }

    pub async fn cancel_item(&self, id: &ItemId) -> Result<()> {
        self.manager.cancel_item(id).await
    }

    pub async fn cancel_all(&self) -> Result<()> {
        self.manager.cancel_all(&self.owner_id).await
    }

    pub async fn retry_item(&self, id: &ItemId) -> Result<()> {
        self.manager.retry_item(id).await
    }

    pub async fn retry_all_failed(&self) -> Result<()> {
        self.manager.retry_all_failed(&self.owner_id).await
    }

    pub async fn reset_for_more_files(&self) -> Result<()> {
        self.manager.reset_for_more_files(&self.owner_id).await
    }

    pub async fn clean_settled(&self) -> Result<usize> {
        self.manager.clean_settled(&self.owner_id).await
    }

    pub async fn teardown(&self) -> Result<()> {
        self.manager.teardown_owner(&self.owner_id).await
    }

    pub async fn items(&self) -> Result<Vec<UploadItem>> {
        self.manager.items(&self.owner_id).await
    }

    pub async fn status(&self) -> Result<QueueStatus> {
        self.manager.queue_status(&self.owner_id).await
    }

    pub async fn active_item(&self) -> Result<Option<ItemId>> {
        self.manager.active_item(&self.owner_id).await
    }
}
