use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use super::callbacks::CallbackAggregator;
use super::errors::{TransportError, TransportErrorKind};
use super::payload::PayloadArena;
use super::store::{QueueStore, Transition};
use super::traits::{ProgressHandle, UploadTransport};
use super::types::{
    ErrorReason,
    FileSubmission,
    ItemId,
    ItemStatus,
    ManagerCommand,
    OwnerId,
    QueueEvent,
    UploadMetadata,
};
use super::validate::{Admission, FileValidator, RejectedFile};

/// 传输任务回报给驱动层的内部事件
#[derive(Debug)]
pub(crate) enum DriverEvent {
    Progress {
        id: ItemId,
        seq: u64,
        percent: u8,
        bytes_transferred: u64,
    },
    Settled {
        id: ItemId,
        seq: u64,
        outcome: Result<UploadMetadata, TransportError>,
    },
}

/// 一次派发的在途记录
struct InFlight {
    /// 派发序号：重试会为同一 id 产生新的派发，迟到事件靠它甄别
    seq: u64,
    token: CancellationToken,
}

/// 驱动层工作器：纯队列状态和带副作用的传输之间的桥
///
/// 单任务持有全部可变状态，命令与传输回报都经通道串行进入，
/// 状态变更从调用方视角是同步原子的。
pub(crate) struct DriverWorker {
    transport: Arc<dyn UploadTransport>,
    validator: Arc<dyn FileValidator>,
    store: QueueStore,
    payloads: PayloadArena,
    callbacks: CallbackAggregator,
    in_flight: HashMap<ItemId, InFlight>,
    next_seq: u64,
    event_tx: broadcast::Sender<QueueEvent>,
    driver_tx: mpsc::UnboundedSender<DriverEvent>,
}

impl DriverWorker {
    pub(crate) async fn run(
        transport: Arc<dyn UploadTransport>,
        validator: Arc<dyn FileValidator>,
        mut command_rx: mpsc::Receiver<ManagerCommand>,
        event_tx: broadcast::Sender<QueueEvent>,
    ) {
        let (driver_tx, mut driver_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            transport,
            validator,
            store: QueueStore::new(),
            payloads: PayloadArena::new(),
            callbacks: CallbackAggregator::new(event_tx.clone()),
            in_flight: HashMap::new(),
            next_seq: 0,
            event_tx,
            driver_tx,
        };

        // 主事件循环
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => worker.handle_command(command),
                    // 所有管理器句柄已释放
                    None => break,
                },
                Some(event) = driver_rx.recv() => {
                    worker.handle_driver_event(event);
                }
            }
        }

        // 中止仍在途的传输
        for (id, in_flight) in worker.in_flight.drain() {
            debug!(item = %id, "aborting in-flight upload on shutdown");
            in_flight.token.cancel();
        }
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::AddFiles { owner_id, files, reply } => {
                let admission = self.add_files(&owner_id, files);
                let _ = reply.send(admission);
            }
            ManagerCommand::StartUpload { owner_id, reply } => {
                let transition = self.store.start_upload(&owner_id);
                self.apply(transition);
                let _ = reply.send(());
            }
            ManagerCommand::RemoveFile { id, reply } => {
                self.remove_file(&id);
                let _ = reply.send(());
            }
            ManagerCommand::CancelItem { id, reply } => {
                self.cancel_item(&id);
                let _ = reply.send(());
            }
            ManagerCommand::CancelAll { owner_id, reply } => {
                self.cancel_all(&owner_id);
                let _ = reply.send(());
            }
            ManagerCommand::RetryItem { id, reply } => {
                let transition = self.store.retry_item(&id);
                self.apply(transition);
                let _ = reply.send(());
            }
            ManagerCommand::RetryAllFailed { owner_id, reply } => {
                let transition = self.store.retry_all_failed(&owner_id);
                self.apply(transition);
                let _ = reply.send(());
            }
            ManagerCommand::ResetForMoreFiles { owner_id, reply } => {
                self.store.reset_for_more_files(&owner_id);
                self.callbacks.reset_owner(&owner_id);
                let _ = reply.send(());
            }
            ManagerCommand::CleanSettled { owner_id, reply } => {
                let transition = self.store.clean_settled(&owner_id);
                let count = transition.removed.len();
                self.apply(transition);
                let _ = reply.send(count);
            }
            ManagerCommand::TeardownOwner { owner_id, reply } => {
                self.teardown_owner(&owner_id);
                let _ = reply.send(());
            }
            ManagerCommand::GetItems { owner_id, reply } => {
                let _ = reply.send(self.store.items(&owner_id));
            }
            ManagerCommand::GetStatus { owner_id, reply } => {
                let _ = reply.send(self.store.status(&owner_id));
            }
            ManagerCommand::GetActiveItem { owner_id, reply } => {
                let _ = reply.send(self.store.active_item(&owner_id));
            }
        }
    }

    fn handle_driver_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Progress { id, seq, percent, bytes_transferred } => {
                if !self.is_current_attempt(&id, seq) {
                    debug!(item = %id, seq, "stale progress dropped");
                    return;
                }
                let transition = self.store.report_progress(&id, percent, bytes_transferred);
                self.apply(transition);
            }
            DriverEvent::Settled { id, seq, outcome } => {
                if !self.is_current_attempt(&id, seq) {
                    debug!(item = %id, seq, "stale settlement dropped");
                    return;
                }
                self.in_flight.remove(&id);

                let transition = match outcome {
                    Ok(metadata) => self.store.settle_success(&id, metadata),
                    Err(err) => {
                        if err.kind != TransportErrorKind::Aborted {
                            warn!(item = %id, error = %err, "upload failed");
                        }
                        self.store
                            .settle_failure(&id, err.kind.into(), Some(err.message))
                    }
                };
                self.apply(transition);
            }
        }
    }

    /// 验证、入队、登记 payload，部分成功不影响其余文件。
    fn add_files(&mut self, owner_id: &OwnerId, files: Vec<FileSubmission>) -> Admission {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for FileSubmission { descriptor, payload } in files {
            match self.validator.validate(&descriptor) {
                Ok(()) => accepted.push((descriptor, payload)),
                Err(reason) => {
                    debug!(file = %descriptor.name, %reason, "file rejected");
                    rejected.push(RejectedFile { descriptor, reason });
                }
            }
        }

        let descriptors = accepted.iter().map(|(descriptor, _)| descriptor.clone()).collect();
        let admitted = self.store.add_items(owner_id, descriptors);
        for (item, (_, payload)) in admitted.iter().zip(accepted) {
            self.payloads.insert(item.id.clone(), payload);
        }

        if !admitted.is_empty() {
            let _ = self.event_tx.send(QueueEvent::ItemsAdded {
                owner_id: owner_id.clone(),
                item_ids: admitted.iter().map(|item| item.id.clone()).collect(),
            });
        }

        Admission { admitted, rejected }
    }

    /// 逻辑取消立即生效；在途传输被要求中止，其迟到事件按序号丢弃。
    fn cancel_item(&mut self, id: &ItemId) {
        if let Some(in_flight) = self.in_flight.remove(id) {
            in_flight.token.cancel();
        }
        let transition = self.store.cancel_item(id);
        self.apply(transition);
    }

    fn cancel_all(&mut self, owner_id: &OwnerId) {
        if let Some(active_id) = self.store.active_item(owner_id) {
            if let Some(in_flight) = self.in_flight.remove(&active_id) {
                in_flight.token.cancel();
            }
        }
        let transition = self.store.cancel_all(owner_id);
        self.apply(transition);
    }

    /// 移除前先取消：在途条目直接移除是未定义行为，这里替调用方补上取消。
    fn remove_file(&mut self, id: &ItemId) {
        if self.store.get(id).is_some_and(|item| item.active) {
            self.cancel_item(id);
        }
        let transition = self.store.remove_item(id);
        self.apply(transition);
    }

    fn teardown_owner(&mut self, owner_id: &OwnerId) {
        if let Some(active_id) = self.store.active_item(owner_id) {
            if let Some(in_flight) = self.in_flight.remove(&active_id) {
                in_flight.token.cancel();
            }
        }
        let removed = self.store.remove_owner(owner_id);
        for id in &removed {
            self.payloads.remove(id);
        }
        self.callbacks.forget_owner(owner_id);
        debug!(owner = %owner_id, items = removed.len(), "owner torn down");
    }

    /// 把一次转移的后果落地：事件、回调、payload 释放、派发下一个。
    fn apply(&mut self, transition: Transition) {
        for change in &transition.changes {
            let _ = self.event_tx.send(QueueEvent::StateChanged {
                id: change.id.clone(),
                old_status: change.from,
                new_status: change.to,
            });
            if change.to == ItemStatus::Completed {
                if let Some(item) = self.store.get(&change.id) {
                    let item = item.clone();
                    self.callbacks.item_completed(&item);
                }
            }
        }

        if let Some((id, percent, bytes_transferred)) = &transition.progress {
            let _ = self.event_tx.send(QueueEvent::Progress {
                id: id.clone(),
                percent: *percent,
                bytes_transferred: *bytes_transferred,
            });
        }

        if let Some((owner_id, _)) = &transition.queue_settled {
            let items = self.store.items(owner_id);
            self.callbacks.batch_settled(owner_id, &items);
        }

        for id in &transition.removed {
            self.payloads.remove(id);
        }

        if let Some(id) = transition.activated {
            self.dispatch(id);
        }
    }

    /// 为新激活的条目发起传输。幂等：同一条目在途期间绝不二次派发。
    fn dispatch(&mut self, id: ItemId) {
        let Some(item) = self.store.get(&id) else {
            return;
        };
        if !item.active || item.status != ItemStatus::Uploading {
            return;
        }
        if self.in_flight.contains_key(&id) {
            debug!(item = %id, "dispatch skipped, already in flight");
            return;
        }

        let Some(payload) = self.payloads.get(&id) else {
            // 侧表与队列状态脱节，按服务端错误结算
            error!(item = %id, "payload missing at dispatch");
            let transition =
                self.store
                    .settle_failure(&id, ErrorReason::Server, Some("payload missing".to_string()));
            self.apply(transition);
            return;
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        let token = CancellationToken::new();
        self.in_flight.insert(id.clone(), InFlight { seq, token: token.clone() });

        let transport = self.transport.clone();
        let driver_tx = self.driver_tx.clone();
        let progress = ProgressHandle {
            id: id.clone(),
            seq,
            tx: driver_tx.clone(),
        };

        tokio::spawn(async move {
            let outcome = tokio::select! {
                result = transport.send_upload(payload, progress) => result,
                _ = token.cancelled() => Err(TransportError::aborted()),
            };
            let _ = driver_tx.send(DriverEvent::Settled { id, seq, outcome });
        });
    }

    fn is_current_attempt(&self, id: &ItemId, seq: u64) -> bool {
        self.in_flight.get(id).is_some_and(|in_flight| in_flight.seq == seq)
    }
}
