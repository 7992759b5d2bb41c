use std::collections::{HashMap, VecDeque};
use chrono::Utc;
use super::types::{
    ErrorReason,
    FileDescriptor,
    ItemId,
    ItemStatus,
    OwnerId,
    QueueStatus,
    UploadItem,
    UploadMetadata,
};

/// 一次状态变更记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: ItemId,
    pub from: ItemStatus,
    pub to: ItemStatus,
}

/// 一次转移操作产生的后果，驱动层据此执行副作用
///
/// 所有操作都是全函数：非法组合返回空的 Transition，从不报错。
#[derive(Debug, Default)]
pub struct Transition {
    pub changes: Vec<StatusChange>,
    /// 本次操作中新占用传输通道的条目，需要派发
    pub activated: Option<ItemId>,
    /// 被采纳的进度更新
    pub progress: Option<(ItemId, u8, u64)>,
    /// 该 owner 的整批由 Uploading 进入结算态
    pub queue_settled: Option<(OwnerId, QueueStatus)>,
    /// 被移除的条目，payload 随之释放
    pub removed: Vec<ItemId>,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
            && self.activated.is_none()
            && self.progress.is_none()
            && self.queue_settled.is_none()
            && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
struct OwnerQueue {
    /// 插入顺序保留，先进先传
    items: Vec<UploadItem>,
    /// 到达 Waiting 状态的先后顺序，可能残留已取消条目的 id
    waiting: VecDeque<ItemId>,
    active_item_id: Option<ItemId>,
    /// resetForMoreFiles 之后为 true：已结算的推导状态对外显示为 Selected
    resumed: bool,
}

impl OwnerQueue {
    fn status(&self) -> QueueStatus {
        let derived = QueueStatus::derive(&self.items);
        if self.resumed && derived.is_settled() {
            QueueStatus::Selected
        } else {
            derived
        }
    }
}

/// 纯状态容器：每个 owner 一条有序队列
///
/// 不做任何 I/O，所有变更经由这里的转移操作完成。
#[derive(Debug, Default)]
pub struct QueueStore {
    queues: HashMap<OwnerId, OwnerQueue>,
    /// 条目 id 到 owner 的索引，id 全局唯一
    index: HashMap<ItemId, OwnerId>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append validated descriptors as `Selected` items.
    ///
    /// If the owner's batch was already settled, the new work supersedes it:
    /// the aggregate flips back to `Selected` without discarding history.
    pub fn add_items(&mut self, owner_id: &OwnerId, descriptors: Vec<FileDescriptor>) -> Vec<UploadItem> {
        let queue = self.queues.entry(owner_id.clone()).or_default();
        if !descriptors.is_empty() && queue.status().is_settled() {
            queue.resumed = true;
        }

        let mut added = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let item = UploadItem::new(owner_id.clone(), descriptor);
            self.index.insert(item.id.clone(), owner_id.clone());
            added.push(item.clone());
            queue.items.push(item);
        }

        added
    }

    /// Promote every `Selected` item to `Waiting` and, if nothing is in
    /// flight, hand the first `Waiting` item to the driver.
    pub fn start_upload(&mut self, owner_id: &OwnerId) -> Transition {
        let Some(queue) = self.queues.get_mut(owner_id) else {
            return Transition::default();
        };
        let pre = queue.status();
        let mut transition = Transition::default();

        for item in queue.items.iter_mut() {
            if item.status == ItemStatus::Selected {
                item.status = ItemStatus::Waiting;
                queue.waiting.push_back(item.id.clone());
                transition.changes.push(StatusChange {
                    id: item.id.clone(),
                    from: ItemStatus::Selected,
                    to: ItemStatus::Waiting,
                });
            }
        }

        if !transition.changes.is_empty() {
            queue.resumed = false;
        }
        if queue.active_item_id.is_none() {
            Self::advance(queue, &mut transition);
        }

        Self::finish(owner_id, queue, pre, transition)
    }

    /// No-op unless the item currently holds the transfer lane; late progress
    /// from a cancelled or settled attempt is silently dropped.
    pub fn report_progress(&mut self, id: &ItemId, percent: u8, bytes_transferred: u64) -> Transition {
        let Some(item) = self.get_mut(id) else {
            return Transition::default();
        };
        if !item.active {
            return Transition::default();
        }

        let percent = percent.min(100);
        item.progress = percent;
        item.bytes_transferred = bytes_transferred;

        Transition {
            progress: Some((id.clone(), percent, bytes_transferred)),
            ..Transition::default()
        }
    }

    /// Settle the active item as completed and advance the queue.
    pub fn settle_success(&mut self, id: &ItemId, metadata: UploadMetadata) -> Transition {
        self.settle(id, Ok(metadata))
    }

    /// Settle the active item as failed and advance the queue.
    pub fn settle_failure(&mut self, id: &ItemId, reason: ErrorReason, message: Option<String>) -> Transition {
        self.settle(id, Err((reason, message)))
    }

    fn settle(
        &mut self,
        id: &ItemId,
        outcome: Result<UploadMetadata, (ErrorReason, Option<String>)>,
    ) -> Transition {
        let Some(owner_id) = self.index.get(id).cloned() else {
            return Transition::default();
        };
        let Some(queue) = self.queues.get_mut(&owner_id) else {
            return Transition::default();
        };
        let pre = queue.status();
        let mut transition = Transition::default();

        {
            let Some(item) = queue.items.iter_mut().find(|item| &item.id == id) else {
                return Transition::default();
            };
            // 重复/迟到的结算直接丢弃
            if !item.active {
                return Transition::default();
            }

            let from = item.status;
            match outcome {
                Ok(metadata) => {
                    item.status = ItemStatus::Completed;
                    item.progress = 100;
                    item.metadata = Some(metadata);
                }
                Err((reason, message)) => {
                    item.status = ItemStatus::Failed;
                    item.error_reason = Some(reason);
                    item.error = message;
                }
            }
            item.active = false;
            item.settled_at = Some(Utc::now());
            transition.changes.push(StatusChange {
                id: item.id.clone(),
                from,
                to: item.status,
            });
        }

        if queue.active_item_id.as_ref() == Some(id) {
            queue.active_item_id = None;
            Self::advance(queue, &mut transition);
        }

        Self::finish(&owner_id, queue, pre, transition)
    }

    /// Cancel one item. `Uploading` settles as failed/cancelled and the queue
    /// advances; `Waiting` flips directly; settled items are left untouched.
    pub fn cancel_item(&mut self, id: &ItemId) -> Transition {
        let Some(owner_id) = self.index.get(id).cloned() else {
            return Transition::default();
        };
        let Some(queue) = self.queues.get_mut(&owner_id) else {
            return Transition::default();
        };
        let pre = queue.status();
        let mut transition = Transition::default();

        let Some(item) = queue.items.iter_mut().find(|item| &item.id == id) else {
            return Transition::default();
        };
        match item.status {
            ItemStatus::Uploading if item.active => {
                Self::mark_cancelled(item, &mut transition);
                if queue.active_item_id.as_ref() == Some(id) {
                    queue.active_item_id = None;
                    Self::advance(queue, &mut transition);
                }
            }
            ItemStatus::Waiting => {
                Self::mark_cancelled(item, &mut transition);
                queue.waiting.retain(|waiting_id| waiting_id != id);
            }
            // Selected / Completed / Failed：取消是空操作
            _ => {}
        }

        Self::finish(&owner_id, queue, pre, transition)
    }

    /// Cancel every `Uploading`/`Waiting` item of one owner.
    pub fn cancel_all(&mut self, owner_id: &OwnerId) -> Transition {
        let Some(queue) = self.queues.get_mut(owner_id) else {
            return Transition::default();
        };
        let pre = queue.status();
        let mut transition = Transition::default();

        for item in queue.items.iter_mut() {
            match item.status {
                ItemStatus::Waiting => Self::mark_cancelled(item, &mut transition),
                ItemStatus::Uploading if item.active => Self::mark_cancelled(item, &mut transition),
                _ => {}
            }
        }
        queue.waiting.clear();
        queue.active_item_id = None;

        Self::finish(owner_id, queue, pre, transition)
    }

    /// Return one failed item to `Waiting`, clearing its error state; it is
    /// promoted immediately when the lane is free.
    pub fn retry_item(&mut self, id: &ItemId) -> Transition {
        let Some(owner_id) = self.index.get(id).cloned() else {
            return Transition::default();
        };
        let Some(queue) = self.queues.get_mut(&owner_id) else {
            return Transition::default();
        };
        let pre = queue.status();
        let mut transition = Transition::default();

        {
            let Some(item) = queue.items.iter_mut().find(|item| &item.id == id) else {
                return Transition::default();
            };
            if item.status != ItemStatus::Failed || item.active {
                return Transition::default();
            }
            Self::mark_retried(item, &mut transition);
        }
        queue.waiting.push_back(id.clone());
        if queue.active_item_id.is_none() {
            Self::advance(queue, &mut transition);
        }

        Self::finish(&owner_id, queue, pre, transition)
    }

    /// Retry every failed item of one owner. A currently uploading item is
    /// untouched; retried items queue up behind it in item order.
    pub fn retry_all_failed(&mut self, owner_id: &OwnerId) -> Transition {
        let Some(queue) = self.queues.get_mut(owner_id) else {
            return Transition::default();
        };
        let pre = queue.status();
        let mut transition = Transition::default();

        for item in queue.items.iter_mut() {
            if item.status == ItemStatus::Failed && !item.active {
                Self::mark_retried(item, &mut transition);
                queue.waiting.push_back(item.id.clone());
            }
        }
        if queue.active_item_id.is_none() {
            Self::advance(queue, &mut transition);
        }

        Self::finish(owner_id, queue, pre, transition)
    }

    /// Excise one item. An item still holding the lane is not removable:
    /// cancellation must precede removal, so this is a no-op for it.
    pub fn remove_item(&mut self, id: &ItemId) -> Transition {
        let Some(owner_id) = self.index.get(id).cloned() else {
            return Transition::default();
        };
        let Some(queue) = self.queues.get_mut(&owner_id) else {
            return Transition::default();
        };
        let pre = queue.status();
        let mut transition = Transition::default();

        let Some(position) = queue.items.iter().position(|item| &item.id == id) else {
            return Transition::default();
        };
        if queue.items[position].active {
            return Transition::default();
        }

        queue.items.remove(position);
        queue.waiting.retain(|waiting_id| waiting_id != id);
        self.index.remove(id);
        transition.removed.push(id.clone());

        Self::finish(&owner_id, queue, pre, transition)
    }

    /// When the batch is settled, show the queue as `Selected` again without
    /// altering any item, so follow-up `add_items` continues the same queue.
    pub fn reset_for_more_files(&mut self, owner_id: &OwnerId) -> Transition {
        if let Some(queue) = self.queues.get_mut(owner_id) {
            if QueueStatus::derive(&queue.items).is_settled() {
                queue.resumed = true;
            }
        }
        Transition::default()
    }

    /// Drop all settled (non-active) items of one owner.
    pub fn clean_settled(&mut self, owner_id: &OwnerId) -> Transition {
        let Some(queue) = self.queues.get_mut(owner_id) else {
            return Transition::default();
        };
        let pre = queue.status();
        let mut transition = Transition::default();

        let removed: Vec<ItemId> = queue
            .items
            .iter()
            .filter(|item| item.status.is_terminal() && !item.active)
            .map(|item| item.id.clone())
            .collect();
        queue.items.retain(|item| !(item.status.is_terminal() && !item.active));
        for id in &removed {
            self.index.remove(id);
        }
        transition.removed = removed;

        Self::finish(owner_id, queue, pre, transition)
    }

    /// Tear down one owner entirely. Returns every removed item id so the
    /// caller can release the matching payloads.
    pub fn remove_owner(&mut self, owner_id: &OwnerId) -> Vec<ItemId> {
        let Some(queue) = self.queues.remove(owner_id) else {
            return Vec::new();
        };
        let ids: Vec<ItemId> = queue.items.into_iter().map(|item| item.id).collect();
        for id in &ids {
            self.index.remove(id);
        }
        ids
    }

    // ---- 只读投影 ----

    pub fn items(&self, owner_id: &OwnerId) -> Vec<UploadItem> {
        self.queues
            .get(owner_id)
            .map(|queue| queue.items.clone())
            .unwrap_or_default()
    }

    pub fn status(&self, owner_id: &OwnerId) -> QueueStatus {
        self.queues
            .get(owner_id)
            .map(|queue| queue.status())
            .unwrap_or(QueueStatus::Idle)
    }

    pub fn active_item(&self, owner_id: &OwnerId) -> Option<ItemId> {
        self.queues
            .get(owner_id)
            .and_then(|queue| queue.active_item_id.clone())
    }

    pub fn get(&self, id: &ItemId) -> Option<&UploadItem> {
        let owner_id = self.index.get(id)?;
        self.queues
            .get(owner_id)?
            .items
            .iter()
            .find(|item| &item.id == id)
    }

    fn get_mut(&mut self, id: &ItemId) -> Option<&mut UploadItem> {
        let owner_id = self.index.get(id)?;
        self.queues
            .get_mut(owner_id)?
            .items
            .iter_mut()
            .find(|item| &item.id == id)
    }

    // ---- 内部转移 ----

    /// 提升队首等待条目为上传中，占用传输通道。
    fn advance(queue: &mut OwnerQueue, transition: &mut Transition) {
        while let Some(next_id) = queue.waiting.pop_front() {
            let Some(item) = queue.items.iter_mut().find(|item| item.id == next_id) else {
                continue;
            };
            // 残留的已取消/已移除 id，跳过
            if item.status != ItemStatus::Waiting {
                continue;
            }

            item.status = ItemStatus::Uploading;
            item.active = true;
            item.started_at = Some(Utc::now());
            queue.active_item_id = Some(item.id.clone());
            queue.resumed = false;
            transition.changes.push(StatusChange {
                id: item.id.clone(),
                from: ItemStatus::Waiting,
                to: ItemStatus::Uploading,
            });
            transition.activated = Some(item.id.clone());
            return;
        }

        queue.active_item_id = None;
    }

    fn mark_cancelled(item: &mut UploadItem, transition: &mut Transition) {
        let from = item.status;
        item.status = ItemStatus::Failed;
        item.error_reason = Some(ErrorReason::Cancelled);
        item.error = None;
        item.active = false;
        item.settled_at = Some(Utc::now());
        transition.changes.push(StatusChange {
            id: item.id.clone(),
            from,
            to: ItemStatus::Failed,
        });
    }

    fn mark_retried(item: &mut UploadItem, transition: &mut Transition) {
        item.status = ItemStatus::Waiting;
        item.progress = 0;
        item.bytes_transferred = 0;
        item.error_reason = None;
        item.error = None;
        item.metadata = None;
        item.started_at = None;
        item.settled_at = None;
        transition.changes.push(StatusChange {
            id: item.id.clone(),
            from: ItemStatus::Failed,
            to: ItemStatus::Waiting,
        });
    }

    fn finish(
        owner_id: &OwnerId,
        queue: &OwnerQueue,
        pre: QueueStatus,
        mut transition: Transition,
    ) -> Transition {
        let post = queue.status();
        if pre == QueueStatus::Uploading && post.is_settled() {
            transition.queue_settled = Some((owner_id.clone(), post));
        }
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> OwnerId {
        OwnerId::from("o1")
    }

    fn descriptor(name: &str, size: u64) -> FileDescriptor {
        FileDescriptor::new(name, size, "application/octet-stream")
    }

    fn add_three(store: &mut QueueStore) -> Vec<ItemId> {
        store
            .add_items(
                &owner(),
                vec![descriptor("a", 10), descriptor("b", 20), descriptor("c", 30)],
            )
            .into_iter()
            .map(|item| item.id)
            .collect()
    }

    fn assert_single_flight(store: &QueueStore, owner_id: &OwnerId) {
        let active = store
            .items(owner_id)
            .iter()
            .filter(|item| item.active)
            .count();
        assert!(active <= 1, "more than one active item: {}", active);
    }

    #[test]
    fn test_added_items_start_selected() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);

        assert_eq!(ids.len(), 3);
        assert_eq!(store.status(&owner()), QueueStatus::Selected);
        for item in store.items(&owner()) {
            assert_eq!(item.status, ItemStatus::Selected);
            assert!(!item.active);
        }
    }

    #[test]
    fn test_fifo_advancement() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);

        let transition = store.start_upload(&owner());
        assert_eq!(transition.activated, Some(ids[0].clone()));
        assert_eq!(store.get(&ids[0]).unwrap().status, ItemStatus::Uploading);
        assert_eq!(store.get(&ids[1]).unwrap().status, ItemStatus::Waiting);
        assert_eq!(store.get(&ids[2]).unwrap().status, ItemStatus::Waiting);
        assert_eq!(store.active_item(&owner()), Some(ids[0].clone()));
        assert_eq!(store.status(&owner()), QueueStatus::Uploading);
        assert_single_flight(&store, &owner());

        let transition = store.settle_success(&ids[0], UploadMetadata::new("u/a"));
        assert_eq!(transition.activated, Some(ids[1].clone()));
        assert_single_flight(&store, &owner());

        let transition = store.settle_success(&ids[1], UploadMetadata::new("u/b"));
        assert_eq!(transition.activated, Some(ids[2].clone()));
        assert_single_flight(&store, &owner());
    }

    #[test]
    fn test_settle_success_finalizes_item() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());

        store.report_progress(&ids[0], 40, 4);
        store.settle_success(&ids[0], UploadMetadata::new("u/a"));

        let item = store.get(&ids[0]).unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.progress, 100);
        assert_eq!(item.metadata.as_ref().unwrap().url, "u/a");
        assert!(!item.active);
        assert!(item.settled_at.is_some());
    }

    #[test]
    fn test_stale_progress_ignored() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());
        store.settle_success(&ids[0], UploadMetadata::new("u/a"));

        // ids[0] 已结算，迟到的进度被丢弃
        let transition = store.report_progress(&ids[0], 55, 5);
        assert!(transition.is_noop());
        assert_eq!(store.get(&ids[0]).unwrap().progress, 100);
    }

    #[test]
    fn test_stale_settlement_ignored() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());

        let first = store.settle_success(&ids[0], UploadMetadata::new("u/a"));
        assert!(!first.is_noop());

        // 重复结算：条目不再 active，保持原状
        let duplicate = store.settle_success(&ids[0], UploadMetadata::new("u/other"));
        assert!(duplicate.is_noop());
        assert_eq!(store.get(&ids[0]).unwrap().metadata.as_ref().unwrap().url, "u/a");

        let late_failure = store.settle_failure(&ids[0], ErrorReason::Network, None);
        assert!(late_failure.is_noop());
        assert_eq!(store.get(&ids[0]).unwrap().status, ItemStatus::Completed);
    }

    #[test]
    fn test_cancel_uploading_advances() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());

        let transition = store.cancel_item(&ids[0]);
        assert_eq!(transition.activated, Some(ids[1].clone()));

        let item = store.get(&ids[0]).unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.error_reason, Some(ErrorReason::Cancelled));
        assert!(!item.active);
        assert_single_flight(&store, &owner());
    }

    #[test]
    fn test_cancel_waiting_is_direct() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());

        let transition = store.cancel_item(&ids[2]);
        assert!(transition.activated.is_none());
        assert_eq!(store.get(&ids[2]).unwrap().status, ItemStatus::Failed);
        assert_eq!(
            store.get(&ids[2]).unwrap().error_reason,
            Some(ErrorReason::Cancelled)
        );
        // 队首不受影响
        assert_eq!(store.active_item(&owner()), Some(ids[0].clone()));
    }

    #[test]
    fn test_cancel_completed_is_noop() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());
        store.settle_success(&ids[0], UploadMetadata::new("u/a"));

        let transition = store.cancel_item(&ids[0]);
        assert!(transition.is_noop());
        assert_eq!(store.get(&ids[0]).unwrap().status, ItemStatus::Completed);
    }

    #[test]
    fn test_cancel_all() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());

        let transition = store.cancel_all(&owner());
        assert_eq!(transition.changes.len(), 3);
        assert!(transition.activated.is_none());
        assert_eq!(store.active_item(&owner()), None);
        assert_eq!(store.status(&owner()), QueueStatus::Failed);
        for id in &ids {
            assert_eq!(store.get(id).unwrap().status, ItemStatus::Failed);
        }
    }

    #[test]
    fn test_cancel_then_retry_round_trip() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());
        store.report_progress(&ids[0], 60, 6);
        store.cancel_all(&owner());

        let transition = store.retry_item(&ids[0]);
        // 通道空闲，立即被提升
        assert_eq!(transition.activated, Some(ids[0].clone()));

        let item = store.get(&ids[0]).unwrap();
        assert_eq!(item.status, ItemStatus::Uploading);
        assert_eq!(item.progress, 0);
        assert_eq!(item.bytes_transferred, 0);
        assert!(item.error_reason.is_none());
        assert!(item.error.is_none());
    }

    #[test]
    fn test_retry_all_failed_queues_behind_active_item() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());

        // a 失败，b 占用通道
        store.settle_failure(&ids[0], ErrorReason::Network, Some("timeout".into()));
        assert_eq!(store.active_item(&owner()), Some(ids[1].clone()));

        let transition = store.retry_all_failed(&owner());
        assert!(transition.activated.is_none(), "active item must be untouched");
        assert_eq!(store.get(&ids[0]).unwrap().status, ItemStatus::Waiting);
        assert_eq!(store.active_item(&owner()), Some(ids[1].clone()));

        // b 结算后先轮到 c（先到达 Waiting），重试的 a 排在其后
        store.settle_success(&ids[1], UploadMetadata::new("u/b"));
        assert_eq!(store.active_item(&owner()), Some(ids[2].clone()));
        store.settle_success(&ids[2], UploadMetadata::new("u/c"));
        assert_eq!(store.active_item(&owner()), Some(ids[0].clone()));
    }

    #[test]
    fn test_retry_ignores_non_failed_items() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());

        assert!(store.retry_item(&ids[0]).is_noop());
        assert!(store.retry_item(&ids[1]).is_noop());
    }

    #[test]
    fn test_remove_active_item_is_rejected() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());

        let transition = store.remove_item(&ids[0]);
        assert!(transition.is_noop());
        assert!(store.get(&ids[0]).is_some());

        // 取消之后才能移除
        store.cancel_item(&ids[0]);
        let transition = store.remove_item(&ids[0]);
        assert_eq!(transition.removed, vec![ids[0].clone()]);
        assert!(store.get(&ids[0]).is_none());
    }

    #[test]
    fn test_add_after_settlement_flips_to_selected() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());
        store.cancel_all(&owner());
        assert_eq!(store.status(&owner()), QueueStatus::Failed);

        let added = store.add_items(&owner(), vec![descriptor("d", 40)]);
        assert_eq!(added.len(), 1);
        assert_eq!(store.status(&owner()), QueueStatus::Selected);
        // 历史条目仍在
        assert!(store.get(&ids[0]).is_some());
    }

    #[test]
    fn test_reset_for_more_files() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());
        for id in &ids {
            store.settle_success(id, UploadMetadata::new("u"));
        }
        assert_eq!(store.status(&owner()), QueueStatus::Completed);

        store.reset_for_more_files(&owner());
        assert_eq!(store.status(&owner()), QueueStatus::Selected);
        // 条目未被改动
        for id in &ids {
            assert_eq!(store.get(id).unwrap().status, ItemStatus::Completed);
        }
    }

    #[test]
    fn test_reset_on_unsettled_queue_is_noop() {
        let mut store = QueueStore::new();
        add_three(&mut store);
        store.reset_for_more_files(&owner());
        assert_eq!(store.status(&owner()), QueueStatus::Selected);

        store.start_upload(&owner());
        store.reset_for_more_files(&owner());
        assert_eq!(store.status(&owner()), QueueStatus::Uploading);
    }

    #[test]
    fn test_queue_settled_fires_on_last_settlement() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());

        // 场景：a 成功，b 取消，c 网络失败
        let t1 = store.settle_success(&ids[0], UploadMetadata::new("u/a"));
        assert!(t1.queue_settled.is_none());

        let t2 = store.cancel_item(&ids[1]);
        assert!(t2.queue_settled.is_none());
        assert_eq!(store.active_item(&owner()), Some(ids[2].clone()));

        let t3 = store.settle_failure(&ids[2], ErrorReason::Network, Some("down".into()));
        assert_eq!(t3.queue_settled, Some((owner(), QueueStatus::Failed)));
        assert_eq!(store.active_item(&owner()), None);
        assert_eq!(store.status(&owner()), QueueStatus::Failed);
    }

    #[test]
    fn test_clean_settled() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());
        store.settle_success(&ids[0], UploadMetadata::new("u/a"));
        store.cancel_item(&ids[1]);

        // c 仍在上传，只清掉 a、b
        let transition = store.clean_settled(&owner());
        assert_eq!(transition.removed.len(), 2);
        assert_eq!(store.items(&owner()).len(), 1);
        assert_eq!(store.active_item(&owner()), Some(ids[2].clone()));
    }

    #[test]
    fn test_remove_owner_returns_all_ids() {
        let mut store = QueueStore::new();
        let ids = add_three(&mut store);
        store.start_upload(&owner());

        let mut removed = store.remove_owner(&owner());
        removed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        let mut expected = ids.clone();
        expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(removed, expected);
        assert_eq!(store.status(&owner()), QueueStatus::Idle);
        assert!(store.get(&ids[0]).is_none());
    }

    #[test]
    fn test_owners_are_independent() {
        let mut store = QueueStore::new();
        let o1 = OwnerId::from("o1");
        let o2 = OwnerId::from("o2");
        let a = store.add_items(&o1, vec![descriptor("a", 10)]);
        let b = store.add_items(&o2, vec![descriptor("b", 20)]);

        store.start_upload(&o1);
        store.start_upload(&o2);

        // 两个 owner 各自持有一条传输通道
        assert_eq!(store.active_item(&o1), Some(a[0].id.clone()));
        assert_eq!(store.active_item(&o2), Some(b[0].id.clone()));
        assert_single_flight(&store, &o1);
        assert_single_flight(&store, &o2);

        store.cancel_all(&o1);
        assert_eq!(store.status(&o1), QueueStatus::Failed);
        assert_eq!(store.status(&o2), QueueStatus::Uploading);
    }

    #[test]
    fn test_operations_on_unknown_ids_are_total() {
        let mut store = QueueStore::new();
        let ghost = ItemId::generate(&owner());

        assert!(store.report_progress(&ghost, 10, 1).is_noop());
        assert!(store.settle_success(&ghost, UploadMetadata::new("u")).is_noop());
        assert!(store.settle_failure(&ghost, ErrorReason::Server, None).is_noop());
        assert!(store.cancel_item(&ghost).is_noop());
        assert!(store.retry_item(&ghost).is_noop());
        assert!(store.remove_item(&ghost).is_noop());
        assert!(store.start_upload(&owner()).is_noop());
        assert!(store.cancel_all(&owner()).is_noop());
    }
}
