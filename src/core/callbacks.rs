use std::collections::{HashMap, HashSet};
use tokio::sync::broadcast;
use super::types::{ItemId, ItemStatus, OwnerId, QueueEvent, UploadItem};

/// 回调聚合器
///
/// 把状态转移翻译成对外通知，并保证去重：同一条目的完成通知、
/// 同一批次的结算通知各自最多发一次，重复或乱序的事件不会重放。
pub(crate) struct CallbackAggregator {
    event_tx: broadcast::Sender<QueueEvent>,
    /// 已发过完成通知的条目，reset 新批次时清空
    notified_items: HashMap<OwnerId, HashSet<ItemId>>,
    /// 已在某次批次结算中报告过的条目，owner 存活期间保留
    reported_in_batch: HashMap<OwnerId, HashSet<ItemId>>,
}

impl CallbackAggregator {
    pub fn new(event_tx: broadcast::Sender<QueueEvent>) -> Self {
        Self {
            event_tx,
            notified_items: HashMap::new(),
            reported_in_batch: HashMap::new(),
        }
    }

    /// Fire `ItemCompleted` the first time an item reaches `Completed`.
    pub fn item_completed(&mut self, item: &UploadItem) {
        if item.status != ItemStatus::Completed {
            return;
        }

        let notified = self
            .notified_items
            .entry(item.owner_id.clone())
            .or_default();
        if notified.insert(item.id.clone()) {
            let _ = self.event_tx.send(QueueEvent::ItemCompleted { item: item.clone() });
        }
    }

    /// Fire `BatchSettled` for the items settled in this batch, excluding
    /// anything already reported for the same owner.
    pub fn batch_settled(&mut self, owner_id: &OwnerId, items: &[UploadItem]) {
        let reported = self
            .reported_in_batch
            .entry(owner_id.clone())
            .or_default();

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for item in items {
            if !item.status.is_terminal() || reported.contains(&item.id) {
                continue;
            }
            match item.status {
                ItemStatus::Completed => succeeded.push(item.clone()),
                // 取消的条目也落在 failed 桶里，由 error_reason 区分
                _ => failed.push(item.clone()),
            }
        }

        if succeeded.is_empty() && failed.is_empty() {
            return;
        }
        for item in succeeded.iter().chain(failed.iter()) {
            reported.insert(item.id.clone());
        }

        let _ = self.event_tx.send(QueueEvent::BatchSettled {
            owner_id: owner_id.clone(),
            succeeded,
            failed,
        });
    }

    /// 新批次开始（resetForMoreFiles），条目完成通知的去重集清零。
    pub fn reset_owner(&mut self, owner_id: &OwnerId) {
        self.notified_items.remove(owner_id);
    }

    /// Owner 销毁，全部遗忘。
    pub fn forget_owner(&mut self, owner_id: &OwnerId) {
        self.notified_items.remove(owner_id);
        self.reported_in_batch.remove(owner_id);
    }
}
