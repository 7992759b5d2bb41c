use std::collections::HashMap;
use std::sync::Arc;
use super::types::{ItemId, PayloadSource};

/// Payload 侧表
///
/// 内容句柄不进队列状态：这里按条目 id 持有唯一一份，派发时以 `Arc`
/// 交给传输任务。写入只发生在入队时，清除只发生在移除/销毁时，
/// 与条目生命周期一一对应。
#[derive(Default)]
pub(crate) struct PayloadArena {
    entries: HashMap<ItemId, Arc<PayloadSource>>,
}

impl PayloadArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ItemId, payload: PayloadSource) {
        self.entries.insert(id, Arc::new(payload));
    }

    pub fn get(&self, id: &ItemId) -> Option<Arc<PayloadSource>> {
        self.entries.get(id).cloned()
    }

    pub fn remove(&mut self, id: &ItemId) {
        self.entries.remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::OwnerId;
    use bytes::Bytes;

    #[test]
    fn test_lifecycle_tied_to_item() {
        let owner = OwnerId::from("o1");
        let id = ItemId::generate(&owner);
        let mut arena = PayloadArena::new();

        arena.insert(id.clone(), PayloadSource::Bytes(Bytes::from_static(b"data")));
        assert_eq!(arena.len(), 1);
        assert!(arena.get(&id).is_some());

        // 派发持有的 Arc 不影响移除
        let held = arena.get(&id).unwrap();
        arena.remove(&id);
        assert_eq!(arena.len(), 0);
        assert!(arena.get(&id).is_none());
        assert!(matches!(*held, PayloadSource::Bytes(_)));
    }
}
