// ==========================================
// 变更推送模拟 - 用于集成测试
// ==========================================

use mes_downtime_core::domain::types::RecordKind;
use mes_downtime_core::error::{MesError, MesResult};
use mes_downtime_core::repository::{
    ChangeEvent, ChangeFeed, ChangeKind, FeedHandlers, FilterSpec, UnsubscribeHandle,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct Listener {
    kind: RecordKind,
    handlers: FeedHandlers,
}

#[derive(Default)]
pub struct FakeChangeFeed {
    listeners: Arc<Mutex<BTreeMap<u64, Listener>>>,
    next_id: AtomicU64,
    offline: AtomicBool,
}

impl FakeChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// 向某类记录的全部监听者推送变更
    pub fn emit(&self, kind: RecordKind, change: ChangeKind, id: &str) {
        let handlers: Vec<FeedHandlers> = self
            .listeners
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.kind == kind)
            .map(|l| l.handlers.clone())
            .collect();
        for h in handlers {
            (h.on_event)(ChangeEvent {
                kind: change,
                record_kind: kind,
                id: id.to_string(),
                data: None,
            });
        }
    }
}

impl ChangeFeed for FakeChangeFeed {
    fn subscribe(
        &self,
        kind: RecordKind,
        _filter: &FilterSpec,
        handlers: FeedHandlers,
    ) -> MesResult<UnsubscribeHandle> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(MesError::collaborator("subscribe", "feed offline"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap()
            .insert(id, Listener { kind, handlers });

        let listeners = Arc::clone(&self.listeners);
        Ok(UnsubscribeHandle::new(move || {
            listeners.lock().unwrap().remove(&id);
            Ok(())
        }))
    }
}
