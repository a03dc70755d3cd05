// ==========================================
// 内存记录存储 - 用于集成测试
// ==========================================
// 支持按 (种类, ID) 注入写入失败，统计各操作调用次数
// ==========================================

use async_trait::async_trait;
use mes_downtime_core::domain::types::RecordKind;
use mes_downtime_core::error::{MesError, MesResult};
use mes_downtime_core::repository::{FieldMap, FilterSpec, RecordStore, StoredRecord};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<RecordKind, BTreeMap<String, FieldMap>>>,
    failing_writes: Mutex<HashSet<(RecordKind, String)>>,
    next_id: AtomicUsize,
    pub reads: AtomicUsize,
    pub queries: AtomicUsize,
    pub writes: AtomicUsize,
    pub creates: AtomicUsize,
    /// 查询延迟（用于制造并发窗口）
    query_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接插入记录（不计入调用次数）
    pub fn seed(&self, kind: RecordKind, id: &str, fields: FieldMap) {
        self.records
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .insert(id.to_string(), fields);
    }

    pub fn get(&self, kind: RecordKind, id: &str) -> Option<FieldMap> {
        self.records
            .lock()
            .unwrap()
            .get(&kind)
            .and_then(|m| m.get(id).cloned())
    }

    /// 模拟外部修改（绕过核心）
    pub fn patch(&self, kind: RecordKind, id: &str, field: &str, value: serde_json::Value) {
        if let Some(fields) = self
            .records
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(|m| m.get_mut(id))
        {
            fields.insert(field.to_string(), value);
        }
    }

    pub fn fail_writes_for(&self, kind: RecordKind, id: &str) {
        self.failing_writes
            .lock()
            .unwrap()
            .insert((kind, id.to_string()));
    }

    pub fn clear_failures(&self) {
        self.failing_writes.lock().unwrap().clear();
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock().unwrap() = Some(delay);
    }

    pub fn count(&self, kind: RecordKind) -> usize {
        self.records
            .lock()
            .unwrap()
            .get(&kind)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn read(&self, kind: RecordKind, id: &str) -> MesResult<Option<StoredRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(kind, id).map(|fields| StoredRecord::new(id, fields)))
    }

    async fn query(&self, kind: RecordKind, filter: &FilterSpec) -> MesResult<Vec<StoredRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let delay = *self.query_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&kind)
            .map(|m| {
                m.iter()
                    .filter(|(_, fields)| filter.matches(fields))
                    .map(|(id, fields)| StoredRecord::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn write(&self, kind: RecordKind, id: &str, fields: &FieldMap) -> MesResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_writes
            .lock()
            .unwrap()
            .contains(&(kind, id.to_string()))
        {
            return Err(MesError::collaborator("write", "permission denied"));
        }

        let mut records = self.records.lock().unwrap();
        let existing = records
            .get_mut(&kind)
            .and_then(|m| m.get_mut(id))
            .ok_or_else(|| MesError::NotFound {
                entity: kind.to_string(),
                id: id.to_string(),
            })?;
        for (k, v) in fields {
            existing.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn create(&self, kind: RecordKind, fields: &FieldMap) -> MesResult<String> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{}-{}", kind, n);
        self.records
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .insert(id.clone(), fields.clone());
        Ok(id)
    }
}
