// ==========================================
// MES 停机核心 - 批量调整 API
// ==========================================
// 职责: 计划/产量/订单记录的字段级暂存、批量提交与放弃
// 提交规则:
// - 每个目标一次写入，字段按镜像表同时写入兼容字段
// - 附加审计字段 editedBy / editedAt
// - 提交后按成功目标的记录种类失效缓存
// 缓存键: plan_ / prod_ / order_ 前缀 + 查询条件
// ==========================================

use crate::domain::edit::{EditDiff, FieldValue, PendingEdit};
use crate::domain::types::{RecordKind, TargetType};
use crate::error::{MesError, MesResult, ValidationError};
use crate::perf::OpGuard;
use crate::repository::record_store::{FieldMap, FilterSpec, RecordStore, StoredRecord};
use crate::services::clock::Clock;
use crate::services::edit_ledger::{CommitReport, PendingEditLedger};
use crate::services::query_cache::QueryCache;
use crate::api::downtime_api::ActorContext;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// 字段镜像表: 写入某字段时同时写入的兼容字段
pub fn mirrored_fields(target_type: TargetType, field: &str) -> &'static [&'static str] {
    match (target_type, field) {
        (TargetType::PlanningRecord, "executed") => &["total_produced"],
        (TargetType::PlanningRecord, "planned") => &["lot_size", "order_lot_size"],
        (TargetType::EntryRecord, "produced") => &["quantity"],
        (TargetType::EntryRecord, "weight") => &["gross_weight", "weight_kg"],
        (TargetType::OrderRecord, "total_produced") => &["totalProduced"],
        _ => &[],
    }
}

/// 暂存修改 → 写入字段（含镜像字段与审计字段）
pub fn build_write_fields(edit: &PendingEdit, actor: &str, edited_at: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    for (field, value) in &edit.changed_fields {
        let json = value.to_json();
        for mirror in mirrored_fields(edit.target_type, field) {
            fields.insert((*mirror).to_string(), json.clone());
        }
        fields.insert(field.clone(), json);
    }
    fields.insert("editedBy".to_string(), Value::String(actor.to_string()));
    fields.insert("editedAt".to_string(), Value::String(edited_at.to_string()));
    fields
}

// ==========================================
// AdjustmentApi
// ==========================================
pub struct AdjustmentApi {
    store: Arc<dyn RecordStore>,
    ledger: Mutex<PendingEditLedger>,
    cache: QueryCache<Vec<StoredRecord>>,
    clock: Arc<dyn Clock>,
    actor: ActorContext,
}

impl AdjustmentApi {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache_ttl: Duration,
        clock: Arc<dyn Clock>,
        actor: ActorContext,
    ) -> Self {
        Self {
            store,
            ledger: Mutex::new(PendingEditLedger::new()),
            cache: QueryCache::new(cache_ttl),
            clock,
            actor,
        }
    }

    /// 读取待调整记录（缓存）
    pub async fn load_records(
        &self,
        kind: RecordKind,
        filter: FilterSpec,
    ) -> MesResult<Vec<StoredRecord>> {
        let key = format!("{}{}", kind.cache_prefix(), filter.cache_suffix());
        let store = Arc::clone(&self.store);
        self.cache
            .get(&key, move || async move { store.query(kind, &filter).await })
            .await
    }

    /// 暂存字段修改（调用方提供原值）
    pub async fn stage(
        &self,
        target_id: &str,
        target_type: TargetType,
        field: &str,
        new_value: FieldValue,
        original: FieldValue,
    ) -> Result<(), ValidationError> {
        self.ledger
            .lock()
            .await
            .stage(target_id, target_type, field, new_value, original)
    }

    /// 暂存字段修改（原值取自已读取的记录）
    pub async fn stage_on_record(
        &self,
        record: &StoredRecord,
        target_type: TargetType,
        field: &str,
        new_value: FieldValue,
    ) -> Result<(), ValidationError> {
        let original = record
            .get(field)
            .map(FieldValue::from_json)
            .unwrap_or(FieldValue::Null);
        self.stage(&record.id, target_type, field, new_value, original)
            .await
    }

    pub async fn diff(&self, target_id: &str) -> Option<EditDiff> {
        self.ledger.lock().await.diff(target_id)
    }

    pub async fn pending_count(&self) -> usize {
        self.ledger.lock().await.len()
    }

    pub async fn pending_edits(&self) -> Vec<PendingEdit> {
        self.ledger.lock().await.iter().cloned().collect()
    }

    /// 提交全部暂存修改
    ///
    /// 单个目标失败不影响其他目标；失败目标保留在台账中，可再次提交重试。
    pub async fn commit_all(&self) -> CommitReport {
        let mut perf = OpGuard::new("commit_adjustments");
        let edited_at = self.clock.now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let actor = self.actor.actor_name.clone();
        let store = Arc::clone(&self.store);

        let mut ledger = self.ledger.lock().await;
        let touched: HashSet<RecordKind> = ledger
            .iter()
            .map(|edit| edit.target_type.record_kind())
            .collect();
        perf.record_calls(ledger.len() as u64);

        let report = ledger
            .commit_all(|edit: PendingEdit| {
                let store = Arc::clone(&store);
                let fields = build_write_fields(&edit, &actor, &edited_at);
                async move {
                    let kind = edit.target_type.record_kind();
                    store
                        .write(kind, &edit.target_id, &fields)
                        .await
                        .map_err(|e| match e {
                            MesError::Collaborator { message, .. } => MesError::Collaborator {
                                operation: format!("write {}", kind),
                                message,
                            },
                            other => other,
                        })
                }
            })
            .await;
        drop(ledger);

        if !report.succeeded.is_empty() {
            for kind in touched {
                self.cache.invalidate_prefix(kind.cache_prefix());
            }
        }
        if report.is_complete() {
            perf.succeed();
        }
        report
    }

    /// 放弃全部暂存修改
    pub async fn discard_all(&self) -> Vec<PendingEdit> {
        self.ledger.lock().await.discard_all()
    }

    pub fn invalidate_for_kind(&self, kind: RecordKind) -> usize {
        self.cache.invalidate_prefix(kind.cache_prefix())
    }
}
