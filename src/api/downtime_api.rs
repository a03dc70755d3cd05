// ==========================================
// MES 停机核心 - 停机 API
// ==========================================
// 职责: 组合生命周期引擎、时间轴布局、查询缓存与记录存储
// 流程: 校验（无外部调用）→ 读取 → 引擎计算 → 写入 → 按前缀失效缓存
// 缓存键: down_{生产日} / down_active
// ==========================================

use crate::config::engine_config::EngineConfig;
use crate::config::reason_catalog::ReasonCatalog;
use crate::domain::downtime::DowntimeRecord;
use crate::domain::timeline::{ResourceTimeline, TimeWindow};
use crate::domain::types::{DowntimeCategory, DowntimeStatus, ProductionDay, RecordKind, Shift};
use crate::engine::downtime_lifecycle::{
    ensure_no_other_active, ensure_unchanged, normalize_resource_id, DowntimeAggregate,
    DowntimeLifecycle, StartDowntime,
};
use crate::engine::production_calendar::{day_window, window_of};
use crate::engine::shift_segmentation::{consolidate_downtimes, ConsolidatedDowntime};
use crate::engine::timeline_layout::TimelineLayoutEngine;
use crate::error::{MesError, MesResult, ValidationError};
use crate::perf::OpGuard;
use crate::repository::change_feed::{ChangeEvent, EventHandler};
use crate::repository::record_store::{downtime_to_fields, FilterSpec, RecordStore, StoredRecord};
use crate::services::clock::Clock;
use crate::services::query_cache::{CacheStats, QueryCache};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 活跃停机列表的缓存键
const ACTIVE_CACHE_KEY: &str = "down_active";

/// 时间轴回看的生产日数: 前几日开始、结束落在当日窗口内的停机
const TIMELINE_LOOKBACK_DAYS: u32 = 2;

/// 当前操作人（写入审计字段）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub actor_name: String,
}

impl ActorContext {
    pub fn new(actor_name: impl Into<String>) -> Self {
        Self {
            actor_name: actor_name.into(),
        }
    }
}

/// 聚合维度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateBy {
    Category,
    Reason,
    Resource,
}

// ==========================================
// DowntimeApi
// ==========================================
pub struct DowntimeApi {
    store: Arc<dyn RecordStore>,
    lifecycle: DowntimeLifecycle,
    layout: TimelineLayoutEngine,
    cache: QueryCache<Vec<DowntimeRecord>>,
    clock: Arc<dyn Clock>,
    actor: ActorContext,
}

impl DowntimeApi {
    /// 创建停机 API
    ///
    /// # 参数
    /// - store: 外部记录存储
    /// - config: 引擎配置（TTL、最小可见宽度）
    /// - catalog: 停机原因目录
    /// - clock: 当前时间来源
    /// - actor: 当前操作人
    pub fn new(
        store: Arc<dyn RecordStore>,
        config: &EngineConfig,
        catalog: Arc<ReasonCatalog>,
        clock: Arc<dyn Clock>,
        actor: ActorContext,
    ) -> Self {
        Self {
            store,
            lifecycle: DowntimeLifecycle::new(catalog),
            layout: TimelineLayoutEngine::new(config.min_visible_width),
            cache: QueryCache::new(config.cache_ttl()),
            clock,
            actor,
        }
    }

    pub fn lifecycle(&self) -> &DowntimeLifecycle {
        &self.lifecycle
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    // ==========================================
    // 写操作
    // ==========================================

    /// 开始一次停机（或补录已结束的停机）
    ///
    /// 单资源单活跃的校验基于写入前读取的快照，两个会话并发开始时仍可能产生两条
    /// 进行中记录（存储没有条件写）。
    pub async fn start_downtime(&self, req: StartDowntime) -> MesResult<DowntimeRecord> {
        let mut perf = OpGuard::new("start_downtime");
        self.lifecycle.validate_start(&req)?;

        let resource_id = normalize_resource_id(&req.resource_id);
        perf.record_call();
        let snapshot = self.query_active_for(&resource_id).await?;

        let now = self.clock.now();
        let mut record = self
            .lifecycle
            .start(&req, &snapshot, &self.actor.actor_name, now)?;

        let fields = downtime_to_fields(&record)?;
        perf.record_call();
        let id = self.store.create(RecordKind::Downtime, &fields).await?;
        record.id = Some(id);

        self.invalidate_for_kind(RecordKind::Downtime);
        tracing::info!(
            "停机已创建: id={}, resource_id={}, status={}, reason={}",
            record.id_str(),
            record.resource_id,
            record.status,
            record.reason
        );
        perf.succeed();
        Ok(record)
    }

    /// 结束进行中的停机
    pub async fn finish_downtime(
        &self,
        id: &str,
        end: NaiveDateTime,
        expected_updated_at: Option<NaiveDateTime>,
    ) -> MesResult<DowntimeRecord> {
        let mut perf = OpGuard::new("finish_downtime");
        perf.record_call();
        let current = self.read_downtime(id).await?;
        ensure_unchanged(&current, expected_updated_at)?;

        let finished = self
            .lifecycle
            .finish(&current, end, &self.actor.actor_name, self.clock.now())?;
        perf.record_call();
        self.persist(&finished).await?;
        perf.succeed();
        Ok(finished)
    }

    /// 修正起止时间
    pub async fn correct_downtime(
        &self,
        id: &str,
        new_start: NaiveDateTime,
        new_end: Option<NaiveDateTime>,
        expected_updated_at: Option<NaiveDateTime>,
    ) -> MesResult<DowntimeRecord> {
        let mut perf = OpGuard::new("correct_downtime");
        if let Some(end) = new_end {
            if end < new_start {
                return Err(ValidationError::EndBeforeStart {
                    start: new_start,
                    end,
                }
                .into());
            }
        }

        perf.record_call();
        let current = self.read_downtime(id).await?;
        ensure_unchanged(&current, expected_updated_at)?;

        // 去掉结束时间会重新打开记录，需要与启动时相同的单活跃校验
        if new_end.is_none() {
            perf.record_call();
            let resource_id = normalize_resource_id(&current.resource_id);
            let snapshot = self.query_active_for(&resource_id).await?;
            ensure_no_other_active(&current.resource_id, current.id.as_deref(), &snapshot)?;
        }

        let corrected = self.lifecycle.correct_times(
            &current,
            new_start,
            new_end,
            &self.actor.actor_name,
            self.clock.now(),
        )?;
        perf.record_call();
        self.persist(&corrected).await?;
        perf.succeed();
        Ok(corrected)
    }

    /// 修改类别与原因
    pub async fn recategorize_downtime(
        &self,
        id: &str,
        category: Option<DowntimeCategory>,
        reason: &str,
        expected_updated_at: Option<NaiveDateTime>,
    ) -> MesResult<DowntimeRecord> {
        let mut perf = OpGuard::new("recategorize_downtime");
        if reason.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "reason".to_string(),
            }
            .into());
        }

        perf.record_call();
        let current = self.read_downtime(id).await?;
        ensure_unchanged(&current, expected_updated_at)?;

        let updated = self.lifecycle.recategorize(
            &current,
            category,
            reason,
            &self.actor.actor_name,
            self.clock.now(),
        )?;
        perf.record_call();
        self.persist(&updated).await?;
        perf.succeed();
        Ok(updated)
    }

    async fn persist(&self, record: &DowntimeRecord) -> MesResult<()> {
        let fields = downtime_to_fields(record)?;
        self.store
            .write(RecordKind::Downtime, record.id_str(), &fields)
            .await?;
        self.invalidate_for_kind(RecordKind::Downtime);
        tracing::info!(
            "停机已更新: id={}, status={}, duration_minutes={:?}",
            record.id_str(),
            record.status,
            record.duration_minutes
        );
        Ok(())
    }

    // ==========================================
    // 读操作
    // ==========================================

    async fn read_downtime(&self, id: &str) -> MesResult<DowntimeRecord> {
        match self.store.read(RecordKind::Downtime, id).await? {
            Some(stored) => stored.to_downtime(),
            None => Err(MesError::NotFound {
                entity: "downtime".to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// 不经缓存读取某资源的进行中停机（写前快照）
    async fn query_active_for(&self, resource_id: &str) -> MesResult<Vec<DowntimeRecord>> {
        let filter = FilterSpec::new()
            .eq("resourceId", resource_id)
            .eq("status", DowntimeStatus::Active.to_string());
        let stored = self.store.query(RecordKind::Downtime, &filter).await?;
        Ok(to_downtimes(&stored))
    }

    /// 某生产日的全部停机（缓存）
    pub async fn list_for_day(&self, day: ProductionDay) -> MesResult<Vec<DowntimeRecord>> {
        let store = Arc::clone(&self.store);
        let key = format!("{}{}", RecordKind::Downtime.cache_prefix(), day);
        self.cache
            .get(&key, move || async move {
                let filter = FilterSpec::new().eq("productionDay", day.to_string());
                let stored = store.query(RecordKind::Downtime, &filter).await?;
                Ok(to_downtimes(&stored))
            })
            .await
    }

    /// 全部进行中的停机（缓存）
    pub async fn list_active(&self) -> MesResult<Vec<DowntimeRecord>> {
        let store = Arc::clone(&self.store);
        self.cache
            .get(ACTIVE_CACHE_KEY, move || async move {
                let filter = FilterSpec::new().eq("status", DowntimeStatus::Active.to_string());
                let stored = store.query(RecordKind::Downtime, &filter).await?;
                Ok(to_downtimes(&stored))
            })
            .await
    }

    /// 当日及回看日的记录 ∪ 仍在进行的记录（按 ID 去重）
    ///
    /// 前一生产日开始、结束落在当日窗口内的停机同样参与布局，窗口外部分由裁剪去掉。
    async fn records_for_window(&self, day: ProductionDay) -> MesResult<Vec<DowntimeRecord>> {
        let mut by_id: BTreeMap<String, DowntimeRecord> = BTreeMap::new();
        let mut lookup_day = day;
        for _ in 0..TIMELINE_LOOKBACK_DAYS {
            lookup_day = lookup_day.prev();
            for record in self.list_for_day(lookup_day).await? {
                by_id.insert(record.id_str().to_string(), record);
            }
        }
        for record in self
            .list_for_day(day)
            .await?
            .into_iter()
            .chain(self.list_active().await?)
        {
            by_id.insert(record.id_str().to_string(), record);
        }
        Ok(by_id.into_values().collect())
    }

    fn window_for(day: ProductionDay, shift: Option<Shift>) -> TimeWindow {
        match shift {
            Some(shift) => window_of(shift, day),
            None => day_window(day),
        }
    }

    /// 单资源时间轴（班次窗口或整个生产日）
    pub async fn timeline_for(
        &self,
        resource_id: &str,
        day: ProductionDay,
        shift: Option<Shift>,
    ) -> MesResult<ResourceTimeline> {
        let _perf = OpGuard::new("timeline_for");
        let records = self.records_for_window(day).await?;
        let window = Self::window_for(day, shift);
        Ok(self
            .layout
            .summarize(resource_id, &records, &window, self.clock.now()))
    }

    /// 多资源时间轴
    pub async fn timelines_for_day(
        &self,
        resources: &[String],
        day: ProductionDay,
        shift: Option<Shift>,
    ) -> MesResult<Vec<ResourceTimeline>> {
        let _perf = OpGuard::new("timelines_for_day");
        let records = self.records_for_window(day).await?;
        let window = Self::window_for(day, shift);
        Ok(self
            .layout
            .layout_many(resources, &records, &window, self.clock.now()))
    }

    /// 某生产日的停机汇总
    pub async fn summary_for_day(
        &self,
        day: ProductionDay,
        by: AggregateBy,
    ) -> MesResult<Vec<DowntimeAggregate>> {
        let records = self.list_for_day(day).await?;
        let now = self.clock.now();
        Ok(match by {
            AggregateBy::Category => self.lifecycle.aggregate_by_category(&records, now),
            AggregateBy::Reason => self.lifecycle.aggregate_by_reason(&records, now),
            AggregateBy::Resource => self.lifecycle.aggregate_by_resource(&records, now),
        })
    }

    /// 某生产日各班次的停机分钟数（长停机按班次分段计入）
    pub async fn minutes_by_shift(&self, day: ProductionDay) -> MesResult<BTreeMap<Shift, i64>> {
        let records = self.records_for_window(day).await?;
        Ok(self
            .lifecycle
            .minutes_by_shift(&records, day, self.clock.now()))
    }

    /// 某生产日的停机事件（分段记录合并后）
    pub async fn consolidated_for_day(
        &self,
        day: ProductionDay,
    ) -> MesResult<Vec<ConsolidatedDowntime>> {
        let records = self.list_for_day(day).await?;
        Ok(consolidate_downtimes(&records, self.clock.now()))
    }

    /// 进行中停机的实时时长
    pub fn live_duration(&self, record: &DowntimeRecord) -> MesResult<i64> {
        Ok(self.lifecycle.live_duration(record, self.clock.now())?)
    }

    // ==========================================
    // 缓存
    // ==========================================

    /// 按记录种类失效缓存
    pub fn invalidate_for_kind(&self, kind: RecordKind) -> usize {
        self.cache.invalidate_prefix(kind.cache_prefix())
    }

    /// 变更推送回调: 收到停机变更时失效停机缓存
    pub fn invalidation_handler(&self) -> EventHandler {
        let cache = self.cache.clone();
        Arc::new(move |event: ChangeEvent| {
            let removed = cache.invalidate_prefix(event.record_kind.cache_prefix());
            tracing::debug!(
                "变更推送触发缓存失效: kind={}, id={}, removed={}",
                event.record_kind,
                event.id,
                removed
            );
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// 存储记录 → 停机记录；无法解析的记录跳过
fn to_downtimes(stored: &[StoredRecord]) -> Vec<DowntimeRecord> {
    stored
        .iter()
        .filter_map(|s| match s.to_downtime() {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("跳过无法解析的停机记录: id={}, {}", s.id, e);
                None
            }
        })
        .collect()
}
