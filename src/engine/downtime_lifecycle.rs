// ==========================================
// MES 停机核心 - 停机生命周期引擎
// ==========================================
// 状态机: active → finished（创建时给定结束时间则直接 finished）
// 规则:
// - finish 仅允许从 active 发起，end < start 拒绝（不做钳制）
// - 时长 = round((end - start) / 60000)，finished 时冻结
// - active 的时长由 live_duration 按 now 实时计算，不持久化
// - 未显式选择类别时，由原因目录查表得出（未识别为 OTHER）
// ==========================================
// 纯计算：所有函数接收 now 参数，不读取系统时钟
// ==========================================

use crate::config::reason_catalog::ReasonCatalog;
use crate::domain::downtime::{AuditInfo, DowntimeRecord};
use crate::domain::types::{DowntimeCategory, DowntimeStatus, ProductionDay, Shift};
use crate::engine::production_calendar::{production_day_of, shift_of};
use crate::engine::shift_segmentation::{split_into_shift_segments, ShiftSegment};
use crate::error::{MesError, ValidationError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;

/// 开始停机请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDowntime {
    pub resource_id: String,
    /// None 时由原因查表
    #[serde(default)]
    pub category: Option<DowntimeCategory>,
    pub reason: String,
    pub start: NaiveDateTime,
    /// 补录场景: 同时给定结束时间，直接创建为 finished
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
}

/// 聚合结果（按类别/原因/资源）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DowntimeAggregate {
    pub key: String,
    pub total_minutes: i64,
    pub count: usize,
}

// ==========================================
// 资源 ID 规范化
// ==========================================

/// 资源 ID 规范化
///
/// - "h-7" / "H_7" / "H7" / "7" → "H07"（仅 1~2 位编号补零）
/// - 其他 ID: 去空白并转大写，如 "123" → "123"
pub fn normalize_resource_id(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    let numbered = compact.strip_prefix('H').map(|rest| {
        rest.strip_prefix('-')
            .or_else(|| rest.strip_prefix('_'))
            .unwrap_or(rest)
    });
    if let Some(id) = numbered.and_then(short_number).or_else(|| short_number(&compact)) {
        return id;
    }

    // "H-0-7" 之类去掉连字符后再匹配一次
    let cleaned = compact.replace('-', "");
    if let Some(id) = cleaned.strip_prefix('H').and_then(short_number) {
        return id;
    }
    compact
}

/// 1~2 位纯数字 → "Hnn"
fn short_number(digits: &str) -> Option<String> {
    if (1..=2).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse::<u32>().ok().map(|n| format!("H{:02}", n))
    } else {
        None
    }
}

/// 单资源单活跃校验
///
/// # 参数
/// - `resource_id`: 规范化前后均可
/// - `own_id`: 被重新打开的记录自身 ID（不计入冲突）
/// - `active_snapshot`: 写入前读取的活跃记录
pub fn ensure_no_other_active(
    resource_id: &str,
    own_id: Option<&str>,
    active_snapshot: &[DowntimeRecord],
) -> Result<(), ValidationError> {
    let resource_id = normalize_resource_id(resource_id);
    let conflict = active_snapshot.iter().find(|r| {
        r.is_active()
            && normalize_resource_id(&r.resource_id) == resource_id
            && own_id.map_or(true, |own| r.id_str() != own)
    });
    match conflict {
        Some(active) => {
            tracing::warn!(
                "拒绝进行中停机: 资源已有进行中的停机 resource_id={}, active_id={}",
                resource_id,
                active.id_str()
            );
            Err(ValidationError::DuplicateActive {
                resource_id,
                active_id: active.id_str().to_string(),
            })
        }
        None => Ok(()),
    }
}

/// 毫秒差 → 分钟（四舍五入）
pub fn round_minutes(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    let ms = (end - start).num_milliseconds() as f64;
    (ms / 60_000.0).round() as i64
}

// ==========================================
// DowntimeLifecycle - 停机生命周期引擎
// ==========================================
pub struct DowntimeLifecycle {
    catalog: Arc<ReasonCatalog>,
}

impl DowntimeLifecycle {
    pub fn new(catalog: Arc<ReasonCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ReasonCatalog {
        &self.catalog
    }

    /// 原因 → 类别
    pub fn category_for(&self, reason: &str) -> DowntimeCategory {
        self.catalog.category_for(reason)
    }

    // ==========================================
    // 状态转换
    // ==========================================

    /// 仅依赖请求本身的校验（不需要快照），供调用方在外部读取前使用
    pub fn validate_start(&self, req: &StartDowntime) -> Result<(), ValidationError> {
        if normalize_resource_id(&req.resource_id).is_empty() {
            return Err(ValidationError::MissingField {
                field: "resourceId".to_string(),
            });
        }
        if req.reason.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "reason".to_string(),
            });
        }
        if let Some(end) = req.end {
            if end < req.start {
                return Err(ValidationError::EndBeforeStart {
                    start: req.start,
                    end,
                });
            }
        }
        Ok(())
    }

    /// 开始一次停机
    ///
    /// # 参数
    /// - `req`: 开始请求
    /// - `active_snapshot`: 调用方读取的进行中停机快照（用于单资源单活跃校验）
    /// - `actor`: 审计用操作人
    /// - `now`: 当前时间
    ///
    /// # 返回
    /// - Ok(DowntimeRecord): 尚未分配 ID 的新记录
    /// - Err: 资源 ID/原因缺失、结束早于开始、资源已有进行中停机
    #[instrument(skip(self, req, active_snapshot), fields(resource_id = %req.resource_id))]
    pub fn start(
        &self,
        req: &StartDowntime,
        active_snapshot: &[DowntimeRecord],
        actor: &str,
        now: NaiveDateTime,
    ) -> Result<DowntimeRecord, ValidationError> {
        self.validate_start(req)?;
        let resource_id = normalize_resource_id(&req.resource_id);
        let reason = req.reason.trim();

        let (status, end, duration_minutes) = match req.end {
            Some(end) => {
                (
                    DowntimeStatus::Finished,
                    Some(end),
                    Some(round_minutes(req.start, end)),
                )
            }
            None => {
                // 补录的已结束停机不占用资源，只有新的进行中停机需要校验
                ensure_no_other_active(&resource_id, None, active_snapshot)?;
                (DowntimeStatus::Active, None, None)
            }
        };

        let category = req
            .category
            .unwrap_or_else(|| self.catalog.category_for(reason));

        Ok(DowntimeRecord {
            id: None,
            resource_id,
            category,
            reason: reason.to_string(),
            status,
            start: req.start,
            production_day: production_day_of(req.start),
            shift: shift_of(req.start),
            end,
            duration_minutes,
            audit: AuditInfo::created(actor, now),
        })
    }

    /// 结束进行中的停机
    ///
    /// 时长按 round((end - start) / 60000) 冻结。
    pub fn finish(
        &self,
        record: &DowntimeRecord,
        end: NaiveDateTime,
        actor: &str,
        now: NaiveDateTime,
    ) -> Result<DowntimeRecord, ValidationError> {
        if !record.is_active() {
            tracing::warn!("拒绝结束停机: 记录已结束 id={}", record.id_str());
            return Err(ValidationError::InvalidTransition {
                from: record.status.to_string(),
                to: DowntimeStatus::Finished.to_string(),
            });
        }
        if end < record.start {
            return Err(ValidationError::EndBeforeStart {
                start: record.start,
                end,
            });
        }

        let mut finished = record.clone();
        finished.status = DowntimeStatus::Finished;
        finished.end = Some(end);
        finished.duration_minutes = Some(round_minutes(record.start, end));
        finished.audit.touch(actor, now);
        Ok(finished)
    }

    /// 进行中停机的实时时长（分钟）
    ///
    /// 只读，不改变状态；now 早于 start 时为 0，对 now 单调不减。
    pub fn live_duration(
        &self,
        record: &DowntimeRecord,
        now: NaiveDateTime,
    ) -> Result<i64, ValidationError> {
        if !record.is_active() {
            return Err(ValidationError::InvalidTransition {
                from: record.status.to_string(),
                to: "live".to_string(),
            });
        }
        if now <= record.start {
            return Ok(0);
        }
        Ok(round_minutes(record.start, now))
    }

    /// 任意状态下的展示时长: finished 取冻结值，active 取实时值
    pub fn display_duration(&self, record: &DowntimeRecord, now: NaiveDateTime) -> i64 {
        match record.status {
            DowntimeStatus::Finished => record
                .duration_minutes
                .or_else(|| record.end.map(|end| round_minutes(record.start, end)))
                .unwrap_or(0),
            DowntimeStatus::Active => self.live_duration(record, now).unwrap_or(0),
        }
    }

    /// 停机按班次分段（进行中的停机以 now 截止）
    pub fn shift_segments(&self, record: &DowntimeRecord, now: NaiveDateTime) -> Vec<ShiftSegment> {
        split_into_shift_segments(record.start, record.effective_end(now))
    }

    /// 某生产日各班次的停机分钟数
    ///
    /// 跨班次、跨生产日的停机只计入落在该生产日内的段；三个班次均有键。
    pub fn minutes_by_shift(
        &self,
        records: &[DowntimeRecord],
        day: ProductionDay,
        now: NaiveDateTime,
    ) -> BTreeMap<Shift, i64> {
        let mut totals: BTreeMap<Shift, i64> = Shift::ALL.iter().map(|s| (*s, 0)).collect();
        for record in records {
            for segment in self.shift_segments(record, now) {
                if segment.production_day == day {
                    *totals.entry(segment.shift).or_insert(0) += segment.duration_minutes;
                }
            }
        }
        totals
    }

    /// 修改类别与原因（任意状态，不影响时长与状态）
    ///
    /// `category` 为 None 时按新原因查表。
    pub fn recategorize(
        &self,
        record: &DowntimeRecord,
        category: Option<DowntimeCategory>,
        reason: &str,
        actor: &str,
        now: NaiveDateTime,
    ) -> Result<DowntimeRecord, ValidationError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::MissingField {
                field: "reason".to_string(),
            });
        }

        let mut updated = record.clone();
        updated.category = category.unwrap_or_else(|| self.catalog.category_for(reason));
        updated.reason = reason.to_string();
        updated.audit.touch(actor, now);
        Ok(updated)
    }

    /// 修正起止时间（任意状态）
    ///
    /// - new_end 给定: 状态变为/保持 finished，时长重算
    /// - new_end 为 None: 状态变为/保持 active，丢弃已冻结时长
    /// - 生产日与班次按新的 start 重算
    pub fn correct_times(
        &self,
        record: &DowntimeRecord,
        new_start: NaiveDateTime,
        new_end: Option<NaiveDateTime>,
        actor: &str,
        now: NaiveDateTime,
    ) -> Result<DowntimeRecord, ValidationError> {
        let mut updated = record.clone();
        updated.start = new_start;
        updated.production_day = production_day_of(new_start);
        updated.shift = shift_of(new_start);

        match new_end {
            Some(end) => {
                if end < new_start {
                    return Err(ValidationError::EndBeforeStart {
                        start: new_start,
                        end,
                    });
                }
                updated.status = DowntimeStatus::Finished;
                updated.end = Some(end);
                updated.duration_minutes = Some(round_minutes(new_start, end));
            }
            None => {
                updated.status = DowntimeStatus::Active;
                updated.end = None;
                updated.duration_minutes = None;
            }
        }

        updated.audit.touch(actor, now);
        Ok(updated)
    }

    // ==========================================
    // 聚合
    // ==========================================

    pub fn aggregate_by_category(
        &self,
        records: &[DowntimeRecord],
        now: NaiveDateTime,
    ) -> Vec<DowntimeAggregate> {
        self.aggregate(records, now, |r| r.category.as_str().to_string())
    }

    pub fn aggregate_by_reason(
        &self,
        records: &[DowntimeRecord],
        now: NaiveDateTime,
    ) -> Vec<DowntimeAggregate> {
        self.aggregate(records, now, |r| r.reason.trim().to_uppercase())
    }

    pub fn aggregate_by_resource(
        &self,
        records: &[DowntimeRecord],
        now: NaiveDateTime,
    ) -> Vec<DowntimeAggregate> {
        self.aggregate(records, now, |r| normalize_resource_id(&r.resource_id))
    }

    /// 按键汇总时长，按总分钟数降序（相同时按键升序）
    fn aggregate<F>(
        &self,
        records: &[DowntimeRecord],
        now: NaiveDateTime,
        key_of: F,
    ) -> Vec<DowntimeAggregate>
    where
        F: Fn(&DowntimeRecord) -> String,
    {
        let mut totals: HashMap<String, (i64, usize)> = HashMap::new();
        for record in records {
            let entry = totals.entry(key_of(record)).or_insert((0, 0));
            entry.0 += self.display_duration(record, now);
            entry.1 += 1;
        }

        let mut result: Vec<DowntimeAggregate> = totals
            .into_iter()
            .map(|(key, (total_minutes, count))| DowntimeAggregate {
                key,
                total_minutes,
                count,
            })
            .collect();
        result.sort_by(|a, b| {
            b.total_minutes
                .cmp(&a.total_minutes)
                .then_with(|| a.key.cmp(&b.key))
        });
        result
    }
}

// ==========================================
// 并发修改检测
// ==========================================

/// 写前校验记录未被外部修改
///
/// `expected_updated_at` 为 None 时不校验。
pub fn ensure_unchanged(
    record: &DowntimeRecord,
    expected_updated_at: Option<NaiveDateTime>,
) -> Result<(), MesError> {
    match expected_updated_at {
        Some(expected) if record.audit.updated_at != Some(expected) => {
            tracing::warn!(
                "检测到外部修改: id={}, expected={}, actual={:?}",
                record.id_str(),
                expected,
                record.audit.updated_at
            );
            Err(MesError::StaleData {
                record_id: record.id_str().to_string(),
                expected: Some(expected),
                actual: record.audit.updated_at,
            })
        }
        _ => Ok(()),
    }
}
