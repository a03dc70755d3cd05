// ==========================================
// MES 停机核心 - 班次分段与事件合并
// ==========================================
// 分段: 一次停机按班次边界切成若干段，每段归属一个 (生产日, 班次)
// - 结束 ≤ 开始: 单个最小段（1 分钟）
// - 不足 10 分钟: 不切分，单段
// - 其余按班次窗口逐段切分，段与段首尾相接，每段至少 1 分钟
// 合并: 把同一资源、同一原因、时间相接的记录还原为一个事件
// - 同一生产日内允许 5 分钟间隙
// - 跨生产日只合并首尾相接的段（分段产物）
// - 事件总时长上限 24 小时
// ==========================================

use crate::domain::downtime::DowntimeRecord;
use crate::domain::types::{DowntimeCategory, ProductionDay, Shift};
use crate::engine::downtime_lifecycle::{normalize_resource_id, round_minutes};
use crate::engine::production_calendar::{production_day_of, shift_of, window_of};
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::HashSet;

/// 不切分的最短停机（分钟）
pub const MIN_SPLIT_MINUTES: i64 = 10;
/// 同一生产日内视为相接的最大间隙（分钟）
pub const MERGE_TOLERANCE_MINUTES: i64 = 5;
/// 合并事件的总时长上限（分钟）
pub const MAX_EVENT_MINUTES: i64 = 24 * 60;
/// 切分段数上限
const MAX_SEGMENTS: usize = 1000;

/// 班次内的一段停机
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftSegment {
    pub production_day: ProductionDay,
    pub shift: Shift,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// 至少 1 分钟
    pub duration_minutes: i64,
}

impl ShiftSegment {
    fn at(start: NaiveDateTime, end: NaiveDateTime, duration_minutes: i64) -> Self {
        Self {
            production_day: production_day_of(start),
            shift: shift_of(start),
            start,
            end,
            duration_minutes,
        }
    }
}

/// 按班次边界切分停机区间
///
/// # 参数
/// - `start` / `end`: 停机起止（进行中的停机以 now 作为 end）
///
/// # 返回
/// - 按时间排序的段，至少一段
pub fn split_into_shift_segments(start: NaiveDateTime, end: NaiveDateTime) -> Vec<ShiftSegment> {
    if end <= start {
        tracing::warn!("结束时间不晚于开始时间，生成最小段: start={}, end={}", start, end);
        return vec![ShiftSegment::at(start, start, 1)];
    }

    let total = round_minutes(start, end);
    if end - start < Duration::minutes(MIN_SPLIT_MINUTES) {
        return vec![ShiftSegment::at(start, end, total.max(1))];
    }

    let mut segments = Vec::new();
    let mut cursor = start;
    while cursor < end {
        if segments.len() >= MAX_SEGMENTS {
            tracing::error!("班次分段超过上限: start={}, end={}", start, end);
            break;
        }
        let window = window_of(shift_of(cursor), production_day_of(cursor));
        let segment_end = window.end.min(end);
        segments.push(ShiftSegment::at(
            cursor,
            segment_end,
            round_minutes(cursor, segment_end).max(1),
        ));
        cursor = segment_end;
    }

    tracing::debug!(
        "停机已按班次分段: start={}, end={}, segments={}",
        start,
        end,
        segments.len()
    );
    segments
}

/// 生产日区间的小时数
///
/// 同一天或倒序区间按 24 小时计，最少 24 小时。
pub fn hours_in_period(first: ProductionDay, last: ProductionDay) -> f64 {
    let days = (last.date() - first.date()).num_days().max(1);
    (days * 24) as f64
}

// ==========================================
// 事件合并
// ==========================================

/// 合并后的停机事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedDowntime {
    pub resource_id: String,
    pub reason: String,
    pub category: DowntimeCategory,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// 最早一段的生产日与班次
    pub production_day: ProductionDay,
    pub shift: Shift,
    /// 各段时长之和（去重，上限 24 小时）
    pub duration_minutes: i64,
    pub record_ids: Vec<String>,
    /// 是否包含进行中的记录
    pub active: bool,
}

struct PendingEvent {
    event: ConsolidatedDowntime,
    reason_key: String,
    last_day: ProductionDay,
    seen: HashSet<(NaiveDateTime, NaiveDateTime)>,
}

impl PendingEvent {
    fn accepts(&self, resource_id: &str, reason_key: &str, record: &DowntimeRecord) -> bool {
        if self.event.resource_id != resource_id || self.reason_key != reason_key {
            return false;
        }
        let gap = record.start - self.event.end;
        if record.production_day == self.last_day {
            gap <= Duration::minutes(MERGE_TOLERANCE_MINUTES)
        } else {
            gap == Duration::zero()
        }
    }

    fn absorb(&mut self, record: &DowntimeRecord, end: NaiveDateTime, minutes: i64) {
        if !self.seen.insert((record.start, end)) {
            return;
        }
        let event = &mut self.event;
        event.duration_minutes = (event.duration_minutes + minutes).min(MAX_EVENT_MINUTES);
        event.start = event.start.min(record.start);
        event.end = event.end.max(end);
        event.active |= record.is_active();
        event.record_ids.push(record.id_str().to_string());
        self.last_day = record.production_day;
    }
}

fn record_minutes(record: &DowntimeRecord, now: NaiveDateTime) -> i64 {
    record
        .duration_minutes
        .unwrap_or_else(|| round_minutes(record.start, record.effective_end(now)).max(0))
}

/// 把分段记录合并为停机事件
///
/// # 参数
/// - `records`: 任意顺序的停机记录（可含多个资源）
/// - `now`: 进行中记录的隐式结束时间
///
/// # 返回
/// - 按 (资源, 开始时间) 排序的事件
pub fn consolidate_downtimes(
    records: &[DowntimeRecord],
    now: NaiveDateTime,
) -> Vec<ConsolidatedDowntime> {
    let mut sorted: Vec<(String, &DowntimeRecord)> = records
        .iter()
        .map(|r| (normalize_resource_id(&r.resource_id), r))
        .collect();
    sorted.sort_by(|(ra, a), (rb, b)| {
        ra.cmp(rb)
            .then_with(|| a.start.cmp(&b.start))
            .then_with(|| a.id_str().cmp(b.id_str()))
    });

    let mut events: Vec<PendingEvent> = Vec::new();
    for (resource_id, record) in sorted {
        let reason_key = record.reason.trim().to_lowercase();
        let end = record.effective_end(now);
        let minutes = record_minutes(record, now);

        if let Some(open) = events
            .iter_mut()
            .rev()
            .find(|e| e.accepts(&resource_id, &reason_key, record))
        {
            open.absorb(record, end, minutes);
            continue;
        }

        let mut seen = HashSet::new();
        seen.insert((record.start, end));
        events.push(PendingEvent {
            event: ConsolidatedDowntime {
                resource_id,
                reason: record.reason.trim().to_string(),
                category: record.category,
                start: record.start,
                end,
                production_day: record.production_day,
                shift: record.shift,
                duration_minutes: minutes.min(MAX_EVENT_MINUTES),
                record_ids: vec![record.id_str().to_string()],
                active: record.is_active(),
            },
            reason_key,
            last_day: record.production_day,
            seen,
        });
    }

    tracing::debug!(
        "停机事件合并完成: records={}, events={}",
        records.len(),
        events.len()
    );
    events.into_iter().map(|e| e.event).collect()
}
