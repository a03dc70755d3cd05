// ==========================================
// MES 停机核心 - 时间轴布局引擎
// ==========================================
// 输入: 停机记录 + 参考窗口 + now
// 输出: 窗口内的比例片段（每次渲染重算，不持久化）
// 规则:
// - 按资源过滤（ID 规范化后比较），进行中的记录以 now 作为结束
// - 与窗口不相交的记录被排除
// - 稳定排序: start 升序，再按 record id
// - 重叠片段不合并，不修改输入
// ==========================================

use crate::domain::downtime::DowntimeRecord;
use crate::domain::timeline::{Interval, ResourceTimeline, TimeWindow, TimelineSegment};
use crate::engine::downtime_lifecycle::normalize_resource_id;
use crate::engine::interval_math::{clip_to_window, to_fractions, DEFAULT_MIN_VISIBLE_WIDTH};
use chrono::NaiveDateTime;
use std::collections::{BTreeSet, HashMap};

// ==========================================
// TimelineLayoutEngine
// ==========================================
pub struct TimelineLayoutEngine {
    min_visible_width: f64,
}

impl Default for TimelineLayoutEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_VISIBLE_WIDTH)
    }
}

impl TimelineLayoutEngine {
    pub fn new(min_visible_width: f64) -> Self {
        Self { min_visible_width }
    }

    pub fn min_visible_width(&self) -> f64 {
        self.min_visible_width
    }

    /// 单资源布局
    ///
    /// # 参数
    /// - `resource_id`: 资源 ID（比较前规范化）
    /// - `records`: 候选记录（可含其他资源）
    /// - `window`: 参考窗口（班次或整个生产日）
    /// - `now`: 进行中停机的隐式结束时间
    pub fn layout(
        &self,
        resource_id: &str,
        records: &[DowntimeRecord],
        window: &TimeWindow,
        now: NaiveDateTime,
    ) -> Vec<TimelineSegment> {
        let resource_id = normalize_resource_id(resource_id);

        let mut candidates: Vec<&DowntimeRecord> = records
            .iter()
            .filter(|r| normalize_resource_id(&r.resource_id) == resource_id)
            .collect();
        candidates.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| a.id_str().cmp(b.id_str()))
        });

        let mut segments = Vec::with_capacity(candidates.len());
        for record in candidates {
            let end = record.effective_end(now);
            let interval = match Interval::new(record.start, end) {
                Ok(interval) => interval,
                Err(e) => {
                    tracing::warn!("时间轴跳过非法记录: id={}, {}", record.id_str(), e);
                    continue;
                }
            };
            let clipped = match clip_to_window(&interval, window) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("时间轴跳过非法记录: id={}, {}", record.id_str(), e);
                    continue;
                }
            };
            if clipped.is_empty() {
                continue;
            }

            let fractions = to_fractions(&clipped, window, self.min_visible_width);
            segments.push(TimelineSegment {
                record_id: record.id_str().to_string(),
                offset_fraction: fractions.offset_fraction,
                width_fraction: fractions.width_fraction,
                clipped: clipped.clipped,
                active: record.is_active(),
                visible_minutes: clipped.duration().num_minutes(),
            });
        }

        tracing::debug!(
            "时间轴布局完成: resource_id={}, segments={}",
            resource_id,
            segments.len()
        );
        segments
    }

    /// 单资源布局 + 停机合计与可用率
    pub fn summarize(
        &self,
        resource_id: &str,
        records: &[DowntimeRecord],
        window: &TimeWindow,
        now: NaiveDateTime,
    ) -> ResourceTimeline {
        let segments = self.layout(resource_id, records, window, now);
        // 重叠部分重复计入
        let stopped_minutes: i64 = segments.iter().map(|s| s.visible_minutes).sum();
        let window_minutes = window.duration_minutes();
        let availability = if window_minutes > 0 {
            ((window_minutes - stopped_minutes) as f64 / window_minutes as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };

        ResourceTimeline {
            resource_id: normalize_resource_id(resource_id),
            segments,
            stopped_minutes,
            availability,
        }
    }

    /// 多资源布局
    ///
    /// 资源集合 = `resources` ∪ 记录中出现的资源；按数字后缀排序（H2 在 H10 之前）。
    pub fn layout_many(
        &self,
        resources: &[String],
        records: &[DowntimeRecord],
        window: &TimeWindow,
        now: NaiveDateTime,
    ) -> Vec<ResourceTimeline> {
        let mut ids: BTreeSet<String> = resources
            .iter()
            .map(|r| normalize_resource_id(r))
            .collect();
        ids.extend(records.iter().map(|r| normalize_resource_id(&r.resource_id)));

        let mut ids: Vec<String> = ids.into_iter().collect();
        ids.sort_by(|a, b| {
            resource_sort_key(a)
                .cmp(&resource_sort_key(b))
                .then_with(|| a.cmp(b))
        });

        ids.iter()
            .map(|id| self.summarize(id, records, window, now))
            .collect()
    }
}

/// 资源排序键: (无数字后缀排最后, 数字后缀)
fn resource_sort_key(id: &str) -> (bool, u64) {
    let digits: String = id
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    match digits.parse::<u64>() {
        Ok(n) => (false, n),
        Err(_) => (true, 0),
    }
}

// ==========================================
// RequestTracker - 过期请求丢弃
// ==========================================
// 同一个键（如资源或视图）可能连续发起多次布局/查询，
// 只有最后一次发起的结果允许被采用

/// 请求令牌
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub key: String,
    pub seq: u64,
}

#[derive(Debug, Default)]
pub struct RequestTracker {
    latest: HashMap<String, u64>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发起新请求，使该键之前的令牌全部过期
    pub fn issue(&mut self, key: &str) -> RequestToken {
        let seq = self.latest.entry(key.to_string()).or_insert(0);
        *seq += 1;
        RequestToken {
            key: key.to_string(),
            seq: *seq,
        }
    }

    pub fn is_latest(&self, token: &RequestToken) -> bool {
        self.latest.get(&token.key) == Some(&token.seq)
    }

    /// 令牌仍为最新时返回结果，否则丢弃
    pub fn accept<T>(&self, token: &RequestToken, result: T) -> Option<T> {
        if self.is_latest(token) {
            Some(result)
        } else {
            tracing::debug!("丢弃过期请求结果: key={}, seq={}", token.key, token.seq);
            None
        }
    }
}
