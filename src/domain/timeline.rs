// ==========================================
// MES 停机核心 - 时间轴领域模型
// ==========================================
// 参考窗口 / 区间 / 裁剪结果 / 时间轴片段
// 片段为临时投影，每次渲染重算，不持久化
// ==========================================

use crate::error::ValidationError;
use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// TimeWindow - 参考窗口 [start, end)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// 创建窗口，要求 end > start
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    /// 窗口是否跨越零点（如 T3 23:20→06:30，或整个生产日）
    pub fn crosses_midnight(&self) -> bool {
        let next_midnight = (self.start.date() + Duration::days(1)).and_time(NaiveTime::MIN);
        next_midnight < self.end
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts < self.end
    }
}

// ==========================================
// Interval - 任意区间 [start, end)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    /// 创建区间；end < start 视为非法输入，不做环绕
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

// ==========================================
// ClippedInterval - 裁剪结果
// ==========================================
/// 与窗口求交后的区间
///
/// - `clipped = true`: 源区间超出窗口被截断（含完全在窗口外的情况）
/// - 完全在窗口外时 start == end（零宽度），由调用方排除
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClippedInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub clipped: bool,
}

impl ClippedInterval {
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

// ==========================================
// Fractions - 窗口内比例位置
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fractions {
    pub offset_fraction: f64,
    pub width_fraction: f64,
}

// ==========================================
// TimelineSegment - 时间轴片段
// ==========================================
/// 一条停机记录在参考窗口上的投影
///
/// offset ∈ [0,1), width ∈ (0,1], offset + width ≤ 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSegment {
    pub record_id: String,
    pub offset_fraction: f64,
    pub width_fraction: f64,
    pub clipped: bool,
    /// 记录是否仍在进行中（以 now 作为隐式结束）
    pub active: bool,
    /// 窗口内的实际分钟数（裁剪后，未应用最小宽度）
    pub visible_minutes: i64,
}

// ==========================================
// ResourceTimeline - 单资源时间轴汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTimeline {
    pub resource_id: String,
    pub segments: Vec<TimelineSegment>,
    /// 窗口内停机分钟数合计（重叠部分重复计入）
    pub stopped_minutes: i64,
    /// 可用率 (窗口 - 停机) / 窗口，限制在 [0, 1]
    pub availability: f64,
}
