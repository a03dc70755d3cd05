// ==========================================
// MES 停机核心 - 区间计算
// ==========================================
// 职责: 区间与参考窗口求交、窗口内比例定位、跨零点时刻归一
// 规则:
// - end < start 为非法输入，直接拒绝，不做环绕
// - 跨零点窗口（如 T3 23:20→06:30）中，早于窗口起始时刻的时刻 +24h
// - 正时长区间的宽度不低于最小可见宽度（可配置）
// ==========================================

use crate::domain::timeline::{ClippedInterval, Fractions, Interval, TimeWindow};
use crate::error::ValidationError;
use chrono::{Duration, NaiveDateTime, NaiveTime};

/// 默认最小可见宽度（窗口的 0.5%）
pub const DEFAULT_MIN_VISIBLE_WIDTH: f64 = 0.005;

// ==========================================
// 跨零点归一
// ==========================================

/// 把一个时刻放到窗口所在的日期上
///
/// 窗口跨零点且时刻早于窗口起始时刻时，视为零点之后，日期 +1。
/// 例如 T3 窗口 [D 23:20, D+1 06:30) 中的 00:30 → D+1 00:30。
pub fn anchor_time_of_day(time: NaiveTime, window: &TimeWindow) -> NaiveDateTime {
    let base = window.start.date().and_time(time);
    if window.crosses_midnight() && time < window.start.time() {
        base + Duration::days(1)
    } else {
        base
    }
}

/// 由"开始时刻 + 时长(分钟)"构造绝对区间
pub fn interval_from_time_of_day(
    start: NaiveTime,
    duration_minutes: i64,
    window: &TimeWindow,
) -> Result<Interval, ValidationError> {
    let start = anchor_time_of_day(start, window);
    Interval::new(start, start + Duration::minutes(duration_minutes))
}

// ==========================================
// 裁剪
// ==========================================

/// 区间与窗口求交
///
/// # 返回
/// - Ok(ClippedInterval): `clipped` 表示源区间超出窗口被截断；
///   完全在窗口外时返回零宽度且 `clipped = true`
/// - Err: end < start
pub fn clip_to_window(
    interval: &Interval,
    window: &TimeWindow,
) -> Result<ClippedInterval, ValidationError> {
    if interval.end < interval.start {
        return Err(ValidationError::EndBeforeStart {
            start: interval.start,
            end: interval.end,
        });
    }

    let start = interval.start.max(window.start);
    let end = interval.end.min(window.end);

    if end <= start {
        // 零长度且位于窗口内：不算截断
        if interval.start == interval.end && window.contains(interval.start) {
            return Ok(ClippedInterval {
                start: interval.start,
                end: interval.end,
                clipped: false,
            });
        }
        let pos = interval.start.clamp(window.start, window.end);
        return Ok(ClippedInterval {
            start: pos,
            end: pos,
            clipped: true,
        });
    }

    Ok(ClippedInterval {
        start,
        end,
        clipped: interval.start < window.start || interval.end > window.end,
    })
}

// ==========================================
// 比例定位
// ==========================================

/// 裁剪后区间在窗口内的比例位置
///
/// - offset = (start - window.start) / window.duration
/// - width  = duration / window.duration，正时长时不低于 `min_width`
/// - 保证 offset ∈ [0,1)、offset + width ≤ 1；最小宽度溢出窗口尾部时整体左移
pub fn to_fractions(clipped: &ClippedInterval, window: &TimeWindow, min_width: f64) -> Fractions {
    let total_ms = window.duration().num_milliseconds() as f64;
    if total_ms <= 0.0 {
        return Fractions {
            offset_fraction: 0.0,
            width_fraction: 0.0,
        };
    }

    let raw_offset = (clipped.start - window.start).num_milliseconds() as f64 / total_ms;

    if clipped.is_empty() {
        return Fractions {
            offset_fraction: raw_offset.clamp(0.0, 1.0),
            width_fraction: 0.0,
        };
    }

    let floor = min_width.clamp(0.0, 1.0);
    let raw_width = clipped.duration().num_milliseconds() as f64 / total_ms;
    let width = raw_width.max(floor).min(1.0);
    let mut offset = raw_offset.clamp(0.0, 1.0);

    if offset + width > 1.0 {
        offset = (1.0 - width).max(0.0);
    }
    // 浮点误差兜底
    let width = if offset + width > 1.0 { 1.0 - offset } else { width };

    Fractions {
        offset_fraction: offset,
        width_fraction: width,
    }
}
