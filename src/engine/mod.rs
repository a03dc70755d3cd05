// ==========================================
// MES 停机核心 - 引擎层
// ==========================================
// 职责: 生产日历、区间计算、停机生命周期、班次分段、时间轴布局
// 红线: 纯计算，不访问存储，不读取系统时钟（now 由调用方注入）
// ==========================================

pub mod downtime_lifecycle;
pub mod interval_math;
pub mod production_calendar;
pub mod shift_segmentation;
pub mod timeline_layout;

// 重导出核心引擎
pub use downtime_lifecycle::{
    ensure_no_other_active, ensure_unchanged, normalize_resource_id, DowntimeAggregate,
    DowntimeLifecycle, StartDowntime,
};
pub use interval_math::{clip_to_window, to_fractions, DEFAULT_MIN_VISIBLE_WIDTH};
pub use production_calendar::{
    day_window, production_day_of, production_day_of_zoned, resolve_start, shift_definitions,
    shift_of, shift_of_zoned, window_of, ShiftDefinition,
};
pub use shift_segmentation::{
    consolidate_downtimes, hours_in_period, split_into_shift_segments, ConsolidatedDowntime,
    ShiftSegment,
};
pub use timeline_layout::{RequestToken, RequestTracker, TimelineLayoutEngine};
