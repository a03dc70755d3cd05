// ==========================================
// MES 停机核心 - 领域模型层
// ==========================================
// 职责: 定义领域实体与类型
// 红线: 不含存储访问逻辑，不含引擎逻辑
// ==========================================

pub mod downtime;
pub mod edit;
pub mod timeline;
pub mod types;

// 重导出核心类型
pub use downtime::{AuditInfo, DowntimeRecord};
pub use edit::{EditDiff, FieldChanges, FieldValue, PendingEdit};
pub use timeline::{
    ClippedInterval, Fractions, Interval, ResourceTimeline, TimeWindow, TimelineSegment,
};
pub use types::{
    DowntimeCategory, DowntimeStatus, ProductionDay, RecordKind, Shift, TargetType,
};
