// ==========================================
// MES 停机核心 - API 层
// ==========================================
// 职责: 面向展示层的用例接口，组合引擎、服务与协作方
// ==========================================

pub mod adjustment_api;
pub mod downtime_api;

// 重导出核心类型
pub use adjustment_api::{build_write_fields, mirrored_fields, AdjustmentApi};
pub use downtime_api::{ActorContext, AggregateBy, DowntimeApi};
