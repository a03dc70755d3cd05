// ==========================================
// MES 停机核心 - 核心库
// ==========================================
// 系统定位: 制造执行驾驶舱的停机计时与时间轴核心
// 技术栈: Rust + tokio + serde
// 边界: 不含界面、持久化技术与认证；外部存储通过 Trait 注入
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 错误类型
pub mod error;

// 配置层 - 引擎参数与原因目录
pub mod config;

// 引擎层 - 纯计算规则
pub mod engine;

// 协作方接口层 - 记录存储与变更推送
pub mod repository;

// 服务层 - 缓存/台账/订阅/计时器
pub mod services;

// API 层 - 用例接口
pub mod api;

// 日志系统
pub mod logging;

// 操作耗时统计
pub mod perf;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    DowntimeCategory, DowntimeStatus, ProductionDay, RecordKind, Shift, TargetType,
};

// 领域实体
pub use domain::{
    AuditInfo, DowntimeRecord, EditDiff, FieldValue, PendingEdit, ResourceTimeline, TimeWindow,
    TimelineSegment,
};

// 错误
pub use error::{MesError, MesResult, ValidationError};

// 配置
pub use config::{EngineConfig, ReasonCatalog};

// 引擎
pub use engine::{
    production_day_of, shift_of, window_of, DowntimeLifecycle, RequestTracker, StartDowntime,
    TimelineLayoutEngine,
};

// 服务
pub use services::{
    Clock, CommitReport, LiveTicker, PendingEditLedger, QueryCache, SubscriptionManager,
    SystemClock, ViewScope,
};

// 协作方接口
pub use repository::{ChangeFeed, FilterSpec, RecordStore, StoredRecord};

// API
pub use api::{ActorContext, AdjustmentApi, DowntimeApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "MES 停机核心";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
