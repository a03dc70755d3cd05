// ==========================================
// MES 停机核心 - 服务层
// ==========================================
// 职责: 有状态的基础设施（查询缓存、暂存台账、订阅管理、定时刷新）
// 红线: 全部为显式实例，不使用全局单例
// ==========================================

pub mod clock;
pub mod edit_ledger;
pub mod live_ticker;
pub mod query_cache;
pub mod subscription_manager;

pub use clock::{Clock, ManualClock, SystemClock};
pub use edit_ledger::{CommitFailure, CommitReport, PendingEditLedger};
pub use live_ticker::{LiveTicker, ViewScope};
pub use query_cache::{CacheKeyStats, CacheStats, QueryCache};
pub use subscription_manager::{
    error_handler, event_handler, ManagerState, SubscribeFn, SubscriptionManager,
};
