// ==========================================
// MES 停机核心 - 协作方接口层
// ==========================================
// 职责: 外部记录存储与变更推送的 Trait 定义
// 红线: 不含业务规则，实现由宿主提供
// ==========================================

pub mod change_feed;
pub mod record_store;

pub use change_feed::{
    ChangeEvent, ChangeFeed, ChangeKind, ErrorHandler, EventHandler, FeedHandlers,
    UnsubscribeHandle,
};
pub use record_store::{
    downtime_to_fields, FieldMap, FilterCondition, FilterSpec, RecordStore, StoredRecord,
};
