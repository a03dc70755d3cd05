// ==========================================
// 集成测试辅助模块
// ==========================================

#![allow(dead_code)]

pub mod fake_change_feed;
pub mod memory_store;
pub mod record_builder;

pub use fake_change_feed::FakeChangeFeed;
pub use memory_store::MemoryStore;
pub use record_builder::{ts, DowntimeBuilder};
