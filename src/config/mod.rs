// ==========================================
// MES 停机核心 - 配置层
// ==========================================
// 职责: 引擎参数（TTL/最小可见宽度/刷新间隔）与停机原因目录
// 存储: JSON 文件 + 环境变量覆写
// ==========================================

pub mod engine_config;
pub mod reason_catalog;

pub use engine_config::{config_keys, get_default_config_path, EngineConfig};
pub use reason_catalog::{ReasonCatalog, ReasonCatalogFile};
