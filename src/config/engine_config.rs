// ==========================================
// MES 停机核心 - 引擎配置
// ==========================================
// 加载顺序: 默认值 → JSON 文件 → 环境变量覆写 → 校验
// 环境变量:
// - MES_CORE_CACHE_TTL_SECS     查询缓存 TTL（秒）
// - MES_CORE_MIN_VISIBLE_WIDTH  时间轴最小可见宽度（0~1）
// - MES_CORE_LIVE_REFRESH_SECS  进行中停机时长刷新间隔（秒）
// - MES_CORE_CONFIG_PATH        配置文件路径
// ==========================================

use crate::config::reason_catalog::ReasonCatalog;
use crate::engine::interval_math::DEFAULT_MIN_VISIBLE_WIDTH;
use crate::error::{MesError, MesResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 配置键
pub mod config_keys {
    pub const CACHE_TTL_SECS: &str = "cache_ttl_secs";
    pub const MIN_VISIBLE_WIDTH: &str = "min_visible_width";
    pub const LIVE_REFRESH_INTERVAL_SECS: &str = "live_refresh_interval_secs";

    pub const ENV_CACHE_TTL_SECS: &str = "MES_CORE_CACHE_TTL_SECS";
    pub const ENV_MIN_VISIBLE_WIDTH: &str = "MES_CORE_MIN_VISIBLE_WIDTH";
    pub const ENV_LIVE_REFRESH_SECS: &str = "MES_CORE_LIVE_REFRESH_SECS";
    pub const ENV_CONFIG_PATH: &str = "MES_CORE_CONFIG_PATH";
}

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 查询缓存 TTL（秒），默认 300（5 分钟）
    pub cache_ttl_secs: u64,

    /// 时间轴最小可见宽度，默认 0.005
    pub min_visible_width: f64,

    /// 进行中停机时长刷新间隔（秒），默认 60
    pub live_refresh_interval_secs: u64,

    /// 外部原因目录路径（None 使用内置表）
    pub reason_catalog_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            min_visible_width: DEFAULT_MIN_VISIBLE_WIDTH,
            live_refresh_interval_secs: 60,
            reason_catalog_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> MesResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> MesResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MesError::from(ValidationError::InvalidConfig {
                key: "config_path".to_string(),
                message: format!("{}: {}", path.display(), e),
            })
        })?;
        Self::from_json(&raw)
    }

    /// 完整加载流程
    ///
    /// path 为 None 或文件不存在时从默认值开始。
    pub fn load(path: Option<&Path>) -> MesResult<Self> {
        let mut config = match path {
            Some(p) if p.exists() => Self::from_file(p)?,
            Some(p) => {
                tracing::info!("配置文件不存在，使用默认配置: {}", p.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 读取进程环境变量覆写
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// 从任意键值来源覆写（非法值忽略并告警）
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(config_keys::ENV_CACHE_TTL_SECS) {
            match v.trim().parse::<u64>() {
                Ok(secs) => self.cache_ttl_secs = secs,
                Err(_) => tracing::warn!("忽略非法配置 {}={}", config_keys::ENV_CACHE_TTL_SECS, v),
            }
        }
        if let Some(v) = lookup(config_keys::ENV_MIN_VISIBLE_WIDTH) {
            match v.trim().parse::<f64>() {
                Ok(width) => self.min_visible_width = width,
                Err(_) => tracing::warn!("忽略非法配置 {}={}", config_keys::ENV_MIN_VISIBLE_WIDTH, v),
            }
        }
        if let Some(v) = lookup(config_keys::ENV_LIVE_REFRESH_SECS) {
            match v.trim().parse::<u64>() {
                Ok(secs) => self.live_refresh_interval_secs = secs,
                Err(_) => tracing::warn!("忽略非法配置 {}={}", config_keys::ENV_LIVE_REFRESH_SECS, v),
            }
        }
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cache_ttl_secs == 0 {
            return Err(ValidationError::InvalidConfig {
                key: config_keys::CACHE_TTL_SECS.to_string(),
                message: "TTL 必须大于 0".to_string(),
            });
        }
        if !(self.min_visible_width > 0.0 && self.min_visible_width <= 1.0) {
            return Err(ValidationError::InvalidConfig {
                key: config_keys::MIN_VISIBLE_WIDTH.to_string(),
                message: format!("取值须在 (0, 1] 内: {}", self.min_visible_width),
            });
        }
        if self.live_refresh_interval_secs == 0 {
            return Err(ValidationError::InvalidConfig {
                key: config_keys::LIVE_REFRESH_INTERVAL_SECS.to_string(),
                message: "刷新间隔必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn live_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.live_refresh_interval_secs)
    }

    /// 加载原因目录（未配置路径时使用内置表）
    pub fn load_reason_catalog(&self) -> MesResult<ReasonCatalog> {
        match &self.reason_catalog_path {
            Some(path) => ReasonCatalog::load(path),
            None => Ok(ReasonCatalog::builtin()),
        }
    }
}

/// 默认配置文件路径
///
/// 优先使用环境变量 MES_CORE_CONFIG_PATH，其次为用户配置目录。
pub fn get_default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(config_keys::ENV_CONFIG_PATH) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    match dirs::config_dir() {
        Some(dir) => dir.join("mes-downtime-core").join("config.json"),
        None => PathBuf::from("./mes-downtime-core.json"),
    }
}
