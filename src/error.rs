// ==========================================
// MES 停机核心 - 错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类:
// - ValidationError: 输入问题（用户可修正），在任何外部调用之前同步拒绝
// - Collaborator:    外部存储/网络失败（稍后重试）
// - StaleData:       读写之间记录被外部修改（重新读取后重试）
// ==========================================

use chrono::NaiveDateTime;
use thiserror::Error;

/// 输入校验错误
///
/// 所有校验错误都在外部调用之前产生，不会出现部分写入。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("结束时间早于开始时间: start={start}, end={end}")]
    EndBeforeStart {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("资源已有进行中的停机: resource_id={resource_id}, active_id={active_id}")]
    DuplicateActive {
        resource_id: String,
        active_id: String,
    },

    #[error("时间格式错误: {0}")]
    MalformedTimestamp(String),

    #[error("无效班次: {0}")]
    InvalidShift(u8),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidTransition { from: String, to: String },

    #[error("目标类型不一致: target_id={target_id}, staged={staged}, requested={requested}")]
    TargetTypeMismatch {
        target_id: String,
        staged: String,
        requested: String,
    },

    #[error("字段缺失 (field={field})")]
    MissingField { field: String },

    #[error("配置无效 (key={key}): {message}")]
    InvalidConfig { key: String, message: String },
}

/// 核心错误类型
///
/// 所有错误都是结构化的值，展示层据此区分"修正输入"与"稍后重试"。
/// 派生 Clone: 合并中的缓存请求需要把同一个结果分发给多个等待者。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MesError {
    #[error("数据验证失败: {0}")]
    Validation(#[from] ValidationError),

    #[error("外部协作方失败 (operation={operation}): {message}")]
    Collaborator { operation: String, message: String },

    #[error("数据已被外部修改: record_id={record_id}, expected={expected:?}, actual={actual:?}")]
    StaleData {
        record_id: String,
        expected: Option<NaiveDateTime>,
        actual: Option<NaiveDateTime>,
    },

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("序列化失败: {0}")]
    Serialization(String),
}

impl MesError {
    /// 构造协作方错误
    pub fn collaborator(operation: impl Into<String>, message: impl Into<String>) -> Self {
        MesError::Collaborator {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// 是否为用户可修正的错误（提示"修正输入"）
    pub fn is_user_fixable(&self) -> bool {
        matches!(self, MesError::Validation(_))
    }

    /// 是否可由调用方重试（提示"稍后重试"或"重新读取后重试"）
    ///
    /// 核心不做自动重试，是否重试由调用方决定。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MesError::Collaborator { .. } | MesError::StaleData { .. }
        )
    }
}

// 协作方实现通常返回 anyhow::Error，这里统一归入 Collaborator
impl From<anyhow::Error> for MesError {
    fn from(err: anyhow::Error) -> Self {
        MesError::collaborator("external", format!("{:#}", err))
    }
}

impl From<serde_json::Error> for MesError {
    fn from(err: serde_json::Error) -> Self {
        MesError::Serialization(err.to_string())
    }
}

/// Result 类型别名
pub type MesResult<T> = Result<T, MesError>;
