// ==========================================
// MES 停机核心 - 停机记录领域模型
// ==========================================
// 不变量: status = finished ⇒ end ≠ null ∧ end ≥ start
// 存储字段名: status / start / end / durationMinutes / category / reason / resourceId
// ==========================================

use crate::domain::types::{DowntimeCategory, DowntimeStatus, ProductionDay, Shift};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// AuditInfo - 审计字段
// ==========================================
// 对核心不透明，原样透传
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInfo {
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
}

impl AuditInfo {
    /// 新建记录的审计信息
    pub fn created(actor: &str, now: NaiveDateTime) -> Self {
        Self {
            created_by: Some(actor.to_string()),
            updated_by: Some(actor.to_string()),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// 记录一次修改
    pub fn touch(&mut self, actor: &str, now: NaiveDateTime) {
        self.updated_by = Some(actor.to_string());
        self.updated_at = Some(now);
    }
}

// ==========================================
// DowntimeRecord - 停机记录
// ==========================================
/// 单个资源的一次停机
///
/// - `production_day` / `shift` 由 `start` 派生，每次 `start` 变化时重算
/// - `duration_minutes` 仅在 finished 状态下冻结；active 状态下为 None，
///   时长通过 `DowntimeLifecycle::live_duration` 实时计算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DowntimeRecord {
    /// 存储分配的 ID（创建前为 None）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    // ===== 分类 =====
    pub resource_id: String,
    pub category: DowntimeCategory,
    pub reason: String,

    // ===== 状态与时间 =====
    pub status: DowntimeStatus,
    pub start: NaiveDateTime,
    pub production_day: ProductionDay,
    pub shift: Shift,
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,

    // ===== 审计 =====
    #[serde(flatten)]
    pub audit: AuditInfo,
}

impl DowntimeRecord {
    pub fn is_active(&self) -> bool {
        self.status == DowntimeStatus::Active
    }

    /// 排序/日志用 ID（未分配时为空串）
    pub fn id_str(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    /// 有效结束时间: finished 取 end，active 以 now 作为隐式结束
    pub fn effective_end(&self, now: NaiveDateTime) -> NaiveDateTime {
        match (self.status, self.end) {
            (DowntimeStatus::Finished, Some(end)) => end,
            _ => now,
        }
    }

    /// 校验状态不变量
    pub fn satisfies_invariant(&self) -> bool {
        match self.status {
            DowntimeStatus::Finished => matches!(self.end, Some(end) if end >= self.start),
            DowntimeStatus::Active => self.end.is_none(),
        }
    }
}
