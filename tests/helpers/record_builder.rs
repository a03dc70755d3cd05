// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use mes_downtime_core::domain::types::DowntimeCategory;
use mes_downtime_core::engine::StartDowntime;

/// 2026-03 的本地时间
pub fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

// ==========================================
// StartDowntime 构建器
// ==========================================

pub struct DowntimeBuilder {
    resource_id: String,
    category: Option<DowntimeCategory>,
    reason: String,
    start: NaiveDateTime,
    end: Option<NaiveDateTime>,
}

impl DowntimeBuilder {
    pub fn new(resource_id: &str, start: NaiveDateTime) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            category: None,
            reason: "TROCA DE MOLDE".to_string(),
            start,
            end: None,
        }
    }

    pub fn reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }

    pub fn category(mut self, category: DowntimeCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn ended_at(mut self, end: NaiveDateTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn build(self) -> StartDowntime {
        StartDowntime {
            resource_id: self.resource_id,
            category: self.category,
            reason: self.reason,
            start: self.start,
            end: self.end,
        }
    }
}
