// ==========================================
// MES 停机核心 - 领域类型定义
// ==========================================
// 生产日 / 班次 / 停机状态 / 停机类别 / 暂存编辑目标类型
// 字符串标识统一为 SCREAMING_SNAKE_CASE 或 camelCase（与存储字段一致）
// ==========================================

use crate::error::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 生产日 (Production Day)
// ==========================================
// 当日 06:30 至次日 06:29:59 的 24 小时核算周期
// 派生值，不独立存储
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductionDay(NaiveDate);

impl ProductionDay {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// 对应的日历日期（生产日起始 06:30 所在日期）
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + chrono::Duration::days(1))
    }

    pub fn prev(&self) -> Self {
        Self(self.0 - chrono::Duration::days(1))
    }
}

impl fmt::Display for ProductionDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for ProductionDay {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|e| ValidationError::MalformedTimestamp(format!("{}: {}", s, e)))
    }
}

// ==========================================
// 班次 (Shift)
// ==========================================
// T1: 06:30-14:59 | T2: 15:00-23:19 | T3: 23:20-06:29 (跨零点)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Shift {
    First,
    Second,
    Third,
}

impl Shift {
    pub const ALL: [Shift; 3] = [Shift::First, Shift::Second, Shift::Third];

    pub fn number(&self) -> u8 {
        match self {
            Shift::First => 1,
            Shift::Second => 2,
            Shift::Third => 3,
        }
    }

    /// 是否跨越零点
    pub fn crosses_midnight(&self) -> bool {
        matches!(self, Shift::Third)
    }
}

impl TryFrom<u8> for Shift {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Shift::First),
            2 => Ok(Shift::Second),
            3 => Ok(Shift::Third),
            other => Err(ValidationError::InvalidShift(other)),
        }
    }
}

impl From<Shift> for u8 {
    fn from(shift: Shift) -> Self {
        shift.number()
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.number())
    }
}

// ==========================================
// 停机状态 (Downtime Status)
// ==========================================
// 状态机: active → finished（更正操作可回到 active）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DowntimeStatus {
    Active,   // 进行中
    Finished, // 已结束
}

impl fmt::Display for DowntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DowntimeStatus::Active => write!(f, "active"),
            DowntimeStatus::Finished => write!(f, "finished"),
        }
    }
}

// ==========================================
// 停机类别 (Downtime Category)
// ==========================================
// 封闭枚举；原因→类别映射表由外部配置加载（见 config::ReasonCatalog）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DowntimeCategory {
    Tooling,        // 模具
    Process,        // 工艺
    Purchasing,     // 采购
    Preparation,    // 备料
    Quality,        // 质量
    Maintenance,    // 维修
    Production,     // 生产
    Setup,          // 换型
    Administrative, // 行政
    Pcp,            // 计划
    Commercial,     // 商务
    Other,          // 其他（默认）
}

impl DowntimeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DowntimeCategory::Tooling => "TOOLING",
            DowntimeCategory::Process => "PROCESS",
            DowntimeCategory::Purchasing => "PURCHASING",
            DowntimeCategory::Preparation => "PREPARATION",
            DowntimeCategory::Quality => "QUALITY",
            DowntimeCategory::Maintenance => "MAINTENANCE",
            DowntimeCategory::Production => "PRODUCTION",
            DowntimeCategory::Setup => "SETUP",
            DowntimeCategory::Administrative => "ADMINISTRATIVE",
            DowntimeCategory::Pcp => "PCP",
            DowntimeCategory::Commercial => "COMMERCIAL",
            DowntimeCategory::Other => "OTHER",
        }
    }
}

impl Default for DowntimeCategory {
    fn default() -> Self {
        DowntimeCategory::Other
    }
}

impl fmt::Display for DowntimeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 记录种类 (Record Kind)
// ==========================================
// 外部存储中的逻辑集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordKind {
    Downtime,
    ProductionEntry,
    Planning,
    Order,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Downtime => "downtime",
            RecordKind::ProductionEntry => "productionEntry",
            RecordKind::Planning => "planning",
            RecordKind::Order => "order",
        }
    }

    /// 写入后需要失效的缓存键前缀
    pub fn cache_prefix(&self) -> &'static str {
        match self {
            RecordKind::Downtime => "down_",
            RecordKind::ProductionEntry => "prod_",
            RecordKind::Planning => "plan_",
            RecordKind::Order => "order_",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 暂存编辑目标类型 (Target Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetType {
    PlanningRecord,
    EntryRecord,
    OrderRecord,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::PlanningRecord => "planningRecord",
            TargetType::EntryRecord => "entryRecord",
            TargetType::OrderRecord => "orderRecord",
        }
    }

    /// 对应的存储集合
    pub fn record_kind(&self) -> RecordKind {
        match self {
            TargetType::PlanningRecord => RecordKind::Planning,
            TargetType::EntryRecord => RecordKind::ProductionEntry,
            TargetType::OrderRecord => RecordKind::Order,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
