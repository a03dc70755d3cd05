// ==========================================
// MES 停机核心 - 记录存储 Trait
// ==========================================
// 职责: 定义外部文档存储的访问接口（不包含业务逻辑）
// 红线: 存储不含业务规则，只做读写；ID 由存储分配
// 覆盖: 停机 / 产量 / 计划 / 订单 四类记录
// ==========================================

use crate::domain::downtime::DowntimeRecord;
use crate::domain::types::RecordKind;
use crate::error::{MesError, MesResult};
use async_trait::async_trait;
use serde_json::Value;

/// 字段名 → JSON 值
pub type FieldMap = serde_json::Map<String, Value>;

/// 存储中的一条记录
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub fields: FieldMap,
}

impl StoredRecord {
    pub fn new(id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// 转换为停机记录（ID 以存储分配的为准）
    pub fn to_downtime(&self) -> MesResult<DowntimeRecord> {
        let mut record: DowntimeRecord = serde_json::from_value(Value::Object(self.fields.clone()))?;
        record.id = Some(self.id.clone());
        Ok(record)
    }
}

/// 停机记录 → 存储字段（不含 id）
pub fn downtime_to_fields(record: &DowntimeRecord) -> MesResult<FieldMap> {
    match serde_json::to_value(record)? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(MesError::Serialization(format!(
            "停机记录序列化结果不是对象: {}",
            other
        ))),
    }
}

// ==========================================
// FilterSpec - 查询条件
// ==========================================

/// 等值条件
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub field: String,
    pub value: Value,
}

/// 查询条件（所有条件为 AND）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub conditions: Vec<FilterCondition>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加等值条件
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(FilterCondition {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// 本地匹配（内存实现与变更推送过滤使用）
    pub fn matches(&self, fields: &FieldMap) -> bool {
        self.conditions
            .iter()
            .all(|c| fields.get(&c.field) == Some(&c.value))
    }

    /// 稳定的文本形式（用于缓存键）
    pub fn cache_suffix(&self) -> String {
        self.conditions
            .iter()
            .map(|c| format!("{}={}", c.field, c.value))
            .collect::<Vec<_>>()
            .join("&")
    }
}

// ==========================================
// RecordStore Trait
// ==========================================
// 用途: 外部文档存储访问
// 实现者: 宿主提供（测试中为内存实现）
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 按 ID 读取
    ///
    /// # 返回
    /// - Ok(Some): 记录存在
    /// - Ok(None): 记录不存在
    /// - Err: 存储/网络错误
    async fn read(&self, kind: RecordKind, id: &str) -> MesResult<Option<StoredRecord>>;

    /// 条件查询
    async fn query(&self, kind: RecordKind, filter: &FilterSpec) -> MesResult<Vec<StoredRecord>>;

    /// 按 ID 合并写入字段（只覆盖给定字段）
    async fn write(&self, kind: RecordKind, id: &str, fields: &FieldMap) -> MesResult<()>;

    /// 创建记录
    ///
    /// # 返回
    /// - Ok(String): 存储分配的 ID
    async fn create(&self, kind: RecordKind, fields: &FieldMap) -> MesResult<String>;
}
