// ==========================================
// MES 停机核心 - 暂存编辑领域模型
// ==========================================
// 计划/产量/订单记录的字段级未提交修改
// 同一目标最多一个 PendingEdit，changed_fields 为空时整体移除
// ==========================================

use crate::domain::types::TargetType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// f64 可精确表示的最大整数 (2^53 - 1)
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

// ==========================================
// FieldValue - 字段值
// ==========================================
/// 按值比较的字段值
///
/// 数值统一为 f64，避免 10 与 10.0 被判定为不同
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// 从存储字段值转换；数组/对象不参与字段级编辑，按 Null 处理
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(FieldValue::Number).unwrap_or(FieldValue::Null),
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            _ => FieldValue::Null,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            // 整数值按整数写回，避免 80 变成 80.0
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
                serde_json::Value::from(*n as i64)
            }
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// 字段名 → 字段值
pub type FieldChanges = BTreeMap<String, FieldValue>;

// ==========================================
// PendingEdit - 单目标暂存编辑
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEdit {
    pub target_id: String,
    pub target_type: TargetType,
    pub changed_fields: FieldChanges,
    /// 字段首次暂存时的原值（后续暂存不覆盖）
    pub original_values: FieldChanges,
}

impl PendingEdit {
    pub fn new(target_id: impl Into<String>, target_type: TargetType) -> Self {
        Self {
            target_id: target_id.into(),
            target_type,
            changed_fields: FieldChanges::new(),
            original_values: FieldChanges::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_fields.is_empty()
    }
}

/// 差异视图（diff 输出）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditDiff {
    pub changed_fields: FieldChanges,
    pub original_values: FieldChanges,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality_across_sources() {
        assert_eq!(FieldValue::from(10_i64), FieldValue::from(10.0));
        assert_ne!(FieldValue::from(10_i64), FieldValue::from("10"));
    }

    #[test]
    fn test_integral_numbers_written_as_integers() {
        let json = FieldValue::from(80_i64).to_json();
        assert_eq!(json, serde_json::json!(80));
        assert!(json.is_i64());
        assert_eq!(FieldValue::Number(-3.0).to_json(), serde_json::json!(-3));
        assert!(FieldValue::Number(12.5).to_json().is_f64());
        assert!(FieldValue::Number(1e300).to_json().is_f64());
        assert_eq!(FieldValue::Number(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_untagged_serde() {
        let v: FieldValue = serde_json::from_str("12.5").unwrap();
        assert_eq!(v, FieldValue::Number(12.5));
        let v: FieldValue = serde_json::from_str("null").unwrap();
        assert_eq!(v, FieldValue::Null);
        let v: FieldValue = serde_json::from_str("\"A\"").unwrap();
        assert_eq!(v, FieldValue::Text("A".to_string()));
        assert_eq!(FieldValue::Number(3.5).to_json(), serde_json::json!(3.5));
    }
}
