// ==========================================
// MES 停机核心 - 暂存编辑台账
// ==========================================
// 职责: 对计划/产量/订单记录的字段级修改做暂存，统一提交或放弃
// 规则:
// - 同一目标最多一个 PendingEdit；目标类型不可变更
// - 字段原值在首次暂存时记录，后续暂存不覆盖
// - 新值与原值相等时移除该字段；字段清空时移除整个目标
// - 提交: 各目标并发下发、统一等待；成功移除，失败保留并报告
// ==========================================

use crate::domain::edit::{EditDiff, FieldValue, PendingEdit};
use crate::domain::types::TargetType;
use crate::error::{MesError, MesResult, ValidationError};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use uuid::Uuid;

/// 单目标提交失败
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitFailure {
    pub target_id: String,
    pub target_type: TargetType,
    #[serde(serialize_with = "serialize_error")]
    pub error: MesError,
}

fn serialize_error<S: serde::Serializer>(error: &MesError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&error.to_string())
}

/// 批量提交报告
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReport {
    pub batch_id: Uuid,
    pub succeeded: Vec<String>,
    pub failed: Vec<CommitFailure>,
}

impl CommitReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ==========================================
// PendingEditLedger
// ==========================================
#[derive(Debug, Default)]
pub struct PendingEditLedger {
    edits: BTreeMap<String, PendingEdit>,
}

impl PendingEditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 暂存一个字段修改
    ///
    /// # 参数
    /// - `original`: 调用方读取到的字段当前值；仅在该字段首次暂存时记录
    ///
    /// # 返回
    /// - Err: 目标已以另一种类型暂存
    pub fn stage(
        &mut self,
        target_id: &str,
        target_type: TargetType,
        field: &str,
        new_value: FieldValue,
        original: FieldValue,
    ) -> Result<(), ValidationError> {
        if let Some(existing) = self.edits.get(target_id) {
            if existing.target_type != target_type {
                return Err(ValidationError::TargetTypeMismatch {
                    target_id: target_id.to_string(),
                    staged: existing.target_type.to_string(),
                    requested: target_type.to_string(),
                });
            }
        }

        let edit = self
            .edits
            .entry(target_id.to_string())
            .or_insert_with(|| PendingEdit::new(target_id, target_type));

        let baseline = edit
            .original_values
            .entry(field.to_string())
            .or_insert(original)
            .clone();

        if new_value == baseline {
            edit.changed_fields.remove(field);
            edit.original_values.remove(field);
            tracing::debug!("暂存修改已还原: target_id={}, field={}", target_id, field);
        } else {
            tracing::debug!(
                "暂存修改: target_id={}, field={}, {} -> {}",
                target_id,
                field,
                baseline,
                new_value
            );
            edit.changed_fields.insert(field.to_string(), new_value);
        }

        if edit.is_empty() {
            self.edits.remove(target_id);
        }
        Ok(())
    }

    /// 某目标的差异
    pub fn diff(&self, target_id: &str) -> Option<EditDiff> {
        self.edits.get(target_id).map(|edit| EditDiff {
            changed_fields: edit.changed_fields.clone(),
            original_values: edit.original_values.clone(),
        })
    }

    pub fn get(&self, target_id: &str) -> Option<&PendingEdit> {
        self.edits.get(target_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingEdit> {
        self.edits.values()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// 提交全部暂存修改
    ///
    /// 每个目标独立调用 `apply`，并发下发、统一等待。
    /// 成功的目标移除；失败的目标保留，供调用方重试。
    pub async fn commit_all<F, Fut>(&mut self, apply: F) -> CommitReport
    where
        F: Fn(PendingEdit) -> Fut,
        Fut: Future<Output = MesResult<()>>,
    {
        let batch_id = Uuid::new_v4();
        let staged: Vec<PendingEdit> = self.edits.values().cloned().collect();
        tracing::info!("提交暂存修改: batch_id={}, targets={}", batch_id, staged.len());

        let outcomes = join_all(staged.iter().cloned().map(&apply)).await;

        let mut report = CommitReport {
            batch_id,
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (edit, outcome) in staged.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    self.edits.remove(&edit.target_id);
                    report.succeeded.push(edit.target_id);
                }
                Err(error) => {
                    tracing::warn!(
                        "暂存修改提交失败: batch_id={}, target_id={}, {}",
                        batch_id,
                        edit.target_id,
                        error
                    );
                    report.failed.push(CommitFailure {
                        target_id: edit.target_id,
                        target_type: edit.target_type,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            "提交完成: batch_id={}, succeeded={}, failed={}",
            batch_id,
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }

    /// 放弃全部暂存修改（不调用外部存储）
    pub fn discard_all(&mut self) -> Vec<PendingEdit> {
        let discarded: Vec<PendingEdit> = std::mem::take(&mut self.edits).into_values().collect();
        if !discarded.is_empty() {
            tracing::info!("已放弃暂存修改: targets={}", discarded.len());
        }
        discarded
    }
}
