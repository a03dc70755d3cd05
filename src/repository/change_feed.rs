// ==========================================
// MES 停机核心 - 变更推送 Trait
// ==========================================
// 职责: 外部存储的实时变更订阅接口
// 约定: subscribe 返回退订句柄；句柄被丢弃时同样退订
// ==========================================

use crate::domain::types::RecordKind;
use crate::error::{MesError, MesResult};
use crate::repository::record_store::FilterSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// 单条变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record_kind: RecordKind,
    pub id: String,
    /// Removed 时为 None
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

pub type EventHandler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(MesError) + Send + Sync>;

/// 订阅回调
#[derive(Clone)]
pub struct FeedHandlers {
    pub on_event: EventHandler,
    pub on_error: ErrorHandler,
}

impl FeedHandlers {
    pub fn new(on_event: EventHandler, on_error: ErrorHandler) -> Self {
        Self { on_event, on_error }
    }
}

impl fmt::Debug for FeedHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedHandlers").finish_non_exhaustive()
    }
}

// ==========================================
// UnsubscribeHandle - 退订句柄
// ==========================================
type UnsubscribeFn = Box<dyn FnOnce() -> MesResult<()> + Send>;

pub struct UnsubscribeHandle {
    cancel: Option<UnsubscribeFn>,
}

impl UnsubscribeHandle {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() -> MesResult<()> + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// 空句柄（无需退订的订阅）
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// 显式退订，返回退订结果
    pub fn unsubscribe(mut self) -> MesResult<()> {
        match self.cancel.take() {
            Some(cancel) => cancel(),
            None => Ok(()),
        }
    }
}

impl Drop for UnsubscribeHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            if let Err(e) = cancel() {
                tracing::warn!("退订失败（句柄释放）: {}", e);
            }
        }
    }
}

impl fmt::Debug for UnsubscribeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsubscribeHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ==========================================
// ChangeFeed Trait
// ==========================================
// 实现者: 宿主提供（测试中为内存实现）
pub trait ChangeFeed: Send + Sync {
    /// 订阅某类记录的变更
    ///
    /// # 返回
    /// - Ok(UnsubscribeHandle): 订阅成功
    /// - Err: 订阅建立失败（协作方错误）
    fn subscribe(
        &self,
        kind: RecordKind,
        filter: &FilterSpec,
        handlers: FeedHandlers,
    ) -> MesResult<UnsubscribeHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_handle_unsubscribes_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handle = UnsubscribeHandle::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        handle.unsubscribe().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let c = Arc::clone(&count);
            let _handle = UnsubscribeHandle::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_serde() {
        let event = ChangeEvent {
            kind: ChangeKind::Modified,
            record_kind: RecordKind::Downtime,
            id: "d1".to_string(),
            data: Some(serde_json::json!({"status": "finished"})),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "modified");
        assert_eq!(value["id"], "d1");
    }
}
