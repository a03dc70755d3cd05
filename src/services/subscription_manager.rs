// ==========================================
// MES 停机核心 - 订阅生命周期管理
// ==========================================
// 状态机: running ⇄ paused
// - pause_all: 退订全部，保留名称 → paused（已 paused 时为空操作）
// - resume_all: 按保留的名称逐个重新订阅 → running（已 running 时为空操作）
// - 单个订阅失败只记录并回调 on_error，不影响其他订阅
// 驱动: 页面可见性（隐藏 → 暂停，可见 → 恢复）
// ==========================================

use crate::error::{MesError, MesResult};
use crate::repository::change_feed::{
    ChangeEvent, ErrorHandler, EventHandler, FeedHandlers, UnsubscribeHandle,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// 订阅函数: 给定回调建立订阅，返回退订句柄
pub type SubscribeFn = Arc<dyn Fn(FeedHandlers) -> MesResult<UnsubscribeHandle> + Send + Sync>;

/// 管理器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerState {
    Running,
    Paused,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerState::Running => write!(f, "running"),
            ManagerState::Paused => write!(f, "paused"),
        }
    }
}

struct Registration {
    subscribe_fn: SubscribeFn,
    handlers: FeedHandlers,
    handle: Option<UnsubscribeHandle>,
}

impl Registration {
    fn connect(&mut self, name: &str) -> MesResult<()> {
        match (self.subscribe_fn)(self.handlers.clone()) {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("订阅失败: name={}, {}", name, e);
                (self.handlers.on_error)(e.clone());
                Err(e)
            }
        }
    }

    fn disconnect(&mut self, name: &str) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.unsubscribe() {
                tracing::warn!("退订失败: name={}, {}", name, e);
                (self.handlers.on_error)(e);
            }
        }
    }
}

// ==========================================
// SubscriptionManager
// ==========================================
pub struct SubscriptionManager {
    state: ManagerState,
    registrations: BTreeMap<String, Registration>,
    /// 暂停时保留的订阅名称（恢复时按此列表重新订阅）
    paused_names: Vec<String>,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            state: ManagerState::Running,
            registrations: BTreeMap::new(),
            paused_names: Vec::new(),
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == ManagerState::Paused
    }

    /// 当前持有有效订阅的名称
    pub fn active_names(&self) -> Vec<String> {
        self.registrations
            .iter()
            .filter(|(_, r)| r.handle.is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// 已登记的全部名称（含暂停中的）
    pub fn registered_names(&self) -> Vec<String> {
        self.registrations.keys().cloned().collect()
    }

    pub fn paused_names(&self) -> &[String] {
        &self.paused_names
    }

    /// 登记并建立订阅
    ///
    /// 同名订阅先退订再替换；paused 状态下只登记，恢复时再订阅。
    ///
    /// # 返回
    /// - Err: 订阅建立失败（已回调 on_error，登记不保留）
    pub fn subscribe(
        &mut self,
        name: &str,
        subscribe_fn: SubscribeFn,
        on_event: EventHandler,
        on_error: ErrorHandler,
    ) -> MesResult<()> {
        if self.unsubscribe(name) {
            tracing::debug!("替换同名订阅: name={}", name);
        }

        let mut registration = Registration {
            subscribe_fn,
            handlers: FeedHandlers::new(on_event, on_error),
            handle: None,
        };

        if self.is_paused() {
            tracing::debug!("管理器已暂停，仅登记订阅: name={}", name);
            self.paused_names.push(name.to_string());
            self.registrations.insert(name.to_string(), registration);
            return Ok(());
        }

        registration.connect(name)?;
        tracing::info!("订阅已建立: name={}", name);
        self.registrations.insert(name.to_string(), registration);
        Ok(())
    }

    /// 退订并移除登记
    ///
    /// # 返回
    /// - true: 该名称存在
    pub fn unsubscribe(&mut self, name: &str) -> bool {
        self.paused_names.retain(|n| n != name);
        match self.registrations.remove(name) {
            Some(mut registration) => {
                registration.disconnect(name);
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe_all(&mut self) {
        let names = self.registered_names();
        for name in &names {
            self.unsubscribe(name);
        }
        if !names.is_empty() {
            tracing::info!("已退订全部订阅: count={}", names.len());
        }
    }

    /// 暂停全部订阅（保留名称）
    pub fn pause_all(&mut self) {
        if self.is_paused() {
            tracing::debug!("订阅已处于暂停状态，忽略");
            return;
        }

        self.paused_names = self.registered_names();
        for (name, registration) in self.registrations.iter_mut() {
            registration.disconnect(name);
        }
        self.state = ManagerState::Paused;
        tracing::info!("订阅已暂停: names={:?}", self.paused_names);
    }

    /// 恢复暂停时保留的订阅
    ///
    /// # 返回
    /// - 恢复失败的 (名称, 错误)；失败的订阅保留登记，下次恢复时重试
    pub fn resume_all(&mut self) -> Vec<(String, MesError)> {
        if !self.is_paused() {
            tracing::debug!("订阅已处于运行状态，忽略");
            return Vec::new();
        }

        let names = std::mem::take(&mut self.paused_names);
        let mut failures = Vec::new();
        for name in &names {
            let Some(registration) = self.registrations.get_mut(name) else {
                continue;
            };
            if let Err(e) = registration.connect(name) {
                failures.push((name.clone(), e));
            }
        }

        self.state = ManagerState::Running;
        tracing::info!(
            "订阅已恢复: resumed={}, failed={}",
            names.len() - failures.len(),
            failures.len()
        );
        failures
    }

    /// 页面可见性变化
    pub fn on_visibility_changed(&mut self, visible: bool) {
        if visible {
            self.resume_all();
        } else {
            self.pause_all();
        }
    }

    /// 跟随可见性流（直到发送端关闭）
    pub fn follow_visibility(
        manager: Arc<Mutex<SubscriptionManager>>,
        mut visibility: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while visibility.changed().await.is_ok() {
                let visible = *visibility.borrow_and_update();
                let mut guard = manager.lock().unwrap_or_else(|e| e.into_inner());
                guard.on_visibility_changed(visible);
            }
            tracing::debug!("可见性流已关闭，停止跟随");
        })
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

/// 便捷构造: 事件回调
pub fn event_handler<F>(f: F) -> EventHandler
where
    F: Fn(ChangeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 便捷构造: 错误回调
pub fn error_handler<F>(f: F) -> ErrorHandler
where
    F: Fn(MesError) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        subscribed: AtomicUsize,
        unsubscribed: AtomicUsize,
        errors: AtomicUsize,
    }

    fn counting_subscribe(counters: Arc<Counters>) -> SubscribeFn {
        Arc::new(move |_handlers: FeedHandlers| {
            counters.subscribed.fetch_add(1, Ordering::SeqCst);
            let c = Arc::clone(&counters);
            Ok(UnsubscribeHandle::new(move || {
                c.unsubscribed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
        })
    }

    fn failing_subscribe() -> SubscribeFn {
        Arc::new(|_handlers: FeedHandlers| Err(MesError::collaborator("subscribe", "offline")))
    }

    fn noop_event() -> EventHandler {
        event_handler(|_| {})
    }

    fn counting_error(counters: Arc<Counters>) -> ErrorHandler {
        error_handler(move |_| {
            counters.errors.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_pause_twice_is_noop() {
        let counters = Arc::new(Counters::default());
        let mut manager = SubscriptionManager::new();
        for name in ["downtimes", "entries"] {
            manager
                .subscribe(name, counting_subscribe(Arc::clone(&counters)), noop_event(), counting_error(Arc::clone(&counters)))
                .unwrap();
        }

        manager.pause_all();
        assert_eq!(counters.unsubscribed.load(Ordering::SeqCst), 2);
        manager.pause_all();
        assert_eq!(counters.unsubscribed.load(Ordering::SeqCst), 2);
        assert!(manager.is_paused());
        assert!(manager.active_names().is_empty());
    }

    #[test]
    fn test_resume_restores_same_names() {
        let counters = Arc::new(Counters::default());
        let mut manager = SubscriptionManager::new();
        for name in ["downtimes", "entries", "orders"] {
            manager
                .subscribe(name, counting_subscribe(Arc::clone(&counters)), noop_event(), counting_error(Arc::clone(&counters)))
                .unwrap();
        }
        let before = manager.active_names();

        manager.pause_all();
        assert_eq!(manager.paused_names().len(), 3);
        let failures = manager.resume_all();
        assert!(failures.is_empty());
        assert_eq!(manager.active_names(), before);
        assert_eq!(counters.subscribed.load(Ordering::SeqCst), 6);

        // running 状态下再次恢复为空操作
        manager.resume_all();
        assert_eq!(counters.subscribed.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_one_failure_does_not_block_others() {
        let counters = Arc::new(Counters::default());
        let flaky_ok = Arc::new(AtomicUsize::new(0));
        let mut manager = SubscriptionManager::new();

        manager
            .subscribe("a", counting_subscribe(Arc::clone(&counters)), noop_event(), counting_error(Arc::clone(&counters)))
            .unwrap();

        // 首次成功、之后失败的订阅
        let flag = Arc::clone(&flaky_ok);
        let flaky: SubscribeFn = Arc::new(move |_h: FeedHandlers| {
            if flag.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(UnsubscribeHandle::noop())
            } else {
                Err(MesError::collaborator("subscribe", "offline"))
            }
        });
        manager
            .subscribe("b", flaky, noop_event(), counting_error(Arc::clone(&counters)))
            .unwrap();
        manager
            .subscribe("c", counting_subscribe(Arc::clone(&counters)), noop_event(), counting_error(Arc::clone(&counters)))
            .unwrap();

        manager.pause_all();
        let failures = manager.resume_all();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "b");
        assert_eq!(manager.active_names(), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(counters.errors.load(Ordering::SeqCst), 1);
        assert_eq!(manager.registered_names().len(), 3);
    }

    #[test]
    fn test_subscribe_replaces_existing_name() {
        let counters = Arc::new(Counters::default());
        let mut manager = SubscriptionManager::new();
        manager
            .subscribe("a", counting_subscribe(Arc::clone(&counters)), noop_event(), counting_error(Arc::clone(&counters)))
            .unwrap();
        manager
            .subscribe("a", counting_subscribe(Arc::clone(&counters)), noop_event(), counting_error(Arc::clone(&counters)))
            .unwrap();
        assert_eq!(counters.subscribed.load(Ordering::SeqCst), 2);
        assert_eq!(counters.unsubscribed.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_names().len(), 1);
    }

    #[test]
    fn test_failed_subscribe_is_not_registered() {
        let counters = Arc::new(Counters::default());
        let mut manager = SubscriptionManager::new();
        let result = manager.subscribe("x", failing_subscribe(), noop_event(), counting_error(Arc::clone(&counters)));
        assert!(result.is_err());
        assert!(manager.registered_names().is_empty());
        assert_eq!(counters.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_while_paused_waits_for_resume() {
        let counters = Arc::new(Counters::default());
        let mut manager = SubscriptionManager::new();
        manager.pause_all();
        manager
            .subscribe("late", counting_subscribe(Arc::clone(&counters)), noop_event(), counting_error(Arc::clone(&counters)))
            .unwrap();
        assert_eq!(counters.subscribed.load(Ordering::SeqCst), 0);
        manager.on_visibility_changed(true);
        assert_eq!(manager.active_names(), vec!["late".to_string()]);
    }

    #[tokio::test]
    async fn test_follow_visibility() {
        let counters = Arc::new(Counters::default());
        let manager = Arc::new(Mutex::new(SubscriptionManager::new()));
        manager
            .lock()
            .unwrap()
            .subscribe("a", counting_subscribe(Arc::clone(&counters)), noop_event(), counting_error(Arc::clone(&counters)))
            .unwrap();

        let (tx, rx) = watch::channel(true);
        let task = SubscriptionManager::follow_visibility(Arc::clone(&manager), rx);

        tx.send(false).unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(manager.lock().unwrap().is_paused());

        tx.send(true).unwrap();
        drop(tx);
        task.await.unwrap();
        assert!(!manager.lock().unwrap().is_paused());
        assert_eq!(counters.subscribed.load(Ordering::SeqCst), 2);
    }
}
