// ==========================================
// MES 停机核心 - 定时刷新与视图作用域
// ==========================================
// LiveTicker: 按固定间隔以 now 调用回调（如刷新进行中停机的实时时长）
// ViewScope:  进入视图时获取、离开视图时释放的资源集合
// 约束: 计时器归属于视图；stop / drop 后不再触发，无全局计时器
// ==========================================

use crate::error::{MesResult, ValidationError};
use crate::services::clock::Clock;
use crate::services::subscription_manager::SubscriptionManager;
use chrono::NaiveDateTime;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// ==========================================
// LiveTicker
// ==========================================
pub struct LiveTicker {
    name: String,
    handle: Option<JoinHandle<()>>,
}

impl LiveTicker {
    /// 启动计时器（首次立即触发）
    ///
    /// 必须在 tokio 运行时内调用。
    ///
    /// # 返回
    /// - Err(InvalidConfig): period 为 0
    pub fn start<F>(
        name: &str,
        period: Duration,
        clock: Arc<dyn Clock>,
        mut on_tick: F,
    ) -> MesResult<Self>
    where
        F: FnMut(NaiveDateTime) + Send + 'static,
    {
        if period.is_zero() {
            return Err(ValidationError::InvalidConfig {
                key: "ticker_period".to_string(),
                message: format!("计时器间隔必须大于 0: name={}", name),
            }
            .into());
        }

        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                tracing::trace!("计时器触发: name={}", task_name);
                on_tick(clock.now());
            }
        });
        tracing::debug!("计时器已启动: name={}, period_ms={}", name, period.as_millis());

        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// 停止计时器（幂等）
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("计时器已停止: name={}", self.name);
        }
    }
}

impl Drop for LiveTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ==========================================
// ViewScope
// ==========================================
/// 视图作用域
///
/// 持有视图期间的计时器与订阅；`exit` 或 drop 时全部释放。
pub struct ViewScope {
    name: String,
    tickers: Vec<LiveTicker>,
    subscriptions: Arc<Mutex<SubscriptionManager>>,
    visibility_task: Option<JoinHandle<()>>,
    released: bool,
}

impl ViewScope {
    pub fn enter(name: &str) -> Self {
        tracing::debug!("进入视图: {}", name);
        Self {
            name: name.to_string(),
            tickers: Vec::new(),
            subscriptions: Arc::new(Mutex::new(SubscriptionManager::new())),
            visibility_task: None,
            released: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 视图内的订阅管理器
    pub fn subscriptions(&self) -> Arc<Mutex<SubscriptionManager>> {
        Arc::clone(&self.subscriptions)
    }

    /// 在视图内启动计时器
    pub fn start_ticker<F>(
        &mut self,
        name: &str,
        period: Duration,
        clock: Arc<dyn Clock>,
        on_tick: F,
    ) -> MesResult<()>
    where
        F: FnMut(NaiveDateTime) + Send + 'static,
    {
        self.tickers
            .push(LiveTicker::start(name, period, clock, on_tick)?);
        Ok(())
    }

    pub fn ticker_count(&self) -> usize {
        self.tickers.iter().filter(|t| t.is_running()).count()
    }

    /// 视图内订阅跟随页面可见性
    pub fn follow_visibility(&mut self, visibility: watch::Receiver<bool>) {
        if let Some(previous) = self.visibility_task.take() {
            previous.abort();
        }
        self.visibility_task = Some(SubscriptionManager::follow_visibility(
            Arc::clone(&self.subscriptions),
            visibility,
        ));
    }

    /// 离开视图，释放全部资源
    pub fn exit(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        for ticker in self.tickers.iter_mut() {
            ticker.stop();
        }
        self.tickers.clear();

        if let Some(task) = self.visibility_task.take() {
            task.abort();
        }

        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unsubscribe_all();
        tracing::debug!("离开视图，资源已释放: {}", self.name);
    }
}

impl Drop for ViewScope {
    fn drop(&mut self) {
        self.release();
    }
}
