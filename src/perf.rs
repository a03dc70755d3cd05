// ==========================================
// MES 停机核心 - 操作耗时统计
// ==========================================
// OpGuard: 作用域守卫，drop 时在 target "perf" 下输出
// elapsed_ms + 外部调用次数 + 结果
// 开关:
// - MES_CORE_SLOW_OP_MS=200 配置慢操作阈值（毫秒），超过时以 warn 输出
// ==========================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static SLOW_OP_THRESHOLD_MS: OnceLock<AtomicU64> = OnceLock::new();

fn slow_threshold_ms() -> u64 {
    SLOW_OP_THRESHOLD_MS
        .get_or_init(|| {
            let ms = std::env::var("MES_CORE_SLOW_OP_MS")
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(if cfg!(debug_assertions) { 200 } else { 1000 });
            AtomicU64::new(ms)
        })
        .load(Ordering::Relaxed)
}

/// 覆盖慢操作阈值（0 表示关闭慢操作告警）
pub fn set_slow_threshold_ms(ms: u64) {
    slow_threshold_ms();
    if let Some(v) = SLOW_OP_THRESHOLD_MS.get() {
        v.store(ms, Ordering::Relaxed);
    }
}

/// 操作耗时 Guard
///
/// 使用方式：
/// ```ignore
/// let mut perf = mes_downtime_core::perf::OpGuard::new("finish_downtime");
/// perf.record_call();
/// // do work...
/// perf.succeed();
/// ```
pub struct OpGuard {
    op: &'static str,
    start: Instant,
    external_calls: u64,
    succeeded: bool,
}

impl OpGuard {
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            start: Instant::now(),
            external_calls: 0,
            succeeded: false,
        }
    }

    /// 记录一次外部存储调用
    pub fn record_call(&mut self) {
        self.external_calls = self.external_calls.saturating_add(1);
    }

    pub fn record_calls(&mut self, n: u64) {
        self.external_calls = self.external_calls.saturating_add(n);
    }

    pub fn external_calls(&self) -> u64 {
        self.external_calls
    }

    /// 标记操作成功（未标记的 guard 视为失败/提前返回）
    pub fn succeed(&mut self) {
        self.succeeded = true;
    }
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        let outcome = if self.succeeded { "ok" } else { "failed" };
        let threshold = slow_threshold_ms();

        if threshold > 0 && elapsed_ms >= threshold {
            tracing::warn!(
                target: "perf",
                op = self.op,
                elapsed_ms,
                external_calls = self.external_calls,
                outcome,
                "slow op"
            );
        } else {
            tracing::info!(
                target: "perf",
                op = self.op,
                elapsed_ms,
                external_calls = self.external_calls,
                outcome,
                "done"
            );
        }
    }
}
