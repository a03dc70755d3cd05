// ==========================================
// MES 停机核心 - 查询缓存
// ==========================================
// 职责: 对昂贵的外部读取做 TTL 记忆化
// 规则:
// - 新鲜: now - stored_at ≤ TTL，直接返回缓存值
// - 同一键的并发请求合并到同一个进行中的读取（producer 只调用一次）
// - 进行中的读取期间被失效的键，读取结果只返回给等待者，不写入缓存
// - 错误不缓存
// ==========================================
// 实现: 进行中读取表（Shared future），锁不跨 await 持有
// 容量: 无 LRU；任意键场景下由调用方定期 purge_expired
// ==========================================

use crate::error::{MesError, MesResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, MesError>>>;

struct CacheEntry<T> {
    value: T,
    stored_at: Instant,
}

struct InFlight<T> {
    fetch_id: u64,
    fetch: SharedFetch<T>,
}

struct CacheState<T> {
    entries: HashMap<String, CacheEntry<T>>,
    in_flight: HashMap<String, InFlight<T>>,
    next_fetch_id: u64,
    hits: u64,
    misses: u64,
    coalesced: u64,
}

/// 单个键的统计
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKeyStats {
    pub key: String,
    pub age_ms: u64,
    pub fresh: bool,
}

/// 缓存统计
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub keys: Vec<CacheKeyStats>,
}

// ==========================================
// QueryCache - TTL 查询缓存
// ==========================================
pub struct QueryCache<T> {
    ttl: Duration,
    state: Arc<Mutex<CacheState<T>>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            state: Arc::clone(&self.state),
        }
    }
}

fn lock<T>(state: &Mutex<CacheState<T>>) -> MutexGuard<'_, CacheState<T>> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl<T> QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                next_fetch_id: 0,
                hits: 0,
                misses: 0,
                coalesced: 0,
            })),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry<T>, now: Instant) -> bool {
        now.saturating_duration_since(entry.stored_at) <= self.ttl
    }

    /// 读取缓存，未命中时调用 producer
    ///
    /// # 参数
    /// - `key`: 调用方给定的缓存键（如 "down_2026-03-02"）
    /// - `producer`: 外部读取；同一键进行中时不会被调用
    ///
    /// # 返回
    /// - 缓存值或 producer 的结果；producer 的错误原样返回，不缓存
    pub async fn get<F, Fut>(&self, key: &str, producer: F) -> MesResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = MesResult<T>> + Send + 'static,
    {
        let fetch = {
            let mut state = lock(&self.state);
            let now = Instant::now();

            let cached = state
                .entries
                .get(key)
                .filter(|entry| self.is_fresh(entry, now))
                .map(|entry| entry.value.clone());
            if let Some(value) = cached {
                state.hits += 1;
                tracing::debug!("缓存命中: key={}", key);
                return Ok(value);
            }

            if let Some(in_flight) = state.in_flight.get(key) {
                let fetch = in_flight.fetch.clone();
                state.coalesced += 1;
                tracing::debug!("缓存合并到进行中的读取: key={}", key);
                fetch
            } else {
                state.misses += 1;
                state.next_fetch_id += 1;
                let fetch_id = state.next_fetch_id;
                tracing::debug!("缓存未命中，发起读取: key={}, fetch_id={}", key, fetch_id);

                let fetch = self.spawn_fetch(key.to_string(), fetch_id, producer);
                state.in_flight.insert(
                    key.to_string(),
                    InFlight {
                        fetch_id,
                        fetch: fetch.clone(),
                    },
                );
                fetch
            }
        };

        fetch.await
    }

    fn spawn_fetch<F, Fut>(&self, key: String, fetch_id: u64, producer: F) -> SharedFetch<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = MesResult<T>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        async move {
            // producer 在首次 poll 时调用，此时已不持有锁
            let result = producer().await;

            let mut state = lock(&state);
            let current = state
                .in_flight
                .get(&key)
                .map(|f| f.fetch_id == fetch_id)
                .unwrap_or(false);
            if current {
                state.in_flight.remove(&key);
                if let Ok(value) = &result {
                    state.entries.insert(
                        key,
                        CacheEntry {
                            value: value.clone(),
                            stored_at: Instant::now(),
                        },
                    );
                }
            } else {
                tracing::debug!("读取期间键已失效，结果不写入缓存: key={}", key);
            }
            result
        }
        .boxed()
        .shared()
    }

    /// 是否存在新鲜的缓存值
    pub fn has(&self, key: &str) -> bool {
        let state = lock(&self.state);
        let now = Instant::now();
        state
            .entries
            .get(key)
            .map(|entry| self.is_fresh(entry, now))
            .unwrap_or(false)
    }

    /// 失效单个键（含进行中的读取）
    pub fn invalidate(&self, key: &str) {
        let mut state = lock(&self.state);
        let removed = state.entries.remove(key).is_some();
        let cancelled = state.in_flight.remove(key).is_some();
        tracing::debug!(
            "缓存失效: key={}, removed={}, in_flight_detached={}",
            key,
            removed,
            cancelled
        );
    }

    /// 按前缀失效（如 "down_" 失效所有停机查询）
    ///
    /// # 返回
    /// - 被移除的缓存条目数
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut state = lock(&self.state);
        let before = state.entries.len();
        state.entries.retain(|k, _| !k.starts_with(prefix));
        state.in_flight.retain(|k, _| !k.starts_with(prefix));
        let removed = before - state.entries.len();
        tracing::debug!("缓存按前缀失效: prefix={}, removed={}", prefix, removed);
        removed
    }

    /// 清空全部缓存（含进行中的读取）
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.in_flight.clear();
        tracing::debug!("缓存已清空");
    }

    /// 移除过期条目
    pub fn purge_expired(&self) -> usize {
        let mut state = lock(&self.state);
        let now = Instant::now();
        let ttl = self.ttl;
        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| now.saturating_duration_since(entry.stored_at) <= ttl);
        before - state.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = lock(&self.state);
        let now = Instant::now();
        let mut keys: Vec<CacheKeyStats> = state
            .entries
            .iter()
            .map(|(key, entry)| CacheKeyStats {
                key: key.clone(),
                age_ms: now.saturating_duration_since(entry.stored_at).as_millis() as u64,
                fresh: self.is_fresh(entry, now),
            })
            .collect();
        keys.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStats {
            size: state.entries.len(),
            in_flight: state.in_flight.len(),
            hits: state.hits,
            misses: state.misses,
            coalesced: state.coalesced,
            keys,
        }
    }
}
