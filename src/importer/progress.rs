// ==========================================
// 商品导入系统 - 进度跟踪
// ==========================================
// 职责: 每个导入操作的已处理行计数、百分比、ETA, 以及节流后的进度持久化
// 并发: 工作协程递增原子计数, 查询方读取快照, 无需更大范围的锁
// 持久化节流: 百分比变化 或 距上次写入超过间隔 时才写状态存储
// ==========================================

use crate::repository::status_store::StatusStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 尚未持久化过的百分比标记
const NEVER_PERSISTED: u8 = u8::MAX;

// ==========================================
// ProgressSnapshot - 对外只读快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub operation_id: i64,
    pub processed: u64,
    pub total: u64,
    pub percent: u8,
    pub elapsed_ms: u64,
    /// 剩余时间估计; 尚未处理任何行或总数未知时为 None
    pub eta_ms: Option<u64>,
}

/// percent = min(100, floor(processed * 100 / total)); total 为 0 时为 0
pub fn compute_percent(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (processed as u128 * 100 / total as u128).min(100);
    percent as u8
}

/// ETA = elapsed * (total - processed) / processed
pub fn estimate_remaining_ms(elapsed_ms: u64, processed: u64, total: u64) -> Option<u64> {
    if processed == 0 || total == 0 {
        return None;
    }
    let remaining = total.saturating_sub(processed) as u128;
    Some((elapsed_ms as u128 * remaining / processed as u128) as u64)
}

// ==========================================
// ProgressState - 单个操作的进度
// ==========================================
#[derive(Debug)]
pub struct ProgressState {
    operation_id: i64,
    processed: AtomicU64,
    total: AtomicU64,
    started: Instant,
    last_persisted_percent: AtomicU8,
    last_persisted_ms: AtomicU64,
    persist_interval: Duration,
}

impl ProgressState {
    fn new(operation_id: i64, total_hint: u64, persist_interval: Duration) -> Self {
        Self {
            operation_id,
            processed: AtomicU64::new(0),
            total: AtomicU64::new(total_hint),
            started: Instant::now(),
            last_persisted_percent: AtomicU8::new(NEVER_PERSISTED),
            last_persisted_ms: AtomicU64::new(0),
            persist_interval,
        }
    }

    /// 方言识别后写入预估总数
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Release);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let processed = self.processed();
        let total = self.total();
        let elapsed_ms = self.elapsed_ms();
        ProgressSnapshot {
            operation_id: self.operation_id,
            processed,
            total,
            percent: compute_percent(processed, total),
            elapsed_ms,
            eta_ms: estimate_remaining_ms(elapsed_ms, processed, total),
        }
    }

    /// 判断本次是否需要持久化, 需要时同时记下本次写入
    fn claim_persist(&self, percent: u8, now_ms: u64, force: bool) -> bool {
        let last_percent = self.last_persisted_percent.load(Ordering::Acquire);
        let last_ms = self.last_persisted_ms.load(Ordering::Acquire);
        let due = force
            || last_percent == NEVER_PERSISTED
            || last_percent != percent
            || now_ms.saturating_sub(last_ms) >= self.persist_interval.as_millis() as u64;
        if due {
            self.last_persisted_percent.store(percent, Ordering::Release);
            self.last_persisted_ms.store(now_ms, Ordering::Release);
        }
        due
    }
}

// ==========================================
// ProgressTracker - 按操作 id 索引的进度表
// ==========================================
pub struct ProgressTracker {
    entries: RwLock<HashMap<i64, Arc<ProgressState>>>,
    status_store: Arc<dyn StatusStore>,
}

impl ProgressTracker {
    pub fn new(status_store: Arc<dyn StatusStore>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            status_store,
        }
    }

    /// 登记新操作
    ///
    /// # 参数
    /// - total_hint: 预估总行数（未知时为 0）
    /// - persist_interval: 百分比未变化时两次持久化的最小间隔
    pub fn start(
        &self,
        operation_id: i64,
        total_hint: u64,
        persist_interval: Duration,
    ) -> Arc<ProgressState> {
        let state = Arc::new(ProgressState::new(operation_id, total_hint, persist_interval));
        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(operation_id, state.clone());
            }
            Err(e) => warn!(operation_id, error = %e, "进度表锁获取失败"),
        }
        state
    }

    /// 推进已处理行数并按节流规则持久化
    ///
    /// # 参数
    /// - rows: 本块处理的行数
    ///
    /// # 返回
    /// - 推进后的快照
    pub async fn advance(&self, state: &ProgressState, rows: u64) -> ProgressSnapshot {
        state.processed.fetch_add(rows, Ordering::AcqRel);
        let snapshot = state.snapshot();

        if state.claim_persist(snapshot.percent, snapshot.elapsed_ms, false) {
            self.persist(&snapshot).await;
        }
        snapshot
    }

    /// 进入 FINALIZING: 以实际处理行数作为总数并立即持久化
    pub async fn finalize(&self, state: &ProgressState) -> ProgressSnapshot {
        state.total.store(state.processed(), Ordering::Release);
        let snapshot = state.snapshot();
        state.claim_persist(snapshot.percent, snapshot.elapsed_ms, true);
        self.persist(&snapshot).await;
        snapshot
    }

    async fn persist(&self, snapshot: &ProgressSnapshot) {
        debug!(
            operation_id = snapshot.operation_id,
            processed = snapshot.processed,
            total = snapshot.total,
            percent = snapshot.percent,
            "持久化进度"
        );
        if let Err(e) = self
            .status_store
            .update_progress(
                snapshot.operation_id,
                snapshot.processed,
                snapshot.total,
                snapshot.percent,
            )
            .await
        {
            warn!(operation_id = snapshot.operation_id, error = %e, "进度持久化失败");
        }
    }

    /// 查询进度快照
    ///
    /// # 返回
    /// - None: 操作不存在或已结束
    pub fn snapshot(&self, operation_id: i64) -> Option<ProgressSnapshot> {
        let entries = self.entries.read().ok()?;
        entries.get(&operation_id).map(|s| s.snapshot())
    }

    /// 操作结束后移除
    pub fn remove(&self, operation_id: i64) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&operation_id);
        }
    }

    pub fn active_operations(&self) -> Vec<i64> {
        self.entries
            .read()
            .map(|entries| entries.keys().copied().collect())
            .unwrap_or_default()
    }
}
