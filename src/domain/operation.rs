// ==========================================
// 商品导入系统 - 导入操作领域模型
// ==========================================
// 职责: 批次落库结果、导入汇总、操作状态记录、有界错误清单
// ==========================================

use crate::domain::types::{DuplicateStrategyKind, ImportTarget, OperationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 错误清单默认上限
pub const DEFAULT_MAX_REPORTED_ERRORS: usize = 100;

// ==========================================
// BatchSaveResult - 单批次落库结果
// ==========================================
// 计数单位为源数据行（复合/商品导入按主实体计）; 跨批次可累加
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSaveResult {
    pub saved: usize,              // 新增
    pub updated: usize,            // 覆盖更新
    pub skipped: usize,            // 跳过（已存在 / 被后续重复行取代）
    pub failed: usize,             // 失败
    pub dependents_saved: usize,   // 写入的从属记录数
    pub dependents_deleted: usize, // OVERRIDE 删除的旧从属记录数
    pub errors: Vec<String>,
}

impl BatchSaveResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// 成功数 = 新增 + 更新
    pub fn success(&self) -> usize {
        self.saved + self.updated
    }

    /// 已计数的行数
    pub fn accounted(&self) -> usize {
        self.saved + self.updated + self.skipped + self.failed
    }

    pub fn record_failure(&mut self, count: usize, message: impl Into<String>) {
        self.failed += count;
        self.errors.push(message.into());
    }

    /// 累加另一批次结果
    pub fn merge(&mut self, other: BatchSaveResult) {
        self.saved += other.saved;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.dependents_saved += other.dependents_saved;
        self.dependents_deleted += other.dependents_deleted;
        self.errors.extend(other.errors);
    }
}

// ==========================================
// ErrorLog - 有界错误清单
// ==========================================
// 超过上限后只计数, 汇总时追加 "...and N more"
#[derive(Debug, Clone)]
pub struct ErrorLog {
    limit: usize,
    entries: Vec<String>,
    overflow: usize,
    // report 模式下保留完整清单
    full: Option<Vec<String>>,
}

impl ErrorLog {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: Vec::new(),
            overflow: 0,
            full: None,
        }
    }

    pub fn with_full_report(limit: usize) -> Self {
        Self {
            full: Some(Vec::new()),
            ..Self::new(limit)
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        if let Some(full) = self.full.as_mut() {
            full.push(message.clone());
        }
        if self.entries.len() < self.limit {
            self.entries.push(message);
        } else {
            self.overflow += 1;
        }
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, messages: I) {
        for m in messages {
            self.push(m);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.overflow
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn truncated(&self) -> usize {
        self.overflow
    }

    /// 有界清单; 溢出时末尾追加标记
    pub fn reported(&self) -> Vec<String> {
        let mut out = self.entries.clone();
        if self.overflow > 0 {
            out.push(format!("...and {} more", self.overflow));
        }
        out
    }

    pub fn full_report(&self) -> Option<&[String]> {
        self.full.as_deref()
    }
}

// ==========================================
// ImportSummary - 导入结果汇总（审计产物）
// ==========================================
// 恒等式: processed_records = success_records + failed_records + skipped_records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub operation_id: i64,
    pub status: OperationStatus,
    pub target: ImportTarget,
    pub strategy: DuplicateStrategyKind,
    pub file_name: Option<String>,
    pub file_hash: Option<String>, // SHA-256 十六进制
    pub total_records: u64,
    pub processed_records: u64,
    pub success_records: u64,
    pub failed_records: u64,
    pub skipped_records: u64,
    pub saved_records: u64,
    pub updated_records: u64,
    pub dependents_saved: u64,
    pub dependents_deleted: u64,
    pub errors: Vec<String>,
    pub truncated_error_count: usize,
    pub warnings: Vec<String>,
    pub message: Option<String>, // 失败原因 / 取消原因
    pub elapsed_ms: u64,
}

impl ImportSummary {
    pub fn new(operation_id: i64, target: ImportTarget, strategy: DuplicateStrategyKind) -> Self {
        Self {
            operation_id,
            status: OperationStatus::Processing,
            target,
            strategy,
            file_name: None,
            file_hash: None,
            total_records: 0,
            processed_records: 0,
            success_records: 0,
            failed_records: 0,
            skipped_records: 0,
            saved_records: 0,
            updated_records: 0,
            dependents_saved: 0,
            dependents_deleted: 0,
            errors: Vec::new(),
            truncated_error_count: 0,
            warnings: Vec::new(),
            message: None,
            elapsed_ms: 0,
        }
    }

    /// 从累计结果填充计数
    pub fn apply_totals(&mut self, totals: &BatchSaveResult) {
        self.saved_records = totals.saved as u64;
        self.updated_records = totals.updated as u64;
        self.success_records = totals.success() as u64;
        self.failed_records = totals.failed as u64;
        self.skipped_records = totals.skipped as u64;
        self.processed_records = totals.accounted() as u64;
        self.dependents_saved = totals.dependents_saved as u64;
        self.dependents_deleted = totals.dependents_deleted as u64;
    }

    pub fn apply_errors(&mut self, log: &ErrorLog) {
        self.errors = log.reported();
        self.truncated_error_count = log.truncated();
    }

    pub fn is_consistent(&self) -> bool {
        self.processed_records == self.success_records + self.failed_records + self.skipped_records
    }
}

// ==========================================
// OperationDescriptor - 创建操作时的元数据
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub client_id: i64,
    pub file_name: String,
    pub file_size: u64,
    pub target: ImportTarget,
    pub strategy: DuplicateStrategyKind,
    pub total_hint: u64,
}

// ==========================================
// OperationRecord - 状态存储中的操作记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_id: i64,
    pub client_id: i64,
    pub file_name: String,
    pub status: OperationStatus,
    pub total_records: u64,
    pub processed_records: u64,
    pub progress_percent: u8,
    pub error_message: Option<String>,
    pub summary: Option<ImportSummary>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 失败信息上限（字符）
pub const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

/// 超长失败信息截断为 997 字符 + "..."
pub fn truncate_error_message(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        return message.to_string();
    }
    let head: String = message.chars().take(MAX_ERROR_MESSAGE_CHARS - 3).collect();
    format!("{}...", head)
}
