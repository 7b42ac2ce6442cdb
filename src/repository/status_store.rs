// ==========================================
// 商品导入系统 - 操作状态存储 Trait
// ==========================================
// 职责: 导入操作的创建、进度写入、终态标记与查询
// 约束: 终态（COMPLETED / FAILED / CANCELLED）只能写入一次
// ==========================================

use crate::domain::operation::{ImportSummary, OperationDescriptor, OperationRecord};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// StatusStore Trait
// ==========================================
// 实现者: SqliteStatusStore（import_operation 表）
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// 创建操作记录（状态 PENDING）
    ///
    /// # 返回
    /// - 操作 id（同时作为落库实体的 file_id）
    async fn create_operation(&self, descriptor: OperationDescriptor) -> RepositoryResult<i64>;

    /// 写入进度; 首次写入时状态迁移为 PROCESSING
    async fn update_progress(
        &self,
        operation_id: i64,
        processed: u64,
        total: u64,
        percent: u8,
    ) -> RepositoryResult<()>;

    async fn mark_completed(
        &self,
        operation_id: i64,
        summary: &ImportSummary,
    ) -> RepositoryResult<()>;

    /// 标记失败（失败信息超过 1000 字符时截断）
    async fn mark_failed(
        &self,
        operation_id: i64,
        message: &str,
        summary: &ImportSummary,
    ) -> RepositoryResult<()>;

    async fn mark_cancelled(
        &self,
        operation_id: i64,
        reason: Option<&str>,
        summary: &ImportSummary,
    ) -> RepositoryResult<()>;

    /// 保存完整错误清单（errorHandling = report）
    async fn save_error_report(&self, operation_id: i64, errors: &[String])
        -> RepositoryResult<()>;

    /// 查询操作记录
    ///
    /// # 返回
    /// - None: 操作不存在
    async fn get_operation(&self, operation_id: i64) -> RepositoryResult<Option<OperationRecord>>;
}
