// ==========================================
// 商品导入系统 - 操作状态存储实现
// ==========================================
// 职责: 实现 StatusStore（使用 rusqlite）
// 存储: import_operation 表
// 约束: 终态迁移使用条件 UPDATE（WHERE status 非终态）保证只写一次
// ==========================================

use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::operation::{
    truncate_error_message, ImportSummary, OperationDescriptor, OperationRecord,
};
use crate::domain::types::OperationStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::status_store::StatusStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

// ==========================================
// SqliteStatusStore
// ==========================================
pub struct SqliteStatusStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStatusStore {
    /// 创建新的 StatusStore 实例（确保表结构存在）
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取完整错误清单（仅 report 模式写入）
    pub fn get_error_report(&self, operation_id: i64) -> RepositoryResult<Option<Vec<String>>> {
        let conn = self.get_conn()?;
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT error_report_json FROM import_operation WHERE operation_id = ?1",
                params![operation_id],
                |row| row.get(0),
            )
            .optional()?;

        match raw.flatten() {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// 终态迁移
    ///
    /// # 返回
    /// - Err(NotFound): 操作不存在
    /// - Err(InvalidStateTransition): 操作已处于终态
    fn transition_to_terminal(
        &self,
        operation_id: i64,
        status: OperationStatus,
        error_message: Option<String>,
        summary: &ImportSummary,
    ) -> RepositoryResult<()> {
        let summary_json = serde_json::to_string(summary)?;
        let now = Utc::now();
        let percent: i64 = if status == OperationStatus::Completed { 100 } else { -1 };

        let conn = self.get_conn()?;
        let changed = conn.execute(
            r#"
            UPDATE import_operation SET
                status = ?2,
                error_message = ?3,
                summary_json = ?4,
                processed_records = ?5,
                total_records = ?6,
                progress_percent = CASE WHEN ?7 >= 0 THEN ?7 ELSE progress_percent END,
                completed_at = ?8,
                updated_at = ?8
            WHERE operation_id = ?1 AND status IN ('PENDING', 'PROCESSING')
            "#,
            params![
                operation_id,
                status.to_string(),
                error_message,
                summary_json,
                summary.processed_records as i64,
                summary.total_records as i64,
                percent,
                now,
            ],
        )?;

        if changed == 0 {
            let current: Option<String> = conn
                .query_row(
                    "SELECT status FROM import_operation WHERE operation_id = ?1",
                    params![operation_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match current {
                None => RepositoryError::NotFound {
                    entity: "import_operation".to_string(),
                    id: operation_id.to_string(),
                },
                Some(from) => RepositoryError::InvalidStateTransition {
                    from,
                    to: status.to_string(),
                },
            });
        }

        debug!(operation_id, status = %status, "操作已进入终态");
        Ok(())
    }
}

#[async_trait]
impl StatusStore for SqliteStatusStore {
    async fn create_operation(&self, descriptor: OperationDescriptor) -> RepositoryResult<i64> {
        let now = Utc::now();
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO import_operation (
                client_id, file_name, file_size, target, strategy, status,
                total_records, processed_records, progress_percent, started_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, ?8, ?8)
            "#,
            params![
                descriptor.client_id,
                descriptor.file_name,
                descriptor.file_size as i64,
                descriptor.target.to_string(),
                descriptor.strategy.to_string(),
                OperationStatus::Pending.to_string(),
                descriptor.total_hint as i64,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn update_progress(
        &self,
        operation_id: i64,
        processed: u64,
        total: u64,
        percent: u8,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            r#"
            UPDATE import_operation SET
                status = 'PROCESSING',
                processed_records = ?2,
                total_records = ?3,
                progress_percent = ?4,
                updated_at = ?5
            WHERE operation_id = ?1 AND status IN ('PENDING', 'PROCESSING')
            "#,
            params![operation_id, processed as i64, total as i64, percent, Utc::now()],
        )?;

        if changed == 0 {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM import_operation WHERE operation_id = ?1",
                    params![operation_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(RepositoryError::NotFound {
                    entity: "import_operation".to_string(),
                    id: operation_id.to_string(),
                });
            }
            // 已进入终态, 迟到的进度写入直接丢弃
            debug!(operation_id, processed, "忽略终态后的进度写入");
        }
        Ok(())
    }

    async fn mark_completed(
        &self,
        operation_id: i64,
        summary: &ImportSummary,
    ) -> RepositoryResult<()> {
        self.transition_to_terminal(operation_id, OperationStatus::Completed, None, summary)
    }

    async fn mark_failed(
        &self,
        operation_id: i64,
        message: &str,
        summary: &ImportSummary,
    ) -> RepositoryResult<()> {
        self.transition_to_terminal(
            operation_id,
            OperationStatus::Failed,
            Some(truncate_error_message(message)),
            summary,
        )
    }

    async fn mark_cancelled(
        &self,
        operation_id: i64,
        reason: Option<&str>,
        summary: &ImportSummary,
    ) -> RepositoryResult<()> {
        self.transition_to_terminal(
            operation_id,
            OperationStatus::Cancelled,
            reason.map(truncate_error_message),
            summary,
        )
    }

    async fn save_error_report(
        &self,
        operation_id: i64,
        errors: &[String],
    ) -> RepositoryResult<()> {
        let json = serde_json::to_string(errors)?;
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE import_operation SET error_report_json = ?2, updated_at = ?3 WHERE operation_id = ?1",
            params![operation_id, json, Utc::now()],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound {
                entity: "import_operation".to_string(),
                id: operation_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_operation(&self, operation_id: i64) -> RepositoryResult<Option<OperationRecord>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT operation_id, client_id, file_name, status, total_records,
                       processed_records, progress_percent, error_message, summary_json,
                       started_at, completed_at
                FROM import_operation
                WHERE operation_id = ?1
                "#,
                params![operation_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, DateTime<Utc>>(9)?,
                        row.get::<_, Option<DateTime<Utc>>>(10)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            operation_id,
            client_id,
            file_name,
            status,
            total,
            processed,
            percent,
            error_message,
            summary_json,
            started_at,
            completed_at,
        )) = row
        else {
            return Ok(None);
        };

        let status = status
            .parse::<OperationStatus>()
            .map_err(RepositoryError::ValidationError)?;
        let summary = match summary_json {
            Some(json) => Some(serde_json::from_str::<ImportSummary>(&json)?),
            None => None,
        };

        Ok(Some(OperationRecord {
            operation_id,
            client_id,
            file_name,
            status,
            total_records: total.max(0) as u64,
            processed_records: processed.max(0) as u64,
            progress_percent: percent.clamp(0, 100) as u8,
            error_message,
            summary,
            started_at,
            completed_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{DuplicateStrategyKind, ImportTarget};

    fn setup_store() -> SqliteStatusStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        SqliteStatusStore::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn descriptor() -> OperationDescriptor {
        OperationDescriptor {
            client_id: 1,
            file_name: "prices.csv".to_string(),
            file_size: 1024,
            target: ImportTarget::Composite,
            strategy: DuplicateStrategyKind::Ignore,
            total_hint: 40,
        }
    }

    #[tokio::test]
    async fn test_lifecycle_pending_processing_completed() {
        let store = setup_store();
        let op = store.create_operation(descriptor()).await.unwrap();

        let record = store.get_operation(op).await.unwrap().unwrap();
        assert_eq!(record.status, OperationStatus::Pending);
        assert_eq!(record.total_records, 40);

        store.update_progress(op, 20, 40, 50).await.unwrap();
        let record = store.get_operation(op).await.unwrap().unwrap();
        assert_eq!(record.status, OperationStatus::Processing);
        assert_eq!(record.progress_percent, 50);

        let mut summary =
            ImportSummary::new(op, ImportTarget::Composite, DuplicateStrategyKind::Ignore);
        summary.status = OperationStatus::Completed;
        summary.processed_records = 38;
        summary.total_records = 38;
        summary.success_records = 38;
        store.mark_completed(op, &summary).await.unwrap();

        let record = store.get_operation(op).await.unwrap().unwrap();
        assert_eq!(record.status, OperationStatus::Completed);
        assert_eq!(record.progress_percent, 100);
        assert_eq!(record.processed_records, 38);
        assert_eq!(record.summary.unwrap().success_records, 38);
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_state_written_once() {
        let store = setup_store();
        let op = store.create_operation(descriptor()).await.unwrap();
        let summary = ImportSummary::new(op, ImportTarget::Product, DuplicateStrategyKind::Skip);

        store.mark_cancelled(op, Some("用户取消"), &summary).await.unwrap();
        let err = store.mark_completed(op, &summary).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidStateTransition { .. }));

        // 终态后的进度写入被忽略
        store.update_progress(op, 10, 40, 25).await.unwrap();
        let record = store.get_operation(op).await.unwrap().unwrap();
        assert_eq!(record.status, OperationStatus::Cancelled);
        assert_eq!(record.error_message.as_deref(), Some("用户取消"));
    }

    #[tokio::test]
    async fn test_failed_message_is_truncated() {
        let store = setup_store();
        let op = store.create_operation(descriptor()).await.unwrap();
        let summary = ImportSummary::new(op, ImportTarget::Product, DuplicateStrategyKind::Skip);

        store
            .mark_failed(op, &"x".repeat(1500), &summary)
            .await
            .unwrap();
        let record = store.get_operation(op).await.unwrap().unwrap();
        let message = record.error_message.unwrap();
        assert_eq!(message.chars().count(), 1000);
        assert!(message.ends_with("..."));
    }

    #[tokio::test]
    async fn test_error_report_and_unknown_operation() {
        let store = setup_store();
        let op = store.create_operation(descriptor()).await.unwrap();
        let errors = vec!["行 2: 无法转换".to_string(), "行 5: 未指定区域".to_string()];
        store.save_error_report(op, &errors).await.unwrap();
        assert_eq!(store.get_error_report(op).unwrap(), Some(errors));

        assert!(store.get_operation(999).await.unwrap().is_none());
        assert!(store.update_progress(999, 1, 1, 100).await.is_err());
    }
}
