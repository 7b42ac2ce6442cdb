// ==========================================
// 指定块写入失败的仓储包装 - 用于落库错误测试
// ==========================================
// 第 fail_at 次 save_batch 返回错误; 启用闸门时先通知测试方并等待放行
// ==========================================

use async_trait::async_trait;
use product_import::domain::{EntityType, ImportableEntity};
use product_import::repository::{ImportRepository, RepositoryError, RepositoryResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub struct FailingRepo {
    inner: Arc<dyn ImportRepository>,
    fail_at: usize,
    gated: bool,
    calls: AtomicUsize,
    pub reached: Notify,
    pub release: Notify,
}

impl FailingRepo {
    pub fn new(inner: Arc<dyn ImportRepository>, fail_at: usize) -> Self {
        Self {
            inner,
            fail_at,
            gated: false,
            calls: AtomicUsize::new(0),
            reached: Notify::new(),
            release: Notify::new(),
        }
    }

    /// 失败前暂停, 等待测试方放行
    pub fn gated(inner: Arc<dyn ImportRepository>, fail_at: usize) -> Self {
        Self {
            gated: true,
            ..Self::new(inner, fail_at)
        }
    }
}

#[async_trait]
impl ImportRepository for FailingRepo {
    async fn save_batch(
        &self,
        entities: Vec<ImportableEntity>,
        entity_type: EntityType,
    ) -> RepositoryResult<Vec<i64>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_at {
            if self.gated {
                self.reached.notify_one();
                self.release.notified().await;
            }
            return Err(RepositoryError::DatabaseError("disk I/O error".to_string()));
        }
        self.inner.save_batch(entities, entity_type).await
    }

    async fn find_existing_external_ids(
        &self,
        client_id: i64,
        external_ids: &[String],
    ) -> RepositoryResult<HashMap<String, i64>> {
        self.inner
            .find_existing_external_ids(client_id, external_ids)
            .await
    }

    async fn find_existing_dependent_keys(
        &self,
        entity_type: EntityType,
        primary_ids: &[i64],
    ) -> RepositoryResult<HashSet<(i64, String)>> {
        self.inner
            .find_existing_dependent_keys(entity_type, primary_ids)
            .await
    }

    async fn delete_by_primary_storage_ids(
        &self,
        entity_type: EntityType,
        primary_ids: &[i64],
    ) -> RepositoryResult<usize> {
        self.inner
            .delete_by_primary_storage_ids(entity_type, primary_ids)
            .await
    }

    async fn delete_by_originating_file_id(&self, file_id: i64) -> RepositoryResult<usize> {
        self.inner.delete_by_originating_file_id(file_id).await
    }
}
