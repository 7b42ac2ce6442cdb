// ==========================================
// 带闸门的仓储包装 - 用于取消测试
// ==========================================
// 第 gate_at 次 save_batch 完成后通知测试方, 并等待放行
// ==========================================

use async_trait::async_trait;
use product_import::domain::{EntityType, ImportableEntity};
use product_import::repository::{ImportRepository, RepositoryResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub struct GatedRepo {
    inner: Arc<dyn ImportRepository>,
    gate_at: usize,
    calls: AtomicUsize,
    pub reached: Notify,
    pub release: Notify,
}

impl GatedRepo {
    pub fn new(inner: Arc<dyn ImportRepository>, gate_at: usize) -> Self {
        Self {
            inner,
            gate_at,
            calls: AtomicUsize::new(0),
            reached: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl ImportRepository for GatedRepo {
    async fn save_batch(
        &self,
        entities: Vec<ImportableEntity>,
        entity_type: EntityType,
    ) -> RepositoryResult<Vec<i64>> {
        let ids = self.inner.save_batch(entities, entity_type).await?;
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.gate_at {
            self.reached.notify_one();
            self.release.notified().await;
        }
        Ok(ids)
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
