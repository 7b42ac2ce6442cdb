// ==========================================
// OVERRIDE - 已存在的记录覆盖, 从属记录以本文件为准重建
// ==========================================
// 规则:
// - 同一外部编号在块内多次出现时最后一次生效, 之前的出现计为 skipped
// - 更新的商品: 先删除其全部旧从属记录, 再写入最后一次出现的从属记录
// - 删除失败只记录并告警, 不中断主实体更新
// 注意: 文件中未出现的旧从属记录同样被删除（文件视为权威数据）
// ==========================================

use super::{
    resolve_dependents, save_linked_dependents, save_primaries, semantic_key,
    DuplicateStrategy, StrategyContext,
};
use crate::domain::entity::ImportableEntity;
use crate::domain::operation::BatchSaveResult;
use crate::domain::types::{DuplicateStrategyKind, EntityType};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::relationship_holder::RelationshipHolder;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::{debug, warn};

/// 从属记录键: (商品存储 id, 语义键)
type DependentKey = (i64, String);

pub struct OverrideStrategy {
    /// 本操作内已清空过旧从属记录的商品（单从属实体导入）
    cleared: Mutex<HashSet<(EntityType, i64)>>,
    /// 本操作内已写入的从属记录 → 存储 id, 后续块再次出现时改为更新
    written: Mutex<HashMap<(EntityType, DependentKey), i64>>,
}

impl OverrideStrategy {
    pub fn new() -> Self {
        Self {
            cleared: Mutex::new(HashSet::new()),
            written: Mutex::new(HashMap::new()),
        }
    }

    fn lock_error(e: impl std::fmt::Display) -> ImportError {
        ImportError::InternalError(format!("策略状态锁获取失败: {}", e))
    }

    /// 删除指定商品某一类型的旧从属记录; 失败只记录
    async fn delete_dependents(
        &self,
        ctx: &StrategyContext,
        entity_type: EntityType,
        primary_ids: &[i64],
        result: &mut BatchSaveResult,
    ) {
        if primary_ids.is_empty() {
            return;
        }
        match ctx
            .repository
            .delete_by_primary_storage_ids(entity_type, primary_ids)
            .await
        {
            Ok(deleted) => {
                debug!(entity = %entity_type, primaries = primary_ids.len(), deleted, "旧从属记录已删除");
                result.dependents_deleted += deleted;
            }
            Err(e) => {
                warn!(entity = %entity_type, error = %e, "旧从属记录删除失败");
                result
                    .errors
                    .push(format!("{} 旧记录删除失败: {}", entity_type, e));
            }
        }
    }

    async fn process_products(
        &self,
        ctx: &StrategyContext,
        entities: Vec<(usize, ImportableEntity)>,
    ) -> ImportResult<BatchSaveResult> {
        let mut result = BatchSaveResult::new();

        let mut last: HashMap<String, usize> = HashMap::new();
        for (idx, (_, entity)) in entities.iter().enumerate() {
            let external_id = entity.primary_external_id().map(str::trim).unwrap_or("");
            last.insert(external_id.to_string(), idx);
        }
        let external_ids: Vec<String> = last.keys().cloned().collect();
        let existing = ctx
            .repository
            .find_existing_external_ids(ctx.client_id, &external_ids)
            .await?;

        let mut batch = Vec::with_capacity(last.len());
        let mut updates = 0usize;
        for (idx, (line, mut entity)) in entities.into_iter().enumerate() {
            let external_id = entity
                .primary_external_id()
                .map(str::trim)
                .unwrap_or("")
                .to_string();
            if last.get(&external_id) != Some(&idx) {
                debug!(line, external_id = %external_id, "被后续重复行取代");
                result.skipped += 1;
                continue;
            }
            let storage_id = existing.get(&external_id).copied();
            if storage_id.is_some() {
                updates += 1;
            }
            entity.set_storage_id(storage_id);
            batch.push(entity);
        }

        if !batch.is_empty() {
            let count = batch.len();
            ctx.repository
                .save_batch(batch, EntityType::Product)
                .await?;
            result.updated += updates;
            result.saved += count - updates;
        }
        Ok(result)
    }

    async fn process_dependents(
        &self,
        ctx: &StrategyContext,
        entities: Vec<(usize, ImportableEntity)>,
        entity_type: EntityType,
    ) -> ImportResult<BatchSaveResult> {
        let mut result = BatchSaveResult::new();
        let resolved = resolve_dependents(ctx, entities, &mut result).await?;
        if resolved.is_empty() {
            return Ok(result);
        }

        // 每个商品在本操作内只清空一次旧记录
        let to_clear: Vec<i64> = {
            let mut cleared = self.cleared.lock().map_err(Self::lock_error)?;
            let mut ids: Vec<i64> = resolved
                .iter()
                .map(|(_, r, _)| *r)
                .filter(|r| cleared.insert((entity_type, *r)))
                .collect();
            ids.sort_unstable();
            ids
        };
        self.delete_dependents(ctx, entity_type, &to_clear, &mut result)
            .await;

        // 块内同键记录最后一次生效
        let mut last: HashMap<DependentKey, usize> = HashMap::new();
        for (idx, (_, product_ref, entity)) in resolved.iter().enumerate() {
            last.insert((*product_ref, semantic_key(entity)), idx);
        }

        let mut keys = Vec::with_capacity(last.len());
        let mut batch = Vec::with_capacity(last.len());
        let mut updates = 0usize;
        {
            let written = self.written.lock().map_err(Self::lock_error)?;
            for (idx, (line, product_ref, mut entity)) in resolved.into_iter().enumerate() {
                let key = (product_ref, semantic_key(&entity));
                if last.get(&key) != Some(&idx) {
                    debug!(line, product_ref, entity = %entity_type, "被后续重复行取代");
                    result.skipped += 1;
                    continue;
                }
                let storage_id = written.get(&(entity_type, key.clone())).copied();
                if storage_id.is_some() {
                    updates += 1;
                }
                entity.set_storage_id(storage_id);
                keys.push(key);
                batch.push(entity);
            }
        }

        if batch.is_empty() {
            return Ok(result);
        }
        let count = batch.len();
        let ids = ctx.repository.save_batch(batch, entity_type).await?;
        result.updated += updates;
        result.saved += count - updates;
        result.dependents_saved += count;

        let mut written = self.written.lock().map_err(Self::lock_error)?;
        for (key, id) in keys.into_iter().zip(ids) {
            written.insert((entity_type, key), id);
        }
        Ok(result)
    }
}

impl Default for OverrideStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DuplicateStrategy for OverrideStrategy {
    fn kind(&self) -> DuplicateStrategyKind {
        DuplicateStrategyKind::Override
    }

    async fn process(
        &self,
        ctx: &StrategyContext,
        entities: Vec<(usize, ImportableEntity)>,
        entity_type: EntityType,
    ) -> ImportResult<BatchSaveResult> {
        if entity_type.is_primary() {
            self.process_products(ctx, entities).await
        } else {
            self.process_dependents(ctx, entities, entity_type).await
        }
    }

    async fn process_combined(
        &self,
        ctx: &StrategyContext,
        holder: &RelationshipHolder,
    ) -> ImportResult<BatchSaveResult> {
        let mut result = BatchSaveResult::new();
        let existing = ctx
            .repository
            .find_existing_external_ids(ctx.client_id, &holder.external_ids())
            .await?;

        let mut latest = Vec::with_capacity(holder.len());
        for (idx, row) in holder.rows().iter().enumerate() {
            if holder.is_last_occurrence(idx) {
                latest.push(idx);
            } else {
                debug!(line = row.line, external_id = %row.external_id, "被后续重复行取代");
                result.skipped += 1;
            }
        }

        let storage_ids = save_primaries(ctx, holder, &latest, &existing, &mut result).await?;

        // 只清理被更新商品的旧从属记录; 新商品尚无从属记录
        let mut updated: Vec<i64> = latest
            .iter()
            .filter_map(|idx| holder.rows().get(*idx))
            .filter_map(|row| existing.get(&row.external_id).copied())
            .collect();
        updated.sort_unstable();
        updated.dedup();
        for entity_type in [EntityType::Region, EntityType::Competitor] {
            self.delete_dependents(ctx, entity_type, &updated, &mut result)
                .await;
        }

        save_linked_dependents(ctx, holder, &latest, &storage_ids, &mut result).await;
        Ok(result)
    }
}
