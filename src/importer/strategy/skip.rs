// ==========================================
// SKIP - 外部编号（或从属语义键）已存在的行整行跳过
// ==========================================

use super::{
    resolve_dependents, save_linked_dependents, save_primaries, semantic_key, DuplicateStrategy,
    StrategyContext,
};
use crate::domain::entity::ImportableEntity;
use crate::domain::operation::BatchSaveResult;
use crate::domain::types::{DuplicateStrategyKind, EntityType};
use crate::importer::error::ImportResult;
use crate::importer::relationship_holder::RelationshipHolder;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

pub struct SkipStrategy;

impl SkipStrategy {
    async fn process_products(
        &self,
        ctx: &StrategyContext,
        entities: Vec<(usize, ImportableEntity)>,
    ) -> ImportResult<BatchSaveResult> {
        let mut result = BatchSaveResult::new();
        let external_ids: Vec<String> = entities
            .iter()
            .filter_map(|(_, e)| e.primary_external_id())
            .map(|s| s.trim().to_string())
            .collect();
        let existing = ctx
            .repository
            .find_existing_external_ids(ctx.client_id, &external_ids)
            .await?;

        let mut fresh = Vec::with_capacity(entities.len());
        for (line, entity) in entities {
            let external_id = entity.primary_external_id().map(str::trim).unwrap_or("");
            if existing.contains_key(external_id) {
                debug!(line, external_id, "商品已存在, 跳过");
                result.skipped += 1;
            } else {
                fresh.push(entity);
            }
        }

        if !fresh.is_empty() {
            let ids = ctx
                .repository
                .save_batch(fresh, EntityType::Product)
                .await?;
            result.saved += ids.len();
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

        let mut refs: Vec<i64> = resolved.iter().map(|(_, r, _)| *r).collect();
        refs.sort_unstable();
        refs.dedup();
        let mut known = ctx
            .repository
            .find_existing_dependent_keys(entity_type, &refs)
            .await?;

        let mut fresh = Vec::with_capacity(resolved.len());
        for (line, product_ref, entity) in resolved {
            // 本块内首次出现后同键的记录也视为已存在
            if known.insert((product_ref, semantic_key(&entity))) {
                fresh.push(entity);
            } else {
                debug!(line, product_ref, entity = %entity_type, "从属记录已存在, 跳过");
                result.skipped += 1;
            }
        }

        if !fresh.is_empty() {
            let ids = ctx.repository.save_batch(fresh, entity_type).await?;
            result.saved += ids.len();
            result.dependents_saved += ids.len();
        }
        Ok(result)
    }
}

#[async_trait]
impl DuplicateStrategy for SkipStrategy {
    fn kind(&self) -> DuplicateStrategyKind {
        DuplicateStrategyKind::Skip
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

        let mut fresh = Vec::with_capacity(holder.len());
        for (idx, row) in holder.rows().iter().enumerate() {
            if existing.contains_key(&row.external_id) {
                debug!(line = row.line, external_id = %row.external_id, "商品已存在, 整行跳过");
                result.skipped += 1;
            } else {
                fresh.push(idx);
            }
        }

        let storage_ids =
            save_primaries(ctx, holder, &fresh, &HashMap::new(), &mut result).await?;
        save_linked_dependents(ctx, holder, &fresh, &storage_ids, &mut result).await;

        Ok(result)
    }
}
