// ==========================================
// IGNORE - 不做存在性检查, 每行都是新记录
// ==========================================

use super::{
    resolve_dependents, save_linked_dependents, save_primaries, DuplicateStrategy,
    StrategyContext,
};
use crate::domain::entity::ImportableEntity;
use crate::domain::operation::BatchSaveResult;
use crate::domain::types::{DuplicateStrategyKind, EntityType};
use crate::importer::error::ImportResult;
use crate::importer::relationship_holder::RelationshipHolder;
use async_trait::async_trait;
use std::collections::HashMap;

pub struct IgnoreStrategy;

#[async_trait]
impl DuplicateStrategy for IgnoreStrategy {
    fn kind(&self) -> DuplicateStrategyKind {
        DuplicateStrategyKind::Ignore
    }

    async fn process(
        &self,
        ctx: &StrategyContext,
        entities: Vec<(usize, ImportableEntity)>,
        entity_type: EntityType,
    ) -> ImportResult<BatchSaveResult> {
        let mut result = BatchSaveResult::new();

        let batch: Vec<ImportableEntity> = if entity_type.is_primary() {
            entities.into_iter().map(|(_, e)| e).collect()
        } else {
            resolve_dependents(ctx, entities, &mut result)
                .await?
                .into_iter()
                .map(|(_, _, e)| e)
                .collect()
        };
        if batch.is_empty() {
            return Ok(result);
        }

        let ids = ctx.repository.save_batch(batch, entity_type).await?;
        result.saved += ids.len();
        if !entity_type.is_primary() {
            result.dependents_saved += ids.len();
        }
        Ok(result)
    }

    async fn process_combined(
        &self,
        ctx: &StrategyContext,
        holder: &RelationshipHolder,
    ) -> ImportResult<BatchSaveResult> {
        let mut result = BatchSaveResult::new();
        let indices: Vec<usize> = (0..holder.len()).collect();

        let storage_ids =
            save_primaries(ctx, holder, &indices, &HashMap::new(), &mut result).await?;
        save_linked_dependents(ctx, holder, &indices, &storage_ids, &mut result).await;

        Ok(result)
    }
}
