// ==========================================
// 商品导入系统 - 重复处理策略
// ==========================================
// 职责: 一个块的实体如何与已存储记录对账（IGNORE / SKIP / OVERRIDE）
// 红线: 主实体未获得存储 id 的从属实体永不落库
// 生命周期: 每个导入操作一个策略实例（OVERRIDE 的跨块状态保存在实例内）
// ==========================================

mod ignore;
mod override_;
mod skip;

pub use ignore::IgnoreStrategy;
pub use override_::OverrideStrategy;
pub use skip::SkipStrategy;

use crate::domain::entity::ImportableEntity;
use crate::domain::operation::BatchSaveResult;
use crate::domain::types::{DuplicateStrategyKind, EntityType, ImportTarget};
use crate::importer::error::ImportResult;
use crate::importer::relationship_holder::{set_product_ref, RelationshipHolder};
use crate::repository::import_repo::ImportRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

// ==========================================
// StrategyContext - 策略运行上下文
// ==========================================
#[derive(Clone)]
pub struct StrategyContext {
    pub repository: Arc<dyn ImportRepository>,
    pub client_id: i64,
    /// 当前导入操作 id（写入实体的 file_id）
    pub file_id: i64,
    pub target: ImportTarget,
}

// ==========================================
// DuplicateStrategy Trait
// ==========================================
// 实现者: IgnoreStrategy, SkipStrategy, OverrideStrategy
#[async_trait]
pub trait DuplicateStrategy: Send + Sync {
    fn kind(&self) -> DuplicateStrategyKind;

    /// 单实体导入（商品 / 区域价格 / 竞品价格）
    ///
    /// # 参数
    /// - entities: (行号, 实体); 从属实体尚未解析 product_ref
    /// - entity_type: 本次导入的实体类型
    ///
    /// # 返回
    /// - Ok: 本块计数（每个实体计一行）
    /// - Err: 落库失败, 调用方将整块计为失败
    async fn process(
        &self,
        ctx: &StrategyContext,
        entities: Vec<(usize, ImportableEntity)>,
        entity_type: EntityType,
    ) -> ImportResult<BatchSaveResult>;

    /// 复合导入: 先写主实体, 再按存储 id 关联并写入从属实体
    ///
    /// # 返回
    /// - Ok: 本块计数（每个主实体计一行）
    /// - Err: 主实体落库失败; 从属实体失败只记录在 errors 中
    async fn process_combined(
        &self,
        ctx: &StrategyContext,
        holder: &RelationshipHolder,
    ) -> ImportResult<BatchSaveResult>;

    /// 取消时回滚: 删除本操作写入的全部记录
    async fn rollback(&self, ctx: &StrategyContext) -> ImportResult<usize> {
        let deleted = ctx
            .repository
            .delete_by_originating_file_id(ctx.file_id)
            .await?;
        info!(file_id = ctx.file_id, deleted, strategy = %self.kind(), "导入已回滚");
        Ok(deleted)
    }
}

/// 按策略类型创建实例（每个导入操作一个）
pub fn create_strategy(kind: DuplicateStrategyKind) -> Box<dyn DuplicateStrategy> {
    match kind {
        DuplicateStrategyKind::Ignore => Box::new(IgnoreStrategy),
        DuplicateStrategyKind::Skip => Box::new(SkipStrategy),
        DuplicateStrategyKind::Override => Box::new(OverrideStrategy::new()),
    }
}

// ==========================================
// 共享步骤
// ==========================================

/// 写入指定行的主实体
///
/// # 参数
/// - indices: 参与写入的行序号
/// - existing: 外部编号 → 已存储 id; 命中者更新, 否则新增
///
/// # 返回
/// - 外部编号 → 存储 id（同一编号多次出现时取最后一次）
pub(crate) async fn save_primaries(
    ctx: &StrategyContext,
    holder: &RelationshipHolder,
    indices: &[usize],
    existing: &HashMap<String, i64>,
    result: &mut BatchSaveResult,
) -> ImportResult<HashMap<String, i64>> {
    let mut external_ids = Vec::with_capacity(indices.len());
    let mut primaries = Vec::with_capacity(indices.len());
    let mut updates = 0usize;

    for &idx in indices {
        let Some(row) = holder.rows().get(idx) else {
            continue;
        };
        let Some(primary) = row.primary.as_ref() else {
            continue;
        };
        let mut primary = primary.clone();
        let storage_id = existing.get(&row.external_id).copied();
        if storage_id.is_some() {
            updates += 1;
        }
        primary.set_storage_id(storage_id);
        external_ids.push(row.external_id.clone());
        primaries.push(primary);
    }

    if primaries.is_empty() {
        return Ok(HashMap::new());
    }

    let count = primaries.len();
    let ids = ctx
        .repository
        .save_batch(primaries, EntityType::Product)
        .await?;

    result.updated += updates;
    result.saved += count - updates;
    debug!(saved = count - updates, updated = updates, "主实体已写入");

    Ok(external_ids.into_iter().zip(ids).collect())
}

/// 关联并写入指定行的从属实体
///
/// 没有任何主实体获得存储 id 时不写入, 只记录错误
pub(crate) async fn save_linked_dependents(
    ctx: &StrategyContext,
    holder: &RelationshipHolder,
    indices: &[usize],
    storage_ids: &HashMap<String, i64>,
    result: &mut BatchSaveResult,
) {
    let pending: usize = indices
        .iter()
        .filter_map(|idx| holder.rows().get(*idx))
        .map(|row| row.dependents.len())
        .sum();
    if pending == 0 {
        return;
    }
    if storage_ids.is_empty() {
        result
            .errors
            .push(format!("没有主实体获得存储 id, {} 条从属记录未写入", pending));
        return;
    }

    let (linked, errors) = holder.link_dependents(indices, storage_ids);
    result.errors.extend(errors);
    save_dependents(ctx, linked, result).await;
}

/// 按类型分组写入已关联的从属实体; 失败记录错误, 不中断
pub(crate) async fn save_dependents(
    ctx: &StrategyContext,
    dependents: Vec<ImportableEntity>,
    result: &mut BatchSaveResult,
) {
    let mut by_type: HashMap<EntityType, Vec<ImportableEntity>> = HashMap::new();
    for dependent in dependents {
        by_type
            .entry(dependent.entity_type())
            .or_default()
            .push(dependent);
    }

    for entity_type in [EntityType::Region, EntityType::Competitor] {
        let Some(batch) = by_type.remove(&entity_type) else {
            continue;
        };
        let count = batch.len();
        match ctx.repository.save_batch(batch, entity_type).await {
            Ok(ids) => result.dependents_saved += ids.len(),
            Err(e) => {
                error!(entity = %entity_type, count, error = %e, "从属实体写入失败");
                result
                    .errors
                    .push(format!("{} 条 {} 记录写入失败: {}", count, entity_type, e));
            }
        }
    }
}

/// 单从属实体导入: 按商品外部编号解析 product_ref
///
/// # 返回
/// - (行号, 商品存储 id, 已关联实体); 商品不存在的实体计为失败
pub(crate) async fn resolve_dependents(
    ctx: &StrategyContext,
    entities: Vec<(usize, ImportableEntity)>,
    result: &mut BatchSaveResult,
) -> ImportResult<Vec<(usize, i64, ImportableEntity)>> {
    let mut external_ids: Vec<String> = entities
        .iter()
        .filter_map(|(_, e)| e.primary_external_id())
        .map(|s| s.trim().to_string())
        .collect();
    external_ids.sort();
    external_ids.dedup();

    let known = ctx
        .repository
        .find_existing_external_ids(ctx.client_id, &external_ids)
        .await?;

    let mut resolved = Vec::with_capacity(entities.len());
    for (line, mut entity) in entities {
        let external_id = entity
            .primary_external_id()
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        match known.get(&external_id) {
            Some(&product_ref) => {
                set_product_ref(&mut entity, product_ref);
                resolved.push((line, product_ref, entity));
            }
            None => result.record_failure(
                1,
                format!("行 {}: 商品 {} 不存在", line, external_id),
            ),
        }
    }
    Ok(resolved)
}

/// 从属实体语义键（区域名 / 竞品站点名）
pub(crate) fn semantic_key(entity: &ImportableEntity) -> String {
    entity.discriminator().map(str::trim).unwrap_or("").to_string()
}
