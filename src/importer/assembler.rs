// ==========================================
// 商品导入系统 - 复合行组装
// ==========================================
// 职责: 一行原始数据 + 字段映射 → 主实体 + N 个从属实体
// 规则:
// - 主实体填充/校验失败 → 整行拒绝（主实体与全部从属实体丢弃）
// - 从属实体仅在判别字段非空时创建; 判别字段为空视为“本行无该实体数据”
// - 复合导入中从属实体填充/校验失败 → 仅丢弃该从属实体并记录错误
// - 单从属实体导入中从属实体即整行内容, 失败即整行拒绝
// ==========================================

use crate::domain::entity::ImportableEntity;
use crate::domain::types::{EntityType, ImportTarget};
use crate::importer::field_mapping::FieldMapping;
use crate::importer::relationship_holder::AssembledRow;
use crate::importer::row_source::SourceRow;
use crate::importer::transformer::{effective_input, TransformParams, TransformerRegistry};
use std::collections::HashMap;
use tracing::warn;

pub struct CompositeRowAssembler<'a> {
    mapping: &'a FieldMapping,
    registry: &'a TransformerRegistry,
    target: ImportTarget,
    client_id: i64,
    file_id: i64,
    params: HashMap<EntityType, HashMap<String, TransformParams>>,
}

impl<'a> CompositeRowAssembler<'a> {
    pub fn new(
        mapping: &'a FieldMapping,
        registry: &'a TransformerRegistry,
        target: ImportTarget,
        client_id: i64,
        file_id: i64,
    ) -> Self {
        let params = EntityType::ALL
            .iter()
            .map(|t| (*t, mapping.params_for(*t)))
            .collect();
        Self {
            mapping,
            registry,
            target,
            client_id,
            file_id,
            params,
        }
    }

    /// 组装一行
    ///
    /// # 返回
    /// - Ok(AssembledRow): 组装成功（errors 中可能含被丢弃的从属实体）
    /// - Err(String): 整行拒绝的原因（含行号）
    pub fn assemble(&self, row: &SourceRow) -> Result<AssembledRow, String> {
        let groups = self.mapping.group_row(row);
        let empty = HashMap::new();
        let product_group = groups.get(&EntityType::Product).unwrap_or(&empty);

        let result = match self.target {
            ImportTarget::Product | ImportTarget::Composite => {
                self.assemble_with_primary(row.line, product_group, &groups)
            }
            ImportTarget::Region => {
                self.assemble_dependent_only(row.line, EntityType::Region, product_group, &groups)
            }
            ImportTarget::Competitor => self.assemble_dependent_only(
                row.line,
                EntityType::Competitor,
                product_group,
                &groups,
            ),
        };

        if let Err(message) = &result {
            warn!(line = row.line, error = %message, "行被拒绝");
        }
        result
    }

    fn assemble_with_primary(
        &self,
        line: usize,
        product_group: &HashMap<String, String>,
        groups: &HashMap<EntityType, HashMap<String, String>>,
    ) -> Result<AssembledRow, String> {
        let primary = self
            .build(EntityType::Product, product_group)
            .map_err(|e| format!("行 {}: {}", line, e))?;
        let external_id = primary
            .primary_external_id()
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let mut dependents = Vec::new();
        let mut errors = Vec::new();
        if self.target.is_composite() {
            for entity_type in [EntityType::Region, EntityType::Competitor] {
                let Some(group) = groups.get(&entity_type) else {
                    continue;
                };
                if !self.has_discriminator(entity_type, group) {
                    continue;
                }
                match self.build(entity_type, group) {
                    Ok(mut dependent) => {
                        dependent.set_primary_external_id(&external_id);
                        dependents.push(dependent);
                    }
                    Err(e) => {
                        let message = format!("行 {}: {} 已丢弃: {}", line, entity_type, e);
                        warn!(line, entity = %entity_type, error = %e, "从属实体被丢弃");
                        errors.push(message);
                    }
                }
            }
        }

        Ok(AssembledRow {
            line,
            external_id,
            primary: Some(primary),
            dependents,
            errors,
        })
    }

    fn assemble_dependent_only(
        &self,
        line: usize,
        entity_type: EntityType,
        product_group: &HashMap<String, String>,
        groups: &HashMap<EntityType, HashMap<String, String>>,
    ) -> Result<AssembledRow, String> {
        let external_id = product_group
            .get(EntityType::Product.discriminator_field())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("行 {}: 未指定商品外部编号", line))?;

        let empty = HashMap::new();
        let group = groups.get(&entity_type).unwrap_or(&empty);
        if !self.has_discriminator(entity_type, group) {
            return Err(format!(
                "行 {}: {} 缺少判别字段 {}",
                line,
                entity_type,
                entity_type.discriminator_field()
            ));
        }

        let mut dependent = self
            .build(entity_type, group)
            .map_err(|e| format!("行 {}: {}", line, e))?;
        dependent.set_primary_external_id(&external_id);

        Ok(AssembledRow {
            line,
            external_id,
            primary: None,
            dependents: vec![dependent],
            errors: Vec::new(),
        })
    }

    fn has_discriminator(&self, entity_type: EntityType, group: &HashMap<String, String>) -> bool {
        let field = entity_type.discriminator_field();
        let raw = group.get(field).map(String::as_str).unwrap_or("");
        let empty = TransformParams::empty();
        let params = self
            .params
            .get(&entity_type)
            .and_then(|p| p.get(field))
            .unwrap_or(&empty);
        effective_input(raw, params).is_some()
    }

    /// 实例化 → 填充 → 校验
    fn build(
        &self,
        entity_type: EntityType,
        group: &HashMap<String, String>,
    ) -> Result<ImportableEntity, String> {
        let mut entity = ImportableEntity::new(entity_type);
        let empty = HashMap::new();
        let params = self.params.get(&entity_type).unwrap_or(&empty);
        entity.fill_from_map(group, params, self.registry)?;
        if let Some(e) = entity.validate() {
            return Err(e);
        }
        entity.set_origin(self.client_id, self.file_id);
        Ok(entity)
    }
}
