// ==========================================
// 商品导入系统 - 字段映射
// ==========================================
// 职责: 表头 → "<实体前缀>.<字段名>" 映射的解析、自动建议、必填校验、按实体分组
// 约束: 每个表头至多映射一个字段, 每个字段至多被一个表头映射; 未映射表头忽略
// ==========================================

use crate::domain::entity::{normalize_field_key, FieldSpec};
use crate::domain::types::{EntityType, ImportTarget};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::row_source::SourceRow;
use crate::importer::transformer::TransformParams;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// 建议模式的采纳阈值（得分需严格大于）
pub const SUGGESTION_THRESHOLD: u32 = 3;
const EXACT_SCORE: u32 = 100;
const CONTAINS_SCORE: u32 = 10;

// ==========================================
// MappingTarget - 单个表头的映射目标
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct MappingTarget {
    pub entity_type: EntityType,
    /// 规范字段名
    pub field: &'static str,
    pub params: TransformParams,
}

impl MappingTarget {
    /// 解析 `prefix.field` 或 `prefix.field|k=v|...`
    pub fn parse(header: &str, raw: &str) -> ImportResult<Self> {
        let (target, params) = match raw.split_once('|') {
            Some((t, p)) => (t, TransformParams::parse(p)),
            None => (raw, TransformParams::empty()),
        };

        let invalid = |message: String| ImportError::FieldMappingError {
            header: header.to_string(),
            message,
        };

        let (prefix, field) = target
            .trim()
            .split_once('.')
            .ok_or_else(|| invalid(format!("映射值 '{}' 缺少实体前缀", raw)))?;
        let entity_type = EntityType::from_prefix(prefix)
            .ok_or_else(|| invalid(format!("未知的实体前缀 '{}'", prefix)))?;
        let spec = entity_type
            .find_field(field)
            .ok_or_else(|| invalid(format!("{} 不存在字段 '{}'", entity_type, field)))?;

        Ok(Self {
            entity_type,
            field: spec.field,
            params,
        })
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.entity_type.prefix(), self.field)
    }
}

// ==========================================
// FieldMapping
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMapping {
    /// (表头, 目标), 保持输入顺序
    entries: Vec<(String, MappingTarget)>,
}

impl FieldMapping {
    /// 解析显式映射
    ///
    /// # 参数
    /// - pairs: (表头, "prefix.field[|params]"); 空值视为不映射
    ///
    /// # 返回
    /// - Err(FieldMappingError): 格式错误、重复表头或重复字段
    pub fn from_pairs<I, H, V>(pairs: I) -> ImportResult<Self>
    where
        I: IntoIterator<Item = (H, V)>,
        H: AsRef<str>,
        V: AsRef<str>,
    {
        let mut mapping = FieldMapping::default();
        for (header, value) in pairs {
            let header = header.as_ref().trim();
            let value = value.as_ref().trim();
            if header.is_empty() || value.is_empty() {
                continue;
            }
            let target = MappingTarget::parse(header, value)?;
            mapping.push(header.to_string(), target)?;
        }
        Ok(mapping)
    }

    fn push(&mut self, header: String, target: MappingTarget) -> ImportResult<()> {
        if self.entries.iter().any(|(h, _)| *h == header) {
            return Err(ImportError::FieldMappingError {
                header,
                message: "表头重复映射".to_string(),
            });
        }
        if let Some((other, _)) = self.entries.iter().find(|(_, t)| {
            t.entity_type == target.entity_type && t.field == target.field
        }) {
            return Err(ImportError::FieldMappingError {
                message: format!("字段 {} 已由表头 '{}' 映射", target.qualified_name(), other),
                header,
            });
        }
        self.entries.push((header, target));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[(String, MappingTarget)] {
        &self.entries
    }

    pub fn target_for(&self, header: &str) -> Option<&MappingTarget> {
        self.entries
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, t)| t)
    }

    pub fn header_for(&self, entity_type: EntityType, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, t)| t.entity_type == entity_type && t.field == field)
            .map(|(h, _)| h.as_str())
    }

    /// 映射涉及的实体类型
    pub fn entity_types(&self) -> HashSet<EntityType> {
        self.entries.iter().map(|(_, t)| t.entity_type).collect()
    }

    /// 映射中出现、但不属于导入目标的实体类型
    ///
    /// 商品前缀始终允许（单从属实体导入通过商品外部编号关联）
    pub fn check_target(&self, target: ImportTarget) -> ImportResult<()> {
        for (header, t) in &self.entries {
            let allowed = target.accepts(t.entity_type)
                || (t.entity_type == EntityType::Product && t.field == "product_id");
            if !allowed {
                return Err(ImportError::FieldMappingError {
                    header: header.clone(),
                    message: format!("{} 不属于导入目标 {}", t.qualified_name(), target),
                });
            }
        }
        Ok(())
    }

    /// 校验必填字段均映射到文件中实际存在的表头
    ///
    /// # 返回
    /// - Err(MissingRequiredFields): 缺失字段列表（`prefix.field`）
    pub fn validate_required(&self, target: ImportTarget, headers: &[String]) -> ImportResult<()> {
        let present: HashSet<&str> = headers.iter().map(String::as_str).collect();
        let missing: Vec<String> = required_fields(target)
            .into_iter()
            .filter(|(entity_type, field)| {
                !self
                    .header_for(*entity_type, field)
                    .is_some_and(|h| present.contains(h))
            })
            .map(|(entity_type, field)| format!("{}.{}", entity_type.prefix(), field))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ImportError::MissingRequiredFields(missing.join(", ")))
        }
    }

    /// 把一行原始数据按实体前缀分组
    ///
    /// # 返回
    /// - 实体类型 → (规范字段名 → 原始值); 未映射表头被忽略
    pub fn group_row(&self, row: &SourceRow) -> HashMap<EntityType, HashMap<String, String>> {
        let mut groups: HashMap<EntityType, HashMap<String, String>> = HashMap::new();
        for (header, target) in &self.entries {
            if let Some(raw) = row.fields.get(header) {
                groups
                    .entry(target.entity_type)
                    .or_default()
                    .insert(target.field.to_string(), raw.clone());
            }
        }
        groups
    }

    /// 指定实体的字段参数（规范字段名 → 参数）
    pub fn params_for(&self, entity_type: EntityType) -> HashMap<String, TransformParams> {
        self.entries
            .iter()
            .filter(|(_, t)| t.entity_type == entity_type && !t.params.is_empty())
            .map(|(_, t)| (t.field.to_string(), t.params.clone()))
            .collect()
    }

    /// 输出为 (表头, "prefix.field") 列表
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(h, t)| (h.clone(), t.qualified_name()))
            .collect()
    }
}

/// 导入目标的必填字段
pub fn required_fields(target: ImportTarget) -> Vec<(EntityType, &'static str)> {
    let mut fields = vec![(EntityType::Product, EntityType::Product.discriminator_field())];
    match target {
        ImportTarget::Region => fields.push((EntityType::Region, "region")),
        ImportTarget::Competitor => fields.push((EntityType::Competitor, "competitor_name")),
        ImportTarget::Product | ImportTarget::Composite => {}
    }
    fields
}

// ==========================================
// 自动建议
// ==========================================

/// 表头与字段的匹配得分
///
/// - 标准表头完全一致（忽略大小写）或字段名一致: 100
/// - 一方包含另一方: 10
/// - 否则: 2 × 共同词数（词长 > 2, 忽略大小写）
pub fn match_score(header: &str, spec: &FieldSpec) -> u32 {
    let header_lower = header.trim().to_lowercase();
    let display_lower = spec.display.to_lowercase();
    if header_lower.is_empty() {
        return 0;
    }
    if header_lower == display_lower || normalize_field_key(header) == normalize_field_key(spec.field)
    {
        return EXACT_SCORE;
    }
    if header_lower.contains(&display_lower) || display_lower.contains(&header_lower) {
        return CONTAINS_SCORE;
    }

    let header_words: HashSet<&str> = header_lower
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .collect();
    let matches = display_lower
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && header_words.contains(w))
        .count() as u32;
    2 * matches
}

/// 按表头建议映射
///
/// # 参数
/// - headers: 文件表头
/// - target: 导入目标（单从属实体导入额外考虑商品外部编号）
///
/// # 返回
/// - 得分高于阈值的映射; 每个字段只分配给得分最高（同分取靠前）的表头
pub fn suggest_mapping(headers: &[String], target: ImportTarget) -> FieldMapping {
    let mut entity_types = target.entity_types();
    if !entity_types.contains(&EntityType::Product) {
        entity_types.insert(0, EntityType::Product);
    }

    // (得分, 表头序号, 实体, 字段)
    let mut candidates: Vec<(u32, usize, EntityType, &'static FieldSpec)> = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        for entity_type in &entity_types {
            for spec in entity_type.fields() {
                if *entity_type == EntityType::Product
                    && !target.accepts(EntityType::Product)
                    && spec.field != "product_id"
                {
                    continue;
                }
                let score = match_score(header, spec);
                if score > SUGGESTION_THRESHOLD {
                    candidates.push((score, idx, *entity_type, spec));
                }
            }
        }
    }
    // 得分降序; 同分按表头顺序, 再按实体/字段声明顺序（排序稳定）
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut assigned_headers: HashSet<usize> = HashSet::new();
    let mut assigned_fields: HashSet<(EntityType, &'static str)> = HashSet::new();
    let mut chosen: Vec<(usize, MappingTarget)> = Vec::new();
    for (score, idx, entity_type, spec) in candidates {
        if assigned_headers.contains(&idx) || assigned_fields.contains(&(entity_type, spec.field)) {
            continue;
        }
        debug!(header = %headers[idx], field = %spec.field, score, "建议映射");
        assigned_headers.insert(idx);
        assigned_fields.insert((entity_type, spec.field));
        chosen.push((
            idx,
            MappingTarget {
                entity_type,
                field: spec.field,
                params: TransformParams::empty(),
            },
        ));
    }
    chosen.sort_by_key(|(idx, _)| *idx);

    FieldMapping {
        entries: chosen
            .into_iter()
            .map(|(idx, t)| (headers[idx].trim().to_string(), t))
            .collect(),
    }
}
