// ==========================================
// 商品导入系统 - 可导入实体
// ==========================================
// 职责: 主实体/从属实体的统一能力 {fill_from_map, validate, field_mappings}
// 约束: 实体变体为封闭枚举, 按 EntityType 工厂创建, 不做反射式分派
// ==========================================

use crate::domain::competitor::Competitor;
use crate::domain::product::Product;
use crate::domain::region::Region;
use crate::domain::types::EntityType;
use crate::importer::transformer::{TransformParams, TransformerRegistry, TypedValue, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

// ==========================================
// FieldSpec - 字段元数据
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// 规范字段名 (snake_case)
    pub field: &'static str,
    /// 源文件中的标准表头
    pub display: &'static str,
    pub value_type: ValueType,
    pub required: bool,
}

impl FieldSpec {
    pub const fn text(field: &'static str, display: &'static str) -> Self {
        Self {
            field,
            display,
            value_type: ValueType::String,
            required: false,
        }
    }

    pub const fn typed(field: &'static str, display: &'static str, value_type: ValueType) -> Self {
        Self {
            field,
            display,
            value_type,
            required: false,
        }
    }

    pub const fn required(field: &'static str, display: &'static str) -> Self {
        Self {
            field,
            display,
            value_type: ValueType::String,
            required: true,
        }
    }
}

/// 字段名归一化: 忽略大小写、下划线与空白 (`productId` ≡ `product_id`)
pub fn normalize_field_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

impl EntityType {
    /// 实体的字段表
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            EntityType::Product => Product::FIELDS,
            EntityType::Region => Region::FIELDS,
            EntityType::Competitor => Competitor::FIELDS,
        }
    }

    /// 按字段名或标准表头查找字段
    pub fn find_field(&self, key: &str) -> Option<&'static FieldSpec> {
        let normalized = normalize_field_key(key);
        let trimmed = key.trim();
        self.fields().iter().find(|spec| {
            normalize_field_key(spec.field) == normalized
                || spec.display.to_lowercase() == trimmed.to_lowercase()
        })
    }

    /// 判别字段: 主实体的外部编号 / 从属实体的语义键
    pub fn discriminator_field(&self) -> &'static str {
        match self {
            EntityType::Product => "product_id",
            EntityType::Region => "region",
            EntityType::Competitor => "competitor_name",
        }
    }

    /// 必填字段
    pub fn required_fields(&self) -> Vec<&'static FieldSpec> {
        self.fields().iter().filter(|f| f.required).collect()
    }
}

// ==========================================
// EntityRecord Trait
// ==========================================
// 实现者: Product, Region, Competitor
pub trait EntityRecord {
    const FIELDS: &'static [FieldSpec];

    fn entity_type(&self) -> EntityType;

    /// 写入单个已转换的字段值
    ///
    /// # 返回
    /// - true: 字段已识别并写入
    /// - false: 字段不属于该实体或值类型不匹配
    fn apply_value(&mut self, field: &'static str, value: TypedValue) -> bool;

    /// 业务校验
    ///
    /// # 返回
    /// - None: 校验通过
    /// - Some: 错误描述
    fn validate(&self) -> Option<String>;
}

/// 通用填充逻辑: 空值跳过（除非带 default=）, 转换失败的字段汇总为错误
fn fill_record<E: EntityRecord>(
    record: &mut E,
    entity_type: EntityType,
    row: &HashMap<String, String>,
    params: &HashMap<String, TransformParams>,
    registry: &TransformerRegistry,
) -> Result<(), String> {
    let empty = TransformParams::empty();
    let mut failures = Vec::new();

    for (key, raw) in row {
        let field_params = params.get(key).unwrap_or(&empty);
        if raw.trim().is_empty() && field_params.default_value().is_none() {
            continue;
        }

        let Some(spec) = entity_type.find_field(key) else {
            debug!(entity = %entity_type, key = %key, "忽略未知字段");
            continue;
        };

        match registry.transform(spec.value_type, raw, field_params) {
            Some(value) => {
                if !record.apply_value(spec.field, value) {
                    failures.push(format!("{}: 值类型不匹配 '{}'", spec.display, raw));
                }
            }
            None => failures.push(format!("{}: 无法转换 '{}'", spec.display, raw.trim())),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        failures.sort();
        Err(failures.join("; "))
    }
}

// ==========================================
// ImportableEntity - 可导入实体 (封闭枚举)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportableEntity {
    Product(Product),
    Region(Region),
    Competitor(Competitor),
}

impl ImportableEntity {
    /// 按实体类型创建空实例
    pub fn new(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Product => ImportableEntity::Product(Product::default()),
            EntityType::Region => ImportableEntity::Region(Region::default()),
            EntityType::Competitor => ImportableEntity::Competitor(Competitor::default()),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            ImportableEntity::Product(_) => EntityType::Product,
            ImportableEntity::Region(_) => EntityType::Region,
            ImportableEntity::Competitor(_) => EntityType::Competitor,
        }
    }

    /// 标准表头 → 字段名 映射表
    pub fn field_mappings(&self) -> Vec<(&'static str, &'static str)> {
        self.entity_type()
            .fields()
            .iter()
            .map(|spec| (spec.display, spec.field))
            .collect()
    }

    /// 以 `字段名或标准表头 → 原始值` 填充实体
    ///
    /// # 返回
    /// - Ok(()): 全部非空字段转换成功
    /// - Err: 转换失败字段的描述
    pub fn fill_from_map(
        &mut self,
        row: &HashMap<String, String>,
        params: &HashMap<String, TransformParams>,
        registry: &TransformerRegistry,
    ) -> Result<(), String> {
        let entity_type = self.entity_type();
        match self {
            ImportableEntity::Product(p) => fill_record(p, entity_type, row, params, registry),
            ImportableEntity::Region(r) => fill_record(r, entity_type, row, params, registry),
            ImportableEntity::Competitor(c) => fill_record(c, entity_type, row, params, registry),
        }
    }

    pub fn validate(&self) -> Option<String> {
        match self {
            ImportableEntity::Product(p) => p.validate(),
            ImportableEntity::Region(r) => r.validate(),
            ImportableEntity::Competitor(c) => c.validate(),
        }
    }

    /// 判别键: 商品外部编号 / 区域名 / 竞品站点名
    pub fn discriminator(&self) -> Option<&str> {
        match self {
            ImportableEntity::Product(p) => p.product_id.as_deref(),
            ImportableEntity::Region(r) => r.region.as_deref(),
            ImportableEntity::Competitor(c) => c.competitor_name.as_deref(),
        }
    }

    /// 所属主实体的外部编号
    pub fn primary_external_id(&self) -> Option<&str> {
        match self {
            ImportableEntity::Product(p) => p.product_id.as_deref(),
            ImportableEntity::Region(r) => r.product_external_id.as_deref(),
            ImportableEntity::Competitor(c) => c.product_external_id.as_deref(),
        }
    }

    /// 写入客户与来源操作
    pub fn set_origin(&mut self, client_id: i64, file_id: i64) {
        match self {
            ImportableEntity::Product(p) => {
                p.client_id = client_id;
                p.file_id = Some(file_id);
            }
            ImportableEntity::Region(r) => {
                r.client_id = client_id;
                r.file_id = Some(file_id);
            }
            ImportableEntity::Competitor(c) => {
                c.client_id = client_id;
                c.file_id = Some(file_id);
            }
        }
    }

    /// 从属实体记录主实体外部编号
    pub fn set_primary_external_id(&mut self, external_id: &str) {
        match self {
            ImportableEntity::Product(_) => {}
            ImportableEntity::Region(r) => r.product_external_id = Some(external_id.to_string()),
            ImportableEntity::Competitor(c) => {
                c.product_external_id = Some(external_id.to_string())
            }
        }
    }

    pub fn storage_id(&self) -> Option<i64> {
        match self {
            ImportableEntity::Product(p) => p.id,
            ImportableEntity::Region(r) => r.id,
            ImportableEntity::Competitor(c) => c.id,
        }
    }

    pub fn set_storage_id(&mut self, id: Option<i64>) {
        match self {
            ImportableEntity::Product(p) => p.id = id,
            ImportableEntity::Region(r) => r.id = id,
            ImportableEntity::Competitor(c) => c.id = id,
        }
    }
}

impl From<Product> for ImportableEntity {
    fn from(p: Product) -> Self {
        ImportableEntity::Product(p)
    }
}

impl From<Region> for ImportableEntity {
    fn from(r: Region) -> Self {
        ImportableEntity::Region(r)
    }
}

impl From<Competitor> for ImportableEntity {
    fn from(c: Competitor) -> Self {
        ImportableEntity::Competitor(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_find_field_by_name_or_display() {
        assert_eq!(EntityType::Product.find_field("productId").unwrap().field, "product_id");
        assert_eq!(EntityType::Product.find_field("ID ТОВАРА").unwrap().field, "product_id");
        assert_eq!(EntityType::Region.find_field("Город").unwrap().field, "region");
        assert!(EntityType::Region.find_field("Сайт").is_none());
    }

    #[test]
    fn test_fill_product_from_map() {
        let registry = TransformerRegistry::with_defaults();
        let mut entity = ImportableEntity::new(EntityType::Product);
        let result = entity.fill_from_map(
            &row(&[("product_id", " A1 "), ("Цена", "10,50"), ("Бренд", "")]),
            &HashMap::new(),
            &registry,
        );
        assert!(result.is_ok());
        let ImportableEntity::Product(p) = &entity else {
            panic!("expected product");
        };
        assert_eq!(p.product_id.as_deref(), Some("A1"));
        assert_eq!(p.product_price, Some(10.5));
        assert_eq!(p.product_brand, None);
        assert!(entity.validate().is_none());
    }

    #[test]
    fn test_fill_reports_conversion_failure() {
        let registry = TransformerRegistry::with_defaults();
        let mut entity = ImportableEntity::new(EntityType::Product);
        let err = entity
            .fill_from_map(
                &row(&[("product_id", "A1"), ("product_price", "дорого")]),
                &HashMap::new(),
                &registry,
            )
            .unwrap_err();
        assert!(err.contains("дорого"));
    }

    #[test]
    fn test_default_param_applies_to_blank_value() {
        let registry = TransformerRegistry::with_defaults();
        let mut entity = ImportableEntity::new(EntityType::Region);
        let mut params = HashMap::new();
        params.insert("region_price".to_string(), TransformParams::parse("default=0"));
        entity
            .fill_from_map(
                &row(&[("region", "North"), ("region_price", "")]),
                &params,
                &registry,
            )
            .unwrap();
        let ImportableEntity::Region(r) = &entity else {
            panic!("expected region");
        };
        assert_eq!(r.region_price, Some(0.0));
    }

    #[test]
    fn test_validate_missing_discriminator() {
        assert!(ImportableEntity::new(EntityType::Product).validate().is_some());
        assert!(ImportableEntity::new(EntityType::Region).validate().is_some());
        assert!(ImportableEntity::new(EntityType::Competitor).validate().is_some());
    }
}
