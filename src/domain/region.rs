// ==========================================
// 商品导入系统 - 区域价格 (从属实体)
// ==========================================
// 归属: 通过 product_ref 指向商品存储 id; 语义键为区域名
// ==========================================

use crate::domain::entity::{EntityRecord, FieldSpec};
use crate::domain::types::EntityType;
use crate::importer::transformer::{TypedValue, ValueType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: Option<i64>,
    pub client_id: i64,
    pub file_id: Option<i64>,
    /// 所属商品的存储 id（落库前必须已解析）
    pub product_ref: Option<i64>,
    /// 所属商品的外部编号（解析前的中间状态）
    pub product_external_id: Option<String>,

    pub region: Option<String>,
    pub region_address: Option<String>,
    pub region_price: Option<f64>,
}

const REGION_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("region", "Город"),
    FieldSpec::text("region_address", "Адрес"),
    FieldSpec::typed("region_price", "Цена в регионе", ValueType::Double),
];

impl EntityRecord for Region {
    const FIELDS: &'static [FieldSpec] = REGION_FIELDS;

    fn entity_type(&self) -> EntityType {
        EntityType::Region
    }

    fn apply_value(&mut self, field: &'static str, value: TypedValue) -> bool {
        match field {
            "region" => value.as_str().map(|s| self.region = Some(s.to_string())).is_some(),
            "region_address" => value
                .as_str()
                .map(|s| self.region_address = Some(s.to_string()))
                .is_some(),
            "region_price" => value.as_f64().map(|v| self.region_price = Some(v)).is_some(),
            _ => false,
        }
    }

    fn validate(&self) -> Option<String> {
        match self.region.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => None,
            _ => Some("未指定区域 (Город)".to_string()),
        }
    }
}
