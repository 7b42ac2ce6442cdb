// ==========================================
// 商品导入系统 - 竞品价格 (从属实体)
// ==========================================
// 归属: 通过 product_ref 指向商品存储 id; 语义键为竞品站点名
// 价格字段保留原文（抓取数据常带货币符号）
// ==========================================

use crate::domain::entity::{EntityRecord, FieldSpec};
use crate::domain::types::EntityType;
use crate::importer::transformer::{TypedValue, ValueType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub id: Option<i64>,
    pub client_id: i64,
    pub file_id: Option<i64>,
    pub product_ref: Option<i64>,
    pub product_external_id: Option<String>,

    pub competitor_name: Option<String>,
    pub competitor_price: Option<String>,
    pub competitor_promotional_price: Option<String>,
    pub competitor_additional_price: Option<String>,
    pub competitor_time: Option<String>,
    pub competitor_date: Option<String>,
    pub competitor_local_date_time: Option<NaiveDateTime>,
    pub competitor_stock_status: Option<String>,
    pub competitor_commentary: Option<String>,
    pub competitor_product_name: Option<String>,
    pub competitor_additional: Option<String>,
    pub competitor_additional2: Option<String>,
    pub competitor_url: Option<String>,
    pub competitor_web_cache_url: Option<String>,
}

const COMPETITOR_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("competitor_name", "Сайт"),
    FieldSpec::text("competitor_price", "Цена конкурента"),
    FieldSpec::text("competitor_promotional_price", "Акционная цена"),
    FieldSpec::text("competitor_additional_price", "Дополнительная цена"),
    FieldSpec::text("competitor_time", "Время"),
    FieldSpec::text("competitor_date", "Дата"),
    FieldSpec::typed("competitor_local_date_time", "Дата:Время", ValueType::DateTime),
    FieldSpec::text("competitor_stock_status", "Статус"),
    FieldSpec::text("competitor_commentary", "Комментарий"),
    FieldSpec::text("competitor_product_name", "Наименование товара конкурента"),
    FieldSpec::text("competitor_additional", "Дополнительно"),
    FieldSpec::text("competitor_additional2", "Дополнительно 2"),
    FieldSpec::text("competitor_url", "Ссылка конкурента"),
    FieldSpec::text("competitor_web_cache_url", "Скриншот"),
];

impl EntityRecord for Competitor {
    const FIELDS: &'static [FieldSpec] = COMPETITOR_FIELDS;

    fn entity_type(&self) -> EntityType {
        EntityType::Competitor
    }

    fn apply_value(&mut self, field: &'static str, value: TypedValue) -> bool {
        if field == "competitor_local_date_time" {
            return match value.as_date_time() {
                Some(dt) => {
                    self.competitor_local_date_time = Some(dt);
                    true
                }
                None => false,
            };
        }

        let Some(text) = value.as_str().map(str::to_string) else {
            return false;
        };
        let slot = match field {
            "competitor_name" => &mut self.competitor_name,
            "competitor_price" => &mut self.competitor_price,
            "competitor_promotional_price" => &mut self.competitor_promotional_price,
            "competitor_additional_price" => &mut self.competitor_additional_price,
            "competitor_time" => &mut self.competitor_time,
            "competitor_date" => &mut self.competitor_date,
            "competitor_stock_status" => &mut self.competitor_stock_status,
            "competitor_commentary" => &mut self.competitor_commentary,
            "competitor_product_name" => &mut self.competitor_product_name,
            "competitor_additional" => &mut self.competitor_additional,
            "competitor_additional2" => &mut self.competitor_additional2,
            "competitor_url" => &mut self.competitor_url,
            "competitor_web_cache_url" => &mut self.competitor_web_cache_url,
            _ => return false,
        };
        *slot = Some(text);
        true
    }

    fn validate(&self) -> Option<String> {
        match self.competitor_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => None,
            _ => Some("未指定竞品站点 (Сайт)".to_string()),
        }
    }
}
