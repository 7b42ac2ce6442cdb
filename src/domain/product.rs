// ==========================================
// 商品导入系统 - 商品 (主实体)
// ==========================================
// 标识: (client_id, product_id) 唯一; product_id 为客户侧外部编号
// ==========================================

use crate::domain::entity::{EntityRecord, FieldSpec};
use crate::domain::types::EntityType;
use crate::importer::transformer::{TypedValue, ValueType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// 存储层分配的 id
    pub id: Option<i64>,
    pub client_id: i64,
    /// 来源导入操作 id
    pub file_id: Option<i64>,
    pub data_source: Option<String>,

    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub product_brand: Option<String>,
    pub product_bar: Option<String>,
    pub product_description: Option<String>,
    pub product_url: Option<String>,
    pub product_category1: Option<String>,
    pub product_category2: Option<String>,
    pub product_category3: Option<String>,
    pub product_price: Option<f64>,
    pub product_analog: Option<String>,
    pub product_additional1: Option<String>,
    pub product_additional2: Option<String>,
    pub product_additional3: Option<String>,
    pub product_additional4: Option<String>,
    pub product_additional5: Option<String>,
}

const PRODUCT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("product_id", "ID товара"),
    FieldSpec::text("product_name", "Модель"),
    FieldSpec::text("product_brand", "Бренд"),
    FieldSpec::text("product_bar", "Штрихкод"),
    FieldSpec::text("product_description", "Описание"),
    FieldSpec::text("product_url", "Ссылка"),
    FieldSpec::text("product_category1", "Категория товара 1"),
    FieldSpec::text("product_category2", "Категория товара 2"),
    FieldSpec::text("product_category3", "Категория товара 3"),
    FieldSpec::typed("product_price", "Цена", ValueType::Double),
    FieldSpec::text("product_analog", "Аналог"),
    FieldSpec::text("product_additional1", "Дополнительное поле 1"),
    FieldSpec::text("product_additional2", "Дополнительное поле 2"),
    FieldSpec::text("product_additional3", "Дополнительное поле 3"),
    FieldSpec::text("product_additional4", "Дополнительное поле 4"),
    FieldSpec::text("product_additional5", "Дополнительное поле 5"),
];

impl Product {
    pub fn with_external_id(client_id: i64, product_id: &str) -> Self {
        Self {
            client_id,
            product_id: Some(product_id.to_string()),
            ..Default::default()
        }
    }

    pub fn external_id(&self) -> Option<&str> {
        self.product_id.as_deref()
    }
}

impl EntityRecord for Product {
    const FIELDS: &'static [FieldSpec] = PRODUCT_FIELDS;

    fn entity_type(&self) -> EntityType {
        EntityType::Product
    }

    fn apply_value(&mut self, field: &'static str, value: TypedValue) -> bool {
        if field == "product_price" {
            return match value.as_f64() {
                Some(v) => {
                    self.product_price = Some(v);
                    true
                }
                None => false,
            };
        }

        let Some(text) = value.as_str().map(str::to_string) else {
            return false;
        };
        let slot = match field {
            "product_id" => &mut self.product_id,
            "product_name" => &mut self.product_name,
            "product_brand" => &mut self.product_brand,
            "product_bar" => &mut self.product_bar,
            "product_description" => &mut self.product_description,
            "product_url" => &mut self.product_url,
            "product_category1" => &mut self.product_category1,
            "product_category2" => &mut self.product_category2,
            "product_category3" => &mut self.product_category3,
            "product_analog" => &mut self.product_analog,
            "product_additional1" => &mut self.product_additional1,
            "product_additional2" => &mut self.product_additional2,
            "product_additional3" => &mut self.product_additional3,
            "product_additional4" => &mut self.product_additional4,
            "product_additional5" => &mut self.product_additional5,
            _ => return false,
        };
        *slot = Some(text);
        true
    }

    fn validate(&self) -> Option<String> {
        match self.product_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => None,
            _ => Some("商品外部编号 (ID товара) 为空".to_string()),
        }
    }
}
