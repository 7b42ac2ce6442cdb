// ==========================================
// 商品导入系统 - 通用枚举转换器
// ==========================================
// 参数: class=<枚举类型名>|mapping=别名1=取值1,别名2=取值2
// 约束: 新枚举类型只需注册 EnumDescriptor, 不需要新的转换器
// ==========================================

use super::{effective_input, TransformParams, TypedValue, ValueTransformer, ValueType};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// 运行时枚举类型描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    /// 全限定名, 如 `catalog.StockStatus`
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumDescriptor {
    pub fn new(name: impl Into<String>, variants: &[&str]) -> Self {
        Self {
            name: name.into(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// 名称末段, `catalog.StockStatus` → `StockStatus`
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    fn variant_ignore_case(&self, raw: &str) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| v.eq_ignore_ascii_case(raw) || v.to_lowercase() == raw.to_lowercase())
            .map(String::as_str)
    }
}

pub struct EnumTransformer {
    descriptors: RwLock<HashMap<String, EnumDescriptor>>,
}

impl EnumTransformer {
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, descriptor: EnumDescriptor) {
        if let Ok(mut guard) = self.descriptors.write() {
            guard.insert(descriptor.name.clone(), descriptor);
        }
    }

    /// 按全限定名或末段名查找
    fn lookup(&self, class: &str) -> Option<EnumDescriptor> {
        let guard = self.descriptors.read().ok()?;
        let simple = class.rsplit('.').next().unwrap_or(class);
        guard
            .get(class)
            .or_else(|| guard.values().find(|d| d.simple_name() == simple))
            .cloned()
    }

    /// `mapping=k1=v1,k2=v2`, 键转小写
    fn alias_table(params: &TransformParams) -> Vec<(String, String)> {
        params
            .get("mapping")
            .map(|raw| {
                raw.split(',')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
                    .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for EnumTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueTransformer for EnumTransformer {
    fn value_type(&self) -> ValueType {
        ValueType::Enum
    }

    fn transform(&self, raw: &str, params: &TransformParams) -> Option<TypedValue> {
        let value = effective_input(raw, params)?;
        let class = params.get("class").map(str::trim).filter(|c| !c.is_empty())?;
        let Some(descriptor) = self.lookup(class) else {
            debug!(class = %class, "未注册的枚举类型");
            return None;
        };

        let lowered = value.to_lowercase();
        let aliased = Self::alias_table(params)
            .into_iter()
            .find(|(k, _)| *k == lowered)
            .map(|(_, v)| v);

        let candidate = aliased.as_deref().unwrap_or(value);
        descriptor
            .variant_ignore_case(candidate)
            .map(|variant| TypedValue::Enum {
                class: descriptor.name.clone(),
                variant: variant.to_string(),
            })
    }

    fn format_value(&self, value: &TypedValue, params: &TransformParams) -> String {
        let TypedValue::Enum { variant, .. } = value else {
            return String::new();
        };
        // 反向映射: 取第一个指向该取值的别名
        Self::alias_table(params)
            .into_iter()
            .find(|(_, v)| v.eq_ignore_ascii_case(variant))
            .map(|(k, _)| k)
            .unwrap_or_else(|| variant.clone())
    }
}
