// ==========================================
// 商品导入系统 - 值转换器注册表
// ==========================================
// 职责: 原始字符串 ↔ 类型化值 的双向转换
// 参数: `key=value` 以 `|` 连接, 如 `pattern=dd.MM.yyyy|default=01.01.2000`
// 约束: 转换失败只记录日志并返回 None, 不抛错; 是否致命由行级校验决定
// ==========================================

pub mod datetime;
pub mod enumeration;
pub mod number;
pub mod scalar;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use datetime::{DateTimeTransformer, DateTransformer, TimeTransformer};
pub use enumeration::{EnumDescriptor, EnumTransformer};
pub use number::{DoubleTransformer, IntegerTransformer, LongTransformer};
pub use scalar::{BooleanTransformer, StringTransformer};

// ==========================================
// ValueType - 目标值类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    Date,
    Time,
    DateTime,
    Enum,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "STRING",
            ValueType::Integer => "INTEGER",
            ValueType::Long => "LONG",
            ValueType::Double => "DOUBLE",
            ValueType::Boolean => "BOOLEAN",
            ValueType::Date => "DATE",
            ValueType::Time => "TIME",
            ValueType::DateTime => "DATE_TIME",
            ValueType::Enum => "ENUM",
        };
        write!(f, "{}", name)
    }
}

// ==========================================
// TypedValue - 转换结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Enum { class: String, variant: String },
}

impl TypedValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            TypedValue::String(_) => ValueType::String,
            TypedValue::Integer(_) => ValueType::Integer,
            TypedValue::Long(_) => ValueType::Long,
            TypedValue::Double(_) => ValueType::Double,
            TypedValue::Boolean(_) => ValueType::Boolean,
            TypedValue::Date(_) => ValueType::Date,
            TypedValue::Time(_) => ValueType::Time,
            TypedValue::DateTime(_) => ValueType::DateTime,
            TypedValue::Enum { .. } => ValueType::Enum,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            TypedValue::Enum { variant, .. } => Some(variant),
            _ => None,
        }
    }

    /// 数值类型统一取 f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Double(v) => Some(*v),
            TypedValue::Integer(v) => Some(*v as f64),
            TypedValue::Long(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Integer(v) => Some(*v as i64),
            TypedValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date_time(&self) -> Option<NaiveDateTime> {
        match self {
            TypedValue::DateTime(v) => Some(*v),
            TypedValue::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }
}

// ==========================================
// TransformParams - 字段级转换参数
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformParams {
    entries: Vec<(String, String)>,
}

impl TransformParams {
    /// 解析 `k1=v1|k2=v2`; 无 `=` 的片段被忽略, 同名键以首次出现为准
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split('|')
            .filter_map(|part| part.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn default_value(&self) -> Option<&str> {
        self.get("default")
    }

    pub fn pattern(&self) -> Option<&str> {
        self.get("pattern").map(str::trim).filter(|p| !p.is_empty())
    }

    pub fn locale(&self) -> Option<&str> {
        self.get("locale").map(str::trim).filter(|l| !l.is_empty())
    }
}

impl fmt::Display for TransformParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}", joined.join("|"))
    }
}

/// 取得实际参与转换的输入: 非空输入去空白后返回; 空输入回退到 `default=`
pub(crate) fn effective_input<'a>(raw: &'a str, params: &'a TransformParams) -> Option<&'a str> {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        return Some(trimmed);
    }
    params
        .default_value()
        .map(str::trim)
        .filter(|d| !d.is_empty())
}

// ==========================================
// ValueTransformer Trait
// ==========================================
// 实现者: String/Integer/Long/Double/Boolean/Date/Time/DateTime/Enum 转换器
pub trait ValueTransformer: Send + Sync {
    /// 转换器负责的目标类型
    fn value_type(&self) -> ValueType;

    /// 原始字符串 → 类型化值
    ///
    /// # 返回
    /// - Some: 转换成功
    /// - None: 空输入且无默认值, 或无法解析
    fn transform(&self, raw: &str, params: &TransformParams) -> Option<TypedValue>;

    /// 空输入视为可转换
    fn can_transform(&self, raw: &str, params: &TransformParams) -> bool {
        raw.trim().is_empty() || self.transform(raw, params).is_some()
    }

    /// 类型化值 → 字符串（transform 的逆操作）
    fn format_value(&self, value: &TypedValue, params: &TransformParams) -> String;
}

// ==========================================
// TransformerRegistry - 按类型注册的转换器表
// ==========================================
pub struct TransformerRegistry {
    transformers: HashMap<ValueType, Arc<dyn ValueTransformer>>,
    enums: Arc<EnumTransformer>,
    fallback: Arc<StringTransformer>,
}

impl TransformerRegistry {
    /// 空注册表（仅字符串回退）
    pub fn new() -> Self {
        Self {
            transformers: HashMap::new(),
            enums: Arc::new(EnumTransformer::new()),
            fallback: Arc::new(StringTransformer),
        }
    }

    /// 注册全部内置转换器
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StringTransformer));
        registry.register(Arc::new(IntegerTransformer));
        registry.register(Arc::new(LongTransformer));
        registry.register(Arc::new(DoubleTransformer));
        registry.register(Arc::new(BooleanTransformer));
        registry.register(Arc::new(DateTransformer));
        registry.register(Arc::new(TimeTransformer));
        registry.register(Arc::new(DateTimeTransformer));
        let enums = registry.enums.clone();
        registry.register(enums);
        registry
    }

    /// 注册（或替换）某一类型的转换器
    pub fn register(&mut self, transformer: Arc<dyn ValueTransformer>) {
        self.transformers
            .insert(transformer.value_type(), transformer);
    }

    /// 注册运行时枚举类型描述, 无需改动注册表本身
    pub fn register_enum(&self, descriptor: EnumDescriptor) {
        self.enums.register(descriptor);
    }

    /// 查找转换器; 未注册的类型回退到字符串转换器
    pub fn get(&self, value_type: ValueType) -> &dyn ValueTransformer {
        match self.transformers.get(&value_type) {
            Some(t) => t.as_ref(),
            None => self.fallback.as_ref(),
        }
    }

    pub fn transform(
        &self,
        value_type: ValueType,
        raw: &str,
        params: &TransformParams,
    ) -> Option<TypedValue> {
        let result = self.get(value_type).transform(raw, params);
        if result.is_none() && !raw.trim().is_empty() {
            debug!(value_type = %value_type, raw = %raw, params = %params, "值转换失败");
        }
        result
    }

    pub fn can_transform(&self, value_type: ValueType, raw: &str, params: &TransformParams) -> bool {
        self.get(value_type).can_transform(raw, params)
    }

    pub fn format_value(&self, value: &TypedValue, params: &TransformParams) -> String {
        self.get(value.value_type()).format_value(value, params)
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_parse() {
        let params = TransformParams::parse("pattern=dd.MM.yyyy|default=01.01.2000|mapping=a=X,b=Y");
        assert_eq!(params.pattern(), Some("dd.MM.yyyy"));
        assert_eq!(params.default_value(), Some("01.01.2000"));
        assert_eq!(params.get("mapping"), Some("a=X,b=Y"));
        assert_eq!(params.get("locale"), None);
        assert!(TransformParams::parse("").is_empty());
        assert!(TransformParams::parse("garbage").is_empty());
    }

    #[test]
    fn test_blank_input_without_default_is_none() {
        let registry = TransformerRegistry::with_defaults();
        let params = TransformParams::empty();
        for ty in [
            ValueType::String,
            ValueType::Integer,
            ValueType::Double,
            ValueType::Boolean,
            ValueType::Date,
        ] {
            assert_eq!(registry.transform(ty, "   ", &params), None, "{}", ty);
            assert!(registry.can_transform(ty, "", &params));
        }
    }

    #[test]
    fn test_blank_input_uses_default() {
        let registry = TransformerRegistry::with_defaults();
        let params = TransformParams::parse("default=42");
        assert_eq!(
            registry.transform(ValueType::Integer, "", &params),
            Some(TypedValue::Integer(42))
        );
    }

    #[test]
    fn test_unregistered_type_falls_back_to_string() {
        let registry = TransformerRegistry::new();
        assert_eq!(
            registry.transform(ValueType::Double, " 10,5 ", &TransformParams::empty()),
            Some(TypedValue::String("10,5".to_string()))
        );
    }

    #[test]
    fn test_round_trip_representative_values() {
        let registry = TransformerRegistry::with_defaults();
        let params = TransformParams::empty();
        let samples = vec![
            TypedValue::Integer(-1234),
            TypedValue::Double(10.5),
            TypedValue::Boolean(true),
            TypedValue::Boolean(false),
            TypedValue::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()),
            TypedValue::DateTime(
                NaiveDate::from_ymd_opt(2024, 3, 15)
                    .unwrap()
                    .and_hms_opt(13, 45, 10)
                    .unwrap(),
            ),
        ];
        for value in samples {
            let text = registry.format_value(&value, &params);
            let back = registry.transform(value.value_type(), &text, &params);
            assert_eq!(back, Some(value), "text = {}", text);
        }
    }
}
