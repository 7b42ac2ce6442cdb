// ==========================================
// 商品导入系统 - 字符串 / 布尔转换器
// ==========================================

use super::{effective_input, TransformParams, TypedValue, ValueTransformer, ValueType};

// ==========================================
// StringTransformer
// ==========================================
// 参数: trim=false 保留首尾空白
pub struct StringTransformer;

impl ValueTransformer for StringTransformer {
    fn value_type(&self) -> ValueType {
        ValueType::String
    }

    fn transform(&self, raw: &str, params: &TransformParams) -> Option<TypedValue> {
        let keep_whitespace = params
            .get("trim")
            .map(|v| v.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(false);

        if keep_whitespace && !raw.trim().is_empty() {
            return Some(TypedValue::String(raw.to_string()));
        }

        effective_input(raw, params).map(|s| TypedValue::String(s.to_string()))
    }

    fn format_value(&self, value: &TypedValue, _params: &TransformParams) -> String {
        match value {
            TypedValue::String(s) => s.clone(),
            TypedValue::Enum { variant, .. } => variant.clone(),
            TypedValue::Integer(v) => v.to_string(),
            TypedValue::Long(v) => v.to_string(),
            TypedValue::Double(v) => v.to_string(),
            TypedValue::Boolean(v) => v.to_string(),
            TypedValue::Date(v) => v.to_string(),
            TypedValue::Time(v) => v.to_string(),
            TypedValue::DateTime(v) => v.to_string(),
        }
    }
}

// ==========================================
// BooleanTransformer
// ==========================================
// 参数: true=值1,值2 / false=值1,值2 扩展词表, 同时决定输出文本
const TRUE_VALUES: &[&str] = &[
    "true", "yes", "y", "1", "да", "д", "истина", "вкл", "on", "включено",
];
const FALSE_VALUES: &[&str] = &[
    "false", "no", "n", "0", "нет", "н", "ложь", "выкл", "off", "выключено",
];

pub struct BooleanTransformer;

impl BooleanTransformer {
    fn custom_values<'a>(params: &'a TransformParams, key: &str) -> Vec<&'a str> {
        params
            .get(key)
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    fn matches(value: &str, builtin: &[&str], custom: &[&str]) -> bool {
        let lowered = value.to_lowercase();
        builtin.iter().any(|b| *b == lowered)
            || custom.iter().any(|c| c.to_lowercase() == lowered)
    }
}

impl ValueTransformer for BooleanTransformer {
    fn value_type(&self) -> ValueType {
        ValueType::Boolean
    }

    fn transform(&self, raw: &str, params: &TransformParams) -> Option<TypedValue> {
        let value = effective_input(raw, params)?;
        let custom_true = Self::custom_values(params, "true");
        let custom_false = Self::custom_values(params, "false");

        // 自定义词表优先于内置词表
        if Self::matches(value, &[], &custom_true) {
            return Some(TypedValue::Boolean(true));
        }
        if Self::matches(value, &[], &custom_false) {
            return Some(TypedValue::Boolean(false));
        }
        if Self::matches(value, TRUE_VALUES, &[]) {
            return Some(TypedValue::Boolean(true));
        }
        if Self::matches(value, FALSE_VALUES, &[]) {
            return Some(TypedValue::Boolean(false));
        }
        None
    }

    fn format_value(&self, value: &TypedValue, params: &TransformParams) -> String {
        let Some(flag) = value.as_bool() else {
            return String::new();
        };
        let key = if flag { "true" } else { "false" };
        Self::custom_values(params, key)
            .first()
            .map(|s| s.to_string())
            .unwrap_or_else(|| flag.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_trims_by_default() {
        let t = StringTransformer;
        assert_eq!(
            t.transform("  Молоко  ", &TransformParams::empty()),
            Some(TypedValue::String("Молоко".to_string()))
        );
        assert_eq!(
            t.transform("  a ", &TransformParams::parse("trim=false")),
            Some(TypedValue::String("  a ".to_string()))
        );
        assert_eq!(
            t.transform("", &TransformParams::parse("default=нет данных")),
            Some(TypedValue::String("нет данных".to_string()))
        );
    }

    #[test]
    fn test_boolean_vocabulary() {
        let t = BooleanTransformer;
        let p = TransformParams::empty();
        for raw in ["true", "YES", "Да", "вкл", "1", "On"] {
            assert_eq!(t.transform(raw, &p), Some(TypedValue::Boolean(true)), "{}", raw);
        }
        for raw in ["false", "No", "НЕТ", "выкл", "0", "off"] {
            assert_eq!(t.transform(raw, &p), Some(TypedValue::Boolean(false)), "{}", raw);
        }
        assert_eq!(t.transform("maybe", &p), None);
        assert!(!t.can_transform("maybe", &p));
    }

    #[test]
    fn test_boolean_custom_params() {
        let t = BooleanTransformer;
        let p = TransformParams::parse("true=В наличии,Есть|false=Нет в наличии");
        assert_eq!(t.transform("есть", &p), Some(TypedValue::Boolean(true)));
        assert_eq!(t.transform("Нет в наличии", &p), Some(TypedValue::Boolean(false)));
        assert_eq!(t.format_value(&TypedValue::Boolean(true), &p), "В наличии");
        assert_eq!(
            t.format_value(&TypedValue::Boolean(false), &TransformParams::empty()),
            "false"
        );
    }
}
