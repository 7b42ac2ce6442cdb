// ==========================================
// 商品导入系统 - 数值转换器
// ==========================================
// 支持: 逗号小数点、空格/不换行空格分组、locale= 与 pattern= 参数
// ==========================================

use super::{effective_input, TransformParams, TypedValue, ValueTransformer, ValueType};

/// 逗号作小数点的 locale 语言前缀
const COMMA_DECIMAL_LOCALES: &[&str] = &["ru", "uk", "be", "kk", "de", "fr", "es", "it", "pt", "pl", "cs", "nl"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberKind {
    Integral,
    Fractional,
}

/// locale 是否以逗号作小数点; None 表示未指定
fn comma_decimal_locale(params: &TransformParams) -> Option<bool> {
    params.locale().map(|locale| {
        let lang = locale
            .split(['_', '-'])
            .next()
            .unwrap_or("")
            .to_lowercase();
        COMMA_DECIMAL_LOCALES.contains(&lang.as_str())
    })
}

/// 是否形如 `1.234.567`（每个分隔符后恰好三位数字）
fn looks_grouped(value: &str, sep: char) -> bool {
    let mut parts = value.split(sep);
    let head = parts.next().unwrap_or("");
    let head_digits = head.trim_start_matches(['-', '+']);
    !head_digits.is_empty()
        && head_digits.len() <= 3
        && parts.all(|p| p.len() == 3 && p.chars().all(|c| c.is_ascii_digit()))
}

/// 归一化为 Rust 可解析的数字文本
fn normalize_number(raw: &str, kind: NumberKind, comma_decimal: Option<bool>) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}' && *c != '\'')
        .collect();
    if compact.is_empty() {
        return None;
    }

    let has_comma = compact.contains(',');
    let has_dot = compact.contains('.');

    let normalized = match (has_comma, has_dot) {
        (true, true) => {
            // 两种分隔符同时出现: 靠后的是小数点
            let last_comma = compact.rfind(',').unwrap_or(0);
            let last_dot = compact.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                compact.replace('.', "").replace(',', ".")
            } else {
                compact.replace(',', "")
            }
        }
        (true, false) => {
            let comma_is_grouping = match comma_decimal {
                Some(true) => false,
                Some(false) => true,
                None => {
                    compact.matches(',').count() > 1
                        || (kind == NumberKind::Integral && looks_grouped(&compact, ','))
                }
            };
            if comma_is_grouping {
                compact.replace(',', "")
            } else {
                compact.replace(',', ".")
            }
        }
        (false, true) => {
            let dot_is_grouping = compact.matches('.').count() > 1
                || (comma_decimal == Some(true)
                    && kind == NumberKind::Integral
                    && looks_grouped(&compact, '.'));
            if dot_is_grouping {
                compact.replace('.', "")
            } else {
                compact
            }
        }
        (false, false) => compact,
    };

    Some(normalized.trim_start_matches('+').to_string())
}

fn parse_integral(raw: &str, params: &TransformParams) -> Option<i64> {
    let value = effective_input(raw, params)?;
    let normalized = normalize_number(value, NumberKind::Integral, comma_decimal_locale(params))?;
    if let Ok(v) = normalized.parse::<i64>() {
        return Some(v);
    }
    // 带小数部分时截断取整
    let v = normalized.parse::<f64>().ok()?;
    if v.is_finite() && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v.trunc() as i64)
    } else {
        None
    }
}

fn parse_fractional(raw: &str, params: &TransformParams) -> Option<f64> {
    let value = effective_input(raw, params)?;
    let normalized = normalize_number(value, NumberKind::Fractional, comma_decimal_locale(params))?;
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// 从 `#,##0.00` 风格的 pattern 中取小数位数与是否分组
fn pattern_layout(params: &TransformParams) -> (Option<usize>, bool) {
    match params.pattern() {
        Some(pattern) => {
            let decimals = pattern
                .split_once('.')
                .map(|(_, frac)| frac.chars().filter(|c| *c == '0' || *c == '#').count());
            (decimals, pattern.contains(','))
        }
        None => (None, false),
    }
}

fn group_digits(int_part: &str, sep: char) -> String {
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(sep);
        }
        out.push(ch);
    }
    format!("{}{}", sign, out)
}

fn format_number(value: f64, params: &TransformParams, integral: bool) -> String {
    let (decimals, grouped) = pattern_layout(params);
    let comma_decimal = comma_decimal_locale(params).unwrap_or(false);

    let text = match (integral, decimals) {
        (true, None) => format!("{}", value as i64),
        (_, Some(d)) => format!("{:.*}", d, value),
        (false, None) => value.to_string(),
    };

    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (text, None),
    };

    let int_part = if grouped {
        group_digits(&int_part, if comma_decimal { ' ' } else { ',' })
    } else {
        int_part
    };

    match frac_part {
        Some(f) => format!("{}{}{}", int_part, if comma_decimal { ',' } else { '.' }, f),
        None => int_part,
    }
}

// ==========================================
// IntegerTransformer (i32)
// ==========================================
pub struct IntegerTransformer;

impl ValueTransformer for IntegerTransformer {
    fn value_type(&self) -> ValueType {
        ValueType::Integer
    }

    fn transform(&self, raw: &str, params: &TransformParams) -> Option<TypedValue> {
        let v = parse_integral(raw, params)?;
        i32::try_from(v).ok().map(TypedValue::Integer)
    }

    fn format_value(&self, value: &TypedValue, params: &TransformParams) -> String {
        match value.as_i64() {
            Some(v) => format_integral(v, params),
            None => String::new(),
        }
    }
}

// ==========================================
// LongTransformer (i64)
// ==========================================
pub struct LongTransformer;

impl ValueTransformer for LongTransformer {
    fn value_type(&self) -> ValueType {
        ValueType::Long
    }

    fn transform(&self, raw: &str, params: &TransformParams) -> Option<TypedValue> {
        parse_integral(raw, params).map(TypedValue::Long)
    }

    fn format_value(&self, value: &TypedValue, params: &TransformParams) -> String {
        match value.as_i64() {
            Some(v) => format_integral(v, params),
            None => String::new(),
        }
    }
}

fn format_integral(v: i64, params: &TransformParams) -> String {
    let (decimals, grouped) = pattern_layout(params);
    if decimals.is_some() {
        return format_number(v as f64, params, true);
    }
    let text = v.to_string();
    if grouped {
        let comma_decimal = comma_decimal_locale(params).unwrap_or(false);
        group_digits(&text, if comma_decimal { ' ' } else { ',' })
    } else {
        text
    }
}

// ==========================================
// DoubleTransformer (f64)
// ==========================================
pub struct DoubleTransformer;

impl ValueTransformer for DoubleTransformer {
    fn value_type(&self) -> ValueType {
        ValueType::Double
    }

    fn transform(&self, raw: &str, params: &TransformParams) -> Option<TypedValue> {
        parse_fractional(raw, params).map(TypedValue::Double)
    }

    fn format_value(&self, value: &TypedValue, params: &TransformParams) -> String {
        match value.as_f64() {
            Some(v) => format_number(v, params, false),
            None => String::new(),
        }
    }
}
