// ==========================================
// 商品导入系统 - 日期 / 时间转换器
// ==========================================
// 默认格式按顺序尝试, 第一个成功者胜出
// pattern= 可为 Java 风格 (dd.MM.yyyy) 或 chrono 风格 (%d.%m.%Y)
// ==========================================

use super::{effective_input, TransformParams, TypedValue, ValueTransformer, ValueType};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt::{self, Write};

pub const DEFAULT_DATE_PATTERNS: &[&str] = &[
    "dd.MM.yyyy",
    "yyyy-MM-dd",
    "MM/dd/yyyy",
    "dd/MM/yyyy",
    "yyyy/MM/dd",
];

pub const DEFAULT_TIME_PATTERNS: &[&str] = &["HH:mm:ss", "HH:mm", "hh:mm:ss a", "hh:mm a"];

pub const DEFAULT_DATETIME_PATTERNS: &[&str] = &[
    "dd.MM.yyyy HH:mm:ss",
    "yyyy-MM-dd HH:mm:ss",
    "dd.MM.yyyy HH:mm",
    "yyyy-MM-dd HH:mm",
    "dd/MM/yyyy HH:mm:ss",
    "MM/dd/yyyy HH:mm:ss",
];

/// Java DateTimeFormatter 风格 → chrono strftime
///
/// 已含 `%` 的 pattern 原样返回; 单引号包裹的文字按字面输出
pub fn to_chrono_format(pattern: &str) -> String {
    if pattern.contains('%') {
        return pattern.to_string();
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if ch == '\'' {
            // 字面量 'T'
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                out.push(chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == ch {
            run += 1;
        }

        let token = match (ch, run) {
            ('y', 2) => Some("%y"),
            ('y', _) | ('u', _) => Some("%Y"),
            ('M', 1) | ('M', 2) => Some("%m"),
            ('M', 3) => Some("%b"),
            ('M', _) => Some("%B"),
            ('d', _) => Some("%d"),
            ('H', _) => Some("%H"),
            ('h', _) => Some("%I"),
            ('m', _) => Some("%M"),
            ('s', _) => Some("%S"),
            ('S', _) => Some("%3f"),
            ('a', _) => Some("%p"),
            ('E', 1..=3) => Some("%a"),
            ('E', _) => Some("%A"),
            _ => None,
        };

        match token {
            Some(t) => out.push_str(t),
            None => {
                for _ in 0..run {
                    out.push(ch);
                }
            }
        }
        i += run;
    }

    out
}

fn candidate_formats(params: &TransformParams, defaults: &[&str]) -> Vec<String> {
    match params.pattern() {
        Some(p) => vec![to_chrono_format(p)],
        None => defaults.iter().map(|p| to_chrono_format(p)).collect(),
    }
}

fn output_format(params: &TransformParams, defaults: &[&str]) -> String {
    to_chrono_format(params.pattern().or_else(|| defaults.first().copied()).unwrap_or(""))
}

/// 非法 pattern 时 chrono 的 Display 返回错误, 此处吞掉并输出空串
fn render(item: impl fmt::Display) -> String {
    let mut out = String::new();
    if write!(out, "{}", item).is_err() {
        out.clear();
    }
    out
}

// ==========================================
// DateTransformer (NaiveDate)
// ==========================================
pub struct DateTransformer;

impl ValueTransformer for DateTransformer {
    fn value_type(&self) -> ValueType {
        ValueType::Date
    }

    fn transform(&self, raw: &str, params: &TransformParams) -> Option<TypedValue> {
        let value = effective_input(raw, params)?;
        candidate_formats(params, DEFAULT_DATE_PATTERNS)
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
            .map(TypedValue::Date)
    }

    fn format_value(&self, value: &TypedValue, params: &TransformParams) -> String {
        match value {
            TypedValue::Date(d) => render(d.format(&output_format(params, DEFAULT_DATE_PATTERNS))),
            TypedValue::DateTime(dt) => {
                render(dt.date().format(&output_format(params, DEFAULT_DATE_PATTERNS)))
            }
            _ => String::new(),
        }
    }
}

// ==========================================
// TimeTransformer (NaiveTime)
// ==========================================
pub struct TimeTransformer;

impl ValueTransformer for TimeTransformer {
    fn value_type(&self) -> ValueType {
        ValueType::Time
    }

    fn transform(&self, raw: &str, params: &TransformParams) -> Option<TypedValue> {
        let value = effective_input(raw, params)?;
        candidate_formats(params, DEFAULT_TIME_PATTERNS)
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(value, fmt).ok())
            .map(TypedValue::Time)
    }

    fn format_value(&self, value: &TypedValue, params: &TransformParams) -> String {
        match value {
            TypedValue::Time(t) => render(t.format(&output_format(params, DEFAULT_TIME_PATTERNS))),
            _ => String::new(),
        }
    }
}

// ==========================================
// DateTimeTransformer (NaiveDateTime)
// ==========================================
pub struct DateTimeTransformer;

impl ValueTransformer for DateTimeTransformer {
    fn value_type(&self) -> ValueType {
        ValueType::DateTime
    }

    fn transform(&self, raw: &str, params: &TransformParams) -> Option<TypedValue> {
        let value = effective_input(raw, params)?;
        candidate_formats(params, DEFAULT_DATETIME_PATTERNS)
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(TypedValue::DateTime)
    }

    fn format_value(&self, value: &TypedValue, params: &TransformParams) -> String {
        match value {
            TypedValue::DateTime(dt) => {
                render(dt.format(&output_format(params, DEFAULT_DATETIME_PATTERNS)))
            }
            _ => String::new(),
        }
    }
}
