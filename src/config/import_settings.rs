// ==========================================
// 商品导入系统 - 导入参数
// ==========================================
// 职责: 已解析的导入配置（方言覆写、批大小、重复策略、错误处理、行号）
// 约束: 所有字段均有默认值, 可由 JSON / config_kv 局部覆写
// ==========================================

use crate::domain::operation::DEFAULT_MAX_REPORTED_ERRORS;
use crate::domain::types::{DuplicateStrategyKind, ErrorHandling};
use crate::importer::error::{ImportError, ImportResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 600 * 1024 * 1024;
pub const DEFAULT_SAMPLE_BYTES: usize = 10 * 1024;
pub const DEFAULT_SAMPLE_LINES: usize = 50;
pub const DEFAULT_PROGRESS_PERSIST_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    // ===== 方言覆写（None = 自动识别）=====
    pub delimiter: Option<char>,
    pub quote_char: Option<char>,
    pub escape_char: Option<char>,
    pub charset: Option<String>,

    // ===== 处理参数 =====
    pub batch_size: usize,
    pub duplicate_handling: DuplicateStrategyKind,
    pub error_handling: ErrorHandling,
    /// 表头所在记录序号（从 0 开始）
    pub header_row: usize,
    /// 首个数据记录序号; None = header_row + 1
    pub data_start_row: Option<usize>,

    // ===== 限额 =====
    pub max_file_size_bytes: u64,
    pub sample_bytes: usize,
    pub sample_lines: usize,
    pub progress_persist_interval_ms: u64,
    pub max_reported_errors: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote_char: None,
            escape_char: None,
            charset: None,
            batch_size: DEFAULT_BATCH_SIZE,
            duplicate_handling: DuplicateStrategyKind::default(),
            error_handling: ErrorHandling::default(),
            header_row: 0,
            data_start_row: None,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            sample_bytes: DEFAULT_SAMPLE_BYTES,
            sample_lines: DEFAULT_SAMPLE_LINES,
            progress_persist_interval_ms: DEFAULT_PROGRESS_PERSIST_INTERVAL_MS,
            max_reported_errors: DEFAULT_MAX_REPORTED_ERRORS,
        }
    }
}

impl ImportSettings {
    /// 从 JSON 文档解析, 未出现的字段取默认值
    pub fn from_json(raw: &str) -> ImportResult<Self> {
        let settings: ImportSettings =
            serde_json::from_str(raw).map_err(|e| ImportError::ConfigValueError {
                key: "import".to_string(),
                value: raw.chars().take(200).collect(),
                message: e.to_string(),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn effective_data_start_row(&self) -> usize {
        self.data_start_row.unwrap_or(self.header_row + 1)
    }

    pub fn validate(&self) -> ImportResult<()> {
        if self.batch_size == 0 {
            return Err(ImportError::ConfigValueError {
                key: "batch_size".to_string(),
                value: "0".to_string(),
                message: "批大小必须大于 0".to_string(),
            });
        }
        if self.effective_data_start_row() <= self.header_row {
            return Err(ImportError::ConfigValueError {
                key: "data_start_row".to_string(),
                value: self.effective_data_start_row().to_string(),
                message: format!("数据起始行必须大于表头行 {}", self.header_row),
            });
        }
        for (key, value) in [
            ("delimiter", self.delimiter),
            ("quote_char", self.quote_char),
            ("escape_char", self.escape_char),
        ] {
            if let Some(c) = value {
                if !c.is_ascii() {
                    return Err(ImportError::ConfigValueError {
                        key: key.to_string(),
                        value: c.to_string(),
                        message: "仅支持 ASCII 字符".to_string(),
                    });
                }
            }
        }
        if self.max_reported_errors == 0 {
            return Err(ImportError::ConfigValueError {
                key: "max_reported_errors".to_string(),
                value: "0".to_string(),
                message: "错误清单上限必须大于 0".to_string(),
            });
        }
        Ok(())
    }
}
