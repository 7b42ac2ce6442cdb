// ==========================================
// 商品导入系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 初始化致命错误 / 落库错误 / 流程控制
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .csv/.xls/.xlsx）")]
    UnsupportedFormat(String),

    #[error("文件为空或无法读取: {0}")]
    EmptyFile(String),

    #[error("文件过大: {size} 字节, 上限 {limit} 字节")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 方言 / 映射 / 表头错误 =====
    #[error("方言识别失败: {0}")]
    DialectError(String),

    #[error("字段映射无效 (表头 {header}): {message}")]
    FieldMappingError { header: String, message: String },

    #[error("必填字段缺少表头映射: {0}")]
    MissingRequiredFields(String),

    // ===== 落库错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 流程控制 =====
    #[error("导入已取消: {0}")]
    Cancelled(String),

    #[error("errorHandling=stop, 导入终止: {0}")]
    StoppedOnError(String),

    #[error("非法状态迁移: {from} → {to}")]
    InvalidStateTransition { from: String, to: String },

    // ===== 配置错误 =====
    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl ImportError {
    /// 是否为初始化阶段的致命错误（未处理任何行）
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            ImportError::FileNotFound(_)
                | ImportError::UnsupportedFormat(_)
                | ImportError::EmptyFile(_)
                | ImportError::FileTooLarge { .. }
                | ImportError::DialectError(_)
                | ImportError::FieldMappingError { .. }
                | ImportError::MissingRequiredFields(_)
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Repository(RepositoryError::from(err))
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::InternalError(format!("JSON 处理失败: {}", err))
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
