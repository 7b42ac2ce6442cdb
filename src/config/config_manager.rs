// ==========================================
// 商品导入系统 - 配置管理器
// ==========================================
// 职责: 导入配置加载、查询、覆写
// 存储: config_kv 表 (scope_id + key + value)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::config::import_settings::ImportSettings;
use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::debug;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&guard)?;
        }

        Ok(Self { conn })
    }

    /// 读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入（覆写）global 作用域配置
    pub fn set_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    fn parse_value<T: FromStr>(key: &str, raw: &str) -> RepositoryResult<T>
    where
        T::Err: std::fmt::Display,
    {
        raw.trim().parse::<T>().map_err(|e| {
            RepositoryError::ValidationError(format!("配置 {} 的值 '{}' 无效: {}", key, raw, e))
        })
    }

    fn parse_char(key: &str, raw: &str) -> RepositoryResult<Option<char>> {
        // 制表符允许以 "\t" 或 "tab" 书写
        let value = match raw {
            "\\t" | "tab" | "TAB" => "\t",
            other => other,
        };
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Ok(None),
            (Some(c), None) => Ok(Some(c)),
            _ => Err(RepositoryError::ValidationError(format!(
                "配置 {} 必须为单个字符: '{}'",
                key, raw
            ))),
        }
    }

    /// 组装导入参数: 默认值 + config_kv 覆写
    pub fn load_import_settings(&self) -> RepositoryResult<ImportSettings> {
        let mut settings = ImportSettings::default();

        if let Some(v) = self.get_config_value(config_keys::DELIMITER)? {
            settings.delimiter = Self::parse_char(config_keys::DELIMITER, &v)?;
        }
        if let Some(v) = self.get_config_value(config_keys::QUOTE_CHAR)? {
            settings.quote_char = Self::parse_char(config_keys::QUOTE_CHAR, &v)?;
        }
        if let Some(v) = self.get_config_value(config_keys::ESCAPE_CHAR)? {
            settings.escape_char = Self::parse_char(config_keys::ESCAPE_CHAR, &v)?;
        }
        if let Some(v) = self.get_config_value(config_keys::CHARSET)? {
            let v = v.trim();
            settings.charset = (!v.is_empty()).then(|| v.to_string());
        }
        if let Some(v) = self.get_config_value(config_keys::BATCH_SIZE)? {
            settings.batch_size = Self::parse_value(config_keys::BATCH_SIZE, &v)?;
        }
        if let Some(v) = self.get_config_value(config_keys::DUPLICATE_HANDLING)? {
            settings.duplicate_handling = Self::parse_value(config_keys::DUPLICATE_HANDLING, &v)?;
        }
        if let Some(v) = self.get_config_value(config_keys::ERROR_HANDLING)? {
            settings.error_handling = Self::parse_value(config_keys::ERROR_HANDLING, &v)?;
        }
        if let Some(v) = self.get_config_value(config_keys::HEADER_ROW)? {
            settings.header_row = Self::parse_value(config_keys::HEADER_ROW, &v)?;
        }
        if let Some(v) = self.get_config_value(config_keys::DATA_START_ROW)? {
            settings.data_start_row = Some(Self::parse_value(config_keys::DATA_START_ROW, &v)?);
        }
        if let Some(v) = self.get_config_value(config_keys::MAX_FILE_SIZE_BYTES)? {
            settings.max_file_size_bytes = Self::parse_value(config_keys::MAX_FILE_SIZE_BYTES, &v)?;
        }
        if let Some(v) = self.get_config_value(config_keys::PROGRESS_PERSIST_INTERVAL_MS)? {
            settings.progress_persist_interval_ms =
                Self::parse_value(config_keys::PROGRESS_PERSIST_INTERVAL_MS, &v)?;
        }

        settings
            .validate()
            .map_err(|e| RepositoryError::ValidationError(e.to_string()))?;

        debug!(settings = ?settings, "导入参数已加载");
        Ok(settings)
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_import_settings(&self) -> RepositoryResult<ImportSettings> {
        self.load_import_settings()
    }

    async fn get_default_client_id(&self) -> RepositoryResult<i64> {
        match self.get_config_value(config_keys::DEFAULT_CLIENT_ID)? {
            Some(v) => Self::parse_value(config_keys::DEFAULT_CLIENT_ID, &v),
            None => Ok(1),
        }
    }
}

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    // 方言覆写
    pub const DELIMITER: &str = "import.delimiter";
    pub const QUOTE_CHAR: &str = "import.quote_char";
    pub const ESCAPE_CHAR: &str = "import.escape_char";
    pub const CHARSET: &str = "import.charset";

    // 处理参数
    pub const BATCH_SIZE: &str = "import.batch_size";
    pub const DUPLICATE_HANDLING: &str = "import.duplicate_handling";
    pub const ERROR_HANDLING: &str = "import.error_handling";
    pub const HEADER_ROW: &str = "import.header_row";
    pub const DATA_START_ROW: &str = "import.data_start_row";

    // 限额
    pub const MAX_FILE_SIZE_BYTES: &str = "import.max_file_size_bytes";
    pub const PROGRESS_PERSIST_INTERVAL_MS: &str = "import.progress_persist_interval_ms";

    // 客户
    pub const DEFAULT_CLIENT_ID: &str = "import.default_client_id";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{DuplicateStrategyKind, ErrorHandling};
    use tempfile::NamedTempFile;

    fn manager() -> (NamedTempFile, ConfigManager) {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let conn = open_sqlite_connection(&path).unwrap();
        crate::db::init_schema(&conn).unwrap();
        drop(conn);
        (file, ConfigManager::new(&path).unwrap())
    }

    #[tokio::test]
    async fn test_defaults_when_table_empty() {
        let (_file, manager) = manager();
        let settings = manager.get_import_settings().await.unwrap();
        assert_eq!(settings, ImportSettings::default());
        assert_eq!(manager.get_default_client_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_overrides_from_config_kv() {
        let (_file, manager) = manager();
        manager.set_config_value(config_keys::DELIMITER, "tab").unwrap();
        manager.set_config_value(config_keys::BATCH_SIZE, "250").unwrap();
        manager
            .set_config_value(config_keys::DUPLICATE_HANDLING, "skip")
            .unwrap();
        manager
            .set_config_value(config_keys::ERROR_HANDLING, "report")
            .unwrap();
        manager.set_config_value(config_keys::DEFAULT_CLIENT_ID, "42").unwrap();

        let settings = manager.get_import_settings().await.unwrap();
        assert_eq!(settings.delimiter, Some('\t'));
        assert_eq!(settings.batch_size, 250);
        assert_eq!(settings.duplicate_handling, DuplicateStrategyKind::Skip);
        assert_eq!(settings.error_handling, ErrorHandling::Report);
        assert_eq!(manager.get_default_client_id().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_invalid_value_is_rejected() {
        let (_file, manager) = manager();
        manager.set_config_value(config_keys::BATCH_SIZE, "many").unwrap();
        assert!(manager.get_import_settings().await.is_err());

        manager.set_config_value(config_keys::BATCH_SIZE, "0").unwrap();
        assert!(manager.get_import_settings().await.is_err());
    }
}
