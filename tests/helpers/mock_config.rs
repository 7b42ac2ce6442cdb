// ==========================================
// Mock 配置实现 - 用于集成测试
// ==========================================

use async_trait::async_trait;
use product_import::config::{ImportConfigReader, ImportSettings};
use product_import::repository::RepositoryResult;

/// 固定参数的配置源
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub settings: ImportSettings,
    pub default_client_id: i64,
}

impl MockConfig {
    pub fn new(settings: ImportSettings) -> Self {
        Self {
            settings,
            default_client_id: 1,
        }
    }

    /// 小批量配置（便于覆盖多块处理）
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self::new(ImportSettings {
            batch_size,
            ..ImportSettings::default()
        })
    }
}

#[async_trait]
impl ImportConfigReader for MockConfig {
    async fn get_import_settings(&self) -> RepositoryResult<ImportSettings> {
        Ok(self.settings.clone())
    }

    async fn get_default_client_id(&self) -> RepositoryResult<i64> {
        Ok(self.default_client_id)
    }
}
