// ==========================================
// 商品导入系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::import_settings::ImportSettings;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入模块所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 获取导入参数（未配置的项取默认值）
    async fn get_import_settings(&self) -> RepositoryResult<ImportSettings>;

    /// 获取默认客户 id
    ///
    /// # 默认值
    /// - 1
    async fn get_default_client_id(&self) -> RepositoryResult<i64>;
}
