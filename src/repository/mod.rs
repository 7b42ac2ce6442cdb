// ==========================================
// 商品导入系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod import_repo;
pub mod import_repo_impl;
pub mod status_store;
pub mod status_store_impl;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use import_repo::ImportRepository;
pub use import_repo_impl::SqliteImportRepository;
pub use status_store::StatusStore;
pub use status_store_impl::SqliteStatusStore;
