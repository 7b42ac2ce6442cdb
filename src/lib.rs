// ==========================================
// 商品导入系统 - 核心库
// ==========================================
// 职责: 商品 / 区域价格 / 竞品价格 的文件导入管道
// 技术栈: Rust + SQLite (rusqlite) + tokio
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 导入参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    DuplicateStrategyKind, EntityType, ErrorHandling, ImportState, ImportTarget, OperationStatus,
};

// 领域实体
pub use domain::{Competitor, ImportSummary, ImportableEntity, OperationRecord, Product, Region};

// 导入
pub use importer::{ImportError, ImportOrchestrator, ImportRequest, ImportResult};

// 仓储
pub use repository::{ImportRepository, SqliteImportRepository, SqliteStatusStore, StatusStore};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "商品导入系统";
