// ==========================================
// 商品导入系统 - 导入 Repository 实现
// ==========================================
// 职责: 实现 ImportRepository（使用 rusqlite）
// 存储: product / region / competitor 表
// 红线: Repository 不含重复处理规则，只做数据 CRUD
// ==========================================

mod core;
mod queries;

#[cfg(test)]
mod tests;

pub use self::core::SqliteImportRepository;
