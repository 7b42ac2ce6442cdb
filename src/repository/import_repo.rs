// ==========================================
// 商品导入系统 - 导入 Repository Trait
// ==========================================
// 职责: 定义导入流程所需的数据访问接口（不包含业务逻辑）
// 红线: Repository 不含重复处理规则，只做数据 CRUD
// ==========================================

use crate::domain::entity::ImportableEntity;
use crate::domain::types::EntityType;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

// ==========================================
// ImportRepository Trait
// ==========================================
// 用途: 商品 / 区域价格 / 竞品价格的批量落库与存在性查询
// 实现者: SqliteImportRepository（使用 rusqlite）
#[async_trait]
pub trait ImportRepository: Send + Sync {
    // ===== 批量写入（事务化）=====

    /// 批量写入同一类型的实体
    ///
    /// # 参数
    /// - entities: 实体列表; storage_id 为 Some 时更新, None 时新增
    /// - entity_type: 实体类型（所有实体必须一致）
    ///
    /// # 返回
    /// - Ok(Vec<i64>): 与入参顺序一致的存储 id
    /// - Err: 数据库错误（整个事务回滚）
    ///
    /// # 约束
    /// - 从属实体必须已解析 product_ref, 否则整批拒绝
    async fn save_batch(
        &self,
        entities: Vec<ImportableEntity>,
        entity_type: EntityType,
    ) -> RepositoryResult<Vec<i64>>;

    // ===== 存在性查询 =====

    /// 查询客户下已存在的商品外部编号
    ///
    /// # 返回
    /// - 外部编号 → 存储 id（同一编号存在多条时取最新一条）
    async fn find_existing_external_ids(
        &self,
        client_id: i64,
        external_ids: &[String],
    ) -> RepositoryResult<HashMap<String, i64>>;

    /// 查询指定商品下已存在的从属记录语义键
    ///
    /// # 返回
    /// - (商品存储 id, 区域名 / 竞品站点名) 集合
    async fn find_existing_dependent_keys(
        &self,
        entity_type: EntityType,
        primary_ids: &[i64],
    ) -> RepositoryResult<HashSet<(i64, String)>>;

    // ===== 删除 =====

    /// 删除指定商品下某一类型的全部从属记录
    ///
    /// # 返回
    /// - 删除条数
    async fn delete_by_primary_storage_ids(
        &self,
        entity_type: EntityType,
        primary_ids: &[i64],
    ) -> RepositoryResult<usize>;

    /// 删除某次导入操作写入的全部记录（取消时回滚）
    ///
    /// # 返回
    /// - 删除条数（三类实体合计）
    async fn delete_by_originating_file_id(&self, file_id: i64) -> RepositoryResult<usize>;
}
