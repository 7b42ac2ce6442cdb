use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::competitor::Competitor;
use crate::domain::entity::ImportableEntity;
use crate::domain::product::Product;
use crate::domain::region::Region;
use crate::domain::types::EntityType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_repo::ImportRepository;
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// IN (...) 子句单次绑定的参数上限
const IN_CLAUSE_CHUNK: usize = 500;

pub(super) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// 从属实体对应的表名
pub(super) fn dependent_table(entity_type: EntityType) -> RepositoryResult<&'static str> {
    match entity_type {
        EntityType::Region => Ok("region"),
        EntityType::Competitor => Ok("competitor"),
        EntityType::Product => Err(RepositoryError::ValidationError(
            "商品不是从属实体".to_string(),
        )),
    }
}

fn dependent_key_column(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Competitor => "competitor_name",
        _ => "region",
    }
}

// ==========================================
// SqliteImportRepository
// ==========================================
pub struct SqliteImportRepository {
    pub(super) conn: Arc<Mutex<Connection>>,
}

impl SqliteImportRepository {
    /// 创建新的 Repository 实例（确保表结构存在）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（与 StatusStore / ConfigManager 共享连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub(super) fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 事务内写入
    // ==========================================

    fn save_entity_tx(tx: &Transaction, entity: &ImportableEntity) -> RepositoryResult<i64> {
        match entity {
            ImportableEntity::Product(p) => match p.id {
                Some(id) => Self::update_product_tx(tx, id, p),
                None => Self::insert_product_tx(tx, p),
            },
            ImportableEntity::Region(r) => {
                let product_ref = Self::require_product_ref(r.product_ref, "区域价格")?;
                match r.id {
                    Some(id) => Self::update_region_tx(tx, id, product_ref, r),
                    None => Self::insert_region_tx(tx, product_ref, r),
                }
            }
            ImportableEntity::Competitor(c) => {
                let product_ref = Self::require_product_ref(c.product_ref, "竞品价格")?;
                match c.id {
                    Some(id) => Self::update_competitor_tx(tx, id, product_ref, c),
                    None => Self::insert_competitor_tx(tx, product_ref, c),
                }
            }
        }
    }

    fn require_product_ref(product_ref: Option<i64>, label: &str) -> RepositoryResult<i64> {
        product_ref.ok_or_else(|| {
            RepositoryError::ValidationError(format!("{} 未关联商品存储 id", label))
        })
    }

    fn ensure_updated(changed: usize, entity: &str, id: i64) -> RepositoryResult<i64> {
        if changed == 0 {
            return Err(RepositoryError::NotFound {
                entity: entity.to_string(),
                id: id.to_string(),
            });
        }
        Ok(id)
    }

    fn insert_product_tx(tx: &Transaction, p: &Product) -> RepositoryResult<i64> {
        let mut stmt = tx.prepare_cached(
            r#"
            INSERT INTO product (
                client_id, file_id, data_source, product_id, product_name, product_brand,
                product_bar, product_description, product_url, product_category1,
                product_category2, product_category3, product_price, product_analog,
                product_additional1, product_additional2, product_additional3,
                product_additional4, product_additional5
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
        )?;
        stmt.execute(params![
            p.client_id,
            p.file_id,
            p.data_source,
            p.product_id,
            p.product_name,
            p.product_brand,
            p.product_bar,
            p.product_description,
            p.product_url,
            p.product_category1,
            p.product_category2,
            p.product_category3,
            p.product_price,
            p.product_analog,
            p.product_additional1,
            p.product_additional2,
            p.product_additional3,
            p.product_additional4,
            p.product_additional5,
        ])?;
        Ok(tx.last_insert_rowid())
    }

    // file_id 保留首次写入的操作 id, 回滚只删除本次新建的记录
    fn update_product_tx(tx: &Transaction, id: i64, p: &Product) -> RepositoryResult<i64> {
        let mut stmt = tx.prepare_cached(
            r#"
            UPDATE product SET
                client_id = ?1, data_source = ?2, product_id = ?3, product_name = ?4,
                product_brand = ?5, product_bar = ?6, product_description = ?7,
                product_url = ?8, product_category1 = ?9, product_category2 = ?10,
                product_category3 = ?11, product_price = ?12, product_analog = ?13,
                product_additional1 = ?14, product_additional2 = ?15,
                product_additional3 = ?16, product_additional4 = ?17,
                product_additional5 = ?18, updated_at = datetime('now')
            WHERE id = ?19
            "#,
        )?;
        let changed = stmt.execute(params![
            p.client_id,
            p.data_source,
            p.product_id,
            p.product_name,
            p.product_brand,
            p.product_bar,
            p.product_description,
            p.product_url,
            p.product_category1,
            p.product_category2,
            p.product_category3,
            p.product_price,
            p.product_analog,
            p.product_additional1,
            p.product_additional2,
            p.product_additional3,
            p.product_additional4,
            p.product_additional5,
            id,
        ])?;
        Self::ensure_updated(changed, "product", id)
    }

    fn insert_region_tx(tx: &Transaction, product_ref: i64, r: &Region) -> RepositoryResult<i64> {
        let mut stmt = tx.prepare_cached(
            r#"
            INSERT INTO region (client_id, file_id, product_ref, region, region_address, region_price)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )?;
        stmt.execute(params![
            r.client_id,
            r.file_id,
            product_ref,
            r.region,
            r.region_address,
            r.region_price,
        ])?;
        Ok(tx.last_insert_rowid())
    }

    fn update_region_tx(
        tx: &Transaction,
        id: i64,
        product_ref: i64,
        r: &Region,
    ) -> RepositoryResult<i64> {
        let mut stmt = tx.prepare_cached(
            r#"
            UPDATE region SET client_id = ?1, product_ref = ?2, region = ?3,
                region_address = ?4, region_price = ?5
            WHERE id = ?6
            "#,
        )?;
        let changed = stmt.execute(params![
            r.client_id,
            product_ref,
            r.region,
            r.region_address,
            r.region_price,
            id,
        ])?;
        Self::ensure_updated(changed, "region", id)
    }

    fn insert_competitor_tx(
        tx: &Transaction,
        product_ref: i64,
        c: &Competitor,
    ) -> RepositoryResult<i64> {
        let mut stmt = tx.prepare_cached(
            r#"
            INSERT INTO competitor (
                client_id, file_id, product_ref, competitor_name, competitor_price,
                competitor_promotional_price, competitor_additional_price, competitor_time,
                competitor_date, competitor_local_date_time, competitor_stock_status,
                competitor_commentary, competitor_product_name, competitor_additional,
                competitor_additional2, competitor_url, competitor_web_cache_url
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )?;
        stmt.execute(params![
            c.client_id,
            c.file_id,
            product_ref,
            c.competitor_name,
            c.competitor_price,
            c.competitor_promotional_price,
            c.competitor_additional_price,
            c.competitor_time,
            c.competitor_date,
            c.competitor_local_date_time,
            c.competitor_stock_status,
            c.competitor_commentary,
            c.competitor_product_name,
            c.competitor_additional,
            c.competitor_additional2,
            c.competitor_url,
            c.competitor_web_cache_url,
        ])?;
        Ok(tx.last_insert_rowid())
    }

    fn update_competitor_tx(
        tx: &Transaction,
        id: i64,
        product_ref: i64,
        c: &Competitor,
    ) -> RepositoryResult<i64> {
        let mut stmt = tx.prepare_cached(
            r#"
            UPDATE competitor SET
                client_id = ?1, product_ref = ?2, competitor_name = ?3, competitor_price = ?4,
                competitor_promotional_price = ?5, competitor_additional_price = ?6,
                competitor_time = ?7, competitor_date = ?8, competitor_local_date_time = ?9,
                competitor_stock_status = ?10, competitor_commentary = ?11,
                competitor_product_name = ?12, competitor_additional = ?13,
                competitor_additional2 = ?14, competitor_url = ?15,
                competitor_web_cache_url = ?16
            WHERE id = ?17
            "#,
        )?;
        let changed = stmt.execute(params![
            c.client_id,
            product_ref,
            c.competitor_name,
            c.competitor_price,
            c.competitor_promotional_price,
            c.competitor_additional_price,
            c.competitor_time,
            c.competitor_date,
            c.competitor_local_date_time,
            c.competitor_stock_status,
            c.competitor_commentary,
            c.competitor_product_name,
            c.competitor_additional,
            c.competitor_additional2,
            c.competitor_url,
            c.competitor_web_cache_url,
            id,
        ])?;
        Self::ensure_updated(changed, "competitor", id)
    }
}

#[async_trait]
impl ImportRepository for SqliteImportRepository {
    async fn save_batch(
        &self,
        entities: Vec<ImportableEntity>,
        entity_type: EntityType,
    ) -> RepositoryResult<Vec<i64>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(other) = entities.iter().find(|e| e.entity_type() != entity_type) {
            return Err(RepositoryError::ValidationError(format!(
                "批次实体类型不一致: 期望 {}, 实际 {}",
                entity_type,
                other.entity_type()
            )));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(entities.len());
        for entity in &entities {
            ids.push(Self::save_entity_tx(&tx, entity)?);
        }
        tx.commit()?;

        debug!(entity = %entity_type, count = ids.len(), "批次已落库");
        Ok(ids)
    }

    async fn find_existing_external_ids(
        &self,
        client_id: i64,
        external_ids: &[String],
    ) -> RepositoryResult<HashMap<String, i64>> {
        let mut found = HashMap::new();
        if external_ids.is_empty() {
            return Ok(found);
        }

        let conn = self.get_conn()?;
        for chunk in external_ids.chunks(IN_CLAUSE_CHUNK) {
            let sql = format!(
                "SELECT product_id, MAX(id) FROM product \
                 WHERE client_id = ? AND product_id IN ({}) GROUP BY product_id",
                placeholders(chunk.len())
            );
            let mut values = Vec::with_capacity(chunk.len() + 1);
            values.push(Value::Integer(client_id));
            values.extend(chunk.iter().map(|id| Value::Text(id.clone())));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (external_id, id) = row?;
                found.insert(external_id, id);
            }
        }
        Ok(found)
    }

    async fn find_existing_dependent_keys(
        &self,
        entity_type: EntityType,
        primary_ids: &[i64],
    ) -> RepositoryResult<HashSet<(i64, String)>> {
        let table = dependent_table(entity_type)?;
        let column = dependent_key_column(entity_type);
        let mut keys = HashSet::new();
        if primary_ids.is_empty() {
            return Ok(keys);
        }

        let conn = self.get_conn()?;
        for chunk in primary_ids.chunks(IN_CLAUSE_CHUNK) {
            let sql = format!(
                "SELECT product_ref, {} FROM {} WHERE product_ref IN ({})",
                column,
                table,
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                keys.insert(row?);
            }
        }
        Ok(keys)
    }

    async fn delete_by_primary_storage_ids(
        &self,
        entity_type: EntityType,
        primary_ids: &[i64],
    ) -> RepositoryResult<usize> {
        let table = dependent_table(entity_type)?;
        if primary_ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for chunk in primary_ids.chunks(IN_CLAUSE_CHUNK) {
            let sql = format!(
                "DELETE FROM {} WHERE product_ref IN ({})",
                table,
                placeholders(chunk.len())
            );
            deleted += tx.execute(&sql, params_from_iter(chunk.iter()))?;
        }
        tx.commit()?;

        debug!(entity = %entity_type, primaries = primary_ids.len(), deleted, "从属记录已删除");
        Ok(deleted)
    }

    async fn delete_by_originating_file_id(&self, file_id: i64) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        // 先删从属记录, 再删商品（级联删除其余从属记录）
        let competitors = tx.execute("DELETE FROM competitor WHERE file_id = ?1", params![file_id])?;
        let regions = tx.execute("DELETE FROM region WHERE file_id = ?1", params![file_id])?;
        let products = tx.execute("DELETE FROM product WHERE file_id = ?1", params![file_id])?;
        tx.commit()?;

        debug!(file_id, products, regions, competitors, "按来源操作回滚");
        Ok(products + regions + competitors)
    }
}
