use super::core::{dependent_table, SqliteImportRepository};
use crate::domain::competitor::Competitor;
use crate::domain::product::Product;
use crate::domain::region::Region;
use crate::domain::types::EntityType;
use crate::repository::error::RepositoryResult;
use rusqlite::{params, Result as SqliteResult, Row};

impl SqliteImportRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 按实体类型统计记录数
    pub fn count(&self, entity_type: EntityType) -> RepositoryResult<usize> {
        let table = match entity_type {
            EntityType::Product => "product",
            other => dependent_table(other)?,
        };
        let conn = self.get_conn()?;
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// 查询客户的全部商品（按存储 id 升序）
    pub fn find_products_by_client(&self, client_id: i64) -> RepositoryResult<Vec<Product>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, client_id, file_id, data_source, product_id, product_name, product_brand,
                   product_bar, product_description, product_url, product_category1,
                   product_category2, product_category3, product_price, product_analog,
                   product_additional1, product_additional2, product_additional3,
                   product_additional4, product_additional5
            FROM product
            WHERE client_id = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![client_id], map_product_row)?;
        Ok(rows.collect::<SqliteResult<Vec<_>>>()?)
    }

    /// 查询商品下的区域价格
    pub fn find_regions_by_product(&self, product_ref: i64) -> RepositoryResult<Vec<Region>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, client_id, file_id, product_ref, region, region_address, region_price
            FROM region
            WHERE product_ref = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![product_ref], |row| {
            Ok(Region {
                id: Some(row.get(0)?),
                client_id: row.get(1)?,
                file_id: row.get(2)?,
                product_ref: Some(row.get(3)?),
                product_external_id: None,
                region: row.get(4)?,
                region_address: row.get(5)?,
                region_price: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<SqliteResult<Vec<_>>>()?)
    }

    /// 查询商品下的竞品价格
    pub fn find_competitors_by_product(
        &self,
        product_ref: i64,
    ) -> RepositoryResult<Vec<Competitor>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, client_id, file_id, product_ref, competitor_name, competitor_price,
                   competitor_promotional_price, competitor_additional_price, competitor_time,
                   competitor_date, competitor_local_date_time, competitor_stock_status,
                   competitor_commentary, competitor_product_name, competitor_additional,
                   competitor_additional2, competitor_url, competitor_web_cache_url
            FROM competitor
            WHERE product_ref = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![product_ref], |row| {
            Ok(Competitor {
                id: Some(row.get(0)?),
                client_id: row.get(1)?,
                file_id: row.get(2)?,
                product_ref: Some(row.get(3)?),
                product_external_id: None,
                competitor_name: row.get(4)?,
                competitor_price: row.get(5)?,
                competitor_promotional_price: row.get(6)?,
                competitor_additional_price: row.get(7)?,
                competitor_time: row.get(8)?,
                competitor_date: row.get(9)?,
                competitor_local_date_time: row.get(10)?,
                competitor_stock_status: row.get(11)?,
                competitor_commentary: row.get(12)?,
                competitor_product_name: row.get(13)?,
                competitor_additional: row.get(14)?,
                competitor_additional2: row.get(15)?,
                competitor_url: row.get(16)?,
                competitor_web_cache_url: row.get(17)?,
            })
        })?;
        Ok(rows.collect::<SqliteResult<Vec<_>>>()?)
    }
}

fn map_product_row(row: &Row) -> SqliteResult<Product> {
    Ok(Product {
        id: Some(row.get(0)?),
        client_id: row.get(1)?,
        file_id: row.get(2)?,
        data_source: row.get(3)?,
        product_id: row.get(4)?,
        product_name: row.get(5)?,
        product_brand: row.get(6)?,
        product_bar: row.get(7)?,
        product_description: row.get(8)?,
        product_url: row.get(9)?,
        product_category1: row.get(10)?,
        product_category2: row.get(11)?,
        product_category3: row.get(12)?,
        product_price: row.get(13)?,
        product_analog: row.get(14)?,
        product_additional1: row.get(15)?,
        product_additional2: row.get(16)?,
        product_additional3: row.get(17)?,
        product_additional4: row.get(18)?,
        product_additional5: row.get(19)?,
    })
}
