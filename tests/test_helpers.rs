// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 内存数据库 + 共享连接的导入环境、临时 CSV 文件、常用映射
// ==========================================
#![allow(dead_code)]

use product_import::config::ConfigManager;
use product_import::db::open_and_init;
use product_import::repository::{ImportRepository, SqliteImportRepository, SqliteStatusStore};
use product_import::ImportOrchestrator;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// 测试客户
pub const CLIENT: i64 = 1;

/// 导入测试环境
///
/// 仓储 / 状态存储 / 配置共享同一条内存连接
pub struct TestEnv {
    pub dir: TempDir,
    pub conn: Arc<Mutex<Connection>>,
    pub repository: Arc<SqliteImportRepository>,
    pub status_store: Arc<SqliteStatusStore>,
    pub config: Arc<ConfigManager>,
}

impl TestEnv {
    pub fn new() -> Self {
        let conn = Arc::new(Mutex::new(
            open_and_init(":memory:").expect("Failed to init in-memory db"),
        ));
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            repository: Arc::new(SqliteImportRepository::from_connection(conn.clone())),
            status_store: Arc::new(SqliteStatusStore::from_connection(conn.clone())),
            config: Arc::new(
                ConfigManager::from_connection(conn.clone()).expect("Failed to create config"),
            ),
            conn,
        }
    }

    /// 使用默认仓储的编排器
    pub fn orchestrator(&self) -> ImportOrchestrator {
        self.orchestrator_with(self.repository.clone())
    }

    /// 使用自定义仓储（如带闸门的包装）的编排器
    pub fn orchestrator_with(&self, repository: Arc<dyn ImportRepository>) -> ImportOrchestrator {
        ImportOrchestrator::new(repository, self.status_store.clone(), self.config.clone())
    }

    /// 在临时目录写入文件
    pub fn write_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("Failed to write test file");
        path
    }

    pub fn write_csv(&self, name: &str, content: &str) -> PathBuf {
        self.write_file(name, content.as_bytes())
    }

    /// 表行数
    pub fn count(&self, table: &str) -> i64 {
        let conn = self.conn.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    /// 某商品下的区域 (名称, 价格), 按 id 排序
    pub fn regions_of(&self, external_id: &str) -> Vec<(String, Option<f64>)> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT r.region, r.region_price
                FROM region r JOIN product p ON p.id = r.product_ref
                WHERE p.product_id = ?1
                ORDER BY r.id
                "#,
            )
            .unwrap();
        let regions = stmt
            .query_map([external_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        regions
    }
}

/// 复合导入映射: 商品 + 区域
pub fn composite_mapping() -> Vec<(&'static str, &'static str)> {
    vec![
        ("product_id", "product.product_id"),
        ("product_name", "product.product_name"),
        ("region", "region.region"),
        ("region_price", "region.region_price"),
    ]
}

/// 生成 n 行复合导入数据（每行一个独立商品）
pub fn composite_csv(rows: usize) -> String {
    let mut content = String::from("product_id,product_name,region,region_price\n");
    for i in 0..rows {
        content.push_str(&format!("P{:05},Item {},Region {},{}.25\n", i, i, i % 7, i));
    }
    content
}
