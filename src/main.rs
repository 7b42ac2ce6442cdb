// ==========================================
// 商品导入系统 - 命令行入口
// ==========================================
// 用法:
//   product-import <file> [--target product|region|competitor|composite]
//                         [--strategy IGNORE|SKIP|OVERRIDE] [--client <id>] [--db <path>]
// 输出: 导入汇总 (JSON)
// ==========================================

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use product_import::config::ConfigManager;
use product_import::{
    db, logging, DuplicateStrategyKind, ImportOrchestrator, ImportRequest, ImportTarget,
    OperationStatus, SqliteImportRepository, SqliteStatusStore,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// 数据库路径环境变量
const DB_PATH_ENV: &str = "PRODUCT_IMPORT_DB_PATH";

#[derive(Debug, Parser)]
#[command(name = "product-import", version)]
#[command(about = "导入商品 / 区域 / 竞品数据（CSV, XLS, XLSX）")]
struct Cli {
    /// 待导入文件
    file: PathBuf,

    /// 导入目标
    #[arg(long, value_enum, default_value_t = TargetArg::Composite)]
    target: TargetArg,

    /// 重复处理策略（缺省取配置）
    #[arg(long, value_enum, ignore_case = true)]
    strategy: Option<StrategyArg>,

    /// 客户编号（缺省取配置）
    #[arg(long = "client")]
    client_id: Option<i64>,

    /// 数据库路径（缺省取环境变量或用户数据目录）
    #[arg(long = "db")]
    db_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TargetArg {
    Product,
    Region,
    Competitor,
    Composite,
}

impl From<TargetArg> for ImportTarget {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Product => ImportTarget::Product,
            TargetArg::Region => ImportTarget::Region,
            TargetArg::Competitor => ImportTarget::Competitor,
            TargetArg::Composite => ImportTarget::Composite,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Ignore,
    Skip,
    Override,
}

impl From<StrategyArg> for DuplicateStrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Ignore => DuplicateStrategyKind::Ignore,
            StrategyArg::Skip => DuplicateStrategyKind::Skip,
            StrategyArg::Override => DuplicateStrategyKind::Override,
        }
    }
}

/// 默认数据库路径
///
/// 优先级: 环境变量 > 用户数据目录 > 当前目录
fn default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./product_import.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("product-import");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("product_import.db");
        }
    }
    path.to_string_lossy().to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let db_path = cli.db_path.clone().unwrap_or_else(default_db_path);
    tracing::info!(version = product_import::VERSION, db = %db_path, "{}", product_import::APP_NAME);

    let conn = db::open_and_init(&db_path)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;
    let conn = Arc::new(Mutex::new(conn));

    let repository = Arc::new(SqliteImportRepository::from_connection(conn.clone()));
    let status_store = Arc::new(SqliteStatusStore::from_connection(conn.clone()));
    let config = Arc::new(ConfigManager::from_connection(conn)?);
    let orchestrator = ImportOrchestrator::new(repository, status_store, config);

    let mut request = ImportRequest::new(cli.file, cli.target.into());
    if let Some(strategy) = cli.strategy {
        request = request.with_strategy(strategy.into());
    }
    if let Some(client_id) = cli.client_id {
        request = request.with_client(client_id);
    }

    let summary = orchestrator.run(request).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.status != OperationStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}
