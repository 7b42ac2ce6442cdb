// ==========================================
// 导入管道集成测试
// ==========================================
// 测试目标: 文件 → 方言 → 映射 → 组装 → 重复策略 → 落库 → 汇总 全链路
// ==========================================

mod helpers;
mod test_helpers;

use helpers::failing_repo::FailingRepo;
use helpers::mock_config::MockConfig;
use product_import::config::ImportSettings;
use product_import::repository::ImportRepository;
use product_import::{
    logging, DuplicateStrategyKind, ErrorHandling, ImportOrchestrator, ImportRequest,
    ImportTarget, OperationStatus,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;
use test_helpers::{composite_csv, composite_mapping, TestEnv, CLIENT};

fn region_rows_csv() -> &'static str {
    "product_id;region;region_price\nA1;North;10,50\nA1;South;20,00\n"
}

fn region_rows_mapping() -> Vec<(&'static str, &'static str)> {
    vec![
        ("product_id", "product.product_id"),
        ("region", "region.region"),
        ("region_price", "region.region_price"),
    ]
}

fn orchestrator_with_settings(env: &TestEnv, settings: ImportSettings) -> ImportOrchestrator {
    ImportOrchestrator::new(
        env.repository.clone(),
        env.status_store.clone(),
        Arc::new(MockConfig::new(settings)),
    )
}

/// 先以商品导入写入 A1（可附带区域）
async fn seed_product(env: &TestEnv, external_id: &str, region: Option<&str>) {
    let content = match region {
        Some(r) => format!("product_id,region\n{},{}\n", external_id, r),
        None => format!("product_id,region\n{},\n", external_id),
    };
    let path = env.write_csv(&format!("seed_{}.csv", external_id), &content);
    let target = if region.is_some() {
        ImportTarget::Composite
    } else {
        ImportTarget::Product
    };
    let mapping = if region.is_some() {
        vec![("product_id", "product.product_id"), ("region", "region.region")]
    } else {
        vec![("product_id", "product.product_id")]
    };
    let summary = env
        .orchestrator()
        .run(
            ImportRequest::new(path, target)
                .with_client(CLIENT)
                .with_mapping(mapping),
        )
        .await
        .expect("seed import failed");
    assert_eq!(summary.status, OperationStatus::Completed, "{:?}", summary.errors);
}

#[tokio::test]
async fn test_ignore_attaches_both_regions_to_a1() {
    logging::init_test();
    let env = TestEnv::new();
    let path = env.write_csv("a1.csv", region_rows_csv());

    let summary = env
        .orchestrator()
        .run(
            ImportRequest::new(path, ImportTarget::Composite)
                .with_client(CLIENT)
                .with_mapping(region_rows_mapping())
                .with_strategy(DuplicateStrategyKind::Ignore),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed);
    assert_eq!(summary.processed_records, 2);
    assert_eq!(summary.dependents_saved, 2);
    assert!(summary.is_consistent());
    assert!(summary.file_hash.as_deref().map(|h| h.len() == 64).unwrap_or(false));

    let regions = env.regions_of("A1");
    assert_eq!(
        regions,
        vec![
            ("North".to_string(), Some(10.5)),
            ("South".to_string(), Some(20.0))
        ]
    );

    // 两个区域指向同一个商品存储 id
    let conn = env.conn.lock().unwrap();
    let refs: i64 = conn
        .query_row("SELECT COUNT(DISTINCT product_ref) FROM region", [], |r| r.get(0))
        .unwrap();
    assert_eq!(refs, 1);
}

#[tokio::test]
async fn test_skip_pre_existing_primary() {
    logging::init_test();
    let env = TestEnv::new();
    seed_product(&env, "A1", None).await;
    let path = env.write_csv("a1.csv", region_rows_csv());

    let summary = env
        .orchestrator()
        .run(
            ImportRequest::new(path, ImportTarget::Composite)
                .with_client(CLIENT)
                .with_mapping(region_rows_mapping())
                .with_strategy(DuplicateStrategyKind::Skip),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed);
    assert_eq!(summary.skipped_records, 2);
    assert_eq!(summary.saved_records, 0);
    assert_eq!(env.count("product"), 1);
    assert_eq!(env.count("region"), 0);
}

#[tokio::test]
async fn test_override_replaces_old_dependents_with_last_occurrence() {
    logging::init_test();
    let env = TestEnv::new();
    seed_product(&env, "B2", Some("East")).await;
    assert_eq!(env.regions_of("B2"), vec![("East".to_string(), None)]);

    let path = env.write_csv("b2.csv", "product_id,region\nB2,North\nB2,South\n");
    let summary = env
        .orchestrator()
        .run(
            ImportRequest::new(path, ImportTarget::Composite)
                .with_client(CLIENT)
                .with_mapping(vec![
                    ("product_id", "product.product_id"),
                    ("region", "region.region"),
                ])
                .with_strategy(DuplicateStrategyKind::Override),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed);
    assert_eq!(summary.updated_records, 1);
    assert_eq!(summary.skipped_records, 1);
    assert_eq!(summary.dependents_deleted, 1);
    assert!(summary.is_consistent());
    assert_eq!(env.count("product"), 1);
    assert_eq!(env.regions_of("B2"), vec![("South".to_string(), None)]);
}

#[tokio::test]
async fn test_failed_primary_never_persists_dependents() {
    logging::init_test();
    let env = TestEnv::new();
    let path = env.write_csv(
        "partial.csv",
        "product_id,product_name,region,region_price\n,Orphan,North,1\nC3,Valid,West,2\n",
    );

    let summary = env
        .orchestrator()
        .run(
            ImportRequest::new(path, ImportTarget::Composite)
                .with_client(CLIENT)
                .with_mapping(composite_mapping()),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed);
    assert_eq!(summary.failed_records, 1);
    assert_eq!(summary.saved_records, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].starts_with("行 2"), "{}", summary.errors[0]);
    assert_eq!(env.count("region"), 1);
    assert_eq!(env.regions_of("C3"), vec![("West".to_string(), Some(2.0))]);
}

#[tokio::test]
async fn test_generated_rows_failed_primaries_leave_no_dependents() {
    logging::init_test();
    let strategies = [
        DuplicateStrategyKind::Ignore,
        DuplicateStrategyKind::Skip,
        DuplicateStrategyKind::Override,
    ];

    for seed in 0..12u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let env = TestEnv::new();
        let rows = rng.gen_range(1..=40);
        let batch_size = rng.gen_range(1..=8);
        let strategy = strategies[rng.gen_range(0..strategies.len())];

        let mut broken = HashSet::new();
        let mut with_region = HashSet::new();
        let mut content = String::from("product_id,product_price,region,region_price\n");
        for i in 0..rows {
            let id = format!("G{}_{}", seed, i);
            let price = if rng.gen_bool(0.3) {
                broken.insert(id.clone());
                "n/a".to_string()
            } else {
                format!("{}.5", rng.gen_range(1..500))
            };
            let region = if rng.gen_bool(0.8) {
                with_region.insert(id.clone());
                format!("R{}", rng.gen_range(0..5))
            } else {
                String::new()
            };
            content.push_str(&format!("{},{},{},{}\n", id, price, region, i));
        }
        let path = env.write_csv("generated.csv", &content);

        let summary = orchestrator_with_settings(
            &env,
            ImportSettings {
                batch_size,
                duplicate_handling: strategy,
                ..ImportSettings::default()
            },
        )
        .run(
            ImportRequest::new(path, ImportTarget::Composite)
                .with_client(CLIENT)
                .with_mapping(vec![
                    ("product_id", "product.product_id"),
                    ("product_price", "product.product_price"),
                    ("region", "region.region"),
                    ("region_price", "region.region_price"),
                ]),
        )
        .await
        .unwrap();

        let context = format!("seed={} strategy={} batch={}", seed, strategy, batch_size);
        assert_eq!(summary.status, OperationStatus::Completed, "{}", context);
        assert_eq!(summary.failed_records, broken.len() as u64, "{}", context);
        assert_eq!(summary.processed_records, rows as u64, "{}", context);

        let stored: HashSet<String> = env
            .repository
            .find_products_by_client(CLIENT)
            .unwrap()
            .into_iter()
            .filter_map(|p| p.product_id)
            .collect();
        for id in &broken {
            assert!(!stored.contains(id), "{} {}", context, id);
            assert!(env.regions_of(id).is_empty(), "{} {}", context, id);
        }
        let expected_regions = with_region.difference(&broken).count() as i64;
        assert_eq!(env.count("region"), expected_regions, "{}", context);
        assert_eq!(stored.len(), rows - broken.len(), "{}", context);
    }
}

#[tokio::test]
async fn test_multi_chunk_progress_and_status_record() {
    logging::init_test();
    let env = TestEnv::new();
    let path = env.write_csv("many.csv", &composite_csv(35));
    let orchestrator = orchestrator_with_settings(
        &env,
        ImportSettings {
            batch_size: 10,
            ..ImportSettings::default()
        },
    );

    let summary = orchestrator
        .run(
            ImportRequest::new(path, ImportTarget::Composite)
                .with_client(CLIENT)
                .with_mapping(composite_mapping()),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed);
    assert_eq!(summary.processed_records, 35);
    assert_eq!(summary.success_records, 35);
    assert_eq!(summary.dependents_saved, 35);
    assert_eq!(env.count("product"), 35);

    let record = orchestrator
        .get_status(summary.operation_id)
        .await
        .unwrap()
        .expect("operation record missing");
    assert_eq!(record.status, OperationStatus::Completed);
    assert_eq!(record.processed_records, 35);
    assert_eq!(record.total_records, 35);
    assert_eq!(record.progress_percent, 100);
    assert!(record.completed_at.is_some());
    assert_eq!(record.summary.as_ref().map(|s| s.processed_records), Some(35));

    // 结束后不再出现在运行表中
    assert!(orchestrator.progress(summary.operation_id).is_none());
    assert!(orchestrator.active_operations().is_empty());
}

#[tokio::test]
async fn test_stop_mode_fails_on_first_row_error() {
    logging::init_test();
    let env = TestEnv::new();
    let path = env.write_csv(
        "stop.csv",
        "product_id,product_name,region,region_price\nA1,Ok,North,1\n,Broken,South,2\nA3,Ok,West,3\n",
    );
    let orchestrator = orchestrator_with_settings(
        &env,
        ImportSettings {
            error_handling: ErrorHandling::Stop,
            ..ImportSettings::default()
        },
    );

    let summary = orchestrator
        .run(
            ImportRequest::new(path, ImportTarget::Composite)
                .with_client(CLIENT)
                .with_mapping(composite_mapping()),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Failed);
    assert!(summary
        .message
        .as_deref()
        .unwrap_or_default()
        .contains("errorHandling=stop"));
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(env.count("product"), 0);

    let record = orchestrator
        .get_status(summary.operation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, OperationStatus::Failed);
    assert!(record.error_message.is_some());
}

#[tokio::test]
async fn test_error_list_is_bounded() {
    logging::init_test();
    let env = TestEnv::new();
    let mut content = String::from("product_id,product_name\n");
    for i in 0..5 {
        content.push_str(&format!(",Broken {}\n", i));
    }
    content.push_str("OK1,Fine\n");
    let path = env.write_csv("errors.csv", &content);
    let orchestrator = orchestrator_with_settings(
        &env,
        ImportSettings {
            max_reported_errors: 3,
            ..ImportSettings::default()
        },
    );

    let summary = orchestrator
        .run(
            ImportRequest::new(path, ImportTarget::Product)
                .with_client(CLIENT)
                .with_mapping(vec![
                    ("product_id", "product.product_id"),
                    ("product_name", "product.product_name"),
                ]),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed);
    assert_eq!(summary.failed_records, 5);
    assert_eq!(summary.saved_records, 1);
    assert_eq!(summary.errors.len(), 4);
    assert_eq!(summary.errors.last().map(String::as_str), Some("...and 2 more"));
    assert_eq!(summary.truncated_error_count, 2);
}

#[tokio::test]
async fn test_report_mode_persists_full_error_list() {
    logging::init_test();
    let env = TestEnv::new();
    let mut content = String::from("product_id,product_name\n");
    for i in 0..4 {
        content.push_str(&format!(",Broken {}\n", i));
    }
    let path = env.write_csv("report.csv", &content);
    let orchestrator = orchestrator_with_settings(
        &env,
        ImportSettings {
            error_handling: ErrorHandling::Report,
            max_reported_errors: 2,
            ..ImportSettings::default()
        },
    );

    let summary = orchestrator
        .run(
            ImportRequest::new(path, ImportTarget::Product)
                .with_client(CLIENT)
                .with_mapping(vec![
                    ("product_id", "product.product_id"),
                    ("product_name", "product.product_name"),
                ]),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed);
    assert_eq!(summary.errors.len(), 3);

    let report = env
        .status_store
        .get_error_report(summary.operation_id)
        .unwrap()
        .expect("full report missing");
    assert_eq!(report.len(), 4);
}

#[tokio::test]
async fn test_missing_required_header_fails_before_any_row() {
    logging::init_test();
    let env = TestEnv::new();
    let path = env.write_csv("noid.csv", "name,region\nPhone,North\n");

    let summary = env
        .orchestrator()
        .run(
            ImportRequest::new(path, ImportTarget::Composite)
                .with_client(CLIENT)
                .with_mapping(vec![
                    ("name", "product.product_name"),
                    ("region", "region.region"),
                ]),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Failed);
    assert_eq!(summary.processed_records, 0);
    assert!(summary.message.as_deref().unwrap_or_default().contains("product_id"));
    assert_eq!(env.count("product"), 0);
}

#[tokio::test]
async fn test_unreadable_file_fails_operation() {
    logging::init_test();
    let env = TestEnv::new();
    let path = env.write_csv("data.json", "{}");

    let summary = env
        .orchestrator()
        .run(ImportRequest::new(path, ImportTarget::Product).with_client(CLIENT))
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Failed);
    assert!(summary.file_hash.is_none());
}

#[tokio::test]
async fn test_auto_mapping_from_field_name_headers() {
    logging::init_test();
    let env = TestEnv::new();
    let path = env.write_csv("auto.csv", &composite_csv(3));

    let summary = env
        .orchestrator()
        .run(ImportRequest::new(path, ImportTarget::Composite).with_client(CLIENT))
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed, "{:?}", summary.message);
    assert_eq!(summary.saved_records, 3);
    assert_eq!(summary.dependents_saved, 3);
    assert_eq!(env.regions_of("P00001"), vec![("Region 1".to_string(), Some(1.25))]);
}

#[tokio::test]
async fn test_region_import_resolves_existing_products() {
    logging::init_test();
    let env = TestEnv::new();
    seed_product(&env, "A1", None).await;
    let path = env.write_csv(
        "regions.csv",
        "product_id;region;region_price\nA1;North;10,50\nX9;North;5\n",
    );

    let summary = env
        .orchestrator()
        .run(
            ImportRequest::new(path, ImportTarget::Region)
                .with_client(CLIENT)
                .with_mapping(region_rows_mapping()),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed);
    assert_eq!(summary.saved_records, 1);
    assert_eq!(summary.failed_records, 1);
    assert!(summary.errors[0].contains("X9"));
    assert_eq!(env.regions_of("A1"), vec![("North".to_string(), Some(10.5))]);
}

#[tokio::test]
async fn test_default_client_and_settings_come_from_config() {
    logging::init_test();
    let env = TestEnv::new();
    let mut config = MockConfig::new(ImportSettings {
        duplicate_handling: DuplicateStrategyKind::Skip,
        ..ImportSettings::default()
    });
    config.default_client_id = 9;
    let orchestrator =
        ImportOrchestrator::new(env.repository.clone(), env.status_store.clone(), Arc::new(config));

    let path = env.write_csv("p.csv", "product_id\nZ1\nZ1\n");
    let summary = orchestrator
        .run(
            ImportRequest::new(path, ImportTarget::Product)
                .with_mapping(vec![("product_id", "product.product_id")]),
        )
        .await
        .unwrap();
    assert_eq!(summary.strategy, DuplicateStrategyKind::Skip);

    let products = env.repository.find_products_by_client(9).unwrap();
    assert_eq!(products.len(), 2);
    assert!(env.repository.find_products_by_client(CLIENT).unwrap().is_empty());
}

#[tokio::test]
async fn test_composite_row_with_region_and_competitor() {
    logging::init_test();
    let env = TestEnv::new();
    let path = env.write_csv(
        "full.csv",
        "product_id,region,site,seen_at\nC1,North,shop.example,16.10.2026 14:30:00\nC2,South,,\n",
    );

    let summary = env
        .orchestrator()
        .run(
            ImportRequest::new(path, ImportTarget::Composite)
                .with_client(CLIENT)
                .with_mapping(vec![
                    ("product_id", "product.product_id"),
                    ("region", "region.region"),
                    ("site", "competitor.competitor_name"),
                    ("seen_at", "competitor.competitor_local_date_time"),
                ]),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed, "{:?}", summary.errors);
    assert_eq!(summary.saved_records, 2);
    // C1: 区域 + 竞品; C2: 仅区域, 竞品鉴别字段为空不构建
    assert_eq!(summary.dependents_saved, 3);

    let products = env.repository.find_products_by_client(CLIENT).unwrap();
    let c1 = products
        .iter()
        .find(|p| p.product_id.as_deref() == Some("C1"))
        .and_then(|p| p.id)
        .unwrap();
    let competitors = env.repository.find_competitors_by_product(c1).unwrap();
    assert_eq!(competitors.len(), 1);
    assert_eq!(competitors[0].competitor_name.as_deref(), Some("shop.example"));
    assert_eq!(
        competitors[0]
            .competitor_local_date_time
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string()),
        Some("2026-10-16 14:30".to_string())
    );
    assert_eq!(env.count("competitor"), 1);
}

/// 10 个商品, 每块 3 行, 第 2 块写入失败
async fn run_with_failing_chunk(
    env: &TestEnv,
    error_handling: ErrorHandling,
) -> product_import::ImportSummary {
    let repo = Arc::new(FailingRepo::new(env.repository.clone(), 2));
    let orchestrator = ImportOrchestrator::new(
        repo as Arc<dyn ImportRepository>,
        env.status_store.clone(),
        Arc::new(MockConfig::new(ImportSettings {
            batch_size: 3,
            error_handling,
            ..ImportSettings::default()
        })),
    );
    let content: String = std::iter::once("product_id\n".to_string())
        .chain((1..=10).map(|i| format!("F{}\n", i)))
        .collect();
    let path = env.write_csv("failing.csv", &content);
    orchestrator
        .run(
            ImportRequest::new(path, ImportTarget::Product)
                .with_client(CLIENT)
                .with_mapping(vec![("product_id", "product.product_id")]),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_chunk_persistence_error_continue_mode() {
    logging::init_test();
    let env = TestEnv::new();
    let summary = run_with_failing_chunk(&env, ErrorHandling::Continue).await;

    assert_eq!(summary.status, OperationStatus::Completed);
    assert_eq!(summary.processed_records, 10);
    assert_eq!(summary.success_records, 7);
    assert_eq!(summary.failed_records, 3);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].starts_with("块 2"), "{:?}", summary.errors);
    assert!(summary.errors[0].contains("disk I/O error"));
    assert_eq!(env.count("product"), 7);
}

#[tokio::test]
async fn test_chunk_persistence_error_stop_mode() {
    logging::init_test();
    let env = TestEnv::new();
    let summary = run_with_failing_chunk(&env, ErrorHandling::Stop).await;

    assert_eq!(summary.status, OperationStatus::Failed);
    assert_eq!(summary.processed_records, 6);
    assert_eq!(summary.success_records, 3);
    assert_eq!(summary.failed_records, 3);
    // 失败不回滚: 第 1 块已写入的记录保留
    assert_eq!(env.count("product"), 3);

    let record = env
        .orchestrator()
        .get_status(summary.operation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, OperationStatus::Failed);
}
