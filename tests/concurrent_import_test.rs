// ==========================================
// 并发导入测试
// ==========================================
// 测试目标: 多个互不相关的导入并发执行, 计数与操作记录互不干扰
// ==========================================

mod test_helpers;

use product_import::{logging, ImportRequest, ImportTarget, OperationStatus};
use std::collections::HashSet;
use std::time::Instant;
use test_helpers::{composite_csv, composite_mapping, TestEnv, CLIENT};

#[tokio::test]
async fn test_run_many_independent_files() {
    logging::init_test();
    let env = TestEnv::new();
    let orchestrator = env.orchestrator();

    let sizes = [5usize, 12, 30];
    let requests: Vec<ImportRequest> = sizes
        .iter()
        .enumerate()
        .map(|(i, n)| {
            // 每个文件使用不同客户, 避免外部编号交叉
            let path = env.write_csv(&format!("batch_{}.csv", i), &composite_csv(*n));
            ImportRequest::new(path, ImportTarget::Composite)
                .with_client(CLIENT + i as i64)
                .with_mapping(composite_mapping())
        })
        .collect();

    let start = Instant::now();
    let results = orchestrator.run_many(requests).await;
    let elapsed = start.elapsed();

    assert_eq!(results.len(), 3);
    let mut operation_ids = HashSet::new();
    for (result, expected) in results.iter().zip(sizes) {
        let summary = result.as_ref().expect("run failed");
        assert_eq!(summary.status, OperationStatus::Completed);
        assert_eq!(summary.saved_records as usize, expected);
        assert!(summary.is_consistent());
        operation_ids.insert(summary.operation_id);
    }
    assert_eq!(operation_ids.len(), 3);
    assert_eq!(env.count("product"), 47);
    assert_eq!(env.count("region"), 47);

    println!("并发导入 3 个文件耗时: {:?}", elapsed);
}

#[tokio::test]
async fn test_repeated_import_is_counted_per_operation() {
    logging::init_test();
    let env = TestEnv::new();
    let orchestrator = env.orchestrator();
    let path = env.write_csv("same.csv", &composite_csv(4));

    let request = ImportRequest::new(path, ImportTarget::Composite)
        .with_client(CLIENT)
        .with_mapping(composite_mapping());
    let results = orchestrator
        .run_many(vec![request.clone(), request])
        .await;

    let hashes: HashSet<String> = results
        .iter()
        .map(|r| r.as_ref().unwrap().file_hash.clone().unwrap())
        .collect();
    assert_eq!(hashes.len(), 1);
    for result in &results {
        assert_eq!(result.as_ref().unwrap().processed_records, 4);
    }
}
