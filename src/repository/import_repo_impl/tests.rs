use super::SqliteImportRepository;
use crate::domain::entity::ImportableEntity;
use crate::domain::product::Product;
use crate::domain::region::Region;
use crate::domain::types::EntityType;
use crate::repository::error::RepositoryError;
use crate::repository::import_repo::ImportRepository;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

fn setup_repo() -> SqliteImportRepository {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::init_schema(&conn).unwrap();
    SqliteImportRepository::from_connection(Arc::new(Mutex::new(conn)))
}

fn product(client_id: i64, external_id: &str, file_id: i64) -> ImportableEntity {
    let mut p = Product::with_external_id(client_id, external_id);
    p.file_id = Some(file_id);
    ImportableEntity::Product(p)
}

fn region(product_ref: Option<i64>, name: &str, file_id: i64) -> ImportableEntity {
    ImportableEntity::Region(Region {
        client_id: 1,
        file_id: Some(file_id),
        product_ref,
        region: Some(name.to_string()),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_save_batch_returns_ids_in_order() {
    let repo = setup_repo();
    let ids = repo
        .save_batch(
            vec![product(1, "A1", 10), product(1, "B2", 10)],
            EntityType::Product,
        )
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids[0] < ids[1]);

    let stored = repo.find_products_by_client(1).unwrap();
    assert_eq!(stored[0].product_id.as_deref(), Some("A1"));
    assert_eq!(stored[1].id, Some(ids[1]));
}

#[tokio::test]
async fn test_update_keeps_original_file_id() {
    let repo = setup_repo();
    let ids = repo
        .save_batch(vec![product(1, "A1", 10)], EntityType::Product)
        .await
        .unwrap();

    let mut updated = Product::with_external_id(1, "A1");
    updated.id = Some(ids[0]);
    updated.file_id = Some(20);
    updated.product_name = Some("Новая модель".to_string());
    repo.save_batch(vec![updated.into()], EntityType::Product)
        .await
        .unwrap();

    let stored = repo.find_products_by_client(1).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].file_id, Some(10));
    assert_eq!(stored[0].product_name.as_deref(), Some("Новая модель"));
}

#[tokio::test]
async fn test_dependent_without_product_ref_rejects_whole_batch() {
    let repo = setup_repo();
    let ids = repo
        .save_batch(vec![product(1, "A1", 10)], EntityType::Product)
        .await
        .unwrap();

    let err = repo
        .save_batch(
            vec![region(Some(ids[0]), "North", 10), region(None, "South", 10)],
            EntityType::Region,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ValidationError(_)));
    assert_eq!(repo.count(EntityType::Region).unwrap(), 0);
}

#[tokio::test]
async fn test_find_existing_external_ids_scoped_by_client() {
    let repo = setup_repo();
    repo.save_batch(
        vec![product(1, "A1", 10), product(1, "A1", 10), product(2, "B2", 11)],
        EntityType::Product,
    )
    .await
    .unwrap();

    let found = repo
        .find_existing_external_ids(1, &["A1".to_string(), "B2".to_string()])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    // 同一编号多条时取最新
    assert_eq!(found["A1"], 2);
}

#[tokio::test]
async fn test_dependent_keys_and_delete_by_primary() {
    let repo = setup_repo();
    let ids = repo
        .save_batch(vec![product(1, "A1", 10), product(1, "B2", 10)], EntityType::Product)
        .await
        .unwrap();
    repo.save_batch(
        vec![
            region(Some(ids[0]), "North", 10),
            region(Some(ids[1]), "East", 10),
        ],
        EntityType::Region,
    )
    .await
    .unwrap();

    let keys = repo
        .find_existing_dependent_keys(EntityType::Region, &ids)
        .await
        .unwrap();
    assert!(keys.contains(&(ids[1], "East".to_string())));

    let deleted = repo
        .delete_by_primary_storage_ids(EntityType::Region, &[ids[1]])
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(repo.find_regions_by_product(ids[0]).unwrap().len(), 1);
    assert!(repo
        .delete_by_primary_storage_ids(EntityType::Product, &ids)
        .await
        .is_err());
}

#[tokio::test]
async fn test_delete_by_originating_file_id() {
    let repo = setup_repo();
    let old = repo
        .save_batch(vec![product(1, "OLD", 1)], EntityType::Product)
        .await
        .unwrap();
    let new = repo
        .save_batch(vec![product(1, "NEW", 2)], EntityType::Product)
        .await
        .unwrap();
    repo.save_batch(
        vec![region(Some(old[0]), "North", 2), region(Some(new[0]), "South", 2)],
        EntityType::Region,
    )
    .await
    .unwrap();

    let deleted = repo.delete_by_originating_file_id(2).await.unwrap();
    assert_eq!(deleted, 3);
    let remaining = repo.find_products_by_client(1).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].product_id.as_deref(), Some("OLD"));
    assert_eq!(repo.count(EntityType::Region).unwrap(), 0);
}
