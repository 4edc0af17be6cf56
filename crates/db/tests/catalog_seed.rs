use rust_decimal::Decimal;

use altura_core::cpq::catalog::{Catalog, CatalogQuery};
use altura_core::domain::equipment::EquipmentId;
use altura_db::repositories::SqlEquipmentRepository;
use altura_db::{connect_with_settings, migrations, CatalogSeed, DbPool, EquipmentRepository};

async fn migrated_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("run migrations");
    pool
}

#[tokio::test]
async fn seed_loads_full_catalog_and_verifies() {
    let pool = migrated_pool().await;

    let result = CatalogSeed::load(&pool).await.expect("load seed");
    assert_eq!(result.inserted, CatalogSeed::item_count());
    assert_eq!(result.total, 16);

    let verification = CatalogSeed::verify(&pool).await.expect("verify seed");
    assert!(verification.all_present, "missing: {:?}", verification.missing());
}

#[tokio::test]
async fn seed_is_idempotent_and_keeps_operator_edits() {
    let pool = migrated_pool().await;
    CatalogSeed::load(&pool).await.expect("first load");

    let repo = SqlEquipmentRepository::new(pool.clone());
    let mut edited = repo.find_many(&[EquipmentId(3)]).await.expect("find").remove(0);
    edited.daily_price = Decimal::from(33_000);
    repo.save(edited).await.expect("save edit");

    let second = CatalogSeed::load(&pool).await.expect("second load");
    assert_eq!(second.inserted, 0);
    assert_eq!(repo.count().await.expect("count"), 16);

    let reloaded = repo.find_many(&[EquipmentId(3)]).await.expect("find").remove(0);
    assert_eq!(reloaded.daily_price, Decimal::from(33_000));
}

#[tokio::test]
async fn seeded_rows_decode_with_tiered_prices_and_details() {
    let pool = migrated_pool().await;
    CatalogSeed::load(&pool).await.expect("load seed");

    let items = SqlEquipmentRepository::new(pool).list_all().await.expect("list");
    assert_eq!(items.len(), 16);
    for item in &items {
        assert!(item.available);
        assert!(item.daily_price > Decimal::ZERO, "{} has no daily price", item.name);
        assert!(item.weekly_price.is_some());
        assert!(item.monthly_price.is_some());
        assert!(!item.use_cases.is_empty());
        assert!(!item.specifications.is_empty());
    }

    let suspended = items.iter().find(|item| item.id == EquipmentId(13)).expect("platform");
    assert_eq!(suspended.max_height, Decimal::from(100));
}

#[tokio::test]
async fn seeded_catalog_ranks_scaffolds_for_six_meters() {
    let pool = migrated_pool().await;
    CatalogSeed::load(&pool).await.expect("load seed");

    let catalog = Catalog::new(SqlEquipmentRepository::new(pool).list_all().await.expect("list"));
    let query =
        CatalogQuery { category: Some("andamios".to_owned()), min_height: Some(Decimal::from(6)) };
    let names: Vec<&str> =
        catalog.find(&query).into_iter().take(3).map(|item| item.name.as_str()).collect();

    assert_eq!(
        names,
        vec!["Andamio Multidireccional 8m", "Andamio Torre Móvil 10m", "Andamio Colgante 12m"]
    );
}
