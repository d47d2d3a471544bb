//! Coupon catalog driving a registry end to end.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use wishfilter_catalog::{Coupon, CouponCatalog, MemoryCouponSource, MemoryProductInfo};
use wishfilter_core::{FilterId, Item, ItemId, Registry};

const COUPONS: &str = r#"[
    {"coupon_id": "genre-voice", "coupon_name": "Voice 30%", "discount": "30",
     "discount_type": "rate", "condition_type": "custom_genre",
     "conditions": {"custom_genre": ["voice"]}, "limit_date": 2000000000},
    {"coupon_id": "genre-game", "coupon_name": "Game 20%", "discount": "20",
     "discount_type": "rate", "condition_type": "custom_genre",
     "conditions": {"custom_genre": ["game"]}, "limit_date": 2000000000},
    {"coupon_id": "books-100", "coupon_name": "Books 100 off", "discount": "100",
     "discount_type": "price", "condition_type": "site_ids",
     "conditions": {"site_ids": ["books"]}, "limit_date": 2000000000},
    {"coupon_id": "single", "coupon_name": "Single title", "discount": "50",
     "discount_type": "rate", "condition_type": "id_all",
     "conditions": {"product_all": ["RJ03"]}, "limit_date": 2000000000},
    {"coupon_id": "expired", "coupon_name": "Old", "discount": "90",
     "discount_type": "rate", "condition_type": "id_all",
     "conditions": {"product_all": ["RJ01"]}, "limit_date": 1000000000}
]"#;

const PRODUCTS: &str = r#"{
    "RJ01": {"work_name": "Voice work", "site_id": "maniax", "custom_genres": ["voice"]},
    "RJ02": {"work_name": "Game work", "site_id": "maniax", "custom_genres": ["game"]},
    "BJ03": {"work_name": "Comic", "site_id": "books", "custom_genres": []},
    "RJ03": {"work_name": "Other", "site_id": "maniax", "custom_genres": []}
}"#;

fn item_ids() -> Vec<&'static str> {
    vec!["RJ01", "RJ02", "BJ03", "RJ03"]
}

async fn initialised() -> (Registry, Arc<MemoryProductInfo>) {
    let coupons: Vec<Coupon> = serde_json::from_str(COUPONS).unwrap();
    let products = Arc::new(MemoryProductInfo::from_json_str(PRODUCTS).unwrap());
    let catalog = CouponCatalog::new(Arc::new(MemoryCouponSource::new(coupons)), products.clone());

    let registry = Registry::default();
    let now = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
    let admitted = registry.init(&catalog, now).await.unwrap();
    assert_eq!(admitted, 4);

    let items = item_ids().into_iter().map(Item::new).collect();
    registry.on_items_discovered(items).await;
    (registry, products)
}

#[tokio::test]
async fn test_expired_coupons_never_enter_registry() {
    let (registry, _) = initialised().await;
    assert!(registry.filter(&FilterId::new("expired")).is_none());

    let ids: Vec<String> = registry
        .filters()
        .into_iter()
        .map(|summary| summary.id.to_string())
        .collect();
    assert_eq!(ids, vec!["single", "genre-voice", "genre-game", "books-100"]);
}

#[tokio::test]
async fn test_product_info_fetched_once_per_product() {
    let (_registry, products) = initialised().await;
    // Three lookup-based coupons over four products.
    assert_eq!(products.lookups(), 4);
}

#[tokio::test]
async fn test_selection_projects_coupon_matches() {
    let (registry, _) = initialised().await;

    registry.activate_filter(&FilterId::new("genre-voice"));
    registry.activate_filter(&FilterId::new("books-100"));

    let snapshot = registry.visibility_snapshot();
    assert!(snapshot[&ItemId::new("RJ01")]);
    assert!(!snapshot[&ItemId::new("RJ02")]);
    assert!(snapshot[&ItemId::new("BJ03")]);
    assert!(!snapshot[&ItemId::new("RJ03")]);

    registry.deactivate_filter(&FilterId::new("genre-voice"));
    registry.deactivate_filter(&FilterId::new("books-100"));
    registry.activate_filter(&FilterId::new("single"));
    assert!(registry.is_visible(&ItemId::new("RJ03")));
    assert!(!registry.is_visible(&ItemId::new("RJ01")));
}

#[tokio::test]
async fn test_unknown_product_leaves_lookup_pairs_unresolved() {
    let (registry, _) = initialised().await;
    registry.register_item(Item::new("RJ404")).await;

    let unresolved = registry.unresolved(&ItemId::new("RJ404"));
    assert_eq!(unresolved.len(), 3);
    assert!(!unresolved.contains(&FilterId::new("single")));
    assert_eq!(
        registry.item_factor(&ItemId::new("RJ404"), &FilterId::new("single")),
        Some(false)
    );
}
