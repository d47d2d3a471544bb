//! Coupons as registry filters

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use wishfilter_core::{Filter, FilterId, FilterResult, Item, OrderKey};

use crate::coupon::{ConditionType, Coupon};
use crate::product::ProductInfoSource;

/// A coupon whose predicate is "this coupon applies to the item".
#[derive(Debug, Clone)]
pub struct CouponFilter {
    id: FilterId,
    coupon: Coupon,
    products: Arc<dyn ProductInfoSource>,
}

impl CouponFilter {
    pub fn new(coupon: Coupon, products: Arc<dyn ProductInfoSource>) -> Self {
        Self {
            id: FilterId::new(coupon.coupon_id.clone()),
            coupon,
            products,
        }
    }

    pub fn coupon(&self) -> &Coupon {
        &self.coupon
    }
}

fn contains(list: &Option<Vec<String>>, value: &str) -> bool {
    list.as_deref()
        .is_some_and(|values| values.iter().any(|v| v == value))
}

#[async_trait]
impl Filter for CouponFilter {
    fn id(&self) -> &FilterId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.coupon.coupon_name
    }

    fn order_key(&self) -> OrderKey {
        self.coupon.order_key()
    }

    fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.coupon.is_available(now)
    }

    async fn matches(&self, item: &Item) -> FilterResult<bool> {
        let conditions = &self.coupon.conditions;
        match self.coupon.condition_type {
            ConditionType::IdAll => Ok(contains(&conditions.product_all, item.id.as_str())),
            ConditionType::CustomGenre => {
                let Some(genres) = conditions.custom_genre.as_deref() else {
                    return Ok(false);
                };
                let info = self.products.product_info(item.id.as_str()).await?;
                Ok(info
                    .custom_genres
                    .iter()
                    .any(|genre| genres.contains(genre)))
            }
            ConditionType::SiteIds => {
                if conditions.site_ids.is_none() {
                    return Ok(false);
                }
                let info = self.products.product_info(item.id.as_str()).await?;
                Ok(contains(&conditions.site_ids, &info.site_id))
            }
            ConditionType::Unknown => {
                warn!(coupon = %self.id, "unsupported coupon condition type; matching nothing");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::{Conditions, DiscountType};
    use crate::product::MemoryProductInfo;
    use wishfilter_core::FilterError;

    fn products() -> Arc<MemoryProductInfo> {
        Arc::new(
            MemoryProductInfo::from_json_str(
                r#"{
                    "RJ01": {"site_id": "maniax", "custom_genres": ["spring", "voice"]},
                    "BJ02": {"site_id": "books", "custom_genres": []}
                }"#,
            )
            .unwrap(),
        )
    }

    fn coupon(condition_type: ConditionType, conditions: Conditions) -> Coupon {
        Coupon {
            coupon_id: "c-1".to_string(),
            coupon_name: "Coupon".to_string(),
            discount: "10".to_string(),
            discount_type: DiscountType::Rate,
            condition_type,
            conditions,
            limit_date: Some(1_900_000_000),
        }
    }

    #[tokio::test]
    async fn test_id_all_needs_no_lookup() {
        let products = products();
        let filter = CouponFilter::new(
            coupon(
                ConditionType::IdAll,
                Conditions {
                    product_all: Some(vec!["RJ01".to_string()]),
                    ..Conditions::default()
                },
            ),
            products.clone(),
        );

        assert!(filter.matches(&Item::new("RJ01")).await.unwrap());
        assert!(!filter.matches(&Item::new("RJ99")).await.unwrap());
        assert_eq!(products.lookups(), 0);
    }

    #[tokio::test]
    async fn test_custom_genre_shares_any_genre() {
        let filter = CouponFilter::new(
            coupon(
                ConditionType::CustomGenre,
                Conditions {
                    custom_genre: Some(vec!["voice".to_string()]),
                    ..Conditions::default()
                },
            ),
            products(),
        );

        assert!(filter.matches(&Item::new("RJ01")).await.unwrap());
        assert!(!filter.matches(&Item::new("BJ02")).await.unwrap());
    }

    #[tokio::test]
    async fn test_site_ids_and_missing_product() {
        let filter = CouponFilter::new(
            coupon(
                ConditionType::SiteIds,
                Conditions {
                    site_ids: Some(vec!["books".to_string()]),
                    ..Conditions::default()
                },
            ),
            products(),
        );

        assert!(filter.matches(&Item::new("BJ02")).await.unwrap());
        assert!(!filter.matches(&Item::new("RJ01")).await.unwrap());
        let err = filter.matches(&Item::new("RJ404")).await.unwrap_err();
        assert!(matches!(err, FilterError::MissingData { .. }));
    }

    #[tokio::test]
    async fn test_unknown_condition_matches_nothing() {
        let filter = CouponFilter::new(
            coupon(ConditionType::Unknown, Conditions::default()),
            products(),
        );
        assert!(!filter.matches(&Item::new("RJ01")).await.unwrap());
        assert_eq!(filter.name(), "Coupon");
    }
}
