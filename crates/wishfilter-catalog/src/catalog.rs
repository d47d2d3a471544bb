//! Coupon catalog feeding a registry

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use wishfilter_core::{FilterCatalog, SharedFilter};

use crate::coupon::{sort_for_presentation, Coupon};
use crate::coupon_filter::CouponFilter;
use crate::product::{CachedProductInfo, ProductInfoSource};
use crate::source::CouponSource;
use crate::Result;

/// Turns a coupon list into registry filters sharing one product cache.
pub struct CouponCatalog {
    coupons: Arc<dyn CouponSource>,
    products: Arc<dyn ProductInfoSource>,
}

impl CouponCatalog {
    /// Lookups through `products` are memoised per product.
    pub fn new(coupons: Arc<dyn CouponSource>, products: Arc<dyn ProductInfoSource>) -> Self {
        Self {
            coupons,
            products: Arc::new(CachedProductInfo::new(products)),
        }
    }

    /// Coupons in presentation order, optionally only those usable at `now`.
    pub async fn listing(&self, now: DateTime<Utc>, include_unavailable: bool) -> Result<Vec<CouponListing>> {
        let mut coupons = self.coupons.fetch_coupons().await?;
        sort_for_presentation(&mut coupons);

        Ok(coupons
            .into_iter()
            .map(|coupon| CouponListing::new(coupon, now))
            .filter(|listing| include_unavailable || listing.available)
            .collect())
    }
}

#[async_trait]
impl FilterCatalog for CouponCatalog {
    async fn fetch_filters(&self) -> wishfilter_core::Result<Vec<SharedFilter>> {
        let coupons = self.coupons.fetch_coupons().await?;
        Ok(coupons
            .into_iter()
            .map(|coupon| {
                Arc::new(CouponFilter::new(coupon, Arc::clone(&self.products))) as SharedFilter
            })
            .collect())
    }
}

/// Presentation row for one coupon
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponListing {
    pub id: String,
    pub name: String,
    pub discount: String,
    pub limit: Option<DateTime<Utc>>,
    pub available: bool,
}

impl CouponListing {
    fn new(coupon: Coupon, now: DateTime<Utc>) -> Self {
        Self {
            available: coupon.is_available(now),
            limit: coupon.limit(),
            discount: coupon.discount_label(),
            id: coupon.coupon_id,
            name: coupon.coupon_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::{ConditionType, Conditions, DiscountType};
    use crate::product::MemoryProductInfo;
    use crate::source::MemoryCouponSource;
    use chrono::TimeZone;

    fn coupon(id: &str, discount: &str, limit: i64) -> Coupon {
        Coupon {
            coupon_id: id.to_string(),
            coupon_name: format!("{id} name"),
            discount: discount.to_string(),
            discount_type: DiscountType::Rate,
            condition_type: ConditionType::IdAll,
            conditions: Conditions::default(),
            limit_date: Some(limit),
        }
    }

    fn catalog() -> CouponCatalog {
        CouponCatalog::new(
            Arc::new(MemoryCouponSource::new(vec![
                coupon("small", "10", 2_000_000_000),
                coupon("expired", "90", 1_000_000_000),
                coupon("big", "50", 2_000_000_000),
            ])),
            Arc::new(MemoryProductInfo::default()),
        )
    }

    #[tokio::test]
    async fn test_listing_orders_and_hides_expired() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let listing = catalog().listing(now, false).await.unwrap();
        let ids: Vec<&str> = listing.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["big", "small"]);

        let all = catalog().listing(now, true).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, "expired");
        assert!(!all[0].available);
    }

    #[tokio::test]
    async fn test_fetch_filters_wraps_every_coupon() {
        let filters = catalog().fetch_filters().await.unwrap();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0].name(), "small name");
    }
}
