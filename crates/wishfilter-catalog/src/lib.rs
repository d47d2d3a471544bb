//! Wishfilter-Catalog: coupon-backed filters for wishfilter
//!
//! Each coupon in the user's coupon list becomes a registry filter whose
//! predicate answers "does this coupon apply to the product". Coupons that
//! select by genre or storefront need product info, which is looked up
//! remotely and memoised per product.

pub mod catalog;
pub mod config;
pub mod coupon;
pub mod coupon_filter;
pub mod error;
pub mod http;
pub mod product;
pub mod source;
pub mod url;

pub use catalog::{CouponCatalog, CouponListing};
pub use config::CatalogConfig;
pub use coupon::{sort_for_presentation, ConditionType, Conditions, Coupon, DiscountType};
pub use coupon_filter::CouponFilter;
pub use error::CatalogError;
pub use http::{build_client, remote_sources, HttpCouponSource, HttpProductInfoSource};
pub use product::{
    CachedProductInfo, MemoryProductInfo, ProductInfo, ProductInfoMap, ProductInfoSource,
};
pub use source::{CouponSource, JsonFileCouponSource, MemoryCouponSource};
pub use url::{is_wishlist_url, product_id_from_url};

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;
