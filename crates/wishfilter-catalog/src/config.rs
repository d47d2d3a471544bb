//! Catalog endpoint configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wishfilter_core::config::env_or;

const DEFAULT_COUPONS_URL: &str = "https://www.dlsite.com/books/mypage/coupon/list/ajax";
const DEFAULT_PRODUCT_INFO_URL: &str = "https://www.dlsite.com/maniax/product/info/ajax";

/// Where coupons and product info are fetched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Coupon list endpoint
    pub coupons_url: String,
    /// Product info endpoint, queried with `?product_id=ID[,ID..]`
    pub product_info_url: String,
    pub user_agent: String,
    pub request_timeout_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            coupons_url: std::env::var("WISHFILTER_COUPONS_URL")
                .unwrap_or_else(|_| DEFAULT_COUPONS_URL.to_string()),
            product_info_url: std::env::var("WISHFILTER_PRODUCT_INFO_URL")
                .unwrap_or_else(|_| DEFAULT_PRODUCT_INFO_URL.to_string()),
            user_agent: concat!("wishfilter-catalog/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_ms: env_or("WISHFILTER_REQUEST_TIMEOUT_MS", 10_000),
        }
    }
}

impl CatalogConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config pointing at specific endpoints
    pub fn new(coupons_url: &str, product_info_url: &str) -> Self {
        CatalogConfig {
            coupons_url: coupons_url.to_string(),
            product_info_url: product_info_url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
