//! HTTP clients for the coupon list and product info endpoints

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::CatalogConfig;
use crate::coupon::Coupon;
use crate::error::CatalogError;
use crate::product::{ProductInfo, ProductInfoMap, ProductInfoSource};
use crate::source::CouponSource;
use crate::Result;

const PRODUCT_ID_PARAM: &str = "product_id";
const PRODUCT_ID_SEPARATOR: &str = ",";

/// Build the shared HTTP client for a catalog config.
pub fn build_client(config: &CatalogConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout())
        .build()
        .map_err(|err| CatalogError::Config(err.to_string()))
}

async fn get_json(client: &reqwest::Client, request: reqwest::RequestBuilder) -> Result<serde_json::Value> {
    let request = request.build()?;
    let url = request.url().to_string();
    let response = client.execute(request).await?;

    let status = response.status();
    if !status.is_success() {
        return Err(CatalogError::Status {
            status: status.as_u16(),
            url,
        });
    }
    Ok(response.json().await?)
}

/// Product info from the remote info endpoint
#[derive(Debug, Clone)]
pub struct HttpProductInfoSource {
    client: reqwest::Client,
    url: String,
}

impl HttpProductInfoSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        Ok(Self::new(build_client(config)?, config.product_info_url.clone()))
    }

    /// Look up several products in one request. Unknown ids are simply
    /// absent from the returned map.
    pub async fn product_infos(&self, product_ids: &[String]) -> Result<ProductInfoMap> {
        if product_ids.is_empty() {
            return Ok(ProductInfoMap::new());
        }

        let ids = product_ids.join(PRODUCT_ID_SEPARATOR);
        debug!(products = %ids, "fetching product info");
        let request = self
            .client
            .get(&self.url)
            .query(&[(PRODUCT_ID_PARAM, ids.as_str())]);
        let body = get_json(&self.client, request).await?;

        // The endpoint answers `[]` when it knows none of the ids.
        if body.is_array() {
            return Ok(ProductInfoMap::new());
        }
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl ProductInfoSource for HttpProductInfoSource {
    async fn product_info(&self, product_id: &str) -> Result<ProductInfo> {
        let mut infos = self.product_infos(&[product_id.to_string()]).await?;
        infos
            .remove(product_id)
            .ok_or_else(|| CatalogError::ProductNotFound(product_id.to_string()))
    }
}

/// Coupon list from the remote coupon endpoint
#[derive(Debug, Clone)]
pub struct HttpCouponSource {
    client: reqwest::Client,
    url: String,
}

impl HttpCouponSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        Ok(Self::new(build_client(config)?, config.coupons_url.clone()))
    }
}

#[async_trait]
impl CouponSource for HttpCouponSource {
    async fn fetch_coupons(&self) -> Result<Vec<Coupon>> {
        let body = get_json(&self.client, self.client.get(&self.url)).await?;
        let coupons: Vec<Coupon> = serde_json::from_value(body)?;
        info!(event = "coupons.fetched", count = coupons.len(), url = %self.url);
        Ok(coupons)
    }
}

/// Both remote sources sharing one client.
pub fn remote_sources(
    config: &CatalogConfig,
) -> Result<(Arc<dyn CouponSource>, Arc<dyn ProductInfoSource>)> {
    let client = build_client(config)?;
    Ok((
        Arc::new(HttpCouponSource::new(client.clone(), config.coupons_url.clone())),
        Arc::new(HttpProductInfoSource::new(
            client,
            config.product_info_url.clone(),
        )),
    ))
}
