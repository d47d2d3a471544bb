//! Product info lookups
//!
//! Coupon predicates other than `id_all` need the product's genres or site,
//! which live behind a (usually remote) [`ProductInfoSource`].
//! [`CachedProductInfo`] sits in front of a source so that every coupon
//! evaluated for the same product shares one lookup.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::CatalogError;
use crate::Result;

/// What the catalog knows about one product
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    #[serde(default)]
    pub work_name: String,
    #[serde(default)]
    pub maker_id: String,
    /// Storefront the product is sold on
    #[serde(default)]
    pub site_id: String,
    /// Sale genres used by `custom_genre` coupons
    #[serde(default)]
    pub custom_genres: Vec<String>,
    /// Series name, when the product belongs to one
    #[serde(default)]
    pub title_name: Option<String>,
}

/// Product id → info, as returned by the info endpoint
pub type ProductInfoMap = HashMap<String, ProductInfo>;

#[async_trait]
pub trait ProductInfoSource: Send + Sync + fmt::Debug {
    /// Look up one product. A product the source does not know is
    /// [`CatalogError::ProductNotFound`].
    async fn product_info(&self, product_id: &str) -> Result<ProductInfo>;
}

/// Product info held in memory, typically loaded from a JSON file.
#[derive(Debug, Default)]
pub struct MemoryProductInfo {
    products: ProductInfoMap,
    delay: Duration,
    lookups: AtomicUsize,
}

impl MemoryProductInfo {
    pub fn new(products: ProductInfoMap) -> Self {
        Self {
            products,
            ..Self::default()
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    /// Load a product id → info JSON object from disk.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&raw)
    }

    /// Answer every lookup after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of lookups answered or refused so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[async_trait]
impl ProductInfoSource for MemoryProductInfo {
    async fn product_info(&self, product_id: &str) -> Result<ProductInfo> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.products
            .get(product_id)
            .cloned()
            .ok_or_else(|| CatalogError::ProductNotFound(product_id.to_string()))
    }
}

/// Memoising front for another source.
///
/// Concurrent lookups of the same product wait on one remote call.
/// Failed lookups are not remembered, so the next caller tries again.
#[derive(Debug)]
pub struct CachedProductInfo {
    inner: Arc<dyn ProductInfoSource>,
    cells: Mutex<HashMap<String, Arc<OnceCell<ProductInfo>>>>,
}

impl CachedProductInfo {
    pub fn new(inner: Arc<dyn ProductInfoSource>) -> Self {
        Self {
            inner,
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Number of products with a cached answer.
    pub fn cached(&self) -> usize {
        self.cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    fn forget_failed(&self, product_id: &str, cell: &Arc<OnceCell<ProductInfo>>) {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        let stale = cells
            .get(product_id)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized());
        if stale {
            cells.remove(product_id);
        }
    }

    fn cell_for(&self, product_id: &str) -> Arc<OnceCell<ProductInfo>> {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        let cell = cells.entry(product_id.to_string()).or_default();
        Arc::clone(cell)
    }
}

#[async_trait]
impl ProductInfoSource for CachedProductInfo {
    async fn product_info(&self, product_id: &str) -> Result<ProductInfo> {
        let cell = self.cell_for(product_id);
        let looked_up = cell
            .get_or_try_init(|| async {
                debug!(product = %product_id, "product info cache miss");
                self.inner.product_info(product_id).await
            })
            .await;
        match looked_up {
            Ok(info) => Ok(info.clone()),
            Err(err) => {
                self.forget_failed(product_id, &cell);
                Err(err)
            }
        }
    }
}
