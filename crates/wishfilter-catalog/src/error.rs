//! Error types for wishfilter-catalog

use thiserror::Error;
use wishfilter_core::{FilterError, ItemId, WishfilterError};

/// Errors raised while loading coupons or looking up product info.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Endpoint answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Lookup succeeded but the product was absent from the answer
    #[error("product not found: {0}")]
    ProductNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid endpoint or client settings
    #[error("invalid catalog configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        CatalogError::Http(err.to_string())
    }
}

impl From<CatalogError> for FilterError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ProductNotFound(product) => FilterError::MissingData {
                item: ItemId::new(product),
                detail: "no product info returned".to_string(),
            },
            other => FilterError::Lookup(other.to_string()),
        }
    }
}

impl From<CatalogError> for WishfilterError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Io(io) => WishfilterError::Io(io),
            CatalogError::Json(json) => WishfilterError::Serialization(json),
            CatalogError::Config(detail) => WishfilterError::Config(detail),
            other => WishfilterError::Catalog(other.to_string()),
        }
    }
}
