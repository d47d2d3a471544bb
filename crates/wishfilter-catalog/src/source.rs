//! Coupon list sources

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::coupon::Coupon;
use crate::Result;

#[async_trait]
pub trait CouponSource: Send + Sync {
    async fn fetch_coupons(&self) -> Result<Vec<Coupon>>;
}

/// Coupon list saved from the coupon endpoint
#[derive(Debug, Clone)]
pub struct JsonFileCouponSource {
    path: PathBuf,
}

impl JsonFileCouponSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CouponSource for JsonFileCouponSource {
    async fn fetch_coupons(&self) -> Result<Vec<Coupon>> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let coupons: Vec<Coupon> = serde_json::from_str(&raw)?;
        info!(event = "coupons.loaded", count = coupons.len(), path = %self.path.display());
        Ok(coupons)
    }
}

/// Fixed coupon list
#[derive(Debug, Clone, Default)]
pub struct MemoryCouponSource {
    coupons: Vec<Coupon>,
}

impl MemoryCouponSource {
    pub fn new(coupons: Vec<Coupon>) -> Self {
        Self { coupons }
    }
}

#[async_trait]
impl CouponSource for MemoryCouponSource {
    async fn fetch_coupons(&self) -> Result<Vec<Coupon>> {
        Ok(self.coupons.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use std::io::Write;

    #[tokio::test]
    async fn test_json_file_source_reads_coupons() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"coupon_id": "c-1", "coupon_name": "Sale", "discount": "20",
                 "discount_type": "rate", "condition_type": "id_all",
                 "conditions": {{"product_all": ["RJ01"]}}, "limit_date": 1900000000}}]"#
        )
        .unwrap();

        let coupons = JsonFileCouponSource::new(file.path())
            .fetch_coupons()
            .await
            .unwrap();
        assert_eq!(coupons.len(), 1);
        assert_eq!(coupons[0].coupon_id, "c-1");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonFileCouponSource::new(dir.path().join("absent.json"))
            .fetch_coupons()
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Io(_)));
    }
}
