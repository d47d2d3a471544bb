//! Wishfilter - coupon filtering for wishlists
//!
//! The `wishfilter` command loads a coupon catalog and a wishlist, links
//! every wishlist item to every coupon and prints which items stay visible
//! under a coupon selection.
//!
//! ## Commands
//!
//! - `coupons`: List coupons in presentation order
//! - `filter`: Project a coupon selection onto a wishlist

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use wishfilter_catalog::{
    is_wishlist_url, product_id_from_url, remote_sources, CatalogConfig, CouponCatalog, CouponSource,
    HttpCouponSource, HttpProductInfoSource, JsonFileCouponSource, MemoryProductInfo,
    ProductInfoSource,
};
use wishfilter_core::{
    Coordinator, CoordinatorSummary, FilterId, Item, ItemId, Registry, RegistryConfig, METRICS,
};

/// Capacity of the discovery event queue.
const FEED_CAPACITY: usize = 16;

#[derive(Parser)]
#[command(name = "wishfilter")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Filter a wishlist by the coupons that apply to it", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// JSON config file (registry and catalog settings)
    #[arg(long, global = true, env = "WISHFILTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List coupons in presentation order
    Coupons {
        /// Coupon list JSON (fetched from the coupon endpoint if omitted)
        #[arg(short, long)]
        coupons: Option<PathBuf>,

        /// Include coupons that are no longer usable
        #[arg(long)]
        all: bool,
    },

    /// Link a wishlist to the coupon catalog and print item visibility
    Filter {
        /// Coupon list JSON (fetched from the coupon endpoint if omitted)
        #[arg(short, long)]
        coupons: Option<PathBuf>,

        /// Wishlist JSON: product ids, product URLs or {"id", "title"} objects
        #[arg(short, long)]
        items: PathBuf,

        /// Product info JSON (product id -> info)
        #[arg(short, long, conflicts_with = "remote")]
        products: Option<PathBuf>,

        /// Look product info up on the product info endpoint
        #[arg(long)]
        remote: bool,

        /// Coupon ids to select (repeatable)
        #[arg(short, long = "activate")]
        activate: Vec<String>,

        /// Items per discovery batch
        #[arg(long, default_value = "20")]
        batch_size: usize,
    },
}

/// Settings loadable from `--config`; missing fields use the env defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    registry: RegistryConfig,
    catalog: CatalogConfig,
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config {:?}", path))
}

/// One wishlist entry as written in the items file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemRecord {
    Id(String),
    Item(Item),
}

fn load_items(path: &Path) -> Result<Vec<Item>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read items {:?}", path))?;
    let records: Vec<ItemRecord> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid items file {:?}", path))?;

    let mut items = Vec::with_capacity(records.len());
    for record in records {
        match record {
            ItemRecord::Item(item) => items.push(item),
            ItemRecord::Id(raw) if is_wishlist_url(&raw) => {
                tracing::warn!(url = %raw, "wishlist page is not a product; skipping")
            }
            ItemRecord::Id(raw) if raw.contains("://") => match product_id_from_url(&raw) {
                Some(id) => items.push(Item::new(id)),
                None => tracing::warn!(url = %raw, "failed to parse product id; skipping"),
            },
            ItemRecord::Id(id) => items.push(Item::new(id)),
        }
    }
    Ok(items)
}

fn coupon_source(path: Option<&Path>, config: &CatalogConfig) -> Result<Arc<dyn CouponSource>> {
    Ok(match path {
        Some(path) => Arc::new(JsonFileCouponSource::new(path)),
        None => Arc::new(
            HttpCouponSource::from_config(config).context("Failed to create HTTP client")?,
        ),
    })
}

async fn product_source(
    products: Option<&Path>,
    remote: bool,
    config: &CatalogConfig,
) -> Result<Arc<dyn ProductInfoSource>> {
    if remote {
        return Ok(Arc::new(
            HttpProductInfoSource::from_config(config).context("Failed to create HTTP client")?,
        ));
    }
    match products {
        Some(path) => Ok(Arc::new(
            MemoryProductInfo::load(path)
                .await
                .with_context(|| format!("Failed to load product info {:?}", path))?,
        )),
        None => Ok(Arc::new(MemoryProductInfo::default())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    wishfilter_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Coupons { coupons, all } => cmd_coupons(&config, coupons.as_deref(), all).await,
        Commands::Filter {
            coupons,
            items,
            products,
            remote,
            activate,
            batch_size,
        } => {
            let options = FilterOptions {
                coupons,
                items,
                products,
                remote,
                activate,
                batch_size,
            };
            cmd_filter(&config, &options).await
        }
    };

    METRICS.flush();
    result
}

async fn cmd_coupons(config: &AppConfig, coupons: Option<&Path>, all: bool) -> Result<()> {
    let source = coupon_source(coupons, &config.catalog)?;
    let catalog = CouponCatalog::new(source, Arc::new(MemoryProductInfo::default()));
    let listing = catalog
        .listing(Utc::now(), all)
        .await
        .context("Failed to load coupons")?;

    if listing.is_empty() {
        println!("No usable coupons.");
        return Ok(());
    }
    for coupon in listing {
        let limit = coupon
            .limit
            .map(|limit| limit.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let marker = if coupon.available { " " } else { "x" };
        println!(
            "{} {:<24} {:>10}  until {}  {}",
            marker, coupon.id, coupon.discount, limit, coupon.name
        );
    }
    Ok(())
}

struct FilterOptions {
    coupons: Option<PathBuf>,
    items: PathBuf,
    products: Option<PathBuf>,
    remote: bool,
    activate: Vec<String>,
    batch_size: usize,
}

/// Visibility of one wishlist item under the selection
#[derive(Debug, Serialize)]
struct ItemVisibility {
    id: ItemId,
    title: String,
    visible: bool,
    matching: Vec<FilterId>,
    unresolved: Vec<FilterId>,
}

#[derive(Debug, Serialize)]
struct FilterReport {
    coupons: usize,
    active: Vec<FilterId>,
    items: Vec<ItemVisibility>,
    summary: CoordinatorSummary,
}

async fn run_filter(config: &AppConfig, options: &FilterOptions) -> Result<FilterReport> {
    let (coupons, products) = if options.remote && options.coupons.is_none() {
        remote_sources(&config.catalog).context("Failed to create HTTP client")?
    } else {
        (
            coupon_source(options.coupons.as_deref(), &config.catalog)?,
            product_source(options.products.as_deref(), options.remote, &config.catalog).await?,
        )
    };
    let catalog = CouponCatalog::new(coupons, products);
    let items = load_items(&options.items)?;

    let registry = Registry::new(config.registry.clone());
    let admitted = registry
        .init(&catalog, Utc::now())
        .await
        .context("Failed to load coupons")?;
    info!(coupons = admitted, items = items.len(), "catalog loaded");

    let (feed, handle) = Coordinator::spawn(registry.clone(), FEED_CAPACITY);
    for batch in items.chunks(options.batch_size.max(1)) {
        feed.items_discovered(batch.to_vec()).await?;
    }
    for id in &options.activate {
        feed.activate_filter(FilterId::new(id.as_str())).await?;
    }
    feed.settled().await?;
    drop(feed);
    let summary = handle.await.context("Coordinator task failed")?;

    let index: Vec<(FilterId, BTreeSet<ItemId>)> = registry
        .filters()
        .into_iter()
        .map(|filter| {
            let matching = registry.matching_items(&filter.id);
            (filter.id, matching)
        })
        .collect();

    let mut seen = BTreeSet::new();
    let mut rows = Vec::new();
    for item in &items {
        if !seen.insert(item.id.clone()) {
            continue;
        }
        rows.push(ItemVisibility {
            id: item.id.clone(),
            title: item.display_title().to_string(),
            visible: registry.is_visible(&item.id),
            matching: index
                .iter()
                .filter(|(_, matching)| matching.contains(&item.id))
                .map(|(filter, _)| filter.clone())
                .collect(),
            unresolved: registry.unresolved(&item.id).into_iter().collect(),
        });
    }

    Ok(FilterReport {
        coupons: admitted,
        active: registry.active_filters().into_iter().collect(),
        items: rows,
        summary,
    })
}

async fn cmd_filter(config: &AppConfig, options: &FilterOptions) -> Result<()> {
    let report = run_filter(config, options).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let visible = report.items.iter().filter(|item| item.visible).count();
    eprintln!(
        "{} of {} items visible under {} coupon(s); {} evaluation(s) failed",
        visible,
        report.items.len(),
        report.active.len(),
        report.summary.link.failed.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUPONS: &str = r#"[
        {"coupon_id": "voice", "coupon_name": "Voice 30%", "discount": "30",
         "discount_type": "rate", "condition_type": "custom_genre",
         "conditions": {"custom_genre": ["voice"]}, "limit_date": 4000000000},
        {"coupon_id": "single", "coupon_name": "Single", "discount": "10",
         "discount_type": "rate", "condition_type": "id_all",
         "conditions": {"product_all": ["RJ02"]}, "limit_date": 4000000000},
        {"coupon_id": "expired", "coupon_name": "Old", "discount": "90",
         "discount_type": "rate", "condition_type": "id_all",
         "conditions": {"product_all": ["RJ01"]}, "limit_date": 1000000000}
    ]"#;

    const PRODUCTS: &str = r#"{
        "RJ01": {"work_name": "Voice work", "site_id": "maniax", "custom_genres": ["voice"]},
        "RJ02": {"work_name": "Game", "site_id": "maniax", "custom_genres": ["game"]}
    }"#;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn options(dir: &Path, activate: &[&str]) -> FilterOptions {
        FilterOptions {
            coupons: Some(write(dir, "coupons.json", COUPONS)),
            items: write(
                dir,
                "items.json",
                r#"["RJ01",
                    {"id": "RJ02", "title": "Game"},
                    "https://www.dlsite.com/maniax/work/=/product_id/RJ03.html",
                    "RJ01"]"#,
            ),
            products: Some(write(dir, "products.json", PRODUCTS)),
            remote: false,
            activate: activate.iter().map(|id| id.to_string()).collect(),
            batch_size: 2,
        }
    }

    #[test]
    fn test_load_items_accepts_ids_urls_and_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "items.json",
            r#"["RJ01", {"id": "RJ02", "title": "Two"},
                "https://www.dlsite.com/maniax/work/=/product_id/RJ03.html",
                "https://www.dlsite.com/",
                "https://www.dlsite.com/maniax/mypage/wishlist"]"#,
        );

        let items = load_items(&path).unwrap();
        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["RJ01", "RJ02", "RJ03"]);
        assert_eq!(items[1].display_title(), "Two");
    }

    #[test]
    fn test_missing_items_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_items(&dir.path().join("absent.json")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read items"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.json",
            r#"{"registry": {"linker": {"max_in_flight": 2}}}"#,
        );

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.registry.linker.max_in_flight, 2);
        assert!(config.registry.change_buffer > 0);
        assert!(!config.catalog.coupons_url.is_empty());
    }

    #[tokio::test]
    async fn test_filter_projects_selection() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_filter(&AppConfig::default(), &options(dir.path(), &["voice"]))
            .await
            .unwrap();

        assert_eq!(report.coupons, 2);
        assert_eq!(report.active, vec![FilterId::new("voice")]);
        assert_eq!(report.items.len(), 3);

        let rj01 = &report.items[0];
        assert!(rj01.visible);
        assert_eq!(rj01.matching, vec![FilterId::new("voice")]);
        assert!(!report.items[1].visible);
        assert_eq!(report.items[1].matching, vec![FilterId::new("single")]);

        // RJ03 has no product info: the genre lookup fails, so it stays hidden.
        let rj03 = &report.items[2];
        assert!(!rj03.visible);
        assert_eq!(rj03.unresolved, vec![FilterId::new("voice")]);

        assert_eq!(report.summary.batches, 2);
        assert_eq!(report.summary.duplicates, 1);
    }

    #[tokio::test]
    async fn test_filter_without_selection_shows_everything() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_filter(&AppConfig::default(), &options(dir.path(), &[]))
            .await
            .unwrap();

        assert!(report.active.is_empty());
        assert!(report.items.iter().all(|item| item.visible));
    }
}
