//! Coupon catalog model
//!
//! Only the fields the filter needs are modelled; everything else in the
//! coupon list payload is ignored.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use wishfilter_core::OrderKey;

/// How the discount amount is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// Percentage off
    Rate,
    /// Fixed amount off
    Price,
}

impl DiscountType {
    /// Rate coupons are listed before price coupons.
    fn rank(self) -> i64 {
        match self {
            DiscountType::Rate => 0,
            DiscountType::Price => 1,
        }
    }
}

/// How the coupon selects the products it applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    /// Explicit product id list (`conditions.product_all`)
    IdAll,
    /// Sale genres (`conditions.custom_genre`)
    CustomGenre,
    /// Storefront sites (`conditions.site_ids`)
    SiteIds,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_all: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_genre: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub coupon_id: String,
    pub coupon_name: String,
    /// Discount amount; the endpoint sends it as a string.
    #[serde(deserialize_with = "string_or_number")]
    pub discount: String,
    pub discount_type: DiscountType,
    pub condition_type: ConditionType,
    #[serde(default, deserialize_with = "conditions_or_empty")]
    pub conditions: Conditions,
    /// Last moment the coupon can be used, in unix seconds.
    #[serde(default)]
    pub limit_date: Option<i64>,
}

impl Coupon {
    /// Parsed discount amount, `0` when the field is not a number.
    pub fn discount_value(&self) -> i64 {
        self.discount.trim().parse().unwrap_or(0)
    }

    pub fn limit(&self) -> Option<DateTime<Utc>> {
        self.limit_date
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }

    /// Usable at `now`. A coupon without a readable limit date is not.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.limit().is_some_and(|limit| now <= limit)
    }

    /// Rate before price, larger discounts first, then the coupon that
    /// expires soonest. Coupons without a limit date sort last.
    pub fn order_key(&self) -> OrderKey {
        OrderKey::new([
            self.discount_type.rank(),
            self.discount_value().saturating_neg(),
            self.limit().map_or(i64::MAX, |limit| limit.timestamp()),
        ])
    }

    pub fn presentation_cmp(&self, other: &Coupon) -> Ordering {
        self.order_key()
            .cmp(&other.order_key())
            .then_with(|| self.coupon_id.cmp(&other.coupon_id))
    }

    /// Short label such as `30% OFF` or `100 OFF`.
    pub fn discount_label(&self) -> String {
        match self.discount_type {
            DiscountType::Rate => format!("{}% OFF", self.discount_value()),
            DiscountType::Price => format!("{} OFF", self.discount_value()),
        }
    }
}

/// Sort coupons into presentation order.
pub fn sort_for_presentation(coupons: &mut [Coupon]) {
    coupons.sort_by(Coupon::presentation_cmp);
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

/// The endpoint sends `[]` instead of an object for coupons without
/// conditions.
fn conditions_or_empty<'de, D>(deserializer: D) -> Result<Conditions, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Object(_) => {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        _ => Ok(Conditions::default()),
    }
}
