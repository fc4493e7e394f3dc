use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use url::Url;

static ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,36}$").expect("invalid id pattern"));
static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^1?\d?\d%$").expect("invalid percent pattern"));

/// One validated `<SHOPITEM>`. Deserialized from the feed XML (uppercase
/// element names), serialized to the downstream JSON contract (camelCase
/// names). Unknown feed elements are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopItem {
    #[serde(rename(deserialize = "ITEM_ID", serialize = "id"))]
    pub id: ItemId,
    #[serde(rename(deserialize = "PRODUCTNAME", serialize = "name"), default)]
    pub product_name: String,
    #[serde(rename(deserialize = "PRODUCT", serialize = "product"), default)]
    pub product: String,
    #[serde(rename(deserialize = "DESCRIPTION", serialize = "description"), default)]
    pub description: String,
    #[serde(rename(deserialize = "URL", serialize = "url"), default)]
    pub url: UrlField,
    #[serde(rename(deserialize = "IMGURL", serialize = "imageUrl"), default)]
    pub image_url: UrlField,
    #[serde(
        rename(deserialize = "IMGURL_ALTERNATIVE", serialize = "imageUrlsAlternate"),
        default
    )]
    pub image_urls_alternate: Vec<UrlField>,
    #[serde(rename(deserialize = "VIDEO_URL", serialize = "videoUrl"), default)]
    pub video_url: UrlField,
    #[serde(rename(deserialize = "PRICE_VAT", serialize = "priceWithVat"))]
    pub price_vat: Price,
    #[serde(rename(deserialize = "VAT", serialize = "vat"), default)]
    pub vat: Percent,
    #[serde(rename(deserialize = "ITEM_TYPE", serialize = "type"), default)]
    pub item_type: String,
    #[serde(rename(deserialize = "HEUREKA_CPC", serialize = "cpc"), default)]
    pub cpc: Price,
    #[serde(rename(deserialize = "MANUFACTURER", serialize = "manufacterer"), default)]
    pub manufacturer: String,
    #[serde(rename(deserialize = "CATEGORYTEXT", serialize = "category"), default)]
    pub category: String,
    #[serde(rename(deserialize = "EAN", serialize = "ean"), default)]
    pub ean: String,
    #[serde(rename(deserialize = "ISBN", serialize = "isbn"), default)]
    pub isbn: String,
    #[serde(rename(deserialize = "PARAM", serialize = "parameters"), default)]
    pub parameters: Vec<Parameter>,
    #[serde(rename(deserialize = "DELIVERY_DATE", serialize = "deliveryDay"), default)]
    pub delivery_date: String,
    #[serde(rename(deserialize = "DELIVERY", serialize = "deliveries"), default)]
    pub deliveries: Vec<Delivery>,
    #[serde(rename(deserialize = "ITEMGROUP_ID", serialize = "groupId"), default)]
    pub group_id: String,
    #[serde(rename(deserialize = "ACCESSORY", serialize = "accessories"), default)]
    pub accessories: Vec<String>,
    #[serde(rename(deserialize = "DUES", serialize = "dues"), default)]
    pub dues: Price,
    #[serde(rename(deserialize = "GIFT", serialize = "gifts"), default)]
    pub gifts: Vec<Gift>,
}

impl ShopItem {
    /// An item bids on the marketplace iff its cost-per-click is strictly
    /// positive.
    pub fn is_bidding(&self) -> bool {
        self.cpc.0 > Decimal::ZERO
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    #[serde(rename(deserialize = "PARAM_NAME", serialize = "name"), default)]
    pub name: String,
    #[serde(rename(deserialize = "VAL", serialize = "value"), default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delivery {
    #[serde(rename(deserialize = "DELIVERY_ID", serialize = "id"), default)]
    pub id: String,
    #[serde(rename(deserialize = "DELIVERY_PRICE", serialize = "price"), default)]
    pub price: Price,
    #[serde(
        rename(deserialize = "DELIVERY_PRICE_COD", serialize = "priceCod"),
        default
    )]
    pub price_cod: Price,
}

/// A free item attached to an order: `<GIFT ID="g1">name</GIFT>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Gift {
    #[serde(rename(deserialize = "@ID", serialize = "id"), default)]
    pub id: Option<ItemId>,
    #[serde(rename(deserialize = "$text", serialize = "name"), default)]
    pub name: String,
}

/// Opaque item identifier: 1-36 characters of `[A-Za-z0-9_-]` after
/// trimming surrounding whitespace.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
pub struct ItemId(String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !ID_RE.is_match(trimmed) {
            return Err(format!("item id '{s}' does not match the allowed format"));
        }
        Ok(ItemId(trimmed.to_string()))
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// A URL-valued element. Empty is allowed; anything else must parse as an
/// absolute URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrlField(pub Option<Url>);

impl Serialize for UrlField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            Some(url) => serializer.serialize_str(url.as_str()),
            None => serializer.serialize_str(""),
        }
    }
}

impl<'de> Deserialize<'de> for UrlField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(UrlField(None));
        }
        // Url::parse only accepts absolute URLs; relative inputs fail here.
        let url = Url::parse(trimmed)
            .map_err(|err| de::Error::custom(format!("url '{trimmed}' is invalid: {err}")))?;
        Ok(UrlField(Some(url)))
    }
}

/// A percentage between 0% and 199%, kept in its textual form. Empty is
/// allowed.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Percent(String);

impl Percent {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Percent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Percent(String::new()));
        }
        if !PERCENT_RE.is_match(trimmed) {
            return Err(de::Error::custom(format!(
                "percentage value '{trimmed}' is invalid"
            )));
        }
        Ok(Percent(trimmed.to_string()))
    }
}

/// A price decimal. Feed values tolerate thousands spaces and comma
/// decimal separators: `"1 000,32"` parses to `1000.32`; anything that is
/// not a decimal after normalization is rejected.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Price(pub Decimal);

impl Default for Price {
    fn default() -> Self {
        Price(Decimal::ZERO)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Price {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace(' ', "").replace(',', ".");
        let value = Decimal::from_str(&normalized)
            .map_err(|err| format!("price '{s}' is invalid: {err}"))?;
        Ok(Price(value))
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
