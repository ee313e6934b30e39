use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::ServiceError;

const DEFAULT_CURRENCY: &str = "PLN";
const DEFAULT_MIN_QTY: u32 = 1;
const DEFAULT_MAX_QTY: u32 = 64;

/// One purchasable item with its fulfillment command templates.
///
/// Templates carry `{player}` and `{amount}` placeholders that are filled in
/// at fulfillment time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub min_qty: u32,
    pub max_qty: u32,
    pub commands: Vec<String>,
}

impl CatalogItem {
    /// Total price for `quantity` units, rounded half-up to the currency's
    /// two minor digits. The only monetary arithmetic in the crate.
    pub fn total_for(&self, quantity: u32) -> Decimal {
        (self.unit_price * Decimal::from(quantity))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Clamps a quantity into this item's bounds.
    pub fn clamp_quantity(&self, quantity: i64) -> u32 {
        quantity.clamp(i64::from(self.min_qty), i64::from(self.max_qty)) as u32
    }

    /// Renders the ordered command list for one fulfillment attempt.
    pub fn render_commands(&self, identity: &str, quantity: u32) -> Vec<String> {
        self.commands
            .iter()
            .map(|template| {
                template
                    .replace("{player}", identity)
                    .replace("{amount}", &quantity.to_string())
            })
            .collect()
    }
}

/// The validated, immutable set of purchasable items. Replaced wholesale on
/// reload; never mutated in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    pub currency: String,
    pub items: Vec<CatalogItem>,
}

impl Catalog {
    pub fn item(&self, id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// On-disk catalog format.
#[derive(Debug, Deserialize)]
pub struct CatalogSource {
    pub currency: Option<String>,
    pub products: Vec<CatalogSourceItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSourceItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub price: Decimal,
    pub min_qty: Option<i64>,
    pub max_qty: Option<i64>,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl Catalog {
    /// Validates a raw catalog wholesale. Any failure rejects the entire
    /// source so the caller can keep serving the previous catalog.
    ///
    /// Bounds are normalized rather than rejected: a missing minimum becomes
    /// 1, a missing maximum 64, and a maximum below the minimum is raised to
    /// the minimum.
    pub fn from_source(source: CatalogSource) -> Result<Self, ServiceError> {
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(source.products.len());

        for raw in source.products {
            if raw.id.is_empty() || raw.name.is_empty() {
                return Err(ServiceError::ValidationError(
                    "every product needs an id and a name".to_string(),
                ));
            }
            if !seen.insert(raw.id.clone()) {
                return Err(ServiceError::ValidationError(format!(
                    "duplicate product id: {}",
                    raw.id
                )));
            }
            if raw.price <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "non-positive price for product {}",
                    raw.id
                )));
            }
            if raw.commands.is_empty() {
                return Err(ServiceError::ValidationError(format!(
                    "product {} has no fulfillment commands",
                    raw.id
                )));
            }

            // Bounds beyond u32 saturate rather than wrap.
            let min_qty = match raw.min_qty {
                Some(min) if min >= 1 => u32::try_from(min).unwrap_or(u32::MAX),
                Some(_) => DEFAULT_MIN_QTY,
                None => DEFAULT_MIN_QTY,
            };
            let max_qty = match raw.max_qty {
                Some(max) if max >= i64::from(min_qty) => u32::try_from(max).unwrap_or(u32::MAX),
                Some(_) => min_qty,
                None => DEFAULT_MAX_QTY.max(min_qty),
            };

            items.push(CatalogItem {
                id: raw.id,
                name: raw.name,
                unit_price: raw.price,
                min_qty,
                max_qty,
                commands: raw.commands,
            });
        }

        Ok(Catalog {
            currency: source.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            items,
        })
    }
}
