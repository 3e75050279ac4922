use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Placeholder for a field that is missing from the markup.
pub const NOT_AVAILABLE: &str = "N/A";

/// Whether the account bought or sold the item.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Purchase,
    /// Anything that is not explicitly marked as a purchase.
    #[default]
    Sale,
}

serde_plain::derive_display_from_serialize!(TransactionType);
serde_plain::derive_fromstr_from_deserialize!(TransactionType);

impl TransactionType {
    /// Interprets the gain/loss marker shown next to each row. `+` is a purchase; anything else,
    /// including a missing marker, is a sale.
    pub fn from_marker(marker: &str) -> Self {
        if marker.trim() == "+" {
            TransactionType::Purchase
        } else {
            TransactionType::Sale
        }
    }
}

/// One row as it appears in a page of market history. The dates are the short form Steam shows,
/// e.g. `Thu Feb 20`, which carry no year.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// When the purchase or sale happened.
    pub acted_on_date: String,
    /// When the item was listed.
    pub listed_on_date: String,
    pub item_name: String,
    pub kind: TransactionType,
    pub price: Decimal,
}

impl Default for RawTransaction {
    fn default() -> Self {
        Self {
            acted_on_date: NOT_AVAILABLE.to_string(),
            listed_on_date: NOT_AVAILABLE.to_string(),
            item_name: NOT_AVAILABLE.to_string(),
            kind: TransactionType::Sale,
            price: Decimal::ZERO,
        }
    }
}

/// One row of the exported table. The field order is the column order.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct FinalizedTransaction {
    #[serde(rename = "Sold/Purchased Date")]
    pub sold_or_purchased_date: String,
    #[serde(rename = "Listed Date")]
    pub listed_date: String,
    #[serde(rename = "Item Name")]
    pub item_name: String,
    #[serde(rename = "Type")]
    pub kind: TransactionType,
    #[serde(rename = "Price")]
    pub price: Decimal,
}
