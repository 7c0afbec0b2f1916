//! Catalog wire types shared by the builder and the synchronizer.
//!
//! The replication protocol treats a product as an opaque,
//! fully-replaceable-by-id value: the authoritative store owns the schema,
//! and these types only pin down the JSON wire shape of published artifacts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable unique product key, owned by the authoritative store.
///
/// Strongly typed so product keys cannot be mixed up with other strings at
/// compile time. The value is opaque to the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a product ID from its raw representation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw ID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One catalog entry as published in snapshot and diff artifacts.
///
/// Free-text fields (`name`, `category`, `description`) feed the client-side
/// search index; the rest are passed through to catalog readers untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    /// Stable unique key.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Category label.
    pub category: String,
    /// Price in minor currency units.
    pub price: i64,
    /// Units in stock.
    pub stock_quantity: i64,
    /// Reference to the product image in media storage.
    pub image_ref: String,
    /// Free-text description used for search.
    pub description: String,
    /// Number of reviews received.
    pub review_count: u64,
    /// Average review rating.
    pub rating: f32,
}

/// One entry in a published diff set.
///
/// Diff files are JSON arrays mixing full product records with tombstones.
/// A tombstone (`{"id": ..., "deleted": true}`) marks a product removed from
/// the authoritative catalog so deletions propagate without waiting for the
/// next full rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiffEntry {
    /// An inserted or updated record; replaces any prior record with the
    /// same id.
    Upsert(ProductRecord),
    /// A deletion marker for the given id.
    Tombstone {
        /// The product being removed.
        id: ProductId,
        /// Always `true` on the wire; distinguishes the variant.
        deleted: bool,
    },
}

impl DiffEntry {
    /// Creates a tombstone entry for `id`.
    #[must_use]
    pub fn tombstone(id: ProductId) -> Self {
        Self::Tombstone { id, deleted: true }
    }

    /// The id this entry applies to.
    #[must_use]
    pub fn id(&self) -> &ProductId {
        match self {
            Self::Upsert(record) => &record.id,
            Self::Tombstone { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str) -> ProductRecord {
        ProductRecord {
            id: ProductId::new(id),
            name: "Walnut desk".to_string(),
            category: "furniture".to_string(),
            price: 64_900,
            stock_quantity: 12,
            image_ref: "media/desk.jpg".to_string(),
            description: "Solid walnut writing desk".to_string(),
            review_count: 41,
            rating: 4.6,
        }
    }

    #[test]
    fn product_record_wire_shape_is_camel_case() {
        let json = serde_json::to_value(product("p-1")).expect("serialize");
        assert_eq!(json["id"], "p-1");
        assert!(json.get("stockQuantity").is_some());
        assert!(json.get("imageRef").is_some());
        assert!(json.get("reviewCount").is_some());
    }

    #[test]
    fn diff_entry_distinguishes_tombstones() {
        let entries = vec![
            DiffEntry::Upsert(product("p-1")),
            DiffEntry::tombstone(ProductId::new("p-2")),
        ];
        let json = serde_json::to_string(&entries).expect("serialize");
        let parsed: Vec<DiffEntry> = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(parsed.len(), 2);
        assert!(matches!(&parsed[0], DiffEntry::Upsert(r) if r.id.as_str() == "p-1"));
        assert!(matches!(&parsed[1], DiffEntry::Tombstone { id, deleted: true } if id.as_str() == "p-2"));
    }

    #[test]
    fn tombstone_wire_shape() {
        let json = serde_json::to_value(DiffEntry::tombstone(ProductId::new("p-9"))).expect("serialize");
        assert_eq!(json, serde_json::json!({"id": "p-9", "deleted": true}));
    }
}
