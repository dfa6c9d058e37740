use serde::Deserialize;
use std::collections::HashMap;

/// Top-level container for one fetch of an Apple software-update catalog.
///
/// A catalog is immutable once parsed; re-fetching produces a new,
/// independent value.
#[derive(Debug, Deserialize)]
pub struct Catalog {
    #[serde(rename = "Products", default)]
    products: HashMap<String, super::Product>,

    /// Timestamp of catalog generation. Informational only.
    #[serde(rename = "IndexDate")]
    index_date: Option<plist::Date>,
}

impl Catalog {
    pub fn product(&self, product_id: &str) -> Option<&super::Product> {
        self.products.get(product_id)
    }

    pub fn index_date(&self) -> Option<&plist::Date> {
        self.index_date.as_ref()
    }

    /// Product identifiers in sorted order. The map itself iterates in hash
    /// order, so every scan goes through this to keep results deterministic.
    pub fn product_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.products.keys().map(String::as_str).collect();
        ids.sort();
        ids
    }
}
