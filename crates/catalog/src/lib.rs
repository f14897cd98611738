//! Catalog: read side of the product inventory.
//!
//! Seeded once at startup from a JSON fixture file and held in memory under
//! a single `RwLock`. `OrderBook` is the only other component permitted to
//! mutate rows, through [`Catalog::decrement_stock`] / [`Catalog::restore_stock`].

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;

use sa_domain::error::{Error, Result};
use sa_domain::model::ProductProjection;

const READ_TIMEOUT_MS_DEFAULT: u64 = 5000;

/// Fixed Spanish-language stop list for keyword search token filtering.
const STOP_WORDS: &[&str] = &[
    "el", "la", "los", "las", "de", "del", "un", "una", "unos", "unas", "con", "para", "por",
    "que", "como", "más", "mas", "sin", "sus", "este", "esta", "estos", "estas", "y", "o",
];

#[derive(Debug, Clone, Deserialize)]
struct CatalogFixture {
    products: Vec<ProductProjection>,
}

/// Read-mostly product catalog.
pub struct Catalog {
    rows: RwLock<HashMap<String, ProductProjection>>,
    read_timeout: Duration,
}

impl Catalog {
    /// Seed the catalog from a JSON fixture at `path`. The fixture is a
    /// `{"products": [ProductProjection, ...]}` document.
    pub fn load_from_file(path: &Path, read_timeout_ms: u64) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        let fixture: CatalogFixture = serde_json::from_str(&raw)?;
        let rows = fixture
            .products
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        tracing::info!(path = %path.display(), products = ?rows_len(&rows), "catalog seeded");

        Ok(Self {
            rows: RwLock::new(rows),
            read_timeout: Duration::from_millis(if read_timeout_ms > 0 {
                read_timeout_ms
            } else {
                READ_TIMEOUT_MS_DEFAULT
            }),
        })
    }

    /// Build an empty catalog (useful for tests or as a fallback when the
    /// fixture is missing).
    pub fn empty(read_timeout_ms: u64) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            read_timeout: Duration::from_millis(if read_timeout_ms > 0 {
                read_timeout_ms
            } else {
                READ_TIMEOUT_MS_DEFAULT
            }),
        }
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub async fn list_active(&self, limit: usize) -> Result<Vec<ProductProjection>> {
        self.with_timeout(async {
            let rows = self.rows.read();
            let mut out: Vec<ProductProjection> =
                rows.values().filter(|p| p.active).cloned().collect();
            out.sort_by(|a, b| a.name.cmp(&b.name));
            out.truncate(limit);
            Ok(out)
        })
        .await
    }

    /// Case-insensitive substring match over name and SKU/barcode,
    /// OR-combined across tokens. Tokens of length <=2 and stop words are
    /// dropped; an empty resulting token list falls back to the raw string.
    pub async fn search_by_keywords(&self, raw_query: &str) -> Result<Vec<ProductProjection>> {
        let tokens = tokenize(raw_query);
        let effective: Vec<String> = if tokens.is_empty() {
            vec![raw_query.to_lowercase()]
        } else {
            tokens
        };

        self.with_timeout(async {
            let rows = self.rows.read();
            let mut out: Vec<ProductProjection> = rows
                .values()
                .filter(|p| p.active)
                .filter(|p| {
                    let name = p.name.to_lowercase();
                    let sku = p.barcode.as_deref().unwrap_or("").to_lowercase();
                    effective
                        .iter()
                        .any(|t| name.contains(t.as_str()) || sku.contains(t.as_str()))
                })
                .cloned()
                .collect();
            out.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(out)
        })
        .await
    }

    /// Return projections for the given ordered barcode set. The result is
    /// a subset ordered to match the input order where matched.
    pub async fn get_by_barcodes(&self, barcodes: &[String]) -> Result<Vec<ProductProjection>> {
        self.with_timeout(async {
            let rows = self.rows.read();
            let by_barcode: HashMap<&str, &ProductProjection> = rows
                .values()
                .filter_map(|p| p.barcode.as_deref().map(|b| (b, p)))
                .collect();

            Ok(barcodes
                .iter()
                .filter_map(|b| by_barcode.get(b.as_str()).cloned().cloned())
                .collect())
        })
        .await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<ProductProjection>> {
        self.with_timeout(async { Ok(self.rows.read().get(id).cloned()) })
            .await
    }

    // ── Writes (OrderBook only) ─────────────────────────────────────

    /// Atomically decrement `available` by `qty` if sufficient stock
    /// exists. Returns the remaining quantity.
    pub fn decrement_stock(&self, product_id: &str, qty: u32) -> Result<u32> {
        let mut rows = self.rows.write();
        let row = rows
            .get_mut(product_id)
            .filter(|p| p.active)
            .ok_or_else(|| Error::NotFound(format!("product '{product_id}'")))?;
        if row.available < qty {
            return Err(Error::Conflict(format!(
                "insufficient stock for '{product_id}': available={}, requested={}",
                row.available, qty
            )));
        }
        row.available -= qty;
        Ok(row.available)
    }

    /// Restore `qty` units to a product's stock (order cancellation).
    pub fn restore_stock(&self, product_id: &str, qty: u32) -> Result<u32> {
        let mut rows = self.rows.write();
        let row = rows
            .get_mut(product_id)
            .ok_or_else(|| Error::NotFound(format!("product '{product_id}'")))?;
        row.available += qty;
        Ok(row.available)
    }

    /// Decrement every `(product_id, qty)` pair as a single all-or-nothing
    /// transaction: every row is validated for availability before any row
    /// is mutated, all under one write-lock acquisition so no other writer
    /// can interleave a partial commit. Also snapshots each row's name and
    /// barcode at decrement time for order-line freezing.
    pub fn decrement_many(
        &self,
        requests: &[(String, u32)],
    ) -> Result<Vec<(ProductProjection, u32)>> {
        let mut rows = self.rows.write();

        for (product_id, qty) in requests {
            let row = rows
                .get(product_id)
                .filter(|p| p.active)
                .ok_or_else(|| Error::NotFound(format!("product '{product_id}'")))?;
            if row.available < *qty {
                return Err(Error::Conflict(format!(
                    "insufficient stock for '{product_id}': available={}, requested={}",
                    row.available, qty
                )));
            }
        }

        let mut snapshots = Vec::with_capacity(requests.len());
        for (product_id, qty) in requests {
            let row = rows.get_mut(product_id).expect("validated above");
            row.available -= qty;
            snapshots.push((row.clone(), row.available));
        }
        Ok(snapshots)
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
        T: Default,
    {
        match tokio::time::timeout(self.read_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = self.read_timeout.as_millis() as u64, "catalog read timed out");
                Ok(T::default())
            }
        }
    }
}

fn rows_len(rows: &HashMap<String, ProductProjection>) -> usize {
    rows.len()
}

fn tokenize(raw: &str) -> Vec<String> {
    raw.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2 && !STOP_WORDS.contains(t))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(id: &str, name: &str, available: u32) -> ProductProjection {
        ProductProjection {
            id: id.into(),
            name: name.into(),
            barcode: Some(format!("BC-{id}")),
            brand: None,
            category: None,
            unit_price: 10.0,
            final_price: 10.0,
            discount_percent: None,
            promotion_text: None,
            promotion_valid_until: None,
            available,
            active: true,
            location: None,
        }
    }

    fn catalog_with(products: Vec<ProductProjection>) -> Catalog {
        let rows = products.into_iter().map(|p| (p.id.clone(), p)).collect();
        Catalog {
            rows: RwLock::new(rows),
            read_timeout: Duration::from_millis(READ_TIMEOUT_MS_DEFAULT),
        }
    }

    #[tokio::test]
    async fn search_by_keywords_matches_name_substring() {
        let catalog = catalog_with(vec![product("p1", "Zapatillas Running Pro", 5)]);
        let results = catalog.search_by_keywords("running").await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn search_drops_short_tokens_and_stopwords() {
        let catalog = catalog_with(vec![product("p1", "Zapatillas de Running", 5)]);
        let results = catalog.search_by_keywords("de running").await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn get_by_barcodes_preserves_input_order() {
        let catalog = catalog_with(vec![product("p1", "A", 1), product("p2", "B", 1)]);
        let barcodes = vec!["BC-p2".to_string(), "BC-p1".to_string()];
        let results = catalog.get_by_barcodes(&barcodes).await.unwrap();
        assert_eq!(results[0].id, "p2");
        assert_eq!(results[1].id, "p1");
    }

    #[test]
    fn decrement_stock_fails_when_insufficient() {
        let catalog = catalog_with(vec![product("p1", "A", 2)]);
        let err = catalog.decrement_stock("p1", 5).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn decrement_then_restore_round_trips() {
        let catalog = catalog_with(vec![product("p1", "A", 10)]);
        let remaining = catalog.decrement_stock("p1", 4).unwrap();
        assert_eq!(remaining, 6);
        let restored = catalog.restore_stock("p1", 4).unwrap();
        assert_eq!(restored, 10);
    }

    #[test]
    fn promotion_is_valid_respects_until_date() {
        let mut p = product("p1", "A", 1);
        p.promotion_text = Some("20% off".into());
        p.promotion_valid_until = Some(Utc::now() - chrono::Duration::days(1));
        assert!(!p.promotion_is_valid(Utc::now()));
    }
}
