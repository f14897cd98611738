//! OrderBook: the transactional writer that decrements stock and persists
//! an order atomically, and its inverse, cancellation with stock restore.
//!
//! Orders are persisted to a JSON file under a single `RwLock`, mirroring
//! the store pattern used across this engine. Inventory mutation is
//! delegated to [`sa_catalog::Catalog`], which is the sole owner of stock
//! rows and performs the all-or-nothing decrement for every line in one
//! lock acquisition.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use sa_catalog::Catalog;
use sa_domain::error::{Error, Result};
use sa_domain::model::{Order, OrderLine, OrderStatus, PaymentStatus};
use sa_domain::trace::TraceEvent;

/// One requested line item for `CreateOrder`.
#[derive(Debug, Clone)]
pub struct OrderLineRequest {
    pub product_id: String,
    pub quantity: u32,
}

pub struct OrderBook {
    catalog: Arc<Catalog>,
    path: PathBuf,
    orders: RwLock<HashMap<String, Order>>,
}

impl OrderBook {
    pub fn new(catalog: Arc<Catalog>, state_path: &Path) -> Result<Self> {
        let dir = state_path.join("orders");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        let path = dir.join("orders.json");

        let orders = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        Ok(Self {
            catalog,
            path,
            orders: RwLock::new(orders),
        })
    }

    /// Create an order atomically: validates and decrements stock for every
    /// line in a single lock acquisition, then commits the header and
    /// lines. On any failure, no stock is consumed.
    pub fn create_order(
        &self,
        user_id: &str,
        lines: &[OrderLineRequest],
        shipping_address: impl Into<String>,
        notes: Option<String>,
        session_id: Option<String>,
    ) -> Result<Order> {
        if lines.is_empty() {
            return Err(Error::Validation {
                field: "lines".into(),
                message: "an order must contain at least one line".into(),
            });
        }

        let requests: Vec<(String, u32)> = lines
            .iter()
            .map(|l| (l.product_id.clone(), l.quantity))
            .collect();
        let snapshots = self.catalog.decrement_many(&requests)?;

        let order_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let order_lines: Vec<OrderLine> = snapshots
            .into_iter()
            .zip(lines.iter())
            .map(|((product, _remaining), req)| OrderLine {
                id: uuid::Uuid::new_v4().to_string(),
                order_id: order_id.clone(),
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                sku: product.barcode.clone(),
                quantity: req.quantity,
                unit_price: product.final_price,
                discount: 0.0,
            })
            .collect();

        let mut order = Order {
            id: order_id.clone(),
            user_id: user_id.to_owned(),
            status: OrderStatus::Confirmed,
            payment_status: PaymentStatus::Pending,
            lines: order_lines,
            subtotal: 0.0,
            tax: 0.0,
            shipping: 0.0,
            discount: 0.0,
            total: 0.0,
            shipping_address: shipping_address.into(),
            contact: None,
            session_id,
            notes,
            created_at: now,
            updated_at: now,
        };
        order.recompute_totals();

        self.orders.write().insert(order_id.clone(), order.clone());
        self.flush()?;

        TraceEvent::OrderCreated {
            order_id: order_id.clone(),
            product_count: order.lines.len(),
            total: order.total,
        }
        .emit();
        for line in &order.lines {
            TraceEvent::StockDecremented {
                product_id: line.product_id.clone(),
                by: line.quantity,
                remaining: 0,
            }
            .emit();
        }

        Ok(order)
    }

    /// Cancel an order: restores stock for every line, sets status
    /// `cancelled` and payment status `refunded`. Rejected when the order
    /// is already `delivered` or `cancelled`.
    pub fn cancel(&self, order_id: &str, reason: Option<String>) -> Result<Order> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| Error::NotFound(format!("order '{order_id}'")))?;

        if matches!(order.status, OrderStatus::Delivered | OrderStatus::Cancelled) {
            return Err(Error::Conflict(format!(
                "order '{order_id}' cannot be cancelled from status {:?}",
                order.status
            )));
        }

        for line in &order.lines {
            self.catalog.restore_stock(&line.product_id, line.quantity)?;
        }

        order.status = OrderStatus::Cancelled;
        order.payment_status = PaymentStatus::Refunded;
        order.updated_at = Utc::now();
        if let Some(reason) = &reason {
            let note = format!("cancelled: {reason}");
            order.notes = Some(match &order.notes {
                Some(existing) => format!("{existing}\n{note}"),
                None => note,
            });
        }
        let result = order.clone();
        drop(orders);
        self.flush()?;

        TraceEvent::OrderCancelled {
            order_id: order_id.to_owned(),
            reason: reason.unwrap_or_default(),
        }
        .emit();

        Ok(result)
    }

    pub fn get_by_id(&self, order_id: &str) -> Option<Order> {
        self.orders.read().get(order_id).cloned()
    }

    fn flush(&self) -> Result<()> {
        let orders = self.orders.read();
        let json = serde_json::to_string_pretty(&*orders)
            .map_err(|e| Error::Other(format!("serializing orders: {e}")))?;
        std::fs::write(&self.path, json).map_err(Error::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::ProductProjection;

    fn setup() -> (OrderBook, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::empty(5000);
        // Seed directly through decrement/restore round trip isn't possible
        // without a seed path, so build via a fixture file instead.
        drop(catalog);

        let fixture_path = dir.path().join("catalog.json");
        let products = vec![
            ProductProjection {
                id: "p1".into(),
                name: "Zapatillas".into(),
                barcode: Some("BC1".into()),
                brand: None,
                category: None,
                unit_price: 50.0,
                final_price: 45.0,
                discount_percent: Some(10.0),
                promotion_text: None,
                promotion_valid_until: None,
                available: 5,
                active: true,
                location: None,
            },
        ];
        std::fs::write(
            &fixture_path,
            serde_json::to_string(&serde_json::json!({ "products": products })).unwrap(),
        )
        .unwrap();

        let catalog = Arc::new(Catalog::load_from_file(&fixture_path, 5000).unwrap());
        let book = OrderBook::new(catalog, dir.path()).unwrap();
        (book, dir)
    }

    #[test]
    fn create_order_decrements_stock_and_commits() {
        let (book, _dir) = setup();
        let order = book
            .create_order(
                "u1",
                &[OrderLineRequest {
                    product_id: "p1".into(),
                    quantity: 2,
                }],
                "Calle Falsa 123",
                None,
                None,
            )
            .unwrap();

        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.total, 90.0);
        assert_eq!(order.lines[0].product_name, "Zapatillas");
    }

    #[test]
    fn create_order_fails_on_insufficient_stock_without_partial_commit() {
        let (book, _dir) = setup();
        let err = book
            .create_order(
                "u1",
                &[OrderLineRequest {
                    product_id: "p1".into(),
                    quantity: 99,
                }],
                "Calle Falsa 123",
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn cancel_restores_stock() {
        let (book, _dir) = setup();
        let order = book
            .create_order(
                "u1",
                &[OrderLineRequest {
                    product_id: "p1".into(),
                    quantity: 2,
                }],
                "Calle Falsa 123",
                None,
                None,
            )
            .unwrap();

        let cancelled = book.cancel(&order.id, Some("cliente cambió de opinión".into())).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
    }

    #[test]
    fn cancel_rejected_when_already_cancelled() {
        let (book, _dir) = setup();
        let order = book
            .create_order(
                "u1",
                &[OrderLineRequest {
                    product_id: "p1".into(),
                    quantity: 1,
                }],
                "Calle Falsa 123",
                None,
                None,
            )
            .unwrap();
        book.cancel(&order.id, None).unwrap();
        let err = book.cancel(&order.id, None).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
