//! Order submission
//!
//! The client sends lines priced at their *effective* unit price. A backend
//! should not take those prices at face value: [`OrderVerifier`] reprices every
//! line from the catalog and its own copy of the customer's discount.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::aggregates::cart::{Cart, CartLine, CheckoutPricingPipeline, PricedLine};
use crate::domain::aggregates::discount::DiscountRecord;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::round_minor;
use crate::{Result, StorefrontError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: u32,
    /// Effective (discounted) unit price in minor-unit precision.
    pub price: Decimal,
}

/// Payload for `POST /orders`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmission {
    pub reference: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub currency: String,
    pub items: Vec<OrderLine>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
}

impl OrderSubmission {
    pub fn from_cart(cart: &Cart, discount: Option<&DiscountRecord>, day: NaiveDate) -> Result<Self> {
        if cart.is_empty() { return Err(StorefrontError::Validation("cart is empty".into())); }
        if cart.lines().iter().any(|l| l.quantity == 0) {
            return Err(StorefrontError::Validation("line quantity must be at least 1".into()));
        }
        let pipeline = CheckoutPricingPipeline::default();
        let summary = pipeline.summarize(cart, discount, day)?.rounded();
        Ok(Self {
            reference: Uuid::now_v7(),
            customer_id: cart.customer_id().map(str::to_string),
            currency: cart.currency().to_string(),
            items: pipeline.price_lines(cart, discount, day)?.into_iter().map(OrderLine::from).collect(),
            subtotal: summary.subtotal.amount(),
            discount_amount: summary.discount_amount.amount(),
            total: summary.total.amount(),
        })
    }
}

impl From<PricedLine> for OrderLine {
    fn from(line: PricedLine) -> Self {
        Self { product_id: line.product_id, quantity: line.quantity, price: round_minor(line.effective_unit_price) }
    }
}

/// Source of authoritative base prices.
pub trait CatalogPrices {
    fn base_price(&self, product_id: &str) -> Option<Decimal>;
}

impl CatalogPrices for HashMap<String, Decimal> {
    fn base_price(&self, product_id: &str) -> Option<Decimal> { self.get(product_id).copied() }
}

/// Server-side recomputation of a submitted order.
pub struct OrderVerifier<C> {
    catalog: C,
    pipeline: CheckoutPricingPipeline,
    events: Vec<DomainEvent>,
}

impl<C: CatalogPrices> OrderVerifier<C> {
    pub fn new(catalog: C) -> Self { Self { catalog, pipeline: CheckoutPricingPipeline::default(), events: vec![] } }

    /// Returns the submission as the server would persist it. Client prices
    /// that disagree with the recomputed ones are replaced and recorded.
    pub fn verify(&mut self, submitted: &OrderSubmission, discount: Option<&DiscountRecord>, day: NaiveDate) -> Result<OrderSubmission> {
        let mut cart = Cart::new(&submitted.currency);
        for line in &submitted.items {
            if line.quantity == 0 {
                return Err(StorefrontError::Validation(format!("line {} has zero quantity", line.product_id)));
            }
            let base = self.catalog.base_price(&line.product_id)
                .ok_or_else(|| StorefrontError::UnknownProduct(line.product_id.clone()))?;
            cart.add_line(CartLine::new(line.product_id.clone(), base, line.quantity));
        }
        if cart.is_empty() { return Err(StorefrontError::Validation("order has no items".into())); }

        let verified = OrderSubmission {
            reference: submitted.reference,
            customer_id: submitted.customer_id.clone(),
            ..OrderSubmission::from_cart(&cart, discount, day)?
        };

        for line in &submitted.items {
            let Some(server) = verified.items.iter().find(|v| v.product_id == line.product_id) else { continue };
            if server.price != line.price {
                warn!(product_id = %line.product_id, submitted = %line.price, verified = %server.price, "repricing order line");
                self.raise_event(DomainEvent::Order(OrderEvent::LineRepriced {
                    product_id: line.product_id.clone(),
                    submitted: line.price,
                    verified: server.price,
                }));
            }
        }
        info!(reference = %verified.reference, total = %verified.total, "order verified");
        self.raise_event(DomainEvent::Order(OrderEvent::Verified { reference: verified.reference.to_string(), total: verified.total }));
        Ok(verified)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::discount::parse_day;
    use rust_decimal_macros::dec;

    fn day(s: &str) -> NaiveDate { parse_day(s).unwrap() }

    fn discount() -> DiscountRecord { DiscountRecord::new(dec!(15), day("2024-01-01"), day("2024-12-31"), true) }

    fn catalog() -> HashMap<String, Decimal> {
        HashMap::from([("P1".to_string(), dec!(200)), ("P2".to_string(), dec!(9.99))])
    }

    #[test]
    fn test_submission_carries_effective_prices() {
        let cart = Cart::from_lines("USD", [CartLine::new("P1", dec!(200), 2), CartLine::new("P2", dec!(9.99), 1)]);
        let order = OrderSubmission::from_cart(&cart, Some(&discount()), day("2024-06-01")).unwrap();
        assert_eq!(order.items[0].price, dec!(170.00));
        assert_eq!(order.items[1].price, dec!(8.49));
        assert_eq!(order.subtotal, dec!(409.99));
        assert_eq!(order.subtotal - order.total, order.discount_amount);
    }

    #[test]
    fn test_empty_cart_rejected_before_submit() {
        let err = OrderSubmission::from_cart(&Cart::new("USD"), None, day("2024-06-01")).unwrap_err();
        assert!(matches!(err, StorefrontError::Validation(_)));
    }

    #[test]
    fn test_negative_price_rejected_before_submit() {
        let cart = Cart::from_lines("USD", [CartLine::new("P1", dec!(200), 1), CartLine::new("P2", dec!(-100), 1)]);
        let err = OrderSubmission::from_cart(&cart, Some(&discount()), day("2024-06-01")).unwrap_err();
        assert!(matches!(err, StorefrontError::Validation(ref m) if m.contains("P2")));
    }

    #[test]
    fn test_verifier_accepts_honest_order() {
        let cart = Cart::from_lines("USD", [CartLine::new("P1", dec!(200), 2)]);
        let submitted = OrderSubmission::from_cart(&cart, Some(&discount()), day("2024-06-01")).unwrap();
        let mut verifier = OrderVerifier::new(catalog());
        let verified = verifier.verify(&submitted, Some(&discount()), day("2024-06-01")).unwrap();
        assert_eq!(verified, submitted);
        let events = verifier.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DomainEvent::Order(OrderEvent::Verified { .. })));
    }

    #[test]
    fn test_verifier_reprices_tampered_line() {
        let cart = Cart::from_lines("USD", [CartLine::new("P1", dec!(200), 2)]);
        let mut submitted = OrderSubmission::from_cart(&cart, Some(&discount()), day("2024-06-01")).unwrap();
        submitted.items[0].price = dec!(1.00);
        submitted.total = dec!(2.00);

        // The discount expired by the time the server saw it.
        let mut verifier = OrderVerifier::new(catalog());
        let verified = verifier.verify(&submitted, Some(&discount()), day("2025-01-02")).unwrap();
        assert_eq!(verified.items[0].price, dec!(200));
        assert_eq!(verified.total, dec!(400));
        assert!(verified.discount_amount.is_zero());
        assert!(verifier.take_events().contains(&DomainEvent::Order(OrderEvent::LineRepriced {
            product_id: "P1".into(), submitted: dec!(1.00), verified: dec!(200),
        })));
    }

    #[test]
    fn test_verifier_rejects_unknown_product() {
        let cart = Cart::from_lines("USD", [CartLine::new("P9", dec!(5), 1)]);
        let submitted = OrderSubmission::from_cart(&cart, None, day("2024-06-01")).unwrap();
        let err = OrderVerifier::new(catalog()).verify(&submitted, None, day("2024-06-01")).unwrap_err();
        assert!(matches!(err, StorefrontError::UnknownProduct(id) if id == "P9"));
    }
}
