//! Cart Aggregate and checkout pricing

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::discount::{DiscountCalculator, DiscountRecord};
use crate::domain::value_objects::{deserialize_opaque_id, Money, MoneyError};
use crate::{Result, StorefrontError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(alias = "productId", deserialize_with = "deserialize_opaque_id")]
    pub product_id: String,
    /// Catalog price before any discount.
    #[serde(alias = "price", alias = "unitPrice")]
    pub unit_price: Decimal,
    #[serde(alias = "qty")]
    pub quantity: u32,
}

impl CartLine {
    pub fn new(product_id: impl Into<String>, unit_price: Decimal, quantity: u32) -> Self {
        Self { product_id: product_id.into(), unit_price, quantity }
    }

    /// Catalog prices are never negative.
    pub fn validate(&self) -> Result<()> {
        if self.unit_price < Decimal::ZERO {
            return Err(StorefrontError::Validation(format!("line {} has a negative price", self.product_id)));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Cart {
    customer_id: Option<String>,
    lines: Vec<CartLine>,
    currency: String,
}

impl Cart {
    pub fn new(currency: &str) -> Self {
        Self { customer_id: None, lines: vec![], currency: currency.to_string() }
    }

    pub fn for_customer(customer_id: impl Into<String>, currency: &str) -> Self {
        let mut cart = Self::new(currency);
        cart.customer_id = Some(customer_id.into());
        cart
    }

    pub fn from_lines(currency: &str, lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut cart = Self::new(currency);
        lines.into_iter().for_each(|l| cart.add_line(l));
        cart
    }

    pub fn customer_id(&self) -> Option<&str> { self.customer_id.as_deref() }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    /// Same product at the same price merges into one line.
    pub fn add_line(&mut self, line: CartLine) {
        if let Some(existing) = self.lines.iter_mut().find(|l| l.product_id == line.product_id && l.unit_price == line.unit_price) {
            existing.quantity = existing.quantity.saturating_add(line.quantity);
        } else {
            self.lines.push(line);
        }
    }
}

/// Cart line with its discounted unit price, still at full precision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub effective_unit_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PricingSummary {
    pub subtotal: Money,
    pub discount_amount: Money,
    pub total: Money,
}

impl PricingSummary {
    /// Minor-unit view for display. The discount is derived from the rounded
    /// subtotal and total so the three figures always reconcile.
    pub fn rounded(&self) -> PricingSummary {
        let subtotal = self.subtotal.rounded();
        let total = self.total.rounded();
        let discount_amount = subtotal.subtract(&total).unwrap_or_else(|_| Money::zero(subtotal.currency()));
        PricingSummary { subtotal, discount_amount, total }
    }

    pub fn has_discount(&self) -> bool { !self.discount_amount.is_zero() }
}

/// Subtotal, discount and total for a cart under an optional customer discount.
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckoutPricingPipeline { calculator: DiscountCalculator }

impl CheckoutPricingPipeline {
    pub fn new(calculator: DiscountCalculator) -> Self { Self { calculator } }

    /// Rejects negative prices before any arithmetic.
    pub fn price_lines(&self, cart: &Cart, discount: Option<&DiscountRecord>, day: NaiveDate) -> Result<Vec<PricedLine>> {
        cart.lines()
            .iter()
            .map(|l| {
                l.validate()?;
                Ok(PricedLine {
                    product_id: l.product_id.clone(),
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    effective_unit_price: self.calculator.effective_amount(l.unit_price, discount, day)?,
                })
            })
            .collect()
    }

    /// Prices are non-negative and the discount is at most 100%, so
    /// `discount_amount = subtotal - total` is never negative.
    pub fn summarize(&self, cart: &Cart, discount: Option<&DiscountRecord>, day: NaiveDate) -> Result<PricingSummary> {
        let mut subtotal = Money::zero(cart.currency());
        let mut total = Money::zero(cart.currency());
        for line in self.price_lines(cart, discount, day)? {
            let qty = Decimal::from(line.quantity);
            let base = line.unit_price.checked_mul(qty).ok_or(MoneyError::Overflow)?;
            let effective = line.effective_unit_price.checked_mul(qty).ok_or(MoneyError::Overflow)?;
            subtotal = subtotal.add(&Money::new(base, cart.currency()))?;
            total = total.add(&Money::new(effective, cart.currency()))?;
        }
        let discount_amount = subtotal.subtract(&total)?;
        Ok(PricingSummary { subtotal, discount_amount, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::discount::parse_day;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn day(s: &str) -> NaiveDate { parse_day(s).unwrap() }

    #[test]
    fn test_cart_merges_lines() {
        let mut cart = Cart::for_customer("C1", "USD");
        cart.add_line(CartLine::new("P1", dec!(10), 2));
        cart.add_line(CartLine::new("P1", dec!(10), 1));
        cart.add_line(CartLine::new("P2", dec!(4.5), 1));
        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.lines()[0].quantity, 3);
        assert_eq!(cart.customer_id(), Some("C1"));
    }

    #[test]
    fn test_checkout_with_yearly_discount() {
        let discount = DiscountRecord::new(dec!(15), day("2024-01-01"), day("2024-12-31"), true);
        let cart: Vec<CartLine> = serde_json::from_value(json!([{ "productId": 7, "price": 200, "qty": 2 }])).unwrap();
        let cart = Cart::from_lines("USD", cart);
        let summary = CheckoutPricingPipeline::default().summarize(&cart, Some(&discount), day("2024-06-01")).unwrap().rounded();
        assert_eq!(summary.subtotal.amount(), dec!(400.00));
        assert_eq!(summary.total.amount(), dec!(340.00));
        assert_eq!(summary.discount_amount.amount(), dec!(60.00));
        assert_eq!(cart.lines()[0].product_id, "7");
    }

    #[test]
    fn test_inactive_discount_leaves_zero() {
        let discount = DiscountRecord::new(dec!(15), day("2024-01-01"), day("2024-12-31"), false);
        let cart = Cart::from_lines("USD", [CartLine::new("P1", dec!(19.99), 3), CartLine::new("P2", dec!(5), 1)]);
        let summary = CheckoutPricingPipeline::default().summarize(&cart, Some(&discount), day("2024-06-01")).unwrap();
        assert!(summary.discount_amount.is_zero());
        assert_eq!(summary.subtotal, summary.total);
        assert!(!summary.has_discount());
    }

    #[test]
    fn test_summary_reconciles_after_rounding() {
        let discount = DiscountRecord::new(dec!(12.5), day("2024-01-01"), day("2024-12-31"), true);
        let cart = Cart::from_lines("EUR", [
            CartLine::new("P1", dec!(3.33), 3),
            CartLine::new("P2", dec!(0.99), 7),
            CartLine::new("P3", dec!(149.95), 1),
        ]);
        let pipeline = CheckoutPricingPipeline::default();
        let exact = pipeline.summarize(&cart, Some(&discount), day("2024-02-29")).unwrap();
        assert_eq!(exact.subtotal.amount() - exact.total.amount(), exact.discount_amount.amount());
        let shown = exact.rounded();
        assert_eq!(shown.subtotal.amount() - shown.total.amount(), shown.discount_amount.amount());
        assert_eq!(pipeline.summarize(&cart, Some(&discount), day("2024-02-29")).unwrap(), exact);
    }

    #[test]
    fn test_empty_cart() {
        let summary = CheckoutPricingPipeline::default().summarize(&Cart::new("USD"), None, day("2024-01-01")).unwrap();
        assert_eq!(summary.total, Money::zero("USD"));
    }

    #[test]
    fn test_negative_price_rejected() {
        let discount = DiscountRecord::new(dec!(10), day("2024-01-01"), day("2024-12-31"), true);
        let cart = Cart::from_lines("USD", [CartLine::new("P1", dec!(-100), 1)]);
        let err = CheckoutPricingPipeline::default().summarize(&cart, Some(&discount), day("2024-06-01")).unwrap_err();
        assert!(matches!(err, StorefrontError::Validation(_)));
        let free = Cart::from_lines("USD", [CartLine::new("P2", dec!(0), 3)]);
        assert!(CheckoutPricingPipeline::default().summarize(&free, Some(&discount), day("2024-06-01")).unwrap().total.is_zero());
    }

    #[test]
    fn test_huge_cart_is_a_validation_error() {
        let lines: Vec<CartLine> = serde_json::from_value(json!([
            { "product_id": "P1", "unit_price": "79228162514264337593543950335", "quantity": 2 }
        ])).unwrap();
        let cart = Cart::from_lines("USD", lines);
        let err = CheckoutPricingPipeline::default().summarize(&cart, None, day("2024-06-01")).unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: amount out of range");
    }
}
