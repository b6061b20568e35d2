//! Domain events
use crate::domain::aggregates::access::Section;
use rust_decimal::Decimal;

#[derive(Clone, Debug, PartialEq)]
pub enum DomainEvent {
    Access(AccessEvent),
    Discount(DiscountEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq)]
pub enum AccessEvent {
    Granted { section: Section, actor_id: String },
    Denied { section: Section, actor_id: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum DiscountEvent {
    Replaced { customer_id: String, percentage: Decimal },
    Removed { customer_id: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderEvent {
    LineRepriced { product_id: String, submitted: Decimal, verified: Decimal },
    Verified { reference: String, total: Decimal },
}
