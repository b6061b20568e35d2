//! Aggregates module
pub mod access;
pub mod discount;
pub mod cart;
pub mod order;
pub mod gate;

pub use access::{AccountChange, Action, Actor, PermissionGrant, PermissionMatrix, PermissionResolver, Role, Section};
pub use discount::{DiscountCalculator, DiscountInput, DiscountRecord};
pub use cart::{Cart, CartLine, CheckoutPricingPipeline, PricingSummary};
pub use order::{OrderLine, OrderSubmission, OrderVerifier};
pub use gate::{Affordances, AdminSectionGate, GateState};
