//! Storefront access & pricing core
//!
//! Shared decision logic for the storefront back-office and checkout.
//!
//! ## Features
//! - Role + per-section grant resolution for admin pages
//! - Section gates deciding page access and CRUD affordances
//! - Time-windowed customer discounts and checkout totals
//! - Server-side order repricing
//! - Session-scoped, cancellable access to the storefront HTTP API

pub mod api;
pub mod config;
pub mod domain;
pub mod session;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use domain::value_objects::MoneyError;

pub use domain::aggregates::{
    AccountChange, Action, Actor, AdminSectionGate, Affordances, Cart, CartLine, CheckoutPricingPipeline,
    DiscountCalculator, DiscountInput, DiscountRecord, GateState, OrderSubmission, OrderVerifier,
    PermissionGrant, PermissionMatrix, PermissionResolver, PricingSummary, Role, Section,
};
pub use domain::value_objects::{Flag, Money};

// =============================================================================
// Wire Types
// =============================================================================

/// Response envelope shared by every backend endpoint.
///
/// `success: false` is a failure whatever the HTTP status was; `message` is
/// shown to the user verbatim when present.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: Flag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// The payload, or a server failure carrying `message` (else `fallback`).
    pub fn into_data(self, fallback: &str) -> Result<T> {
        let data = self.into_optional(fallback)?;
        data.ok_or_else(|| StorefrontError::Server(fallback.to_string()))
    }

    /// Like [`ApiEnvelope::into_data`] but a successful empty payload is fine.
    pub fn into_optional(self, fallback: &str) -> Result<Option<T>> {
        if !self.success.get() {
            let message = self.message.filter(|m| !m.trim().is_empty()).unwrap_or_else(|| fallback.to_string());
            tracing::warn!(%message, "server reported failure");
            return Err(StorefrontError::Server(message));
        }
        Ok(self.data)
    }
}

/// `data` of `GET /dashboard`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DashboardData {
    #[serde(default)]
    pub permissions: PermissionMatrix,
    /// Passed through untouched; the charts that read it live elsewhere.
    #[serde(default)]
    pub stats: Map<String, Value>,
}

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("No permission to {action} {section}")]
    AccessDenied { section: Section, action: Action },

    #[error("Cannot apply {0} to your own account")]
    SelfModification(AccountChange),

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    Server(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Section gate cannot move from {from} to {to}")]
    InvalidTransition { from: GateState, to: GateState },

    #[error("Unknown product {0}")]
    UnknownProduct(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// How a failure is presented to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Blocking page-level message, never retried.
    AccessDenied,
    /// Dismissible inline message; the user may retry by hand.
    Network,
    /// Blocking alert before any request is sent.
    Validation,
    /// `success: false` from the backend, shown like a validation failure.
    Server,
    Cancelled,
    Internal,
}

impl StorefrontError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccessDenied { .. } | Self::SelfModification(_) => ErrorKind::AccessDenied,
            Self::Transport(_) | Self::Decode(_) => ErrorKind::Network,
            Self::Validation(_) | Self::UnknownProduct(_) => ErrorKind::Validation,
            Self::Server(_) => ErrorKind::Server,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidTransition { .. } | Self::Config(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool { self.kind() == ErrorKind::Network }
}

impl From<MoneyError> for StorefrontError {
    fn from(error: MoneyError) -> Self { Self::Validation(error.to_string()) }
}

impl From<validator::ValidationErrors> for StorefrontError {
    fn from(errors: validator::ValidationErrors) -> Self { Self::Validation(errors.to_string()) }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_envelope_uses_server_message() {
        let env: ApiEnvelope<Value> = serde_json::from_value(json!({ "success": false, "message": "Category in use" })).unwrap();
        let err = env.into_data("Could not delete category").unwrap_err();
        assert_eq!(err.to_string(), "Category in use");
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_failure_envelope_falls_back() {
        let env: ApiEnvelope<Value> = serde_json::from_value(json!({ "success": 0 })).unwrap();
        assert_eq!(env.into_data("Could not load orders").unwrap_err().to_string(), "Could not load orders");
    }

    #[test]
    fn test_dashboard_payload() {
        let env: ApiEnvelope<DashboardData> = serde_json::from_value(json!({
            "success": true,
            "data": {
                "permissions": [{ "permission_type": "orders", "can_view": "1", "can_edit": 0 }],
                "stats": { "orders_today": 4 }
            }
        })).unwrap();
        let data = env.into_data("Could not load dashboard").unwrap();
        assert!(data.permissions.grant(Section::Orders).unwrap().allows(Action::View));
        assert_eq!(data.stats["orders_today"], json!(4));
    }

    #[test]
    fn test_error_taxonomy() {
        let denied = StorefrontError::AccessDenied { section: Section::Products, action: Action::Delete };
        assert_eq!(denied.to_string(), "No permission to delete products");
        assert_eq!(denied.kind(), ErrorKind::AccessDenied);
        assert_eq!(StorefrontError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(StorefrontError::SelfModification(AccountChange::Deactivate).to_string(), "Cannot apply deactivate to your own account");
    }
}
