//! Storefront backend API
//!
//! The backend is a black box speaking the `{ success, message?, data? }`
//! envelope. [`StorefrontApi`] is the seam the sessions talk through;
//! [`HttpStorefrontApi`] is the reqwest implementation.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::ClientConfig;
use crate::domain::aggregates::{DiscountInput, DiscountRecord, OrderSubmission, Section};
use crate::{ApiEnvelope, DashboardData, Flag, Result};

const DASHBOARD_FAILED: &str = "Could not load your permissions";
const LIST_FAILED: &str = "Could not load the list";
const SAVE_FAILED: &str = "Could not save changes";
const DELETE_FAILED: &str = "Could not delete the item";
const DISCOUNT_LOAD_FAILED: &str = "Could not load the customer discount";
const DISCOUNT_SAVE_FAILED: &str = "Could not save the customer discount";
const DISCOUNT_DELETE_FAILED: &str = "Could not remove the customer discount";
const ORDER_FAILED: &str = "Could not place the order";

#[async_trait]
pub trait StorefrontApi: Send + Sync {
    /// `GET /dashboard`
    async fn dashboard(&self) -> Result<DashboardData>;
    /// `GET /admin/{section}`
    async fn list_section(&self, section: Section) -> Result<Vec<Value>>;
    /// `POST /admin/{section}`
    async fn create_in_section(&self, section: Section, body: &Value) -> Result<Option<Value>>;
    /// `PUT /admin/{section}/{id}`
    async fn update_in_section(&self, section: Section, id: &str, body: &Value) -> Result<Option<Value>>;
    /// `DELETE /admin/{section}/{id}`
    async fn delete_in_section(&self, section: Section, id: &str) -> Result<()>;
    /// `GET /customers/{id}/discount`
    async fn customer_discount(&self, customer_id: &str) -> Result<Option<DiscountRecord>>;
    /// `PUT /customers/{id}/discount`
    async fn put_customer_discount(&self, customer_id: &str, input: &DiscountInput) -> Result<DiscountRecord>;
    /// `DELETE /customers/{id}/discount`
    async fn delete_customer_discount(&self, customer_id: &str) -> Result<()>;
    /// `POST /orders`
    async fn submit_order(&self, order: &OrderSubmission) -> Result<Option<Value>>;
}

#[derive(Debug, Clone)]
pub struct HttpStorefrontApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStorefrontApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), token })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.api_url, config.api_token.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let req = self.client.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Reads the envelope whatever the status code. A body that is not an
    /// envelope counts as a failure without a message on error statuses.
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<ApiEnvelope<T>> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        match serde_json::from_slice::<ApiEnvelope<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(e) if status.is_success() => Err(e.into()),
            Err(_) => {
                debug!(%status, "non-envelope error response");
                Ok(ApiEnvelope { success: Flag::new(false), message: None, data: None })
            }
        }
    }
}

#[async_trait]
impl StorefrontApi for HttpStorefrontApi {
    async fn dashboard(&self) -> Result<DashboardData> {
        self.send(self.request(Method::GET, "dashboard")).await?.into_data(DASHBOARD_FAILED)
    }

    async fn list_section(&self, section: Section) -> Result<Vec<Value>> {
        let path = format!("admin/{section}");
        let rows: Option<Vec<Value>> = self.send(self.request(Method::GET, &path)).await?.into_optional(LIST_FAILED)?;
        Ok(rows.unwrap_or_default())
    }

    async fn create_in_section(&self, section: Section, body: &Value) -> Result<Option<Value>> {
        let path = format!("admin/{section}");
        self.send(self.request(Method::POST, &path).json(body)).await?.into_optional(SAVE_FAILED)
    }

    async fn update_in_section(&self, section: Section, id: &str, body: &Value) -> Result<Option<Value>> {
        let path = format!("admin/{section}/{id}");
        self.send(self.request(Method::PUT, &path).json(body)).await?.into_optional(SAVE_FAILED)
    }

    async fn delete_in_section(&self, section: Section, id: &str) -> Result<()> {
        let path = format!("admin/{section}/{id}");
        self.send::<Value>(self.request(Method::DELETE, &path)).await?.into_optional(DELETE_FAILED)?;
        Ok(())
    }

    async fn customer_discount(&self, customer_id: &str) -> Result<Option<DiscountRecord>> {
        let path = format!("customers/{customer_id}/discount");
        self.send(self.request(Method::GET, &path)).await?.into_optional(DISCOUNT_LOAD_FAILED)
    }

    async fn put_customer_discount(&self, customer_id: &str, input: &DiscountInput) -> Result<DiscountRecord> {
        let path = format!("customers/{customer_id}/discount");
        self.send(self.request(Method::PUT, &path).json(input)).await?.into_data(DISCOUNT_SAVE_FAILED)
    }

    async fn delete_customer_discount(&self, customer_id: &str) -> Result<()> {
        let path = format!("customers/{customer_id}/discount");
        self.send::<Value>(self.request(Method::DELETE, &path)).await?.into_optional(DISCOUNT_DELETE_FAILED)?;
        Ok(())
    }

    async fn submit_order(&self, order: &OrderSubmission) -> Result<Option<Value>> {
        self.send(self.request(Method::POST, "orders").json(order)).await?.into_optional(ORDER_FAILED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::discount::parse_day;
    use crate::{Action, ErrorKind, StorefrontError};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api(server: &MockServer) -> HttpStorefrontApi {
        HttpStorefrontApi::new(&server.uri(), Some("t0ken".into()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_dashboard_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dashboard"))
            .and(header("authorization", "Bearer t0ken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "permissions": [{ "permission_type": "products", "can_view": "1", "can_edit": 1 }], "stats": {} }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let data = api(&server).await.dashboard().await.unwrap();
        let grant = data.permissions.grant(Section::Products).unwrap();
        assert!(grant.allows(Action::View) && grant.allows(Action::Edit) && !grant.allows(Action::Delete));
    }

    #[tokio::test]
    async fn test_success_false_is_failure_on_http_200() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/admin/categories/12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false, "message": "Category has products" })))
            .mount(&server)
            .await;

        let err = api(&server).await.delete_in_section(Section::Categories, "12").await.unwrap_err();
        assert!(matches!(err, StorefrontError::Server(ref m) if m == "Category has products"));
    }

    #[tokio::test]
    async fn test_error_page_uses_fallback_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/orders"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad gateway</html>"))
            .mount(&server)
            .await;

        let err = api(&server).await.list_section(Section::Orders).await.unwrap_err();
        assert_eq!(err.to_string(), LIST_FAILED);
    }

    #[tokio::test]
    async fn test_transport_failure_is_retryable() {
        // Nothing listens on a port that was just released.
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let client = HttpStorefrontApi::new(&format!("http://127.0.0.1:{port}"), None, Duration::from_secs(5)).unwrap();
        let err = client.dashboard().await.unwrap_err();
        assert!(matches!(err, StorefrontError::Transport(_)));
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_customer_discount_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers/42/discount"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": null })))
            .mount(&server)
            .await;
        let input = DiscountInput {
            discount_percentage: dec!(15),
            start_date: parse_day("2024-01-01").unwrap(),
            end_date: parse_day("2024-12-31").unwrap(),
            is_active: true,
        };
        Mock::given(method("PUT"))
            .and(path("/customers/42/discount"))
            .and(body_json(&input))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "discount_percentage": "15.00", "start_date": "2024-01-01", "end_date": "2024-12-31", "is_active": "1" }
            })))
            .mount(&server)
            .await;

        let client = api(&server).await;
        assert_eq!(client.customer_discount("42").await.unwrap(), None);
        let saved = client.put_customer_discount("42", &input).await.unwrap();
        assert_eq!(DiscountInput::from(&saved), input);
    }
}
