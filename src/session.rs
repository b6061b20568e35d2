//! Sessions over the storefront API
//!
//! [`AdminSession`] loads the permission matrix at most once per dashboard
//! session and shares it with every page it opens. Each page gets a
//! [`SectionClient`] whose requests are tied to a [`PageScope`]: dropping the
//! page cancels whatever it still has in flight.

use chrono::NaiveDate;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::api::StorefrontApi;
use crate::domain::aggregates::discount::CustomerDiscount;
use crate::domain::aggregates::{
    AccountChange, Action, Actor, AdminSectionGate, Cart, CheckoutPricingPipeline, DiscountCalculator,
    DiscountInput, DiscountRecord, OrderSubmission, PermissionMatrix, PermissionResolver, PricingSummary, Role, Section,
};
use crate::{Result, StorefrontError};

/// Cancellation boundary for one mounted page.
#[derive(Debug)]
pub struct PageScope { token: CancellationToken }

impl PageScope {
    pub fn new(parent: &CancellationToken) -> Self { Self { token: parent.child_token() } }

    pub fn cancel(&self) { self.token.cancel(); }
    pub fn is_cancelled(&self) -> bool { self.token.is_cancelled() }

    /// Runs `fut` unless the page goes away first.
    pub async fn run<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(StorefrontError::Cancelled),
            res = fut => res,
        }
    }
}

impl Drop for PageScope {
    fn drop(&mut self) { self.token.cancel(); }
}

pub struct AdminSession {
    actor_id: String,
    role: Role,
    api: Arc<dyn StorefrontApi>,
    permissions: OnceCell<Arc<PermissionMatrix>>,
    token: CancellationToken,
}

impl AdminSession {
    pub fn new(api: Arc<dyn StorefrontApi>, actor_id: impl Into<String>, role: Role) -> Self {
        Self { actor_id: actor_id.into(), role, api, permissions: OnceCell::new(), token: CancellationToken::new() }
    }

    pub fn role(&self) -> Role { self.role }

    /// Only employees need the matrix; it is fetched on first use and kept
    /// until [`AdminSession::logout`]. A failed fetch is not cached.
    pub async fn permissions(&self) -> Result<Arc<PermissionMatrix>> {
        if self.role != Role::Employee { return Ok(Arc::default()); }
        let matrix = self.permissions.get_or_try_init(|| async {
            let dashboard = self.api.dashboard().await?;
            info!(actor_id = %self.actor_id, grants = dashboard.permissions.len(), "loaded permission matrix");
            Ok::<_, StorefrontError>(Arc::new(dashboard.permissions))
        }).await?;
        Ok(Arc::clone(matrix))
    }

    pub async fn actor(&self) -> Result<Actor> {
        let grants = self.permissions().await?;
        Ok(Actor::with_role(self.actor_id.clone(), self.role, grants))
    }

    /// Mounts an admin page. Access is settled before the caller can issue
    /// any data request through the returned client.
    pub async fn open_section(&self, section: Section) -> Result<SectionClient> {
        let scope = PageScope::new(&self.token);
        let mut gate = AdminSectionGate::new(section);
        gate.begin_check()?;
        let actor = scope.run(self.actor()).await?;
        gate.settle(&actor)?;
        for event in gate.take_events() {
            debug!(?event, "section access");
        }
        Ok(SectionClient { gate, actor, api: Arc::clone(&self.api), scope })
    }

    /// Loads a customer's discount slot for editing. Customer discounts are
    /// admin-only.
    pub async fn customer_discount(&self, customer_id: &str) -> Result<CustomerDiscount> {
        self.require_admin()?;
        let scope = PageScope::new(&self.token);
        let record = scope.run(self.api.customer_discount(customer_id)).await?;
        Ok(CustomerDiscount::new(customer_id, record))
    }

    /// Validates locally, saves, and replaces the slot with what the backend
    /// stored.
    pub async fn save_discount(&self, slot: &mut CustomerDiscount, input: DiscountInput) -> Result<DiscountRecord> {
        self.require_admin()?;
        input.validate()?;
        let scope = PageScope::new(&self.token);
        let saved = scope.run(self.api.put_customer_discount(slot.customer_id(), &input)).await?;
        let record = slot.replace(DiscountInput::from(&saved))?.clone();
        for event in slot.take_events() {
            info!(?event, "customer discount changed");
        }
        Ok(record)
    }

    pub async fn remove_discount(&self, slot: &mut CustomerDiscount) -> Result<()> {
        self.require_admin()?;
        let scope = PageScope::new(&self.token);
        scope.run(self.api.delete_customer_discount(slot.customer_id())).await?;
        slot.remove();
        for event in slot.take_events() {
            info!(?event, "customer discount changed");
        }
        Ok(())
    }

    /// Ends the session: cancels every open page and forgets the matrix.
    pub fn logout(mut self) {
        self.token.cancel();
        self.permissions.take();
        info!(actor_id = %self.actor_id, "admin session closed");
    }

    fn require_admin(&self) -> Result<()> {
        if self.role == Role::Admin { Ok(()) } else { Err(StorefrontError::AccessDenied { section: Section::Users, action: Action::Edit }) }
    }
}

/// Data access for one mounted admin page, gated by its section.
pub struct SectionClient {
    gate: AdminSectionGate,
    actor: Actor,
    api: Arc<dyn StorefrontApi>,
    scope: PageScope,
}

impl SectionClient {
    pub fn gate(&self) -> &AdminSectionGate { &self.gate }
    pub fn scope(&self) -> &PageScope { &self.scope }

    pub async fn list(&self) -> Result<Vec<Value>> {
        self.gate.require(Action::View)?;
        self.scope.run(self.api.list_section(self.gate.section())).await
    }

    /// Creates a row and returns the refetched list.
    pub async fn create(&self, body: &Value) -> Result<Vec<Value>> {
        self.gate.require(Action::Create)?;
        self.scope.run(self.api.create_in_section(self.gate.section(), body)).await?;
        self.list().await
    }

    /// On the users page a body touching `role` or `is_active` is an account
    /// change and is refused on the actor's own account.
    pub async fn update(&self, id: &str, body: &Value) -> Result<Vec<Value>> {
        self.gate.require(Action::Edit)?;
        if self.gate.section() == Section::Users {
            for change in account_changes(body) {
                PermissionResolver.authorize_account_change(&self.actor, id, change)?;
            }
        }
        self.scope.run(self.api.update_in_section(self.gate.section(), id, body)).await?;
        self.list().await
    }

    pub async fn delete(&self, id: &str) -> Result<Vec<Value>> {
        self.gate.require(Action::Delete)?;
        if self.gate.section() == Section::Users && id == self.actor.id() {
            return Err(StorefrontError::SelfModification(AccountChange::Deactivate));
        }
        self.scope.run(self.api.delete_in_section(self.gate.section(), id)).await?;
        self.list().await
    }

    /// Role change or (de)activation on the users page. Never allowed on the
    /// actor's own account.
    pub async fn change_account(&self, target_id: &str, change: AccountChange, body: &Value) -> Result<Vec<Value>> {
        if self.gate.section() != Section::Users {
            return Err(StorefrontError::Validation(format!("{change} only applies to users")));
        }
        PermissionResolver.authorize_account_change(&self.actor, target_id, change)?;
        self.update(target_id, body).await
    }
}

fn account_changes(body: &Value) -> Vec<AccountChange> {
    let mut changes = Vec::new();
    if body.get("role").is_some() { changes.push(AccountChange::ChangeRole); }
    if body.get("is_active").is_some() { changes.push(AccountChange::Deactivate); }
    changes
}

/// Checkout side: the customer's discount is read once per session.
pub struct CustomerSession {
    customer_id: String,
    currency: String,
    api: Arc<dyn StorefrontApi>,
    discount: OnceCell<Option<DiscountRecord>>,
    scope: PageScope,
}

impl CustomerSession {
    pub fn new(api: Arc<dyn StorefrontApi>, customer_id: impl Into<String>, currency: &str) -> Self {
        Self {
            customer_id: customer_id.into(),
            currency: currency.to_string(),
            api,
            discount: OnceCell::new(),
            scope: PageScope { token: CancellationToken::new() },
        }
    }

    pub fn customer_id(&self) -> &str { &self.customer_id }
    pub fn scope(&self) -> &PageScope { &self.scope }

    pub fn cart(&self) -> Cart { Cart::for_customer(self.customer_id.clone(), &self.currency) }

    pub async fn discount(&self) -> Result<Option<&DiscountRecord>> {
        let record = self.discount.get_or_try_init(|| async {
            let record = self.scope.run(self.api.customer_discount(&self.customer_id)).await?;
            if let Some(r) = record.as_ref().filter(|r| !r.has_valid_percentage()) {
                warn!(customer_id = %self.customer_id, percentage = %r.discount_percentage, "ignoring out-of-range discount");
            }
            Ok::<_, StorefrontError>(record)
        }).await?;
        Ok(record.as_ref())
    }

    /// Badge for product pages, `None` when no discount applies on `day`.
    pub async fn discount_badge(&self, day: NaiveDate) -> Result<Option<String>> {
        Ok(self.discount().await?.and_then(|d| d.badge_on(day)))
    }

    pub async fn is_discount_active(&self, day: NaiveDate) -> Result<bool> {
        Ok(DiscountCalculator.is_discount_active(self.discount().await?, day))
    }

    pub async fn checkout_summary(&self, cart: &Cart, day: NaiveDate) -> Result<PricingSummary> {
        let discount = self.discount().await?;
        CheckoutPricingPipeline::default().summarize(cart, discount, day)
    }

    /// Builds the payload (rejecting bad carts before any request) and posts it.
    pub async fn place_order(&self, cart: &Cart, day: NaiveDate) -> Result<(OrderSubmission, Option<Value>)> {
        let discount = self.discount().await?;
        let order = OrderSubmission::from_cart(cart, discount, day)?;
        let receipt = self.scope.run(self.api.submit_order(&order)).await?;
        info!(reference = %order.reference, total = %order.total, "order submitted");
        Ok((order, receipt))
    }
}
