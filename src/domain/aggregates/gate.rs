//! Admin section gate
//!
//! Each admin page owns one gate for its [`Section`]. The gate walks
//! `Unresolved -> Checking -> Granted | Denied` exactly once; the resolved
//! [`Affordances`] stay fixed for the lifetime of the page.

use serde::Serialize;
use strum::Display;
use tracing::debug;

use crate::domain::aggregates::access::{Action, Actor, PermissionResolver, Section};
use crate::domain::events::{AccessEvent, DomainEvent};
use crate::{Result, StorefrontError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum GateState { Unresolved, Checking, Granted, Denied }

/// Which CRUD controls a page renders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Affordances {
    pub can_access_page: bool,
    pub can_create: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl Affordances {
    /// Everything is off when the page itself is not viewable, whatever the
    /// finer flags say.
    pub fn resolve(actor: &Actor, section: Section) -> Self {
        let resolver = PermissionResolver;
        if !resolver.resolve(actor, section, Action::View) { return Self::default(); }
        let allow = |action| actor.is_admin() || resolver.resolve(actor, section, action);
        Self {
            can_access_page: true,
            can_create: allow(Action::Create),
            can_edit: allow(Action::Edit),
            can_delete: allow(Action::Delete),
        }
    }

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::View => self.can_access_page,
            Action::Create => self.can_access_page && self.can_create,
            Action::Edit => self.can_access_page && self.can_edit,
            Action::Delete => self.can_access_page && self.can_delete,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AdminSectionGate {
    section: Section,
    state: GateState,
    affordances: Affordances,
    events: Vec<DomainEvent>,
}

impl AdminSectionGate {
    pub fn new(section: Section) -> Self {
        Self { section, state: GateState::Unresolved, affordances: Affordances::default(), events: vec![] }
    }

    /// Resolves synchronously when the actor is already at hand.
    pub fn mount(section: Section, actor: &Actor) -> Self {
        let mut gate = Self::new(section);
        gate.state = GateState::Checking;
        gate.settle_with(actor);
        gate
    }

    pub fn section(&self) -> Section { self.section }
    pub fn state(&self) -> GateState { self.state }
    pub fn affordances(&self) -> Affordances { self.affordances }
    pub fn can_access_page(&self) -> bool { self.state == GateState::Granted }

    pub fn begin_check(&mut self) -> Result<()> {
        self.transition(GateState::Unresolved, GateState::Checking)?;
        self.state = GateState::Checking;
        Ok(())
    }

    pub fn settle(&mut self, actor: &Actor) -> Result<GateState> {
        let target = if PermissionResolver.resolve(actor, self.section, Action::View) { GateState::Granted } else { GateState::Denied };
        self.transition(GateState::Checking, target)?;
        Ok(self.settle_with(actor))
    }

    /// Permits a server call for `action` only once the page is granted and
    /// the matching affordance is on.
    pub fn require(&self, action: Action) -> Result<()> {
        if self.state != GateState::Granted {
            return Err(StorefrontError::AccessDenied { section: self.section, action: Action::View });
        }
        if !self.affordances.allows(action) {
            return Err(StorefrontError::AccessDenied { section: self.section, action });
        }
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    fn transition(&self, expected: GateState, to: GateState) -> Result<()> {
        if self.state != expected {
            return Err(StorefrontError::InvalidTransition { from: self.state, to });
        }
        Ok(())
    }

    fn settle_with(&mut self, actor: &Actor) -> GateState {
        self.affordances = Affordances::resolve(actor, self.section);
        let actor_id = actor.id().to_string();
        let (state, event) = if self.affordances.can_access_page {
            (GateState::Granted, AccessEvent::Granted { section: self.section, actor_id })
        } else {
            (GateState::Denied, AccessEvent::Denied { section: self.section, actor_id })
        };
        self.state = state;
        self.events.push(DomainEvent::Access(event));
        debug!(section = %self.section, state = %self.state, affordances = ?self.affordances, "section gate settled");
        state
    }
}
