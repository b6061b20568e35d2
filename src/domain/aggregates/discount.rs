//! Discount Aggregate
//!
//! A customer holds at most one [`DiscountRecord`]. It applies only while its
//! `is_active` flag is set *and* the day falls inside the inclusive
//! `start_date..=end_date` window.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;
use validator::{Validate, ValidationError};

use crate::domain::events::{DiscountEvent, DomainEvent};
use crate::domain::value_objects::{Flag, Money, MoneyError, Percentage};
use crate::Result;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRecord {
    pub discount_percentage: Decimal,
    #[serde(deserialize_with = "deserialize_day")]
    pub start_date: NaiveDate,
    #[serde(deserialize_with = "deserialize_day")]
    pub end_date: NaiveDate,
    #[serde(default)]
    pub is_active: Flag,
}

impl DiscountRecord {
    pub fn new(discount_percentage: Decimal, start_date: NaiveDate, end_date: NaiveDate, is_active: bool) -> Self {
        Self { discount_percentage, start_date, end_date, is_active: is_active.into() }
    }

    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.is_active.get() && self.start_date <= day && day <= self.end_date
    }

    /// The stored percentage if it lies in `[0, 100]`. Anything else is inert.
    pub fn percentage(&self) -> Option<Percentage> {
        match Percentage::new(self.discount_percentage) {
            Ok(pct) => Some(pct),
            Err(e) => {
                debug!(percentage = %self.discount_percentage, error = %e, "ignoring out-of-range discount");
                None
            }
        }
    }

    pub fn has_valid_percentage(&self) -> bool { Percentage::new(self.discount_percentage).is_ok() }

    /// "% off" badge text, e.g. `-15%`, when the discount applies on `day`.
    pub fn badge_on(&self, day: NaiveDate) -> Option<String> {
        if !self.is_active_on(day) { return None; }
        self.percentage().filter(|p| !p.value().is_zero()).map(|p| format!("-{p}"))
    }
}

/// Backend dates show up as `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339.
fn deserialize_day<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_day(&raw).map_err(serde::de::Error::custom)
}

pub fn parse_day(raw: &str) -> std::result::Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
}

/// Today's date as the pricing core sees it.
pub fn today() -> NaiveDate { Utc::now().date_naive() }

/// Pure price arithmetic over an optional [`DiscountRecord`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscountCalculator;

impl DiscountCalculator {
    pub fn is_discount_active(&self, discount: Option<&DiscountRecord>, day: NaiveDate) -> bool {
        discount.is_some_and(|d| d.is_active_on(day))
    }

    /// Unrounded effective price of `base` on `day`.
    pub fn effective_price(&self, base: &Money, discount: Option<&DiscountRecord>, day: NaiveDate) -> Result<Money> {
        match self.applicable(discount, day) {
            Some(pct) => Ok(base.scale(pct.remaining_fraction())?),
            None => Ok(base.clone()),
        }
    }

    pub fn effective_amount(&self, base: Decimal, discount: Option<&DiscountRecord>, day: NaiveDate) -> Result<Decimal> {
        match self.applicable(discount, day) {
            Some(pct) => base.checked_mul(pct.remaining_fraction()).ok_or_else(|| MoneyError::Overflow.into()),
            None => Ok(base),
        }
    }

    fn applicable(&self, discount: Option<&DiscountRecord>, day: NaiveDate) -> Option<Percentage> {
        discount.filter(|d| d.is_active_on(day)).and_then(DiscountRecord::percentage)
    }
}

/// Admin-side write model for `PUT /customers/{id}/discount`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_window"))]
pub struct DiscountInput {
    #[validate(custom = "validate_percentage")]
    pub discount_percentage: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
}

fn validate_percentage(value: &Decimal) -> std::result::Result<(), ValidationError> {
    Percentage::new(*value).map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("percentage_range");
        err.message = Some("discount percentage must be between 0 and 100".into());
        err
    })
}

fn validate_window(input: &DiscountInput) -> std::result::Result<(), ValidationError> {
    if input.end_date < input.start_date {
        let mut err = ValidationError::new("date_order");
        err.message = Some("end date must not be before start date".into());
        return Err(err);
    }
    Ok(())
}

impl DiscountInput {
    /// Validates and converts into the record the backend will persist.
    pub fn into_record(self) -> Result<DiscountRecord> {
        self.validate()?;
        Ok(DiscountRecord::new(self.discount_percentage, self.start_date, self.end_date, self.is_active))
    }
}

impl From<&DiscountRecord> for DiscountInput {
    fn from(record: &DiscountRecord) -> Self {
        Self {
            discount_percentage: record.discount_percentage,
            start_date: record.start_date,
            end_date: record.end_date,
            is_active: record.is_active.get(),
        }
    }
}

/// A customer's discount slot. Edits replace the record wholesale.
#[derive(Clone, Debug)]
pub struct CustomerDiscount {
    customer_id: String,
    record: Option<DiscountRecord>,
    events: Vec<DomainEvent>,
}

impl CustomerDiscount {
    pub fn new(customer_id: impl Into<String>, record: Option<DiscountRecord>) -> Self {
        Self { customer_id: customer_id.into(), record, events: vec![] }
    }

    pub fn customer_id(&self) -> &str { &self.customer_id }
    pub fn record(&self) -> Option<&DiscountRecord> { self.record.as_ref() }

    pub fn replace(&mut self, input: DiscountInput) -> Result<&DiscountRecord> {
        let record = input.into_record()?;
        self.raise_event(DomainEvent::Discount(DiscountEvent::Replaced {
            customer_id: self.customer_id.clone(),
            percentage: record.discount_percentage,
        }));
        let stored: &DiscountRecord = self.record.insert(record);
        Ok(stored)
    }

    pub fn remove(&mut self) -> Option<DiscountRecord> {
        let removed = self.record.take();
        if removed.is_some() {
            self.raise_event(DomainEvent::Discount(DiscountEvent::Removed { customer_id: self.customer_id.clone() }));
        }
        removed
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}
