//! Per-query evaluation context

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::calendar::FiscalCalendar;
use crate::value::EntityReference;

/// Logical name of the entity callers are drawn from
pub const CALLER_ENTITY: &str = "systemuser";

/// Inputs that condition evaluation depends on besides the row itself
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationContext {
    /// Reference instant for calendar-relative operators
    pub now: DateTime<Utc>,
    /// Caller for `eq-userid` and security checks; nil when anonymous
    pub caller_id: Uuid,
    /// Caller's business unit for `eq-businessid`
    pub business_unit_id: Option<Uuid>,
    pub fiscal: FiscalCalendar,
}

impl EvaluationContext {
    /// Context evaluated at the current instant with no caller
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Context pinned to a fixed instant
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            caller_id: Uuid::nil(),
            business_unit_id: None,
            fiscal: FiscalCalendar::default(),
        }
    }

    pub fn with_caller(mut self, caller_id: Uuid) -> Self {
        self.caller_id = caller_id;
        self
    }

    pub fn with_business_unit(mut self, business_unit_id: Uuid) -> Self {
        self.business_unit_id = Some(business_unit_id);
        self
    }

    pub fn with_fiscal(mut self, fiscal: FiscalCalendar) -> Self {
        self.fiscal = fiscal;
        self
    }

    /// Caller as a reference, for security checks
    pub fn caller(&self) -> EntityReference {
        EntityReference::new(CALLER_ENTITY, self.caller_id)
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}
