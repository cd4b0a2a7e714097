//! Condition evaluation for query execution
//!
//! Null semantics follow SQL: a missing or null attribute matches only
//! `null`. Every other operator, including `ne` and `not-in`, is false on
//! a null.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use regex::RegexBuilder;

use super::calendar::{DateRange, FiscalCalendar};
use super::context::EvaluationContext;
use crate::query::{ConditionExpression, ConditionOperator, Filter};
use crate::value::{align, compare, values_equal, Record, Value};

/// Anything conditions can be evaluated against
pub trait AttributeSource {
    /// Value stored under `key`; keys may be alias-qualified
    fn attribute(&self, key: &str) -> Option<&Value>;
}

impl AttributeSource for Record {
    fn attribute(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

/// Evaluates filter trees against rows
pub struct FilterEvaluator<'a> {
    ctx: &'a EvaluationContext,
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(ctx: &'a EvaluationContext) -> Self {
        Self { ctx }
    }

    /// Checks if a row satisfies the filter. Empty groups match.
    pub fn matches(&self, row: &dyn AttributeSource, filter: &Filter) -> bool {
        match filter {
            Filter::Condition(condition) => self.matches_condition(row, condition),
            Filter::And(children) => children.iter().all(|child| self.matches(row, child)),
            Filter::Or(children) => {
                children.is_empty() || children.iter().any(|child| self.matches(row, child))
            }
        }
    }

    /// Checks a single condition
    pub fn matches_condition(&self, row: &dyn AttributeSource, condition: &ConditionExpression) -> bool {
        use ConditionOperator::*;

        let key = condition.key();
        let actual = match row.attribute(&key).filter(|v| !v.is_null()) {
            Some(v) => v,
            None => return condition.operator == Null,
        };
        let values = &condition.values;

        match condition.operator {
            Null => false,
            NotNull => true,
            Equal => first(values).map_or(false, |v| values_equal(actual, &align(v, actual))),
            NotEqual => first(values).map_or(false, |v| !values_equal(actual, &align(v, actual))),
            GreaterThan => self.ordered(actual, values, |o| o == Ordering::Greater),
            GreaterEqual => self.ordered(actual, values, |o| o != Ordering::Less),
            LessThan => self.ordered(actual, values, |o| o == Ordering::Less),
            LessEqual => self.ordered(actual, values, |o| o != Ordering::Greater),
            Like => like(actual, values),
            NotLike => actual.as_str().is_some() && !like(actual, values),
            BeginsWith => text_test(actual, values, |a, p| a.starts_with(p)),
            EndsWith => text_test(actual, values, |a, p| a.ends_with(p)),
            Between => between(actual, values),
            NotBetween => values.len() == 2 && !between(actual, values),
            In => values.iter().any(|v| values_equal(actual, &align(v, actual))),
            NotIn => !values.iter().any(|v| values_equal(actual, &align(v, actual))),
            On => same_day(actual, values, |a, b| a == b),
            OnOrAfter => same_day(actual, values, |a, b| a >= b),
            OnOrBefore => same_day(actual, values, |a, b| a <= b),
            OlderThanXMonths => match (actual.as_datetime(), integer_arg(values, 0)) {
                (Some(dt), Some(x)) => self
                    .ctx
                    .fiscal
                    .older_than_months(self.ctx.now, x)
                    .map_or(false, |cutoff| dt < cutoff),
                _ => false,
            },
            InFiscalYear => self.in_range(actual, |fiscal| {
                fiscal.year_range(i32::try_from(integer_arg(values, 0)?).ok()?)
            }),
            InFiscalPeriod => match (actual.as_datetime(), integer_arg(values, 0)) {
                (Some(dt), Some(p)) => i64::from(self.ctx.fiscal.period_of(&dt)) == p,
                _ => false,
            },
            InFiscalPeriodAndYear => self.in_range(actual, |fiscal| {
                let (period, year) = period_and_year(values)?;
                fiscal.period_range(year, period)
            }),
            InOrBeforeFiscalPeriodAndYear => match (actual.as_datetime(), self.period_bounds(values)) {
                (Some(dt), Some(range)) => dt < range.end,
                _ => false,
            },
            InOrAfterFiscalPeriodAndYear => match (actual.as_datetime(), self.period_bounds(values)) {
                (Some(dt), Some(range)) => dt >= range.start,
                _ => false,
            },
            EqualUserId => actual.as_guid() == Some(self.ctx.caller_id) && !self.ctx.caller_id.is_nil(),
            NotEqualUserId => actual.as_guid().map_or(false, |id| id != self.ctx.caller_id),
            EqualBusinessId => {
                self.ctx.business_unit_id.is_some() && actual.as_guid() == self.ctx.business_unit_id
            }
            NotEqualBusinessId => actual
                .as_guid()
                .map_or(false, |id| Some(id) != self.ctx.business_unit_id),
            relative => match actual.as_datetime() {
                Some(dt) => self
                    .ctx
                    .fiscal
                    .relative_range(relative, self.ctx.now, integer_arg(values, 0))
                    .map_or(false, |range| range.contains(&dt)),
                None => false,
            },
        }
    }

    fn ordered(&self, actual: &Value, values: &[Value], test: impl Fn(Ordering) -> bool) -> bool {
        first(values)
            .and_then(|v| compare(actual, &align(v, actual)))
            .map_or(false, test)
    }

    fn in_range(
        &self,
        actual: &Value,
        range: impl Fn(&FiscalCalendar) -> Option<DateRange>,
    ) -> bool {
        match (actual.as_datetime(), range(&self.ctx.fiscal)) {
            (Some(dt), Some(range)) => range.contains(&dt),
            _ => false,
        }
    }

    fn period_bounds(&self, values: &[Value]) -> Option<DateRange> {
        let (period, year) = period_and_year(values)?;
        self.ctx.fiscal.period_range(year, period)
    }
}

fn first(values: &[Value]) -> Option<&Value> {
    values.first()
}

/// Integer argument, accepting the textual form FetchXML delivers
fn integer_arg(values: &[Value], index: usize) -> Option<i64> {
    match values.get(index)? {
        Value::Integer(i) | Value::OptionSet(i) => Some(i64::from(*i)),
        Value::BigInt(i) => Some(*i),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `(period, year)` arguments of the fiscal period-and-year operators
fn period_and_year(values: &[Value]) -> Option<(i32, i32)> {
    let period = i32::try_from(integer_arg(values, 0)?).ok()?;
    let year = i32::try_from(integer_arg(values, 1)?).ok()?;
    Some((period, year))
}

fn between(actual: &Value, values: &[Value]) -> bool {
    match values {
        [low, high] => {
            let low = compare(actual, &align(low, actual));
            let high = compare(actual, &align(high, actual));
            matches!(low, Some(Ordering::Greater | Ordering::Equal))
                && matches!(high, Some(Ordering::Less | Ordering::Equal))
        }
        _ => false,
    }
}

/// SQL LIKE: `%` matches any run, `_` any single character; case-insensitive
fn like(actual: &Value, values: &[Value]) -> bool {
    let (text, pattern) = match (actual.as_str(), first(values).and_then(Value::as_str)) {
        (Some(text), Some(pattern)) => (text, pattern),
        _ => return false,
    };

    let mut expr = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');

    RegexBuilder::new(&expr)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

fn text_test(actual: &Value, values: &[Value], test: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.as_str(), first(values).and_then(Value::as_str)) {
        (Some(text), Some(probe)) => test(&text.to_lowercase(), &probe.to_lowercase()),
        _ => false,
    }
}

/// Compares the calendar dates of the row value and the condition value
fn same_day(actual: &Value, values: &[Value], test: impl Fn(NaiveDate, NaiveDate) -> bool) -> bool {
    let row: Option<DateTime<Utc>> = actual.as_datetime();
    let probe = first(values).and_then(|v| align(v, actual).as_datetime());
    match (row, probe) {
        (Some(row), Some(probe)) => test(row.date_naive(), probe.date_naive()),
        _ => false,
    }
}
