//! Value coercion and type-aware comparison
//!
//! Coercion maps generic values onto the declared semantic type of an
//! attribute. Comparison is the single ordering used by filters, joins and
//! sorting:
//! - null never compares
//! - numbers compare across integer, decimal, money and option codes
//! - strings compare case-insensitively
//! - references compare by id, also against bare guids

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::types::{EntityReference, Record, Value};
use crate::metadata::{AttributeSchema, AttributeType, TableSchema};

/// Coercion failures for a single attribute
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("attribute '{attribute}' is not declared on '{entity}'")]
    UndeclaredAttribute { entity: String, attribute: String },

    #[error("attribute '{attribute}' of type {expected} cannot hold a {found} value")]
    TypeMismatch {
        attribute: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("attribute '{attribute}' exceeds its maximum length of {max_length}")]
    TooLong { attribute: String, max_length: u32 },

    #[error("attribute '{attribute}' cannot reference table '{target}'")]
    InvalidTarget { attribute: String, target: String },
}

impl CoercionError {
    /// Attribute the failure concerns
    pub fn attribute(&self) -> &str {
        match self {
            CoercionError::UndeclaredAttribute { attribute, .. }
            | CoercionError::TypeMismatch { attribute, .. }
            | CoercionError::TooLong { attribute, .. }
            | CoercionError::InvalidTarget { attribute, .. } => attribute,
        }
    }
}

/// Coerces every attribute of `record` against `table`.
///
/// A nil record id is taken from a guid held in the primary id attribute.
pub fn coerce_record(table: &TableSchema, mut record: Record) -> Result<Record, CoercionError> {
    let attributes = std::mem::take(&mut record.attributes);
    for (name, value) in attributes {
        let attr = table
            .attribute(&name)
            .ok_or_else(|| CoercionError::UndeclaredAttribute {
                entity: table.logical_name.clone(),
                attribute: name.clone(),
            })?;
        let value = coerce(attr, value)?;
        record.attributes.insert(name, value);
    }

    if record.id.is_nil() {
        if let Some(Value::Guid(id)) = record.get(&table.primary_id_attribute) {
            record.id = *id;
        }
    }

    Ok(record)
}

/// Coerces a single value into the semantic type of `attr`.
pub fn coerce(attr: &AttributeSchema, value: Value) -> Result<Value, CoercionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let mismatch = |found: &Value| CoercionError::TypeMismatch {
        attribute: attr.name.clone(),
        expected: attr.attribute_type.type_name(),
        found: found.type_name(),
    };

    let coerced = match attr.attribute_type {
        AttributeType::Uniqueidentifier => match value {
            Value::Guid(_) => value,
            Value::Reference(r) => Value::Guid(r.id),
            Value::String(ref s) => Value::Guid(parse_guid(s).ok_or_else(|| mismatch(&value))?),
            other => return Err(mismatch(&other)),
        },
        AttributeType::Lookup => match value {
            Value::Reference(r) => Value::Reference(check_target(attr, r)?),
            Value::Guid(id) => Value::Reference(single_target(attr, id, &value)?),
            Value::String(ref s) => {
                let id = parse_guid(s).ok_or_else(|| mismatch(&value))?;
                Value::Reference(single_target(attr, id, &value)?)
            }
            other => return Err(mismatch(&other)),
        },
        AttributeType::PartyList => match value {
            Value::PartyList(list) => Value::PartyList(
                list.into_iter()
                    .map(|r| check_target(attr, r))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Reference(r) => Value::PartyList(vec![check_target(attr, r)?]),
            other => return Err(mismatch(&other)),
        },
        AttributeType::Picklist => match value {
            Value::OptionSet(_) => value,
            Value::Integer(i) => Value::OptionSet(i),
            Value::BigInt(i) => Value::OptionSet(i32::try_from(i).map_err(|_| mismatch(&value))?),
            other => return Err(mismatch(&other)),
        },
        AttributeType::Boolean => match value {
            Value::Boolean(_) => value,
            Value::Integer(i) => Value::Boolean(i != 0),
            Value::String(ref s) => Value::Boolean(parse_bool(s).ok_or_else(|| mismatch(&value))?),
            other => return Err(mismatch(&other)),
        },
        AttributeType::Money => Value::Money(to_decimal(&value).ok_or_else(|| mismatch(&value))?),
        AttributeType::Decimal => Value::Decimal(to_decimal(&value).ok_or_else(|| mismatch(&value))?),
        AttributeType::Double => match value {
            Value::Double(_) => value,
            Value::Integer(i) => Value::Double(f64::from(i)),
            Value::BigInt(i) => Value::Double(i as f64),
            Value::Decimal(d) | Value::Money(d) => {
                Value::Double(d.to_f64().ok_or_else(|| mismatch(&value))?)
            }
            other => return Err(mismatch(&other)),
        },
        AttributeType::Integer => match value {
            Value::Integer(_) => value,
            Value::BigInt(i) => Value::Integer(i32::try_from(i).map_err(|_| mismatch(&value))?),
            other => return Err(mismatch(&other)),
        },
        AttributeType::BigInt => match value {
            Value::BigInt(_) => value,
            Value::Integer(i) => Value::BigInt(i64::from(i)),
            other => return Err(mismatch(&other)),
        },
        AttributeType::String | AttributeType::Memo => match value {
            Value::String(ref s) => {
                let limit = match attr.attribute_type {
                    AttributeType::String => Some(attr.effective_max_length()),
                    _ => attr.max_length,
                };
                if let Some(max_length) = limit {
                    if s.chars().count() > max_length as usize {
                        return Err(CoercionError::TooLong {
                            attribute: attr.name.clone(),
                            max_length,
                        });
                    }
                }
                value
            }
            other => return Err(mismatch(&other)),
        },
        AttributeType::DateTime => match value {
            Value::DateTime(_) => value,
            Value::String(ref s) => Value::DateTime(parse_datetime(s).ok_or_else(|| mismatch(&value))?),
            other => return Err(mismatch(&other)),
        },
        AttributeType::Virtual | AttributeType::EntityName => value,
    };

    Ok(coerced)
}

fn check_target(attr: &AttributeSchema, reference: EntityReference) -> Result<EntityReference, CoercionError> {
    if attr.targets.is_empty() || attr.targets.iter().any(|t| t == &reference.logical_name) {
        Ok(reference)
    } else {
        Err(CoercionError::InvalidTarget {
            attribute: attr.name.clone(),
            target: reference.logical_name,
        })
    }
}

fn single_target(attr: &AttributeSchema, id: Uuid, found: &Value) -> Result<EntityReference, CoercionError> {
    match attr.targets.as_slice() {
        [target] => Ok(EntityReference::new(target.clone(), id)),
        _ => Err(CoercionError::TypeMismatch {
            attribute: attr.name.clone(),
            expected: "reference",
            found: found.type_name(),
        }),
    }
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Double(f) => Decimal::from_f64(*f),
        Value::String(s) => s.trim().parse().ok(),
        other => other.as_decimal(),
    }
}

fn parse_guid(s: &str) -> Option<Uuid> {
    Uuid::parse_str(s.trim().trim_start_matches('{').trim_end_matches('}')).ok()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Parses RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` or a bare date as UTC
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Converts a textual condition value into the type of `like`, the value it
/// will be compared against. Non-string values are returned unchanged.
pub fn align(condition: &Value, like: &Value) -> Value {
    let text = match condition {
        Value::String(s) => s.as_str(),
        Value::Integer(i) => {
            return match like {
                Value::Boolean(_) => Value::Boolean(*i != 0),
                _ => condition.clone(),
            }
        }
        _ => return condition.clone(),
    };

    let aligned = match like {
        Value::Guid(_) | Value::Reference(_) => parse_guid(text).map(Value::Guid),
        Value::DateTime(_) => parse_datetime(text).map(Value::DateTime),
        Value::Integer(_) | Value::OptionSet(_) => text.trim().parse().ok().map(Value::Integer),
        Value::BigInt(_) => text.trim().parse().ok().map(Value::BigInt),
        Value::Decimal(_) | Value::Money(_) => text.trim().parse().ok().map(Value::Decimal),
        Value::Double(_) => text.trim().parse().ok().map(Value::Double),
        Value::Boolean(_) => parse_bool(text).map(Value::Boolean),
        _ => None,
    };
    aligned.unwrap_or_else(|| condition.clone())
}

enum Numeric {
    Exact(Decimal),
    Float(f64),
}

fn numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Integer(i) | Value::OptionSet(i) => Some(Numeric::Exact(Decimal::from(*i))),
        Value::BigInt(i) => Some(Numeric::Exact(Decimal::from(*i))),
        Value::Decimal(d) | Value::Money(d) => Some(Numeric::Exact(*d)),
        Value::Double(f) => Some(Numeric::Float(*f)),
        _ => None,
    }
}

fn as_float(n: &Numeric) -> Option<f64> {
    match n {
        Numeric::Exact(d) => d.to_f64(),
        Numeric::Float(f) => Some(*f),
    }
}

/// Type-aware comparison; `None` when the values are not comparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
        return match (&x, &y) {
            (Numeric::Exact(x), Numeric::Exact(y)) => Some(x.cmp(y)),
            _ => as_float(&x)?.partial_cmp(&as_float(&y)?),
        };
    }

    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.to_lowercase().cmp(&y.to_lowercase())),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        (Value::Guid(_) | Value::Reference(_), Value::Guid(_) | Value::Reference(_)) => {
            Some(a.as_guid()?.cmp(&b.as_guid()?))
        }
        _ => None,
    }
}

/// Type-aware equality
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Equal)
}

/// Ordering used for sort keys. Missing and null values sort first;
/// references sort by cached name when both carry one, else by id.
pub fn sort_compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Reference(x)), Some(Value::Reference(y))) => match (&x.name, &y.name) {
            (Some(xn), Some(yn)) => xn.to_lowercase().cmp(&yn.to_lowercase()),
            _ => x.id.cmp(&y.id),
        },
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::AttributeSchema;
    use std::str::FromStr;

    fn account_table() -> TableSchema {
        TableSchema::new("account", "accountid")
            .with_attribute(AttributeSchema::primary_name("name", 10))
            .with_attribute(AttributeSchema::lookup("primarycontactid", ["contact"]))
            .with_attribute(AttributeSchema::picklist("industrycode", [(1, "Accounting")]))
            .with_attribute(AttributeSchema::new("revenue", AttributeType::Money))
    }

    #[test]
    fn test_coerce_record_maps_generic_values() {
        let contact_id = Uuid::new_v4();
        let record = Record::new("account")
            .with("industrycode", 1)
            .with("revenue", 12)
            .with("primarycontactid", contact_id);

        let coerced = coerce_record(&account_table(), record).unwrap();
        assert_eq!(coerced.get("industrycode"), Some(&Value::OptionSet(1)));
        assert_eq!(coerced.get("revenue"), Some(&Value::Money(Decimal::from(12))));
        assert_eq!(
            coerced.get("primarycontactid"),
            Some(&Value::Reference(EntityReference::new("contact", contact_id)))
        );
    }

    #[test]
    fn test_coerce_record_rejects_undeclared() {
        let record = Record::new("account").with("nonexistent", 1);
        let err = coerce_record(&account_table(), record).unwrap_err();
        assert_eq!(err.attribute(), "nonexistent");
    }

    #[test]
    fn test_coerce_enforces_max_length() {
        let record = Record::new("account").with("name", "far too long a name");
        let err = coerce_record(&account_table(), record).unwrap_err();
        assert!(matches!(err, CoercionError::TooLong { max_length: 10, .. }));
    }

    #[test]
    fn test_coerce_rejects_wrong_target() {
        let record = Record::new("account")
            .with("primarycontactid", EntityReference::new("lead", Uuid::new_v4()));
        let err = coerce_record(&account_table(), record).unwrap_err();
        assert!(matches!(err, CoercionError::InvalidTarget { .. }));
    }

    #[test]
    fn test_primary_id_attribute_supplies_id() {
        let id = Uuid::new_v4();
        let record = Record::new("account").with("accountid", id);
        let coerced = coerce_record(&account_table(), record).unwrap();
        assert_eq!(coerced.id, id);
    }

    #[test]
    fn test_compare_numbers_across_types() {
        let money = Value::Money(Decimal::from_str("19.99").unwrap());
        assert_eq!(compare(&money, &Value::Integer(20)), Some(Ordering::Less));
        assert!(values_equal(&Value::OptionSet(2), &Value::Integer(2)));
        assert_eq!(compare(&Value::Double(1.5), &Value::Integer(1)), Some(Ordering::Greater));
    }

    #[test]
    fn test_compare_strings_case_insensitive() {
        assert!(values_equal(&Value::from("Contoso"), &Value::from("contoso")));
        assert_eq!(compare(&Value::Null, &Value::Null), None);
    }

    #[test]
    fn test_reference_equals_guid() {
        let id = Uuid::new_v4();
        let reference = Value::Reference(EntityReference::new("contact", id));
        assert!(values_equal(&reference, &Value::Guid(id)));
    }

    #[test]
    fn test_align_string_condition_values() {
        let id = Uuid::new_v4();
        let like = Value::Reference(EntityReference::new("contact", id));
        assert_eq!(align(&Value::String(id.to_string()), &like), Value::Guid(id));
        assert_eq!(align(&Value::from("3"), &Value::OptionSet(1)), Value::Integer(3));
        assert_eq!(align(&Value::from("1"), &Value::Boolean(false)), Value::Boolean(true));
        assert_eq!(
            align(&Value::from("2024-03-01"), &Value::DateTime(Utc::now())),
            Value::DateTime(parse_datetime("2024-03-01T00:00:00Z").unwrap())
        );
    }

    #[test]
    fn test_sort_compare_nulls_first() {
        let one = Value::Integer(1);
        assert_eq!(sort_compare(None, Some(&one)), Ordering::Less);
        assert_eq!(sort_compare(Some(&Value::Null), None), Ordering::Equal);
    }

    #[test]
    fn test_sort_compare_references_by_name() {
        let a = Value::Reference(EntityReference::new("contact", Uuid::from_u128(u128::MAX)).with_name("Adams"));
        let b = Value::Reference(EntityReference::new("contact", Uuid::nil()).with_name("Baker"));
        assert_eq!(sort_compare(Some(&a), Some(&b)), Ordering::Less);
    }
}
