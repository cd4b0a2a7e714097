//! Attribute values, references and records

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a record by table and id, or by natural key when the id is nil
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReference {
    pub logical_name: String,
    pub id: Uuid,
    /// Cached display name of the referenced record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Alternate key attributes, consulted when `id` is nil
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub key_attributes: BTreeMap<String, Value>,
}

impl EntityReference {
    pub fn new(logical_name: impl Into<String>, id: Uuid) -> Self {
        Self {
            logical_name: logical_name.into(),
            id,
            name: None,
            key_attributes: BTreeMap::new(),
        }
    }

    /// Reference resolved through alternate key attributes
    pub fn by_keys<I, K>(logical_name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            logical_name: logical_name.into(),
            id: Uuid::nil(),
            name: None,
            key_attributes: keys.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Same table and same id, ignoring the cached name
    pub fn same_target(&self, other: &EntityReference) -> bool {
        self.logical_name == other.logical_name && self.id == other.id
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.logical_name, self.id)
    }
}

/// A dynamically typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    String(String),
    Integer(i32),
    BigInt(i64),
    Boolean(bool),
    Double(f64),
    Decimal(Decimal),
    Money(Decimal),
    DateTime(DateTime<Utc>),
    Guid(Uuid),
    OptionSet(i32),
    Reference(EntityReference),
    PartyList(Vec<EntityReference>),
}

impl Value {
    /// Returns the variant name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::BigInt(_) => "big_int",
            Value::Boolean(_) => "boolean",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::Money(_) => "money",
            Value::DateTime(_) => "date_time",
            Value::Guid(_) => "guid",
            Value::OptionSet(_) => "option_set",
            Value::Reference(_) => "reference",
            Value::PartyList(_) => "party_list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(i) | Value::OptionSet(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) | Value::Money(d) => Some(*d),
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::BigInt(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Id carried by a guid or a reference
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            Value::Guid(id) => Some(*id),
            Value::Reference(r) => Some(r.id),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&EntityReference> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// All references held by this value
    pub fn references(&self) -> Vec<&EntityReference> {
        match self {
            Value::Reference(r) => vec![r],
            Value::PartyList(list) => list.iter().collect(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::BigInt(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Double(f)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        Value::Guid(id)
    }
}

impl From<EntityReference> for Value {
    fn from(r: EntityReference) -> Self {
        Value::Reference(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An entity instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub logical_name: String,
    /// Nil until assigned by the store
    pub id: Uuid,
    pub attributes: BTreeMap<String, Value>,
    /// Display labels keyed like `attributes`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub formatted_values: BTreeMap<String, String>,
}

impl Record {
    /// Creates a record without an id
    pub fn new(logical_name: impl Into<String>) -> Self {
        Self::with_id(logical_name, Uuid::nil())
    }

    pub fn with_id(logical_name: impl Into<String>, id: Uuid) -> Self {
        Self {
            logical_name: logical_name.into(),
            id,
            attributes: BTreeMap::new(),
            formatted_values: BTreeMap::new(),
        }
    }

    /// Builder form of `set`
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(attribute, value);
        self
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(attribute.into(), value.into());
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    pub fn remove(&mut self, attribute: &str) -> Option<Value> {
        self.attributes.remove(attribute)
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    pub fn formatted(&self, attribute: &str) -> Option<&str> {
        self.formatted_values.get(attribute).map(String::as_str)
    }

    /// Reference pointing at this record
    pub fn to_reference(&self) -> EntityReference {
        EntityReference::new(self.logical_name.clone(), self.id)
    }

    /// Drops every formatted value
    pub fn unformatted(mut self) -> Self {
        self.formatted_values.clear();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = Record::new("account").with("name", "Contoso").with("numberofemployees", 12);

        assert!(record.id.is_nil());
        assert_eq!(record.get("name").and_then(Value::as_str), Some("Contoso"));
        assert_eq!(record.get("numberofemployees").and_then(Value::as_i32), Some(12));
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i32> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".into()));
    }

    #[test]
    fn test_reference_same_target_ignores_name() {
        let id = Uuid::new_v4();
        let a = EntityReference::new("contact", id);
        let b = EntityReference::new("contact", id).with_name("Jane");
        assert!(a.same_target(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_value_json_shape() {
        let json = serde_json::to_value(Value::OptionSet(3)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "option_set", "value": 3}));

        let back: Value = serde_json::from_value(serde_json::json!({"type": "null"})).unwrap();
        assert!(back.is_null());
    }

    #[test]
    fn test_party_list_references() {
        let a = EntityReference::new("contact", Uuid::new_v4());
        let b = EntityReference::new("systemuser", Uuid::new_v4());
        let value = Value::PartyList(vec![a.clone(), b.clone()]);
        assert_eq!(value.references(), vec![&a, &b]);
    }
}
