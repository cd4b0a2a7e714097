//! Entity metadata type definitions
//!
//! Semantic attribute types:
//! - uniqueidentifier: 128-bit record id
//! - lookup: reference to a record in one of the declared target tables
//! - picklist: option-set code with configured labels
//! - boolean: two-state value with configured labels
//! - money / decimal / double / integer / big_int: numeric values
//! - string / memo: text, `max_length` bounded for strings
//! - date_time: UTC timestamp
//! - party_list: list of references, never formatted
//! - virtual / entity_name: non-physical helper attributes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default length of a string attribute without an explicit `max_length`.
pub const DEFAULT_STRING_LENGTH: u32 = 100;

/// Default scale of a decimal attribute without an explicit `precision`.
pub const DEFAULT_DECIMAL_PRECISION: u32 = 2;

/// Semantic type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Uniqueidentifier,
    Lookup,
    Picklist,
    Boolean,
    Money,
    Decimal,
    Double,
    Integer,
    BigInt,
    String,
    Memo,
    DateTime,
    PartyList,
    Virtual,
    EntityName,
}

impl AttributeType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeType::Uniqueidentifier => "uniqueidentifier",
            AttributeType::Lookup => "lookup",
            AttributeType::Picklist => "picklist",
            AttributeType::Boolean => "boolean",
            AttributeType::Money => "money",
            AttributeType::Decimal => "decimal",
            AttributeType::Double => "double",
            AttributeType::Integer => "integer",
            AttributeType::BigInt => "big_int",
            AttributeType::String => "string",
            AttributeType::Memo => "memo",
            AttributeType::DateTime => "date_time",
            AttributeType::PartyList => "party_list",
            AttributeType::Virtual => "virtual",
            AttributeType::EntityName => "entity_name",
        }
    }

    /// Whether values of this type are stored as a physical column
    pub fn is_physical(&self) -> bool {
        !matches!(self, AttributeType::Virtual | AttributeType::EntityName)
    }

    /// Whether values of this type hold references to other records
    pub fn is_reference(&self) -> bool {
        matches!(self, AttributeType::Lookup | AttributeType::PartyList)
    }
}

/// A single option of a picklist attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionMetadata {
    pub value: i32,
    pub label: String,
}

/// Labels of a boolean attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanLabels {
    pub true_label: String,
    pub false_label: String,
}

impl Default for BooleanLabels {
    fn default() -> Self {
        Self {
            true_label: "Yes".into(),
            false_label: "No".into(),
        }
    }
}

/// Attribute definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    /// Logical attribute name
    pub name: String,
    /// Semantic type
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    #[serde(default)]
    pub is_primary_id: bool,
    #[serde(default)]
    pub is_primary_name: bool,
    /// Tables a lookup or party list may point at
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean_labels: Option<BooleanLabels>,
    /// Set for computed attributes derived from another attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_of: Option<String>,
}

impl AttributeSchema {
    /// Create an attribute with no constraints
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            is_primary_id: false,
            is_primary_name: false,
            targets: Vec::new(),
            max_length: None,
            precision: None,
            options: Vec::new(),
            boolean_labels: None,
            attribute_of: None,
        }
    }

    /// Create a primary id attribute
    pub fn primary_id(name: impl Into<String>) -> Self {
        let mut attr = Self::new(name, AttributeType::Uniqueidentifier);
        attr.is_primary_id = true;
        attr
    }

    /// Create a string attribute
    pub fn string(name: impl Into<String>, max_length: u32) -> Self {
        let mut attr = Self::new(name, AttributeType::String);
        attr.max_length = Some(max_length);
        attr
    }

    /// Create the primary name attribute of a table
    pub fn primary_name(name: impl Into<String>, max_length: u32) -> Self {
        let mut attr = Self::string(name, max_length);
        attr.is_primary_name = true;
        attr
    }

    /// Create a lookup attribute pointing at the given tables
    pub fn lookup<I, S>(name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut attr = Self::new(name, AttributeType::Lookup);
        attr.targets = targets.into_iter().map(Into::into).collect();
        attr
    }

    /// Create a picklist attribute from `(code, label)` pairs
    pub fn picklist<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = (i32, S)>,
        S: Into<String>,
    {
        let mut attr = Self::new(name, AttributeType::Picklist);
        attr.options = options
            .into_iter()
            .map(|(value, label)| OptionMetadata {
                value,
                label: label.into(),
            })
            .collect();
        attr
    }

    /// Create a boolean attribute with explicit labels
    pub fn boolean(
        name: impl Into<String>,
        true_label: impl Into<String>,
        false_label: impl Into<String>,
    ) -> Self {
        let mut attr = Self::new(name, AttributeType::Boolean);
        attr.boolean_labels = Some(BooleanLabels {
            true_label: true_label.into(),
            false_label: false_label.into(),
        });
        attr
    }

    /// Create a decimal attribute with the given scale
    pub fn decimal(name: impl Into<String>, precision: u32) -> Self {
        let mut attr = Self::new(name, AttributeType::Decimal);
        attr.precision = Some(precision);
        attr
    }

    /// Create a party list attribute
    pub fn party_list<I, S>(name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut attr = Self::lookup(name, targets);
        attr.attribute_type = AttributeType::PartyList;
        attr
    }

    /// Marks the attribute as computed from another attribute
    pub fn computed_from(mut self, source: impl Into<String>) -> Self {
        self.attribute_of = Some(source.into());
        self
    }

    /// Returns the configured label of an option code
    pub fn option_label(&self, code: i32) -> Option<&str> {
        self.options
            .iter()
            .find(|opt| opt.value == code)
            .map(|opt| opt.label.as_str())
    }

    /// Whether this attribute is stored as a physical column
    pub fn is_physical(&self) -> bool {
        self.attribute_type.is_physical() && self.attribute_of.is_none()
    }

    /// Effective string length limit
    pub fn effective_max_length(&self) -> u32 {
        self.max_length.unwrap_or(DEFAULT_STRING_LENGTH)
    }

    /// Effective decimal scale
    pub fn effective_precision(&self) -> u32 {
        self.precision.unwrap_or(DEFAULT_DECIMAL_PRECISION)
    }
}

/// Table (entity) schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Logical entity name
    pub logical_name: String,
    /// Name of the primary id attribute
    pub primary_id_attribute: String,
    /// Attribute definitions keyed by logical name
    pub attributes: BTreeMap<String, AttributeSchema>,
}

impl TableSchema {
    /// Create a table schema holding only its primary id attribute
    pub fn new(logical_name: impl Into<String>, primary_id_attribute: impl Into<String>) -> Self {
        let primary_id_attribute = primary_id_attribute.into();
        let mut attributes = BTreeMap::new();
        attributes.insert(
            primary_id_attribute.clone(),
            AttributeSchema::primary_id(primary_id_attribute.clone()),
        );
        Self {
            logical_name: logical_name.into(),
            primary_id_attribute,
            attributes,
        }
    }

    /// Adds an attribute, replacing any attribute with the same name
    pub fn with_attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    /// Gets an attribute by logical name
    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Returns the designated primary name attribute, if any
    pub fn primary_name_attribute(&self) -> Option<&AttributeSchema> {
        self.attributes.values().find(|a| a.is_primary_name)
    }

    /// Returns the physical attributes in name order
    pub fn physical_attributes(&self) -> impl Iterator<Item = &AttributeSchema> {
        self.attributes.values().filter(|a| a.is_physical())
    }

    /// Validates the schema structure itself
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.logical_name.is_empty() {
            return Err("Table schema must have a logical name".into());
        }

        let primary = self
            .attributes
            .get(&self.primary_id_attribute)
            .ok_or_else(|| {
                format!(
                    "Primary id attribute '{}' is not declared",
                    self.primary_id_attribute
                )
            })?;

        if primary.attribute_type != AttributeType::Uniqueidentifier {
            return Err(format!(
                "Primary id attribute '{}' must be a uniqueidentifier, found {}",
                primary.name,
                primary.attribute_type.type_name()
            ));
        }

        if self.attributes.values().filter(|a| a.is_primary_name).count() > 1 {
            return Err("At most one attribute may be the primary name".into());
        }

        for (key, attr) in &self.attributes {
            if key != &attr.name {
                return Err(format!("Attribute key '{}' does not match name '{}'", key, attr.name));
            }
            if attr.attribute_type.is_reference() && attr.targets.is_empty() {
                return Err(format!("Reference attribute '{}' declares no targets", attr.name));
            }
        }

        Ok(())
    }
}
