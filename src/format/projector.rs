//! Formatted-value projection
//!
//! Labels for a batch are computed in two passes. The parallel pass maps
//! each row to a `RowLabels` value, reading only that row, the catalog and
//! the lookup cache. The merge pass then writes labels back in row order.

use std::collections::HashMap;

use chrono::SecondsFormat;
use rayon::prelude::*;

use super::errors::FormatError;
use super::lookup::LookupCache;
use crate::metadata::{AttributeSchema, AttributeType, BooleanLabels, MetadataCatalog};
use crate::observability::{log_event_with_fields, Event};
use crate::store::{EntityStore, StoreResult};
use crate::value::{Record, Value};

/// Attribute on a record pointing at its currency
pub const CURRENCY_ATTRIBUTE: &str = "transactioncurrencyid";
/// Currency entity and its symbol attribute
pub const CURRENCY_ENTITY: &str = "transactioncurrency";
pub const CURRENCY_SYMBOL_ATTRIBUTE: &str = "currencysymbol";

/// Labels computed for one row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowLabels {
    pub labels: Vec<(String, String)>,
    /// Display names resolved for reference attributes
    pub names: Vec<(String, String)>,
    pub failures: Vec<FormatError>,
}

impl RowLabels {
    /// Writes labels and resolved names onto the row
    pub fn apply(self, record: &mut Record) {
        for (key, name) in self.names {
            if let Some(Value::Reference(reference)) = record.attributes.get_mut(&key) {
                reference.name = Some(name);
            }
        }
        record.formatted_values.extend(self.labels);
    }
}

/// Computes display labels from raw values and metadata
pub struct FormattedValueProjector<'a> {
    catalog: &'a MetadataCatalog,
    aliases: &'a HashMap<String, String>,
}

impl<'a> FormattedValueProjector<'a> {
    /// `aliases` maps link aliases to the entity they join
    pub fn new(catalog: &'a MetadataCatalog, aliases: &'a HashMap<String, String>) -> Self {
        Self { catalog, aliases }
    }

    /// Labels every row in place. Returns the number of labels that could
    /// not be computed.
    pub fn project(&self, store: &dyn EntityStore, records: &mut [Record]) -> StoreResult<usize> {
        let lookups = LookupCache::collect(store, records)?;

        let labels: Vec<RowLabels> = records
            .par_iter()
            .map(|record| self.label_row(record, &lookups))
            .collect();

        let mut degraded = 0;
        for (record, labels) in records.iter_mut().zip(labels) {
            for failure in &labels.failures {
                degraded += 1;
                let reason = failure.to_string();
                log_event_with_fields(
                    Event::FormatDegraded,
                    &[
                        ("attribute", failure.attribute()),
                        ("entity", record.logical_name.as_str()),
                        ("reason", reason.as_str()),
                    ],
                );
            }
            labels.apply(record);
        }
        Ok(degraded)
    }

    /// Computes every label for one row without modifying it
    pub fn label_row(&self, record: &Record, lookups: &LookupCache) -> RowLabels {
        let mut out = RowLabels::default();
        for (key, value) in &record.attributes {
            let (prefix, attribute) = match self.schema_for(&record.logical_name, key) {
                Some(found) => found,
                None => continue,
            };
            match self.label(record, prefix, key, attribute, value, lookups) {
                Ok(Some(Label::Text(text))) => out.labels.push((key.clone(), text)),
                Ok(Some(Label::Name(name))) => {
                    out.labels.push((key.clone(), name.clone()));
                    out.names.push((key.clone(), name));
                }
                Ok(None) => {}
                Err(failure) => out.failures.push(failure),
            }
        }
        out
    }

    /// Schema of an attribute key, with the alias prefix for joined columns
    fn schema_for(&self, entity: &str, key: &str) -> Option<(Option<&'a str>, &'a AttributeSchema)> {
        match key.split_once('.') {
            Some((alias, attribute)) => {
                let (alias, linked) = self.aliases.get_key_value(alias)?;
                Some((Some(alias.as_str()), self.catalog.attribute(linked, attribute)?))
            }
            None => Some((None, self.catalog.attribute(entity, key)?)),
        }
    }

    fn label(
        &self,
        record: &Record,
        prefix: Option<&str>,
        key: &str,
        attribute: &AttributeSchema,
        value: &Value,
        lookups: &LookupCache,
    ) -> Result<Option<Label>, FormatError> {
        let text = match (attribute.attribute_type, value) {
            (AttributeType::Picklist, Value::OptionSet(code) | Value::Integer(code)) => {
                match attribute.option_label(*code) {
                    Some(label) => label.to_string(),
                    None => {
                        return Err(FormatError::UnknownOptionCode {
                            attribute: key.to_string(),
                            code: *code,
                        })
                    }
                }
            }
            (AttributeType::Boolean, Value::Boolean(flag)) => {
                let defaults = BooleanLabels::default();
                let labels = attribute.boolean_labels.as_ref().unwrap_or(&defaults);
                if *flag {
                    labels.true_label.clone()
                } else {
                    labels.false_label.clone()
                }
            }
            (AttributeType::Money, Value::Money(amount) | Value::Decimal(amount)) => {
                let symbol = self.currency_symbol(record, prefix, key, lookups)?;
                // The stored amount as is; the attribute precision governs storage only
                format!("{}{}", symbol, amount)
            }
            (AttributeType::Lookup, Value::Reference(reference)) => {
                if let Some(name) = &reference.name {
                    return Ok(Some(Label::Name(name.clone())));
                }
                let name = lookups
                    .get(&reference.logical_name, reference.id)
                    .and_then(|target| {
                        let table = self.catalog.get(&target.logical_name)?;
                        let primary_name = table.primary_name_attribute()?;
                        target.get(&primary_name.name)?.as_str().map(str::to_string)
                    });
                return Ok(name.map(Label::Name));
            }
            (AttributeType::Integer, Value::Integer(i)) => i.to_string(),
            (AttributeType::BigInt, Value::BigInt(i)) => i.to_string(),
            (AttributeType::Double, Value::Double(f)) => f.to_string(),
            (AttributeType::Decimal, Value::Decimal(d)) => d.to_string(),
            (AttributeType::DateTime, Value::DateTime(dt)) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
            (AttributeType::Memo, Value::String(s)) => s.clone(),
            _ => return Ok(None),
        };
        Ok(Some(Label::Text(text)))
    }

    /// Symbol of the currency the row (or its joined row) points at
    fn currency_symbol(
        &self,
        record: &Record,
        prefix: Option<&str>,
        key: &str,
        lookups: &LookupCache,
    ) -> Result<String, FormatError> {
        let currency_key = match prefix {
            Some(alias) => format!("{}.{}", alias, CURRENCY_ATTRIBUTE),
            None => CURRENCY_ATTRIBUTE.to_string(),
        };
        let currency = record
            .get(&currency_key)
            .and_then(Value::as_reference)
            .ok_or_else(|| FormatError::MissingCurrency {
                attribute: key.to_string(),
            })?;

        lookups
            .get(CURRENCY_ENTITY, currency.id)
            .and_then(|row| row.get(CURRENCY_SYMBOL_ATTRIBUTE))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FormatError::UnresolvedCurrency {
                attribute: key.to_string(),
                id: currency.id,
            })
    }
}

enum Label {
    Text(String),
    /// Reference display name, also written back onto the value
    Name(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TableSchema;
    use crate::value::EntityReference;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use uuid::Uuid;

    fn catalog() -> MetadataCatalog {
        MetadataCatalog::from_tables([
            TableSchema::new("account", "accountid")
                .with_attribute(AttributeSchema::primary_name("name", 100))
                .with_attribute(AttributeSchema::new("revenue", AttributeType::Money))
                .with_attribute(AttributeSchema::lookup(CURRENCY_ATTRIBUTE, [CURRENCY_ENTITY]))
                .with_attribute(AttributeSchema::lookup("primarycontactid", ["contact"]))
                .with_attribute(AttributeSchema::picklist("industrycode", [(1, "Accounting")]))
                .with_attribute(AttributeSchema::boolean("donotemail", "Do Not Allow", "Allow"))
                .with_attribute(AttributeSchema::new("numberofemployees", AttributeType::Integer)),
            TableSchema::new("contact", "contactid")
                .with_attribute(AttributeSchema::primary_name("fullname", 100)),
            TableSchema::new(CURRENCY_ENTITY, "transactioncurrencyid")
                .with_attribute(AttributeSchema::string(CURRENCY_SYMBOL_ATTRIBUTE, 5)),
        ])
        .unwrap()
    }

    #[test]
    fn test_labels() {
        let catalog = catalog();
        let aliases = HashMap::new();
        let projector = FormattedValueProjector::new(&catalog, &aliases);

        let currency = Uuid::new_v4();
        let contact = Uuid::new_v4();
        let mut lookups = LookupCache::new();
        lookups.insert(Record::with_id(CURRENCY_ENTITY, currency).with(CURRENCY_SYMBOL_ATTRIBUTE, "$"));
        lookups.insert(Record::with_id("contact", contact).with("fullname", "Jane Doe"));

        let mut record = Record::new("account")
            .with("name", "Contoso")
            .with("revenue", Value::Money(Decimal::from_str("19.99").unwrap()))
            .with(CURRENCY_ATTRIBUTE, EntityReference::new(CURRENCY_ENTITY, currency))
            .with("primarycontactid", EntityReference::new("contact", contact))
            .with("industrycode", Value::OptionSet(1))
            .with("donotemail", true)
            .with("numberofemployees", 12);

        let labels = projector.label_row(&record, &lookups);
        assert!(labels.failures.is_empty());
        labels.apply(&mut record);

        assert_eq!(record.formatted("revenue"), Some("$19.99"));
        assert_eq!(record.formatted("industrycode"), Some("Accounting"));
        assert_eq!(record.formatted("donotemail"), Some("Do Not Allow"));
        assert_eq!(record.formatted("numberofemployees"), Some("12"));
        assert_eq!(record.formatted("primarycontactid"), Some("Jane Doe"));
        assert_eq!(record.formatted("name"), None);
        assert_eq!(
            record
                .get("primarycontactid")
                .and_then(Value::as_reference)
                .and_then(|r| r.name.as_deref()),
            Some("Jane Doe")
        );
    }

    #[test]
    fn test_failures_degrade() {
        let catalog = catalog();
        let aliases = HashMap::new();
        let projector = FormattedValueProjector::new(&catalog, &aliases);

        let record = Record::new("account")
            .with("revenue", Value::Money(Decimal::from(5)))
            .with("industrycode", Value::OptionSet(99))
            .with("primarycontactid", EntityReference::new("contact", Uuid::new_v4()));

        let labels = projector.label_row(&record, &LookupCache::new());
        assert_eq!(labels.failures.len(), 2);
        assert!(labels.labels.is_empty());
        assert!(labels.names.is_empty());
    }

    #[test]
    fn test_alias_columns_use_linked_metadata() {
        let catalog = catalog();
        let aliases = HashMap::from([("c".to_string(), "contact".to_string())]);
        let projector = FormattedValueProjector::new(&catalog, &aliases);

        let record = Record::new("contact")
            .with("c.fullname", "Jane")
            .with("x.fullname", "Unknown alias");
        let labels = projector.label_row(&record, &LookupCache::new());
        assert!(labels.labels.is_empty());
        assert!(labels.failures.is_empty());

        let account_aliases = HashMap::from([("a".to_string(), "account".to_string())]);
        let projector = FormattedValueProjector::new(&catalog, &account_aliases);
        let record = Record::new("contact").with("a.industrycode", Value::OptionSet(1));
        let labels = projector.label_row(&record, &LookupCache::new());
        assert_eq!(labels.labels, vec![("a.industrycode".to_string(), "Accounting".to_string())]);
    }
}
