//! Formatted Value Tests
//!
//! Display labels derived from raw values and metadata:
//! - money is rendered with the row's currency symbol
//! - option codes and booleans map to their labels
//! - references carry the target's primary name
//! - joined columns are labelled with the linked table's metadata
//! - a label that cannot be computed never fails the query

mod common;

use common::*;
use mirrordb::query::LinkEntity;
use mirrordb::{ColumnSet, EntityReference, QueryExpression, Record, Session, Value};
use uuid::Uuid;

// =============================================================================
// Helper Functions
// =============================================================================

fn dollar(session: &mut Session) -> Uuid {
    session
        .create(
            Record::new("transactioncurrency")
                .with("currencyname", "US Dollar")
                .with("currencysymbol", "$"),
        )
        .unwrap()
}

fn priced_account(session: &mut Session, name: &str, revenue: &str, currency: Uuid) -> Uuid {
    session
        .create(
            account(name)
                .with("revenue", money(revenue))
                .with("transactioncurrencyid", EntityReference::new("transactioncurrency", currency)),
        )
        .unwrap()
}

// =============================================================================
// Money
// =============================================================================

/// Money is the currency symbol followed by the stored amount, unrounded.
#[test]
fn test_money_label() {
    let mut session = memory_session();
    let usd = dollar(&mut session);
    priced_account(&mut session, "Contoso", "19.99", usd);
    priced_account(&mut session, "Fabrikam", "1000", usd);
    priced_account(&mut session, "Northwind", "19.999", usd);

    let result = session
        .retrieve_multiple(
            QueryExpression::new("account")
                .with_order(mirrordb::query::OrderExpression::asc("name")),
        )
        .unwrap();

    assert_eq!(result.records[0].formatted("revenue"), Some("$19.99"));
    assert_eq!(result.records[1].formatted("revenue"), Some("$1000"));
    assert_eq!(result.records[2].formatted("revenue"), Some("$19.999"));
}

/// Single-record retrieval is labelled the same way.
#[test]
fn test_retrieve_labels_money() {
    let mut session = memory_session();
    let usd = dollar(&mut session);
    let id = priced_account(&mut session, "Contoso", "19.99", usd);

    let record = session
        .retrieve(&EntityReference::new("account", id), &ColumnSet::All)
        .unwrap();
    assert_eq!(record.formatted("revenue"), Some("$19.99"));
    assert_eq!(record.formatted("transactioncurrencyid"), Some("US Dollar"));
}

/// Money without a currency is returned unlabelled; the query succeeds.
#[test]
fn test_missing_currency_degrades() {
    let mut session = memory_session();
    session
        .create(account("Contoso").with("revenue", money("5")))
        .unwrap();

    let result = session.retrieve_multiple(QueryExpression::new("account")).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.records[0].get("revenue"), Some(&money("5")));
    assert_eq!(result.records[0].formatted("revenue"), None);
}

// =============================================================================
// Options and Flags
// =============================================================================

#[test]
fn test_option_and_boolean_labels() {
    let mut session = memory_session();
    session
        .create(account("Contoso").with("industrycode", 1).with("donotemail", true))
        .unwrap();

    let result = session.retrieve_multiple(QueryExpression::new("account")).unwrap();
    let row = &result.records[0];
    assert_eq!(row.formatted("industrycode"), Some("Accounting"));
    assert_eq!(row.formatted("donotemail"), Some("Yes"));
    assert_eq!(row.formatted("name"), None);
}

/// An undeclared option code is left unlabelled.
#[test]
fn test_unknown_option_code_degrades() {
    let mut session = memory_session();
    session.create(account("Contoso").with("industrycode", 42)).unwrap();

    let result = session.retrieve_multiple(QueryExpression::new("account")).unwrap();
    assert_eq!(result.records[0].get("industrycode"), Some(&Value::OptionSet(42)));
    assert_eq!(result.records[0].formatted("industrycode"), None);
}

// =============================================================================
// References
// =============================================================================

/// References get the target's primary name, as a label and on the value.
#[test]
fn test_reference_names() {
    let mut session = memory_session();
    let jane = session.create(contact("Jane Doe")).unwrap();
    session
        .create(account("Contoso").with("primarycontactid", EntityReference::new("contact", jane)))
        .unwrap();

    let result = session.retrieve_multiple(QueryExpression::new("account")).unwrap();
    let row = &result.records[0];
    assert_eq!(row.formatted("primarycontactid"), Some("Jane Doe"));
    let reference = row.get("primarycontactid").and_then(Value::as_reference).unwrap();
    assert_eq!(reference.id, jane);
    assert_eq!(reference.name.as_deref(), Some("Jane Doe"));
}

/// Stored rows are untouched by labelling.
#[test]
fn test_labels_not_stored() {
    let mut session = memory_session();
    let usd = dollar(&mut session);
    priced_account(&mut session, "Contoso", "19.99", usd);

    session.retrieve_multiple(QueryExpression::new("account")).unwrap();

    let stored = session.entities("account").unwrap();
    assert!(stored[0].formatted_values.is_empty());
}

// =============================================================================
// Joined Columns
// =============================================================================

/// Joined columns are labelled under their alias-qualified key.
#[test]
fn test_aliased_labels() {
    let mut session = memory_session();
    let usd = dollar(&mut session);
    let contoso = session
        .create(
            account("Contoso")
                .with("industrycode", 2)
                .with("revenue", money("19.99"))
                .with("transactioncurrencyid", EntityReference::new("transactioncurrency", usd)),
        )
        .unwrap();
    session
        .create(contact("Jane").with("parentcustomerid", EntityReference::new("account", contoso)))
        .unwrap();

    let query = QueryExpression::new("contact")
        .with_columns(ColumnSet::columns(["fullname"]))
        .with_link(
            LinkEntity::new("parentcustomerid", "account", "accountid")
                .with_alias("a")
                .with_columns(ColumnSet::columns(["industrycode", "revenue", "transactioncurrencyid"])),
        );
    let result = session.retrieve_multiple(query).unwrap();

    let row = &result.records[0];
    assert_eq!(row.formatted("a.industrycode"), Some("Agriculture"));
    assert_eq!(row.formatted("a.revenue"), Some("$19.99"));
    assert_eq!(row.formatted("a.transactioncurrencyid"), Some("US Dollar"));
    assert_eq!(row.formatted("parentcustomerid"), None);
}

/// Projection drops labels of columns that were not requested.
#[test]
fn test_projection_prunes_labels() {
    let mut session = memory_session();
    let usd = dollar(&mut session);
    priced_account(&mut session, "Contoso", "19.99", usd);

    let result = session
        .retrieve_multiple(QueryExpression::new("account").with_columns(ColumnSet::columns(["name", "revenue"])))
        .unwrap();

    let row = &result.records[0];
    assert_eq!(row.formatted("revenue"), Some("$19.99"));
    assert!(!row.contains("transactioncurrencyid"));
    assert_eq!(row.formatted("transactioncurrencyid"), None);
}
