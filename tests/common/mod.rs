//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use mirrordb::metadata::{AttributeSchema, AttributeType, MetadataCatalog, TableSchema};
use mirrordb::{Record, Session};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Catalog covering accounts, contacts, currencies, users and teams
pub fn fixture_catalog() -> MetadataCatalog {
    MetadataCatalog::from_tables([
        TableSchema::new("account", "accountid")
            .with_attribute(AttributeSchema::primary_name("name", 160))
            .with_attribute(AttributeSchema::new("revenue", AttributeType::Money))
            .with_attribute(AttributeSchema::lookup("transactioncurrencyid", ["transactioncurrency"]))
            .with_attribute(AttributeSchema::lookup("primarycontactid", ["contact"]))
            .with_attribute(AttributeSchema::lookup("ownerid", ["systemuser"]))
            .with_attribute(AttributeSchema::picklist(
                "industrycode",
                [(1, "Accounting"), (2, "Agriculture")],
            ))
            .with_attribute(AttributeSchema::new("donotemail", AttributeType::Boolean))
            .with_attribute(AttributeSchema::new("numberofemployees", AttributeType::Integer))
            .with_attribute(AttributeSchema::new("createdon", AttributeType::DateTime))
            .with_attribute(AttributeSchema::new("description", AttributeType::Memo)),
        TableSchema::new("contact", "contactid")
            .with_attribute(AttributeSchema::primary_name("fullname", 160))
            .with_attribute(AttributeSchema::string("lastname", 50))
            .with_attribute(AttributeSchema::string("city", 80))
            .with_attribute(AttributeSchema::lookup("parentcustomerid", ["account"])),
        TableSchema::new("transactioncurrency", "transactioncurrencyid")
            .with_attribute(AttributeSchema::primary_name("currencyname", 100))
            .with_attribute(AttributeSchema::string("currencysymbol", 5))
            .with_attribute(AttributeSchema::decimal("exchangerate", 4)),
        TableSchema::new("systemuser", "systemuserid")
            .with_attribute(AttributeSchema::primary_name("fullname", 160)),
        TableSchema::new("team", "teamid")
            .with_attribute(AttributeSchema::primary_name("name", 160))
            .with_attribute(AttributeSchema::picklist("teamtype", [(0, "Owner"), (1, "Access")])),
        TableSchema::new("teammembership", "teammembershipid")
            .with_attribute(AttributeSchema::lookup("systemuserid", ["systemuser"]))
            .with_attribute(AttributeSchema::lookup("teamid", ["team"])),
    ])
    .unwrap()
}

/// In-memory session over the fixture catalog
pub fn memory_session() -> Session {
    Session::builder(fixture_catalog()).build().unwrap()
}

/// Fixed evaluation instant: Wednesday 2024-05-15 12:00 UTC
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
}

pub fn money(amount: &str) -> mirrordb::Value {
    mirrordb::Value::Money(Decimal::from_str(amount).unwrap())
}

pub fn account(name: &str) -> Record {
    Record::new("account").with("name", name)
}

pub fn contact(fullname: &str) -> Record {
    Record::new("contact").with("fullname", fullname)
}

/// Names of the returned rows, in order
pub fn names<'a>(records: impl IntoIterator<Item = &'a Record>, attribute: &str) -> Vec<String> {
    records
        .into_iter()
        .filter_map(|r| r.get(attribute)?.as_str().map(str::to_string))
        .collect()
}
