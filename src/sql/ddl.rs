//! Physical schema generation
//!
//! One table per entity, one column per physical attribute in name order,
//! and a single-column primary key on the id attribute.
//!
//! # Examples
//!
//! ```ignore
//! let ddl = TableDdl::from_schema(catalog.require("account")?);
//! conn.execute_batch(&ddl.drop_sql())?;
//! conn.execute_batch(&ddl.create_sql(false))?;
//! ```

use std::fmt;

use crate::metadata::{AttributeSchema, AttributeType, TableSchema};

/// Longest string column still declared with a bounded length
pub const MAX_NVARCHAR_LENGTH: u32 = 8000;

/// Column length for JSON-encoded party lists
pub const PARTY_LIST_LENGTH: u32 = 500;

/// Scale-independent precision of decimal columns
pub const DECIMAL_PRECISION: u32 = 20;

/// SQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    UniqueIdentifier,
    Int,
    BigInt,
    Bit,
    DateTime,
    NVarChar(u32),
    NText,
    Money,
    Decimal(u32, u32),
    Float,
}

impl SqlType {
    /// Deterministic mapping from a semantic attribute type.
    ///
    /// `None` for attributes without a physical column.
    pub fn for_attribute(attr: &AttributeSchema) -> Option<SqlType> {
        if !attr.is_physical() {
            return None;
        }
        let sql_type = match attr.attribute_type {
            AttributeType::Uniqueidentifier | AttributeType::Lookup => SqlType::UniqueIdentifier,
            AttributeType::Integer | AttributeType::Picklist => SqlType::Int,
            AttributeType::BigInt => SqlType::BigInt,
            AttributeType::Boolean => SqlType::Bit,
            AttributeType::DateTime => SqlType::DateTime,
            AttributeType::String => {
                let length = attr.effective_max_length();
                if length > MAX_NVARCHAR_LENGTH {
                    SqlType::NText
                } else {
                    SqlType::NVarChar(length)
                }
            }
            AttributeType::Memo => SqlType::NText,
            AttributeType::PartyList => SqlType::NVarChar(PARTY_LIST_LENGTH),
            AttributeType::Money => SqlType::Money,
            AttributeType::Decimal => SqlType::Decimal(DECIMAL_PRECISION, attr.effective_precision()),
            AttributeType::Double => SqlType::Float,
            AttributeType::Virtual | AttributeType::EntityName => return None,
        };
        Some(sql_type)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::UniqueIdentifier => write!(f, "UNIQUEIDENTIFIER"),
            SqlType::Int => write!(f, "INT"),
            SqlType::BigInt => write!(f, "BIGINT"),
            SqlType::Bit => write!(f, "BIT"),
            SqlType::DateTime => write!(f, "DATETIME"),
            SqlType::NVarChar(n) => write!(f, "NVARCHAR({})", n),
            SqlType::NText => write!(f, "NTEXT"),
            SqlType::Money => write!(f, "MONEY"),
            SqlType::Decimal(p, s) => write!(f, "DECIMAL({},{})", p, s),
            SqlType::Float => write!(f, "FLOAT"),
        }
    }
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub primary_key: bool,
}

/// Physical layout of one entity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDdl {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDdl {
    pub fn from_schema(schema: &TableSchema) -> Self {
        let columns = schema
            .physical_attributes()
            .filter_map(|attr| {
                SqlType::for_attribute(attr).map(|sql_type| ColumnDef {
                    name: attr.name.clone(),
                    sql_type,
                    primary_key: attr.name == schema.primary_id_attribute,
                })
            })
            .collect();
        Self {
            name: schema.logical_name.clone(),
            columns,
        }
    }

    /// Name of the primary key column
    pub fn primary_key(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .map(|c| c.name.as_str())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// `CREATE TABLE` statement
    pub fn create_sql(&self, if_not_exists: bool) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.primary_key { " NOT NULL" } else { "" };
                format!("{} {}{}", quote_ident(&c.name), c.sql_type, null)
            })
            .collect();

        if let Some(pk) = self.primary_key() {
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                quote_ident(&format!("PK_{}_{}", self.name, pk)),
                quote_ident(pk)
            ));
        }

        format!(
            "CREATE TABLE {}{} ({});",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_ident(&self.name),
            parts.join(", ")
        )
    }

    /// `DROP TABLE IF EXISTS` statement
    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", quote_ident(&self.name))
    }
}

/// Double-quotes an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new("account", "accountid")
            .with_attribute(AttributeSchema::primary_name("name", 160))
            .with_attribute(AttributeSchema::string("description", 10000))
            .with_attribute(AttributeSchema::new("revenue", AttributeType::Money))
            .with_attribute(AttributeSchema::decimal("exchangerate", 10))
            .with_attribute(AttributeSchema::new("creditlimit_base", AttributeType::Decimal))
            .with_attribute(AttributeSchema::lookup("primarycontactid", ["contact"]))
            .with_attribute(AttributeSchema::string("primarycontactidname", 100).computed_from("primarycontactid"))
            .with_attribute(AttributeSchema::new("entityimage", AttributeType::Virtual))
            .with_attribute(AttributeSchema::party_list("customers", ["contact"]))
    }

    #[test]
    fn test_type_mapping() {
        let ddl = TableDdl::from_schema(&schema());
        let types: Vec<(String, String)> = ddl
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.sql_type.to_string()))
            .collect();

        assert_eq!(
            types,
            vec![
                ("accountid".to_string(), "UNIQUEIDENTIFIER".to_string()),
                ("creditlimit_base".to_string(), "DECIMAL(20,2)".to_string()),
                ("customers".to_string(), "NVARCHAR(500)".to_string()),
                ("description".to_string(), "NTEXT".to_string()),
                ("exchangerate".to_string(), "DECIMAL(20,10)".to_string()),
                ("name".to_string(), "NVARCHAR(160)".to_string()),
                ("primarycontactid".to_string(), "UNIQUEIDENTIFIER".to_string()),
                ("revenue".to_string(), "MONEY".to_string()),
            ]
        );
    }

    #[test]
    fn test_default_string_length() {
        let attr = AttributeSchema::new("code", AttributeType::String);
        assert_eq!(SqlType::for_attribute(&attr), Some(SqlType::NVarChar(100)));
    }

    #[test]
    fn test_create_sql() {
        let ddl = TableDdl::from_schema(
            &TableSchema::new("contact", "contactid").with_attribute(AttributeSchema::primary_name("fullname", 100)),
        );
        assert_eq!(
            ddl.create_sql(false),
            "CREATE TABLE \"contact\" (\"contactid\" UNIQUEIDENTIFIER NOT NULL, \"fullname\" NVARCHAR(100), \
             CONSTRAINT \"PK_contact_contactid\" PRIMARY KEY (\"contactid\"));"
        );
        assert!(ddl.create_sql(true).starts_with("CREATE TABLE IF NOT EXISTS \"contact\""));
        assert_eq!(ddl.drop_sql(), "DROP TABLE IF EXISTS \"contact\";");
    }
}
