//! Query model
//!
//! Canonical query tree, the FetchXML and query-by-attribute input forms,
//! and the normalization and shape checks applied before evaluation.

mod ast;
mod errors;
pub mod fetchxml;
pub mod normalize;

pub use ast::{
    Arity, ColumnSet, ConditionExpression, ConditionOperator, Filter, JoinOperator, LinkEntity,
    LogicalOperator, OrderDirection, OrderExpression, PageInfo, QueryByAttribute, QueryExpression,
    QueryInput,
};
pub use errors::{QueryError, QueryErrorCode, QueryResult};
pub use normalize::{assign_aliases, normalize, validate, MAX_ORDERS};
