//! Query normalization and shape validation
//!
//! Normalization turns every input form into a canonical `QueryExpression`
//! and assigns an alias to every link lacking one: `"{to_entity}{n}"`,
//! depth-first, with one counter per query that only advances when an
//! alias is assigned. Conditions inside a link's criteria that name no
//! entity are qualified with that link's alias.

use std::collections::HashSet;

use super::ast::{ConditionExpression, Filter, LinkEntity, QueryByAttribute, QueryExpression, QueryInput};
use super::errors::{QueryError, QueryResult};
use super::fetchxml;
use crate::metadata::MetadataCatalog;

/// Most sort keys a query may carry
pub const MAX_ORDERS: usize = 2;

/// Normalizes any accepted input into a canonical expression
pub fn normalize(input: QueryInput) -> QueryResult<QueryExpression> {
    let mut query = match input {
        QueryInput::Expression(query) => query,
        QueryInput::ByAttribute(query) => by_attribute(query)?,
        QueryInput::FetchXml(xml) => fetchxml::parse(&xml)?,
    };
    assign_aliases(&mut query);
    Ok(query)
}

fn by_attribute(query: QueryByAttribute) -> QueryResult<QueryExpression> {
    if query.attributes.len() != query.values.len() {
        return Err(QueryError::unsupported_shape(format!(
            "query by attribute lists {} attributes but {} values",
            query.attributes.len(),
            query.values.len()
        )));
    }

    let conditions = query
        .attributes
        .into_iter()
        .zip(query.values)
        .map(|(attribute, value)| Filter::Condition(ConditionExpression::eq(attribute, value)))
        .collect();

    Ok(QueryExpression {
        entity_name: query.entity_name,
        columns: query.columns,
        criteria: Filter::And(conditions),
        links: Vec::new(),
        orders: query.orders,
        page_info: query.page_info,
    })
}

/// Assigns deterministic aliases to unaliased links
pub fn assign_aliases(query: &mut QueryExpression) {
    let mut counter = 1;
    for link in &mut query.links {
        assign_link_alias(link, &mut counter);
    }
}

fn assign_link_alias(link: &mut LinkEntity, counter: &mut usize) {
    if link.alias.is_none() {
        link.alias = Some(generated_alias(&link.to_entity, counter));
    }

    let alias = link.effective_alias().to_string();
    for condition in link.criteria.conditions_mut() {
        if condition.entity_name.is_none() {
            condition.entity_name = Some(alias.clone());
        }
    }

    for nested in &mut link.links {
        assign_link_alias(nested, counter);
    }
}

/// Alias for the next unaliased link; advances the counter
pub(crate) fn generated_alias(to_entity: &str, counter: &mut usize) -> String {
    let alias = format!("{}{}", to_entity, counter);
    *counter += 1;
    alias
}

/// Rejects shapes the engine does not evaluate. Returns the base entity name.
pub fn validate<'q>(query: &'q QueryExpression, catalog: &MetadataCatalog) -> QueryResult<&'q str> {
    let entity = query
        .entity_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| QueryError::unsupported_shape("query has no entity name"))?;

    if !catalog.contains(entity) {
        return Err(QueryError::unsupported_shape(format!("unknown entity '{}'", entity)));
    }

    if query.orders.len() > MAX_ORDERS {
        return Err(QueryError::unsupported_shape(format!(
            "at most {} ordering keys are supported, got {}",
            MAX_ORDERS,
            query.orders.len()
        )));
    }

    let mut aliases = HashSet::new();
    for link in &query.links {
        validate_link(link, catalog, &mut aliases)?;
    }

    let conditions = query
        .criteria
        .conditions()
        .into_iter()
        .chain(query.links.iter().flat_map(link_conditions));
    for condition in conditions {
        if !condition.operator.accepts(condition.values.len()) {
            return Err(QueryError::unsupported_shape(format!(
                "operator '{}' on '{}' does not take {} value(s)",
                condition.operator.code(),
                condition.attribute,
                condition.values.len()
            )));
        }
    }

    Ok(entity)
}

fn validate_link<'q>(
    link: &'q LinkEntity,
    catalog: &MetadataCatalog,
    aliases: &mut HashSet<&'q str>,
) -> QueryResult<()> {
    if !catalog.contains(&link.to_entity) {
        return Err(QueryError::unsupported_shape(format!(
            "link to unknown entity '{}'",
            link.to_entity
        )));
    }
    if !aliases.insert(link.effective_alias()) {
        return Err(QueryError::unsupported_shape(format!(
            "alias '{}' is used more than once",
            link.effective_alias()
        )));
    }
    for nested in &link.links {
        validate_link(nested, catalog, aliases)?;
    }
    Ok(())
}

fn link_conditions(link: &LinkEntity) -> Vec<&ConditionExpression> {
    let mut conditions = link.criteria.conditions();
    for nested in &link.links {
        conditions.extend(link_conditions(nested));
    }
    conditions
}
