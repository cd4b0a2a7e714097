//! FetchXML translation
//!
//! Parses the XML query language into a canonical `QueryExpression`.
//! Elements handled: `fetch`, `entity`, `attribute`, `all-attributes`,
//! `order`, `filter`, `condition`, `value` and `link-entity`.
//!
//! Condition values stay textual; they are aligned with the compared
//! attribute's type at evaluation time. Unaliased links get their generated
//! alias while parsing so orders inside them can be qualified.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::ast::{
    ColumnSet, ConditionExpression, ConditionOperator, Filter, JoinOperator, LinkEntity,
    LogicalOperator, OrderExpression, QueryExpression,
};
use super::errors::{QueryError, QueryResult};
use super::normalize::generated_alias;
use crate::value::Value;

enum Frame {
    Fetch,
    Entity,
    Leaf,
    Filter {
        operator: LogicalOperator,
        children: Vec<Filter>,
    },
    Condition(ConditionExpression),
    Value(String),
    Link(LinkEntity),
}

struct Parser {
    query: QueryExpression,
    stack: Vec<Frame>,
    next_alias: usize,
}

/// Parses a FetchXML document
pub fn parse(xml: &str) -> QueryResult<QueryExpression> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parser = Parser {
        query: QueryExpression::default(),
        stack: Vec::new(),
        next_alias: 1,
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => parser.open(&e)?,
            Ok(Event::Empty(e)) => {
                parser.open(&e)?;
                parser.close()?;
            }
            Ok(Event::End(_)) => parser.close()?,
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| QueryError::malformed_fetch_xml(e.to_string()))?;
                parser.text(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(QueryError::malformed_fetch_xml(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if !parser.stack.is_empty() {
        return Err(QueryError::malformed_fetch_xml("unexpected end of document"));
    }
    Ok(parser.query)
}

struct Attributes(Vec<(String, String)>);

impl Attributes {
    fn read(e: &BytesStart<'_>) -> QueryResult<Self> {
        let mut pairs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| QueryError::malformed_fetch_xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| QueryError::malformed_fetch_xml(e.to_string()))?
                .into_owned();
            pairs.push((key, value));
        }
        Ok(Self(pairs))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn require(&self, element: &str, key: &str) -> QueryResult<&str> {
        self.get(key).ok_or_else(|| {
            QueryError::malformed_fetch_xml(format!("<{}> is missing the '{}' attribute", element, key))
        })
    }

    fn number(&self, key: &str) -> QueryResult<Option<usize>> {
        self.get(key)
            .map(|v| {
                v.trim().parse().map_err(|_| {
                    QueryError::malformed_fetch_xml(format!("'{}' is not a number: {}", key, v))
                })
            })
            .transpose()
    }

    fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true") | Some("1"))
    }
}

impl Parser {
    fn open(&mut self, e: &BytesStart<'_>) -> QueryResult<()> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let attrs = Attributes::read(e)?;

        let frame = match name.as_str() {
            "fetch" => {
                if !self.stack.is_empty() {
                    return Err(QueryError::malformed_fetch_xml("<fetch> must be the root element"));
                }
                let page_info = &mut self.query.page_info;
                page_info.return_total_count = attrs.flag("returntotalrecordcount");
                page_info.count = attrs.number("count")?;
                page_info.page_number = attrs.number("page")?;
                if let Some(top) = attrs.number("top")? {
                    page_info.count = Some(top);
                    page_info.page_number = Some(1);
                }
                Frame::Fetch
            }
            "entity" => {
                if !matches!(self.stack.last(), Some(Frame::Fetch)) {
                    return Err(QueryError::malformed_fetch_xml("<entity> must be a child of <fetch>"));
                }
                self.query.entity_name = Some(attrs.require("entity", "name")?.to_string());
                self.query.columns = ColumnSet::none();
                Frame::Entity
            }
            "attribute" => {
                let attribute = attrs.require("attribute", "name")?.to_string();
                self.columns_mut("attribute")?.add(attribute);
                Frame::Leaf
            }
            "all-attributes" => {
                *self.columns_mut("all-attributes")? = ColumnSet::All;
                Frame::Leaf
            }
            "order" => {
                let attribute = attrs.require("order", "attribute")?;
                let descending = attrs.flag("descending");
                let key = match self.stack.last() {
                    Some(Frame::Entity) => attribute.to_string(),
                    Some(Frame::Link(link)) => format!("{}.{}", link.effective_alias(), attribute),
                    _ => return Err(QueryError::malformed_fetch_xml("misplaced <order>")),
                };
                self.query.orders.push(if descending {
                    OrderExpression::desc(key)
                } else {
                    OrderExpression::asc(key)
                });
                Frame::Leaf
            }
            "filter" => {
                let operator = match attrs.get("type").unwrap_or("and") {
                    "and" => LogicalOperator::And,
                    "or" => LogicalOperator::Or,
                    other => {
                        return Err(QueryError::malformed_fetch_xml(format!("unknown filter type '{}'", other)))
                    }
                };
                Frame::Filter {
                    operator,
                    children: Vec::new(),
                }
            }
            "condition" => {
                let attribute = attrs.require("condition", "attribute")?;
                let code = attrs.require("condition", "operator")?;
                let operator = ConditionOperator::from_code(code).ok_or_else(|| {
                    QueryError::malformed_fetch_xml(format!("unknown condition operator '{}'", code))
                })?;
                let values = attrs
                    .get("value")
                    .map(|v| vec![Value::String(v.to_string())])
                    .unwrap_or_default();
                let mut condition = ConditionExpression::new(attribute, operator, values);
                condition.entity_name = attrs.get("entityname").map(str::to_string);
                Frame::Condition(condition)
            }
            "value" => Frame::Value(String::new()),
            "link-entity" => {
                let to_entity = attrs.require("link-entity", "name")?;
                let linked_attribute = attrs.require("link-entity", "from")?;
                let parent_attribute = attrs.require("link-entity", "to")?;
                let mut link = LinkEntity::new(parent_attribute, to_entity, linked_attribute)
                    .with_columns(ColumnSet::none());
                link.join = match attrs.get("link-type").unwrap_or("inner") {
                    "inner" => JoinOperator::Inner,
                    "outer" => JoinOperator::LeftOuter,
                    other => {
                        return Err(QueryError::malformed_fetch_xml(format!("unknown link-type '{}'", other)))
                    }
                };
                link.alias = Some(match attrs.get("alias") {
                    Some(alias) => alias.to_string(),
                    None => generated_alias(to_entity, &mut self.next_alias),
                });
                Frame::Link(link)
            }
            other => {
                return Err(QueryError::malformed_fetch_xml(format!("unsupported element <{}>", other)))
            }
        };

        self.stack.push(frame);
        Ok(())
    }

    fn columns_mut(&mut self, element: &str) -> QueryResult<&mut ColumnSet> {
        match self.stack.last_mut() {
            Some(Frame::Entity) => Ok(&mut self.query.columns),
            Some(Frame::Link(link)) => Ok(&mut link.columns),
            _ => Err(QueryError::malformed_fetch_xml(format!("misplaced <{}>", element))),
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| QueryError::malformed_fetch_xml("unbalanced closing tag"))?;

        match frame {
            Frame::Filter { operator, children } => {
                let filter = Filter::group(operator, children);
                match self.stack.last_mut() {
                    Some(Frame::Entity) => {
                        let criteria = std::mem::take(&mut self.query.criteria);
                        self.query.criteria = criteria.and(filter);
                    }
                    Some(Frame::Link(link)) => {
                        let criteria = std::mem::take(&mut link.criteria);
                        link.criteria = criteria.and(filter);
                    }
                    Some(Frame::Filter { children, .. }) => children.push(filter),
                    _ => return Err(QueryError::malformed_fetch_xml("misplaced <filter>")),
                }
            }
            Frame::Condition(condition) => match self.stack.last_mut() {
                Some(Frame::Filter { children, .. }) => children.push(Filter::Condition(condition)),
                _ => return Err(QueryError::malformed_fetch_xml("<condition> must be inside <filter>")),
            },
            Frame::Value(text) => match self.stack.last_mut() {
                Some(Frame::Condition(condition)) => condition.values.push(Value::String(text)),
                _ => return Err(QueryError::malformed_fetch_xml("<value> must be inside <condition>")),
            },
            Frame::Link(link) => match self.stack.last_mut() {
                Some(Frame::Entity) => self.query.links.push(link),
                Some(Frame::Link(parent)) => parent.links.push(link),
                _ => return Err(QueryError::malformed_fetch_xml("misplaced <link-entity>")),
            },
            Frame::Fetch | Frame::Entity | Frame::Leaf => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(Frame::Value(buffer)) = self.stack.last_mut() {
            buffer.push_str(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_query() {
        let xml = r#"
            <fetch count="10" page="2" returntotalrecordcount="true">
              <entity name="account">
                <attribute name="name" />
                <attribute name="revenue" />
                <order attribute="name" descending="true" />
                <filter type="and">
                  <condition attribute="statecode" operator="eq" value="0" />
                  <filter type="or">
                    <condition attribute="industrycode" operator="in">
                      <value>1</value>
                      <value>2</value>
                    </condition>
                    <condition attribute="revenue" operator="null" />
                  </filter>
                </filter>
                <link-entity name="contact" from="contactid" to="primarycontactid" alias="pc" link-type="outer">
                  <attribute name="fullname" />
                  <filter>
                    <condition attribute="lastname" operator="like" value="Sm%" />
                  </filter>
                </link-entity>
              </entity>
            </fetch>"#;

        let query = parse(xml).unwrap();
        assert_eq!(query.entity_name.as_deref(), Some("account"));
        assert_eq!(query.columns, ColumnSet::columns(["name", "revenue"]));
        assert_eq!(query.orders, vec![OrderExpression::desc("name")]);
        assert!(query.page_info.return_total_count);
        assert_eq!(query.page_info.count, Some(10));
        assert_eq!(query.page_info.page_number, Some(2));

        let conditions = query.criteria.conditions();
        assert_eq!(conditions.len(), 3);
        assert_eq!(conditions[1].values, vec![Value::from("1"), Value::from("2")]);

        let link = &query.links[0];
        assert_eq!(link.from_attribute, "primarycontactid");
        assert_eq!(link.to_attribute, "contactid");
        assert_eq!(link.join, JoinOperator::LeftOuter);
        assert_eq!(link.alias.as_deref(), Some("pc"));
        assert_eq!(link.columns, ColumnSet::columns(["fullname"]));
        assert_eq!(link.criteria.conditions()[0].operator, ConditionOperator::Like);
    }

    #[test]
    fn test_order_inside_unaliased_link() {
        let xml = r#"
            <fetch>
              <entity name="account">
                <link-entity name="contact" from="contactid" to="primarycontactid">
                  <link-entity name="account" from="accountid" to="parentcustomerid" />
                </link-entity>
                <link-entity name="contact" from="contactid" to="primarycontactid">
                  <order attribute="fullname" descending="true" />
                </link-entity>
              </entity>
            </fetch>"#;

        let query = parse(xml).unwrap();
        assert_eq!(query.links[0].alias.as_deref(), Some("contact1"));
        assert_eq!(query.links[0].links[0].alias.as_deref(), Some("account2"));
        assert_eq!(query.links[1].alias.as_deref(), Some("contact3"));
        assert_eq!(query.orders, vec![OrderExpression::desc("contact3.fullname")]);
    }

    #[test]
    fn test_all_attributes_and_top() {
        let query = parse(r#"<fetch top="5"><entity name="contact"><all-attributes /></entity></fetch>"#).unwrap();
        assert_eq!(query.columns, ColumnSet::All);
        assert_eq!(query.page_info.count, Some(5));
        assert_eq!(query.page_info.page_number, Some(1));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let xml = r#"<fetch><entity name="contact"><filter><condition attribute="a" operator="sounds-like" value="x"/></filter></entity></fetch>"#;
        let err = parse(xml).unwrap_err();
        assert!(err.message().contains("sounds-like"));
    }

    #[test]
    fn test_unbalanced_document_rejected() {
        assert!(parse("<fetch><entity name=\"contact\">").is_err());
        assert!(parse("<fetch><bogus/></fetch>").is_err());
    }

    #[test]
    fn test_missing_entity_parses_without_name() {
        let query = parse("<fetch></fetch>").unwrap();
        assert!(query.entity_name.is_none());
    }
}
