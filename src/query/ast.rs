//! Canonical query structures
//!
//! Every accepted input form is normalized into a `QueryExpression`
//! before evaluation.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Column projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnSet {
    /// Every attribute
    All,
    /// Only the named attributes
    Columns(Vec<String>),
}

impl ColumnSet {
    pub fn columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ColumnSet::Columns(names.into_iter().map(Into::into).collect())
    }

    pub fn none() -> Self {
        ColumnSet::Columns(Vec::new())
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            ColumnSet::All => true,
            ColumnSet::Columns(names) => names.iter().any(|n| n == name),
        }
    }

    /// Adds a column; no effect on `All`
    pub fn add(&mut self, name: impl Into<String>) {
        if let ColumnSet::Columns(names) = self {
            let name = name.into();
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
}

impl Default for ColumnSet {
    fn default() -> Self {
        ColumnSet::All
    }
}

/// Filter group operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
}

/// Condition operators, keyed by their stable string code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    Like,
    NotLike,
    BeginsWith,
    EndsWith,
    Between,
    NotBetween,
    In,
    NotIn,
    Null,
    NotNull,
    On,
    OnOrAfter,
    OnOrBefore,
    Today,
    Yesterday,
    Tomorrow,
    ThisWeek,
    LastWeek,
    NextWeek,
    ThisMonth,
    LastMonth,
    NextMonth,
    ThisYear,
    LastYear,
    NextYear,
    LastSevenDays,
    NextSevenDays,
    LastXHours,
    NextXHours,
    LastXDays,
    NextXDays,
    LastXWeeks,
    NextXWeeks,
    LastXMonths,
    NextXMonths,
    LastXYears,
    NextXYears,
    OlderThanXMonths,
    ThisFiscalPeriod,
    LastFiscalPeriod,
    NextFiscalPeriod,
    ThisFiscalYear,
    LastFiscalYear,
    NextFiscalYear,
    LastXFiscalPeriods,
    NextXFiscalPeriods,
    LastXFiscalYears,
    NextXFiscalYears,
    InFiscalYear,
    InFiscalPeriod,
    InFiscalPeriodAndYear,
    InOrBeforeFiscalPeriodAndYear,
    InOrAfterFiscalPeriodAndYear,
    EqualUserId,
    NotEqualUserId,
    EqualBusinessId,
    NotEqualBusinessId,
}

/// Number of condition values an operator takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Zero,
    One,
    Two,
    AtLeastOne,
}

const OPERATOR_CODES: &[(ConditionOperator, &str)] = &[
    (ConditionOperator::Equal, "eq"),
    (ConditionOperator::NotEqual, "ne"),
    (ConditionOperator::GreaterThan, "gt"),
    (ConditionOperator::GreaterEqual, "ge"),
    (ConditionOperator::LessThan, "lt"),
    (ConditionOperator::LessEqual, "le"),
    (ConditionOperator::Like, "like"),
    (ConditionOperator::NotLike, "not-like"),
    (ConditionOperator::BeginsWith, "begins-with"),
    (ConditionOperator::EndsWith, "ends-with"),
    (ConditionOperator::Between, "between"),
    (ConditionOperator::NotBetween, "not-between"),
    (ConditionOperator::In, "in"),
    (ConditionOperator::NotIn, "not-in"),
    (ConditionOperator::Null, "null"),
    (ConditionOperator::NotNull, "not-null"),
    (ConditionOperator::On, "on"),
    (ConditionOperator::OnOrAfter, "on-or-after"),
    (ConditionOperator::OnOrBefore, "on-or-before"),
    (ConditionOperator::Today, "today"),
    (ConditionOperator::Yesterday, "yesterday"),
    (ConditionOperator::Tomorrow, "tomorrow"),
    (ConditionOperator::ThisWeek, "this-week"),
    (ConditionOperator::LastWeek, "last-week"),
    (ConditionOperator::NextWeek, "next-week"),
    (ConditionOperator::ThisMonth, "this-month"),
    (ConditionOperator::LastMonth, "last-month"),
    (ConditionOperator::NextMonth, "next-month"),
    (ConditionOperator::ThisYear, "this-year"),
    (ConditionOperator::LastYear, "last-year"),
    (ConditionOperator::NextYear, "next-year"),
    (ConditionOperator::LastSevenDays, "last-seven-days"),
    (ConditionOperator::NextSevenDays, "next-seven-days"),
    (ConditionOperator::LastXHours, "last-x-hours"),
    (ConditionOperator::NextXHours, "next-x-hours"),
    (ConditionOperator::LastXDays, "last-x-days"),
    (ConditionOperator::NextXDays, "next-x-days"),
    (ConditionOperator::LastXWeeks, "last-x-weeks"),
    (ConditionOperator::NextXWeeks, "next-x-weeks"),
    (ConditionOperator::LastXMonths, "last-x-months"),
    (ConditionOperator::NextXMonths, "next-x-months"),
    (ConditionOperator::LastXYears, "last-x-years"),
    (ConditionOperator::NextXYears, "next-x-years"),
    (ConditionOperator::OlderThanXMonths, "olderthan-x-months"),
    (ConditionOperator::ThisFiscalPeriod, "this-fiscal-period"),
    (ConditionOperator::LastFiscalPeriod, "last-fiscal-period"),
    (ConditionOperator::NextFiscalPeriod, "next-fiscal-period"),
    (ConditionOperator::ThisFiscalYear, "this-fiscal-year"),
    (ConditionOperator::LastFiscalYear, "last-fiscal-year"),
    (ConditionOperator::NextFiscalYear, "next-fiscal-year"),
    (ConditionOperator::LastXFiscalPeriods, "last-x-fiscal-periods"),
    (ConditionOperator::NextXFiscalPeriods, "next-x-fiscal-periods"),
    (ConditionOperator::LastXFiscalYears, "last-x-fiscal-years"),
    (ConditionOperator::NextXFiscalYears, "next-x-fiscal-years"),
    (ConditionOperator::InFiscalYear, "in-fiscal-year"),
    (ConditionOperator::InFiscalPeriod, "in-fiscal-period"),
    (ConditionOperator::InFiscalPeriodAndYear, "in-fiscal-period-and-year"),
    (ConditionOperator::InOrBeforeFiscalPeriodAndYear, "in-or-before-fiscal-period-and-year"),
    (ConditionOperator::InOrAfterFiscalPeriodAndYear, "in-or-after-fiscal-period-and-year"),
    (ConditionOperator::EqualUserId, "eq-userid"),
    (ConditionOperator::NotEqualUserId, "ne-userid"),
    (ConditionOperator::EqualBusinessId, "eq-businessid"),
    (ConditionOperator::NotEqualBusinessId, "ne-businessid"),
];

impl ConditionOperator {
    /// Looks up an operator by code. `neq` is accepted for `ne`.
    pub fn from_code(code: &str) -> Option<Self> {
        if code == "neq" {
            return Some(ConditionOperator::NotEqual);
        }
        OPERATOR_CODES
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(op, _)| *op)
    }

    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        OPERATOR_CODES
            .iter()
            .find(|(op, _)| op == self)
            .map(|(_, c)| *c)
            .unwrap_or("unknown")
    }

    /// Every operator in code-table order
    pub fn all() -> impl Iterator<Item = ConditionOperator> {
        OPERATOR_CODES.iter().map(|(op, _)| *op)
    }

    pub fn arity(&self) -> Arity {
        use ConditionOperator::*;
        match self {
            Null | NotNull | Today | Yesterday | Tomorrow | ThisWeek | LastWeek | NextWeek
            | ThisMonth | LastMonth | NextMonth | ThisYear | LastYear | NextYear | LastSevenDays
            | NextSevenDays | ThisFiscalPeriod | LastFiscalPeriod | NextFiscalPeriod
            | ThisFiscalYear | LastFiscalYear | NextFiscalYear | EqualUserId | NotEqualUserId
            | EqualBusinessId | NotEqualBusinessId => Arity::Zero,
            Between | NotBetween | InFiscalPeriodAndYear | InOrBeforeFiscalPeriodAndYear
            | InOrAfterFiscalPeriodAndYear => Arity::Two,
            In | NotIn => Arity::AtLeastOne,
            _ => Arity::One,
        }
    }

    /// Whether `count` values suit this operator
    pub fn accepts(&self, count: usize) -> bool {
        match self.arity() {
            Arity::Zero => count == 0,
            Arity::One => count == 1,
            Arity::Two => count == 2,
            Arity::AtLeastOne => count >= 1,
        }
    }
}

/// Leaf condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionExpression {
    /// Link alias the attribute belongs to; `None` for the row itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    pub attribute: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub values: Vec<Value>,
}

impl ConditionExpression {
    pub fn new(attribute: impl Into<String>, operator: ConditionOperator, values: Vec<Value>) -> Self {
        Self {
            entity_name: None,
            attribute: attribute.into(),
            operator,
            values,
        }
    }

    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(attribute, ConditionOperator::Equal, vec![value.into()])
    }

    pub fn unary(attribute: impl Into<String>, operator: ConditionOperator) -> Self {
        Self::new(attribute, operator, Vec::new())
    }

    /// Qualifies the condition with a link alias
    pub fn on_entity(mut self, alias: impl Into<String>) -> Self {
        self.entity_name = Some(alias.into());
        self
    }

    /// Key the attribute is read under in a joined row
    pub fn key(&self) -> String {
        match &self.entity_name {
            Some(alias) => format!("{}.{}", alias, self.attribute),
            None => self.attribute.clone(),
        }
    }
}

/// Filter tree. An empty group matches every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Condition(ConditionExpression),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Matches every row
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn group(operator: LogicalOperator, children: Vec<Filter>) -> Self {
        match operator {
            LogicalOperator::And => Filter::And(children),
            LogicalOperator::Or => Filter::Or(children),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Filter::Condition(_) => false,
            Filter::And(children) | Filter::Or(children) => children.iter().all(Filter::is_empty),
        }
    }

    /// Conjunction of `self` and `other`, dropping empty sides
    pub fn and(self, other: Filter) -> Filter {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => other,
            (_, true) => self,
            _ => Filter::And(vec![self, other]),
        }
    }

    pub fn conditions(&self) -> Vec<&ConditionExpression> {
        match self {
            Filter::Condition(c) => vec![c],
            Filter::And(children) | Filter::Or(children) => {
                children.iter().flat_map(Filter::conditions).collect()
            }
        }
    }

    pub fn conditions_mut(&mut self) -> Vec<&mut ConditionExpression> {
        match self {
            Filter::Condition(c) => vec![c],
            Filter::And(children) | Filter::Or(children) => {
                children.iter_mut().flat_map(Filter::conditions_mut).collect()
            }
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::all()
    }
}

impl From<ConditionExpression> for Filter {
    fn from(c: ConditionExpression) -> Self {
        Filter::Condition(c)
    }
}

/// Join kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinOperator {
    Inner,
    LeftOuter,
}

/// Join specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEntity {
    /// Attribute of the parent row
    pub from_attribute: String,
    pub to_entity: String,
    /// Attribute of the linked row
    pub to_attribute: String,
    pub join: JoinOperator,
    pub alias: Option<String>,
    /// Linked attributes copied into the row
    pub columns: ColumnSet,
    pub links: Vec<LinkEntity>,
    pub criteria: Filter,
}

impl LinkEntity {
    pub fn new(
        from_attribute: impl Into<String>,
        to_entity: impl Into<String>,
        to_attribute: impl Into<String>,
    ) -> Self {
        Self {
            from_attribute: from_attribute.into(),
            to_entity: to_entity.into(),
            to_attribute: to_attribute.into(),
            join: JoinOperator::Inner,
            alias: None,
            columns: ColumnSet::All,
            links: Vec::new(),
            criteria: Filter::all(),
        }
    }

    pub fn left_outer(mut self) -> Self {
        self.join = JoinOperator::LeftOuter;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_columns(mut self, columns: ColumnSet) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_link(mut self, link: LinkEntity) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_criteria(mut self, criteria: impl Into<Filter>) -> Self {
        self.criteria = criteria.into();
        self
    }

    /// Alias, or the target table name before aliases are assigned
    pub fn effective_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.to_entity)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

/// Sort key; the attribute may be alias-qualified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExpression {
    pub attribute: String,
    pub direction: OrderDirection,
}

impl OrderExpression {
    pub fn asc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            direction: OrderDirection::Ascending,
        }
    }

    pub fn desc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            direction: OrderDirection::Descending,
        }
    }
}

/// Paging and count flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub return_total_count: bool,
    /// Rows per page; `None` returns every row
    pub count: Option<usize>,
    /// 1-based page number
    pub page_number: Option<usize>,
}

/// Canonical query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryExpression {
    pub entity_name: Option<String>,
    pub columns: ColumnSet,
    pub criteria: Filter,
    pub links: Vec<LinkEntity>,
    pub orders: Vec<OrderExpression>,
    pub page_info: PageInfo,
}

impl QueryExpression {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: Some(entity_name.into()),
            ..Self::default()
        }
    }

    pub fn with_columns(mut self, columns: ColumnSet) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_criteria(mut self, criteria: impl Into<Filter>) -> Self {
        self.criteria = criteria.into();
        self
    }

    pub fn with_link(mut self, link: LinkEntity) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_order(mut self, order: OrderExpression) -> Self {
        self.orders.push(order);
        self
    }

    pub fn with_total_count(mut self) -> Self {
        self.page_info.return_total_count = true;
        self
    }

    pub fn with_page(mut self, count: usize, page_number: usize) -> Self {
        self.page_info.count = Some(count);
        self.page_info.page_number = Some(page_number);
        self
    }
}

/// Tabular attribute-value query: every listed attribute must equal its value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryByAttribute {
    pub entity_name: Option<String>,
    pub columns: ColumnSet,
    pub attributes: Vec<String>,
    pub values: Vec<Value>,
    pub orders: Vec<OrderExpression>,
    pub page_info: PageInfo,
}

impl QueryByAttribute {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: Some(entity_name.into()),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.push(attribute.into());
        self.values.push(value.into());
        self
    }

    pub fn with_columns(mut self, columns: ColumnSet) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_order(mut self, order: OrderExpression) -> Self {
        self.orders.push(order);
        self
    }
}

/// Accepted query forms
#[derive(Debug, Clone, PartialEq)]
pub enum QueryInput {
    Expression(QueryExpression),
    ByAttribute(QueryByAttribute),
    FetchXml(String),
}

impl From<QueryExpression> for QueryInput {
    fn from(q: QueryExpression) -> Self {
        QueryInput::Expression(q)
    }
}

impl From<QueryByAttribute> for QueryInput {
    fn from(q: QueryByAttribute) -> Self {
        QueryInput::ByAttribute(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_codes_round_trip() {
        for op in ConditionOperator::all() {
            assert_eq!(ConditionOperator::from_code(op.code()), Some(op));
        }
        assert_eq!(ConditionOperator::from_code("neq"), Some(ConditionOperator::NotEqual));
        assert_eq!(ConditionOperator::from_code("eq-userteams"), None);
        assert_eq!(ConditionOperator::all().count(), 63);
    }

    #[test]
    fn test_operator_arity() {
        assert!(ConditionOperator::Today.accepts(0));
        assert!(!ConditionOperator::Equal.accepts(0));
        assert!(ConditionOperator::In.accepts(3));
        assert!(ConditionOperator::InFiscalPeriodAndYear.accepts(2));
    }

    #[test]
    fn test_empty_filter_groups() {
        assert!(Filter::all().is_empty());
        assert!(Filter::Or(vec![Filter::all()]).is_empty());

        let cond: Filter = ConditionExpression::eq("name", "x").into();
        assert_eq!(Filter::all().and(cond.clone()), cond);
    }

    #[test]
    fn test_condition_key() {
        let cond = ConditionExpression::eq("fullname", "Jane").on_entity("contact1");
        assert_eq!(cond.key(), "contact1.fullname");
    }

    #[test]
    fn test_column_set_add() {
        let mut columns = ColumnSet::none();
        columns.add("name");
        columns.add("name");
        assert_eq!(columns, ColumnSet::columns(["name"]));

        let mut all = ColumnSet::All;
        all.add("name");
        assert_eq!(all, ColumnSet::All);
    }
}
