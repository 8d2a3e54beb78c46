//! Query expressions and their flat key/value encoding.
//!
//! An expression is a tree of field conditions combined by AND/OR groups.
//! The encoder flattens it depth-first into query-string pairs, prefixing
//! every key produced inside an explicit group with `[or{n}].` or `[and{n}].`
//! where `n` counts groups of that combinator within the same parent.
//!
//! ```
//! use stow_engine::query::{field, Expr, QueryExpression};
//!
//! let expr = QueryExpression::from(vec![
//!     field("age").gte(2),
//!     Expr::or([field("dog").eq("herc"), field("cat").eq("fluffy")]),
//! ]);
//! let pairs = expr.encode();
//! assert!(pairs.contains(&("age[gte]".to_string(), "2".to_string())));
//! assert!(pairs.contains(&("[or1].dog".to_string(), "herc".to_string())));
//! ```

use crate::{selection::Selection, value::GeoPoint, value::Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operator of a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    In,
    NotIn,
    Null,
    Near,
    Within,
}

impl Operator {
    /// Key suffix appended to the field name.
    pub fn suffix(self) -> &'static str {
        match self {
            Operator::Eq => "",
            Operator::Ne => "[ne]",
            Operator::Lt => "[lt]",
            Operator::Gt => "[gt]",
            Operator::Lte => "[lte]",
            Operator::Gte => "[gte]",
            Operator::In => "[in]",
            Operator::NotIn => "[nin]",
            Operator::Null => "[null]",
            Operator::Near => "[near]",
            Operator::Within => "[within]",
        }
    }
}

/// A single `field <op> value` condition with its operand already rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: String,
}

impl Condition {
    pub fn key(&self) -> String {
        format!("{}{}", self.field, self.op.suffix())
    }
}

/// Group combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Combinator {
    And,
    Or,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::And => write!(f, "and"),
            Combinator::Or => write!(f, "or"),
        }
    }
}

/// Node of a query expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Expr {
    Condition(Condition),
    Group {
        combinator: Combinator,
        children: Vec<Expr>,
    },
    /// Children encoded in the enclosing scope, without a key prefix.
    Inline(Vec<Expr>),
}

impl Expr {
    /// Explicit AND group.
    pub fn and(children: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Group {
            combinator: Combinator::And,
            children: children.into_iter().collect(),
        }
    }

    /// Explicit OR group.
    pub fn or(children: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Group {
            combinator: Combinator::Or,
            children: children.into_iter().collect(),
        }
    }

    fn condition(field: String, op: Operator, value: String) -> Self {
        Expr::Condition(Condition { field, op, value })
    }
}

/// Start a condition on `name`.
pub fn field(name: impl Into<String>) -> FieldRef {
    FieldRef { name: name.into() }
}

/// A field awaiting an operator.
#[derive(Debug, Clone)]
pub struct FieldRef {
    name: String,
}

impl FieldRef {
    fn scalar(self, op: Operator, value: impl Into<Scalar>) -> Expr {
        Expr::condition(self.name, op, value.into().to_query_literal())
    }

    fn list<I, V>(self, op: Operator, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let joined = values
            .into_iter()
            .map(|v| v.into().to_query_literal())
            .collect::<Vec<_>>()
            .join(",");
        Expr::condition(self.name, op, joined)
    }

    pub fn eq(self, value: impl Into<Scalar>) -> Expr {
        self.scalar(Operator::Eq, value)
    }

    pub fn ne(self, value: impl Into<Scalar>) -> Expr {
        self.scalar(Operator::Ne, value)
    }

    pub fn lt(self, value: impl Into<Scalar>) -> Expr {
        self.scalar(Operator::Lt, value)
    }

    pub fn gt(self, value: impl Into<Scalar>) -> Expr {
        self.scalar(Operator::Gt, value)
    }

    pub fn lte(self, value: impl Into<Scalar>) -> Expr {
        self.scalar(Operator::Lte, value)
    }

    pub fn gte(self, value: impl Into<Scalar>) -> Expr {
        self.scalar(Operator::Gte, value)
    }

    pub fn is_in<I, V>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.list(Operator::In, values)
    }

    pub fn not_in<I, V>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.list(Operator::NotIn, values)
    }

    pub fn is_null(self) -> Expr {
        Expr::condition(self.name, Operator::Null, "true".to_string())
    }

    pub fn is_not_null(self) -> Expr {
        Expr::condition(self.name, Operator::Null, "false".to_string())
    }

    /// Inclusive range; encodes as both `[gte]` and `[lte]` on the field.
    pub fn in_range(self, start: impl Into<Scalar>, end: impl Into<Scalar>) -> Expr {
        Expr::Inline(vec![field(self.name.clone()).gte(start), self.lte(end)])
    }

    pub fn near(self, point: GeoPoint) -> Expr {
        Expr::condition(self.name, Operator::Near, point.to_query_literal())
    }

    pub fn near_within(self, point: GeoPoint, max_distance: f64) -> Expr {
        let value = format!("{},{}", point.to_query_literal(), max_distance);
        Expr::condition(self.name, Operator::Near, value)
    }

    pub fn within_radius(self, center: GeoPoint, radius: f64) -> Expr {
        let value = format!("{},{}", center.to_query_literal(), radius);
        Expr::condition(self.name, Operator::Within, value)
    }

    pub fn within_box(self, south_west: GeoPoint, north_east: GeoPoint) -> Expr {
        let value = format!(
            "{},{}",
            south_west.to_query_literal(),
            north_east.to_query_literal()
        );
        Expr::condition(self.name, Operator::Within, value)
    }
}

/// Root of a query: its children are implicitly ANDed and carry no prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryExpression {
    children: Vec<Expr>,
}

impl QueryExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level condition or group.
    pub fn and(mut self, expr: Expr) -> Self {
        self.children.push(expr);
        self
    }

    pub fn push(&mut self, expr: Expr) {
        self.children.push(expr);
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> &[Expr] {
        &self.children
    }

    /// Flatten into `(key, value)` pairs.
    ///
    /// Only the multiset of pairs is meaningful; callers must not rely on
    /// the order in which sibling subtrees appear.
    pub fn encode(&self) -> Vec<(String, String)> {
        let mut encoder = Encoder::default();
        encoder.walk(&self.children);
        encoder.out
    }
}

impl From<Vec<Expr>> for QueryExpression {
    fn from(children: Vec<Expr>) -> Self {
        Self { children }
    }
}

impl From<Expr> for QueryExpression {
    fn from(expr: Expr) -> Self {
        Self {
            children: vec![expr],
        }
    }
}

#[derive(Default)]
struct Encoder {
    prefix: Vec<String>,
    out: Vec<(String, String)>,
}

/// Per-scope group counters.
#[derive(Default)]
struct Counts {
    and: usize,
    or: usize,
}

impl Encoder {
    fn walk(&mut self, children: &[Expr]) {
        let mut counts = Counts::default();
        self.walk_scope(children, &mut counts);
    }

    fn walk_scope(&mut self, children: &[Expr], counts: &mut Counts) {
        for child in children {
            match child {
                Expr::Condition(condition) => {
                    let key = format!("{}{}", self.prefix.concat(), condition.key());
                    self.out.push((key, condition.value.clone()));
                }
                Expr::Group {
                    combinator,
                    children,
                } => {
                    let n = match combinator {
                        Combinator::And => {
                            counts.and += 1;
                            counts.and
                        }
                        Combinator::Or => {
                            counts.or += 1;
                            counts.or
                        }
                    };
                    self.prefix.push(format!("[{}{}].", combinator, n));
                    self.walk(children);
                    self.prefix.pop();
                }
                Expr::Inline(children) => self.walk_scope(children, counts),
            }
        }
    }
}

/// Sort direction for `order_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "asc"),
            Direction::Desc => write!(f, "desc"),
        }
    }
}

pub const RANGE_HEADER: &str = "Range";
pub const ORDER_BY_HEADER: &str = "X-Stow-OrderBy";
pub const SELECT_HEADER: &str = "X-Stow-Select";
pub const EXPAND_PARAM: &str = "_expand";

/// A read or bulk-delete request against one model type.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    type_name: String,
    filter: QueryExpression,
    order: Vec<(String, Direction)>,
    range: Option<(u64, u64)>,
    selection: Option<Selection>,
    depth: u32,
}

impl Query {
    /// Query instances of a registered model type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            filter: QueryExpression::new(),
            order: Vec::new(),
            range: None,
            selection: None,
            depth: 0,
        }
    }

    /// AND another condition or group onto the filter.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter.push(expr);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push((field.into().to_lowercase(), direction));
        self
    }

    /// Inclusive paging window.
    pub fn range(mut self, start: u64, end: u64) -> Self {
        self.range = Some((start, end));
        self
    }

    pub fn select(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn expand(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn expression(&self) -> &QueryExpression {
        &self.filter
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub(crate) fn set_depth(&mut self, depth: u32) {
        self.depth = depth;
    }

    /// Encoded conditions plus `_expand` when relations are expanded.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = self.filter.encode();
        if self.depth > 0 {
            params.push((EXPAND_PARAM.to_string(), self.depth.to_string()));
        }
        params
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if let Some((start, end)) = self.range {
            headers.push((RANGE_HEADER.to_string(), format!("objects={}-{}", start, end)));
        }
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(field, dir)| format!("{}:{}", field, dir))
                .collect::<Vec<_>>()
                .join(",");
            headers.push((ORDER_BY_HEADER.to_string(), order));
        }
        if let Some(paths) = self.selection.as_ref().and_then(Selection::paths) {
            headers.push((SELECT_HEADER.to_string(), paths.collect::<Vec<_>>().join(",")));
        }
        headers
    }
}
