use std::str::FromStr;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// Comparison operators understood by the realtime service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    Is,
    In,
    Contains,
}

/// Row-level test built from an operator and its operand. Receives the row's column value.
pub type Predicate = Box<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

impl FilterOp {
    pub const ALL: [FilterOp; 11] = [
        FilterOp::Eq, FilterOp::Neq, FilterOp::Gt, FilterOp::Gte, FilterOp::Lt, FilterOp::Lte,
        FilterOp::Like, FilterOp::Ilike, FilterOp::Is, FilterOp::In, FilterOp::Contains,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Like => "like",
            FilterOp::Ilike => "ilike",
            FilterOp::Is => "is",
            FilterOp::In => "in",
            FilterOp::Contains => "contains",
        }
    }

    /// Operand as it appears in a REST query string, e.g. `eq.5` or `in.(a,b)`.
    pub fn encode(&self, operand: &Value) -> String {
        match self {
            FilterOp::In => {
                let items: Vec<String> = match operand {
                    Value::Array(a) => a.iter().map(operand_text).collect(),
                    other => vec![operand_text(other)],
                };
                format!("in.({})", items.join(","))
            }
            FilterOp::Contains => match operand {
                Value::Array(a) => format!("cs.{{{}}}", a.iter().map(operand_text).collect::<Vec<_>>().join(",")),
                other => format!("cs.{}", other),
            },
            FilterOp::Like | FilterOp::Ilike => format!("{}.{}", self.as_str(), operand_text(operand).replace('%', "*")),
            _ => format!("{}.{}", self.as_str(), operand_text(operand)),
        }
    }

    /// In-process evaluation of this operator against `operand`.
    pub fn predicate(self, operand: Value) -> Predicate {
        match self {
            FilterOp::Eq => Box::new(move |v| v.is_some_and(|v| loosely_equal(v, &operand))),
            FilterOp::Neq => Box::new(move |v| !v.is_some_and(|v| loosely_equal(v, &operand))),
            FilterOp::Gt => Box::new(move |v| ordering(v, &operand).is_some_and(|o| o.is_gt())),
            FilterOp::Gte => Box::new(move |v| ordering(v, &operand).is_some_and(|o| o.is_ge())),
            FilterOp::Lt => Box::new(move |v| ordering(v, &operand).is_some_and(|o| o.is_lt())),
            FilterOp::Lte => Box::new(move |v| ordering(v, &operand).is_some_and(|o| o.is_le())),
            FilterOp::Like => like_predicate(&operand, false),
            FilterOp::Ilike => like_predicate(&operand, true),
            FilterOp::Is => Box::new(move |v| match (&operand, v) {
                (Value::Null, None) | (Value::Null, Some(Value::Null)) => true,
                (expected, Some(actual)) => expected == actual,
                _ => false,
            }),
            FilterOp::In => {
                let set = match operand { Value::Array(a) => a, other => vec![other] };
                Box::new(move |v| v.is_some_and(|v| set.iter().any(|s| loosely_equal(v, s))))
            }
            FilterOp::Contains => Box::new(move |v| v.is_some_and(|v| contains(v, &operand))),
        }
    }
}

impl FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(FilterOp::Eq),
            "neq" => Ok(FilterOp::Neq),
            "gt" => Ok(FilterOp::Gt),
            "gte" => Ok(FilterOp::Gte),
            "lt" => Ok(FilterOp::Lt),
            "lte" => Ok(FilterOp::Lte),
            "like" => Ok(FilterOp::Like),
            "ilike" => Ok(FilterOp::Ilike),
            "is" => Ok(FilterOp::Is),
            "in" => Ok(FilterOp::In),
            "contains" | "cs" => Ok(FilterOp::Contains),
            other => Err(format!("unknown filter operator '{}'", other)),
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new<S: Into<String>>(column: S, op: FilterOp, value: Value) -> Self {
        Self { column: column.into(), op, value }
    }

    pub fn eq<S: Into<String>>(column: S, value: Value) -> Self { Self::new(column, FilterOp::Eq, value) }

    /// Parse `(column, op, value)` triples, skipping entries whose operator is unknown.
    pub fn from_raw_lenient<I, C, O>(raw: I) -> Vec<Filter>
    where
        I: IntoIterator<Item = (C, O, Value)>,
        C: Into<String>,
        O: AsRef<str>,
    {
        raw.into_iter()
            .filter_map(|(column, op, value)| match op.as_ref().parse::<FilterOp>() {
                Ok(op) => Some(Filter::new(column, op, value)),
                Err(e) => {
                    warn!(target: "sexyguard::realtime", "{}; filter ignored", e);
                    None
                }
            })
            .collect()
    }

    pub fn to_query_pair(&self) -> (String, String) { (self.column.clone(), self.op.encode(&self.value)) }

    pub fn matches(&self, row: &Value) -> bool { (self.op.predicate(self.value.clone()))(row.get(&self.column)) }
}

/// Filters with their predicates built once, for evaluating many rows.
pub struct RowMatcher {
    checks: Vec<(String, Predicate)>,
}

impl RowMatcher {
    pub fn new(filters: &[Filter]) -> Self {
        let checks = filters.iter().map(|f| (f.column.clone(), f.op.predicate(f.value.clone()))).collect();
        Self { checks }
    }

    pub fn matches(&self, row: &Value) -> bool { self.checks.iter().all(|(column, check)| check(row.get(column))) }
}

pub fn matches_all(filters: &[Filter], row: &Value) -> bool { RowMatcher::new(filters).matches(row) }

fn operand_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn ordering(v: Option<&Value>, operand: &Value) -> Option<std::cmp::Ordering> {
    let v = v?;
    if let (Some(x), Some(y)) = (v.as_f64(), operand.as_f64()) { return x.partial_cmp(&y); }
    match (v.as_str(), operand.as_str()) {
        (Some(x), Some(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like_predicate(operand: &Value, case_insensitive: bool) -> Predicate {
    let pattern = operand_text(operand);
    let mut re = String::from(if case_insensitive { "(?is)^" } else { "(?s)^" });
    for ch in pattern.chars() {
        match ch {
            '%' | '*' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    match Regex::new(&re) {
        Ok(rx) => Box::new(move |v| v.and_then(|v| v.as_str()).is_some_and(|s| rx.is_match(s))),
        Err(_) => Box::new(|_| false),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Array(h), Value::Array(n)) => n.iter().all(|x| h.contains(x)),
        (Value::Array(h), x) => h.contains(x),
        (Value::Object(h), Value::Object(n)) => n.iter().all(|(k, x)| h.get(k) == Some(x)),
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        _ => false,
    }
}
