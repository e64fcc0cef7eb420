//! Client-side filtering and paging

use serde_json::{Map, Value};
use std::fmt;

/// Conjunction of `field == value` conditions
///
/// Conditions are matched against the serialized model, so they compare typed
/// values (`id == 1`), not raw cell text. A field the model does not have
/// never matches. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Filter that matches every record
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter with a single condition
    pub fn by(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and(field, value)
    }

    /// Add a condition
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Check a serialized record against every condition
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            record
                .get(field)
                .map(|actual| values_equal(actual, expected))
                .unwrap_or(false)
        })
    }
}

impl<K, V> FromIterator<(K, V)> for Filter
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            conditions: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return write!(f, "{{}}");
        }
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}={}", k, s),
                other => format!("{}={}", k, other),
            })
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Numbers compare by value so that `1` matches `1.0`
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => actual == expected,
    }
}

/// Filter plus paging for `get_all`
///
/// Paging applies after filtering: `start` skips matches, `limit` caps them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filter: Filter,
    start: usize,
    limit: Option<usize>,
}

impl Query {
    /// Query returning every record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the number of matches to skip
    pub fn skip(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    /// Set the maximum number of matches to return
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn get_filter(&self) -> &Filter {
        &self.filter
    }

    pub fn get_start(&self) -> usize {
        self.start
    }

    pub fn get_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Filter, then slice
    pub fn apply<T, I>(&self, items: I, record: impl Fn(&T) -> &Map<String, Value>) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
    {
        let matched = items
            .into_iter()
            .filter(|item| self.filter.matches(record(item)))
            .skip(self.start);
        match self.limit {
            Some(limit) => matched.take(limit).collect(),
            None => matched.collect(),
        }
    }
}

impl From<Filter> for Query {
    fn from(filter: Filter) -> Self {
        Query::new().filter(filter)
    }
}
