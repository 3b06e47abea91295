//! Field filters and ordering for collection queries.
//!
//! Queries are evaluated against the JSON body of each document. A document
//! lacking a filtered field never matches. Timestamps are stored as RFC 3339
//! strings and compared chronologically.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

use super::document_store::Document;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
    order_by: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn where_gt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gt(field.to_string(), value.into()));
        self
    }

    pub fn where_gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(field.to_string(), value.into()));
        self
    }

    pub fn where_lt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lt(field.to_string(), value.into()));
        self
    }

    pub fn where_lte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte(field.to_string(), value.into()));
        self
    }

    /// Restrict `field` to the inclusive `[start, end]` time window
    pub fn within(self, field: &str, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        let query = match start {
            Some(start) => self.where_gte(field, start.to_rfc3339()),
            None => self,
        };
        match end {
            Some(end) => query.where_lte(field, end.to_rfc3339()),
            None => query,
        }
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Whether a single document satisfies every filter
    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|filter| {
            let (field, expected) = match filter {
                Filter::Eq(f, v) | Filter::Gt(f, v) | Filter::Gte(f, v) | Filter::Lt(f, v) | Filter::Lte(f, v) => (f, v),
            };
            let Some(actual) = field_value(data, field) else {
                return false;
            };
            match filter {
                Filter::Eq(..) => compare_values(actual, expected) == Some(Ordering::Equal),
                Filter::Gt(..) => compare_values(actual, expected) == Some(Ordering::Greater),
                Filter::Gte(..) => matches!(compare_values(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
                Filter::Lt(..) => compare_values(actual, expected) == Some(Ordering::Less),
                Filter::Lte(..) => matches!(compare_values(actual, expected), Some(Ordering::Less | Ordering::Equal)),
            }
        })
    }

    /// Filter, order and truncate a set of documents
    pub fn apply(&self, documents: Vec<Document>) -> Vec<Document> {
        let mut selected: Vec<Document> = documents.into_iter().filter(|d| self.matches(&d.data)).collect();

        if let Some((field, direction)) = &self.order_by {
            selected.sort_by(|a, b| {
                let ordering = match (field_value(&a.data, field), field_value(&b.data, field)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Resolve a dotted field path such as `geo_point.latitude`
fn field_value<'a>(data: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(data, |current, segment| current.get(segment))
        .filter(|v| !v.is_null())
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(dx), Ok(dy)) => Some(dx.cmp(&dy)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
