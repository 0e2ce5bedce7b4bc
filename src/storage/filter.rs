//! Parameterized document filters.
//!
//! A filter is a conjunction of typed conditions. Values travel as bind
//! parameters; backends never splice them into query text.

use serde_json::Value;

use crate::model::Document;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `field == value`
    Eq { field: String, value: Value },
    /// `field != value` (absent fields count as not equal)
    Ne { field: String, value: Value },
    /// At least one of `fields` equals `value`.
    AnyEq { fields: Vec<String>, value: Value },
    /// Field present and not null.
    Exists(String),
}

impl Condition {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Condition::Eq { field, value } => doc.get(field) == Some(value),
            Condition::Ne { field, value } => doc.get(field) != Some(value),
            Condition::AnyEq { fields, value } => {
                fields.iter().any(|field| doc.get(field) == Some(value))
            }
            Condition::Exists(field) => doc.get(field).is_some_and(|v| !v.is_null()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
    limit: Option<usize>,
}

impl Filter {
    /// Filter matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Ne {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn any_eq<I, S>(mut self, fields: I, value: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions.push(Condition::AnyEq {
            fields: fields.into_iter().map(Into::into).collect(),
            value: value.into(),
        });
        self
    }

    pub fn exists(mut self, field: impl Into<String>) -> Self {
        self.conditions.push(Condition::Exists(field.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add an equality condition only when `when` holds.
    pub fn eq_if(self, when: bool, field: impl Into<String>, value: impl Into<Value>) -> Self {
        if when {
            self.eq(field, value)
        } else {
            self
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}
