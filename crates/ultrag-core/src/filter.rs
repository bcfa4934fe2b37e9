use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AccessLevel;

/// Metadata key holding the owner identity of a document.
pub const USER_ID_KEY: &str = "user_id";
/// Metadata key holding the [`AccessLevel`] of a document.
pub const ACCESS_LEVEL_KEY: &str = "access_level";

// ---------------------------------------------------------------------------
// MetadataValue
// ---------------------------------------------------------------------------

/// A scalar value a filter condition can compare metadata against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    pub fn to_json(&self) -> Value {
        match self {
            MetadataValue::Bool(b) => Value::Bool(*b),
            MetadataValue::Integer(i) => Value::from(*i),
            MetadataValue::Float(f) => Value::from(*f),
            MetadataValue::String(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<AccessLevel> for MetadataValue {
    fn from(value: AccessLevel) -> Self {
        MetadataValue::String(value.as_str().to_string())
    }
}

// ---------------------------------------------------------------------------
// FilterExpression
// ---------------------------------------------------------------------------

/// `metadata[key] == value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    pub value: MetadataValue,
}

impl Condition {
    pub fn new(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One top-level clause of a [`FilterExpression`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterClause {
    /// A single equality condition.
    Eq(Condition),
    /// Matches when every condition of at least one group holds.
    AnyOf(Vec<Vec<Condition>>),
}

/// A predicate over document metadata.
///
/// Top-level clauses are joined by conjunction. An expression with no clauses
/// places no restriction on the candidates; it never means "match nothing".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterExpression {
    #[serde(default)]
    pub clauses: Vec<FilterClause>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality clause.
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.clauses.push(FilterClause::Eq(Condition::new(key, value)));
        self
    }

    /// Add a disjunction of condition groups.
    pub fn any_of(mut self, groups: Vec<Vec<Condition>>) -> Self {
        self.clauses.push(FilterClause::AnyOf(groups));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The visibility rule for a caller.
    ///
    /// With an identity the caller sees documents they own plus everything
    /// marked common; without one only common documents are visible.
    pub fn visibility(user_id: Option<&str>) -> Self {
        match user_id.filter(|id| !id.is_empty()) {
            Some(id) => Self::new().any_of(vec![
                vec![Condition::new(USER_ID_KEY, id)],
                vec![Condition::new(ACCESS_LEVEL_KEY, AccessLevel::Common)],
            ]),
            None => Self::new().eq(ACCESS_LEVEL_KEY, AccessLevel::Common),
        }
    }
}
