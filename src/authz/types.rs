use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Declared type of a column the compiler can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Integer,
    Float,
    Text,
    Timestamp,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// A typed column value: the unit of both compiled predicates and
/// materialized resource attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl AttrValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            AttrValue::Bool(_) => ValueKind::Bool,
            AttrValue::Int(_) => ValueKind::Integer,
            AttrValue::Float(_) => ValueKind::Float,
            AttrValue::Text(_) => ValueKind::Text,
            AttrValue::Timestamp(_) => ValueKind::Timestamp,
        }
    }

    /// JSON form sent to the policy decision point.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttrValue::Bool(b) => serde_json::Value::Bool(*b),
            AttrValue::Int(n) => serde_json::Value::from(*n),
            AttrValue::Float(f) => serde_json::Value::from(*f),
            AttrValue::Text(s) => serde_json::Value::String(s.clone()),
            AttrValue::Timestamp(t) => {
                serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
        }
    }
}

impl Serialize for AttrValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&AttrValue> for sea_orm::Value {
    fn from(value: &AttrValue) -> Self {
        match value {
            AttrValue::Bool(b) => sea_orm::Value::from(*b),
            AttrValue::Int(n) => sea_orm::Value::from(*n),
            AttrValue::Float(f) => sea_orm::Value::from(*f),
            AttrValue::Text(s) => sea_orm::Value::from(s.clone()),
            AttrValue::Timestamp(t) => sea_orm::Value::from(*t),
        }
    }
}

/// Exact `i64` value of a whole float, or `None` when there is none.
pub fn float_to_int(f: f64) -> Option<i64> {
    // `i64::MAX as f64` rounds up to 2^63, which is itself out of range.
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then(|| f as i64)
}

/// Constant operand of a plan comparison, as the policy engine emits it.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    TextSet(Vec<String>),
}

impl Literal {
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Bool(_) => "bool",
            Literal::Int(_) => "integer",
            Literal::Float(_) => "float",
            Literal::Text(_) => "text",
            Literal::TextSet(_) => "text set",
        }
    }
}

/// The acting identity sent to the policy decision point.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Principal {
    pub id: String,
    pub roles: BTreeSet<String>,
    #[serde(rename = "attr")]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}

/// A concrete resource instance with every attribute materialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub kind: String,
    pub id: String,
    #[serde(rename = "attr")]
    pub attrs: BTreeMap<String, AttrValue>,
}

impl Resource {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attrs: BTreeMap::new(),
        }
    }
}
