//! Static mapping from abstract policy attribute paths to store columns.
//!
//! An [`AttributeMap`] is built once at startup against a [`JoinSpec`] and is
//! read-only afterwards, so it can be shared across requests behind an `Arc`.

use std::collections::HashMap;
use std::fmt;

use crate::authz::errors::{ResolutionError, SchemaError};
use crate::authz::types::ValueKind;

/// A concrete column on the primary table or on a related table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
    pub kind: ValueKind,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            kind,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Equality condition `primary.local_column = related_table.related_column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinEntry {
    pub local_column: String,
    pub related_table: String,
    pub related_column: String,
}

impl JoinEntry {
    pub fn new(
        local_column: impl Into<String>,
        related_table: impl Into<String>,
        related_column: impl Into<String>,
    ) -> Self {
        Self {
            local_column: local_column.into(),
            related_table: related_table.into(),
            related_column: related_column.into(),
        }
    }
}

/// How each related table is reached from the primary table.
///
/// Only single-hop joins are supported and every related table has exactly
/// one entry, which keeps the join graph acyclic and unambiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    primary_table: String,
    entries: Vec<JoinEntry>,
}

impl JoinSpec {
    pub fn new(
        primary_table: impl Into<String>,
        entries: Vec<JoinEntry>,
    ) -> Result<Self, SchemaError> {
        let primary_table = primary_table.into();
        for (i, entry) in entries.iter().enumerate() {
            if entry.related_table == primary_table {
                return Err(SchemaError::CyclicJoin(primary_table));
            }
            if entries[..i]
                .iter()
                .any(|e| e.related_table == entry.related_table)
            {
                return Err(SchemaError::AmbiguousJoin(entry.related_table.clone()));
            }
        }
        Ok(Self {
            primary_table,
            entries,
        })
    }

    pub fn primary_table(&self) -> &str {
        &self.primary_table
    }

    pub fn entries(&self) -> &[JoinEntry] {
        &self.entries
    }

    pub fn entry_for(&self, related_table: &str) -> Option<&JoinEntry> {
        self.entries
            .iter()
            .find(|e| e.related_table == related_table)
    }
}

/// A column plus the join (if any) needed to reference it in a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttribute {
    pub column: ColumnRef,
    pub join: Option<JoinEntry>,
}

#[derive(Debug, Clone)]
pub struct AttributeMap {
    joins: JoinSpec,
    attributes: HashMap<String, ResolvedAttribute>,
}

impl AttributeMap {
    pub fn builder(joins: JoinSpec) -> AttributeMapBuilder {
        AttributeMapBuilder {
            joins,
            attributes: Vec::new(),
        }
    }

    pub fn resolve(&self, path: &str) -> Result<&ResolvedAttribute, ResolutionError> {
        self.attributes
            .get(path)
            .ok_or_else(|| ResolutionError::UnknownAttribute(path.to_string()))
    }

    pub fn primary_table(&self) -> &str {
        self.joins.primary_table()
    }

    pub fn joins(&self) -> &JoinSpec {
        &self.joins
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

pub struct AttributeMapBuilder {
    joins: JoinSpec,
    attributes: Vec<(String, String, String, ValueKind)>,
}

impl AttributeMapBuilder {
    /// Map `path` to a column on the primary table.
    pub fn local(mut self, path: &str, column: &str, kind: ValueKind) -> Self {
        let table = self.joins.primary_table().to_string();
        self.attributes
            .push((path.to_string(), table, column.to_string(), kind));
        self
    }

    /// Map `path` to a column on a related table declared in the join spec.
    pub fn related(mut self, path: &str, table: &str, column: &str, kind: ValueKind) -> Self {
        self.attributes
            .push((path.to_string(), table.to_string(), column.to_string(), kind));
        self
    }

    pub fn build(self) -> Result<AttributeMap, SchemaError> {
        let mut attributes = HashMap::with_capacity(self.attributes.len());
        for (path, table, column, kind) in self.attributes {
            let join = if table == self.joins.primary_table() {
                None
            } else {
                let entry = self.joins.entry_for(&table).ok_or_else(|| {
                    SchemaError::MissingJoin {
                        path: path.clone(),
                        table: table.clone(),
                    }
                })?;
                Some(entry.clone())
            };
            let resolved = ResolvedAttribute {
                column: ColumnRef::new(table, column, kind),
                join,
            };
            if attributes.insert(path.clone(), resolved).is_some() {
                return Err(SchemaError::DuplicateAttribute(path));
            }
        }
        Ok(AttributeMap {
            joins: self.joins,
            attributes,
        })
    }
}
