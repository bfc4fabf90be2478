//! Compiles a [`Plan`] into a column-level filter plus the joins it needs.
//!
//! The output is builder-agnostic: [`crate::authz::executor`] lowers it onto
//! SeaORM. Compilation is all-or-nothing; any error aborts the whole plan so a
//! partial predicate is never applied.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::authz::attributes::{AttributeMap, ColumnRef, JoinEntry};
use crate::authz::errors::CompileError;
use crate::authz::plan::{ComparisonOp, LogicalOp, Plan, PlanNode};
use crate::authz::types::{float_to_int, AttrValue, Literal, ValueKind};

/// Boolean filter over concrete columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Const(bool),
    /// `column <op> value`; `op` is never `In` or `Contains`.
    Compare {
        column: ColumnRef,
        op: ComparisonOp,
        value: AttrValue,
    },
    InSet {
        column: ColumnRef,
        values: Vec<AttrValue>,
    },
    Contains {
        column: ColumnRef,
        needle: String,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    fn negate(self) -> Self {
        match self {
            Predicate::Const(b) => Predicate::Const(!b),
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    /// Evaluate against one row, keyed by `table.column`.
    pub fn evaluate(&self, row: &HashMap<String, AttrValue>) -> Result<bool, CompileError> {
        let lookup = |column: &ColumnRef| {
            row.get(&column.to_string())
                .ok_or_else(|| CompileError::UnresolvedAttribute(column.to_string()))
        };
        match self {
            Predicate::Const(b) => Ok(*b),
            Predicate::Compare { column, op, value } => {
                let actual = lookup(column)?;
                let ordering = match (actual, value) {
                    (AttrValue::Bool(a), AttrValue::Bool(b)) => a.cmp(b),
                    (AttrValue::Int(a), AttrValue::Int(b)) => a.cmp(b),
                    (AttrValue::Float(a), AttrValue::Float(b)) => a.total_cmp(b),
                    (AttrValue::Text(a), AttrValue::Text(b)) => a.cmp(b),
                    (AttrValue::Timestamp(a), AttrValue::Timestamp(b)) => a.cmp(b),
                    _ => {
                        return Err(CompileError::TypeMismatch {
                            path: column.to_string(),
                            expected: column.kind,
                            found: actual.kind().to_string(),
                        })
                    }
                };
                Ok(match op {
                    ComparisonOp::Eq => ordering.is_eq(),
                    ComparisonOp::Ne => ordering.is_ne(),
                    ComparisonOp::Lt => ordering.is_lt(),
                    ComparisonOp::Le => ordering.is_le(),
                    ComparisonOp::Gt => ordering.is_gt(),
                    ComparisonOp::Ge => ordering.is_ge(),
                    ComparisonOp::In | ComparisonOp::Contains => {
                        return Err(CompileError::UnsupportedOperator {
                            op: op.to_string(),
                            path: column.to_string(),
                        })
                    }
                })
            }
            Predicate::InSet { column, values } => {
                let actual = lookup(column)?;
                Ok(values.iter().any(|v| v == actual))
            }
            Predicate::Contains { column, needle } => match lookup(column)? {
                AttrValue::Text(s) => Ok(s.contains(needle.as_str())),
                other => Err(CompileError::TypeMismatch {
                    path: column.to_string(),
                    expected: ValueKind::Text,
                    found: other.kind().to_string(),
                }),
            },
            Predicate::And(parts) => {
                let mut result = true;
                for p in parts {
                    result &= p.evaluate(row)?;
                }
                Ok(result)
            }
            Predicate::Or(parts) => {
                let mut result = false;
                for p in parts {
                    result |= p.evaluate(row)?;
                }
                Ok(result)
            }
            Predicate::Not(inner) => Ok(!inner.evaluate(row)?),
        }
    }
}

/// Result of compiling one plan. Owned by the request that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub predicate: Predicate,
    /// Joins required by `predicate`, one per related table, in order of
    /// first use.
    pub joins: Vec<JoinEntry>,
}

impl CompiledQuery {
    /// True when no row can match, so the query need not run.
    pub fn is_always_deny(&self) -> bool {
        self.predicate == Predicate::Const(false)
    }
}

pub fn compile(plan: &Plan, attributes: &AttributeMap) -> Result<CompiledQuery, CompileError> {
    let compiled = compile_node(&plan.root, attributes)?;
    tracing::debug!(
        action = %plan.action,
        resource_kind = %plan.resource_kind,
        joins = compiled.joins.len(),
        always_deny = compiled.is_always_deny(),
        "Compiled decision plan"
    );
    Ok(compiled)
}

pub fn compile_node(
    node: &PlanNode,
    attributes: &AttributeMap,
) -> Result<CompiledQuery, CompileError> {
    match node {
        PlanNode::AlwaysAllow => Ok(constant(true)),
        PlanNode::AlwaysDeny => Ok(constant(false)),
        PlanNode::Comparison { op, path, literal } => {
            let resolved = attributes.resolve(path)?;
            let predicate = typed_predicate(*op, path, &resolved.column, literal)?;
            Ok(CompiledQuery {
                predicate,
                joins: resolved.join.iter().cloned().collect(),
            })
        }
        PlanNode::Logical { op, children } => {
            if children.is_empty() {
                return Err(CompileError::EmptyLogicalChildren(op.to_string()));
            }
            if *op == LogicalOp::Not && children.len() != 1 {
                return Err(CompileError::MalformedPlan(format!(
                    "`not` takes one operand, got {}",
                    children.len()
                )));
            }

            let parts = children
                .iter()
                .map(|c| compile_node(c, attributes))
                .collect::<Result<Vec<_>, _>>()?;

            Ok(match op {
                LogicalOp::And => combine(true, parts),
                LogicalOp::Or => combine(false, parts),
                LogicalOp::Not => {
                    let mut parts = parts;
                    let child = parts.remove(0);
                    CompiledQuery {
                        predicate: child.predicate.negate(),
                        joins: child.joins,
                    }
                }
            })
        }
    }
}

fn constant(value: bool) -> CompiledQuery {
    CompiledQuery {
        predicate: Predicate::Const(value),
        joins: Vec::new(),
    }
}

/// Combine with AND (`conjunction`) or OR. `Const(identity)` children are
/// dropped, an absorbing constant collapses the node, and nested nodes of the
/// same connective are flattened.
fn combine(conjunction: bool, parts: Vec<CompiledQuery>) -> CompiledQuery {
    let identity = conjunction;
    let mut predicates = Vec::with_capacity(parts.len());
    let mut joins: Vec<JoinEntry> = Vec::new();

    for part in parts {
        match part.predicate {
            Predicate::Const(b) if b == identity => continue,
            Predicate::Const(_) => return constant(!identity),
            Predicate::And(inner) if conjunction => predicates.extend(inner),
            Predicate::Or(inner) if !conjunction => predicates.extend(inner),
            other => predicates.push(other),
        }
        for join in part.joins {
            if !joins.iter().any(|j| j.related_table == join.related_table) {
                joins.push(join);
            }
        }
    }

    let predicate = match predicates.len() {
        0 => Predicate::Const(identity),
        1 => predicates.remove(0),
        _ if conjunction => Predicate::And(predicates),
        _ => Predicate::Or(predicates),
    };
    CompiledQuery { predicate, joins }
}

/// Type `literal` against the column and build the leaf predicate.
fn typed_predicate(
    op: ComparisonOp,
    path: &str,
    column: &ColumnRef,
    literal: &Literal,
) -> Result<Predicate, CompileError> {
    let mismatch = || CompileError::TypeMismatch {
        path: path.to_string(),
        expected: column.kind,
        found: literal.type_name().to_string(),
    };
    let unsupported = || CompileError::UnsupportedOperator {
        op: op.to_string(),
        path: path.to_string(),
    };

    match op {
        ComparisonOp::In => {
            let Literal::TextSet(items) = literal else {
                return Err(mismatch());
            };
            let values = match column.kind {
                ValueKind::Text => items.iter().cloned().map(AttrValue::Text).collect(),
                ValueKind::Integer => items
                    .iter()
                    .map(|i| i.parse::<i64>().map(AttrValue::Int).map_err(|_| mismatch()))
                    .collect::<Result<Vec<_>, _>>()?,
                _ => return Err(unsupported()),
            };
            Ok(Predicate::InSet {
                column: column.clone(),
                values,
            })
        }
        ComparisonOp::Contains => match (column.kind, literal) {
            (ValueKind::Text, Literal::Text(needle)) => Ok(Predicate::Contains {
                column: column.clone(),
                needle: needle.clone(),
            }),
            (ValueKind::Text, _) => Err(mismatch()),
            _ => Err(unsupported()),
        },
        _ => {
            let value = match (column.kind, literal) {
                (_, Literal::TextSet(_)) => return Err(mismatch()),
                (ValueKind::Bool, Literal::Bool(b)) => {
                    if op.is_ordering() {
                        return Err(unsupported());
                    }
                    AttrValue::Bool(*b)
                }
                (ValueKind::Integer, Literal::Int(n)) => AttrValue::Int(*n),
                (ValueKind::Integer, Literal::Float(f)) => {
                    AttrValue::Int(float_to_int(*f).ok_or_else(mismatch)?)
                }
                (ValueKind::Integer, Literal::Text(s)) => {
                    AttrValue::Int(s.parse().map_err(|_| mismatch())?)
                }
                (ValueKind::Float, Literal::Float(f)) => AttrValue::Float(*f),
                (ValueKind::Float, Literal::Int(n)) => AttrValue::Float(*n as f64),
                (ValueKind::Text, Literal::Text(s)) => AttrValue::Text(s.clone()),
                (ValueKind::Timestamp, Literal::Text(s)) => AttrValue::Timestamp(
                    DateTime::parse_from_rfc3339(s)
                        .map_err(|_| mismatch())?
                        .with_timezone(&Utc),
                ),
                _ => return Err(mismatch()),
            };
            Ok(Predicate::Compare {
                column: column.clone(),
                op,
                value,
            })
        }
    }
}
