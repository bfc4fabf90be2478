//! Decision plans returned by the policy decision point.
//!
//! A plan is a closed tree of [`PlanNode`] values. It is decoded from the
//! PDP's `filter` document, compiled once and then dropped; nothing here is
//! cached between requests.
//!
//! Document shape:
//! - `{"kind": "KIND_ALWAYS_ALLOWED"}` / `{"kind": "KIND_ALWAYS_DENIED"}`
//! - `{"kind": "KIND_CONDITIONAL", "condition": <operand>}`
//! - operand: `{"expression": {"operator": "...", "operands": [...]}}`,
//!   `{"variable": "request.resource.attr.x"}` or `{"value": <json>}`

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::authz::errors::CompileError;
use crate::authz::types::{float_to_int, AttrValue, Literal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Contains,
}

impl ComparisonOp {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => ComparisonOp::Eq,
            "ne" => ComparisonOp::Ne,
            "lt" => ComparisonOp::Lt,
            "le" => ComparisonOp::Le,
            "gt" => ComparisonOp::Gt,
            "ge" => ComparisonOp::Ge,
            "in" => ComparisonOp::In,
            "contains" => ComparisonOp::Contains,
            _ => return None,
        })
    }

    /// The operator that gives the same result with its operands swapped.
    fn mirrored(self) -> Option<Self> {
        match self {
            ComparisonOp::Eq | ComparisonOp::Ne => Some(self),
            ComparisonOp::Lt => Some(ComparisonOp::Gt),
            ComparisonOp::Le => Some(ComparisonOp::Ge),
            ComparisonOp::Gt => Some(ComparisonOp::Lt),
            ComparisonOp::Ge => Some(ComparisonOp::Le),
            ComparisonOp::In | ComparisonOp::Contains => None,
        }
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            ComparisonOp::Lt | ComparisonOp::Le | ComparisonOp::Gt | ComparisonOp::Ge
        )
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Ne => "ne",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Le => "le",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Ge => "ge",
            ComparisonOp::In => "in",
            ComparisonOp::Contains => "contains",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
            LogicalOp::Not => "not",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum PlanNode {
    AlwaysAllow,
    AlwaysDeny,
    Comparison {
        op: ComparisonOp,
        path: String,
        #[serde(serialize_with = "serialize_literal")]
        literal: Literal,
    },
    Logical {
        op: LogicalOp,
        children: Vec<PlanNode>,
    },
}

fn serialize_literal<S: serde::Serializer>(lit: &Literal, s: S) -> Result<S::Ok, S::Error> {
    literal_to_json(lit).serialize(s)
}

fn literal_to_json(lit: &Literal) -> Value {
    match lit {
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) => Value::from(*n),
        Literal::Float(f) => Value::from(*f),
        Literal::Text(s) => Value::String(s.clone()),
        Literal::TextSet(items) => Value::from(items.clone()),
    }
}

impl PlanNode {
    pub fn comparison(op: ComparisonOp, path: impl Into<String>, literal: Literal) -> Self {
        PlanNode::Comparison {
            op,
            path: path.into(),
            literal,
        }
    }

    pub fn and(children: Vec<PlanNode>) -> Self {
        PlanNode::Logical {
            op: LogicalOp::And,
            children,
        }
    }

    pub fn or(children: Vec<PlanNode>) -> Self {
        PlanNode::Logical {
            op: LogicalOp::Or,
            children,
        }
    }

    pub fn not(child: PlanNode) -> Self {
        PlanNode::Logical {
            op: LogicalOp::Not,
            children: vec![child],
        }
    }
}

/// A plan together with the request it answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub action: String,
    pub resource_kind: String,
    pub root: PlanNode,
}

impl Plan {
    pub fn new(action: impl Into<String>, resource_kind: impl Into<String>, root: PlanNode) -> Self {
        Self {
            action: action.into(),
            resource_kind: resource_kind.into(),
            root,
        }
    }

    /// Decode the PDP `filter` object.
    pub fn from_filter(
        action: impl Into<String>,
        resource_kind: impl Into<String>,
        filter: &Value,
    ) -> Result<Self, CompileError> {
        let doc = FilterDoc::deserialize(filter)
            .map_err(|e| CompileError::MalformedPlan(format!("invalid filter: {e}")))?;

        let root = match doc.kind.as_str() {
            "KIND_ALWAYS_ALLOWED" => PlanNode::AlwaysAllow,
            "KIND_ALWAYS_DENIED" => PlanNode::AlwaysDeny,
            "KIND_CONDITIONAL" => {
                let condition = doc.condition.as_ref().ok_or_else(|| {
                    CompileError::MalformedPlan("conditional filter has no `condition`".into())
                })?;
                decode_condition(condition)?
            }
            other => {
                return Err(CompileError::MalformedPlan(format!(
                    "unknown filter kind `{other}`"
                )))
            }
        };

        Ok(Self::new(action, resource_kind, root))
    }
}

// ─── Decoder ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FilterDoc {
    kind: String,
    #[serde(default)]
    condition: Option<RawOperand>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawOperand {
    Expression { expression: RawExpression },
    Variable { variable: String },
    Value { value: Value },
}

#[derive(Debug, Deserialize)]
struct RawExpression {
    operator: String,
    #[serde(default)]
    operands: Vec<RawOperand>,
}

enum Operand {
    Expression(PlanNode),
    Variable(String),
    Value(Literal),
}

fn decode_operand(raw: &RawOperand) -> Result<Operand, CompileError> {
    match raw {
        RawOperand::Expression { expression } => {
            decode_expression(expression).map(Operand::Expression)
        }
        RawOperand::Variable { variable } => Ok(Operand::Variable(variable.clone())),
        RawOperand::Value { value } => json_to_literal(value).map(Operand::Value),
    }
}

/// Decode an operand in a position where a boolean is expected.
fn decode_condition(raw: &RawOperand) -> Result<PlanNode, CompileError> {
    match decode_operand(raw)? {
        Operand::Expression(node) => Ok(node),
        // A bare boolean attribute means `attr == true`.
        Operand::Variable(path) => Ok(PlanNode::comparison(
            ComparisonOp::Eq,
            path,
            Literal::Bool(true),
        )),
        Operand::Value(Literal::Bool(true)) => Ok(PlanNode::AlwaysAllow),
        Operand::Value(Literal::Bool(false)) => Ok(PlanNode::AlwaysDeny),
        Operand::Value(other) => Err(CompileError::MalformedPlan(format!(
            "{} value used as a condition",
            other.type_name()
        ))),
    }
}

fn decode_expression(expr: &RawExpression) -> Result<PlanNode, CompileError> {
    let operator = expr.operator.as_str();
    let operands = expr.operands.as_slice();

    let logical = match operator {
        "and" => Some(LogicalOp::And),
        "or" => Some(LogicalOp::Or),
        "not" => Some(LogicalOp::Not),
        _ => None,
    };
    if let Some(op) = logical {
        let children = operands
            .iter()
            .map(decode_condition)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(PlanNode::Logical { op, children });
    }

    let op = ComparisonOp::parse(operator).ok_or_else(|| CompileError::UnsupportedOperator {
        op: operator.to_string(),
        path: "<plan>".to_string(),
    })?;

    let [left, right] = operands else {
        return Err(CompileError::MalformedPlan(format!(
            "`{operator}` takes two operands, got {}",
            operands.len()
        )));
    };

    match (decode_operand(left)?, decode_operand(right)?) {
        (Operand::Variable(path), Operand::Value(literal)) => {
            Ok(PlanNode::comparison(op, path, literal))
        }
        (Operand::Value(literal), Operand::Variable(path)) => {
            let mirrored = op.mirrored().ok_or_else(|| {
                CompileError::MalformedPlan(format!(
                    "`{operator}` requires the attribute as its first operand"
                ))
            })?;
            Ok(PlanNode::comparison(mirrored, path, literal))
        }
        _ => Err(CompileError::MalformedPlan(format!(
            "`{operator}` must compare one attribute with one value"
        ))),
    }
}

fn json_to_literal(v: &Value) -> Result<Literal, CompileError> {
    match v {
        Value::Bool(b) => Ok(Literal::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Literal::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Literal::Float(f))
            } else {
                Err(CompileError::MalformedPlan(format!("number out of range: {n}")))
            }
        }
        Value::String(s) => Ok(Literal::Text(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                // Sets of ids arrive as numbers from some policies.
                Value::Number(n) if n.is_i64() => Ok(n.to_string()),
                other => Err(CompileError::MalformedPlan(format!(
                    "unsupported set element: {other}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Literal::TextSet),
        other => Err(CompileError::MalformedPlan(format!(
            "unsupported literal: {other}"
        ))),
    }
}

// ─── Reference evaluator ────────────────────────────────────────────────

impl PlanNode {
    /// Evaluate the plan against one fully materialized set of attributes,
    /// keyed by abstract path. Applies the same literal typing rules as the
    /// compiler.
    pub fn evaluate(&self, attrs: &BTreeMap<String, AttrValue>) -> Result<bool, CompileError> {
        match self {
            PlanNode::AlwaysAllow => Ok(true),
            PlanNode::AlwaysDeny => Ok(false),
            PlanNode::Comparison { op, path, literal } => {
                let value = attrs
                    .get(path)
                    .ok_or_else(|| CompileError::UnresolvedAttribute(path.clone()))?;
                compare(*op, path, value, literal)
            }
            PlanNode::Logical { op, children } => {
                if children.is_empty() {
                    return Err(CompileError::EmptyLogicalChildren(op.to_string()));
                }
                // Evaluate every child so errors are never masked by short-circuit.
                let results = children
                    .iter()
                    .map(|c| c.evaluate(attrs))
                    .collect::<Result<Vec<_>, _>>()?;
                match op {
                    LogicalOp::And => Ok(results.iter().all(|b| *b)),
                    LogicalOp::Or => Ok(results.iter().any(|b| *b)),
                    LogicalOp::Not => match results.as_slice() {
                        [only] => Ok(!only),
                        _ => Err(CompileError::MalformedPlan(format!(
                            "`not` takes one operand, got {}",
                            results.len()
                        ))),
                    },
                }
            }
        }
    }
}

fn compare(
    op: ComparisonOp,
    path: &str,
    value: &AttrValue,
    literal: &Literal,
) -> Result<bool, CompileError> {
    let mismatch = || CompileError::TypeMismatch {
        path: path.to_string(),
        expected: value.kind(),
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
            match value {
                AttrValue::Text(s) => Ok(items.iter().any(|i| i == s)),
                AttrValue::Int(n) => {
                    let mut hit = false;
                    for item in items {
                        let parsed: i64 = item.parse().map_err(|_| mismatch())?;
                        hit |= parsed == *n;
                    }
                    Ok(hit)
                }
                _ => Err(unsupported()),
            }
        }
        ComparisonOp::Contains => match (value, literal) {
            (AttrValue::Text(s), Literal::Text(needle)) => Ok(s.contains(needle.as_str())),
            (AttrValue::Text(_), _) => Err(mismatch()),
            _ => Err(unsupported()),
        },
        _ => {
            if matches!(literal, Literal::TextSet(_)) {
                return Err(mismatch());
            }
            let ordering = match (value, literal) {
                (AttrValue::Bool(a), Literal::Bool(b)) => {
                    if op.is_ordering() {
                        return Err(unsupported());
                    }
                    a.cmp(b)
                }
                (AttrValue::Int(a), Literal::Int(b)) => a.cmp(b),
                (AttrValue::Int(a), Literal::Float(b)) => {
                    a.cmp(&float_to_int(*b).ok_or_else(mismatch)?)
                }
                (AttrValue::Int(a), Literal::Text(s)) => {
                    let b: i64 = s.parse().map_err(|_| mismatch())?;
                    a.cmp(&b)
                }
                (AttrValue::Float(a), Literal::Float(b)) => a.total_cmp(b),
                (AttrValue::Float(a), Literal::Int(b)) => a.total_cmp(&(*b as f64)),
                (AttrValue::Text(a), Literal::Text(b)) => a.as_str().cmp(b.as_str()),
                (AttrValue::Timestamp(a), Literal::Text(s)) => {
                    let b = DateTime::parse_from_rfc3339(s)
                        .map_err(|_| mismatch())?
                        .with_timezone(&Utc);
                    a.cmp(&b)
                }
                _ => return Err(mismatch()),
            };
            Ok(match op {
                ComparisonOp::Eq => ordering.is_eq(),
                ComparisonOp::Ne => ordering.is_ne(),
                ComparisonOp::Lt => ordering.is_lt(),
                ComparisonOp::Le => ordering.is_le(),
                ComparisonOp::Gt => ordering.is_gt(),
                ComparisonOp::Ge => ordering.is_ge(),
                ComparisonOp::In | ComparisonOp::Contains => return Err(unsupported()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OWNER: &str = "request.resource.attr.owner_id";
    const DEPT: &str = "request.resource.attr.department";

    #[test]
    fn test_decode_always_kinds() {
        let allow = Plan::from_filter("read", "contact", &json!({"kind": "KIND_ALWAYS_ALLOWED"}))
            .unwrap();
        assert_eq!(allow.root, PlanNode::AlwaysAllow);

        let deny = Plan::from_filter("read", "contact", &json!({"kind": "KIND_ALWAYS_DENIED"}))
            .unwrap();
        assert_eq!(deny.root, PlanNode::AlwaysDeny);
    }

    #[test]
    fn test_decode_conditional_or() {
        let filter = json!({
            "kind": "KIND_CONDITIONAL",
            "condition": {
                "expression": {
                    "operator": "or",
                    "operands": [
                        { "expression": { "operator": "eq", "operands": [
                            { "variable": OWNER }, { "value": "3" }
                        ]}},
                        { "expression": { "operator": "eq", "operands": [
                            { "variable": DEPT }, { "value": "Sales" }
                        ]}}
                    ]
                }
            }
        });
        let plan = Plan::from_filter("read", "contact", &filter).unwrap();
        assert_eq!(
            plan.root,
            PlanNode::or(vec![
                PlanNode::comparison(ComparisonOp::Eq, OWNER, Literal::Text("3".into())),
                PlanNode::comparison(ComparisonOp::Eq, DEPT, Literal::Text("Sales".into())),
            ])
        );
    }

    #[test]
    fn test_decode_mirrors_value_first_comparison() {
        let filter = json!({
            "kind": "KIND_CONDITIONAL",
            "condition": { "expression": { "operator": "lt", "operands": [
                { "value": 3 }, { "variable": OWNER }
            ]}}
        });
        let plan = Plan::from_filter("read", "contact", &filter).unwrap();
        assert_eq!(
            plan.root,
            PlanNode::comparison(ComparisonOp::Gt, OWNER, Literal::Int(3))
        );
    }

    #[test]
    fn test_decode_bare_variable_and_set() {
        let filter = json!({
            "kind": "KIND_CONDITIONAL",
            "condition": { "expression": { "operator": "and", "operands": [
                { "variable": "request.resource.attr.is_active" },
                { "expression": { "operator": "in", "operands": [
                    { "variable": DEPT }, { "value": ["Sales", "IT"] }
                ]}}
            ]}}
        });
        let plan = Plan::from_filter("read", "contact", &filter).unwrap();
        assert_eq!(
            plan.root,
            PlanNode::and(vec![
                PlanNode::comparison(
                    ComparisonOp::Eq,
                    "request.resource.attr.is_active",
                    Literal::Bool(true)
                ),
                PlanNode::comparison(
                    ComparisonOp::In,
                    DEPT,
                    Literal::TextSet(vec!["Sales".into(), "IT".into()])
                ),
            ])
        );
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let cases = [
            json!({}),
            json!({"kind": "KIND_SOMETHING"}),
            json!({"kind": "KIND_CONDITIONAL"}),
            json!({"kind": "KIND_CONDITIONAL", "condition": {"value": "x"}}),
            json!({"kind": "KIND_CONDITIONAL", "condition": {"expression": {
                "operator": "eq", "operands": [{"variable": OWNER}]
            }}}),
            json!({"kind": "KIND_CONDITIONAL", "condition": {"expression": {
                "operator": "eq", "operands": [{"variable": OWNER}, {"value": null}]
            }}}),
            json!({"kind": "KIND_CONDITIONAL", "condition": {"expression": {
                "operator": "in", "operands": [{"value": ["a"]}, {"variable": OWNER}]
            }}}),
            json!({"kind": "KIND_CONDITIONAL", "condition": {"variable": 5}}),
            json!({"kind": "KIND_CONDITIONAL", "condition": {"expression": {
                "operator": "eq", "operands": {"variable": OWNER}
            }}}),
            json!({"kind": "KIND_CONDITIONAL", "condition": {"unknown": true}}),
        ];
        for filter in cases {
            let err = Plan::from_filter("read", "contact", &filter).unwrap_err();
            assert!(matches!(err, CompileError::MalformedPlan(_)), "{filter}: {err:?}");
        }
    }

    #[test]
    fn test_decode_unknown_operator() {
        let filter = json!({"kind": "KIND_CONDITIONAL", "condition": {"expression": {
            "operator": "hasIntersection", "operands": [{"variable": OWNER}, {"value": ["1"]}]
        }}});
        let err = Plan::from_filter("read", "contact", &filter).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedOperator { op, .. } if op == "hasIntersection"));
    }

    #[test]
    fn test_evaluate() {
        let mut attrs = BTreeMap::new();
        attrs.insert(OWNER.to_string(), AttrValue::Int(3));
        attrs.insert(DEPT.to_string(), AttrValue::Text("Sales".into()));

        let plan = PlanNode::or(vec![
            PlanNode::comparison(ComparisonOp::Eq, OWNER, Literal::Text("2".into())),
            PlanNode::comparison(ComparisonOp::Eq, DEPT, Literal::Text("Sales".into())),
        ]);
        assert!(plan.evaluate(&attrs).unwrap());

        let negated = PlanNode::not(plan);
        assert!(!negated.evaluate(&attrs).unwrap());

        let missing = PlanNode::comparison(
            ComparisonOp::Eq,
            "request.resource.attr.other",
            Literal::Bool(true),
        );
        assert!(matches!(
            missing.evaluate(&attrs),
            Err(CompileError::UnresolvedAttribute(_))
        ));
    }

    #[test]
    fn test_evaluate_float_against_integer() {
        let mut attrs = BTreeMap::new();
        attrs.insert(OWNER.to_string(), AttrValue::Int(i64::MAX));

        let whole = PlanNode::comparison(ComparisonOp::Le, OWNER, Literal::Float(0.0));
        assert!(!whole.evaluate(&attrs).unwrap());

        let huge = PlanNode::comparison(ComparisonOp::Eq, OWNER, Literal::Float(1e19));
        assert!(matches!(
            huge.evaluate(&attrs),
            Err(CompileError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_plan_serializes_for_logging() {
        let node = PlanNode::comparison(ComparisonOp::Eq, DEPT, Literal::Text("Sales".into()));
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"node": "comparison", "op": "eq", "path": DEPT, "literal": "Sales"})
        );
    }
}
