use sea_orm::sea_query::{Alias, Condition, Expr, Func, SimpleExpr};
use sea_orm::{
    ConnectionTrait, DbBackend, EntityTrait, QueryFilter, QuerySelect, QueryTrait, Select,
};
use serde_json::Value;

use crate::authz::attributes::ColumnRef;
use crate::authz::compiler::{CompiledQuery, Predicate};
use crate::authz::diagnostics::QueryDiagnostics;
use crate::authz::errors::ExecutionError;
use crate::authz::plan::ComparisonOp;

/// Run `query` narrowed by `compiled`. An empty `projection` keeps the
/// primary entity's columns.
///
/// Rows come back in store order; no ORDER BY is added.
pub async fn execute<E, C>(
    db: &C,
    query: Select<E>,
    compiled: &CompiledQuery,
    projection: &[ColumnRef],
    diagnostics: &dyn QueryDiagnostics,
) -> Result<Vec<Value>, ExecutionError>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    if compiled.is_always_deny() {
        tracing::debug!("Plan denies every row, skipping query");
        return Ok(Vec::new());
    }

    let backend = db.get_database_backend();
    let select = build_select(query, compiled, projection, backend);
    diagnostics.on_sql(&select.build(backend).to_string());

    let rows = select.into_json().all(db).await?;
    tracing::debug!(rows = rows.len(), "Executed authorized query");
    Ok(rows)
}

/// Apply joins, filter and projection without running anything.
pub fn build_select<E: EntityTrait>(
    mut query: Select<E>,
    compiled: &CompiledQuery,
    projection: &[ColumnRef],
    backend: DbBackend,
) -> Select<E> {
    let primary = E::default().table_name().to_string();

    for join in &compiled.joins {
        let on = Expr::col((Alias::new(primary.as_str()), Alias::new(join.local_column.as_str())))
            .equals((
                Alias::new(join.related_table.as_str()),
                Alias::new(join.related_column.as_str()),
            ));
        QueryTrait::query(&mut query).inner_join(Alias::new(join.related_table.as_str()), on);
    }

    let mut query = query.filter(lower(&compiled.predicate, backend));

    if !projection.is_empty() {
        query = query.select_only();
        for column in projection {
            query = query.column_as(column_expr(column), column.column.clone());
        }
    }

    query
}

fn column_expr(column: &ColumnRef) -> SimpleExpr {
    Expr::col((Alias::new(column.table.as_str()), Alias::new(column.column.as_str()))).into()
}

fn constant(value: bool) -> Condition {
    Condition::all().add(Expr::val(1).eq(i32::from(value)))
}

fn lower(predicate: &Predicate, backend: DbBackend) -> Condition {
    match predicate {
        Predicate::Const(b) => constant(*b),
        Predicate::Compare { column, op, value } => {
            let col = Expr::col((Alias::new(column.table.as_str()), Alias::new(column.column.as_str())));
            let value = sea_orm::Value::from(value);
            let expr = match op {
                ComparisonOp::Eq => col.eq(value),
                ComparisonOp::Ne => col.ne(value),
                ComparisonOp::Lt => col.lt(value),
                ComparisonOp::Le => col.lte(value),
                ComparisonOp::Gt => col.gt(value),
                ComparisonOp::Ge => col.gte(value),
                // The compiler emits these as InSet / Contains.
                ComparisonOp::In | ComparisonOp::Contains => return constant(false),
            };
            Condition::all().add(expr)
        }
        Predicate::InSet { column, values } => {
            if values.is_empty() {
                return constant(false);
            }
            let col = Expr::col((Alias::new(column.table.as_str()), Alias::new(column.column.as_str())));
            Condition::all().add(col.is_in(values.iter().map(sea_orm::Value::from)))
        }
        Predicate::Contains { column, needle } => {
            // LIKE is case-insensitive on SQLite, so use a position function.
            let func = match backend {
                DbBackend::Postgres => "strpos",
                _ => "instr",
            };
            let call = Func::cust(Alias::new(func))
                .arg(column_expr(column))
                .arg(sea_orm::Value::from(needle.clone()));
            Condition::all().add(Expr::expr(call).gt(0))
        }
        Predicate::And(parts) => parts
            .iter()
            .fold(Condition::all(), |cond, p| cond.add(lower(p, backend))),
        Predicate::Or(parts) => parts
            .iter()
            .fold(Condition::any(), |cond, p| cond.add(lower(p, backend))),
        Predicate::Not(inner) => lower(inner, backend).not(),
    }
}
