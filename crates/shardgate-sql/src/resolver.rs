use core::ops::ControlFlow;

use shardgate_core::{ShardgateError, StatementKind, StatementShape};
use sqlparser::ast::{
    visit_expressions, Expr, FromTable, ObjectName, SetExpr, Statement, TableFactor,
    TableWithJoins, Value,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use tracing::debug;

/// Derive the shape of a statement without executing it. Counts are read
/// straight off the parsed structure; `SELECT *` counts as one projection
/// item, never resolved against the catalog.
pub fn resolve(sql: &str) -> Result<StatementShape, ShardgateError> {
    let dialect = MySqlDialect {};
    let statements = Parser::parse_sql(&dialect, sql)
        .map_err(|err| ShardgateError::Parse(err.to_string()))?;
    let stmt = statements
        .first()
        .ok_or_else(|| ShardgateError::Parse("empty statement".into()))?;
    let shape = shape_of(stmt);
    debug!(?shape, "resolved statement shape");
    Ok(shape)
}

fn shape_of(stmt: &Statement) -> StatementShape {
    let parameter_count = count_placeholders(stmt);
    match stmt {
        Statement::Query(query) => {
            let (result_column_count, target_table) = match query.body.as_ref() {
                SetExpr::Select(select) => (
                    wire_count(select.projection.len()),
                    single_table(&select.from),
                ),
                // Set operations and VALUES bodies have no syntactically
                // obvious column list at this level.
                _ => (0, None),
            };
            StatementShape {
                kind: StatementKind::Select,
                parameter_count,
                result_column_count,
                target_table,
            }
        }
        Statement::Insert {
            table_name,
            columns,
            ..
        } => StatementShape {
            kind: StatementKind::Insert,
            parameter_count,
            result_column_count: wire_count(columns.len()),
            target_table: Some(object_name(table_name)),
        },
        Statement::Update { table, .. } => StatementShape {
            kind: StatementKind::Other,
            parameter_count,
            result_column_count: 0,
            target_table: single_table(std::slice::from_ref(table)),
        },
        Statement::Delete { from, .. } => StatementShape {
            kind: StatementKind::Other,
            parameter_count,
            result_column_count: 0,
            target_table: delete_target(from),
        },
        _ => StatementShape {
            kind: StatementKind::Other,
            parameter_count,
            result_column_count: 0,
            target_table: None,
        },
    }
}

/// Syntactic count of positional `?` placeholders anywhere in the statement.
fn count_placeholders(stmt: &Statement) -> u16 {
    let mut count = 0usize;
    let _ = visit_expressions(stmt, |expr: &Expr| {
        if matches!(expr, Expr::Value(Value::Placeholder(_))) {
            count += 1;
        }
        ControlFlow::<()>::Continue(())
    });
    wire_count(count)
}

/// Name of the single targeted table, when the FROM list is exactly one
/// join-free named table.
fn single_table(from: &[TableWithJoins]) -> Option<String> {
    match from {
        [TableWithJoins { relation, joins }] if joins.is_empty() => match relation {
            TableFactor::Table { name, .. } => Some(object_name(name)),
            _ => None,
        },
        _ => None,
    }
}

fn delete_target(from: &FromTable) -> Option<String> {
    match from {
        FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => {
            single_table(tables)
        }
    }
}

fn object_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

// The acknowledgement packet carries counts as 2-byte fields.
fn wire_count(count: usize) -> u16 {
    u16::try_from(count).unwrap_or(u16::MAX)
}
