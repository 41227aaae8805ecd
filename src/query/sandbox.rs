//! Bounded evaluator for validated query expressions.
//!
//! Every operator is a single pass over the row set, so cost is closed-form
//! in the number of rows; the scan carries a row budget and a deadline.
//! Failures come back as `QueryError` values, never as panics, so the
//! caller can decide whether to re-plan.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::config::service::QueryConfig;
use crate::core::errors::QueryError;
use crate::table::loader::parse_datetime;
use crate::table::schema::{CellValue, ColumnType, Row, Schema, Table};
use super::expr::{Aggregate, AggregateOp, CompOp, Literal, Predicate, QueryExpression, SortDirection};
use super::validate;

const DEADLINE_CHECK_INTERVAL: usize = 1024;

#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    pub max_rows_scanned: usize,
    pub max_result_rows: usize,
    pub max_execution_time: Duration,
}

impl ExecutionLimits {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            max_rows_scanned: config.max_rows_scanned,
            max_result_rows: config.max_result_rows,
            max_execution_time: Duration::from_millis(config.max_execution_ms),
        }
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryOutput {
    Scalar(CellValue),
    Column(Vec<CellValue>),
    Table(ResultTable),
}

/// Immutable computation result plus the expression that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub output: QueryOutput,
    pub provenance: QueryExpression,
}

pub fn execute(
    table: &Table,
    expr: &QueryExpression,
    limits: &ExecutionLimits,
) -> Result<QueryResult, QueryError> {
    // unknown columns and impossible operand types never reach the scan
    validate::validate(expr, &table.schema)?;

    let deadline = Instant::now() + limits.max_execution_time;

    let mut matched: Vec<usize> = Vec::new();
    for (idx, row) in table.rows.iter().enumerate() {
        if idx >= limits.max_rows_scanned {
            return Err(QueryError::LimitExceeded(format!(
                "row scan budget of {} exhausted",
                limits.max_rows_scanned
            )));
        }
        if idx % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() > deadline {
            return Err(time_exceeded(limits));
        }

        let keep = match &expr.filter {
            Some(predicate) => eval_predicate(predicate, row, &table.schema)?,
            None => true,
        };
        if keep {
            matched.push(idx);
        }
    }

    let output = if let Some(aggregate) = &expr.aggregate {
        run_aggregate(table, aggregate, &matched, expr.limit, limits)?
    } else {
        project(table, expr, matched, limits)?
    };

    if Instant::now() > deadline {
        return Err(time_exceeded(limits));
    }

    Ok(QueryResult {
        output,
        provenance: expr.clone(),
    })
}

fn time_exceeded(limits: &ExecutionLimits) -> QueryError {
    QueryError::LimitExceeded(format!(
        "execution time budget of {:?} exhausted",
        limits.max_execution_time
    ))
}

fn eval_predicate(predicate: &Predicate, row: &Row, schema: &Schema) -> Result<bool, QueryError> {
    match predicate {
        Predicate::Compare { column, op, value } => {
            let idx = schema
                .column_index(column)
                .ok_or_else(|| QueryError::Schema(column.clone()))?;
            let cell = &row[idx];
            if cell.is_null() {
                // nulls never match a comparison
                return Ok(false);
            }
            let rhs = literal_to_cell(value, schema.columns[idx].ty)?;
            let ord = cell.compare(&rhs).ok_or_else(|| {
                QueryError::Type(format!(
                    "cannot compare {} cell in '{}' with {}",
                    cell.type_name(),
                    column,
                    value
                ))
            })?;
            Ok(match op {
                CompOp::Eq => ord == Ordering::Equal,
                CompOp::Neq => ord != Ordering::Equal,
                CompOp::Lt => ord == Ordering::Less,
                CompOp::Lte => ord != Ordering::Greater,
                CompOp::Gt => ord == Ordering::Greater,
                CompOp::Gte => ord != Ordering::Less,
            })
        }
        Predicate::And(left, right) => {
            Ok(eval_predicate(left, row, schema)? && eval_predicate(right, row, schema)?)
        }
        Predicate::Or(left, right) => {
            Ok(eval_predicate(left, row, schema)? || eval_predicate(right, row, schema)?)
        }
        Predicate::Not(inner) => Ok(!eval_predicate(inner, row, schema)?),
    }
}

fn literal_to_cell(literal: &Literal, ty: ColumnType) -> Result<CellValue, QueryError> {
    match (ty, literal) {
        (ColumnType::Number, Literal::Number(n)) => Ok(CellValue::Number(*n)),
        (ColumnType::String, Literal::String(s)) => Ok(CellValue::String(s.clone())),
        (ColumnType::Boolean, Literal::Boolean(b)) => Ok(CellValue::Boolean(*b)),
        (ColumnType::Datetime, Literal::String(s)) => parse_datetime(s)
            .map(CellValue::Datetime)
            .ok_or_else(|| QueryError::Type(format!("'{s}' is not a valid datetime"))),
        (ty, literal) => Err(QueryError::Type(format!(
            "cannot compare {ty} column with {literal}"
        ))),
    }
}

fn run_aggregate(
    table: &Table,
    aggregate: &Aggregate,
    matched: &[usize],
    limit: Option<u64>,
    limits: &ExecutionLimits,
) -> Result<QueryOutput, QueryError> {
    let Some(group_col) = &aggregate.group_by else {
        let value = fold(table, aggregate, matched)?;
        return Ok(QueryOutput::Scalar(value));
    };

    let gidx = table
        .schema
        .column_index(group_col)
        .ok_or_else(|| QueryError::Schema(group_col.clone()))?;

    // BTreeMap keys give a deterministic group order
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for &row_idx in matched {
        let key = table.rows[row_idx][gidx].to_string();
        groups.entry(key).or_default().push(row_idx);
    }

    let value_header = match &aggregate.column {
        Some(column) => format!("{}({})", aggregate.op, column),
        None => format!("{}(*)", aggregate.op),
    };

    let mut rows = Vec::with_capacity(groups.len());
    for (key, group_rows) in groups {
        let value = fold(table, aggregate, &group_rows)?;
        rows.push(vec![CellValue::String(key), value]);
    }
    if let Some(limit) = limit {
        rows.truncate(limit as usize);
    }
    if rows.len() > limits.max_result_rows {
        return Err(QueryError::LimitExceeded(format!(
            "result has {} groups, max_result_rows is {}",
            rows.len(),
            limits.max_result_rows
        )));
    }

    Ok(QueryOutput::Table(ResultTable {
        columns: vec![group_col.clone(), value_header],
        rows,
    }))
}

fn fold(table: &Table, aggregate: &Aggregate, rows: &[usize]) -> Result<CellValue, QueryError> {
    let column_idx = match &aggregate.column {
        Some(column) => Some(
            table
                .schema
                .column_index(column)
                .ok_or_else(|| QueryError::Schema(column.clone()))?,
        ),
        None => None,
    };

    match aggregate.op {
        AggregateOp::Count => {
            let count = match column_idx {
                Some(idx) => rows
                    .iter()
                    .filter(|&&r| !table.rows[r][idx].is_null())
                    .count(),
                None => rows.len(),
            };
            Ok(CellValue::Number(count as f64))
        }
        AggregateOp::Sum | AggregateOp::Mean => {
            let idx = require_aggregate_column(aggregate, column_idx)?;
            let mut sum = 0.0;
            let mut count = 0usize;
            for &r in rows {
                if let Some(n) = table.rows[r][idx].as_number() {
                    sum += n;
                    count += 1;
                }
            }
            match aggregate.op {
                AggregateOp::Sum => Ok(CellValue::Number(sum)),
                _ => {
                    if count == 0 {
                        Ok(CellValue::Null)
                    } else {
                        Ok(CellValue::Number(sum / count as f64))
                    }
                }
            }
        }
        AggregateOp::Min | AggregateOp::Max => {
            let idx = require_aggregate_column(aggregate, column_idx)?;
            let mut best: Option<&CellValue> = None;
            for &r in rows {
                let cell = &table.rows[r][idx];
                if cell.is_null() {
                    continue;
                }
                best = Some(match best {
                    None => cell,
                    Some(current) => {
                        let ord = cell.compare(current).unwrap_or(Ordering::Equal);
                        let replace = match aggregate.op {
                            AggregateOp::Min => ord == Ordering::Less,
                            _ => ord == Ordering::Greater,
                        };
                        if replace {
                            cell
                        } else {
                            current
                        }
                    }
                });
            }
            Ok(best.cloned().unwrap_or(CellValue::Null))
        }
    }
}

fn require_aggregate_column(
    aggregate: &Aggregate,
    column_idx: Option<usize>,
) -> Result<usize, QueryError> {
    column_idx.ok_or_else(|| {
        QueryError::UnsupportedOperator(format!("aggregate {} requires a column", aggregate.op))
    })
}

fn project(
    table: &Table,
    expr: &QueryExpression,
    mut matched: Vec<usize>,
    limits: &ExecutionLimits,
) -> Result<QueryOutput, QueryError> {
    if let Some(sort) = &expr.sort {
        let sidx = table
            .schema
            .column_index(&sort.column)
            .ok_or_else(|| QueryError::Schema(sort.column.clone()))?;
        // stable sort: equal keys keep row order
        matched.sort_by(|&a, &b| {
            sort_ordering(&table.rows[a][sidx], &table.rows[b][sidx], sort.direction)
        });
    }

    if let Some(limit) = expr.limit {
        matched.truncate(limit as usize);
    }
    if matched.len() > limits.max_result_rows {
        return Err(QueryError::LimitExceeded(format!(
            "result has {} rows, max_result_rows is {}",
            matched.len(),
            limits.max_result_rows
        )));
    }

    let indices: Vec<usize> = match &expr.select {
        Some(select) => select
            .iter()
            .map(|name| {
                table
                    .schema
                    .column_index(name)
                    .ok_or_else(|| QueryError::Schema(name.clone()))
            })
            .collect::<Result<_, _>>()?,
        None => (0..table.schema.arity()).collect(),
    };

    if indices.len() == 1 {
        let idx = indices[0];
        let mut values: Vec<CellValue> = matched
            .iter()
            .map(|&r| table.rows[r][idx].clone())
            .collect();
        return Ok(if values.len() == 1 {
            QueryOutput::Scalar(values.remove(0))
        } else {
            QueryOutput::Column(values)
        });
    }

    let columns: Vec<String> = indices
        .iter()
        .map(|&i| table.schema.columns[i].name.clone())
        .collect();
    let rows: Vec<Vec<CellValue>> = matched
        .iter()
        .map(|&r| indices.iter().map(|&i| table.rows[r][i].clone()).collect())
        .collect();

    Ok(QueryOutput::Table(ResultTable { columns, rows }))
}

/// Nulls sort last regardless of direction.
fn sort_ordering(a: &CellValue, b: &CellValue, direction: SortDirection) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = a.compare(b).unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::SortSpec;
    use crate::table::loader::load_from_str;

    fn cities() -> Table {
        load_from_str("city,pop\nParis,2148000\nLyon,513000\nMarseille,861000\n")
            .unwrap()
            .table
    }

    fn filter_eq(column: &str, value: &str) -> Predicate {
        Predicate::Compare {
            column: column.to_string(),
            op: CompOp::Eq,
            value: Literal::String(value.to_string()),
        }
    }

    #[test]
    fn filter_then_select_single_cell_is_a_scalar() {
        let expr = QueryExpression {
            filter: Some(filter_eq("city", "Lyon")),
            select: Some(vec!["pop".to_string()]),
            ..Default::default()
        };
        let result = execute(&cities(), &expr, &ExecutionLimits::default()).unwrap();
        assert_eq!(result.output, QueryOutput::Scalar(CellValue::Number(513000.0)));
        assert_eq!(result.provenance, expr);
    }

    #[test]
    fn sum_aggregate() {
        let expr = QueryExpression {
            aggregate: Some(Aggregate {
                op: AggregateOp::Sum,
                column: Some("pop".to_string()),
                group_by: None,
            }),
            ..Default::default()
        };
        let result = execute(&cities(), &expr, &ExecutionLimits::default()).unwrap();
        assert_eq!(
            result.output,
            QueryOutput::Scalar(CellValue::Number(2148000.0 + 513000.0 + 861000.0))
        );
    }

    #[test]
    fn group_by_orders_groups_deterministically() {
        let table = load_from_str("kind,n\nb,1\na,2\nb,3\n").unwrap().table;
        let expr = QueryExpression {
            aggregate: Some(Aggregate {
                op: AggregateOp::Sum,
                column: Some("n".to_string()),
                group_by: Some("kind".to_string()),
            }),
            ..Default::default()
        };
        let result = execute(&table, &expr, &ExecutionLimits::default()).unwrap();
        match result.output {
            QueryOutput::Table(out) => {
                assert_eq!(out.columns, vec!["kind".to_string(), "sum(n)".to_string()]);
                assert_eq!(
                    out.rows,
                    vec![
                        vec![CellValue::String("a".to_string()), CellValue::Number(2.0)],
                        vec![CellValue::String("b".to_string()), CellValue::Number(4.0)],
                    ]
                );
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn sort_desc_with_limit() {
        let expr = QueryExpression {
            select: Some(vec!["city".to_string()]),
            sort: Some(SortSpec {
                column: "pop".to_string(),
                direction: SortDirection::Desc,
            }),
            limit: Some(2),
            ..Default::default()
        };
        let result = execute(&cities(), &expr, &ExecutionLimits::default()).unwrap();
        assert_eq!(
            result.output,
            QueryOutput::Column(vec![
                CellValue::String("Paris".to_string()),
                CellValue::String("Marseille".to_string()),
            ])
        );
    }

    #[test]
    fn row_scan_budget_is_enforced() {
        let limits = ExecutionLimits {
            max_rows_scanned: 2,
            ..Default::default()
        };
        let expr = QueryExpression::default();
        assert!(matches!(
            execute(&cities(), &expr, &limits),
            Err(QueryError::LimitExceeded(_))
        ));
    }

    #[test]
    fn zero_time_budget_is_enforced() {
        let limits = ExecutionLimits {
            max_execution_time: Duration::ZERO,
            ..Default::default()
        };
        let expr = QueryExpression::default();
        assert!(matches!(
            execute(&cities(), &expr, &limits),
            Err(QueryError::LimitExceeded(_))
        ));
    }

    #[test]
    fn unknown_column_never_executes() {
        let expr = QueryExpression {
            filter: Some(filter_eq("country", "France")),
            ..Default::default()
        };
        assert_eq!(
            execute(&cities(), &expr, &ExecutionLimits::default()),
            Err(QueryError::Schema("country".to_string()))
        );
    }

    #[test]
    fn count_without_column() {
        let expr = QueryExpression {
            filter: Some(Predicate::Compare {
                column: "pop".to_string(),
                op: CompOp::Gt,
                value: Literal::Number(600000.0),
            }),
            aggregate: Some(Aggregate {
                op: AggregateOp::Count,
                column: None,
                group_by: None,
            }),
            ..Default::default()
        };
        let result = execute(&cities(), &expr, &ExecutionLimits::default()).unwrap();
        assert_eq!(result.output, QueryOutput::Scalar(CellValue::Number(2.0)));
    }

    #[test]
    fn mean_of_no_rows_is_null() {
        let expr = QueryExpression {
            filter: Some(filter_eq("city", "Nice")),
            aggregate: Some(Aggregate {
                op: AggregateOp::Mean,
                column: Some("pop".to_string()),
                group_by: None,
            }),
            ..Default::default()
        };
        let result = execute(&cities(), &expr, &ExecutionLimits::default()).unwrap();
        assert_eq!(result.output, QueryOutput::Scalar(CellValue::Null));
    }
}
