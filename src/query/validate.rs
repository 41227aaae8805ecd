//! Pre-execution validation of a query expression against a table schema.
//!
//! Every column reference is resolved here; the sandbox never sees an
//! expression with an unknown column or an impossible operand type. The
//! error text doubles as the feedback quoted back to the planner on retry.

use crate::core::errors::QueryError;
use crate::table::schema::{ColumnType, Schema};
use super::expr::{Aggregate, AggregateOp, CompOp, Literal, Predicate, QueryExpression};

pub fn validate(expr: &QueryExpression, schema: &Schema) -> Result<(), QueryError> {
    if let Some(filter) = &expr.filter {
        validate_predicate(filter, schema)?;
    }

    if let Some(select) = &expr.select {
        if select.is_empty() {
            return Err(QueryError::UnsupportedOperator(
                "select must name at least one column".to_string(),
            ));
        }
        for name in select {
            require_column(schema, name)?;
        }
    }

    if let Some(aggregate) = &expr.aggregate {
        validate_aggregate(aggregate, schema)?;
        if expr.select.is_some() {
            return Err(QueryError::UnsupportedOperator(
                "select cannot be combined with aggregate".to_string(),
            ));
        }
        if expr.sort.is_some() {
            return Err(QueryError::UnsupportedOperator(
                "sort cannot be combined with aggregate".to_string(),
            ));
        }
    }

    if let Some(sort) = &expr.sort {
        require_column(schema, &sort.column)?;
    }

    Ok(())
}

fn validate_predicate(predicate: &Predicate, schema: &Schema) -> Result<(), QueryError> {
    match predicate {
        Predicate::Compare { column, op, value } => {
            let ty = require_column(schema, column)?;
            check_operand(column, ty, *op, value)
        }
        Predicate::And(left, right) | Predicate::Or(left, right) => {
            validate_predicate(left, schema)?;
            validate_predicate(right, schema)
        }
        Predicate::Not(inner) => validate_predicate(inner, schema),
    }
}

fn validate_aggregate(aggregate: &Aggregate, schema: &Schema) -> Result<(), QueryError> {
    if let Some(group_by) = &aggregate.group_by {
        require_column(schema, group_by)?;
    }

    match (&aggregate.op, &aggregate.column) {
        (AggregateOp::Count, _) => {
            if let Some(column) = &aggregate.column {
                require_column(schema, column)?;
            }
            Ok(())
        }
        (op, None) => Err(QueryError::UnsupportedOperator(format!(
            "aggregate {op} requires a column"
        ))),
        (op, Some(column)) => {
            let ty = require_column(schema, column)?;
            match (op, ty) {
                (AggregateOp::Sum | AggregateOp::Mean, ColumnType::Number) => Ok(()),
                (AggregateOp::Min | AggregateOp::Max, ColumnType::Number | ColumnType::Datetime) => {
                    Ok(())
                }
                (op, ty) => Err(QueryError::Type(format!(
                    "aggregate {op} not applicable to {ty} column '{column}'"
                ))),
            }
        }
    }
}

fn check_operand(
    column: &str,
    ty: ColumnType,
    op: CompOp,
    value: &Literal,
) -> Result<(), QueryError> {
    match (ty, value) {
        (ColumnType::Number, Literal::Number(_)) => Ok(()),
        (ColumnType::String, Literal::String(_)) => Ok(()),
        (ColumnType::Datetime, Literal::String(_)) => Ok(()),
        (ColumnType::Boolean, Literal::Boolean(_)) => {
            if op.is_ordering() {
                Err(QueryError::Type(format!(
                    "ordering comparison {op} not applicable to boolean column '{column}'"
                )))
            } else {
                Ok(())
            }
        }
        (ty, value) => Err(QueryError::Type(format!(
            "cannot compare {ty} column '{column}' with {value}"
        ))),
    }
}

fn require_column(schema: &Schema, name: &str) -> Result<ColumnType, QueryError> {
    schema
        .column(name)
        .map(|c| c.ty)
        .ok_or_else(|| QueryError::Schema(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::schema::Column;

    fn schema() -> Schema {
        Schema {
            columns: vec![
                Column {
                    name: "city".to_string(),
                    ty: ColumnType::String,
                },
                Column {
                    name: "pop".to_string(),
                    ty: ColumnType::Number,
                },
                Column {
                    name: "active".to_string(),
                    ty: ColumnType::Boolean,
                },
            ],
        }
    }

    #[test]
    fn unknown_column_is_a_schema_error() {
        let expr = QueryExpression {
            select: Some(vec!["population".to_string()]),
            ..Default::default()
        };
        assert_eq!(
            validate(&expr, &schema()),
            Err(QueryError::Schema("population".to_string()))
        );
    }

    #[test]
    fn sum_on_string_column_is_a_type_error() {
        let expr = QueryExpression {
            aggregate: Some(Aggregate {
                op: AggregateOp::Sum,
                column: Some("city".to_string()),
                group_by: None,
            }),
            ..Default::default()
        };
        assert!(matches!(validate(&expr, &schema()), Err(QueryError::Type(_))));
    }

    #[test]
    fn ordering_on_boolean_is_a_type_error() {
        let expr = QueryExpression {
            filter: Some(Predicate::Compare {
                column: "active".to_string(),
                op: CompOp::Lt,
                value: Literal::Boolean(true),
            }),
            ..Default::default()
        };
        assert!(matches!(validate(&expr, &schema()), Err(QueryError::Type(_))));
    }

    #[test]
    fn aggregate_with_sort_is_unsupported() {
        let expr = QueryExpression {
            aggregate: Some(Aggregate {
                op: AggregateOp::Count,
                column: None,
                group_by: None,
            }),
            sort: Some(crate::query::expr::SortSpec {
                column: "pop".to_string(),
                direction: Default::default(),
            }),
            ..Default::default()
        };
        assert!(matches!(
            validate(&expr, &schema()),
            Err(QueryError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn valid_expression_passes() {
        let expr = QueryExpression {
            filter: Some(Predicate::Compare {
                column: "city".to_string(),
                op: CompOp::Eq,
                value: Literal::String("Lyon".to_string()),
            }),
            select: Some(vec!["pop".to_string()]),
            ..Default::default()
        };
        assert!(validate(&expr, &schema()).is_ok());
    }
}
