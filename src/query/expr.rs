//! AST for the restricted query grammar.
//!
//! This is the only shape model output is ever decoded into: a closed set
//! of operators (filter, select, aggregate, sort, limit) with no function
//! calls, no imports, no I/O. The planner validates instances against the
//! derived JSON schema before decoding, and against the table schema before
//! execution.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A complete query: optional filter, then either an aggregate or a
/// select/sort/limit projection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QueryExpression {
    #[serde(default)]
    pub filter: Option<Predicate>,
    #[serde(default)]
    pub select: Option<Vec<String>>,
    #[serde(default)]
    pub aggregate: Option<Aggregate>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub limit: Option<u64>,
}

/// The WHERE tree: comparisons combined with and/or/not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    Compare {
        column: String,
        op: CompOp,
        value: Literal,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CompOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompOp {
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Lt | Self::Lte | Self::Gt | Self::Gte)
    }
}

/// Literal values in predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Literal {
    Number(f64),
    Boolean(bool),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Aggregate {
    pub op: AggregateOp,
    /// Not required for `count`.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub group_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    Sum,
    Mean,
    Count,
    Min,
    Max,
}

impl std::fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sum => write!(f, "sum"),
            Self::Mean => write!(f, "mean"),
            Self::Count => write!(f, "count"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SortSpec {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl std::fmt::Display for CompOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eq => write!(f, "=="),
            Self::Neq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::Lte => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::Gte => write!(f, ">="),
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "'{s}'"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_roundtrip() {
        let expr = QueryExpression {
            filter: Some(Predicate::And(
                Box::new(Predicate::Compare {
                    column: "city".to_string(),
                    op: CompOp::Eq,
                    value: Literal::String("Lyon".to_string()),
                }),
                Box::new(Predicate::Compare {
                    column: "pop".to_string(),
                    op: CompOp::Gt,
                    value: Literal::Number(1000.0),
                }),
            )),
            select: Some(vec!["pop".to_string()]),
            aggregate: None,
            sort: Some(SortSpec {
                column: "pop".to_string(),
                direction: SortDirection::Desc,
            }),
            limit: Some(10),
        };

        let json = serde_json::to_string(&expr).expect("serialize");
        let back: QueryExpression = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(expr, back);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = r#"{"select": ["a"], "exec": "import os"}"#;
        assert!(serde_json::from_str::<QueryExpression>(raw).is_err());
    }

    #[test]
    fn model_shaped_json_decodes() {
        let raw = r#"{
            "filter": {"compare": {"column": "city", "op": "eq", "value": "Lyon"}},
            "select": ["pop"]
        }"#;
        let expr: QueryExpression = serde_json::from_str(raw).unwrap();
        assert_eq!(expr.select.as_deref(), Some(&["pop".to_string()][..]));
    }
}
