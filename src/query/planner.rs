//! Turns a natural-language question into a validated query expression.
//!
//! The model is asked for a JSON object in the restricted grammar, never
//! free-form code. Its output goes through a validation ladder (JSON
//! extraction, grammar schema, decode, table-schema check) and the failure
//! text is quoted back into the retry prompt. Unvalidated output is never
//! returned to a caller.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::errors::{PlanError, PlanningFailure};
use crate::llm::{ChatMessage, LlmService};
use crate::table::schema::{Schema, Table};
use super::expr::QueryExpression;
use super::validate;

const PLANNER_SYSTEM_PROMPT: &str = "You are a query planner for tabular data.\n\
Translate the user's question into a single JSON object in the restricted \
query grammar described by the provided JSON schema.\n\
Use only column names that appear in the column list.\n\
Do not add any text before or after the JSON object.";

pub struct QueryPlanner {
    llm: LlmService,
    max_retries: usize,
    grammar: serde_json::Value,
    validator: Option<jsonschema::Validator>,
}

impl QueryPlanner {
    pub fn new(llm: LlmService, max_retries: usize) -> Self {
        let grammar = serde_json::to_value(schemars::schema_for!(QueryExpression))
            .unwrap_or(serde_json::Value::Null);
        let validator = jsonschema::validator_for(&grammar).ok();
        if validator.is_none() {
            tracing::warn!("query grammar schema did not compile; relying on decode-time checks");
        }
        Self {
            llm,
            max_retries,
            grammar,
            validator,
        }
    }

    /// Plans a query for `question` against the table's schema, retrying on
    /// validation failures with the error fed back. Model transport errors
    /// abort immediately: retrying validation cannot fix an outage.
    pub async fn plan(
        &self,
        question: &str,
        table: &Table,
    ) -> Result<QueryExpression, PlanError> {
        let schema_block = describe_schema(table);

        let mut feedback: Option<String> = None;
        let mut last_attempt: Option<String> = None;

        for attempt in 0..=self.max_retries {
            let messages = self.build_messages(question, &schema_block, feedback.as_deref());
            let raw = self.llm.generate(messages).await.map_err(PlanError::Model)?;
            let raw = raw.trim().to_string();

            match self.parse_and_validate(&raw, &table.schema) {
                Ok(expr) => return Ok(expr),
                Err(reason) => {
                    tracing::debug!(attempt, %reason, "query plan rejected");
                    last_attempt = Some(raw);
                    feedback = Some(reason);
                }
            }
        }

        Err(PlanningFailure {
            reason: feedback.unwrap_or_else(|| "no attempt produced a valid plan".to_string()),
            last_attempt,
        }
        .into())
    }

    fn build_messages(
        &self,
        question: &str,
        schema_block: &str,
        feedback: Option<&str>,
    ) -> Vec<ChatMessage> {
        let mut user = format!(
            "Columns:\n{}\n\nQuery grammar (JSON schema):\n{}\n\nQuestion:\n{}",
            schema_block, self.grammar, question
        );
        if let Some(feedback) = feedback {
            user.push_str(&format!(
                "\n\nYour previous attempt was rejected: {feedback}\nReturn a corrected JSON object."
            ));
        }

        vec![
            ChatMessage::system(PLANNER_SYSTEM_PROMPT),
            ChatMessage::user(user),
        ]
    }

    fn parse_and_validate(&self, raw: &str, schema: &Schema) -> Result<QueryExpression, String> {
        let json_text =
            extract_json(raw).ok_or_else(|| "response contains no JSON object".to_string())?;

        let value: serde_json::Value =
            serde_json::from_str(&json_text).map_err(|e| format!("invalid JSON: {e}"))?;

        if let Some(validator) = &self.validator {
            if let Some(error) = validator.iter_errors(&value).next() {
                return Err(format!(
                    "does not match the query grammar at {}: {}",
                    error.instance_path(), error
                ));
            }
        }

        let expr: QueryExpression = serde_json::from_value(value)
            .map_err(|e| format!("not a valid query expression: {e}"))?;

        validate::validate(&expr, schema).map_err(|e| e.to_string())?;
        Ok(expr)
    }
}

/// Column names, types and a small sample of values: the model sees the
/// real vocabulary of the table without seeing the whole table.
fn describe_schema(table: &Table) -> String {
    table
        .schema
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let samples: Vec<String> = table
                .rows
                .iter()
                .filter_map(|row| {
                    let cell = &row[idx];
                    (!cell.is_null()).then(|| cell.to_string())
                })
                .take(3)
                .collect();
            if samples.is_empty() {
                format!("- {} ({})", column.name, column.ty)
            } else {
                format!("- {} ({}), e.g. {}", column.name, column.ty, samples.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_json(raw: &str) -> Option<String> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fence regex compiles")
    });

    if let Some(captures) = fence.captures(raw) {
        return Some(captures[1].to_string());
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| raw[start..=end].to_string())
}
