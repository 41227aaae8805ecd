//! Final answer assembly for both pipelines.
//!
//! The composer is the only place model prose is produced, and it is
//! skipped entirely in the two cases where generation adds nothing: a
//! scalar query result is stringified directly, and an empty retrieval
//! gets a fixed insufficient-information reply so the model never answers
//! from no context.

use crate::core::errors::ModelError;
use crate::llm::{ChatMessage, LlmService};
use crate::query::sandbox::{QueryOutput, QueryResult};
use crate::rag::context_builder;
use crate::rag::index::RetrievalResult;

pub const INSUFFICIENT_CONTEXT_ANSWER: &str = "I don't have that information in the data.";

const DATA_ONLY_SYSTEM_PROMPT: &str = "You are a data analyst answering questions about tabular data.\n\
Rules:\n\
- Use ONLY the information provided below\n\
- If the answer is not present, say: \"I don't have that information in the data.\"\n\
- Do not guess, speculate, or use outside knowledge";

pub struct AnswerComposer {
    llm: LlmService,
    max_context_chars: usize,
}

impl AnswerComposer {
    pub fn new(llm: LlmService, max_context_chars: usize) -> Self {
        Self {
            llm,
            max_context_chars,
        }
    }

    /// Renders a query result into prose. Scalars skip the model call:
    /// there is nothing to generate for a single value.
    pub async fn compose_from_query_result(
        &self,
        question: &str,
        result: &QueryResult,
    ) -> Result<String, ModelError> {
        if let QueryOutput::Scalar(value) = &result.output {
            if value.is_null() {
                return Ok(INSUFFICIENT_CONTEXT_ANSWER.to_string());
            }
            return Ok(value.to_string());
        }

        let rendered = render_output(&result.output);
        let messages = vec![
            ChatMessage::system(DATA_ONLY_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Query result:\n{rendered}\n\nQuestion:\n{question}\n\nAnswer concisely using only the query result."
            )),
        ];
        let answer = self.llm.generate(messages).await?;
        Ok(answer.trim().to_string())
    }

    /// Answers from retrieved context. An empty retrieval returns the fixed
    /// insufficient-information reply without invoking the model.
    pub async fn compose_from_context(
        &self,
        question: &str,
        retrieval: &RetrievalResult,
    ) -> Result<String, ModelError> {
        if retrieval.is_empty() {
            return Ok(INSUFFICIENT_CONTEXT_ANSWER.to_string());
        }

        let context = context_builder::build_context(retrieval, self.max_context_chars);
        let messages = vec![
            ChatMessage::system(DATA_ONLY_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Context:\n{context}\n\nQuestion:\n{question}\n\nAnswer:"
            )),
        ];
        let answer = self.llm.generate(messages).await?;
        Ok(answer.trim().to_string())
    }
}

fn render_output(output: &QueryOutput) -> String {
    match output {
        QueryOutput::Scalar(value) => value.to_string(),
        QueryOutput::Column(values) => values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
        QueryOutput::Table(table) => {
            let mut lines = vec![table.columns.join(" | ")];
            lines.extend(table.rows.iter().map(|row| {
                row.iter()
                    .map(|cell| cell.to_string())
                    .collect::<Vec<_>>()
                    .join(" | ")
            }));
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::config::service::LlmConfig;
    use crate::llm::testing::ScriptedProvider;
    use crate::query::expr::QueryExpression;
    use crate::query::sandbox::ResultTable;
    use crate::rag::chunker::Document;
    use crate::rag::index::ScoredDocument;
    use crate::table::schema::CellValue;

    fn composer_with(provider: Arc<ScriptedProvider>) -> AnswerComposer {
        AnswerComposer::new(LlmService::new(provider, LlmConfig::default()), 4000)
    }

    fn scalar_result(value: CellValue) -> QueryResult {
        QueryResult {
            output: QueryOutput::Scalar(value),
            provenance: QueryExpression::default(),
        }
    }

    #[tokio::test]
    async fn scalar_result_skips_the_model() {
        let provider = Arc::new(ScriptedProvider::new(3));
        let composer = composer_with(provider.clone());

        let answer = composer
            .compose_from_query_result("population of Lyon?", &scalar_result(CellValue::Number(513000.0)))
            .await
            .unwrap();

        assert_eq!(answer, "513000");
        assert!(provider.chat_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn table_result_goes_through_the_model() {
        let provider = Arc::new(ScriptedProvider::new(3));
        provider.push_reply("Paris is the largest.");
        let composer = composer_with(provider.clone());

        let result = QueryResult {
            output: QueryOutput::Table(ResultTable {
                columns: vec!["city".to_string(), "pop".to_string()],
                rows: vec![
                    vec![CellValue::String("Paris".to_string()), CellValue::Number(2148000.0)],
                    vec![CellValue::String("Lyon".to_string()), CellValue::Number(513000.0)],
                ],
            }),
            provenance: QueryExpression::default(),
        };

        let answer = composer
            .compose_from_query_result("largest city?", &result)
            .await
            .unwrap();
        assert_eq!(answer, "Paris is the largest.");

        let prompts = provider.sent_prompts();
        assert!(prompts[0].contains("Paris | 2148000"));
        assert!(prompts[0].contains("Lyon | 513000"));
    }

    #[tokio::test]
    async fn empty_retrieval_gets_fixed_reply_without_model_call() {
        let provider = Arc::new(ScriptedProvider::new(3));
        let composer = composer_with(provider.clone());

        let answer = composer
            .compose_from_context("anything?", &RetrievalResult::default())
            .await
            .unwrap();

        assert_eq!(answer, INSUFFICIENT_CONTEXT_ANSWER);
        assert!(provider.chat_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn context_answer_uses_every_retrieved_row() {
        let provider = Arc::new(ScriptedProvider::new(3));
        provider.push_reply("Paris has more people.");
        let composer = composer_with(provider.clone());

        let retrieval = RetrievalResult {
            matches: vec![
                ScoredDocument {
                    document: Document {
                        id: 0,
                        text: "city: Paris; pop: 2148000".to_string(),
                    },
                    score: 0.9,
                },
                ScoredDocument {
                    document: Document {
                        id: 1,
                        text: "city: Lyon; pop: 513000".to_string(),
                    },
                    score: 0.8,
                },
            ],
        };

        let answer = composer
            .compose_from_context("Which city has more people?", &retrieval)
            .await
            .unwrap();
        assert_eq!(answer, "Paris has more people.");

        let prompts = provider.sent_prompts();
        assert!(prompts[0].contains("city: Paris; pop: 2148000"));
        assert!(prompts[0].contains("city: Lyon; pop: 513000"));
    }

    #[tokio::test]
    async fn null_scalar_is_an_insufficient_information_answer() {
        let provider = Arc::new(ScriptedProvider::new(3));
        let composer = composer_with(provider.clone());

        let answer = composer
            .compose_from_query_result("mean of nothing?", &scalar_result(CellValue::Null))
            .await
            .unwrap();
        assert_eq!(answer, INSUFFICIENT_CONTEXT_ANSWER);
    }
}
