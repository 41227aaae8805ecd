#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::core::config::service::LlmConfig;
    use crate::llm::testing::ScriptedProvider;
    use crate::llm::{ChatMessage, LlmService};

    #[tokio::test]
    async fn generate_uses_configured_model_and_returns_text() {
        let provider = Arc::new(ScriptedProvider::new(3));
        provider.push_reply("hello back");

        let service = LlmService::new(provider.clone(), LlmConfig::default());
        let out = service
            .generate(vec![ChatMessage::user("hello")])
            .await
            .unwrap();
        assert_eq!(out, "hello back");

        let requests = provider.chat_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].content, "hello");
    }

    #[tokio::test]
    #[ignore]
    async fn live_openai_compat_connection() {
        use crate::llm::provider::LlmProvider;
        use crate::llm::{ChatRequest, OpenAiCompatProvider};

        let provider = OpenAiCompatProvider::new("http://localhost:1234".to_string(), None);

        let healthy = provider.health_check().await.unwrap();
        println!("provider healthy: {healthy}");

        let req = ChatRequest::new(vec![ChatMessage::user("Hello")]);
        match provider.chat(req, "default").await {
            Ok(response) => println!("chat response: {response}"),
            Err(e) => println!("chat error: {e}"),
        }
    }
}
