use crate::agent_prompts::PromptBuilder;
use crate::error::Result;
use crate::llm::Generator;
use std::sync::Arc;
use tracing::info;

/// Shown when the explanation call fails after a verified result.
pub const FALLBACK_EXPLANATION: &str =
    "An error occurred while trying to generate an explanation for the SQL query.";

pub struct Explainer {
    generator: Arc<dyn Generator>,
    prompts: PromptBuilder,
}

impl Explainer {
    pub fn new(generator: Arc<dyn Generator>, prompts: PromptBuilder) -> Self {
        Self { generator, prompts }
    }

    /// Plain-language explanation of a verified query.
    pub async fn explain(&self, question: &str, sql: &str) -> Result<String> {
        let request = self.prompts.explain(question, sql);
        let explanation = self.generator.generate(&request).await?;
        info!(chars = explanation.len(), "Explanation received");
        Ok(explanation.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_prompts::{GenerationRequest, RequestPurpose};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Generator for Echo {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            assert_eq!(request.purpose, RequestPurpose::Explain);
            Ok(format!("  explains: {}  ", request.attachments.join(" ")))
        }
    }

    #[tokio::test]
    async fn test_explain_uses_sql() {
        let explainer = Explainer::new(Arc::new(Echo), PromptBuilder::new(10));
        let text = explainer.explain("bright stars", "SELECT TOP 10 ra FROM Star").await.unwrap();
        assert!(text.starts_with("explains:"));
        assert!(text.contains("SELECT TOP 10 ra FROM Star"));
    }
}
