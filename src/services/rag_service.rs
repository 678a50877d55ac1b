//! Retrieval-and-generation orchestration.
//!
//! One query flows through: conversation resolution, knowledge-base
//! retrieval, prompt assembly, model invocation (with fallback), and
//! history recording. Retrieval and ranking stay behind the knowledge-base
//! port; this service only assembles and records.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::domain::models::{
    Config, GenerationRequest, Message, MessageRole, RagRequest, RagResponse, RetrievedChunk,
    SourceRef,
};
use crate::domain::ports::{KnowledgeBase, TextGenerator};
use crate::services::conversation_service::ConversationService;

const SYSTEM_INSTRUCTIONS: &str = "You are an assistant answering questions about a private \
document collection. Use the retrieved context below to answer. When the context does not \
contain the answer, say so rather than guessing, and cite context numbers ([Context 1], \
[Context 2], ...) when you rely on specific passages.";

/// Generation knobs lifted from configuration.
#[derive(Debug, Clone)]
pub struct RagSettings {
    pub default_model_id: String,
    pub fallback_model_id: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_results: i32,
}

impl RagSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_model_id: config.models.default_model_id.clone(),
            fallback_model_id: config.models.fallback_model_id.clone(),
            temperature: config.models.temperature,
            max_tokens: config.models.max_tokens,
            max_results: config.retrieval.max_results,
        }
    }
}

pub struct RagService {
    knowledge_base: Arc<dyn KnowledgeBase>,
    generator: Arc<dyn TextGenerator>,
    conversations: ConversationService,
    settings: RagSettings,
}

impl RagService {
    pub fn new(
        knowledge_base: Arc<dyn KnowledgeBase>,
        generator: Arc<dyn TextGenerator>,
        conversations: ConversationService,
        settings: RagSettings,
    ) -> Self {
        Self {
            knowledge_base,
            generator,
            conversations,
            settings,
        }
    }

    /// Answer a query against the knowledge base, maintaining conversation
    /// context across calls.
    pub async fn answer(&self, request: RagRequest) -> Result<RagResponse> {
        let (conversation_id, history) = self
            .conversations
            .get_or_create_history(request.conversation_id.as_deref())
            .await
            .context("Failed to load conversation history")?;

        let retrieval = self
            .knowledge_base
            .retrieve(&request.query, self.settings.max_results, None)
            .await
            .context("Knowledge base retrieval failed")?;

        info!(
            conversation = %conversation_id,
            chunks = retrieval.chunks.len(),
            "Assembling generation request"
        );

        let generation = self.build_request(&request.query, &history, &retrieval.chunks);
        let (model_used, response) = self.generate_with_fallback(&generation).await?;

        let sources: Vec<SourceRef> = retrieval.chunks.iter().map(RetrievedChunk::source_ref).collect();

        self.conversations
            .add_message(&conversation_id, MessageRole::User, request.query, None)
            .await
            .context("Failed to record user message")?;

        let metadata = serde_json::json!({
            "model_used": model_used,
            "sources": sources.iter().filter_map(|s| s.uri.clone()).collect::<Vec<_>>(),
        });
        self.conversations
            .add_message(
                &conversation_id,
                MessageRole::Assistant,
                response.clone(),
                Some(metadata),
            )
            .await
            .context("Failed to record assistant message")?;

        Ok(RagResponse {
            response,
            sources,
            conversation_id,
            model_used,
        })
    }

    /// Assemble the generation request: instructions and retrieved context
    /// as the system prompt, the conversation plus the new query as the
    /// message list. Model-family folding happens in the generator.
    fn build_request(
        &self,
        query: &str,
        history: &[Message],
        chunks: &[RetrievedChunk],
    ) -> GenerationRequest {
        let mut system = SYSTEM_INSTRUCTIONS.to_string();

        if !chunks.is_empty() {
            system.push_str("\n\n## Retrieved context\n\n");
            for (i, chunk) in chunks.iter().enumerate() {
                let citation = chunk
                    .uri
                    .as_deref()
                    .map(|uri| format!(" (Source: {uri})"))
                    .unwrap_or_default();
                system.push_str(&format!("[Context {}]{citation}\n{}\n\n", i + 1, chunk.content));
            }
        }

        let mut messages = history.to_vec();
        messages.push(Message::user(query));

        GenerationRequest {
            system: Some(system),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        }
    }

    async fn generate_with_fallback(
        &self,
        request: &GenerationRequest,
    ) -> Result<(String, String)> {
        match self
            .generator
            .generate(&self.settings.default_model_id, request)
            .await
        {
            Ok(text) => Ok((self.settings.default_model_id.clone(), text)),
            Err(err) => {
                warn!(
                    model = %self.settings.default_model_id,
                    error = %err,
                    "Default model failed, trying fallback"
                );
                let text = self
                    .generator
                    .generate(&self.settings.fallback_model_id, request)
                    .await
                    .context("Both default and fallback model invocations failed")?;
                Ok((self.settings.fallback_model_id.clone(), text))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::domain::errors::{ConversationError, GenerationError, KnowledgeBaseError};
    use crate::domain::models::{IngestionJob, Retrieval, StoredMessage};
    use crate::domain::ports::ConversationStore;

    struct StubKnowledgeBase {
        chunks: Vec<RetrievedChunk>,
    }

    #[async_trait]
    impl KnowledgeBase for StubKnowledgeBase {
        async fn retrieve(
            &self,
            _query: &str,
            _max_results: i32,
            _next_token: Option<String>,
        ) -> Result<Retrieval, KnowledgeBaseError> {
            Ok(Retrieval {
                chunks: self
                    .chunks
                    .iter()
                    .map(|c| RetrievedChunk {
                        content: c.content.clone(),
                        uri: c.uri.clone(),
                        score: c.score,
                    })
                    .collect(),
                next_token: None,
            })
        }

        async fn start_ingestion_job(&self) -> Result<IngestionJob, KnowledgeBaseError> {
            unimplemented!("not used in these tests")
        }

        async fn ingestion_job(&self, _job_id: &str) -> Result<IngestionJob, KnowledgeBaseError> {
            unimplemented!("not used in these tests")
        }
    }

    /// Generator that fails for configured model ids and records requests.
    struct StubGenerator {
        failing_models: Vec<String>,
        requests: Mutex<Vec<(String, GenerationRequest)>>,
    }

    impl StubGenerator {
        fn new(failing_models: Vec<String>) -> Self {
            Self {
                failing_models,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for StubGenerator {
        async fn generate(
            &self,
            model_id: &str,
            request: &GenerationRequest,
        ) -> Result<String, GenerationError> {
            self.requests
                .lock()
                .unwrap()
                .push((model_id.to_string(), request.clone()));
            if self.failing_models.iter().any(|m| m == model_id) {
                Err(GenerationError::Api {
                    code: "InternalServerException".to_string(),
                    message: "boom".to_string(),
                })
            } else {
                Ok(format!("answer from {model_id}"))
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        messages: Mutex<Vec<(String, StoredMessage)>>,
    }

    #[async_trait]
    impl ConversationStore for MemoryStore {
        async fn put_message(
            &self,
            conversation_id: &str,
            message: &StoredMessage,
        ) -> Result<(), ConversationError> {
            self.messages
                .lock()
                .unwrap()
                .push((conversation_id.to_string(), message.clone()));
            Ok(())
        }

        async fn history(&self, conversation_id: &str) -> Result<Vec<Message>, ConversationError> {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| id == conversation_id)
                .map(|(_, m)| Message {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect())
        }

        async fn has_messages(&self, conversation_id: &str) -> Result<bool, ConversationError> {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .iter()
                .any(|(id, _)| id == conversation_id))
        }
    }

    fn settings() -> RagSettings {
        RagSettings::from_config(&Config::default())
    }

    fn service(
        chunks: Vec<RetrievedChunk>,
        failing_models: Vec<String>,
    ) -> (RagService, Arc<StubGenerator>, Arc<MemoryStore>) {
        let generator = Arc::new(StubGenerator::new(failing_models));
        let store = Arc::new(MemoryStore::default());
        let service = RagService::new(
            Arc::new(StubKnowledgeBase { chunks }),
            Arc::clone(&generator) as Arc<dyn TextGenerator>,
            ConversationService::new(Arc::clone(&store) as Arc<dyn ConversationStore>, 86_400),
            settings(),
        );
        (service, generator, store)
    }

    fn chunk(content: &str, uri: Option<&str>) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            uri: uri.map(ToString::to_string),
            score: Some(0.95),
        }
    }

    #[tokio::test]
    async fn test_answer_uses_default_model() {
        let (service, _, _) = service(vec![chunk("ctx", None)], vec![]);

        let response = service
            .answer(RagRequest::new("what is this?".to_string(), None).unwrap())
            .await
            .unwrap();

        assert_eq!(response.model_used, settings().default_model_id);
        assert!(response.response.contains("answer from"));
        assert!(response.conversation_id.starts_with("conv-"));
    }

    #[tokio::test]
    async fn test_answer_falls_back_when_default_fails() {
        let (service, generator, _) = service(
            vec![chunk("ctx", None)],
            vec![settings().default_model_id],
        );

        let response = service
            .answer(RagRequest::new("what is this?".to_string(), None).unwrap())
            .await
            .unwrap();

        assert_eq!(response.model_used, settings().fallback_model_id);
        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests.len(), 2, "default tried before fallback");
    }

    #[tokio::test]
    async fn test_answer_fails_when_both_models_fail() {
        let (service, _, _) = service(
            vec![],
            vec![settings().default_model_id, settings().fallback_model_id],
        );

        let result = service
            .answer(RagRequest::new("q".to_string(), None).unwrap())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_answer_records_both_messages_with_metadata() {
        let (service, _, store) = service(
            vec![chunk("ctx", Some("s3://bucket/documents/doc1.pdf"))],
            vec![],
        );

        service
            .answer(RagRequest::new("what is this?".to_string(), None).unwrap())
            .await
            .unwrap();

        let messages = store.messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].1.role, MessageRole::User);
        assert_eq!(messages[1].1.role, MessageRole::Assistant);

        let metadata = messages[1].1.metadata.as_ref().unwrap();
        assert_eq!(
            metadata["sources"][0],
            "s3://bucket/documents/doc1.pdf"
        );
        assert_eq!(metadata["model_used"], settings().default_model_id);
    }

    #[tokio::test]
    async fn test_request_carries_context_and_history() {
        let (service, generator, store) = service(
            vec![chunk("shipping policy text", Some("s3://b/documents/p.pdf"))],
            vec![],
        );

        // Seed an exchange, then ask a follow-up in the same conversation.
        let first = service
            .answer(RagRequest::new("first question".to_string(), None).unwrap())
            .await
            .unwrap();
        service
            .answer(
                RagRequest::new(
                    "follow-up question".to_string(),
                    Some(first.conversation_id.clone()),
                )
                .unwrap(),
            )
            .await
            .unwrap();

        let requests = generator.requests.lock().unwrap();
        let (_, second_request) = requests.last().unwrap();

        let system = second_request.system.as_ref().unwrap();
        assert!(system.contains("[Context 1]"));
        assert!(system.contains("shipping policy text"));
        assert!(system.contains("(Source: s3://b/documents/p.pdf)"));

        assert_eq!(second_request.messages.len(), 3, "history plus new query");
        assert_eq!(second_request.messages[0].content, "first question");
        assert_eq!(
            second_request.messages.last().unwrap().content,
            "follow-up question"
        );

        drop(requests);
        let messages = store.messages.lock().unwrap();
        assert_eq!(messages.len(), 4);
    }
}
