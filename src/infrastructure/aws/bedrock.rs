//! Bedrock runtime adapters: knowledge-base retrieval, ingestion job
//! control, and direct model invocation.
//!
//! Request and response bodies for model invocation follow each model
//! family's native schema; the Claude body carries the full assembled
//! system prompt while Llama receives everything as a chat message list.

use async_trait::async_trait;
use aws_sdk_bedrockagent::error::ProvideErrorMetadata;
use aws_sdk_bedrockagentruntime::types::{
    KnowledgeBaseQuery, KnowledgeBaseRetrievalConfiguration,
    KnowledgeBaseVectorSearchConfiguration,
};
use aws_sdk_bedrockruntime::primitives::Blob;
use serde_json::json;
use tracing::{debug, info};

use crate::domain::errors::{GenerationError, KnowledgeBaseError};
use crate::domain::models::{GenerationRequest, IngestionJob, Retrieval, RetrievedChunk};
use crate::domain::ports::{KnowledgeBase, TextGenerator};
use crate::infrastructure::retry::RetryPolicy;

/// The service caps vector-search retrieval at ten results per call.
const MAX_RETRIEVAL_RESULTS: i32 = 10;

fn kb_error<E>(err: &E) -> KnowledgeBaseError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    KnowledgeBaseError::Api {
        code: err.code().unwrap_or("Unknown").to_string(),
        message: err
            .message()
            .map_or_else(|| format!("{err:?}"), ToString::to_string),
    }
}

fn generation_error<E>(err: &E) -> GenerationError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    GenerationError::Api {
        code: err.code().unwrap_or("Unknown").to_string(),
        message: err
            .message()
            .map_or_else(|| format!("{err:?}"), ToString::to_string),
    }
}

/// Knowledge-base operations against a deployed stack.
pub struct BedrockKnowledgeBase {
    agent: aws_sdk_bedrockagent::Client,
    agent_runtime: aws_sdk_bedrockagentruntime::Client,
    knowledge_base_id: String,
    data_source_id: String,
    retry: RetryPolicy,
}

impl BedrockKnowledgeBase {
    pub fn new(
        env: &super::AwsEnv,
        knowledge_base_id: String,
        data_source_id: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            agent: aws_sdk_bedrockagent::Client::new(&env.sdk),
            agent_runtime: aws_sdk_bedrockagentruntime::Client::new(&env.sdk),
            knowledge_base_id,
            data_source_id,
            retry,
        }
    }

    async fn retrieve_once(
        &self,
        query: &str,
        max_results: i32,
        next_token: Option<&str>,
    ) -> Result<Retrieval, KnowledgeBaseError> {
        let retrieval_query = KnowledgeBaseQuery::builder()
            .text(query)
            .build();

        let configuration = KnowledgeBaseRetrievalConfiguration::builder()
            .vector_search_configuration(
                KnowledgeBaseVectorSearchConfiguration::builder()
                    .number_of_results(max_results.min(MAX_RETRIEVAL_RESULTS))
                    .build(),
            )
            .build();

        let mut request = self
            .agent_runtime
            .retrieve()
            .knowledge_base_id(&self.knowledge_base_id)
            .retrieval_query(retrieval_query)
            .retrieval_configuration(configuration);
        if let Some(token) = next_token {
            request = request.next_token(token);
        }

        let output = request
            .send()
            .await
            .map_err(|e| kb_error(&aws_sdk_bedrockagentruntime::Error::from(e)))?;

        let chunks = output
            .retrieval_results()
            .iter()
            .map(|result| RetrievedChunk {
                content: result
                    .content()
                    .map(|content| content.text())
                    .unwrap_or_default()
                    .to_string(),
                uri: result
                    .location()
                    .and_then(|location| location.s3_location())
                    .and_then(|s3| s3.uri())
                    .map(ToString::to_string),
                score: result.score(),
            })
            .collect();

        Ok(Retrieval {
            chunks,
            next_token: output.next_token().map(ToString::to_string),
        })
    }
}

#[async_trait]
impl KnowledgeBase for BedrockKnowledgeBase {
    async fn retrieve(
        &self,
        query: &str,
        max_results: i32,
        next_token: Option<String>,
    ) -> Result<Retrieval, KnowledgeBaseError> {
        info!(knowledge_base = %self.knowledge_base_id, "Retrieving from knowledge base");

        let retrieval = self
            .retry
            .execute(|| self.retrieve_once(query, max_results, next_token.as_deref()))
            .await?;

        info!(results = retrieval.chunks.len(), "Retrieved results");
        Ok(retrieval)
    }

    async fn start_ingestion_job(&self) -> Result<IngestionJob, KnowledgeBaseError> {
        info!(knowledge_base = %self.knowledge_base_id, "Starting ingestion job");

        let output = self
            .retry
            .execute(|| async {
                self.agent
                    .start_ingestion_job()
                    .knowledge_base_id(&self.knowledge_base_id)
                    .data_source_id(&self.data_source_id)
                    .send()
                    .await
                    .map_err(|e| kb_error(&aws_sdk_bedrockagent::Error::from(e)))
            })
            .await?;

        let job = output
            .ingestion_job()
            .ok_or(KnowledgeBaseError::MissingField("ingestionJob"))?;
        let job = IngestionJob {
            id: job.ingestion_job_id().to_string(),
            status: job.status().as_str().to_string(),
        };

        info!(job = %job.id, status = %job.status, "Ingestion job started");
        Ok(job)
    }

    async fn ingestion_job(&self, job_id: &str) -> Result<IngestionJob, KnowledgeBaseError> {
        let output = self
            .retry
            .execute(|| async {
                self.agent
                    .get_ingestion_job()
                    .knowledge_base_id(&self.knowledge_base_id)
                    .data_source_id(&self.data_source_id)
                    .ingestion_job_id(job_id)
                    .send()
                    .await
                    .map_err(|e| kb_error(&aws_sdk_bedrockagent::Error::from(e)))
            })
            .await?;

        let job = output
            .ingestion_job()
            .ok_or(KnowledgeBaseError::MissingField("ingestionJob"))?;
        Ok(IngestionJob {
            id: job.ingestion_job_id().to_string(),
            status: job.status().as_str().to_string(),
        })
    }
}

/// Model families this stack knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelFamily {
    Claude,
    Llama,
}

impl ModelFamily {
    fn detect(model_id: &str) -> Result<Self, GenerationError> {
        let id = model_id.to_lowercase();
        if id.contains("claude") {
            Ok(Self::Claude)
        } else if id.contains("llama") {
            Ok(Self::Llama)
        } else {
            Err(GenerationError::UnsupportedModel(model_id.to_string()))
        }
    }
}

/// Claude receives only the latest user message; instructions, retrieved
/// context, and the earlier conversation all travel in the system prompt.
fn claude_request_body(request: &GenerationRequest) -> serde_json::Value {
    let split = request.messages.len().saturating_sub(1);
    let (history, latest) = request.messages.split_at(split);

    let mut system = request.system.clone().unwrap_or_default();
    if !history.is_empty() {
        system.push_str("\n\n## Conversation so far\n\n");
        for message in history {
            system.push_str(&format!("{}: {}\n", message.role.as_str(), message.content));
        }
    }

    let messages: Vec<serde_json::Value> = latest
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut body = json!({
        "anthropic_version": "bedrock-2023-05-31",
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "messages": messages,
    });
    if !system.is_empty() {
        body["system_prompt"] = json!(system);
    }
    body
}

fn parse_claude_response(bytes: &[u8]) -> Result<String, GenerationError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

    value["content"][0]["text"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| {
            GenerationError::MalformedResponse("response carries no content[0].text".to_string())
        })
}

/// Llama receives everything as a chat message list: instructions and
/// retrieved context as a system message, then the whole conversation.
fn llama_request_body(request: &GenerationRequest) -> serde_json::Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.extend(
        request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content })),
    );

    json!({
        "messages": messages,
        "temperature": request.temperature,
        "max_gen_len": request.max_tokens,
    })
}

fn parse_llama_response(bytes: &[u8]) -> Result<String, GenerationError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

    value["generation"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| {
            GenerationError::MalformedResponse("response carries no generation field".to_string())
        })
}

/// Direct model invocation through the Bedrock runtime.
pub struct BedrockGenerator {
    runtime: aws_sdk_bedrockruntime::Client,
}

impl BedrockGenerator {
    pub fn new(env: &super::AwsEnv) -> Self {
        Self {
            runtime: aws_sdk_bedrockruntime::Client::new(&env.sdk),
        }
    }
}

#[async_trait]
impl TextGenerator for BedrockGenerator {
    async fn generate(
        &self,
        model_id: &str,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError> {
        let family = ModelFamily::detect(model_id)?;
        let body = match family {
            ModelFamily::Claude => claude_request_body(request),
            ModelFamily::Llama => llama_request_body(request),
        };
        let bytes = serde_json::to_vec(&body)
            .map_err(|e| GenerationError::InvalidRequest(e.to_string()))?;

        debug!(model = %model_id, "Invoking model");

        let output = self
            .runtime
            .invoke_model()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(bytes))
            .send()
            .await
            .map_err(|e| generation_error(&aws_sdk_bedrockruntime::Error::from(e)))?;

        let payload = output.body().as_ref();
        match family {
            ModelFamily::Claude => parse_claude_response(payload),
            ModelFamily::Llama => parse_llama_response(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Message;

    fn request() -> GenerationRequest {
        GenerationRequest {
            system: Some("You are helpful.".to_string()),
            messages: vec![Message::user("What is in the docs?")],
            temperature: 0.7,
            max_tokens: 2048,
        }
    }

    #[test]
    fn test_detect_model_family() {
        assert_eq!(
            ModelFamily::detect("anthropic.claude-3-haiku-20240307-v1:0").unwrap(),
            ModelFamily::Claude
        );
        assert_eq!(
            ModelFamily::detect("meta.llama3-1-8b-instruct-v1:0").unwrap(),
            ModelFamily::Llama
        );
        assert!(matches!(
            ModelFamily::detect("mistral.mistral-large-2402-v1:0"),
            Err(GenerationError::UnsupportedModel(_))
        ));
    }

    #[test]
    fn test_claude_body_carries_system_prompt() {
        let body = claude_request_body(&request());

        assert_eq!(body["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["system_prompt"], "You are helpful.");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "What is in the docs?");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_claude_body_folds_history_into_system_prompt() {
        let mut req = request();
        req.messages = vec![
            Message::user("first question"),
            Message::assistant("first answer"),
            Message::user("second question"),
        ];

        let body = claude_request_body(&req);

        let system = body["system_prompt"].as_str().unwrap();
        assert!(system.contains("user: first question"));
        assert!(system.contains("assistant: first answer"));
        assert!(!system.contains("second question"));

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1, "only the latest query is a message");
        assert_eq!(messages[0]["content"], "second question");
    }

    #[test]
    fn test_claude_body_omits_absent_system_prompt() {
        let mut req = request();
        req.system = None;
        let body = claude_request_body(&req);
        assert!(body.get("system_prompt").is_none());
    }

    #[test]
    fn test_llama_body_inlines_system_as_message() {
        let body = llama_request_body(&request());

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are helpful.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_gen_len"], 2048);
        assert!(body.get("anthropic_version").is_none());
    }

    #[test]
    fn test_parse_claude_response() {
        let payload = serde_json::to_vec(&json!({
            "content": [{ "type": "text", "text": "The documents cover shipping." }],
        }))
        .unwrap();

        assert_eq!(
            parse_claude_response(&payload).unwrap(),
            "The documents cover shipping."
        );
    }

    #[test]
    fn test_parse_claude_response_rejects_empty_content() {
        let payload = serde_json::to_vec(&json!({ "content": [] })).unwrap();
        assert!(matches!(
            parse_claude_response(&payload),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_llama_response() {
        let payload = serde_json::to_vec(&json!({ "generation": "Answer text" })).unwrap();
        assert_eq!(parse_llama_response(&payload).unwrap(), "Answer text");
    }
}
