//! Request, response, and retrieval models for the RAG query flow.

use serde::{Deserialize, Serialize};

use super::conversation::Message;
use crate::domain::errors::ValidationError;

/// A RAG query as accepted at the outer boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagRequest {
    /// The user's question
    pub query: String,

    /// Conversation to continue; a new one is started when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl RagRequest {
    pub fn new(query: String, conversation_id: Option<String>) -> Result<Self, ValidationError> {
        if query.trim().is_empty() {
            return Err(ValidationError("query must not be empty".to_string()));
        }
        Ok(Self {
            query,
            conversation_id,
        })
    }
}

/// Where a retrieved chunk came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    /// Object URI of the source document, when the service reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Relevance score assigned by the vector search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Standardized response for RAG queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    /// The generated answer
    pub response: String,

    /// Retrieved document chunks backing the answer
    pub sources: Vec<SourceRef>,

    /// Conversation this exchange belongs to
    pub conversation_id: String,

    /// Model that produced the answer
    pub model_used: String,
}

/// One chunk returned by knowledge-base retrieval.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub uri: Option<String>,
    pub score: Option<f64>,
}

impl RetrievedChunk {
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            uri: self.uri.clone(),
            score: self.score,
        }
    }
}

/// A page of retrieval results.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub chunks: Vec<RetrievedChunk>,
    pub next_token: Option<String>,
}

/// An ingestion job as reported by the knowledge-base service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: String,
    pub status: String,
}

impl IngestionJob {
    /// Whether the service will make no further progress on this job.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "COMPLETE" | "FAILED" | "STOPPED")
    }
}

/// A fully assembled generation request, ready for a specific model family
/// to encode.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_rejected() {
        assert!(RagRequest::new("  ".to_string(), None).is_err());
        assert!(RagRequest::new("what is in the docs?".to_string(), None).is_ok());
    }

    #[test]
    fn test_ingestion_job_terminal_states() {
        for status in ["COMPLETE", "FAILED", "STOPPED"] {
            let job = IngestionJob {
                id: "job-1".to_string(),
                status: status.to_string(),
            };
            assert!(job.is_terminal());
        }

        let job = IngestionJob {
            id: "job-1".to_string(),
            status: "IN_PROGRESS".to_string(),
        };
        assert!(!job.is_terminal());
    }
}
