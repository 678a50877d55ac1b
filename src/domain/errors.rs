//! Error types for provisioning and runtime operations.
//!
//! Every API-shaped error carries the service error code so callers can
//! distinguish transient conditions (worth retrying with backoff) from
//! permanent ones (surfaced immediately).

use thiserror::Error;

/// Service error codes that indicate a transient condition.
const TRANSIENT_CODES: &[&str] = &[
    "ThrottlingException",
    "InternalServerException",
    "ServiceUnavailableException",
    "LimitExceededException",
    "ProvisionedThroughputExceededException",
    "TooManyRequestsException",
];

fn code_is_transient(code: &str) -> bool {
    TRANSIENT_CODES.contains(&code)
}

/// Classification used by the retry policy.
pub trait Transient {
    /// Returns true if the error is worth retrying
    fn is_transient(&self) -> bool;
}

/// Input validation failure at the outer boundary.
#[derive(Error, Debug)]
#[error("validation failed: {0}")]
pub struct ValidationError(pub String);

/// Errors from knowledge-base operations (retrieval, ingestion jobs).
#[derive(Error, Debug)]
pub enum KnowledgeBaseError {
    /// The service rejected or failed the call
    #[error("knowledge base API error ({code}): {message}")]
    Api { code: String, message: String },

    /// The request could not be expressed to the SDK
    #[error("invalid knowledge base request: {0}")]
    InvalidRequest(String),

    /// The service response lacked a field we depend on
    #[error("knowledge base response missing {0}")]
    MissingField(&'static str),
}

impl Transient for KnowledgeBaseError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Api { code, .. } => code_is_transient(code),
            Self::InvalidRequest(_) | Self::MissingField(_) => false,
        }
    }
}

/// Errors from direct model invocation.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Model id belongs to no supported family
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// The service rejected or failed the call
    #[error("model API error ({code}): {message}")]
    Api { code: String, message: String },

    /// The request could not be serialized
    #[error("invalid model request: {0}")]
    InvalidRequest(String),

    /// The model replied with a body we could not interpret
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
}

impl Transient for GenerationError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Api { code, .. } => code_is_transient(code),
            Self::UnsupportedModel(_) | Self::InvalidRequest(_) | Self::MalformedResponse(_) => {
                false
            }
        }
    }
}

/// Errors from conversation persistence.
#[derive(Error, Debug)]
pub enum ConversationError {
    /// The table operation was rejected or failed
    #[error("conversation store error ({code}): {message}")]
    Api { code: String, message: String },

    /// A stored item was missing required attributes
    #[error("malformed conversation item: {0}")]
    MalformedItem(String),
}

impl Transient for ConversationError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Api { code, .. } => code_is_transient(code),
            Self::MalformedItem(_) => false,
        }
    }
}

/// Errors raised while applying or destroying the stack.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// A cloud API call failed
    #[error("{service} API error ({code}): {message}")]
    Api {
        service: &'static str,
        code: String,
        message: String,
    },

    /// A resource definition could not be expressed to the SDK
    #[error("invalid resource definition: {0}")]
    Definition(String),

    /// A resource never reached the awaited state
    #[error("timed out waiting for {resource} to reach {state}")]
    WaitTimeout {
        resource: String,
        state: &'static str,
    },

    /// The API response lacked an identifier we must thread onward
    #[error("API response missing {0}")]
    MissingField(&'static str),

    /// A configured deployment package does not exist on disk
    #[error("deployment artifact not found: {0}")]
    MissingArtifact(String),
}

impl Transient for ProvisionError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Api { code, .. } => code_is_transient(code),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttling_is_transient() {
        let err = KnowledgeBaseError::Api {
            code: "ThrottlingException".to_string(),
            message: "slow down".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_access_denied_is_permanent() {
        let err = KnowledgeBaseError::Api {
            code: "AccessDeniedException".to_string(),
            message: "no".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_dynamo_throughput_exceeded_is_transient() {
        let err = ConversationError::Api {
            code: "ProvisionedThroughputExceededException".to_string(),
            message: "busy".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_unsupported_model_is_permanent() {
        assert!(!GenerationError::UnsupportedModel("mistral.large".to_string()).is_transient());
    }

    #[test]
    fn test_wait_timeout_is_permanent() {
        let err = ProvisionError::WaitTimeout {
            resource: "collection agentic-rag-vectors".to_string(),
            state: "ACTIVE",
        };
        assert!(!err.is_transient());
    }
}
