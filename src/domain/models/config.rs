use serde::{Deserialize, Serialize};

/// Main configuration structure for ragstack
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Stack identity
    #[serde(default)]
    pub stack: StackSettings,

    /// AWS account/region/profile selection
    #[serde(default)]
    pub aws: AwsSettings,

    /// Documents bucket settings
    #[serde(default)]
    pub bucket: BucketSettings,

    /// Knowledge base and vector index settings
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseSettings,

    /// Generation model settings
    #[serde(default)]
    pub models: ModelSettings,

    /// Retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalSettings,

    /// Conversation history settings
    #[serde(default)]
    pub conversations: ConversationSettings,

    /// Compute function settings
    #[serde(default)]
    pub functions: FunctionSettings,

    /// Reserved HTTP front for the retrieval function (disabled by default)
    #[serde(default)]
    pub http_api: HttpApiSettings,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Stack identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StackSettings {
    /// Stack name, used as the prefix for every resource name
    #[serde(default = "default_stack_name")]
    pub name: String,
}

fn default_stack_name() -> String {
    "agentic-rag".to_string()
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            name: default_stack_name(),
        }
    }
}

/// AWS environment selection. Region and account id fall back to the
/// standard SDK resolution chain when unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AwsSettings {
    /// Region override (otherwise AWS_REGION / profile chain)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Named credentials profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Account id override (otherwise resolved through STS)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Documents bucket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BucketSettings {
    /// Key prefix under which source documents live
    #[serde(default = "default_document_prefix")]
    pub document_prefix: String,

    /// Days after which uploaded documents expire
    #[serde(default = "default_expiry_days")]
    pub expiry_days: u32,
}

fn default_document_prefix() -> String {
    "documents/".to_string()
}

const fn default_expiry_days() -> u32 {
    30
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            document_prefix: default_document_prefix(),
            expiry_days: default_expiry_days(),
        }
    }
}

/// Knowledge base and vector index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KnowledgeBaseSettings {
    /// Embedding model the knowledge base binds to
    #[serde(default = "default_embedding_model_id")]
    pub embedding_model_id: String,

    /// Name of the vector index inside the collection
    #[serde(default = "default_vector_index_name")]
    pub vector_index_name: String,

    /// Field holding embedding vectors
    #[serde(default = "default_vector_field")]
    pub vector_field: String,

    /// Field holding raw text chunks
    #[serde(default = "default_text_field")]
    pub text_field: String,

    /// Field holding chunk metadata
    #[serde(default = "default_metadata_field")]
    pub metadata_field: String,
}

fn default_embedding_model_id() -> String {
    "amazon.titan-embed-text-v2:0".to_string()
}

fn default_vector_index_name() -> String {
    "rag-vector-index".to_string()
}

fn default_vector_field() -> String {
    "bedrock-knowledge-base-default-vector".to_string()
}

fn default_text_field() -> String {
    "AMAZON_BEDROCK_TEXT_CHUNK".to_string()
}

fn default_metadata_field() -> String {
    "AMAZON_BEDROCK_METADATA".to_string()
}

impl Default for KnowledgeBaseSettings {
    fn default() -> Self {
        Self {
            embedding_model_id: default_embedding_model_id(),
            vector_index_name: default_vector_index_name(),
            vector_field: default_vector_field(),
            text_field: default_text_field(),
            metadata_field: default_metadata_field(),
        }
    }
}

/// Generation model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelSettings {
    /// Model used for generation
    #[serde(default = "default_model_id")]
    pub default_model_id: String,

    /// Model tried when the default fails
    #[serde(default = "default_fallback_model_id")]
    pub fallback_model_id: String,

    /// Sampling temperature (0.0-1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model_id() -> String {
    "anthropic.claude-3-haiku-20240307-v1:0".to_string()
}

fn default_fallback_model_id() -> String {
    "meta.llama3-1-8b-instruct-v1:0".to_string()
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_max_tokens() -> u32 {
    2048
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            default_model_id: default_model_id(),
            fallback_model_id: default_fallback_model_id(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetrievalSettings {
    /// Maximum retrieved chunks per query (1-10)
    #[serde(default = "default_max_results")]
    pub max_results: i32,
}

const fn default_max_results() -> i32 {
    5
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

/// Conversation history settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConversationSettings {
    /// Seconds each stored message lives before the table expires it
    #[serde(default = "default_message_ttl_secs")]
    pub message_ttl_secs: i64,
}

const fn default_message_ttl_secs() -> i64 {
    86_400
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            message_ttl_secs: default_message_ttl_secs(),
        }
    }
}

/// Settings for both compute functions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FunctionSettings {
    /// Document-ingestion trigger function
    #[serde(default = "default_ingestion_function")]
    pub ingestion: FunctionEntry,

    /// Retrieval-and-generation handler function
    #[serde(default = "default_retrieval_function")]
    pub retrieval: FunctionEntry,
}

impl Default for FunctionSettings {
    fn default() -> Self {
        Self {
            ingestion: default_ingestion_function(),
            retrieval: default_retrieval_function(),
        }
    }
}

/// Settings for one compute function. The deployment package is built
/// outside this repository; `code_path` points at the prebuilt zip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FunctionEntry {
    /// Path to the prebuilt deployment package (zip)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_path: Option<String>,

    /// Handler entry point inside the package
    pub handler: String,

    /// Function runtime identifier
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Execution timeout in seconds (1-900)
    #[serde(default = "default_function_timeout_secs")]
    pub timeout_secs: i32,

    /// Memory allocation in MB
    #[serde(default = "default_function_memory_mb")]
    pub memory_mb: i32,
}

fn default_runtime() -> String {
    "python3.12".to_string()
}

const fn default_function_timeout_secs() -> i32 {
    300
}

const fn default_function_memory_mb() -> i32 {
    512
}

fn default_ingestion_function() -> FunctionEntry {
    FunctionEntry {
        code_path: None,
        handler: "lambda_src.handlers.knowledge_base_handler.handler".to_string(),
        runtime: default_runtime(),
        timeout_secs: default_function_timeout_secs(),
        memory_mb: default_function_memory_mb(),
    }
}

fn default_retrieval_function() -> FunctionEntry {
    FunctionEntry {
        code_path: None,
        handler: "lambda_src.handlers.rag_handler.handler".to_string(),
        runtime: default_runtime(),
        timeout_secs: default_function_timeout_secs(),
        memory_mb: default_function_memory_mb(),
    }
}

/// Reserved HTTP front. Off by default; the query flow is CLI-only until
/// the gateway integration is taken out of reserve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpApiSettings {
    #[serde(default)]
    pub enabled: bool,
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    2000
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional directory for rolling log files (stderr only when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
