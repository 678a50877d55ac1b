//! Stack synthesis.
//!
//! A `StackSpec` is the pure, deterministic expansion of configuration into
//! the full resource graph: names, ARNs, permission documents, environment
//! maps, and event filter rules. Synthesis performs no cloud calls; the
//! provisioner threads service-assigned identifiers (collection ARN,
//! knowledge base id) back into the policy builders at apply time.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::Config;
use super::policy::{PolicyDocument, PolicyStatement, RoleSpec};

/// Foundation-model ARN for a model id in a region.
pub fn model_arn(region: &str, model_id: &str) -> String {
    format!("arn:aws:bedrock:{region}::foundation-model/{model_id}")
}

/// Versioned, encrypted object-storage bucket holding source documents.
#[derive(Debug, Clone)]
pub struct BucketSpec {
    pub name: String,
    pub document_prefix: String,
    pub expiry_days: u32,
    pub versioned: bool,
    pub sse_algorithm: &'static str,
}

impl BucketSpec {
    pub fn arn(&self) -> String {
        format!("arn:aws:s3:::{}", self.name)
    }

    /// ARN matching every object under the bucket.
    pub fn objects_arn(&self) -> String {
        format!("arn:aws:s3:::{}/*", self.name)
    }
}

/// Field mapping for the vector index the knowledge base writes into.
#[derive(Debug, Clone)]
pub struct VectorIndexSpec {
    pub name: String,
    pub vector_field: String,
    pub text_field: String,
    pub metadata_field: String,
}

/// Managed vector-search collection plus its attendant policies.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: String,
    pub encryption_policy_name: String,
    pub network_policy_name: String,
    pub access_policy_name: String,
    pub index: VectorIndexSpec,
}

/// Knowledge base binding an embedding model to the vector collection,
/// with one S3 data source scoped to the documents prefix.
#[derive(Debug, Clone)]
pub struct KnowledgeBaseSpec {
    pub name: String,
    pub embedding_model_arn: String,
    pub data_source_name: String,
    pub inclusion_prefix: String,
}

/// Conversations table: partition on conversation, sort on message id,
/// per-item TTL.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    pub partition_key: &'static str,
    pub sort_key: &'static str,
    pub ttl_attribute: &'static str,
}

impl TableSpec {
    pub fn arn(&self, account_id: &str, region: &str) -> String {
        format!("arn:aws:dynamodb:{region}:{account_id}:table/{}", self.name)
    }
}

/// One compute function and its dedicated role.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: String,
    pub role: RoleSpec,
    pub handler: String,
    pub runtime: String,
    pub timeout_secs: i32,
    pub memory_mb: i32,
    pub code_path: Option<PathBuf>,
}

impl FunctionSpec {
    pub fn log_group(&self) -> String {
        format!("/aws/lambda/{}", self.name)
    }

    pub fn log_group_arn(&self, account_id: &str, region: &str) -> String {
        format!(
            "arn:aws:logs:{region}:{account_id}:log-group:{}",
            self.log_group()
        )
    }
}

/// Object-created notification filter routing uploads to the ingestion
/// function. A key matches when it carries both the prefix and the suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRule {
    pub id: String,
    pub prefix: String,
    pub suffix: String,
}

impl NotificationRule {
    pub fn matches(&self, key: &str) -> bool {
        key.starts_with(&self.prefix) && key.ends_with(&self.suffix)
    }
}

/// The filter rules routing uploads to the ingestion function: `.pdf` and
/// `.txt` under the documents prefix, nothing else.
pub fn notification_rules(prefix: &str) -> Vec<NotificationRule> {
    vec![
        NotificationRule {
            id: "pdf-uploads".to_string(),
            prefix: prefix.to_string(),
            suffix: ".pdf".to_string(),
        },
        NotificationRule {
            id: "txt-uploads".to_string(),
            prefix: prefix.to_string(),
            suffix: ".txt".to_string(),
        },
    ]
}

/// Reserved HTTP front for the retrieval function. Synthesized only when
/// explicitly enabled; the provisioner does not apply it.
#[derive(Debug, Clone)]
pub struct HttpApiSpec {
    pub name: String,
    pub route: &'static str,
}

/// The full synthesized resource graph.
#[derive(Debug, Clone)]
pub struct StackSpec {
    pub name: String,
    pub account_id: String,
    pub region: String,
    pub bucket: BucketSpec,
    pub collection: CollectionSpec,
    pub kb_role: RoleSpec,
    pub knowledge_base: KnowledgeBaseSpec,
    pub conversations_table: TableSpec,
    pub ingestion: FunctionSpec,
    pub retrieval: FunctionSpec,
    pub notifications: Vec<NotificationRule>,
    pub http_api: Option<HttpApiSpec>,
    pub default_model_id: String,
    pub fallback_model_id: String,
}

impl StackSpec {
    /// Expand configuration into the concrete resource graph for one
    /// account and region.
    pub fn from_config(config: &Config, account_id: &str, region: &str) -> Self {
        let name = config.stack.name.clone();

        let bucket = BucketSpec {
            name: format!("{name}-documents-{account_id}-{region}"),
            document_prefix: config.bucket.document_prefix.clone(),
            expiry_days: config.bucket.expiry_days,
            versioned: true,
            sse_algorithm: "AES256",
        };

        let collection = CollectionSpec {
            name: format!("{name}-vectors"),
            encryption_policy_name: format!("{name}-enc"),
            network_policy_name: format!("{name}-net"),
            access_policy_name: format!("{name}-access"),
            index: VectorIndexSpec {
                name: config.knowledge_base.vector_index_name.clone(),
                vector_field: config.knowledge_base.vector_field.clone(),
                text_field: config.knowledge_base.text_field.clone(),
                metadata_field: config.knowledge_base.metadata_field.clone(),
            },
        };

        let knowledge_base = KnowledgeBaseSpec {
            name: format!("{name}-kb"),
            embedding_model_arn: model_arn(region, &config.knowledge_base.embedding_model_id),
            data_source_name: format!("{name}-documents"),
            inclusion_prefix: config.bucket.document_prefix.clone(),
        };

        let conversations_table = TableSpec {
            name: format!("{name}-conversations"),
            partition_key: "conversation_id",
            sort_key: "message_id",
            ttl_attribute: "ttl",
        };

        let ingestion = FunctionSpec {
            name: format!("{name}-ingestion"),
            role: RoleSpec::new(format!("{name}-ingestion-role"), "lambda.amazonaws.com"),
            handler: config.functions.ingestion.handler.clone(),
            runtime: config.functions.ingestion.runtime.clone(),
            timeout_secs: config.functions.ingestion.timeout_secs,
            memory_mb: config.functions.ingestion.memory_mb,
            code_path: config.functions.ingestion.code_path.clone().map(PathBuf::from),
        };

        let retrieval = FunctionSpec {
            name: format!("{name}-retrieval"),
            role: RoleSpec::new(format!("{name}-retrieval-role"), "lambda.amazonaws.com"),
            handler: config.functions.retrieval.handler.clone(),
            runtime: config.functions.retrieval.runtime.clone(),
            timeout_secs: config.functions.retrieval.timeout_secs,
            memory_mb: config.functions.retrieval.memory_mb,
            code_path: config.functions.retrieval.code_path.clone().map(PathBuf::from),
        };

        let notifications = notification_rules(&config.bucket.document_prefix);

        let http_api = config.http_api.enabled.then(|| HttpApiSpec {
            name: format!("{name}-api"),
            route: "/query",
        });

        Self {
            name,
            account_id: account_id.to_string(),
            region: region.to_string(),
            bucket,
            collection,
            kb_role: RoleSpec::new(
                format!("{}-kb-role", config.stack.name),
                "bedrock.amazonaws.com",
            ),
            knowledge_base,
            conversations_table,
            ingestion,
            retrieval,
            notifications,
            http_api,
            default_model_id: config.models.default_model_id.clone(),
            fallback_model_id: config.models.fallback_model_id.clone(),
        }
    }

    /// ARN the knowledge base will carry once created.
    pub fn knowledge_base_arn(&self, knowledge_base_id: &str) -> String {
        format!(
            "arn:aws:bedrock:{}:{}:knowledge-base/{knowledge_base_id}",
            self.region, self.account_id
        )
    }

    /// Permissions for the knowledge-base service role: read the documents
    /// bucket, call the embedding model, and write the vector collection.
    pub fn kb_role_policy(&self, collection_arn: &str) -> PolicyDocument {
        PolicyDocument::new(vec![
            PolicyStatement::allow(
                "EmbeddingModelAccess",
                &["bedrock:InvokeModel"],
                vec![self.knowledge_base.embedding_model_arn.clone()],
            ),
            PolicyStatement::allow(
                "DocumentBucketRead",
                &["s3:GetObject", "s3:ListBucket"],
                vec![self.bucket.arn(), self.bucket.objects_arn()],
            ),
            PolicyStatement::allow(
                "VectorCollectionAccess",
                &["aoss:APIAccessAll"],
                vec![collection_arn.to_string()],
            ),
        ])
    }

    /// Permissions for the ingestion function: start and observe ingestion
    /// jobs on this knowledge base, nothing else. Holds no model-invocation
    /// action.
    pub fn ingestion_role_policy(&self, knowledge_base_arn: &str) -> PolicyDocument {
        let mut statements = vec![PolicyStatement::allow(
            "IngestionJobControl",
            &[
                "bedrock:StartIngestionJob",
                "bedrock:GetIngestionJob",
                "bedrock:ListIngestionJobs",
            ],
            vec![knowledge_base_arn.to_string()],
        )];
        statements.push(self.log_statement(&self.ingestion));
        PolicyDocument::new(statements)
    }

    /// Permissions for the retrieval function: retrieve from this knowledge
    /// base, invoke the configured generation models, and read/append the
    /// conversations table. Holds no ingestion-job action.
    pub fn retrieval_role_policy(
        &self,
        knowledge_base_arn: &str,
        table_arn: &str,
    ) -> PolicyDocument {
        let mut statements = vec![
            PolicyStatement::allow(
                "KnowledgeBaseRetrieve",
                &["bedrock:Retrieve"],
                vec![knowledge_base_arn.to_string()],
            ),
            PolicyStatement::allow(
                "GenerationModelInvoke",
                &["bedrock:InvokeModel"],
                vec![
                    model_arn(&self.region, &self.default_model_id),
                    model_arn(&self.region, &self.fallback_model_id),
                ],
            ),
            PolicyStatement::allow(
                "ConversationHistory",
                &["dynamodb:PutItem", "dynamodb:Query"],
                vec![table_arn.to_string()],
            ),
        ];
        statements.push(self.log_statement(&self.retrieval));
        PolicyDocument::new(statements)
    }

    /// Log-delivery permissions scoped to the function's own log group.
    fn log_statement(&self, function: &FunctionSpec) -> PolicyStatement {
        let log_group = function.log_group_arn(&self.account_id, &self.region);
        PolicyStatement::allow(
            "FunctionLogs",
            &[
                "logs:CreateLogGroup",
                "logs:CreateLogStream",
                "logs:PutLogEvents",
            ],
            vec![log_group.clone(), format!("{log_group}:*")],
        )
    }

    /// Environment for the ingestion function.
    pub fn ingestion_env(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
    ) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "KNOWLEDGE_BASE_ID".to_string(),
                knowledge_base_id.to_string(),
            ),
            ("S3_DATA_SOURCE_ID".to_string(), data_source_id.to_string()),
            ("S3_BUCKET_NAME".to_string(), self.bucket.name.clone()),
        ])
    }

    /// Environment for the retrieval function.
    pub fn retrieval_env(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
    ) -> BTreeMap<String, String> {
        let mut env = self.ingestion_env(knowledge_base_id, data_source_id);
        env.insert(
            "CONVERSATIONS_TABLE_NAME".to_string(),
            self.conversations_table.name.clone(),
        );
        env.insert(
            "DEFAULT_MODEL_ID".to_string(),
            self.default_model_id.clone(),
        );
        env.insert(
            "FALLBACK_MODEL_ID".to_string(),
            self.fallback_model_id.clone(),
        );
        env
    }
}

/// Named outputs recorded after a successful deploy, for consumption by
/// external tooling or a UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackOutputs {
    pub stack_name: String,
    pub region: String,
    pub bucket_name: String,
    pub knowledge_base_id: String,
    pub data_source_id: String,
    pub collection_arn: String,
    pub ingestion_function_arn: String,
    pub retrieval_function_arn: String,
    pub conversations_table: String,
    pub deployed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> StackSpec {
        StackSpec::from_config(&Config::default(), "123456789012", "us-east-1")
    }

    #[test]
    fn test_bucket_name_is_globally_scoped() {
        let spec = spec();
        assert_eq!(
            spec.bucket.name,
            "agentic-rag-documents-123456789012-us-east-1"
        );
        assert!(spec.bucket.versioned);
        assert_eq!(spec.bucket.sse_algorithm, "AES256");
        assert_eq!(spec.bucket.expiry_days, 30);
    }

    #[test]
    fn test_ingestion_role_holds_no_model_invocation() {
        let spec = spec();
        let kb_arn = spec.knowledge_base_arn("KB123");
        let policy = spec.ingestion_role_policy(&kb_arn);

        assert!(policy.actions().all(|a| !a.starts_with("bedrock:Invoke")));
        assert!(policy.actions().all(|a| a != "bedrock:Retrieve"));
        assert!(policy
            .actions()
            .any(|a| a == "bedrock:StartIngestionJob"));
    }

    #[test]
    fn test_retrieval_role_holds_no_ingestion_actions() {
        let spec = spec();
        let kb_arn = spec.knowledge_base_arn("KB123");
        let table_arn = spec
            .conversations_table
            .arn(&spec.account_id, &spec.region);
        let policy = spec.retrieval_role_policy(&kb_arn, &table_arn);

        assert!(policy
            .actions()
            .all(|a| !a.contains("IngestionJob")));
        assert!(policy.actions().any(|a| a == "bedrock:Retrieve"));
        assert!(policy.actions().any(|a| a == "bedrock:InvokeModel"));
    }

    #[test]
    fn test_policies_never_grant_bare_wildcard_resources() {
        let spec = spec();
        let kb_arn = spec.knowledge_base_arn("KB123");
        let table_arn = spec
            .conversations_table
            .arn(&spec.account_id, &spec.region);
        let collection_arn = "arn:aws:aoss:us-east-1:123456789012:collection/abc123";

        for policy in [
            spec.kb_role_policy(collection_arn),
            spec.ingestion_role_policy(&kb_arn),
            spec.retrieval_role_policy(&kb_arn, &table_arn),
        ] {
            for resource in policy.resources() {
                assert_ne!(resource, "*", "wildcard resource leaked into policy");
                assert!(
                    resource.starts_with("arn:aws:"),
                    "resource is not a concrete ARN: {resource}"
                );
            }
        }
    }

    #[test]
    fn test_retrieval_policy_is_scoped_to_specific_knowledge_base() {
        let spec = spec();
        let kb_arn = spec.knowledge_base_arn("KB123");
        let table_arn = spec
            .conversations_table
            .arn(&spec.account_id, &spec.region);
        let policy = spec.retrieval_role_policy(&kb_arn, &table_arn);

        let retrieve = policy
            .statements
            .iter()
            .find(|s| s.actions.iter().any(|a| a == "bedrock:Retrieve"))
            .expect("retrieve statement present");
        assert_eq!(retrieve.resources, vec![kb_arn]);
    }

    #[test]
    fn test_notification_rules_match_documents_only() {
        let spec = spec();
        assert_eq!(spec.notifications.len(), 2);

        let pdf = &spec.notifications[0];
        let txt = &spec.notifications[1];
        assert_eq!((pdf.prefix.as_str(), pdf.suffix.as_str()), ("documents/", ".pdf"));
        assert_eq!((txt.prefix.as_str(), txt.suffix.as_str()), ("documents/", ".txt"));

        assert!(pdf.matches("documents/report.pdf"));
        assert!(txt.matches("documents/notes.txt"));
        assert!(!pdf.matches("uploads/report.pdf"));
        assert!(!pdf.matches("documents/report.docx"));
        assert!(!txt.matches("notes.txt"));
    }

    #[test]
    fn test_function_env_maps() {
        let spec = spec();
        let env = spec.ingestion_env("KB123", "DS456");
        assert_eq!(env["KNOWLEDGE_BASE_ID"], "KB123");
        assert_eq!(env["S3_DATA_SOURCE_ID"], "DS456");
        assert_eq!(env["S3_BUCKET_NAME"], spec.bucket.name);
        assert!(!env.contains_key("CONVERSATIONS_TABLE_NAME"));

        let env = spec.retrieval_env("KB123", "DS456");
        assert_eq!(env["CONVERSATIONS_TABLE_NAME"], "agentic-rag-conversations");
        assert_eq!(
            env["DEFAULT_MODEL_ID"],
            "anthropic.claude-3-haiku-20240307-v1:0"
        );
        assert_eq!(env["FALLBACK_MODEL_ID"], "meta.llama3-1-8b-instruct-v1:0");
    }

    #[test]
    fn test_http_api_reserved_but_disabled_by_default() {
        assert!(spec().http_api.is_none());

        let mut config = Config::default();
        config.http_api.enabled = true;
        let spec = StackSpec::from_config(&config, "123456789012", "us-east-1");
        let api = spec.http_api.expect("synthesized when enabled");
        assert_eq!(api.route, "/query");
    }

    #[test]
    fn test_model_arn_form() {
        assert_eq!(
            model_arn("eu-west-1", "anthropic.claude-3-haiku-20240307-v1:0"),
            "arn:aws:bedrock:eu-west-1::foundation-model/anthropic.claude-3-haiku-20240307-v1:0"
        );
    }

    #[test]
    fn test_role_trust_principals() {
        let spec = spec();
        assert_eq!(spec.kb_role.trust.service_principal, "bedrock.amazonaws.com");
        assert_eq!(
            spec.ingestion.role.trust.service_principal,
            "lambda.amazonaws.com"
        );
        assert_eq!(
            spec.retrieval.role.trust.service_principal,
            "lambda.amazonaws.com"
        );
    }
}
