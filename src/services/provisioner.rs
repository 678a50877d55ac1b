//! Stack provisioning.
//!
//! Applies the synthesized resource graph in dependency order as one
//! synchronous pass. Every step converges on existing state, so a failed
//! apply is recovered by running it again; there is no partial-apply
//! bookkeeping of our own. Destroy walks the same graph in reverse and
//! empties the documents bucket first — the stack is disposable by policy.

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::errors::ProvisionError;
use crate::domain::models::{Config, StackOutputs, StackSpec};
use crate::infrastructure::aws::access::RoleClient;
use crate::infrastructure::aws::compute::FunctionClient;
use crate::infrastructure::aws::knowledge_base::KnowledgeBaseAdmin;
use crate::infrastructure::aws::storage::BucketClient;
use crate::infrastructure::aws::tables::TableClient;
use crate::infrastructure::aws::vector::CollectionClient;
use crate::infrastructure::aws::AwsEnv;
use crate::infrastructure::retry::RetryPolicy;

pub struct StackProvisioner {
    spec: StackSpec,
    buckets: BucketClient,
    roles: RoleClient,
    collections: CollectionClient,
    knowledge_bases: KnowledgeBaseAdmin,
    functions: FunctionClient,
    tables: TableClient,
    retry: RetryPolicy,
}

impl StackProvisioner {
    pub fn new(env: &AwsEnv, config: &Config) -> Self {
        Self {
            spec: StackSpec::from_config(config, &env.account_id, &env.region),
            buckets: BucketClient::new(env),
            roles: RoleClient::new(env),
            collections: CollectionClient::new(env),
            knowledge_bases: KnowledgeBaseAdmin::new(env),
            functions: FunctionClient::new(env),
            tables: TableClient::new(env),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    pub fn spec(&self) -> &StackSpec {
        &self.spec
    }

    /// Apply the whole graph in dependency order and return the stack
    /// outputs.
    pub async fn deploy(&self) -> Result<StackOutputs, ProvisionError> {
        let spec = &self.spec;

        if spec.http_api.is_some() {
            return Err(ProvisionError::Definition(
                "the HTTP API front is reserved for future use and cannot be provisioned; \
                 disable http_api.enabled"
                    .to_string(),
            ));
        }

        info!(stack = %spec.name, region = %spec.region, "Deploying stack");

        self.retry
            .execute(|| self.buckets.ensure(&spec.bucket))
            .await?;

        self.retry
            .execute(|| self.collections.ensure(&spec.collection))
            .await?;
        let collection = self.collections.wait_active(&spec.collection.name).await?;

        let kb_role_policy = spec.kb_role_policy(&collection.arn);
        let kb_role_arn = self
            .retry
            .execute(|| self.roles.ensure(&spec.kb_role, &kb_role_policy))
            .await?;
        self.retry
            .execute(|| {
                self.collections
                    .ensure_access_policy(&spec.collection, std::slice::from_ref(&kb_role_arn))
            })
            .await?;

        let knowledge_base_id = self
            .retry
            .execute(|| {
                self.knowledge_bases.ensure(
                    &spec.knowledge_base,
                    &kb_role_arn,
                    &collection.arn,
                    &spec.collection.index,
                )
            })
            .await?;
        self.knowledge_bases.wait_active(&knowledge_base_id).await?;

        let data_source_id = self
            .retry
            .execute(|| {
                self.knowledge_bases.ensure_data_source(
                    &knowledge_base_id,
                    &spec.knowledge_base,
                    &spec.bucket,
                )
            })
            .await?;

        let table_arn = self
            .retry
            .execute(|| self.tables.ensure(&spec.conversations_table))
            .await?;

        let knowledge_base_arn = spec.knowledge_base_arn(&knowledge_base_id);

        let ingestion_policy = spec.ingestion_role_policy(&knowledge_base_arn);
        let ingestion_role_arn = self
            .retry
            .execute(|| self.roles.ensure(&spec.ingestion.role, &ingestion_policy))
            .await?;

        let retrieval_policy = spec.retrieval_role_policy(&knowledge_base_arn, &table_arn);
        let retrieval_role_arn = self
            .retry
            .execute(|| self.roles.ensure(&spec.retrieval.role, &retrieval_policy))
            .await?;

        let ingestion_function_arn = self
            .functions
            .ensure(
                &spec.ingestion,
                &ingestion_role_arn,
                spec.ingestion_env(&knowledge_base_id, &data_source_id),
            )
            .await?;
        let retrieval_function_arn = self
            .functions
            .ensure(
                &spec.retrieval,
                &retrieval_role_arn,
                spec.retrieval_env(&knowledge_base_id, &data_source_id),
            )
            .await?;

        let bucket_arn = spec.bucket.arn();
        self.retry
            .execute(|| {
                self.functions
                    .allow_bucket_invoke(&spec.ingestion.name, &bucket_arn, &spec.account_id)
            })
            .await?;
        self.retry
            .execute(|| {
                self.buckets.configure_notifications(
                    &spec.bucket.name,
                    &ingestion_function_arn,
                    &spec.notifications,
                )
            })
            .await?;

        info!(stack = %spec.name, "Stack deployed");

        Ok(StackOutputs {
            stack_name: spec.name.clone(),
            region: spec.region.clone(),
            bucket_name: spec.bucket.name.clone(),
            knowledge_base_id,
            data_source_id,
            collection_arn: collection.arn,
            ingestion_function_arn,
            retrieval_function_arn,
            conversations_table: spec.conversations_table.name.clone(),
            deployed_at: Utc::now(),
        })
    }

    /// Tear the graph down in reverse order, deleting stored objects along
    /// the way.
    pub async fn destroy(&self) -> Result<(), ProvisionError> {
        let spec = &self.spec;
        info!(stack = %spec.name, "Destroying stack");

        self.retry
            .execute(|| self.buckets.clear_notifications(&spec.bucket.name))
            .await?;

        self.retry
            .execute(|| self.functions.delete(&spec.ingestion.name))
            .await?;
        self.retry
            .execute(|| self.functions.delete(&spec.retrieval.name))
            .await?;

        self.retry
            .execute(|| self.roles.delete(&spec.ingestion.role))
            .await?;
        self.retry
            .execute(|| self.roles.delete(&spec.retrieval.role))
            .await?;

        self.retry
            .execute(|| self.knowledge_bases.delete(&spec.knowledge_base.name))
            .await?;

        self.retry
            .execute(|| self.tables.delete(&spec.conversations_table.name))
            .await?;

        self.retry
            .execute(|| self.roles.delete(&spec.kb_role))
            .await?;

        self.retry
            .execute(|| self.collections.delete(&spec.collection))
            .await?;

        self.retry
            .execute(|| self.buckets.empty(&spec.bucket.name))
            .await?;
        self.retry
            .execute(|| self.buckets.delete(&spec.bucket.name))
            .await?;

        warn!(stack = %spec.name, "Stack destroyed; stored documents are gone");
        Ok(())
    }
}
