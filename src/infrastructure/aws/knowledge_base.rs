//! Knowledge-base admin adapter (Bedrock agent control plane).
//!
//! Creates the knowledge base binding the embedding model to the vector
//! collection, and the S3 data source scoped to the documents prefix.

use std::time::Duration;

use aws_sdk_bedrockagent::error::ProvideErrorMetadata;
use aws_sdk_bedrockagent::types::{
    DataSourceConfiguration, DataSourceType, KnowledgeBaseConfiguration, KnowledgeBaseStatus,
    KnowledgeBaseStorageType, KnowledgeBaseType, OpenSearchServerlessConfiguration,
    OpenSearchServerlessFieldMapping, S3DataSourceConfiguration, StorageConfiguration,
    VectorKnowledgeBaseConfiguration,
};
use tokio::time::sleep;
use tracing::{debug, info};

use super::{definition_error, provision_error};
use crate::domain::errors::ProvisionError;
use crate::domain::models::{BucketSpec, KnowledgeBaseSpec, VectorIndexSpec};

const SERVICE: &str = "bedrock-agent";
const WAIT_INTERVAL: Duration = Duration::from_secs(10);
const WAIT_ATTEMPTS: u32 = 60;

pub struct KnowledgeBaseAdmin {
    client: aws_sdk_bedrockagent::Client,
}

impl KnowledgeBaseAdmin {
    pub fn new(env: &super::AwsEnv) -> Self {
        Self {
            client: aws_sdk_bedrockagent::Client::new(&env.sdk),
        }
    }

    /// Create the knowledge base if it does not already exist. Returns its
    /// id.
    pub async fn ensure(
        &self,
        spec: &KnowledgeBaseSpec,
        role_arn: &str,
        collection_arn: &str,
        index: &VectorIndexSpec,
    ) -> Result<String, ProvisionError> {
        if let Some(id) = self.find_by_name(&spec.name).await? {
            debug!(knowledge_base = %spec.name, "Knowledge base already exists");
            return Ok(id);
        }

        let kb_configuration = KnowledgeBaseConfiguration::builder()
            .r#type(KnowledgeBaseType::Vector)
            .vector_knowledge_base_configuration(
                VectorKnowledgeBaseConfiguration::builder()
                    .embedding_model_arn(&spec.embedding_model_arn)
                    .build()
                    .map_err(definition_error)?,
            )
            .build()
            .map_err(definition_error)?;

        let storage_configuration = StorageConfiguration::builder()
            .r#type(KnowledgeBaseStorageType::OpensearchServerless)
            .opensearch_serverless_configuration(
                OpenSearchServerlessConfiguration::builder()
                    .collection_arn(collection_arn)
                    .vector_index_name(&index.name)
                    .field_mapping(
                        OpenSearchServerlessFieldMapping::builder()
                            .vector_field(&index.vector_field)
                            .text_field(&index.text_field)
                            .metadata_field(&index.metadata_field)
                            .build()
                            .map_err(definition_error)?,
                    )
                    .build()
                    .map_err(definition_error)?,
            )
            .build()
            .map_err(definition_error)?;

        let output = self
            .client
            .create_knowledge_base()
            .name(&spec.name)
            .role_arn(role_arn)
            .knowledge_base_configuration(kb_configuration)
            .storage_configuration(storage_configuration)
            .send()
            .await
            .map_err(|e| provision_error(SERVICE, &aws_sdk_bedrockagent::Error::from(e)))?;

        let knowledge_base = output
            .knowledge_base()
            .ok_or(ProvisionError::MissingField("knowledgeBase"))?;
        let id = knowledge_base.knowledge_base_id().to_string();
        info!(knowledge_base = %spec.name, id = %id, "Created knowledge base");
        Ok(id)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<String>, ProvisionError> {
        let mut next_token: Option<String> = None;
        loop {
            let mut request = self.client.list_knowledge_bases().max_results(50);
            if let Some(token) = &next_token {
                request = request.next_token(token);
            }

            let page = request
                .send()
                .await
                .map_err(|e| provision_error(SERVICE, &aws_sdk_bedrockagent::Error::from(e)))?;

            for summary in page.knowledge_base_summaries() {
                if summary.name() == name {
                    return Ok(Some(summary.knowledge_base_id().to_string()));
                }
            }

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(None),
            }
        }
    }

    /// Poll until the knowledge base is ACTIVE.
    pub async fn wait_active(&self, knowledge_base_id: &str) -> Result<(), ProvisionError> {
        for _ in 0..WAIT_ATTEMPTS {
            let output = self
                .client
                .get_knowledge_base()
                .knowledge_base_id(knowledge_base_id)
                .send()
                .await
                .map_err(|e| provision_error(SERVICE, &aws_sdk_bedrockagent::Error::from(e)))?;

            if let Some(knowledge_base) = output.knowledge_base() {
                let status = knowledge_base.status();
                if status == &KnowledgeBaseStatus::Active {
                    return Ok(());
                }
                if status == &KnowledgeBaseStatus::Failed {
                    return Err(ProvisionError::Api {
                        service: SERVICE,
                        code: "KnowledgeBaseFailed".to_string(),
                        message: format!("knowledge base {knowledge_base_id} entered FAILED state"),
                    });
                }
                debug!(id = %knowledge_base_id, "Waiting for knowledge base to become active");
            }

            sleep(WAIT_INTERVAL).await;
        }

        Err(ProvisionError::WaitTimeout {
            resource: format!("knowledge base {knowledge_base_id}"),
            state: "ACTIVE",
        })
    }

    /// Create the S3 data source if it does not already exist. Returns its
    /// id.
    pub async fn ensure_data_source(
        &self,
        knowledge_base_id: &str,
        spec: &KnowledgeBaseSpec,
        bucket: &BucketSpec,
    ) -> Result<String, ProvisionError> {
        if let Some(id) = self
            .find_data_source(knowledge_base_id, &spec.data_source_name)
            .await?
        {
            debug!(data_source = %spec.data_source_name, "Data source already exists");
            return Ok(id);
        }

        let configuration = DataSourceConfiguration::builder()
            .r#type(DataSourceType::S3)
            .s3_configuration(
                S3DataSourceConfiguration::builder()
                    .bucket_arn(bucket.arn())
                    .inclusion_prefixes(&spec.inclusion_prefix)
                    .build()
                    .map_err(definition_error)?,
            )
            .build()
            .map_err(definition_error)?;

        let output = self
            .client
            .create_data_source()
            .knowledge_base_id(knowledge_base_id)
            .name(&spec.data_source_name)
            .data_source_configuration(configuration)
            .send()
            .await
            .map_err(|e| provision_error(SERVICE, &aws_sdk_bedrockagent::Error::from(e)))?;

        let data_source = output
            .data_source()
            .ok_or(ProvisionError::MissingField("dataSource"))?;
        let id = data_source.data_source_id().to_string();
        info!(data_source = %spec.data_source_name, id = %id, "Created data source");
        Ok(id)
    }

    async fn find_data_source(
        &self,
        knowledge_base_id: &str,
        name: &str,
    ) -> Result<Option<String>, ProvisionError> {
        let output = self
            .client
            .list_data_sources()
            .knowledge_base_id(knowledge_base_id)
            .max_results(50)
            .send()
            .await
            .map_err(|e| provision_error(SERVICE, &aws_sdk_bedrockagent::Error::from(e)))?;

        Ok(output
            .data_source_summaries()
            .iter()
            .find(|summary| summary.name() == name)
            .map(|summary| summary.data_source_id().to_string()))
    }

    /// Delete the knowledge base (its data sources go with it). Absence is
    /// fine.
    pub async fn delete(&self, name: &str) -> Result<(), ProvisionError> {
        let Some(id) = self.find_by_name(name).await? else {
            return Ok(());
        };

        match self
            .client
            .delete_knowledge_base()
            .knowledge_base_id(&id)
            .send()
            .await
        {
            Ok(_) => {
                info!(knowledge_base = %name, "Deleted knowledge base");
                Ok(())
            }
            Err(err) => {
                let err = aws_sdk_bedrockagent::Error::from(err);
                match err.code() {
                    Some("ResourceNotFoundException") => Ok(()),
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }
}
