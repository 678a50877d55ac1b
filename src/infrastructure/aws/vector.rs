//! Vector-search collection adapter (OpenSearch Serverless).
//!
//! The collection needs three attendant policies: encryption (service-owned
//! key), network (public reachability for the managed knowledge base), and
//! a data access policy granting the knowledge-base role. Index creation is
//! delegated entirely to the managed service.

use std::time::Duration;

use aws_sdk_opensearchserverless::error::ProvideErrorMetadata;
use aws_sdk_opensearchserverless::types::{
    AccessPolicyType, CollectionStatus, CollectionType, SecurityPolicyType,
};
use tokio::time::sleep;
use tracing::{debug, info};

use super::provision_error;
use crate::domain::errors::ProvisionError;
use crate::domain::models::CollectionSpec;

const SERVICE: &str = "aoss";
const WAIT_INTERVAL: Duration = Duration::from_secs(10);
const WAIT_ATTEMPTS: u32 = 60;

/// Identifiers the service assigns at creation time.
#[derive(Debug, Clone)]
pub struct CollectionHandle {
    pub id: String,
    pub arn: String,
}

pub struct CollectionClient {
    client: aws_sdk_opensearchserverless::Client,
}

impl CollectionClient {
    pub fn new(env: &super::AwsEnv) -> Self {
        Self {
            client: aws_sdk_opensearchserverless::Client::new(&env.sdk),
        }
    }

    /// Converge the encryption/network policies and the collection itself.
    pub async fn ensure(&self, spec: &CollectionSpec) -> Result<CollectionHandle, ProvisionError> {
        self.ensure_security_policy(
            &spec.encryption_policy_name,
            SecurityPolicyType::Encryption,
            &encryption_policy(&spec.name),
        )
        .await?;
        self.ensure_security_policy(
            &spec.network_policy_name,
            SecurityPolicyType::Network,
            &network_policy(&spec.name),
        )
        .await?;

        match self
            .client
            .create_collection()
            .name(&spec.name)
            .r#type(CollectionType::Vectorsearch)
            .description("Embedding storage for the RAG knowledge base")
            .send()
            .await
        {
            Ok(output) => {
                let detail = output
                    .create_collection_detail()
                    .ok_or(ProvisionError::MissingField("createCollectionDetail"))?;
                let handle = CollectionHandle {
                    id: detail
                        .id()
                        .ok_or(ProvisionError::MissingField("collection id"))?
                        .to_string(),
                    arn: detail
                        .arn()
                        .ok_or(ProvisionError::MissingField("collection arn"))?
                        .to_string(),
                };
                info!(collection = %spec.name, id = %handle.id, "Created vector collection");
                Ok(handle)
            }
            Err(err) => {
                let err = aws_sdk_opensearchserverless::Error::from(err);
                match err.code() {
                    Some("ConflictException") => {
                        debug!(collection = %spec.name, "Collection already exists");
                        self.lookup(&spec.name).await
                    }
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }

    async fn ensure_security_policy(
        &self,
        name: &str,
        policy_type: SecurityPolicyType,
        document: &serde_json::Value,
    ) -> Result<(), ProvisionError> {
        let result = self
            .client
            .create_security_policy()
            .name(name)
            .r#type(policy_type)
            .policy(document.to_string())
            .send()
            .await;

        match result {
            Ok(_) => {
                debug!(policy = %name, "Created security policy");
                Ok(())
            }
            Err(err) => {
                let err = aws_sdk_opensearchserverless::Error::from(err);
                match err.code() {
                    Some("ConflictException") => Ok(()),
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }

    /// Grant the given principals data access to the collection and its
    /// indexes.
    pub async fn ensure_access_policy(
        &self,
        spec: &CollectionSpec,
        principals: &[String],
    ) -> Result<(), ProvisionError> {
        let document = access_policy(&spec.name, principals);
        let result = self
            .client
            .create_access_policy()
            .name(&spec.access_policy_name)
            .r#type(AccessPolicyType::Data)
            .policy(document.to_string())
            .send()
            .await;

        match result {
            Ok(_) => {
                debug!(policy = %spec.access_policy_name, "Created data access policy");
                Ok(())
            }
            Err(err) => {
                let err = aws_sdk_opensearchserverless::Error::from(err);
                match err.code() {
                    Some("ConflictException") => Ok(()),
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }

    async fn lookup(&self, name: &str) -> Result<CollectionHandle, ProvisionError> {
        let output = self
            .client
            .batch_get_collection()
            .names(name)
            .send()
            .await
            .map_err(|e| provision_error(SERVICE, &aws_sdk_opensearchserverless::Error::from(e)))?;

        let detail = output
            .collection_details()
            .first()
            .ok_or(ProvisionError::MissingField("collectionDetails"))?;

        Ok(CollectionHandle {
            id: detail
                .id()
                .ok_or(ProvisionError::MissingField("collection id"))?
                .to_string(),
            arn: detail
                .arn()
                .ok_or(ProvisionError::MissingField("collection arn"))?
                .to_string(),
        })
    }

    /// Poll until the collection is ACTIVE.
    pub async fn wait_active(&self, name: &str) -> Result<CollectionHandle, ProvisionError> {
        for _ in 0..WAIT_ATTEMPTS {
            let output = self
                .client
                .batch_get_collection()
                .names(name)
                .send()
                .await
                .map_err(|e| {
                    provision_error(SERVICE, &aws_sdk_opensearchserverless::Error::from(e))
                })?;

            if let Some(detail) = output.collection_details().first() {
                let status = detail.status();
                if status == Some(&CollectionStatus::Active) {
                    return Ok(CollectionHandle {
                        id: detail
                            .id()
                            .ok_or(ProvisionError::MissingField("collection id"))?
                            .to_string(),
                        arn: detail
                            .arn()
                            .ok_or(ProvisionError::MissingField("collection arn"))?
                            .to_string(),
                    });
                }
                if status == Some(&CollectionStatus::Failed) {
                    return Err(ProvisionError::Api {
                        service: SERVICE,
                        code: "CollectionFailed".to_string(),
                        message: format!("collection {name} entered FAILED state"),
                    });
                }
                debug!(collection = %name, "Waiting for collection to become active");
            }

            sleep(WAIT_INTERVAL).await;
        }

        Err(ProvisionError::WaitTimeout {
            resource: format!("collection {name}"),
            state: "ACTIVE",
        })
    }

    /// Delete the collection and its policies. Absent resources are fine.
    pub async fn delete(&self, spec: &CollectionSpec) -> Result<(), ProvisionError> {
        if let Ok(handle) = self.lookup(&spec.name).await {
            let result = self.client.delete_collection().id(&handle.id).send().await;
            if let Err(err) = result {
                let err = aws_sdk_opensearchserverless::Error::from(err);
                if err.code() != Some("ResourceNotFoundException") {
                    return Err(provision_error(SERVICE, &err));
                }
            } else {
                info!(collection = %spec.name, "Deleted vector collection");
            }
        }

        self.delete_access_policy(&spec.access_policy_name).await?;
        self.delete_security_policy(&spec.network_policy_name, SecurityPolicyType::Network)
            .await?;
        self.delete_security_policy(&spec.encryption_policy_name, SecurityPolicyType::Encryption)
            .await?;
        Ok(())
    }

    async fn delete_security_policy(
        &self,
        name: &str,
        policy_type: SecurityPolicyType,
    ) -> Result<(), ProvisionError> {
        let result = self
            .client
            .delete_security_policy()
            .name(name)
            .r#type(policy_type)
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = aws_sdk_opensearchserverless::Error::from(err);
                match err.code() {
                    Some("ResourceNotFoundException") => Ok(()),
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }

    async fn delete_access_policy(&self, name: &str) -> Result<(), ProvisionError> {
        let result = self
            .client
            .delete_access_policy()
            .name(name)
            .r#type(AccessPolicyType::Data)
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = aws_sdk_opensearchserverless::Error::from(err);
                match err.code() {
                    Some("ResourceNotFoundException") => Ok(()),
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }
}

fn encryption_policy(collection: &str) -> serde_json::Value {
    serde_json::json!({
        "Rules": [{
            "ResourceType": "collection",
            "Resource": [format!("collection/{collection}")],
        }],
        "AWSOwnedKey": true,
    })
}

fn network_policy(collection: &str) -> serde_json::Value {
    serde_json::json!([{
        "Rules": [
            {
                "ResourceType": "collection",
                "Resource": [format!("collection/{collection}")],
            },
            {
                "ResourceType": "dashboard",
                "Resource": [format!("collection/{collection}")],
            },
        ],
        "AllowFromPublic": true,
    }])
}

fn access_policy(collection: &str, principals: &[String]) -> serde_json::Value {
    serde_json::json!([{
        "Rules": [
            {
                "ResourceType": "collection",
                "Resource": [format!("collection/{collection}")],
                "Permission": [
                    "aoss:CreateCollectionItems",
                    "aoss:DescribeCollectionItems",
                    "aoss:UpdateCollectionItems",
                ],
            },
            {
                "ResourceType": "index",
                "Resource": [format!("index/{collection}/*")],
                "Permission": [
                    "aoss:CreateIndex",
                    "aoss:DescribeIndex",
                    "aoss:UpdateIndex",
                    "aoss:ReadDocument",
                    "aoss:WriteDocument",
                ],
            },
        ],
        "Principal": principals,
        "Description": "Knowledge base access to the vector collection",
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_policy_uses_service_owned_key() {
        let policy = encryption_policy("stack-vectors");
        assert_eq!(policy["AWSOwnedKey"], true);
        assert_eq!(
            policy["Rules"][0]["Resource"][0],
            "collection/stack-vectors"
        );
    }

    #[test]
    fn test_access_policy_names_principals() {
        let principals = vec!["arn:aws:iam::123456789012:role/stack-kb-role".to_string()];
        let policy = access_policy("stack-vectors", &principals);

        assert_eq!(
            policy[0]["Principal"][0],
            "arn:aws:iam::123456789012:role/stack-kb-role"
        );
        assert_eq!(policy[0]["Rules"][1]["Resource"][0], "index/stack-vectors/*");
    }
}
