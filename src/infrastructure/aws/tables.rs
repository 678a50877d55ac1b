//! Conversations table adapter (DynamoDB).

use std::time::Duration;

use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType, TableStatus,
    TimeToLiveSpecification,
};
use tokio::time::sleep;
use tracing::{debug, info};

use super::{definition_error, provision_error};
use crate::domain::errors::ProvisionError;
use crate::domain::models::TableSpec;

const SERVICE: &str = "dynamodb";
const WAIT_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_ATTEMPTS: u32 = 60;

pub struct TableClient {
    client: aws_sdk_dynamodb::Client,
}

impl TableClient {
    pub fn new(env: &super::AwsEnv) -> Self {
        Self {
            client: aws_sdk_dynamodb::Client::new(&env.sdk),
        }
    }

    /// Create the table if needed, wait for it to become active, and make
    /// sure TTL is enabled on the expiry attribute. Returns the table ARN.
    pub async fn ensure(&self, spec: &TableSpec) -> Result<String, ProvisionError> {
        let result = self
            .client
            .create_table()
            .table_name(&spec.name)
            .billing_mode(BillingMode::PayPerRequest)
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(spec.partition_key)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(definition_error)?,
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(spec.sort_key)
                    .attribute_type(ScalarAttributeType::N)
                    .build()
                    .map_err(definition_error)?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(spec.partition_key)
                    .key_type(KeyType::Hash)
                    .build()
                    .map_err(definition_error)?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(spec.sort_key)
                    .key_type(KeyType::Range)
                    .build()
                    .map_err(definition_error)?,
            )
            .send()
            .await;

        match result {
            Ok(_) => info!(table = %spec.name, "Created conversations table"),
            Err(err) => {
                let err = aws_sdk_dynamodb::Error::from(err);
                match err.code() {
                    Some("ResourceInUseException") => {
                        debug!(table = %spec.name, "Table already exists");
                    }
                    _ => return Err(provision_error(SERVICE, &err)),
                }
            }
        }

        let arn = self.wait_active(&spec.name).await?;
        self.enable_ttl(spec).await?;
        Ok(arn)
    }

    async fn wait_active(&self, table: &str) -> Result<String, ProvisionError> {
        for _ in 0..WAIT_ATTEMPTS {
            let output = self
                .client
                .describe_table()
                .table_name(table)
                .send()
                .await
                .map_err(|e| provision_error(SERVICE, &aws_sdk_dynamodb::Error::from(e)))?;

            if let Some(description) = output.table() {
                if description.table_status() == Some(&TableStatus::Active) {
                    return description
                        .table_arn()
                        .map(ToString::to_string)
                        .ok_or(ProvisionError::MissingField("tableArn"));
                }
                debug!(table = %table, "Waiting for table to become active");
            }

            sleep(WAIT_INTERVAL).await;
        }

        Err(ProvisionError::WaitTimeout {
            resource: format!("table {table}"),
            state: "ACTIVE",
        })
    }

    async fn enable_ttl(&self, spec: &TableSpec) -> Result<(), ProvisionError> {
        let result = self
            .client
            .update_time_to_live()
            .table_name(&spec.name)
            .time_to_live_specification(
                TimeToLiveSpecification::builder()
                    .enabled(true)
                    .attribute_name(spec.ttl_attribute)
                    .build()
                    .map_err(definition_error)?,
            )
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = aws_sdk_dynamodb::Error::from(err);
                // Re-enabling TTL on an already-enabled table is rejected
                // with a ValidationException; the state we want is in place.
                match err.code() {
                    Some("ValidationException") => {
                        debug!(table = %spec.name, "TTL already enabled");
                        Ok(())
                    }
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }

    /// Delete the table. Absence is fine.
    pub async fn delete(&self, table: &str) -> Result<(), ProvisionError> {
        match self.client.delete_table().table_name(table).send().await {
            Ok(_) => {
                info!(table = %table, "Deleted conversations table");
                Ok(())
            }
            Err(err) => {
                let err = aws_sdk_dynamodb::Error::from(err);
                match err.code() {
                    Some("ResourceNotFoundException") => Ok(()),
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }
}
