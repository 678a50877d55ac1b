//! Documents bucket adapter.

use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::types::{
    BucketLifecycleConfiguration, BucketLocationConstraint, BucketVersioningStatus,
    CreateBucketConfiguration, Delete, Event, FilterRule, FilterRuleName,
    LambdaFunctionConfiguration, LifecycleExpiration, LifecycleRule, LifecycleRuleFilter,
    NotificationConfiguration, NotificationConfigurationFilter, ObjectIdentifier, S3KeyFilter,
    ServerSideEncryption, ServerSideEncryptionByDefault, ServerSideEncryptionConfiguration,
    ServerSideEncryptionRule, VersioningConfiguration,
};
use tracing::{debug, info};

use super::{definition_error, provision_error};
use crate::domain::errors::ProvisionError;
use crate::domain::models::{BucketSpec, NotificationRule};

const SERVICE: &str = "s3";

/// Adapter for the versioned, encrypted documents bucket.
pub struct BucketClient {
    client: aws_sdk_s3::Client,
    region: String,
}

impl BucketClient {
    pub fn new(env: &super::AwsEnv) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(&env.sdk),
            region: env.region.clone(),
        }
    }

    /// Create the bucket if needed, then converge versioning, encryption,
    /// and the documents expiry lifecycle rule.
    pub async fn ensure(&self, spec: &BucketSpec) -> Result<(), ProvisionError> {
        self.create_if_missing(&spec.name).await?;
        self.apply_versioning(spec).await?;
        self.apply_encryption(spec).await?;
        self.apply_lifecycle(spec).await?;
        info!(bucket = %spec.name, "Documents bucket converged");
        Ok(())
    }

    async fn create_if_missing(&self, name: &str) -> Result<(), ProvisionError> {
        let mut request = self.client.create_bucket().bucket(name);

        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(bucket = %name, "Created documents bucket");
                Ok(())
            }
            Err(err) => {
                let err = aws_sdk_s3::Error::from(err);
                match err.code() {
                    Some("BucketAlreadyOwnedByYou") => {
                        debug!(bucket = %name, "Bucket already exists");
                        Ok(())
                    }
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }

    async fn apply_versioning(&self, spec: &BucketSpec) -> Result<(), ProvisionError> {
        if !spec.versioned {
            return Ok(());
        }
        self.client
            .put_bucket_versioning()
            .bucket(&spec.name)
            .versioning_configuration(
                VersioningConfiguration::builder()
                    .status(BucketVersioningStatus::Enabled)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| provision_error(SERVICE, &aws_sdk_s3::Error::from(e)))?;
        Ok(())
    }

    async fn apply_encryption(&self, spec: &BucketSpec) -> Result<(), ProvisionError> {
        let by_default = ServerSideEncryptionByDefault::builder()
            .sse_algorithm(ServerSideEncryption::from(spec.sse_algorithm))
            .build()
            .map_err(definition_error)?;

        let configuration = ServerSideEncryptionConfiguration::builder()
            .rules(
                ServerSideEncryptionRule::builder()
                    .apply_server_side_encryption_by_default(by_default)
                    .build(),
            )
            .build()
            .map_err(definition_error)?;

        self.client
            .put_bucket_encryption()
            .bucket(&spec.name)
            .server_side_encryption_configuration(configuration)
            .send()
            .await
            .map_err(|e| provision_error(SERVICE, &aws_sdk_s3::Error::from(e)))?;
        Ok(())
    }

    async fn apply_lifecycle(&self, spec: &BucketSpec) -> Result<(), ProvisionError> {
        let rule = LifecycleRule::builder()
            .id("expire-documents")
            .status(aws_sdk_s3::types::ExpirationStatus::Enabled)
            .filter(
                LifecycleRuleFilter::builder()
                    .prefix(&spec.document_prefix)
                    .build(),
            )
            .expiration(
                LifecycleExpiration::builder()
                    .days(i32::try_from(spec.expiry_days).unwrap_or(i32::MAX))
                    .build(),
            )
            .build()
            .map_err(definition_error)?;

        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(&spec.name)
            .lifecycle_configuration(
                BucketLifecycleConfiguration::builder()
                    .rules(rule)
                    .build()
                    .map_err(definition_error)?,
            )
            .send()
            .await
            .map_err(|e| provision_error(SERVICE, &aws_sdk_s3::Error::from(e)))?;
        Ok(())
    }

    /// Route object-created events matching the filter rules to the
    /// ingestion function.
    pub async fn configure_notifications(
        &self,
        bucket: &str,
        function_arn: &str,
        rules: &[NotificationRule],
    ) -> Result<(), ProvisionError> {
        let mut configuration = NotificationConfiguration::builder();

        for rule in rules {
            let filter = NotificationConfigurationFilter::builder()
                .key(
                    S3KeyFilter::builder()
                        .filter_rules(
                            FilterRule::builder()
                                .name(FilterRuleName::Prefix)
                                .value(&rule.prefix)
                                .build(),
                        )
                        .filter_rules(
                            FilterRule::builder()
                                .name(FilterRuleName::Suffix)
                                .value(&rule.suffix)
                                .build(),
                        )
                        .build(),
                )
                .build();

            configuration = configuration.lambda_function_configurations(
                LambdaFunctionConfiguration::builder()
                    .id(&rule.id)
                    .lambda_function_arn(function_arn)
                    .events(Event::from("s3:ObjectCreated:*"))
                    .filter(filter)
                    .build()
                    .map_err(definition_error)?,
            );
        }

        self.client
            .put_bucket_notification_configuration()
            .bucket(bucket)
            .notification_configuration(configuration.build())
            .send()
            .await
            .map_err(|e| provision_error(SERVICE, &aws_sdk_s3::Error::from(e)))?;

        info!(bucket = %bucket, rules = rules.len(), "Configured upload notifications");
        Ok(())
    }

    /// Remove all event wiring from the bucket.
    pub async fn clear_notifications(&self, bucket: &str) -> Result<(), ProvisionError> {
        let result = self
            .client
            .put_bucket_notification_configuration()
            .bucket(bucket)
            .notification_configuration(NotificationConfiguration::builder().build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = aws_sdk_s3::Error::from(err);
                match err.code() {
                    Some("NoSuchBucket") => Ok(()),
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }

    /// Delete every object version and delete marker. The stack is
    /// disposable; destroy must not leave a non-empty bucket behind.
    pub async fn empty(&self, bucket: &str) -> Result<(), ProvisionError> {
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;

        loop {
            let mut request = self.client.list_object_versions().bucket(bucket);
            if let Some(marker) = &key_marker {
                request = request.key_marker(marker);
            }
            if let Some(marker) = &version_marker {
                request = request.version_id_marker(marker);
            }

            let page = match request.send().await {
                Ok(page) => page,
                Err(err) => {
                    let err = aws_sdk_s3::Error::from(err);
                    return match err.code() {
                        Some("NoSuchBucket") => Ok(()),
                        _ => Err(provision_error(SERVICE, &err)),
                    };
                }
            };

            let mut identifiers = Vec::new();
            for version in page.versions() {
                if let Some(key) = version.key() {
                    identifiers.push(self.identifier(key, version.version_id())?);
                }
            }
            for marker in page.delete_markers() {
                if let Some(key) = marker.key() {
                    identifiers.push(self.identifier(key, marker.version_id())?);
                }
            }

            if !identifiers.is_empty() {
                debug!(bucket = %bucket, count = identifiers.len(), "Deleting object versions");
                self.client
                    .delete_objects()
                    .bucket(bucket)
                    .delete(
                        Delete::builder()
                            .set_objects(Some(identifiers))
                            .quiet(true)
                            .build()
                            .map_err(definition_error)?,
                    )
                    .send()
                    .await
                    .map_err(|e| provision_error(SERVICE, &aws_sdk_s3::Error::from(e)))?;
            }

            if page.is_truncated() == Some(true) {
                key_marker = page.next_key_marker().map(ToString::to_string);
                version_marker = page.next_version_id_marker().map(ToString::to_string);
            } else {
                return Ok(());
            }
        }
    }

    fn identifier(
        &self,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectIdentifier, ProvisionError> {
        let mut builder = ObjectIdentifier::builder().key(key);
        if let Some(version_id) = version_id {
            builder = builder.version_id(version_id);
        }
        builder.build().map_err(definition_error)
    }

    /// Delete the bucket itself. Absent buckets are fine.
    pub async fn delete(&self, bucket: &str) -> Result<(), ProvisionError> {
        match self.client.delete_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!(bucket = %bucket, "Deleted documents bucket");
                Ok(())
            }
            Err(err) => {
                let err = aws_sdk_s3::Error::from(err);
                match err.code() {
                    Some("NoSuchBucket") => Ok(()),
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }
}
