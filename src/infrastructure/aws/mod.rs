//! AWS service adapters.
//!
//! One thin client per managed service. Provisioning adapters converge on
//! already-existing resources (conflict errors are observations, not
//! failures) so a re-run of the apply is always safe.

pub mod access;
pub mod bedrock;
pub mod compute;
pub mod conversations;
pub mod knowledge_base;
pub mod storage;
pub mod tables;
pub mod vector;

use anyhow::{Context, Result};
use aws_sdk_s3::error::ProvideErrorMetadata;

use crate::domain::errors::ProvisionError;
use crate::domain::models::AwsSettings;

/// Resolved AWS environment: shared SDK configuration plus the account id
/// and region every ARN is parameterized on.
#[derive(Debug, Clone)]
pub struct AwsEnv {
    pub sdk: aws_config::SdkConfig,
    pub account_id: String,
    pub region: String,
}

impl AwsEnv {
    /// Load SDK configuration honoring the standard resolution chain, with
    /// optional profile/region/account overrides from our own config.
    pub async fn load(settings: &AwsSettings) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(profile) = &settings.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &settings.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }

        let sdk = loader.load().await;

        let region = sdk
            .region()
            .map(|r| r.as_ref().to_string())
            .context("No AWS region configured; set aws.region or AWS_REGION")?;

        let account_id = match &settings.account_id {
            Some(id) => id.clone(),
            None => {
                let sts = aws_sdk_sts::Client::new(&sdk);
                let identity = sts
                    .get_caller_identity()
                    .send()
                    .await
                    .context("Failed to resolve account id through STS")?;
                identity
                    .account()
                    .context("STS returned no account id")?
                    .to_string()
            }
        };

        Ok(Self {
            sdk,
            account_id,
            region,
        })
    }
}

/// Map a service error to a provisioning error, preserving the code.
pub(crate) fn provision_error<E>(service: &'static str, err: &E) -> ProvisionError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    ProvisionError::Api {
        service,
        code: err.code().unwrap_or("Unknown").to_string(),
        message: err
            .message()
            .map_or_else(|| format!("{err:?}"), ToString::to_string),
    }
}

/// Map a failed SDK builder into a definition error.
pub(crate) fn definition_error(err: impl std::fmt::Display) -> ProvisionError {
    ProvisionError::Definition(err.to_string())
}
