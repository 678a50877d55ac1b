//! IAM role adapter.
//!
//! Each role carries exactly one inline policy. Converging a role rewrites
//! that policy, so permission changes in the synthesized documents land on
//! re-deploy.

use aws_sdk_iam::error::ProvideErrorMetadata;
use tracing::{debug, info};

use super::provision_error;
use crate::domain::errors::ProvisionError;
use crate::domain::models::{PolicyDocument, RoleSpec};

const SERVICE: &str = "iam";

pub struct RoleClient {
    client: aws_sdk_iam::Client,
}

impl RoleClient {
    pub fn new(env: &super::AwsEnv) -> Self {
        Self {
            client: aws_sdk_iam::Client::new(&env.sdk),
        }
    }

    /// Create the role if needed and attach its inline policy. Returns the
    /// role ARN.
    pub async fn ensure(
        &self,
        role: &RoleSpec,
        policy: &PolicyDocument,
    ) -> Result<String, ProvisionError> {
        let trust = role
            .trust
            .to_json()
            .map_err(|e| ProvisionError::Definition(e.to_string()))?;

        let arn = match self
            .client
            .create_role()
            .role_name(&role.name)
            .assume_role_policy_document(trust)
            .send()
            .await
        {
            Ok(output) => {
                let arn = output
                    .role()
                    .ok_or(ProvisionError::MissingField("role"))?
                    .arn()
                    .to_string();
                info!(role = %role.name, "Created role");
                arn
            }
            Err(err) => {
                let err = aws_sdk_iam::Error::from(err);
                match err.code() {
                    Some("EntityAlreadyExists") => {
                        debug!(role = %role.name, "Role already exists");
                        self.lookup_arn(&role.name).await?
                    }
                    _ => return Err(provision_error(SERVICE, &err)),
                }
            }
        };

        let document = policy
            .to_json()
            .map_err(|e| ProvisionError::Definition(e.to_string()))?;

        self.client
            .put_role_policy()
            .role_name(&role.name)
            .policy_name(&role.policy_name)
            .policy_document(document)
            .send()
            .await
            .map_err(|e| provision_error(SERVICE, &aws_sdk_iam::Error::from(e)))?;

        debug!(role = %role.name, policy = %role.policy_name, "Attached inline policy");
        Ok(arn)
    }

    async fn lookup_arn(&self, role_name: &str) -> Result<String, ProvisionError> {
        let output = self
            .client
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| provision_error(SERVICE, &aws_sdk_iam::Error::from(e)))?;

        Ok(output
            .role()
            .ok_or(ProvisionError::MissingField("role"))?
            .arn()
            .to_string())
    }

    /// Delete the role and its inline policy. Absent entities are fine.
    pub async fn delete(&self, role: &RoleSpec) -> Result<(), ProvisionError> {
        let result = self
            .client
            .delete_role_policy()
            .role_name(&role.name)
            .policy_name(&role.policy_name)
            .send()
            .await;
        if let Err(err) = result {
            let err = aws_sdk_iam::Error::from(err);
            if err.code() != Some("NoSuchEntity") {
                return Err(provision_error(SERVICE, &err));
            }
        }

        match self
            .client
            .delete_role()
            .role_name(&role.name)
            .send()
            .await
        {
            Ok(_) => {
                info!(role = %role.name, "Deleted role");
                Ok(())
            }
            Err(err) => {
                let err = aws_sdk_iam::Error::from(err);
                match err.code() {
                    Some("NoSuchEntity") => Ok(()),
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }
}
