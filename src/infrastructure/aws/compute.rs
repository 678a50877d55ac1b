//! Compute function adapter (Lambda).

use std::collections::BTreeMap;
use std::time::Duration;

use aws_sdk_lambda::error::ProvideErrorMetadata;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Environment, FunctionCode, Runtime};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::provision_error;
use crate::domain::errors::ProvisionError;
use crate::domain::models::FunctionSpec;

const SERVICE: &str = "lambda";

// A freshly created role takes a few seconds to become assumable.
const CREATE_ATTEMPTS: u32 = 6;
const CREATE_RETRY_INTERVAL: Duration = Duration::from_secs(5);

pub struct FunctionClient {
    client: aws_sdk_lambda::Client,
}

impl FunctionClient {
    pub fn new(env: &super::AwsEnv) -> Self {
        Self {
            client: aws_sdk_lambda::Client::new(&env.sdk),
        }
    }

    /// Create the function, or converge code and configuration when it
    /// already exists. Returns the function ARN.
    pub async fn ensure(
        &self,
        spec: &FunctionSpec,
        role_arn: &str,
        environment: BTreeMap<String, String>,
    ) -> Result<String, ProvisionError> {
        let package = self.read_package(spec)?;
        let env = Environment::builder()
            .set_variables(Some(environment.into_iter().collect()))
            .build();

        let mut attempt = 0;
        loop {
            let result = self
                .client
                .create_function()
                .function_name(&spec.name)
                .role(role_arn)
                .runtime(Runtime::from(spec.runtime.as_str()))
                .handler(&spec.handler)
                .timeout(spec.timeout_secs)
                .memory_size(spec.memory_mb)
                .environment(env.clone())
                .code(
                    FunctionCode::builder()
                        .zip_file(Blob::new(package.clone()))
                        .build(),
                )
                .send()
                .await;

            match result {
                Ok(output) => {
                    let arn = output
                        .function_arn()
                        .ok_or(ProvisionError::MissingField("functionArn"))?
                        .to_string();
                    info!(function = %spec.name, "Created function");
                    return Ok(arn);
                }
                Err(err) => {
                    let err = aws_sdk_lambda::Error::from(err);
                    match err.code() {
                        Some("ResourceConflictException") => {
                            debug!(function = %spec.name, "Function already exists, updating");
                            return self.update(spec, role_arn, env, package).await;
                        }
                        // The role has not propagated yet
                        Some("InvalidParameterValueException")
                            if attempt + 1 < CREATE_ATTEMPTS =>
                        {
                            attempt += 1;
                            warn!(
                                function = %spec.name,
                                attempt,
                                "Role not yet assumable, retrying"
                            );
                            sleep(CREATE_RETRY_INTERVAL).await;
                        }
                        _ => return Err(provision_error(SERVICE, &err)),
                    }
                }
            }
        }
    }

    async fn update(
        &self,
        spec: &FunctionSpec,
        role_arn: &str,
        env: Environment,
        package: Vec<u8>,
    ) -> Result<String, ProvisionError> {
        self.client
            .update_function_configuration()
            .function_name(&spec.name)
            .role(role_arn)
            .runtime(Runtime::from(spec.runtime.as_str()))
            .handler(&spec.handler)
            .timeout(spec.timeout_secs)
            .memory_size(spec.memory_mb)
            .environment(env)
            .send()
            .await
            .map_err(|e| provision_error(SERVICE, &aws_sdk_lambda::Error::from(e)))?;

        let output = self
            .client
            .update_function_code()
            .function_name(&spec.name)
            .zip_file(Blob::new(package))
            .send()
            .await
            .map_err(|e| provision_error(SERVICE, &aws_sdk_lambda::Error::from(e)))?;

        output
            .function_arn()
            .map(ToString::to_string)
            .ok_or(ProvisionError::MissingField("functionArn"))
    }

    fn read_package(&self, spec: &FunctionSpec) -> Result<Vec<u8>, ProvisionError> {
        let path = spec.code_path.as_ref().ok_or_else(|| {
            ProvisionError::MissingArtifact(format!(
                "no code_path configured for function {}",
                spec.name
            ))
        })?;

        std::fs::read(path)
            .map_err(|e| ProvisionError::MissingArtifact(format!("{}: {e}", path.display())))
    }

    /// Permit the documents bucket to invoke the function.
    pub async fn allow_bucket_invoke(
        &self,
        function_name: &str,
        bucket_arn: &str,
        account_id: &str,
    ) -> Result<(), ProvisionError> {
        let result = self
            .client
            .add_permission()
            .function_name(function_name)
            .statement_id("documents-bucket-invoke")
            .action("lambda:InvokeFunction")
            .principal("s3.amazonaws.com")
            .source_arn(bucket_arn)
            .source_account(account_id)
            .send()
            .await;

        match result {
            Ok(_) => {
                debug!(function = %function_name, "Granted bucket invoke permission");
                Ok(())
            }
            Err(err) => {
                let err = aws_sdk_lambda::Error::from(err);
                match err.code() {
                    Some("ResourceConflictException") => Ok(()),
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }

    /// Delete the function. Absence is fine.
    pub async fn delete(&self, function_name: &str) -> Result<(), ProvisionError> {
        match self
            .client
            .delete_function()
            .function_name(function_name)
            .send()
            .await
        {
            Ok(_) => {
                info!(function = %function_name, "Deleted function");
                Ok(())
            }
            Err(err) => {
                let err = aws_sdk_lambda::Error::from(err);
                match err.code() {
                    Some("ResourceNotFoundException") => Ok(()),
                    _ => Err(provision_error(SERVICE, &err)),
                }
            }
        }
    }
}
