use anyhow::{Context, Result};

use crate::cli::output::{create_spinner, format_outputs_table};
use crate::domain::models::Config;
use crate::infrastructure::aws::AwsEnv;
use crate::services::StackProvisioner;

/// Handle the deploy command
pub async fn execute(config: &Config, json: bool) -> Result<()> {
    let env = AwsEnv::load(&config.aws).await?;
    let provisioner = StackProvisioner::new(&env, config);
    let stack_name = provisioner.spec().name.clone();

    let spinner = (!json).then(|| create_spinner(format!("Deploying stack {stack_name}")));

    let result = provisioner.deploy().await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let outputs = result.context("Deployment failed; re-run deploy once the cause is fixed")?;
    super::write_outputs(&outputs)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
    } else {
        println!("Stack {stack_name} deployed successfully!");
        println!("{}", format_outputs_table(&outputs));
        println!("Outputs recorded to {}", super::OUTPUTS_PATH);
    }

    Ok(())
}
