use anyhow::{Context, Result};

use crate::cli::output::create_spinner;
use crate::domain::models::Config;
use crate::infrastructure::aws::AwsEnv;
use crate::services::StackProvisioner;

/// Handle the destroy command
pub async fn execute(config: &Config, force: bool, json: bool) -> Result<()> {
    if !force {
        anyhow::bail!(
            "Destroying the stack deletes every stored document and conversation. \
             Re-run with --force to confirm"
        );
    }

    let env = AwsEnv::load(&config.aws).await?;
    let provisioner = StackProvisioner::new(&env, config);
    let stack_name = provisioner.spec().name.clone();

    let spinner = (!json).then(|| create_spinner(format!("Destroying stack {stack_name}")));

    let result = provisioner.destroy().await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    result.context("Teardown failed; re-run destroy to finish removing resources")?;

    // Recorded outputs describe resources that no longer exist
    let _ = std::fs::remove_file(super::OUTPUTS_PATH);

    if json {
        println!(
            "{}",
            serde_json::json!({ "stack": stack_name, "destroyed": true })
        );
    } else {
        println!("Stack {stack_name} destroyed.");
    }

    Ok(())
}
