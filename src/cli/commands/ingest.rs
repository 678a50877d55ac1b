use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::output::create_spinner;
use crate::cli::types::IngestCommands;
use crate::domain::models::{notification_rules, Config};
use crate::domain::ports::KnowledgeBase;
use crate::infrastructure::aws::bedrock::BedrockKnowledgeBase;
use crate::infrastructure::aws::AwsEnv;
use crate::infrastructure::retry::RetryPolicy;
use crate::services::IngestionService;

/// Handle ingest subcommands
pub async fn execute(config: &Config, command: IngestCommands, json: bool) -> Result<()> {
    let outputs = super::read_outputs()?;
    let env = AwsEnv::load(&config.aws).await?;

    let knowledge_base = Arc::new(BedrockKnowledgeBase::new(
        &env,
        outputs.knowledge_base_id.clone(),
        outputs.data_source_id.clone(),
        RetryPolicy::from_config(&config.retry),
    )) as Arc<dyn KnowledgeBase>;
    let service = IngestionService::new(knowledge_base);

    match command {
        IngestCommands::Run { keys, wait } => {
            let rules = notification_rules(&config.bucket.document_prefix);
            let job = service
                .trigger(&keys, &rules)
                .await
                .context("Failed to start ingestion job")?;

            let Some(job) = job else {
                if json {
                    println!("{}", serde_json::json!({ "message": "no matching documents" }));
                } else {
                    println!("No uploaded keys match the document filters; nothing to ingest.");
                }
                return Ok(());
            };

            let job = if wait {
                let spinner =
                    (!json).then(|| create_spinner(format!("Waiting for ingestion job {}", job.id)));
                let finished = service.wait_terminal(&job.id).await;
                if let Some(spinner) = spinner {
                    spinner.finish_and_clear();
                }
                finished.context("Failed while waiting for ingestion job")?
            } else {
                job
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else {
                println!("Ingestion job {} is {}", job.id, job.status);
            }
        }

        IngestCommands::Status { job_id } => {
            let job = service
                .job_status(&job_id)
                .await
                .context("Failed to look up ingestion job")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else {
                println!("Ingestion job {} is {}", job.id, job.status);
            }
        }
    }

    Ok(())
}
