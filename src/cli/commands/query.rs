use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::output::format_sources_table;
use crate::domain::models::{Config, RagRequest};
use crate::domain::ports::{ConversationStore, KnowledgeBase, TextGenerator};
use crate::infrastructure::aws::bedrock::{BedrockGenerator, BedrockKnowledgeBase};
use crate::infrastructure::aws::conversations::DynamoConversationStore;
use crate::infrastructure::aws::AwsEnv;
use crate::infrastructure::retry::RetryPolicy;
use crate::services::{ConversationService, RagService, RagSettings};

/// Handle the query command
pub async fn execute(
    config: &Config,
    question: String,
    conversation: Option<String>,
    max_results: Option<i32>,
    json: bool,
) -> Result<()> {
    let request = RagRequest::new(question, conversation)?;

    let outputs = super::read_outputs()?;
    let env = AwsEnv::load(&config.aws).await?;
    let retry = RetryPolicy::from_config(&config.retry);

    let knowledge_base = Arc::new(BedrockKnowledgeBase::new(
        &env,
        outputs.knowledge_base_id.clone(),
        outputs.data_source_id.clone(),
        retry.clone(),
    )) as Arc<dyn KnowledgeBase>;
    let generator = Arc::new(BedrockGenerator::new(&env)) as Arc<dyn TextGenerator>;
    let store = Arc::new(DynamoConversationStore::new(
        &env,
        outputs.conversations_table.clone(),
        retry,
    )) as Arc<dyn ConversationStore>;

    let conversations = ConversationService::new(store, config.conversations.message_ttl_secs);

    let mut settings = RagSettings::from_config(config);
    if let Some(max_results) = max_results {
        anyhow::ensure!(
            (1..=10).contains(&max_results),
            "max_results must be between 1 and 10, got {max_results}"
        );
        settings.max_results = max_results;
    }

    let service = RagService::new(knowledge_base, generator, conversations, settings);
    let response = service
        .answer(request)
        .await
        .context("Query failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{}", response.response);
        println!();
        if !response.sources.is_empty() {
            println!("{}", format_sources_table(&response.sources));
        }
        println!("Conversation: {}", response.conversation_id);
        println!("Model: {}", response.model_used);
    }

    Ok(())
}
