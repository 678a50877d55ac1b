//! Table output formatting for CLI commands using comfy-table.

use comfy_table::{presets, Attribute, Cell, ContentArrangement, Table};

use crate::domain::models::{SourceRef, StackOutputs};

fn create_base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Render stack outputs as a two-column table.
pub fn format_outputs_table(outputs: &StackOutputs) -> String {
    let mut table = create_base_table();
    table.set_header(vec![
        Cell::new("Output").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
    ]);

    table.add_row(vec!["Stack", outputs.stack_name.as_str()]);
    table.add_row(vec!["Region", outputs.region.as_str()]);
    table.add_row(vec!["Bucket", outputs.bucket_name.as_str()]);
    table.add_row(vec!["Knowledge base id", outputs.knowledge_base_id.as_str()]);
    table.add_row(vec!["Data source id", outputs.data_source_id.as_str()]);
    table.add_row(vec!["Collection ARN", outputs.collection_arn.as_str()]);
    table.add_row(vec!["Ingestion function", outputs.ingestion_function_arn.as_str()]);
    table.add_row(vec!["Retrieval function", outputs.retrieval_function_arn.as_str()]);
    table.add_row(vec!["Conversations table", outputs.conversations_table.as_str()]);

    table.to_string()
}

/// Render retrieval sources as a table.
pub fn format_sources_table(sources: &[SourceRef]) -> String {
    let mut table = create_base_table();
    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Source").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);

    for (i, source) in sources.iter().enumerate() {
        let uri = source.uri.as_deref().unwrap_or("-");
        let score = source
            .score
            .map_or_else(|| "-".to_string(), |s| format!("{s:.3}"));
        table.add_row(vec![(i + 1).to_string(), uri.to_string(), score]);
    }

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_outputs_table_lists_every_output() {
        let outputs = StackOutputs {
            stack_name: "agentic-rag".to_string(),
            region: "us-east-1".to_string(),
            bucket_name: "agentic-rag-documents-123456789012-us-east-1".to_string(),
            knowledge_base_id: "KB123".to_string(),
            data_source_id: "DS456".to_string(),
            collection_arn: "arn:aws:aoss:us-east-1:123456789012:collection/abc".to_string(),
            ingestion_function_arn: "arn:aws:lambda:us-east-1:123456789012:function:agentic-rag-ingestion".to_string(),
            retrieval_function_arn: "arn:aws:lambda:us-east-1:123456789012:function:agentic-rag-retrieval".to_string(),
            conversations_table: "agentic-rag-conversations".to_string(),
            deployed_at: Utc::now(),
        };

        let rendered = format_outputs_table(&outputs);
        assert!(rendered.contains("KB123"));
        assert!(rendered.contains("agentic-rag-conversations"));
        assert!(rendered.contains("collection/abc"));
    }

    #[test]
    fn test_sources_table_handles_missing_fields() {
        let sources = vec![SourceRef {
            uri: None,
            score: None,
        }];
        let rendered = format_sources_table(&sources);
        assert!(rendered.contains('-'));
    }
}
