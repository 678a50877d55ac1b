use async_trait::async_trait;

use crate::domain::errors::KnowledgeBaseError;
use crate::domain::models::{IngestionJob, Retrieval};

/// Port for the managed knowledge base: semantic retrieval plus ingestion
/// job control. Retrieval and ranking live entirely behind this seam.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Retrieve relevant chunks for a query. `max_results` is clamped to
    /// the service ceiling of 10.
    async fn retrieve(
        &self,
        query: &str,
        max_results: i32,
        next_token: Option<String>,
    ) -> Result<Retrieval, KnowledgeBaseError>;

    /// Start one ingestion job for the data source. The service processes
    /// the whole data source incrementally, not individual files.
    async fn start_ingestion_job(&self) -> Result<IngestionJob, KnowledgeBaseError>;

    /// Look up an ingestion job by id.
    async fn ingestion_job(&self, job_id: &str) -> Result<IngestionJob, KnowledgeBaseError>;
}
