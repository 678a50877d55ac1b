//! Document ingestion triggering.
//!
//! Mirrors the event-driven flow: uploads matching the notification filter
//! rules lead to exactly one ingestion job per batch — the knowledge base
//! processes the whole data source incrementally, never individual files.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::domain::errors::KnowledgeBaseError;
use crate::domain::models::{IngestionJob, NotificationRule};
use crate::domain::ports::KnowledgeBase;

const POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct IngestionService {
    knowledge_base: Arc<dyn KnowledgeBase>,
}

impl IngestionService {
    pub fn new(knowledge_base: Arc<dyn KnowledgeBase>) -> Self {
        Self { knowledge_base }
    }

    /// Start one ingestion job for a batch of uploaded object keys.
    ///
    /// When keys are given, only those matching a filter rule count; a
    /// batch with no matching keys starts nothing and returns `None`. An
    /// empty batch means "ingest whatever is in the data source" and always
    /// starts a job.
    pub async fn trigger(
        &self,
        keys: &[String],
        rules: &[NotificationRule],
    ) -> Result<Option<IngestionJob>, KnowledgeBaseError> {
        if !keys.is_empty() {
            let matching: Vec<&String> = keys
                .iter()
                .filter(|key| rules.iter().any(|rule| rule.matches(key)))
                .collect();

            if matching.is_empty() {
                warn!("No uploaded keys match the document filters; nothing to ingest");
                return Ok(None);
            }

            for key in &matching {
                info!(key = %key, "Detected document upload");
            }
            info!(count = matching.len(), "Starting ingestion job for uploaded file(s)");
        }

        let job = self.knowledge_base.start_ingestion_job().await?;
        Ok(Some(job))
    }

    /// Look up an ingestion job.
    pub async fn job_status(&self, job_id: &str) -> Result<IngestionJob, KnowledgeBaseError> {
        self.knowledge_base.ingestion_job(job_id).await
    }

    /// Poll a job until the service reports a terminal status.
    pub async fn wait_terminal(&self, job_id: &str) -> Result<IngestionJob, KnowledgeBaseError> {
        loop {
            let job = self.knowledge_base.ingestion_job(job_id).await?;
            if job.is_terminal() {
                return Ok(job);
            }
            info!(job = %job.id, status = %job.status, "Ingestion job still running");
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::domain::models::Retrieval;

    #[derive(Default)]
    struct CountingKnowledgeBase {
        started: AtomicU32,
    }

    #[async_trait]
    impl KnowledgeBase for CountingKnowledgeBase {
        async fn retrieve(
            &self,
            _query: &str,
            _max_results: i32,
            _next_token: Option<String>,
        ) -> Result<Retrieval, KnowledgeBaseError> {
            Ok(Retrieval::default())
        }

        async fn start_ingestion_job(&self) -> Result<IngestionJob, KnowledgeBaseError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(IngestionJob {
                id: "job-1".to_string(),
                status: "STARTING".to_string(),
            })
        }

        async fn ingestion_job(&self, job_id: &str) -> Result<IngestionJob, KnowledgeBaseError> {
            Ok(IngestionJob {
                id: job_id.to_string(),
                status: "COMPLETE".to_string(),
            })
        }
    }

    fn rules() -> Vec<NotificationRule> {
        vec![
            NotificationRule {
                id: "pdf-uploads".to_string(),
                prefix: "documents/".to_string(),
                suffix: ".pdf".to_string(),
            },
            NotificationRule {
                id: "txt-uploads".to_string(),
                prefix: "documents/".to_string(),
                suffix: ".txt".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn test_one_job_per_batch() {
        let kb = Arc::new(CountingKnowledgeBase::default());
        let service = IngestionService::new(Arc::clone(&kb) as Arc<dyn KnowledgeBase>);

        let keys = vec![
            "documents/a.pdf".to_string(),
            "documents/b.pdf".to_string(),
            "documents/c.txt".to_string(),
        ];
        let job = service.trigger(&keys, &rules()).await.unwrap();

        assert!(job.is_some());
        assert_eq!(kb.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_matching_keys_start_nothing() {
        let kb = Arc::new(CountingKnowledgeBase::default());
        let service = IngestionService::new(Arc::clone(&kb) as Arc<dyn KnowledgeBase>);

        let keys = vec![
            "documents/archive.zip".to_string(),
            "uploads/readme.txt".to_string(),
        ];
        let job = service.trigger(&keys, &rules()).await.unwrap();

        assert!(job.is_none());
        assert_eq!(kb.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_ingests_data_source() {
        let kb = Arc::new(CountingKnowledgeBase::default());
        let service = IngestionService::new(Arc::clone(&kb) as Arc<dyn KnowledgeBase>);

        let job = service.trigger(&[], &rules()).await.unwrap();

        assert!(job.is_some());
        assert_eq!(kb.started.load(Ordering::SeqCst), 1);
    }
}
