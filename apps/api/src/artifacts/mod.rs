// Artifacts: archive of approved tailored CVs, stored as rendered markdown
// under `cvs/<workflow_id>/<job_id>.md`.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::errors::ServiceError;

pub fn cv_key(workflow_id: Uuid, job_id: &str) -> String {
    format!("cvs/{workflow_id}/{}.md", job_id.replace('/', "_"))
}

/// Held by the orchestrator as `Arc<dyn CvArchive>`. Failures are logged by
/// the caller and never fail a workflow step.
#[async_trait]
pub trait CvArchive: Send + Sync {
    /// Returns the key the CV was stored under.
    async fn store(&self, workflow_id: Uuid, job_id: &str, markdown: &str) -> Result<String, ServiceError>;
}

pub struct S3CvArchive {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3CvArchive {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl CvArchive for S3CvArchive {
    async fn store(&self, workflow_id: Uuid, job_id: &str, markdown: &str) -> Result<String, ServiceError> {
        let key = cv_key(workflow_id, job_id);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("text/markdown; charset=utf-8")
            .body(ByteStream::from(Bytes::from(markdown.to_owned())))
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("s3 put {key}: {e}")))?;
        info!("Archived CV to s3://{}/{key}", self.bucket);
        Ok(key)
    }
}

/// Used when no bucket is configured.
#[derive(Default)]
pub struct InMemoryCvArchive {
    objects: RwLock<HashMap<String, String>>,
}

impl InMemoryCvArchive {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn get(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).cloned()
    }
}

#[async_trait]
impl CvArchive for InMemoryCvArchive {
    async fn store(&self, workflow_id: Uuid, job_id: &str, markdown: &str) -> Result<String, ServiceError> {
        let key = cv_key(workflow_id, job_id);
        self.objects
            .write()
            .await
            .insert(key.clone(), markdown.to_string());
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cv_key_layout() {
        let wf = Uuid::nil();
        assert_eq!(
            cv_key(wf, "greenhouse:stripe:42"),
            "cvs/00000000-0000-0000-0000-000000000000/greenhouse:stripe:42.md"
        );
        assert!(cv_key(wf, "a/b").ends_with("/a_b.md"));
    }

    #[tokio::test]
    async fn test_in_memory_archive_overwrites() {
        let archive = InMemoryCvArchive::new();
        let wf = Uuid::new_v4();
        archive.store(wf, "job-1", "# v1").await.unwrap();
        let key = archive.store(wf, "job-1", "# v2").await.unwrap();
        assert_eq!(archive.get(&key).await.as_deref(), Some("# v2"));
    }
}
