// Notifications: tells the user when a workflow needs them or made progress.
//
// Delivery goes through `NotificationSink`. The in-app inbox is always
// present; Redis pub/sub is added when REDIS_URL is set, and `FanoutSink`
// sends to both.

pub mod handlers;
pub mod inbox;
pub mod pubsub;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::JobRecord;

pub use inbox::InAppNotifications;
pub use pubsub::RedisNotificationSink;

/// Jobs included in the "jobs found" preview.
const PREVIEW_LEN: usize = 5;
/// Question text shown in an "input needed" message.
const QUESTION_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
    ActionRequired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub data: serde_json::Value,
    pub action_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    fn new(
        user_id: Uuid,
        workflow_id: Uuid,
        kind: NotificationKind,
        title: &str,
        message: String,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            workflow_id: Some(workflow_id),
            title: title.to_string(),
            message,
            kind,
            data,
            action_url: None,
            created_at: Utc::now(),
            read: false,
        }
    }

    fn with_action(mut self, url: String) -> Self {
        self.action_url = Some(url);
        self
    }

    /// `jobs` is expected in relevance order; the first few are previewed.
    pub fn jobs_found(user_id: Uuid, workflow_id: Uuid, jobs: &[JobRecord]) -> Self {
        let preview: Vec<_> = jobs
            .iter()
            .take(PREVIEW_LEN)
            .map(|j| {
                json!({
                    "job_id": j.job_id,
                    "company": j.company,
                    "title": j.title,
                    "location": j.location,
                    "relevance_score": j.relevance_score,
                })
            })
            .collect();
        Self::new(
            user_id,
            workflow_id,
            NotificationKind::ActionRequired,
            "Jobs Found",
            format!(
                "Found {} matching jobs. Review and select which to apply to.",
                jobs.len()
            ),
            json!({ "job_count": jobs.len(), "preview": preview }),
        )
        .with_action(format!("/api/v1/workflows/{workflow_id}/jobs"))
    }

    pub fn cv_ready(user_id: Uuid, workflow_id: Uuid, job: &JobRecord, ats_score: f64) -> Self {
        Self::new(
            user_id,
            workflow_id,
            NotificationKind::ActionRequired,
            "CV Ready for Review",
            format!(
                "Your tailored CV for {} - {} is ready (ATS: {ats_score:.0}%)",
                job.company, job.title
            ),
            json!({
                "job_id": job.job_id,
                "company": job.company,
                "title": job.title,
                "ats_score": ats_score,
            }),
        )
        .with_action(format!("/api/v1/workflows/{workflow_id}/cv/{}", job.job_id))
    }

    pub fn input_needed(user_id: Uuid, workflow_id: Uuid, company: &str, questions: &[String]) -> Self {
        let first = questions.first().map(String::as_str).unwrap_or_default();
        let mut preview: String = first.chars().take(QUESTION_PREVIEW_CHARS).collect();
        if first.chars().count() > QUESTION_PREVIEW_CHARS {
            preview.push_str("...");
        }
        let message = match questions.len() {
            0 | 1 => format!("Application for {company} has a question: {preview}"),
            n => format!("Application for {company} has {n} questions, starting with: {preview}"),
        };
        Self::new(
            user_id,
            workflow_id,
            NotificationKind::ActionRequired,
            "Application Needs Input",
            message,
            json!({ "company": company, "questions": questions }),
        )
        .with_action(format!("/api/v1/workflows/{workflow_id}/inputs"))
    }

    pub fn application_submitted(
        user_id: Uuid,
        workflow_id: Uuid,
        job: &JobRecord,
        confirmation: &str,
    ) -> Self {
        Self::new(
            user_id,
            workflow_id,
            NotificationKind::Success,
            "Application Submitted",
            format!("Successfully applied to {} - {}", job.company, job.title),
            json!({
                "job_id": job.job_id,
                "company": job.company,
                "title": job.title,
                "confirmation": confirmation,
            }),
        )
    }

    pub fn workflow_complete(user_id: Uuid, workflow_id: Uuid, submitted: usize, total: usize) -> Self {
        Self::new(
            user_id,
            workflow_id,
            NotificationKind::Success,
            "Job Applications Complete",
            format!("Submitted {submitted} out of {total} applications. Good luck!"),
            json!({ "submitted": submitted, "total": total }),
        )
    }

    pub fn error(user_id: Uuid, workflow_id: Uuid, message: &str) -> Self {
        Self::new(
            user_id,
            workflow_id,
            NotificationKind::Error,
            "Error Occurred",
            message.to_string(),
            json!({}),
        )
    }
}

/// Held by the orchestrator as `Arc<dyn NotificationSink>`. Delivery
/// failures are logged by the caller and never fail a workflow step.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), ServiceError>;
}

/// Delivers to every sink. Succeeds if at least one sink accepted.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn send(&self, notification: &Notification) -> Result<(), ServiceError> {
        let mut delivered = 0;
        let mut last_error = None;
        for sink in &self.sinks {
            match sink.send(notification).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Notification sink failed for {}: {e}", notification.title);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if delivered == 0 => Err(e),
            _ => Ok(()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::context::test_support::job;

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn send(&self, _: &Notification) -> Result<(), ServiceError> {
            Err(ServiceError::Upstream("sink down".to_string()))
        }
    }

    #[test]
    fn test_jobs_found_previews_top_five() {
        let jobs: Vec<_> = (0..8).map(job).collect();
        let n = Notification::jobs_found(Uuid::new_v4(), Uuid::new_v4(), &jobs);
        assert_eq!(n.kind, NotificationKind::ActionRequired);
        assert_eq!(n.data["job_count"], 8);
        assert_eq!(n.data["preview"].as_array().unwrap().len(), 5);
        assert_eq!(n.data["preview"][0]["job_id"], "job-0");
        assert!(!n.read);
    }

    #[test]
    fn test_input_needed_truncates_long_questions() {
        let long = "Please describe in detail a project where you improved a data pipeline".to_string();
        let n = Notification::input_needed(Uuid::new_v4(), Uuid::new_v4(), "Acme", &[long]);
        assert!(n.message.ends_with("..."));
        assert!(n.message.starts_with("Application for Acme has a question: Please describe"));

        let two = vec!["Why us?".to_string(), "Salary?".to_string()];
        let n = Notification::input_needed(Uuid::new_v4(), Uuid::new_v4(), "Acme", &two);
        assert_eq!(n.message, "Application for Acme has 2 questions, starting with: Why us?");
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&NotificationKind::ActionRequired).unwrap(),
            "\"action_required\""
        );
    }

    #[tokio::test]
    async fn test_fanout_succeeds_if_any_sink_delivers() {
        let inbox = Arc::new(InAppNotifications::new());
        let fanout = FanoutSink::new(vec![Arc::new(FailingSink), inbox.clone()]);
        let user = Uuid::new_v4();

        fanout
            .send(&Notification::error(user, Uuid::new_v4(), "boom"))
            .await
            .unwrap();
        assert_eq!(inbox.list(user, false, 50).await.len(), 1);
    }

    #[tokio::test]
    async fn test_fanout_fails_when_every_sink_fails() {
        let fanout = FanoutSink::new(vec![Arc::new(FailingSink), Arc::new(FailingSink)]);
        let result = fanout
            .send(&Notification::error(Uuid::new_v4(), Uuid::new_v4(), "boom"))
            .await;
        assert!(result.is_err());
    }
}
