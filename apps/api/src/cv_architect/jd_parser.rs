//! JD Parser: extracts structured requirements from a job description.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cv_architect::prompts::{JD_PARSE_PROMPT_TEMPLATE, JD_PARSE_SYSTEM};
use crate::llm_client::LlmClient;
use crate::models::JobRecord;

/// Descriptions are cut to this many characters before being sent.
const MAX_JD_CHARS: usize = 8000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "MUST-HAVE")]
    MustHave,
    #[serde(rename = "SHOULD-HAVE")]
    ShouldHave,
    #[default]
    #[serde(rename = "NICE-TO-HAVE", other)]
    NiceToHave,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Priority::MustHave => "MUST-HAVE",
            Priority::ShouldHave => "SHOULD-HAVE",
            Priority::NiceToHave => "NICE-TO-HAVE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JdRequirement {
    pub text: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Full structured output of JD parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JdAnalysis {
    pub role_title: String,
    pub company: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default = "default_seniority")]
    pub seniority_level: String,
    #[serde(default)]
    pub requirements: Vec<JdRequirement>,
    #[serde(default)]
    pub tools_mentioned: Vec<String>,
    #[serde(default)]
    pub methodologies: Vec<String>,
    #[serde(default)]
    pub certifications_mentioned: Vec<String>,
    #[serde(default)]
    pub key_verbs: Vec<String>,
    #[serde(default)]
    pub key_terms: Vec<String>,
}

fn default_seniority() -> String {
    "Mid".to_string()
}

impl JdAnalysis {
    /// Used when the job has no description or the LLM call fails.
    pub fn minimal(job: &JobRecord) -> Self {
        Self {
            role_title: job.title.clone(),
            company: job.company.clone(),
            department: None,
            seniority_level: default_seniority(),
            requirements: vec![],
            tools_mentioned: vec![],
            methodologies: vec![],
            certifications_mentioned: vec![],
            key_verbs: vec![],
            key_terms: vec![],
        }
    }

    /// Numbered requirement list plus keyword hints, as sent to the generator.
    pub fn to_prompt_text(&self) -> String {
        let mut lines = vec![
            format!("Role: {} at {}", self.role_title, self.company),
            format!("Seniority: {}", self.seniority_level),
            format!(
                "Department: {}",
                self.department.as_deref().unwrap_or("Not specified")
            ),
            String::new(),
            "REQUIREMENTS:".to_string(),
        ];
        for (i, req) in self.requirements.iter().enumerate() {
            lines.push(format!("{}. [{}] {}", i + 1, req.priority.label(), req.text));
            if !req.keywords.is_empty() {
                lines.push(format!("   Keywords: {}", req.keywords.join(", ")));
            }
        }
        lines.push(String::new());
        lines.push(format!("Tools mentioned: {}", self.tools_mentioned.join(", ")));
        lines.push(format!("Methodologies: {}", self.methodologies.join(", ")));
        lines.push(format!("Key verbs to use: {}", self.key_verbs.join(", ")));
        lines.push(format!("Key terms to mirror: {}", self.key_terms.join(", ")));
        lines.join("\n")
    }

    /// One `[PRIORITY] text` line per requirement, as sent to the critic.
    pub fn requirements_text(&self) -> String {
        self.requirements
            .iter()
            .map(|r| format!("[{}] {}", r.priority.label(), r.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parses the job's description. Never fails: falls back to `JdAnalysis::minimal`.
pub async fn parse_jd(job: &JobRecord, llm: &LlmClient) -> JdAnalysis {
    let Some(description) = job.description.as_deref().filter(|d| !d.trim().is_empty()) else {
        warn!("No description for {} - {}", job.company, job.title);
        return JdAnalysis::minimal(job);
    };

    let jd_text: String = description.chars().take(MAX_JD_CHARS).collect();
    let prompt = JD_PARSE_PROMPT_TEMPLATE.replace("{jd_text}", &jd_text);

    match llm.call_json::<JdAnalysis>(&prompt, JD_PARSE_SYSTEM).await {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!("JD parsing failed for {} - {}: {e}", job.company, job.title);
            JdAnalysis::minimal(job)
        }
    }
}
