//! CV generation: the LLM-backed `CvArchitect`.
//!
//! Flow: parse_jd → (generate → critic) × up to `max_attempts`.
//! A CV that never passes the critic is still returned with its failing report;
//! the orchestrator decides what to do with it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::cv_architect::critic::validate;
use crate::cv_architect::jd_parser::{parse_jd, JdAnalysis};
use crate::cv_architect::prompts::{GENERATION_PROMPT_TEMPLATE, GENERATION_SYSTEM};
use crate::cv_architect::{CvArchitect, CvExperience, GeneratedCv, ValidationReport};
use crate::errors::ServiceError;
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::LlmClient;
use crate::models::JobRecord;

const MAX_BASE_CV_CHARS: usize = 10_000;

/// Generation output as returned by the LLM; target fields are filled from the job.
#[derive(Debug, Deserialize)]
struct CvDraft {
    candidate_name: String,
    #[serde(default)]
    contact_info: BTreeMap<String, String>,
    #[serde(default)]
    experiences: Vec<CvExperience>,
    #[serde(default)]
    skills_section: String,
    #[serde(default)]
    education: Vec<String>,
    #[serde(default)]
    certifications: Vec<String>,
    #[serde(default)]
    ats_score: f64,
    #[serde(default)]
    requirements_covered: u32,
    #[serde(default)]
    total_requirements: u32,
}

impl CvDraft {
    fn into_cv(self, job: &JobRecord) -> GeneratedCv {
        GeneratedCv {
            target_company: job.company.clone(),
            target_role: job.title.clone(),
            candidate_name: self.candidate_name,
            contact_info: self.contact_info,
            experiences: self.experiences,
            skills_section: self.skills_section,
            education: self.education,
            certifications: self.certifications,
            ats_score: self.ats_score.clamp(0.0, 100.0),
            requirements_covered: self.requirements_covered,
            total_requirements: self.total_requirements,
        }
    }
}

#[derive(Clone)]
pub struct LlmCvArchitect {
    llm: LlmClient,
    max_attempts: u32,
}

impl LlmCvArchitect {
    pub fn new(llm: LlmClient, max_attempts: u32) -> Self {
        Self {
            llm,
            max_attempts: max_attempts.max(1),
        }
    }
}

#[async_trait]
impl CvArchitect for LlmCvArchitect {
    async fn create_tailored_cv(
        &self,
        base_cv: &str,
        job: &JobRecord,
    ) -> Result<(GeneratedCv, ValidationReport), ServiceError> {
        info!("Creating tailored CV for {} - {}", job.company, job.title);

        let analysis = parse_jd(job, &self.llm).await;
        info!("Extracted {} requirements", analysis.requirements.len());

        let mut revision_notes: Vec<String> = vec![];
        let mut last: Option<(GeneratedCv, ValidationReport)> = None;

        for attempt in 1..=self.max_attempts {
            info!("Generation attempt {attempt}/{}", self.max_attempts);
            let cv = generate_cv(&self.llm, base_cv, &analysis, job, &revision_notes).await?;
            let report = validate(&self.llm, base_cv, &cv, &analysis).await;

            if report.passes_validation {
                info!("CV passed validation with ATS score {}", cv.ats_score);
                return Ok((cv, report));
            }

            warn!("CV failed validation: {:?}", report.overall_verdict);
            revision_notes = revision_notes_from(&report);
            last = Some((cv, report));
        }

        warn!("CV did not pass after {} attempts", self.max_attempts);
        last.ok_or_else(|| ServiceError::Malformed("no CV generated".to_string()))
    }
}

async fn generate_cv(
    llm: &LlmClient,
    base_cv: &str,
    analysis: &JdAnalysis,
    job: &JobRecord,
    revision_notes: &[String],
) -> Result<GeneratedCv, ServiceError> {
    let prompt = build_generation_prompt(base_cv, analysis, revision_notes);
    let draft: CvDraft = llm.call_json(&prompt, GENERATION_SYSTEM).await?;
    Ok(draft.into_cv(job))
}

fn build_generation_prompt(base_cv: &str, analysis: &JdAnalysis, revision_notes: &[String]) -> String {
    let base_cv: String = base_cv.chars().take(MAX_BASE_CV_CHARS).collect();
    let notes = if revision_notes.is_empty() {
        String::new()
    } else {
        format!(
            "A previous draft was rejected by the reviewer. Fix these problems:\n{}",
            revision_notes
                .iter()
                .map(|n| format!("- {n}"))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    GENERATION_PROMPT_TEMPLATE
        .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
        .replace("{base_cv}", &base_cv)
        .replace("{jd_analysis}", &analysis.to_prompt_text())
        .replace("{revision_notes}", &notes)
}

/// Hallucinations first, then the critic's suggestions.
fn revision_notes_from(report: &ValidationReport) -> Vec<String> {
    report
        .hallucinations_found
        .iter()
        .map(|h| format!("Remove invented content: {h}"))
        .chain(report.improvement_suggestions.iter().cloned())
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
