// CV Architect: tailors the user's base CV to one job.
// Pipeline: JD parse → generate → critic, retried up to `cv_max_attempts`.
// All LLM calls go through llm_client.

pub mod critic;
pub mod generator;
pub mod handlers;
pub mod jd_parser;
pub mod prompts;
pub mod render;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::models::JobRecord;

pub use generator::LlmCvArchitect;

// ────────────────────────────────────────────────────────────────────────────
// Generated CV
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvBullet {
    pub text: String,
    /// The JD requirement this bullet speaks to, if any.
    #[serde(default)]
    pub addresses_requirement: Option<String>,
    #[serde(default)]
    pub metrics_included: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvExperience {
    pub company: String,
    pub title: String,
    pub start_date: String,
    /// None means "Present".
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub bullets: Vec<CvBullet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCv {
    pub target_company: String,
    pub target_role: String,
    pub candidate_name: String,
    #[serde(default)]
    pub contact_info: BTreeMap<String, String>,
    #[serde(default)]
    pub experiences: Vec<CvExperience>,
    #[serde(default)]
    pub skills_section: String,
    #[serde(default)]
    pub education: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    /// 0 – 100 ATS relevance estimate.
    pub ats_score: f64,
    #[serde(default)]
    pub requirements_covered: u32,
    #[serde(default)]
    pub total_requirements: u32,
}

// ────────────────────────────────────────────────────────────────────────────
// Validation report
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "PASS - MINOR ISSUES")]
    PassMinorIssues,
    #[serde(rename = "NEEDS_REVISION")]
    NeedsRevision,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "FAIL - HALLUCINATIONS")]
    FailHallucinations,
    #[serde(rename = "FAIL - LOW COVERAGE")]
    FailLowCoverage,
    #[serde(rename = "ERROR")]
    Error,
    #[default]
    #[serde(other, rename = "UNKNOWN")]
    Unknown,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        matches!(self, Verdict::Pass | Verdict::PassMinorIssues)
    }
}

/// The critic's audit of a generated CV against the base CV and the JD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationReport {
    pub passes_validation: bool,
    /// Employers, titles, dates or education not present in the base CV.
    pub hallucinations_found: Vec<String>,
    pub constraint_violations: Vec<String>,
    pub ats_score: f64,
    /// Fraction (0.0 – 1.0) of MUST-HAVE requirements addressed.
    pub must_have_coverage: f64,
    pub should_have_coverage: f64,
    pub quality_issues: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub overall_verdict: Verdict,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Pluggable CV tailoring backend. Held by the orchestrator as `Arc<dyn CvArchitect>`.
#[async_trait]
pub trait CvArchitect: Send + Sync {
    async fn create_tailored_cv(
        &self,
        base_cv: &str,
        job: &JobRecord,
    ) -> Result<(GeneratedCv, ValidationReport), ServiceError>;

    /// `ats_threshold` is a fraction of 100 (0.85 → ATS score 85).
    fn should_auto_approve(
        &self,
        cv: &GeneratedCv,
        report: &ValidationReport,
        ats_threshold: f64,
    ) -> bool {
        meets_auto_approval(cv, report, ats_threshold)
    }
}

/// Auto-approval criteria for autonomous mode: validation passed, the critic's
/// verdict is a pass, the ATS score reaches the threshold, nothing was hallucinated.
pub fn meets_auto_approval(cv: &GeneratedCv, report: &ValidationReport, ats_threshold: f64) -> bool {
    report.passes_validation
        && report.overall_verdict.is_pass()
        && cv.ats_score >= ats_threshold * 100.0
        && report.hallucinations_found.is_empty()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
