//! Critic: audits a generated CV for hallucinations and requirement coverage.

use tracing::{info, warn};

use crate::cv_architect::jd_parser::JdAnalysis;
use crate::cv_architect::prompts::{CRITIC_PROMPT_TEMPLATE, CRITIC_SYSTEM};
use crate::cv_architect::render::render_plain;
use crate::cv_architect::{GeneratedCv, ValidationReport, Verdict};
use crate::llm_client::LlmClient;

/// Below this MUST-HAVE coverage a CV fails regardless of the critic's verdict.
pub const MIN_MUST_HAVE_COVERAGE: f64 = 0.80;

const MAX_CV_CHARS: usize = 6000;
const MAX_REQUIREMENTS_CHARS: usize = 2000;

/// Runs the critic. An LLM failure yields a failing report with `Verdict::Error`.
pub async fn validate(
    llm: &LlmClient,
    base_cv: &str,
    cv: &GeneratedCv,
    analysis: &JdAnalysis,
) -> ValidationReport {
    let prompt = CRITIC_PROMPT_TEMPLATE
        .replace("{original_cv}", &truncate(base_cv, MAX_CV_CHARS))
        .replace("{generated_cv}", &truncate(&render_plain(cv), MAX_CV_CHARS))
        .replace(
            "{requirements}",
            &truncate(&analysis.requirements_text(), MAX_REQUIREMENTS_CHARS),
        );

    let report = match llm.call_json::<ValidationReport>(&prompt, CRITIC_SYSTEM).await {
        Ok(report) => enforce_hard_rules(report),
        Err(e) => {
            warn!("CV validation call failed: {e}");
            ValidationReport {
                passes_validation: false,
                ats_score: cv.ats_score,
                quality_issues: vec![format!("Validation failed: {e}")],
                overall_verdict: Verdict::Error,
                ..Default::default()
            }
        }
    };

    info!("CV validation: {:?}", report.overall_verdict);
    report
}

/// Hallucinations and low MUST-HAVE coverage fail the CV whatever the critic said.
pub fn enforce_hard_rules(mut report: ValidationReport) -> ValidationReport {
    if !report.hallucinations_found.is_empty() {
        report.passes_validation = false;
        report.overall_verdict = Verdict::FailHallucinations;
    } else if report.must_have_coverage < MIN_MUST_HAVE_COVERAGE {
        report.passes_validation = false;
        report.overall_verdict = Verdict::FailLowCoverage;
    }
    report
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
