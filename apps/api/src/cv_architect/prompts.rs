// All LLM prompt constants for the CV Architect.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for JD parsing.
pub const JD_PARSE_SYSTEM: &str = "You are an expert at analysing job descriptions. \
    Extract ALL requirements and details from a job description. \
    Capture every distinct requirement, responsibility and qualification. \
    Do not summarise or consolidate similar items. \
    You MUST respond with valid JSON only. \
    Do NOT use markdown code fences.";

/// JD parsing prompt. Replace `{jd_text}` before sending.
pub const JD_PARSE_PROMPT_TEMPLATE: &str = r#"Analyse this job description and extract ALL requirements.

JOB DESCRIPTION:
{jd_text}

Return a JSON object with this EXACT schema:
{
  "role_title": "exact title from the JD",
  "company": "company name",
  "department": "department or function, or null",
  "seniority_level": "Entry | Mid | Senior | Lead | Manager | Director",
  "requirements": [
    {
      "text": "exact requirement text",
      "category": "Technical | Leadership | Communication | Domain | ...",
      "priority": "MUST-HAVE | SHOULD-HAVE | NICE-TO-HAVE",
      "keywords": ["terms", "to", "mirror"]
    }
  ],
  "tools_mentioned": ["tool"],
  "methodologies": ["Agile"],
  "certifications_mentioned": ["cert"],
  "key_verbs": ["led", "built"],
  "key_terms": ["domain", "terms"]
}

Extract EVERY distinct requirement. Do not summarise."#;

/// System prompt for CV generation.
pub const GENERATION_SYSTEM: &str = "You are an expert CV writer tailoring a candidate's \
    real CV to a specific role for ATS screening. \
    You MUST respond with valid JSON only. \
    Do NOT use markdown code fences. \
    Do NOT invent facts that are not present in the base CV.";

/// CV generation prompt.
/// Replace: {grounding_instruction}, {base_cv}, {jd_analysis}, {revision_notes}
pub const GENERATION_PROMPT_TEMPLATE: &str = r#"{grounding_instruction}

BASE CV (source of truth — ONLY use facts from here):
{base_cv}

JOB DESCRIPTION ANALYSIS:
{jd_analysis}

{revision_notes}

Return a JSON object with this EXACT schema:
{
  "candidate_name": "from the base CV",
  "contact_info": {"email": "", "phone": "", "linkedin": ""},
  "experiences": [
    {
      "company": "real company from the base CV",
      "title": "real title from the base CV",
      "start_date": "YYYY-MM",
      "end_date": "YYYY-MM, or null if current",
      "location": "location",
      "bullets": [
        {
          "text": "Action + context + method + outcome",
          "addresses_requirement": "the JD requirement this addresses",
          "metrics_included": true
        }
      ]
    }
  ],
  "skills_section": "skills text using JD terminology the candidate actually has",
  "education": ["degree details"],
  "certifications": ["cert"],
  "ats_score": 92.5,
  "requirements_covered": 15,
  "total_requirements": 18
}

HARD RULES:
1. Employers, titles, dates, education and certifications are copied from the base CV exactly
2. Metrics appear only if the base CV states them
3. Rephrase and reorder real experience to mirror JD terminology and key verbs
4. 4 bullets per role, 5 at most for the most recent role
5. `ats_score` is your honest 0-100 estimate of keyword and requirement coverage"#;

/// System prompt for the critic pass.
pub const CRITIC_SYSTEM: &str = "You are a CV auditor. \
    Compare a generated CV against the original and flag every problem. \
    Be strict about invented employers, titles, dates, education or metrics. \
    You MUST respond with valid JSON only. \
    Do NOT use markdown code fences.";

/// Critic prompt. Replace: {original_cv}, {generated_cv}, {requirements}
pub const CRITIC_PROMPT_TEMPLATE: &str = r#"Audit this generated CV.

ORIGINAL CV (source of truth):
{original_cv}

GENERATED CV:
{generated_cv}

JOB REQUIREMENTS:
{requirements}

Check:
1. HALLUCINATIONS: employers, titles, dates, education or metrics not in the original
2. ATS COVERAGE: fraction of MUST-HAVE and SHOULD-HAVE requirements addressed
3. QUALITY: bullets without outcomes, weak verbs

Return a JSON object with this EXACT schema:
{
  "passes_validation": true,
  "hallucinations_found": ["each invented fact"],
  "constraint_violations": [],
  "ats_score": 85.5,
  "must_have_coverage": 0.9,
  "should_have_coverage": 0.75,
  "quality_issues": ["issue"],
  "improvement_suggestions": ["specific suggestion"],
  "overall_verdict": "PASS | PASS - MINOR ISSUES | NEEDS_REVISION | FAIL"
}"#;
