// Cross-cutting prompt fragments.
// Each service that needs LLM calls defines its own prompts.rs alongside it.

/// Prepended to every CV generation prompt.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every claim in the CV must be traceable to the base CV provided below. \
    Do NOT infer, interpolate, or invent employers, titles, dates, degrees, \
    certifications, tools or metrics. \
    If the base CV does not support a claim, omit it entirely. \
    Rewording and reordering real experience to match the job is allowed; \
    inventing experience is not.";
