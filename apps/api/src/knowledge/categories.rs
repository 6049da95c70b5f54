//! Question categories for knowledge entries, detected from question wording.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    YearsOfExperience,
    WorkAuthorization,
    SalaryExpectation,
    NoticePeriod,
    Relocation,
    VeteranStatus,
    Disability,
    Gender,
    Ethnicity,
    #[default]
    General,
}

impl QuestionCategory {
    /// Checked in this order; the first category with a matching pattern wins.
    const DETECTABLE: [QuestionCategory; 9] = [
        QuestionCategory::YearsOfExperience,
        QuestionCategory::WorkAuthorization,
        QuestionCategory::SalaryExpectation,
        QuestionCategory::NoticePeriod,
        QuestionCategory::Relocation,
        QuestionCategory::VeteranStatus,
        QuestionCategory::Disability,
        QuestionCategory::Gender,
        QuestionCategory::Ethnicity,
    ];

    /// Lowercase phrases that identify the category. `General` has none.
    pub fn patterns(self) -> &'static [&'static str] {
        match self {
            QuestionCategory::YearsOfExperience => &[
                "years of experience",
                "how many years",
                "experience with",
                "how long have you",
            ],
            QuestionCategory::WorkAuthorization => &[
                "authorized to work",
                "work permit",
                "visa sponsorship",
                "require sponsorship",
                "legally authorized",
                "employment eligibility",
            ],
            QuestionCategory::SalaryExpectation => &[
                "salary expectation",
                "compensation expectation",
                "desired salary",
                "expected compensation",
            ],
            QuestionCategory::NoticePeriod => &[
                "notice period",
                "when can you start",
                "start date",
                "availability",
            ],
            QuestionCategory::Relocation => &[
                "willing to relocate",
                "open to relocation",
                "relocation assistance",
            ],
            QuestionCategory::VeteranStatus => {
                &["veteran status", "military service", "served in military"]
            }
            QuestionCategory::Disability => &["disability", "accommodation"],
            QuestionCategory::Gender => &["gender", "male or female"],
            QuestionCategory::Ethnicity => &["race", "ethnicity", "ethnic background"],
            QuestionCategory::General => &[],
        }
    }

    pub fn detect(question: &str) -> Self {
        let question = question.to_lowercase();
        Self::DETECTABLE
            .into_iter()
            .find(|category| category.matches(&question))
            .unwrap_or(QuestionCategory::General)
    }

    /// `question` must already be lowercase.
    pub fn matches(self, question: &str) -> bool {
        self.patterns().iter().any(|p| question.contains(p))
    }

    /// Voluntary self-identification questions that may be declined.
    pub fn is_eeo(self) -> bool {
        matches!(
            self,
            QuestionCategory::VeteranStatus
                | QuestionCategory::Disability
                | QuestionCategory::Gender
                | QuestionCategory::Ethnicity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_categories_case_insensitively() {
        assert_eq!(
            QuestionCategory::detect("Are you LEGALLY AUTHORIZED to work in the US?"),
            QuestionCategory::WorkAuthorization
        );
        assert_eq!(
            QuestionCategory::detect("How many years of Python do you have?"),
            QuestionCategory::YearsOfExperience
        );
        assert_eq!(
            QuestionCategory::detect("Do you identify as a protected veteran? (Veteran status)"),
            QuestionCategory::VeteranStatus
        );
    }

    #[test]
    fn test_unknown_question_is_general() {
        assert_eq!(
            QuestionCategory::detect("What is your favourite database?"),
            QuestionCategory::General
        );
        assert!(QuestionCategory::General.patterns().is_empty());
    }

    #[test]
    fn test_first_matching_category_wins() {
        // "start date" (notice period) and "relocation assistance" both match
        assert_eq!(
            QuestionCategory::detect("Start date and relocation assistance needs"),
            QuestionCategory::NoticePeriod
        );
    }

    #[test]
    fn test_eeo_categories() {
        assert!(QuestionCategory::Gender.is_eeo());
        assert!(QuestionCategory::Disability.is_eeo());
        assert!(!QuestionCategory::WorkAuthorization.is_eeo());
    }
}
