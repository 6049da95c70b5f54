use serde::{Deserialize, Serialize};

/// Personal details used to answer application forms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub work_authorized: Option<bool>,
    pub requires_sponsorship: Option<bool>,
    // Voluntary EEO disclosures
    pub veteran_status: Option<String>,
    pub disability_status: Option<String>,
    pub gender: Option<String>,
    pub ethnicity: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub portfolio_url: Option<String>,
}

impl UserProfile {
    pub fn first_name(&self) -> Option<&str> {
        self.full_name.split_whitespace().next()
    }

    pub fn last_name(&self) -> Option<&str> {
        let mut parts = self.full_name.split_whitespace();
        let first = parts.next();
        parts.last().or(first)
    }
}
