//! Deterministic markdown rendering of a generated CV. No LLM involved.

use crate::cv_architect::GeneratedCv;

pub fn render_markdown(cv: &GeneratedCv) -> String {
    let mut lines = vec![format!("# {}", cv.candidate_name), String::new()];

    let contact: Vec<&str> = ["email", "phone", "linkedin"]
        .iter()
        .filter_map(|key| cv.contact_info.get(*key))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .collect();
    if !contact.is_empty() {
        lines.push(contact.join(" | "));
        lines.push(String::new());
    }

    for exp in &cv.experiences {
        lines.push(format!("## {}", exp.title));
        lines.push(format!(
            "**{}** | {} - {}",
            exp.company,
            exp.start_date,
            exp.end_date.as_deref().unwrap_or("Present")
        ));
        lines.push(String::new());
        for bullet in &exp.bullets {
            lines.push(format!("- {}", bullet.text));
        }
        lines.push(String::new());
    }

    lines.push("## Skills".to_string());
    lines.push(cv.skills_section.clone());
    lines.push(String::new());

    lines.push("## Education".to_string());
    lines.extend(cv.education.iter().cloned());

    if !cv.certifications.is_empty() {
        lines.push(String::new());
        lines.push("## Certifications".to_string());
        lines.extend(cv.certifications.iter().cloned());
    }

    lines.join("\n")
}

/// Plain-text form fed to the critic.
pub fn render_plain(cv: &GeneratedCv) -> String {
    let mut lines = vec![cv.candidate_name.clone()];
    for (key, value) in &cv.contact_info {
        lines.push(format!("{key}: {value}"));
    }
    lines.push(String::new());

    for exp in &cv.experiences {
        lines.push(format!(
            "{} - {} | {} - {}",
            exp.title,
            exp.company,
            exp.start_date,
            exp.end_date.as_deref().unwrap_or("Present")
        ));
        lines.extend(exp.bullets.iter().map(|b| format!("* {}", b.text)));
        lines.push(String::new());
    }

    lines.push("SKILLS:".to_string());
    lines.push(cv.skills_section.clone());
    lines.push(String::new());
    lines.push("EDUCATION:".to_string());
    lines.extend(cv.education.iter().cloned());
    lines.push(String::new());
    lines.push("CERTIFICATIONS:".to_string());
    lines.extend(cv.certifications.iter().cloned());
    lines.join("\n")
}
