//! Markdown renderings used by the export endpoints.

use crate::models::{Advice, MEDICAL_DISCLAIMER, PatientProfile};

/// `first_name` → `First Name`
pub fn title_case_key(key: &str) -> String {
    key.replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn profile_to_markdown(profile: &PatientProfile) -> String {
    let mut markdown = String::from("# Patient Profile\n\n");

    if !profile.sources.is_empty() {
        markdown.push_str("**Source documents:**\n\n");
        for source in &profile.sources {
            markdown.push_str(&format!("- {}\n", source));
        }
        markdown.push('\n');
    }

    if profile.fields.is_empty() {
        markdown.push_str("*No data available*\n");
        return markdown;
    }

    for (key, value) in &profile.fields {
        markdown.push_str(&format!("## {}\n\n{}\n\n", title_case_key(key), value));
    }

    markdown.trim_end().to_string() + "\n"
}

pub fn advice_to_markdown(advice: &Advice) -> String {
    format!(
        "{}\n\n---\n\n> **Medical Disclaimer:** {}\n",
        advice.text.trim_end(),
        MEDICAL_DISCLAIMER
    )
}
