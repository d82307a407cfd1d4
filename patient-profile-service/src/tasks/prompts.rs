use crate::models::{ExtractedDocument, PatientProfile};

pub const MERGE_PREAMBLE: &str =
    "You are an intelligent medical data assistant that merges patient records into one profile.";

pub const ADVICE_PREAMBLE: &str = "You are a clinical decision-support assistant.";

const MERGE_INSTRUCTIONS: &str = "Merge the following documents to complete a patient's superset of medical data.
This data will be used to give the patient daily health related goals.

Follow these rules:
- Combine related fields to avoid redundancy (e.g. first_name + last_name vs full_name, or a signature that repeats the patient's name)
- Use one clear, human readable field name for each real-world attribute
- Avoid redundant or duplicate data
- Preserve all unique data
- A document's source text, when given, may hold details its fields missed; include them
- Fields that are not filled out or non applicable may be omitted
- Return a single flat JSON object whose values are all strings, with no extra explanation";

const ADVICE_INSTRUCTIONS: &str = "Given a JSON object containing a patient's medical data and history, generate a structured set of personalized goals and recommendations that reflect best practices in preventative and therapeutic healthcare.

Be extremely specific in your suggestions. Consider the patient's age, sex, health conditions, medications, and lifestyle indicators. For example, suggest:

- Specific foods or meal patterns (e.g., \"Include a breakfast of steel-cut oats with berries and flaxseeds to support cholesterol levels\")
- Types of exercises suited to the patient's condition (e.g., \"15 minutes of low-impact water aerobics if experiencing joint pain\")
- Medications or supplements they should adhere to (e.g., \"Continue 20mg atorvastatin daily in the evening, with food\")
- Skincare and sunscreen if relevant
- Behavioral or lifestyle changes, supported with examples or routines
- Monitoring activities (e.g., \"Check fasting glucose 3 times per week using home monitor\")

Return only Markdown in this structure, with no extra explanation:

# Health Goals & Recommendations

## Daily Goals
- ...

## Short-Term Goals (Next 1-2 Weeks)
- ...

## Medium-Term Goals (1-3 Months)
- ...

## Long-Term Goals (3+ Months)
- ...

## General Recommendations
- ...

Be detailed and personalized. Make sure your suggestions are clinically safe, realistic, and adapted to the patient's profile.";

pub fn merge_prompt(documents: &[ExtractedDocument]) -> String {
    let mut prompt = MERGE_INSTRUCTIONS.to_string();
    for (index, document) in documents.iter().enumerate() {
        let fields = serde_json::to_string_pretty(&document.fields).unwrap_or_default();
        prompt.push_str(&format!(
            "\n\nDocument {} ({}):\n{}",
            index + 1,
            document.file_name,
            fields
        ));
        if let Some(text) = source_text(document) {
            prompt.push_str(&format!("\nSource text:\n{}", text));
        }
    }
    prompt
}

fn source_text(document: &ExtractedDocument) -> Option<&str> {
    document
        .markdown
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Whether the document gave the merge anything to work with.
pub fn has_content(document: &ExtractedDocument) -> bool {
    !document.fields.is_empty() || source_text(document).is_some()
}

pub fn advice_prompt(profile: &PatientProfile) -> String {
    let fields = serde_json::to_string_pretty(&profile.fields).unwrap_or_default();
    format!(
        "{}\n\nHere is the patient's data:\n{}",
        ADVICE_INSTRUCTIONS, fields
    )
}
