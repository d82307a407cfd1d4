//! Reads `Key: Value` style fields out of the markdown returned by the
//! extraction API when it gives no structured extraction.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::FieldMap;

const MAX_KEY_CHARS: usize = 60;

static RE_HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static RE_LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*+]|\d+[.)])\s+(?:\[[ xX]\]\s*)?").expect("valid regex"));
static RE_TABLE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\|?\s*:?-{3,}:?\s*(\|\s*:?-{3,}:?\s*)*\|?$").expect("valid regex"));

pub fn fields_from_markdown(markdown: &str) -> FieldMap {
    let without_comments = RE_HTML_COMMENT.replace_all(markdown, "");
    let lines: Vec<&str> = without_comments.lines().map(str::trim).collect();

    let mut fields = FieldMap::new();
    // Header cells of the table currently being read
    let mut headers: Option<Vec<String>> = None;

    for (index, line) in lines.iter().enumerate() {
        if RE_TABLE_SEPARATOR.is_match(line) {
            continue;
        }
        if !line.starts_with('|') {
            headers = None;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = colon_pair(line) {
                insert_field(&mut fields, key, value);
            }
            continue;
        }

        let cells = table_cells(line);
        let next_is_separator = lines
            .get(index + 1)
            .is_some_and(|next| RE_TABLE_SEPARATOR.is_match(next));
        if next_is_separator {
            headers = Some(cells);
            continue;
        }

        for (key, value) in table_row_fields(&cells, headers.as_deref()) {
            insert_field(&mut fields, key, value);
        }
    }
    fields
}

fn colon_pair(line: &str) -> Option<(String, String)> {
    let line = RE_LIST_MARKER.replace(line, "");
    let line = line.replace("**", "").replace("__", "");
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    let value = value.trim();

    // "https://..." splits on the scheme colon
    if !looks_like_key(key) || value.is_empty() || value.starts_with("//") {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

fn looks_like_key(key: &str) -> bool {
    !key.is_empty() && key.chars().count() <= MAX_KEY_CHARS && key.chars().any(char::is_alphabetic)
}

fn table_cells(line: &str) -> Vec<String> {
    line.trim_matches('|')
        .split('|')
        .map(|cell| cell.replace("**", "").trim().to_string())
        .collect()
}

/// Two-column rows are `key | value`. Wider rows are keyed by their first
/// cell and the column header: `Atorvastatin - Dose`.
fn table_row_fields(cells: &[String], headers: Option<&[String]>) -> Vec<(String, String)> {
    let Some((key, values)) = cells.split_first() else {
        return Vec::new();
    };
    if !looks_like_key(key) {
        return Vec::new();
    }

    if let [value] = values {
        return if value.is_empty() {
            Vec::new()
        } else {
            vec![(key.clone(), value.clone())]
        };
    }

    let Some(headers) = headers.filter(|headers| headers.len() == cells.len()) else {
        return Vec::new();
    };
    headers[1..]
        .iter()
        .zip(values)
        .filter(|(header, value)| !header.is_empty() && !value.is_empty())
        .map(|(header, value)| (format!("{} - {}", key, header), value.clone()))
        .collect()
}

pub(crate) fn insert_field(fields: &mut FieldMap, key: String, value: String) {
    match fields.get_mut(&key) {
        None => {
            fields.insert(key, value);
        }
        Some(existing) => {
            let already_present = existing.split("; ").any(|part| part == value);
            if !already_present {
                existing.push_str("; ");
                existing.push_str(&value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_exactly_the_fields_on_a_simple_form() {
        let fields = fields_from_markdown("First Name: John\nLast Name: Doe\n");

        assert_eq!(fields.len(), 2);
        assert_eq!(fields["First Name"], "John");
        assert_eq!(fields["Last Name"], "Doe");
    }

    #[test]
    fn ignores_extraction_comments_headings_and_prose() {
        let markdown = "\
<!-- text, from page 0 (l=0.1,t=0.2) with ID 1f2e -->
# Annual Examination

The patient was seen today for a routine visit.

- **Blood Pressure**: 128/84
* Weight: 82 kg
1. [x] Fasting: yes
See https://example.org/form for details
";
        let fields = fields_from_markdown(markdown);

        assert_eq!(fields.len(), 3);
        assert_eq!(fields["Blood Pressure"], "128/84");
        assert_eq!(fields["Weight"], "82 kg");
        assert_eq!(fields["Fasting"], "yes");
    }

    #[test]
    fn reads_two_column_tables_without_header_rows() {
        let markdown = "\
| Field | Value |
|-------|-------|
| Name | John Doe |
| **Date of Birth** | 1980-02-01 |
| Allergy | Severity | Reaction |
";
        let fields = fields_from_markdown(markdown);

        // The three-cell row does not fit the two-column header
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["Name"], "John Doe");
        assert_eq!(fields["Date of Birth"], "1980-02-01");
    }

    #[test]
    fn wide_tables_are_keyed_by_row_and_column() {
        let markdown = "\
Name: John Doe

| Medication | Dose | Frequency |
|------------|------|-----------|
| Atorvastatin | 20mg | daily |
| **Metformin** | 500mg | |
";
        let fields = fields_from_markdown(markdown);

        assert_eq!(fields.len(), 4);
        assert_eq!(fields["Name"], "John Doe");
        assert_eq!(fields["Atorvastatin - Dose"], "20mg");
        assert_eq!(fields["Atorvastatin - Frequency"], "daily");
        assert_eq!(fields["Metformin - Dose"], "500mg");
    }

    #[test]
    fn repeated_keys_collect_distinct_values() {
        let fields = fields_from_markdown("Medication: Lisinopril\nMedication: Metformin\nMedication: Lisinopril");
        assert_eq!(fields["Medication"], "Lisinopril; Metformin");
    }
}
