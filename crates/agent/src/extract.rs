//! Pulls a JSON object out of model output that may be wrapped in prose or
//! markdown fences.

use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("no JSON object found in model output")]
    NotFound,
    #[error("model output is not valid JSON for the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
}

/// Returns the first balanced `{...}` span, or the trimmed input when there
/// is none.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find('{') {
        let remainder = &trimmed[start..];
        if let Some(end) = find_matching_brace(remainder) {
            return &remainder[..end];
        }
    }

    trimmed
}

pub fn parse_object<T: DeserializeOwned>(raw: &str) -> Result<T, ExtractError> {
    let candidate = extract_json(raw);
    if !candidate.starts_with('{') {
        return Err(ExtractError::NotFound);
    }
    Ok(serde_json::from_str(candidate)?)
}

/// Byte offset just past the brace closing the one at position 0. Braces
/// inside JSON strings are ignored.
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (index, c) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::{extract_json, parse_object, ExtractError};

    #[derive(Debug, Deserialize)]
    struct Decisions {
        decisions: Vec<serde_json::Value>,
    }

    #[test]
    fn fenced_output_is_unwrapped() {
        let raw = "Here are my decisions:\n```json\n{\"decisions\": [{\"finding_ref\": \"price:widget_a\"}]}\n```\nDone.";

        let parsed: Decisions = parse_object(raw).expect("parse");
        assert_eq!(parsed.decisions.len(), 1);
    }

    #[test]
    fn braces_inside_strings_do_not_end_the_object() {
        let raw = r#"note {"justification": "keep {margin} safe", "n": 1} trailing"#;

        assert_eq!(extract_json(raw), r#"{"justification": "keep {margin} safe", "n": 1}"#);
    }

    #[test]
    fn escaped_quotes_are_respected() {
        let raw = r#"{"subject": "Reorder \"Widget A\" {urgent}"}"#;

        assert_eq!(extract_json(raw), raw);
    }

    #[test]
    fn prose_without_json_is_not_found() {
        let result = parse_object::<Decisions>("I recommend reordering widget_a.");

        assert!(matches!(result, Err(ExtractError::NotFound)));
    }

    #[test]
    fn wrong_shape_is_reported() {
        let result = parse_object::<Decisions>(r#"{"choices": []}"#);

        assert!(matches!(result, Err(ExtractError::Shape(_))));
    }
}
