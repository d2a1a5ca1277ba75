use std::sync::LazyLock;

use regex::Regex;

use crate::clients::models::requests::ExerciseSearchRequest;
use crate::clients::models::responses::GeneratedDocument;
use crate::error::{PlannerError, Result};

pub const SEARCH_REQUEST_MARKER: &str = "EXERCISE_SEARCH_REQUEST:";

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:[A-Za-z]+)?[ \t]*\r?\n?([\s\S]*?)```").expect("valid fence regex")
});

static SEARCH_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"EXERCISE_SEARCH_REQUEST:\s*(\{[\s\S]*?\})").expect("valid search request regex")
});

/// Body of the first complete Markdown code fence, or the trimmed response when there is none.
pub fn clean_json_response(response: &str) -> String {
    FENCED_BLOCK
        .captures(response)
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str().trim().to_string())
        .unwrap_or_else(|| response.trim().to_string())
}

/// Every well-formed search request in a model response, in order of appearance.
///
/// Fragments that fail to parse are logged and skipped.
pub fn extract_search_requests(response: &str) -> Vec<ExerciseSearchRequest> {
    SEARCH_REQUEST
        .captures_iter(response)
        .filter_map(|captures| captures.get(1))
        .filter_map(|fragment| {
            match serde_json::from_str::<ExerciseSearchRequest>(fragment.as_str()) {
                Ok(request) => Some(request),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        fragment = %fragment.as_str(),
                        "agent.search_request_skipped"
                    );
                    None
                }
            }
        })
        .collect()
}

pub fn contains_search_marker(response: &str) -> bool {
    response.contains(SEARCH_REQUEST_MARKER)
}

/// Strip fences, deserialize and validate a final model response.
pub fn parse_document<T: GeneratedDocument>(response: &str) -> Result<T> {
    let json_content = clean_json_response(response);

    let document: T = serde_json::from_str(&json_content)
        .map_err(|e| PlannerError::parse(format!("response is not valid JSON: {}", e)))?;

    document.validate().map_err(PlannerError::parse)?;

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::models::responses::{DayDocument, PlanDocument};

    const DAY: &str = r#"{"name": "Push", "blocks": [{"blockType": "traditional", "exercises": [{"name": "Push-Up", "sets": 3, "reps": 12}]}]}"#;

    #[test]
    fn test_clean_json_response_strips_fence() {
        let response = format!("Here is your plan:\n```json\n{}\n```\nEnjoy!", DAY);
        assert_eq!(clean_json_response(&response), DAY);
    }

    #[test]
    fn test_clean_json_response_plain_fence() {
        let response = format!("```\n{}\n```", DAY);
        assert_eq!(clean_json_response(&response), DAY);
    }

    #[test]
    fn test_clean_json_response_without_fence_trims() {
        let response = format!("\n\n  {}  \n", DAY);
        assert_eq!(clean_json_response(&response), DAY);
    }

    #[test]
    fn test_unclosed_fence_falls_back_to_raw_and_fails_parse() {
        let response = format!("```json\n{}", DAY);
        assert_eq!(clean_json_response(&response), response.trim());

        let err = parse_document::<DayDocument>(&response).unwrap_err();
        assert!(matches!(err, PlannerError::GenerationParse(_)));
    }

    #[test]
    fn test_parse_document_accepts_valid_day() {
        let day: DayDocument = parse_document(&format!("```json\n{}\n```", DAY)).unwrap();
        assert_eq!(day.name.as_deref(), Some("Push"));
        assert_eq!(day.blocks[0].exercises[0].sets, Some(3));
    }

    #[test]
    fn test_parse_document_rejects_schema_violation() {
        let err = parse_document::<PlanDocument>(r#"{"name": "Week", "days": []}"#).unwrap_err();
        match err {
            PlannerError::GenerationParse(message) => assert_eq!(message, "plan has no days"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_extract_search_requests_finds_all_blocks() {
        let response = r#"I need some options first.
EXERCISE_SEARCH_REQUEST: {"muscleGroups": ["legs"], "equipment": ["dumbbells"], "limit": 10}
and
EXERCISE_SEARCH_REQUEST: {"styles": ["hiit"], "difficulty": ["beginner", "intermediate"]}"#;

        let requests = extract_search_requests(response);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].muscle_groups, vec!["legs".to_string()]);
        assert_eq!(requests[0].limit, Some(10));
        assert_eq!(requests[1].styles, vec!["hiit".to_string()]);
        assert_eq!(requests[1].difficulty.len(), 2);
    }

    #[test]
    fn test_extract_search_requests_skips_malformed_fragment() {
        let response = r#"EXERCISE_SEARCH_REQUEST: {"muscleGroups": legs}
EXERCISE_SEARCH_REQUEST: {"equipment": ["bodyweight_only"]}"#;

        let requests = extract_search_requests(response);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].equipment, vec!["bodyweight_only".to_string()]);
    }

    #[test]
    fn test_no_marker_means_no_requests() {
        assert!(extract_search_requests(DAY).is_empty());
        assert!(!contains_search_marker(DAY));
    }
}
