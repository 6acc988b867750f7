//! Request schemas for each tool. `validator` enforces the input
//! constraints from the schema table (§4.8) before anything touches the
//! searcher.

use serde::Deserialize;
use validator::Validate;

use crate::error::{RetrievalError, Result};

fn default_k() -> u32 {
    10
}

#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, message = "query must be non-empty"))]
    pub query: String,
    #[serde(default = "default_k")]
    #[validate(range(min = 1, max = 50, message = "k must be between 1 and 50"))]
    pub k: u32,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub chunk_type: Option<String>,
    #[serde(default)]
    pub clause_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LookupRequest {
    #[validate(length(min = 1, message = "term must be non-empty"))]
    pub term: String,
    #[serde(default = "default_k")]
    #[validate(range(min = 1, max = 50, message = "k must be between 1 and 50"))]
    pub k: u32,
}

/// Parses `raw` into `T` and validates it, mapping both JSON and schema
/// failures to `invalid_input` so the dispatcher never needs to know the
/// difference (§4.8).
pub fn parse_and_validate<T>(raw: &serde_json::Value) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let request: T = serde_json::from_value(raw.clone())
        .map_err(|err| RetrievalError::invalid_input(format!("malformed request: {err}")))?;
    request
        .validate()
        .map_err(|err| RetrievalError::invalid_input(format!("schema violation: {err}")))?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_empty_query() {
        let raw = json!({"query": "", "k": 5});
        let result: Result<SearchRequest> = parse_and_validate(&raw);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_k_above_fifty() {
        let raw = json!({"query": "widgets", "k": 51});
        let result: Result<SearchRequest> = parse_and_validate(&raw);
        assert!(result.is_err());
    }

    #[test]
    fn defaults_k_to_ten() {
        let raw = json!({"query": "widgets"});
        let request: SearchRequest = parse_and_validate(&raw).unwrap();
        assert_eq!(request.k, 10);
    }

}
