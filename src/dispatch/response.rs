//! The tool-call envelope (§6): success carries `results`/`metadata`,
//! failure carries a sanitized, typed error - never a raw error's
//! `Display` output, which may embed a source chain with credentials.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::RetrievalError;
use crate::search::SearchResult;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ToolResponse {
    Success {
        results: Vec<SearchResult>,
        metadata: JsonValue,
    },
    Error {
        #[serde(rename = "isError")]
        is_error: bool,
        error: ErrorBody,
    },
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub recoverable: bool,
    pub suggestion: String,
}

impl ToolResponse {
    pub fn success(results: Vec<SearchResult>, metadata: JsonValue) -> Self {
        Self::Success { results, metadata }
    }

    pub fn error(err: &RetrievalError) -> Self {
        Self::Error {
            is_error: true,
            error: ErrorBody {
                code: err.kind.as_code(),
                message: err.message.clone().unwrap_or_else(|| err.kind.to_string()),
                recoverable: err.recoverable(),
                suggestion: err.suggestion(),
            },
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Error { error, .. } if error.recoverable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn error_response_preserves_code_and_recoverability() {
        let err = RetrievalError::rate_limited("too many requests");
        let response = ToolResponse::error(&err);
        match response {
            ToolResponse::Error { error, .. } => {
                assert_eq!(error.code, "rate_limited");
                assert!(error.recoverable);
                assert!(!error.suggestion.contains("too many requests"));
            }
            ToolResponse::Success { .. } => panic!("expected error variant"),
        }
    }

    #[test]
    fn config_errors_are_not_recoverable() {
        let err = RetrievalError::new(ErrorKind::Config);
        assert!(!ToolResponse::error(&err).is_recoverable());
    }
}
