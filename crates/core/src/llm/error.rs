use std::time::Duration;

use serde_json::Value;

use crate::llm::{truncate_for_log, Provider};

/// A model call that produced nothing usable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelCallError {
    #[error("{} rejected the request (status={status}): {}", provider.as_str(), message.as_deref().unwrap_or("no message"))]
    Rejected {
        provider: Provider,
        status: u16,
        /// The provider's own `error.message`, when the body carried one.
        message: Option<String>,
        body_excerpt: String,
    },

    #[error("{} returned no text (stop_reason={})", provider.as_str(), stop_reason.as_deref().unwrap_or("none"))]
    EmptyOutput {
        provider: Provider,
        stop_reason: Option<String>,
    },

    #[error("{} call did not finish within {limit:?}", provider.as_str())]
    DeadlineExceeded { provider: Provider, limit: Duration },
}

impl ModelCallError {
    pub fn rejected(provider: Provider, status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body).ok().and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        ModelCallError::Rejected {
            provider,
            status,
            message,
            body_excerpt: truncate_for_log(body, 500),
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            ModelCallError::Rejected { .. } => "http",
            ModelCallError::EmptyOutput { .. } => "empty_output",
            ModelCallError::DeadlineExceeded { .. } => "deadline",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulls_provider_message_out_of_error_body() {
        let err = ModelCallError::rejected(
            Provider::Anthropic,
            400,
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"image too large"}}"#,
        );
        assert_eq!(err.stage(), "http");
        assert!(err.to_string().contains("image too large"));
        assert!(err.to_string().contains("status=400"));
    }

    #[test]
    fn non_json_body_is_kept_as_excerpt() {
        let err = ModelCallError::rejected(Provider::Anthropic, 502, "<html>bad gateway</html>");
        match err {
            ModelCallError::Rejected {
                message,
                body_excerpt,
                ..
            } => {
                assert!(message.is_none());
                assert_eq!(body_excerpt, "<html>bad gateway</html>");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
