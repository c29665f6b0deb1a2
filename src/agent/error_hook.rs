// src/agent/error_hook.rs
// Error-hook decision table: given an error occurrence from the
// session, decide whether to abort, retry, or skip.

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorContext {
    ModelCall,
    ToolExecution,
    System,
    UserInput,
}

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub error_text: String,
    pub context: ErrorContext,
    pub recoverable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDecision {
    Abort { user_message: Option<String> },
    Retry { retry_count: u32 },
    Skip,
}

/// Decides what the session should do in response to an error event, and
/// logs `{job_id, context, recoverable, first 200 chars of error}` at warn level.
pub fn decide(job_id: &str, event: &ErrorEvent) -> ErrorDecision {
    let lower = event.error_text.to_lowercase();
    let truncated: String = event.error_text.chars().take(200).collect();
    warn!(
        job_id,
        context = ?event.context,
        recoverable = event.recoverable,
        error = %truncated,
        "agent session error"
    );

    if contains_any(&lower, &["quota", "402", "not licensed", "authentication"]) {
        return ErrorDecision::Abort { user_message: None };
    }
    if contains_any(&lower, &["rate limit", "429"]) {
        return ErrorDecision::Abort {
            user_message: Some("rate limit reached, retry later".to_string()),
        };
    }
    if event.context == ErrorContext::ModelCall && event.recoverable {
        return ErrorDecision::Retry { retry_count: 2 };
    }
    if event.context == ErrorContext::ToolExecution {
        return ErrorDecision::Skip;
    }
    ErrorDecision::Abort { user_message: None }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str, context: ErrorContext, recoverable: bool) -> ErrorEvent {
        ErrorEvent {
            error_text: text.to_string(),
            context,
            recoverable,
        }
    }

    #[test]
    fn quota_errors_abort() {
        let d = decide("j1", &event("Quota exceeded", ErrorContext::System, true));
        assert_eq!(d, ErrorDecision::Abort { user_message: None });
    }

    #[test]
    fn http_402_aborts() {
        let d = decide("j1", &event("status 402", ErrorContext::System, false));
        assert_eq!(d, ErrorDecision::Abort { user_message: None });
    }

    #[test]
    fn rate_limit_aborts_with_user_message() {
        let d = decide(
            "j1",
            &event("HTTP 429 Too Many Requests", ErrorContext::System, false),
        );
        assert_eq!(
            d,
            ErrorDecision::Abort {
                user_message: Some("rate limit reached, retry later".to_string())
            }
        );
    }

    #[test]
    fn recoverable_model_call_retries_twice() {
        let d = decide(
            "j1",
            &event("connection reset", ErrorContext::ModelCall, true),
        );
        assert_eq!(d, ErrorDecision::Retry { retry_count: 2 });
    }

    #[test]
    fn unrecoverable_model_call_aborts() {
        let d = decide(
            "j1",
            &event("connection reset", ErrorContext::ModelCall, false),
        );
        assert_eq!(d, ErrorDecision::Abort { user_message: None });
    }

    #[test]
    fn tool_execution_errors_skip() {
        let d = decide(
            "j1",
            &event("tool threw an exception", ErrorContext::ToolExecution, false),
        );
        assert_eq!(d, ErrorDecision::Skip);
    }

    #[test]
    fn unclassified_errors_abort() {
        let d = decide(
            "j1",
            &event("something unexpected", ErrorContext::UserInput, false),
        );
        assert_eq!(d, ErrorDecision::Abort { user_message: None });
    }
}
