// src/identity.rs
// Identity key derivation for admission accounting.

/// Sentinel identity used when no per-request or process-wide token is available.
pub const SERVER_IDENTITY: &str = "__server__";

/// Derive the opaque identity key used by the admission core, quota monitor,
/// and job store to attribute work to "the caller".
///
/// Preference order: per-request `x-copilot-token`, then `x-github-token`,
/// then the process-wide fallback token, then the server sentinel.
pub fn resolve_identity(
    copilot_token_header: Option<&str>,
    github_token_header: Option<&str>,
    process_wide_token: Option<&str>,
) -> String {
    copilot_token_header
        .filter(|s| !s.is_empty())
        .or_else(|| github_token_header.filter(|s| !s.is_empty()))
        .or(process_wide_token.filter(|s| !s.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| SERVER_IDENTITY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_copilot_token() {
        let id = resolve_identity(Some("copilot-tok"), Some("gh-tok"), Some("proc-tok"));
        assert_eq!(id, "copilot-tok");
    }

    #[test]
    fn falls_back_to_github_token() {
        let id = resolve_identity(None, Some("gh-tok"), Some("proc-tok"));
        assert_eq!(id, "gh-tok");
    }

    #[test]
    fn falls_back_to_process_wide_token() {
        let id = resolve_identity(None, None, Some("proc-tok"));
        assert_eq!(id, "proc-tok");
    }

    #[test]
    fn falls_back_to_server_sentinel() {
        let id = resolve_identity(None, None, None);
        assert_eq!(id, SERVER_IDENTITY);
    }

    #[test]
    fn treats_empty_headers_as_absent() {
        let id = resolve_identity(Some(""), None, Some("proc-tok"));
        assert_eq!(id, "proc-tok");
    }
}
