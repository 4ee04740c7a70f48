//! Error taxonomy for fetching and extraction.
//!
//! Individual asset failures are recovered locally by the callers (logged
//! and skipped); only root-page and archive failures surface through these
//! types. Every variant carries enough detail to diagnose (last HTTP
//! status, retry count) without leaking internals like backtraces.

/// Errors from a single network retrieval.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("invalid URL (missing scheme or host): {url}")]
    InvalidUrl { url: String },

    #[error("request timed out after {retries} retries")]
    Timeout { retries: u32 },

    #[error("connection failed after {retries} retries")]
    ConnectionFailed { retries: u32 },

    #[error("resource not found (404)")]
    NotFound,

    #[error("access forbidden (403) after {retries} retries")]
    Forbidden { retries: u32 },

    #[error("rate limited (429) after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("server error ({status}) after {retries} retries")]
    ServerError { status: u16, retries: u32 },

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("HTTP error ({status})")]
    HttpStatus { status: u16 },

    #[error("transport error: {message}")]
    Transport { message: String },
}

impl FetchError {
    /// Stable machine-readable tag, used by the HTTP front end.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl { .. } => "invalid_url",
            FetchError::Timeout { .. } => "timeout",
            FetchError::ConnectionFailed { .. } => "connection_failed",
            FetchError::NotFound => "not_found",
            FetchError::Forbidden { .. } => "forbidden",
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::ServerError { .. } => "server_error",
            FetchError::TooManyRedirects => "too_many_redirects",
            FetchError::HttpStatus { .. } => "http_error",
            FetchError::Transport { .. } => "transport",
        }
    }
}

/// Errors from a full extraction run.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("page HTML could not be parsed into a usable document")]
    ParseFailure,

    #[error("failed to write archive: {message}")]
    ArchiveWrite { message: String },
}

impl ExtractError {
    /// Stable machine-readable tag, used by the HTTP front end.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::Fetch(e) => e.kind(),
            ExtractError::ParseFailure => "parse_failure",
            ExtractError::ArchiveWrite { .. } => "archive_write",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(FetchError::NotFound.kind(), "not_found");
        assert_eq!(FetchError::Forbidden { retries: 3 }.kind(), "forbidden");
        assert_eq!(ExtractError::ParseFailure.kind(), "parse_failure");
        assert_eq!(
            ExtractError::Fetch(FetchError::TooManyRedirects).kind(),
            "too_many_redirects"
        );
    }

    #[test]
    fn test_messages_carry_status() {
        let e = FetchError::ServerError {
            status: 503,
            retries: 3,
        };
        assert!(e.to_string().contains("503"));
        assert!(e.to_string().contains("3"));
    }
}
