use thiserror::Error;

/// Everything that can go wrong while processing a single URL or running the
/// batch around it. Each variant maps onto a stable `kind` string that is
/// recorded in the access log, `session_results`, and `failed-urls.yaml`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("artifact read failed for url {url_id}: {message}")]
    CacheRead { url_id: i64, message: String },

    #[error("no cached artifact for url {url_id}")]
    CacheMiss { url_id: i64 },

    #[error("parse failed for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("failed to serialize page for {url}: {message}")]
    Marshal { url: String, message: String },

    #[error("index error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Stable error-type label for logs and summary files.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidUrl(_) => "invalid_url",
            PipelineError::Fetch { .. } => "fetch_error",
            PipelineError::Http { .. } => "http_error",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::CacheRead { .. } => "cache_error",
            PipelineError::CacheMiss { .. } => "cache_miss",
            PipelineError::Parse { .. } => "parse_error",
            PipelineError::Marshal { .. } => "marshal_error",
            PipelineError::Database(_) => "database_error",
            PipelineError::Io(_) => "unknown_error",
            PipelineError::Config(_) => "unknown_error",
        }
    }

    /// HTTP status carried by the error, 0 for non-HTTP failures.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Http { status, .. } => *status,
            _ => 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        PipelineError::Marshal {
            url: String::new(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(PipelineError::InvalidUrl("x".into()).kind(), "invalid_url");
        assert_eq!(
            PipelineError::Http {
                url: "https://a.example".into(),
                status: 404
            }
            .kind(),
            "http_error"
        );
        assert_eq!(
            PipelineError::Timeout {
                url: "https://a.example".into()
            }
            .kind(),
            "timeout"
        );
    }

    #[test]
    fn status_code_defaults_to_zero() {
        let err = PipelineError::Fetch {
            url: "https://a.example".into(),
            message: "connection refused".into(),
        };
        assert_eq!(err.status_code(), 0);
        let err = PipelineError::Http {
            url: "https://a.example".into(),
            status: 503,
        };
        assert_eq!(err.status_code(), 503);
    }
}
