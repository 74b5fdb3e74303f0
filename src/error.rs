use thiserror::Error;

/// Boxed error produced by a [`Transport`](crate::transport::Transport).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for CircleCI API operations.
///
/// - `Configuration` — bad input while constructing a client
/// - `RequestBuild` — the request could not be assembled (bad verb, bad path,
///   cancelled context)
/// - `Transport` — network/transport failure, surfaced verbatim
/// - `Api` — the service answered with a status code of 300 or above
/// - `Decode` — a successful response body did not match the expected shape
/// - `NotFound` — the requested project is not in the followed-projects list
#[derive(Debug, Error)]
pub enum CircleCiError {
    #[error("Invalid configuration for {field}: {message}")]
    Configuration { field: &'static str, message: String },

    #[error("Could not build {method} request for {url}: {message}")]
    RequestBuild {
        method: String,
        url: String,
        message: String,
    },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("API returned error: {status} {message} ({url})")]
    Api {
        status: u16,
        message: String,
        url: String,
    },

    #[error(transparent)]
    Decode(#[from] serde_json::Error),

    #[error("Could not find project {project} for user {owner}. Check you're following the project")]
    NotFound { project: String, owner: String },
}

impl CircleCiError {
    pub(crate) fn configuration(field: &'static str, message: impl Into<String>) -> Self {
        Self::Configuration {
            field,
            message: message.into(),
        }
    }

    /// HTTP status code of an API error, `None` for every other kind.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for a missing project and for an API 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Api { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, CircleCiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_for_api_errors() {
        let api = CircleCiError::Api {
            status: 403,
            message: "Permission denied".into(),
            url: "https://circleci.com/api/v1.1/projects".into(),
        };
        assert_eq!(api.status(), Some(403));
        assert!(!api.is_not_found());

        let missing = CircleCiError::NotFound {
            project: "repo".into(),
            owner: "someone".into(),
        };
        assert_eq!(missing.status(), None);
        assert!(missing.is_not_found());
    }

    #[test]
    fn api_404_counts_as_not_found() {
        let err = CircleCiError::Api {
            status: 404,
            message: String::new(),
            url: String::new(),
        };
        assert!(err.is_not_found());
    }

    #[test]
    fn not_found_message_names_the_pair() {
        let err = CircleCiError::NotFound {
            project: "repo".into(),
            owner: "someone".into(),
        };
        let text = err.to_string();
        assert!(text.contains("repo"));
        assert!(text.contains("someone"));
        assert!(text.contains("following"));
    }
}
