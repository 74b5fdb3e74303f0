use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// A project as returned by the `/projects` endpoint.
///
/// This is a snapshot taken at request time; nothing is cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Repository name.
    #[serde(rename = "reponame")]
    pub name: String,
    /// Repository owner.
    #[serde(default)]
    pub username: String,
    /// Source-control URL of the repository.
    #[serde(rename = "vcs_url", default)]
    pub url: String,
    #[serde(default)]
    pub following: bool,
}

// ---------------------------------------------------------------------------
// VCS providers
// ---------------------------------------------------------------------------

/// Source-control host a project lives under in the API's URL scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsProvider {
    #[default]
    #[serde(rename = "github")]
    GitHub,
    Bitbucket,
}

impl VcsProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Bitbucket => "bitbucket",
        }
    }
}

impl fmt::Display for VcsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Error bodies
// ---------------------------------------------------------------------------

/// Structured error body sent with non-success responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_uses_wire_field_names() {
        let json = r#"{"reponame":"reponame","following":true,"vcs_url":"https://github.com/testuser/testRepo","username":"username"}"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(
            project,
            Project {
                name: "reponame".into(),
                username: "username".into(),
                url: "https://github.com/testuser/testRepo".into(),
                following: true,
            }
        );
    }

    #[test]
    fn project_tolerates_missing_optional_fields() {
        let project: Project = serde_json::from_str(r#"{"reponame":"somerepo"}"#).unwrap();
        assert_eq!(project.name, "somerepo");
        assert!(project.username.is_empty());
        assert!(!project.following);
    }

    #[test]
    fn provider_path_segments() {
        assert_eq!(VcsProvider::default(), VcsProvider::GitHub);
        assert_eq!(VcsProvider::GitHub.to_string(), "github");
        assert_eq!(VcsProvider::Bitbucket.as_str(), "bitbucket");
    }
}
