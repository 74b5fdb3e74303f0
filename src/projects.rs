//! Project endpoints: listing followed projects and changing follow/build
//! state.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::{debug, instrument};

use crate::client::Client;
use crate::context::Context;
use crate::error::{CircleCiError, Result};
use crate::models::{Project, VcsProvider};

const PROJECTS_PATH: &str = "projects";

/// Characters escaped in owner and project names so each stays one path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Handle for the project endpoints, obtained from [`Client::projects`].
///
/// Paths are built as `project/<provider>/<owner>/<project>/<action>`, where
/// the provider defaults to the client's and can be changed with
/// [`ProjectService::with_provider`].
#[derive(Debug, Clone, Copy)]
pub struct ProjectService<'a> {
    client: &'a Client,
    provider: VcsProvider,
}

impl<'a> ProjectService<'a> {
    pub(crate) fn new(client: &'a Client, provider: VcsProvider) -> Self {
        Self { client, provider }
    }

    pub fn with_provider(self, provider: VcsProvider) -> Self {
        Self { provider, ..self }
    }

    pub fn provider(&self) -> VcsProvider {
        self.provider
    }

    /// List all projects followed by the authenticated user, in server order.
    #[instrument(skip(self, ctx))]
    pub fn list(&self, ctx: &Context) -> Result<Vec<Project>> {
        let request = self
            .client
            .new_request(ctx, "GET", PROJECTS_PATH, &[], None)?;
        // `null` is treated like an empty list.
        let projects: Option<Vec<Project>> = self.client.execute(&request)?;
        let projects = projects.unwrap_or_default();
        debug!(count = projects.len(), "Listed followed projects");
        Ok(projects)
    }

    /// Find a followed project by exact name and owner.
    ///
    /// There is no single-project endpoint, so this scans [`list`](Self::list)
    /// and returns the first match. Matching is case-sensitive.
    #[instrument(skip(self, ctx))]
    pub fn get(&self, ctx: &Context, project: &str, owner: &str) -> Result<Project> {
        self.list(ctx)?
            .into_iter()
            .find(|p| p.name == project && p.username == owner)
            .ok_or_else(|| CircleCiError::NotFound {
                project: project.to_string(),
                owner: owner.to_string(),
            })
    }

    #[instrument(skip(self, ctx))]
    pub fn follow(&self, ctx: &Context, project: &str, owner: &str) -> Result<()> {
        self.action(ctx, "POST", project, owner, "follow")
    }

    #[instrument(skip(self, ctx))]
    pub fn unfollow(&self, ctx: &Context, project: &str, owner: &str) -> Result<()> {
        self.action(ctx, "DELETE", project, owner, "follow")
    }

    /// Turn on builds for a project. Needs admin rights on the repository;
    /// the service answers with an API error otherwise.
    #[instrument(skip(self, ctx))]
    pub fn enable(&self, ctx: &Context, project: &str, owner: &str) -> Result<()> {
        self.action(ctx, "POST", project, owner, "enable")
    }

    /// Turn off builds for a project. Same permission rules as
    /// [`enable`](Self::enable).
    #[instrument(skip(self, ctx))]
    pub fn disable(&self, ctx: &Context, project: &str, owner: &str) -> Result<()> {
        self.action(ctx, "POST", project, owner, "disable")
    }

    /// [`enable`](Self::enable), then [`follow`](Self::follow).
    ///
    /// Follow is not attempted if enabling fails. Not transactional: a failed
    /// follow leaves the project enabled.
    pub fn enable_and_follow(&self, ctx: &Context, project: &str, owner: &str) -> Result<()> {
        self.enable(ctx, project, owner)?;
        self.follow(ctx, project, owner)
    }

    fn action(
        &self,
        ctx: &Context,
        verb: &str,
        project: &str,
        owner: &str,
        action: &str,
    ) -> Result<()> {
        for name in [owner, project] {
            if matches!(name, "" | "." | "..") {
                return Err(CircleCiError::RequestBuild {
                    method: verb.to_string(),
                    url: format!("project/{}/{owner}/{project}/{action}", self.provider),
                    message: format!("{name:?} is not a valid owner or project name"),
                });
            }
        }

        let path = format!(
            "project/{}/{}/{}/{action}",
            self.provider,
            utf8_percent_encode(owner, PATH_SEGMENT),
            utf8_percent_encode(project, PATH_SEGMENT),
        );
        let request = self.client.new_request(ctx, verb, &path, &[], None)?;
        self.client.execute_empty(&request)
    }
}
