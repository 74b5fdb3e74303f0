use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::context::Context;
use crate::error::{CircleCiError, Result};
use crate::models::{ApiErrorBody, VcsProvider};
use crate::projects::ProjectService;
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

/// CircleCI SaaS server, used when no server URL is configured.
pub const DEFAULT_SERVER_URL: &str = "https://circleci.com/";
/// Versioned API prefix joined onto the server URL.
pub const API_PATH: &str = "api/v1.1/";
/// Query parameter carrying the API token on every request.
pub const TOKEN_PARAM: &str = "circle-token";
/// Environment variable read by [`Client::from_env`] for the token.
pub const TOKEN_ENV: &str = "CIRCLECI_TOKEN";
/// Environment variable read by [`Client::from_env`] for the server URL.
pub const HOST_ENV: &str = "CIRCLECI_HOST";

const JSON: &str = "application/json";
const CLIENT_ID: &str = concat!("circleci-client/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Public client
// ---------------------------------------------------------------------------

/// Main entry point for the CircleCI v1.1 API.
///
/// Configuration is fixed once built, so a `Client` can be shared between
/// threads and cloned cheaply.
///
/// ```no_run
/// use circleci_client::{Client, Context};
///
/// let client = Client::new("my-api-token", "https://circleci.com/").unwrap();
/// let projects = client.projects().list(&Context::background()).unwrap();
/// for p in &projects {
///     println!("{}/{} following={}", p.username, p.name, p.following);
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    token: String,
    base_url: Url,
    transport: Arc<dyn Transport>,
    vcs_provider: VcsProvider,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("token", &"REDACTED")
            .field("base_url", &self.base_url.as_str())
            .field("transport", &self.transport)
            .field("vcs_provider", &self.vcs_provider)
            .finish()
    }
}

impl Client {
    /// Create a client for `server_url` with the default transport.
    ///
    /// * `token`      – CircleCI API token
    /// * `server_url` – server root, e.g. `https://circleci.com/` or a
    ///   self-hosted `https://circle.company.com:8080/`
    pub fn new(token: impl Into<String>, server_url: &str) -> Result<Self> {
        Self::builder(token).server_url(server_url).build()
    }

    pub fn builder(token: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(token)
    }

    /// Create a client from `CIRCLECI_TOKEN` and, if set, `CIRCLECI_HOST`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = lookup(TOKEN_ENV)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| CircleCiError::configuration("token", format!("{TOKEN_ENV} is not set")))?;

        let mut builder = Self::builder(token);
        if let Some(server) = lookup(HOST_ENV).filter(|server| !server.is_empty()) {
            builder = builder.server_url(&server);
        }
        builder.build()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Fully resolved API base, always ending in `api/v1.1/` unless it was
    /// overridden with [`ClientBuilder::base_url`].
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn vcs_provider(&self) -> VcsProvider {
        self.vcs_provider
    }

    // -- resource accessors --------------------------------------------------

    pub fn projects(&self) -> ProjectService<'_> {
        ProjectService::new(self, self.vcs_provider)
    }

    // -- request pipeline ----------------------------------------------------

    /// Build an authenticated request for `path`, resolved against the base URL.
    ///
    /// The token parameter is appended after `query`, replacing any
    /// caller-supplied parameter of the same name.
    pub fn new_request(
        &self,
        ctx: &Context,
        verb: &str,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<HttpRequest> {
        let relative = path.trim_start_matches('/');
        let build_error = |message: String| CircleCiError::RequestBuild {
            method: verb.to_string(),
            url: format!("{}{relative}", self.base_url),
            message,
        };

        if ctx.is_cancelled() {
            return Err(build_error(ctx.reason().to_string()));
        }

        let method = Method::from_bytes(verb.as_bytes())
            .map_err(|e| build_error(format!("invalid method: {e}")))?;

        let mut url = self
            .base_url
            .join(relative)
            .map_err(|e| build_error(format!("invalid path: {e}")))?;
        if url.origin() != self.base_url.origin() || !url.path().starts_with(self.base_url.path()) {
            return Err(build_error("path resolves outside the API base URL".to_string()));
        }

        let mut params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        params.extend(query.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        params.retain(|(k, _)| k != TOKEN_PARAM);
        url.query_pairs_mut()
            .clear()
            .extend_pairs(&params)
            .append_pair(TOKEN_PARAM, &self.token);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_ID));

        let body = match body {
            Some(value) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
                let bytes = serde_json::to_vec(value)
                    .map_err(|e| build_error(format!("could not encode body: {e}")))?;
                Some(bytes)
            }
            None => None,
        };

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
            deadline: ctx.deadline(),
        })
    }

    /// Send `request` and decode a successful JSON body into `T`.
    ///
    /// A body that does not decode is returned as [`CircleCiError::Decode`].
    pub fn execute<T: DeserializeOwned>(&self, request: &HttpRequest) -> Result<T> {
        let body = self.send(request)?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Send `request`, ignoring the body of a successful response.
    pub fn execute_empty(&self, request: &HttpRequest) -> Result<()> {
        self.send(request).map(drop)
    }

    #[instrument(skip(self, request), fields(method = %request.method, url = %redact(&request.url)))]
    fn send(&self, request: &HttpRequest) -> Result<Vec<u8>> {
        let url = redact(&request.url);
        if request.timeout() == Some(Duration::ZERO) {
            return Err(CircleCiError::Transport {
                url,
                source: "context deadline exceeded".into(),
            });
        }

        let started = Instant::now();
        debug!("Sending request");
        let response = self
            .transport
            .send(request)
            .map_err(|source| CircleCiError::Transport {
                url: url.clone(),
                source,
            })?;
        debug!(
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Received response"
        );

        if response.is_success() {
            return Ok(response.body);
        }
        Err(api_error(response, url))
    }
}

/// Turn a non-success response into [`CircleCiError::Api`].
///
/// The message comes from a JSON `{"message": ...}` body, even when empty;
/// any other non-empty body is kept verbatim as the message.
fn api_error(response: HttpResponse, url: String) -> CircleCiError {
    let status = response.status;
    let message = if response.body.is_empty() {
        String::new()
    } else {
        match serde_json::from_slice::<ApiErrorBody>(&response.body) {
            Ok(ApiErrorBody {
                message: Some(message),
            }) => message,
            _ => String::from_utf8_lossy(&response.body).trim().to_string(),
        }
    };
    debug!(status, %message, "API returned an error");
    CircleCiError::Api {
        status,
        message,
        url,
    }
}

/// Render `url` with the token value masked.
pub(crate) fn redact(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .map(|(k, v)| if k == TOKEN_PARAM { (k, "REDACTED".to_string()) } else { (k, v) })
        .collect();
    let mut masked = url.clone();
    masked.query_pairs_mut().clear().extend_pairs(&pairs);
    masked.to_string()
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Step-by-step client configuration.
///
/// Setters apply in the order they are called. The first setter that fails
/// is remembered, later setters are skipped, and [`ClientBuilder::build`]
/// returns that error.
///
/// ```no_run
/// use std::time::Duration;
/// use circleci_client::{Client, VcsProvider};
///
/// let client = Client::builder("my-api-token")
///     .server_url("https://circle.company.com:8080/")
///     .timeout(Duration::from_secs(30))
///     .vcs_provider(VcsProvider::Bitbucket)
///     .build()
///     .unwrap();
/// ```
pub struct ClientBuilder {
    token: String,
    base_url: Option<Url>,
    transport: Option<Arc<dyn Transport>>,
    vcs_provider: VcsProvider,
    error: Option<CircleCiError>,
}

impl ClientBuilder {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: None,
            transport: None,
            vcs_provider: VcsProvider::default(),
            error: None,
        }
    }

    /// Server root; `api/v1.1/` is joined onto its path.
    pub fn server_url(self, server_url: &str) -> Self {
        self.apply(|b| {
            b.base_url = Some(api_base_url(server_url)?);
            Ok(())
        })
    }

    /// Fully resolved API base, used as-is apart from a trailing `/`.
    pub fn base_url(self, base_url: &str) -> Self {
        self.apply(|b| {
            let mut url = parse_absolute(base_url, "base_url")?;
            if !url.path().ends_with('/') {
                let path = format!("{}/", url.path());
                url.set_path(&path);
            }
            b.base_url = Some(url);
            Ok(())
        })
    }

    pub fn transport(self, transport: impl Transport + 'static) -> Self {
        self.apply(|b| {
            b.transport = Some(Arc::new(transport));
            Ok(())
        })
    }

    /// Use a preconfigured reqwest client (TLS, proxies, timeouts).
    pub fn http_client(self, http: reqwest::blocking::Client) -> Self {
        self.transport(ReqwestTransport::new(http))
    }

    /// Use the default transport with an overall per-request timeout.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.apply(|b| {
            let transport = ReqwestTransport::untimed()
                .map_err(|e| CircleCiError::configuration("timeout", e.to_string()))?;
            b.transport = Some(Arc::new(transport.with_timeout(timeout)));
            Ok(())
        })
    }

    pub fn vcs_provider(self, provider: VcsProvider) -> Self {
        self.apply(|b| {
            b.vcs_provider = provider;
            Ok(())
        })
    }

    pub fn build(self) -> Result<Client> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let base_url = match self.base_url {
            Some(url) => url,
            None => api_base_url(DEFAULT_SERVER_URL)?,
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::untimed()
                    .map_err(|e| CircleCiError::configuration("transport", e.to_string()))?,
            ),
        };

        debug!(base_url = %base_url, provider = %self.vcs_provider, "Configured CircleCI client");
        Ok(Client {
            token: self.token,
            base_url,
            transport,
            vcs_provider: self.vcs_provider,
        })
    }

    fn apply(mut self, step: impl FnOnce(&mut Self) -> Result<()>) -> Self {
        if self.error.is_none() {
            if let Err(err) = step(&mut self) {
                self.error = Some(err);
            }
        }
        self
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("token", &"REDACTED")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("transport", &self.transport)
            .field("vcs_provider", &self.vcs_provider)
            .field("error", &self.error)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// URL helpers
// ---------------------------------------------------------------------------

fn parse_absolute(input: &str, field: &'static str) -> Result<Url> {
    if input.trim() != input {
        return Err(CircleCiError::configuration(
            field,
            format!("{input:?} has surrounding whitespace"),
        ));
    }
    let url = Url::parse(input)
        .map_err(|e| CircleCiError::configuration(field, format!("could not parse {input:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(CircleCiError::configuration(
            field,
            format!("{input:?} is not an absolute http(s) URL"),
        ));
    }
    Ok(url)
}

/// `server_url` with its path normalised and `api/v1.1/` appended once.
fn api_base_url(server_url: &str) -> Result<Url> {
    let mut url = parse_absolute(server_url, "server_url")?;

    let mut segments: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let has_api_suffix = matches!(segments.as_slice(), [.., api, version] if api == "api" && version == "v1.1");
    if has_api_suffix {
        segments.truncate(segments.len() - 2);
    }

    let mut path = String::from("/");
    for segment in &segments {
        path.push_str(segment);
        path.push('/');
    }
    path.push_str(API_PATH);

    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
