//! CircleCI v1.1 API client library for Rust.
//!
//! A thin, blocking client for the [CircleCI API](https://circleci.com/docs/api/v1/).
//! Requests are authenticated with a `circle-token` query parameter and
//! responses are decoded into typed records. The project endpoints (list,
//! get, follow, unfollow, enable, disable) are covered.
//!
//! Nothing is retried or cached. Every call takes a [`Context`] whose
//! cancellation flag and deadline are the only limits applied to it.
//!
//! # Quick Start
//!
//! ```no_run
//! use circleci_client::{Client, Context};
//!
//! let client = Client::new("my-api-token", "https://circleci.com/").unwrap();
//! let ctx = Context::background();
//!
//! // List followed projects
//! for p in client.projects().list(&ctx).unwrap() {
//!     println!("{}/{}", p.username, p.name);
//! }
//!
//! // Follow another one
//! client.projects().follow(&ctx, "my-repo", "my-org").unwrap();
//! ```

pub mod client;
pub mod context;
pub mod error;
pub mod models;
pub mod projects;
pub mod transport;

// Re-export the main public types at the crate root for convenience.
pub use client::{Client, ClientBuilder, DEFAULT_SERVER_URL};
pub use context::Context;
pub use error::{BoxError, CircleCiError, Result};
pub use models::{Project, VcsProvider};
pub use projects::ProjectService;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
