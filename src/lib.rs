//! bbmirror - Bulk clone and update of a Bitbucket workspace
//!
//! bbmirror lists every repository of a Bitbucket Cloud workspace through the
//! REST API and mirrors it under a local directory as
//! `<destination>/<project>/<repository>`: missing repositories are cloned,
//! existing ones are pulled.
//!
//! ## Modules
//!
//! - [`bitbucket`]: Bitbucket REST API client
//! - [`discovery`]: paginated enumeration of repositories and workspaces
//! - [`git`]: clone and update over the `git` executable
//! - [`sync`]: per-repository clone-or-update engine and outcome counters
//! - [`config`]: YAML configuration with XDG compliance
//! - [`session`]: credential, workspace and destination resolution
//! - [`runner`]: one complete mirror run
//! - [`output`]: terminal styling for stats and messages
//! - [`error`]: error types

pub mod bitbucket;
pub mod config;
pub mod discovery;
pub mod error;
pub mod git;
pub mod output;
pub mod runner;
pub mod session;
pub mod sync;

pub use bitbucket::{BitbucketApi, BitbucketClient, Credentials, Repository, Session};
pub use config::Config;
pub use discovery::{enumerate_repositories, CloneProtocol, RepoSpec};
pub use error::{ApiError, GitError, SetupError};
pub use git::{GitClient, GitOperations};
pub use sync::{MirrorEngine, MirrorOutcome, MirrorReport, MirrorStats};
