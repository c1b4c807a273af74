//! Repository discovery over the Bitbucket API
//!
//! Collection endpoints are paginated through a `next` link in each page.
//! Pages are exposed as lazy streams ([`repository_pages`], [`workspace_pages`])
//! and materialized eagerly by [`enumerate_repositories`] and
//! [`list_all_workspaces`]: a mirror run needs the whole workspace in memory
//! before it touches the disk.

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::bitbucket::{BitbucketApi, Page, Repository, Workspace, DEFAULT_PAGE_LEN};
use crate::error::ApiError;

/// Clone protocol requested for every repository of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneProtocol {
    /// Use SSH (git@bitbucket.org:workspace/repo.git)
    #[default]
    Ssh,
    /// Use HTTPS (https://user@bitbucket.org/workspace/repo.git)
    Https,
}

impl CloneProtocol {
    pub const ALL: [CloneProtocol; 2] = [CloneProtocol::Ssh, CloneProtocol::Https];

    /// Link name used by the API for this protocol
    pub fn as_str(&self) -> &'static str {
        match self {
            CloneProtocol::Ssh => "ssh",
            CloneProtocol::Https => "https",
        }
    }
}

impl fmt::Display for CloneProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloneProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssh" => Ok(CloneProtocol::Ssh),
            "https" => Ok(CloneProtocol::Https),
            other => Err(format!("unknown clone protocol '{}' (expected ssh or https)", other)),
        }
    }
}

/// Mirror target derived from one repository descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct RepoSpec {
    /// Repository name (e.g., "api")
    pub name: String,

    /// Parent project name (e.g., "core"), if the descriptor has one
    pub project: Option<String>,

    /// `workspace/slug` for display
    pub full_name: String,

    /// Clone URL for the requested protocol, if advertised
    pub clone_url: Option<String>,

    pub protocol: CloneProtocol,

    /// `<destination_root>/<project>/<name>`
    pub local_path: PathBuf,
}

impl RepoSpec {
    pub fn from_repository(
        repo: &Repository,
        protocol: CloneProtocol,
        destination_root: &Path,
    ) -> Self {
        let local_path = match repo.project_name() {
            Some(project) => destination_root.join(project).join(&repo.name),
            None => destination_root.join(&repo.name),
        };

        RepoSpec {
            name: repo.name.clone(),
            project: repo.project_name().map(str::to_string),
            full_name: repo.display_name().to_string(),
            clone_url: repo.clone_url(protocol).map(str::to_string),
            protocol,
            local_path,
        }
    }

    /// Whether a local checkout directory is already present
    pub fn exists_locally(&self) -> bool {
        self.local_path.is_dir()
    }
}

/// A request for one page, borrowed from the API for its lifetime
pub type PageFuture<'a, T> = BoxFuture<'a, Result<Page<T>, ApiError>>;

enum Cursor<'a, T> {
    First(PageFuture<'a, T>),
    Next(String),
    Done,
}

/// Lazy stream of pages: `first`, then `next(cursor)` while pages carry one
pub fn paginate<'a, T, N>(
    first: PageFuture<'a, T>,
    next: N,
) -> impl Stream<Item = Result<Page<T>, ApiError>> + 'a
where
    T: Send + 'a,
    N: Fn(String) -> PageFuture<'a, T> + Send + 'a,
{
    stream::try_unfold(Cursor::First(first), move |cursor| {
        let request = match cursor {
            Cursor::First(request) => Some(request),
            Cursor::Next(url) => Some(next(url)),
            Cursor::Done => None,
        };

        async move {
            let Some(request) = request else {
                return Ok(None);
            };

            let page = request.await?;
            let cursor = match page.next.clone() {
                Some(url) => Cursor::Next(url),
                None => Cursor::Done,
            };

            Ok::<_, ApiError>(Some((page, cursor)))
        }
    })
}

/// Pages of repositories in `workspace`
pub fn repository_pages<'a, A>(
    api: &'a A,
    workspace: &'a str,
    pagelen: u32,
) -> impl Stream<Item = Result<Page<Repository>, ApiError>> + 'a
where
    A: BitbucketApi + ?Sized,
{
    paginate(api.list_repositories(workspace, pagelen), move |cursor| {
        async move { api.next_repositories(&cursor).await }.boxed()
    })
}

/// Pages of workspaces visible to the session
pub fn workspace_pages<'a, A>(
    api: &'a A,
    pagelen: u32,
) -> impl Stream<Item = Result<Page<Workspace>, ApiError>> + 'a
where
    A: BitbucketApi + ?Sized,
{
    paginate(api.list_workspaces(pagelen), move |cursor| {
        async move { api.next_workspaces(&cursor).await }.boxed()
    })
}

/// Every repository of a workspace, in API order
pub async fn enumerate_repositories<A>(
    api: &A,
    workspace: &str,
) -> Result<Vec<Repository>, ApiError>
where
    A: BitbucketApi + ?Sized,
{
    info!("Getting repositories information for workspace {}", workspace);

    let mut pages = Box::pin(repository_pages(api, workspace, DEFAULT_PAGE_LEN));
    let mut repositories = Vec::new();

    while let Some(page) = pages.try_next().await? {
        debug!(
            "Fetched page {} with {} repositories",
            page.page.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string()),
            page.values.len()
        );
        repositories.extend(page.values);
    }

    info!("{} repositories found in {}", repositories.len(), workspace);
    Ok(repositories)
}

/// Every workspace visible to the session
pub async fn list_all_workspaces<A>(api: &A) -> Result<Vec<Workspace>, ApiError>
where
    A: BitbucketApi + ?Sized,
{
    workspace_pages(api, DEFAULT_PAGE_LEN)
        .map_ok(|page| page.values)
        .try_concat()
        .await
}

/// Slugs of the given workspaces, skipping entries without one
pub fn workspace_slugs(workspaces: &[Workspace]) -> Vec<String> {
    workspaces
        .iter()
        .filter_map(|w| w.slug.clone())
        .filter(|slug| !slug.is_empty())
        .collect()
}
