use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::discovery::CloneProtocol;
use crate::error::ApiError;

/// Default Bitbucket Cloud API root
pub const DEFAULT_API_URL: &str = "https://api.bitbucket.org/";

/// Page size requested from collection endpoints
pub const DEFAULT_PAGE_LEN: u32 = 50;

/// Username and app password used for basic authentication
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authenticated session: fixed once the client is built
#[derive(Debug, Clone)]
pub struct Session {
    credentials: Credentials,
    owner: String,
}

impl Session {
    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    pub fn password(&self) -> &str {
        &self.credentials.password
    }

    /// Effective workspace owner (the authenticated user unless overridden)
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// Raw response body, decoded as JSON when the server says it is JSON
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
}

/// One page of a paginated collection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,

    /// Absolute URL of the next page; absent on the last page
    pub next: Option<String>,

    pub page: Option<u32>,
    pub pagelen: Option<u32>,
    pub size: Option<u64>,
}

/// The authenticated user as returned by `2.0/user`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub uuid: Option<String>,
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Workspace {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub uuid: Option<String>,
}

/// Repository descriptor, kept as close to the API payload as we need it
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Repository {
    pub name: String,
    pub slug: Option<String>,
    pub full_name: Option<String>,
    pub project: Option<ProjectRef>,

    #[serde(default)]
    pub links: RepositoryLinks,

    pub is_private: Option<bool>,
    pub mainbranch: Option<BranchRef>,
    pub updated_on: Option<DateTime<Utc>>,

    /// Size in bytes
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProjectRef {
    pub name: String,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BranchRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RepositoryLinks {
    #[serde(default)]
    pub clone: Vec<CloneLink>,
}

/// A clone endpoint; `name` is the protocol (`https` or `ssh`)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CloneLink {
    pub name: String,
    pub href: String,
}

impl Repository {
    /// Clone URL for the requested protocol, if the API advertised one
    pub fn clone_url(&self, protocol: CloneProtocol) -> Option<&str> {
        self.links
            .clone
            .iter()
            .find(|link| link.name.eq_ignore_ascii_case(protocol.as_str()))
            .map(|link| link.href.as_str())
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.name.as_str())
    }

    /// `workspace/slug` when available, else the bare name
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.name)
    }
}

/// Paginated operations consumed by the enumerator and the front-end
#[async_trait]
pub trait BitbucketApi: Send + Sync {
    /// First page of workspaces visible to the session
    async fn list_workspaces(&self, pagelen: u32) -> Result<Page<Workspace>, ApiError>;

    /// Workspace page behind a previously returned cursor
    async fn next_workspaces(&self, cursor: &str) -> Result<Page<Workspace>, ApiError>;

    /// First page of repositories in a workspace
    async fn list_repositories(
        &self,
        workspace: &str,
        pagelen: u32,
    ) -> Result<Page<Repository>, ApiError>;

    /// Repository page behind a previously returned cursor
    async fn next_repositories(&self, cursor: &str) -> Result<Page<Repository>, ApiError>;
}

/// Bitbucket REST client bound to one authenticated session
#[derive(Debug)]
pub struct BitbucketClient {
    http: reqwest::Client,
    base_url: String,
    session: Session,
}

impl BitbucketClient {
    /// Build a client and verify the credentials against `2.0/user`
    pub async fn authenticate(
        api_url: &str,
        credentials: Credentials,
        owner: Option<String>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("bbmirror/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut client = Self {
            http,
            base_url: normalize_base_url(api_url),
            session: Session {
                credentials,
                owner: String::new(),
            },
        };

        let user = client.current_user().await?;

        client.session.owner = owner
            .or(user.username)
            .unwrap_or_else(|| client.session.credentials.username.clone());

        info!("Authenticated with Bitbucket as: {}", client.session.owner);
        Ok(client)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the authenticated user
    pub async fn current_user(&self) -> Result<User, ApiError> {
        let url = self.endpoint("2.0/user");
        decode(self.get(&url, None).await?)
    }

    /// Returns the descriptor of one repository
    pub async fn get_repository(
        &self,
        workspace: &str,
        slug: &str,
    ) -> Result<Repository, ApiError> {
        let url = self.endpoint(&format!("2.0/repositories/{}/{}", workspace, slug));
        decode(self.get(&url, None).await?)
    }

    /// Follow a pagination cursor returned by a previous page
    pub async fn next_page<T: DeserializeOwned>(
        &self,
        cursor: &str,
    ) -> Result<Page<T>, ApiError> {
        decode(self.get(cursor, None).await?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, url: &str, pagelen: Option<u32>) -> Result<Option<ResponseBody>, ApiError> {
        debug!("GET {}", url);

        let mut request = self.http.get(url).basic_auth(
            self.session.username(),
            Some(self.session.password()),
        );
        if let Some(pagelen) = pagelen {
            request = request.query(&[("pagelen", pagelen)]);
        }

        let response = request.send().await?;
        parse_response(response).await
    }
}

#[async_trait]
impl BitbucketApi for BitbucketClient {
    async fn list_workspaces(&self, pagelen: u32) -> Result<Page<Workspace>, ApiError> {
        let url = self.endpoint("2.0/workspaces");
        decode(self.get(&url, Some(pagelen)).await?)
    }

    async fn next_workspaces(&self, cursor: &str) -> Result<Page<Workspace>, ApiError> {
        self.next_page(cursor).await
    }

    async fn list_repositories(
        &self,
        workspace: &str,
        pagelen: u32,
    ) -> Result<Page<Repository>, ApiError> {
        let url = self.endpoint(&format!("2.0/repositories/{}", workspace));
        decode(self.get(&url, Some(pagelen)).await?)
    }

    async fn next_repositories(&self, cursor: &str) -> Result<Page<Repository>, ApiError> {
        self.next_page(cursor).await
    }
}

fn normalize_base_url(api_url: &str) -> String {
    format!("{}/", api_url.trim_end_matches('/'))
}

async fn parse_response(response: reqwest::Response) -> Result<Option<ResponseBody>, ApiError> {
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(None);
    }

    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("application/json"))
        .unwrap_or(false);

    let text = response.text().await?;

    let body = if is_json {
        match serde_json::from_str(&text) {
            Ok(value) => ResponseBody::Json(value),
            Err(e) if is_ok_status(status) => return Err(ApiError::Decode(e)),
            Err(_) => ResponseBody::Text(text),
        }
    } else {
        ResponseBody::Text(text)
    };

    classify(status, body)
}

fn is_ok_status(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::CREATED
}

/// Map a status and its body onto the client's outcomes
pub fn classify(status: StatusCode, body: ResponseBody) -> Result<Option<ResponseBody>, ApiError> {
    match status {
        s if is_ok_status(s) => Ok(Some(body)),
        StatusCode::NO_CONTENT => Ok(None),
        other => Err(ApiError::from_status(other, &body)),
    }
}

fn decode<T: DeserializeOwned>(body: Option<ResponseBody>) -> Result<T, ApiError> {
    match body {
        Some(ResponseBody::Json(value)) => Ok(serde_json::from_value(value)?),
        Some(ResponseBody::Text(text)) => Ok(serde_json::from_str(&text)?),
        None => Err(ApiError::EmptyBody),
    }
}
