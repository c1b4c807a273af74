//! Startup: resolve who we are, which workspace to mirror, and where
//!
//! Two entry points produce a validated [`MirrorTarget`]:
//! [`MirrorTarget::from_config`] reads the `bitbucket` section of the config
//! file, [`MirrorTarget::interactive`] asks through a [`Prompter`]. Both fail
//! with a [`SetupError`] before anything is enumerated or written to disk.

use async_trait::async_trait;
use dialoguer::{theme::ColorfulTheme, Input, Password, Select};
use path_clean::PathClean;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::bitbucket::{BitbucketApi, BitbucketClient, Credentials};
use crate::config::Config;
use crate::discovery::{list_all_workspaces, workspace_slugs, CloneProtocol};
use crate::error::SetupError;

/// Source of interactive answers
#[async_trait]
pub trait Prompter: Send {
    async fn username(&mut self) -> Result<String, SetupError>;

    async fn password(&mut self) -> Result<String, SetupError>;

    /// Ask for a workspace, showing the slugs the session can see
    async fn workspace(&mut self, available: &[String]) -> Result<String, SetupError>;

    async fn destination(&mut self, default: &str) -> Result<String, SetupError>;

    async fn protocol(&mut self, default: CloneProtocol) -> Result<CloneProtocol, SetupError>;
}

/// Terminal prompts, each answered on the blocking pool so the runtime keeps
/// serving Ctrl-C while a prompt holds the terminal
#[derive(Debug, Default)]
pub struct DialoguerPrompter;

/// Run one dialoguer prompt off the async runtime thread
async fn ask<T, F>(prompt: F) -> Result<T, SetupError>
where
    T: Send + 'static,
    F: FnOnce(&ColorfulTheme) -> dialoguer::Result<T> + Send + 'static,
{
    let answer = tokio::task::spawn_blocking(move || prompt(&ColorfulTheme::default())).await?;
    Ok(answer?)
}

#[async_trait]
impl Prompter for DialoguerPrompter {
    async fn username(&mut self) -> Result<String, SetupError> {
        let user: String = ask(|theme| {
            Input::with_theme(theme)
                .with_prompt("bitbucket user")
                .interact_text()
        })
        .await?;
        Ok(user.trim().to_string())
    }

    async fn password(&mut self) -> Result<String, SetupError> {
        ask(|theme| {
            Password::with_theme(theme)
                .with_prompt("bitbucket password")
                .interact()
        })
        .await
    }

    async fn workspace(&mut self, available: &[String]) -> Result<String, SetupError> {
        let label = format!("workspace ({})", available.join(", "));
        ask(move |theme| Input::with_theme(theme).with_prompt(label).interact_text()).await
    }

    async fn destination(&mut self, default: &str) -> Result<String, SetupError> {
        let default = default.to_string();
        ask(move |theme| {
            Input::with_theme(theme)
                .with_prompt("destination path")
                .default(default)
                .interact_text()
        })
        .await
    }

    async fn protocol(&mut self, default: CloneProtocol) -> Result<CloneProtocol, SetupError> {
        let default_index = CloneProtocol::ALL
            .iter()
            .position(|p| *p == default)
            .unwrap_or(0);

        let selection = ask(move |theme| {
            Select::with_theme(theme)
                .with_prompt("clone protocol")
                .items(&CloneProtocol::ALL)
                .default(default_index)
                .interact()
        })
        .await?;

        Ok(CloneProtocol::ALL[selection])
    }
}

/// A validated run target
#[derive(Debug)]
pub struct MirrorTarget {
    pub client: BitbucketClient,
    pub workspace: String,
    pub destination: PathBuf,
    pub protocol: CloneProtocol,
}

impl MirrorTarget {
    /// Resolve everything from the config file
    pub async fn from_config(config: &Config) -> Result<Self, SetupError> {
        let section = config.bitbucket_section()?;
        let credentials = section.credentials()?;

        let owner = Some(section.workspace.clone());
        let client = authenticate(&section.api_url, credentials, owner).await?;
        let available = available_workspaces(&client).await?;
        let workspace = check_workspace(&available, &section.workspace)?;
        let destination = validate_destination(&config.git.destination_path)?;

        Ok(Self {
            client,
            workspace,
            destination,
            protocol: config.git.protocol,
        })
    }

    /// Resolve everything by asking, using `config` only for defaults
    pub async fn interactive<P>(config: &Config, prompter: &mut P) -> Result<Self, SetupError>
    where
        P: Prompter + ?Sized,
    {
        let user = prompter.username().await?;
        let password = prompter.password().await?;

        let client = authenticate(config.api_url(), Credentials::new(user, password), None).await?;
        let available = available_workspaces(&client).await?;

        let answer = prompter.workspace(&available).await?;
        let workspace = check_workspace(&available, &answer)?;

        let answer = prompter.destination(&config.git.destination_path).await?;
        let destination = validate_destination(&answer)?;

        let protocol = prompter.protocol(config.git.protocol).await?;

        Ok(Self {
            client,
            workspace,
            destination,
            protocol,
        })
    }
}

/// Verify credentials against the API
pub async fn authenticate(
    api_url: &str,
    credentials: Credentials,
    owner: Option<String>,
) -> Result<BitbucketClient, SetupError> {
    debug!("Authenticating {} against {}", credentials.username, api_url);
    Ok(BitbucketClient::authenticate(api_url, credentials, owner).await?)
}

/// Slugs of every workspace visible to the session
pub async fn available_workspaces<A>(api: &A) -> Result<Vec<String>, SetupError>
where
    A: BitbucketApi + ?Sized,
{
    let workspaces = list_all_workspaces(api).await?;
    let slugs = workspace_slugs(&workspaces);
    debug!("Visible workspaces: {}", slugs.join(", "));
    Ok(slugs)
}

/// Accept `workspace` only if it is one of `available`
pub fn check_workspace(available: &[String], workspace: &str) -> Result<String, SetupError> {
    let workspace = workspace.trim();

    if available.iter().any(|slug| slug == workspace) {
        info!("Using workspace {}", workspace);
        Ok(workspace.to_string())
    } else {
        Err(SetupError::UnknownWorkspace(workspace.to_string()))
    }
}

/// Expand and normalize a destination root, which must be an existing directory
pub fn validate_destination(raw: &str) -> Result<PathBuf, SetupError> {
    let raw = raw.trim();
    let invalid = || SetupError::DestinationPath(raw.to_string());

    if raw.is_empty() {
        return Err(invalid());
    }

    let expanded = shellexpand::full(raw).map_err(|_| invalid())?;
    let path = PathBuf::from(expanded.as_ref()).clean();

    if path.is_dir() {
        Ok(path)
    } else {
        Err(invalid())
    }
}
