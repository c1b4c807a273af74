//! One mirror run, from configuration to report

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::discovery::enumerate_repositories;
use crate::git::GitClient;
use crate::output::Palette;
use crate::session::{MirrorTarget, Prompter};
use crate::sync::{MirrorEngine, MirrorReport};

/// Per-invocation settings that do not live in the config file
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Ask for credentials, workspace and destination instead of reading them
    pub interactive: bool,
    pub palette: Palette,
}

/// Load the config file at `path` (or the default location).
///
/// Interactive runs tolerate a missing file and start from defaults.
pub fn load_config(path: Option<&Path>, interactive: bool) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match Config::default_config_path() {
            Ok(path) => path,
            Err(_) if interactive => return Ok(Config::default()),
            Err(e) => return Err(e),
        },
    };

    if interactive {
        Config::load_or_default(&path)
    } else {
        Config::load(&path)
    }
}

/// Resolve the target, enumerate the workspace, mirror it and print the stats
pub async fn run<P, W>(
    config: &Config,
    options: &RunOptions,
    prompter: &mut P,
    out: &mut W,
) -> Result<MirrorReport>
where
    P: Prompter + ?Sized,
    W: Write,
{
    let target = if options.interactive {
        MirrorTarget::interactive(config, prompter).await?
    } else {
        MirrorTarget::from_config(config).await?
    };

    info!("Starting");

    let repositories = enumerate_repositories(&target.client, &target.workspace)
        .await
        .with_context(|| format!("Failed to list repositories of workspace {}", target.workspace))?;

    let engine = MirrorEngine::new(GitClient::new(config.git.fast_forward_only));
    let report = engine
        .mirror(&repositories, target.protocol, &target.destination)
        .await;

    options
        .palette
        .print_report(&report, out)
        .context("Failed to print stats")?;

    info!("End");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BitbucketConfig, GitConfig};
    use crate::discovery::CloneProtocol;
    use crate::error::{ApiError, SetupError};
    use crate::git::tests::{run_git, source_repo};
    use crate::session::DialoguerPrompter;
    use assert_matches::assert_matches;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_account(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/2.0/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"username": "alice"})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2.0/workspaces"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"values": [{"slug": "acme"}]})),
            )
            .mount(server)
            .await;
    }

    fn local_repo_json(project: &str, name: &str, source: &Path) -> serde_json::Value {
        json!({
            "name": name,
            "full_name": format!("acme/{}", name),
            "project": {"name": project},
            "links": {"clone": [
                {"name": "https", "href": source.to_string_lossy()},
                {"name": "ssh", "href": "git@bitbucket.invalid:acme/unused.git"}
            ]}
        })
    }

    fn config_for(server: &MockServer, destination: &Path) -> Config {
        Config {
            bitbucket: Some(BitbucketConfig {
                user: "alice".to_string(),
                password: Some("secret".to_string()),
                workspace: "acme".to_string(),
                api_url: server.uri(),
            }),
            git: GitConfig {
                destination_path: destination.to_string_lossy().to_string(),
                protocol: CloneProtocol::Https,
                fast_forward_only: true,
            },
            ..Default::default()
        }
    }

    fn options() -> RunOptions {
        RunOptions {
            interactive: false,
            palette: Palette::plain(),
        }
    }

    #[tokio::test]
    async fn test_run_clones_and_updates() {
        let sources = TempDir::new().unwrap();
        let api_source = source_repo(sources.path(), "api");
        let web_source = source_repo(sources.path(), "web");

        let destination = TempDir::new().unwrap();
        std::fs::create_dir_all(destination.path().join("core")).unwrap();
        run_git(
            &destination.path().join("core"),
            &["clone", "--quiet", &api_source.to_string_lossy(), "api"],
        );

        let server = MockServer::start().await;
        mock_account(&server).await;
        Mock::given(method("GET"))
            .and(path("/2.0/repositories/acme"))
            .and(query_param("pagelen", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [
                    local_repo_json("core", "api", &api_source),
                    local_repo_json("core", "web", &web_source),
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut out = Vec::new();
        let report = run(
            &config_for(&server, destination.path()),
            &options(),
            &mut DialoguerPrompter::default(),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(report.stats.updated, 1);
        assert_eq!(report.stats.cloned, 1);
        assert_eq!(report.stats.total(), 2);
        assert!(destination.path().join("core/web/README.md").is_file());

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.starts_with("========= Stats ========="));
        assert!(printed.contains("updated: 1\n"));
        assert!(printed.contains("cloned: 1\n"));
    }

    #[tokio::test]
    async fn test_run_setup_error_is_typed() {
        let destination = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2.0/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut out = Vec::new();
        let err = run(
            &config_for(&server, destination.path()),
            &options(),
            &mut DialoguerPrompter::default(),
            &mut out,
        )
        .await
        .unwrap_err();

        assert_matches!(err.downcast_ref::<SetupError>(), Some(SetupError::InvalidCredentials));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_run_enumeration_failure() {
        let destination = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mock_account(&server).await;
        Mock::given(method("GET"))
            .and(path("/2.0/repositories/acme"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut out = Vec::new();
        let err = run(
            &config_for(&server, destination.path()),
            &options(),
            &mut DialoguerPrompter::default(),
            &mut out,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("acme"));
        assert_matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::Unknown { status: 500, .. })
        );
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("config.yml");

        assert!(load_config(Some(&missing), false).is_err());

        let config = load_config(Some(&missing), true).unwrap();
        assert!(config.bitbucket.is_none());
    }
}
