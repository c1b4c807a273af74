//! Common test utilities and helpers for bbmirror tests
#![allow(dead_code)]

use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Isolated config home, destination root and clone sources
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
    pub destination: PathBuf,
    pub sources: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_dir = temp_dir.path().join("bbmirror");
        let destination = temp_dir.path().join("mirror");
        let sources = temp_dir.path().join("sources");
        for dir in [&config_dir, &destination, &sources] {
            std::fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        Self {
            temp_dir,
            config_dir,
            destination,
            sources,
        }
    }

    pub fn create_test_config(&self, content: &str) -> PathBuf {
        let config_path = self.config_dir.join("config.yml");
        std::fs::write(&config_path, content).expect("Failed to write test config");
        config_path
    }

    /// Config pointing at `api_url` with plain output
    pub fn create_config(&self, api_url: &str, workspace: &str) -> PathBuf {
        let content = format!(
            r#"
bitbucket:
  user: "alice"
  password: "secret"
  workspace: "{}"
  api_url: "{}"
git:
  destination_path: "{}"
  protocol: "https"
logging:
  level: "warn"
  color: false
"#,
            workspace,
            api_url,
            self.destination.display()
        );
        self.create_test_config(&content)
    }

    /// A repository with one commit under `sources/`
    pub fn source_repo(&self, name: &str) -> PathBuf {
        let path = self.sources.join(name);
        std::fs::create_dir_all(&path).expect("Failed to create source repo dir");
        git(&path, &["init", "--quiet"]);
        std::fs::write(path.join("README.md"), format!("# {}\n", name)).unwrap();
        git(&path, &["add", "README.md"]);
        git(&path, &["commit", "--quiet", "-m", "initial"]);
        path
    }

    /// Run the built binary with this environment's config home
    pub async fn run(&self, args: &[&str]) -> Output {
        tokio::process::Command::new(env!("CARGO_BIN_EXE_bbmirror"))
            .args(args)
            .env("XDG_CONFIG_HOME", self.temp_dir.path())
            .env_remove("RUST_LOG")
            .env_remove("BITBUCKET_APP_PASSWORD")
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .await
            .expect("Failed to run bbmirror")
    }
}

/// Run git synchronously with a fixed identity
pub fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(["-c", "user.name=bbmirror", "-c", "user.email=bbmirror@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git must be installed to run these tests");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Repository descriptor whose https link is a local path
pub fn repo_json(project: &str, name: &str, clone_from: &Path) -> serde_json::Value {
    json!({
        "name": name,
        "slug": name,
        "full_name": format!("acme/{}", name),
        "project": {"name": project},
        "links": {"clone": [
            {"name": "https", "href": clone_from.to_string_lossy()},
            {"name": "ssh", "href": format!("git@bitbucket.invalid:acme/{}.git", name)}
        ]}
    })
}

/// Mock API that accepts any credentials and lists `workspaces`
pub async fn mock_bitbucket(workspaces: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2.0/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"username": "alice"})))
        .mount(&server)
        .await;

    let values: Vec<_> = workspaces.iter().map(|slug| json!({"slug": slug})).collect();
    Mock::given(method("GET"))
        .and(path("/2.0/workspaces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": values})))
        .mount(&server)
        .await;

    server
}

/// Serve `pages` of repositories for `workspace`, linked through `next`
pub async fn mount_repository_pages(
    server: &MockServer,
    workspace: &str,
    pages: Vec<Vec<serde_json::Value>>,
) {
    let count = pages.len();
    for (index, values) in pages.into_iter().enumerate() {
        let route = if index == 0 {
            format!("/2.0/repositories/{}", workspace)
        } else {
            format!("/pages/{}/{}", workspace, index + 1)
        };
        let mut body = json!({"values": values, "page": index + 1});
        if index + 1 < count {
            body["next"] = json!(format!("{}/pages/{}/{}", server.uri(), workspace, index + 2));
        }

        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
