//! Mirror engine - clones or updates every repository of a workspace
//!
//! Repositories are processed one at a time, in enumeration order. Each one
//! ends in exactly one [`MirrorOutcome`]; a failure is logged and counted and
//! the run moves on to the next repository.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::bitbucket::Repository;
use crate::discovery::{CloneProtocol, RepoSpec};
use crate::git::GitOperations;

/// What the engine will do for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorAction {
    /// No local checkout yet. `url` is `None` when the API advertised no
    /// link for the requested protocol.
    Clone { url: Option<String> },
    /// A local checkout directory exists
    Update,
}

/// Decide between clone and update for one repository
pub fn plan(spec: &RepoSpec) -> MirrorAction {
    if spec.exists_locally() {
        MirrorAction::Update
    } else {
        MirrorAction::Clone {
            url: spec.clone_url.clone(),
        }
    }
}

/// Result of mirroring a single repository
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorOutcome {
    Updated {
        repository: String,
        path: PathBuf,
    },
    UpdateFailed {
        repository: String,
        path: PathBuf,
        error: String,
    },
    Cloned {
        repository: String,
        path: PathBuf,
    },
    CloneFailed {
        repository: String,
        path: PathBuf,
        error: String,
    },
}

impl MirrorOutcome {
    pub fn repository(&self) -> &str {
        match self {
            MirrorOutcome::Updated { repository, .. }
            | MirrorOutcome::UpdateFailed { repository, .. }
            | MirrorOutcome::Cloned { repository, .. }
            | MirrorOutcome::CloneFailed { repository, .. } => repository,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            MirrorOutcome::Updated { path, .. }
            | MirrorOutcome::UpdateFailed { path, .. }
            | MirrorOutcome::Cloned { path, .. }
            | MirrorOutcome::CloneFailed { path, .. } => path,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            MirrorOutcome::UpdateFailed { error, .. }
            | MirrorOutcome::CloneFailed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error().is_some()
    }
}

/// Outcome counters of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub updated: usize,
    pub updated_fail: usize,
    pub cloned: usize,
    pub cloned_fail: usize,
}

impl MirrorStats {
    pub fn record(&mut self, outcome: &MirrorOutcome) {
        match outcome {
            MirrorOutcome::Updated { .. } => self.updated += 1,
            MirrorOutcome::UpdateFailed { .. } => self.updated_fail += 1,
            MirrorOutcome::Cloned { .. } => self.cloned += 1,
            MirrorOutcome::CloneFailed { .. } => self.cloned_fail += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.updated + self.updated_fail + self.cloned + self.cloned_fail
    }

    /// Counters in report order
    pub fn entries(&self) -> [(&'static str, usize); 4] {
        [
            ("updated", self.updated),
            ("updated_fail", self.updated_fail),
            ("cloned", self.cloned),
            ("cloned_fail", self.cloned_fail),
        ]
    }
}

impl fmt::Display for MirrorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries()
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct MirrorReport {
    pub stats: MirrorStats,
    pub outcomes: Vec<MirrorOutcome>,
    pub duration: Duration,
}

impl MirrorReport {
    pub fn failures(&self) -> impl Iterator<Item = &MirrorOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}

/// Drives clone/update decisions through a [`GitOperations`] backend
pub struct MirrorEngine<G> {
    git: G,
}

impl<G: GitOperations> MirrorEngine<G> {
    pub fn new(git: G) -> Self {
        Self { git }
    }

    /// Mirror one repository. Never fails: errors become failure outcomes.
    pub async fn mirror_one(&self, spec: &RepoSpec) -> MirrorOutcome {
        let repository = spec.full_name.clone();
        let path = spec.local_path.clone();

        match plan(spec) {
            MirrorAction::Update => {
                info!("Updating {}", path.display());
                match self.git.update_repository(&path).await {
                    Ok(()) => MirrorOutcome::Updated { repository, path },
                    Err(e) => {
                        warn!("Repo {} had some problems during updating: {}", spec.name, e);
                        MirrorOutcome::UpdateFailed {
                            repository,
                            path,
                            error: e.to_string(),
                        }
                    }
                }
            }
            MirrorAction::Clone { url: Some(url) } => {
                info!("Cloning {} into {}", spec.name, path.display());
                match self.git.clone_repository(&url, &path).await {
                    Ok(()) => MirrorOutcome::Cloned { repository, path },
                    Err(e) => {
                        warn!("Repo {} had some problems during cloning: {}", spec.name, e);
                        MirrorOutcome::CloneFailed {
                            repository,
                            path,
                            error: e.to_string(),
                        }
                    }
                }
            }
            MirrorAction::Clone { url: None } => {
                let error = format!("no {} clone link advertised", spec.protocol);
                warn!("Repo {} had some problems during cloning: {}", spec.name, error);
                MirrorOutcome::CloneFailed {
                    repository,
                    path,
                    error,
                }
            }
        }
    }

    /// Mirror every repository under `destination_root`, in order
    pub async fn mirror(
        &self,
        repositories: &[Repository],
        protocol: CloneProtocol,
        destination_root: &Path,
    ) -> MirrorReport {
        let start_time = Instant::now();
        let mut stats = MirrorStats::default();
        let mut outcomes = Vec::with_capacity(repositories.len());

        info!(
            "Mirroring {} repositories into {} over {}",
            repositories.len(),
            destination_root.display(),
            protocol
        );

        for repository in repositories {
            let spec = RepoSpec::from_repository(repository, protocol, destination_root);
            let outcome = self.mirror_one(&spec).await;
            debug!("{}: {:?}", spec.full_name, outcome);
            stats.record(&outcome);
            outcomes.push(outcome);
        }

        let duration = start_time.elapsed();
        info!("Mirror completed in {:.2}s: {}", duration.as_secs_f64(), stats);

        MirrorReport {
            stats,
            outcomes,
            duration,
        }
    }
}
