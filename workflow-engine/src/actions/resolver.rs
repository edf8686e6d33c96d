// Action Resolver
// Maps `uses:` references to action metadata and an on-disk location

use crate::actions::manifest::{ActionError, ActionMetadata};
use crate::RunnerResult;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A parsed `uses:` reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionRef {
    /// `./path/to/action` relative to the workspace
    Local(String),
    /// `owner/repo[/path]@ref`
    Repository {
        owner: String,
        repo: String,
        path: Option<String>,
        git_ref: String,
    },
}

impl ActionRef {
    pub fn parse(uses: &str) -> Result<Self, ActionError> {
        let uses = uses.trim();
        if uses.starts_with("./") || uses.starts_with("../") {
            return Ok(ActionRef::Local(uses.to_string()));
        }

        let invalid = || ActionError::InvalidReference(uses.to_string());
        let (name, git_ref) = uses.split_once('@').ok_or_else(invalid)?;
        if git_ref.is_empty() {
            return Err(invalid());
        }

        let mut parts = name.splitn(3, '/');
        let owner = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let repo = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let path = parts.next().map(|p| p.trim_matches('/').to_string()).filter(|p| !p.is_empty());

        Ok(ActionRef::Repository {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path,
            git_ref: git_ref.to_string(),
        })
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionRef::Local(path) => write!(f, "{}", path),
            ActionRef::Repository {
                owner,
                repo,
                path: Some(path),
                git_ref,
            } => write!(f, "{}/{}/{}@{}", owner, repo, path, git_ref),
            ActionRef::Repository {
                owner, repo, git_ref, ..
            } => write!(f, "{}/{}@{}", owner, repo, git_ref),
        }
    }
}

/// An action ready to run
#[derive(Debug, Clone)]
pub struct ResolvedAction {
    pub reference: ActionRef,
    pub metadata: ActionMetadata,
    /// Directory holding `action.yml` and the implementation
    pub location: PathBuf,
}

#[async_trait::async_trait]
pub trait ActionResolver: Send + Sync {
    async fn resolve(&self, reference: &ActionRef) -> RunnerResult<ResolvedAction>;
}

/// Resolves actions from the workspace and a local cache directory.
///
/// Remote references must already be present at
/// `<cache>/<owner>/<repo>/<ref>[/<path>]`; nothing is downloaded.
pub struct LocalActionResolver {
    workspace: PathBuf,
    cache_dir: PathBuf,
    /// In-memory cache of loaded metadata
    cache: Arc<RwLock<HashMap<ActionRef, ResolvedAction>>>,
}

impl LocalActionResolver {
    pub fn new(workspace: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            cache_dir: cache_dir.into(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory an action reference points at
    pub fn action_path(&self, reference: &ActionRef) -> PathBuf {
        match reference {
            ActionRef::Local(path) => self.workspace.join(path),
            ActionRef::Repository {
                owner,
                repo,
                path,
                git_ref,
            } => {
                let dir = self.cache_dir.join(owner).join(repo).join(git_ref);
                match path {
                    Some(sub) => dir.join(sub),
                    None => dir,
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ActionResolver for LocalActionResolver {
    async fn resolve(&self, reference: &ActionRef) -> RunnerResult<ResolvedAction> {
        {
            let cache = self.cache.read().await;
            if let Some(action) = cache.get(reference) {
                return Ok(action.clone());
            }
        }

        let location = self.action_path(reference);
        debug!(action = %reference, path = %location.display(), "loading action metadata");
        let metadata = ActionMetadata::from_dir(&location)?;
        let action = ResolvedAction {
            reference: reference.clone(),
            metadata,
            location,
        };

        let mut cache = self.cache.write().await;
        cache.insert(reference.clone(), action.clone());
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunnerError;
    use std::fs;

    #[test]
    fn test_parse_references() {
        assert_eq!(
            ActionRef::parse("actions/checkout@v4").unwrap(),
            ActionRef::Repository {
                owner: "actions".into(),
                repo: "checkout".into(),
                path: None,
                git_ref: "v4".into(),
            }
        );

        let nested = ActionRef::parse("org/monorepo/tools/lint@main").unwrap();
        assert_eq!(nested.to_string(), "org/monorepo/tools/lint@main");
        assert!(matches!(nested, ActionRef::Repository { path: Some(ref p), .. } if p == "tools/lint"));

        assert_eq!(
            ActionRef::parse("./.github/actions/hello").unwrap(),
            ActionRef::Local("./.github/actions/hello".into())
        );
    }

    #[test]
    fn test_invalid_references() {
        for bad in ["checkout", "actions/checkout", "actions/checkout@", "@v1", "/x@v1"] {
            assert!(ActionRef::parse(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[tokio::test]
    async fn test_resolve_local_and_cached() {
        let workspace = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();

        let local = workspace.path().join(".github/actions/hello");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join("action.yml"), "runs:\n  using: composite\n  steps: []\n").unwrap();

        let remote = cache.path().join("acme/setup/v2");
        fs::create_dir_all(&remote).unwrap();
        fs::write(remote.join("action.yml"), "name: setup\nruns:\n  using: node20\n  main: index.js\n").unwrap();

        let resolver = LocalActionResolver::new(workspace.path(), cache.path());

        let hello = resolver
            .resolve(&ActionRef::parse("./.github/actions/hello").unwrap())
            .await
            .unwrap();
        assert_eq!(hello.location, local);

        let reference = ActionRef::parse("acme/setup@v2").unwrap();
        let setup = resolver.resolve(&reference).await.unwrap();
        assert_eq!(setup.metadata.name.as_deref(), Some("setup"));

        // served from memory once loaded
        fs::remove_dir_all(&remote).unwrap();
        assert!(resolver.resolve(&reference).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_action_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = LocalActionResolver::new(dir.path(), dir.path());
        let result = resolver.resolve(&ActionRef::parse("a/b@v1").unwrap()).await;
        assert!(matches!(result, Err(RunnerError::Execution(_))));
    }
}
