//! CLI command implementations

pub mod cache;
pub mod check;
pub mod install;
pub mod resolve;

pub use cache::execute as cache;
pub use check::execute as check;
pub use install::execute as install;
pub use resolve::execute as resolve;

use crate::cache::CacheManager;
use crate::config::Config;
use crate::error::{SkillsyncError, SkillsyncResult};
use crate::lock::{load_lock, LoadedLock, LockSource};
use crate::resolver::ExecutionContext;
use crate::source::{GitCli, GitClient, HttpTransport, SourceFetcher, UreqTransport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Collaborators shared by every command, built once from the config
pub struct CommandEnv {
    pub config: Config,
    pub cwd: PathBuf,
    pub home: Option<PathBuf>,
    pub cache: CacheManager,
    pub transport: Arc<dyn HttpTransport>,
    pub git: Arc<dyn GitClient>,
}

impl CommandEnv {
    pub fn new(config: Config) -> SkillsyncResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| SkillsyncError::io("getting current directory", e))?;
        let cache = CacheManager::new(
            config
                .cache
                .dir
                .clone()
                .unwrap_or_else(CacheManager::default_root),
        );
        let transport: Arc<dyn HttpTransport> = Arc::new(UreqTransport::new(
            &config.http,
            config.server.auth_token.clone(),
        ));

        Ok(Self {
            cwd,
            home: dirs::home_dir(),
            cache,
            transport,
            git: Arc::new(GitCli::new()),
            config,
        })
    }

    /// Load the lock named by `--lock`, or discover one
    pub async fn load_lock(&self, arg: Option<&str>) -> SkillsyncResult<LoadedLock> {
        let source = match arg {
            Some(arg) => LockSource::parse(arg),
            None => LockSource::discover(&self.cwd, self.config.server.url.as_deref())?,
        };
        debug!("Lock source: {}", source);

        let loaded = load_lock(&source, self.transport.clone(), &self.cache, &self.cwd).await?;
        if loaded.from_cache {
            warn!("Using cached lock for {}", source);
        }
        Ok(loaded)
    }

    /// Execution context for the working directory
    pub async fn context(&self, global_only: bool) -> ExecutionContext {
        if global_only {
            return ExecutionContext::global();
        }
        ExecutionContext::detect(self.git.as_ref(), &self.cwd).await
    }

    /// Fetcher resolving relative path sources against `base_dir`
    pub fn fetcher(&self, base_dir: PathBuf) -> SourceFetcher {
        SourceFetcher::new(self.transport.clone(), self.git.clone(), self.cache.clone())
            .with_base_dir(base_dir)
            .with_home_dir(self.home.clone())
    }
}
