//! Install orchestration
//!
//! A run moves through four phases:
//!
//! 1. **Resolve**: scope filter, graph, order. Any failure aborts before I/O.
//! 2. **Fetch**: bounded-parallel fetch of every resolved artifact. Failures
//!    are collected per artifact.
//! 3. **Install**: sequential, in dependency order. An artifact whose fetch
//!    or install failed takes its dependents down with it; unrelated
//!    branches carry on.
//! 4. **Reconcile**: artifacts recorded by the previous run but no longer
//!    wanted in their target are removed, and each target's install record
//!    is replaced. The global target wants every global artifact of the lock,
//!    including those a repo or path scope overrides in this context.
//!
//! Cancellation reaches fetches, handlers and reconcile. A handler that sees
//! it rolls back its own install.

pub mod cancel;
pub mod handler;
pub mod report;
pub mod state;

pub use cancel::CancelSignal;
pub use handler::{ArchiveHandler, ArchiveHandlerFactory, ArtifactHandler, HandlerFactory};
pub use report::{ArtifactFailure, FailurePhase, InstallReport};
pub use state::{InstallRecord, InstalledArtifact};

use crate::error::{SkillsyncError, SkillsyncResult};
use crate::lock::{Artifact, ArtifactId, LockFile, Scope};
use crate::resolver::{self, scope, ExecutionContext, Resolution};
use crate::source::SourceFetcher;
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of concurrent fetches
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Where installs land
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub concurrency: usize,
    /// Base for global and unscoped artifacts
    pub global_dir: PathBuf,
    /// Directory name under the repository root for repo and path scopes
    pub repo_dir_name: String,
}

/// A target base directory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstallTarget {
    pub base: PathBuf,
    pub global: bool,
}

/// Maps artifacts to target bases for one execution context
#[derive(Debug, Clone)]
pub struct InstallTargets {
    global: InstallTarget,
    repo: Option<InstallTarget>,
}

impl InstallTargets {
    pub fn new(options: &InstallOptions, ctx: &ExecutionContext) -> Self {
        Self {
            global: InstallTarget {
                base: options.global_dir.clone(),
                global: true,
            },
            repo: ctx.repo.as_ref().map(|repo| InstallTarget {
                base: repo.root.join(&options.repo_dir_name),
                global: false,
            }),
        }
    }

    pub fn for_artifact(&self, artifact: &Artifact) -> &InstallTarget {
        match (artifact.effective_scope(), &self.repo) {
            (Scope::Global, _) | (_, None) => &self.global,
            (_, Some(repo)) => repo,
        }
    }

    /// Every target this context can reconcile
    pub fn all(&self) -> Vec<&InstallTarget> {
        std::iter::once(&self.global).chain(self.repo.as_ref()).collect()
    }
}

/// Runs Resolve, Fetch, Install and Reconcile
pub struct Installer {
    fetcher: Arc<SourceFetcher>,
    handlers: Arc<dyn HandlerFactory>,
    options: InstallOptions,
    cancel: CancelSignal,
}

impl Installer {
    pub fn new(
        fetcher: Arc<SourceFetcher>,
        handlers: Arc<dyn HandlerFactory>,
        options: InstallOptions,
    ) -> Self {
        Self {
            fetcher,
            handlers,
            options,
            cancel: CancelSignal::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Install a lock for a context. Fatal errors (resolution) return `Err`;
    /// per-artifact failures land in the report.
    pub async fn run(
        &self,
        lock: &LockFile,
        ctx: &ExecutionContext,
        client: Option<&str>,
    ) -> SkillsyncResult<InstallReport> {
        let resolution = resolver::resolve(lock, ctx, client)?;
        info!("Resolved {} artifacts", resolution.len());

        self.fetcher.cache().ensure_dirs().await?;
        let targets = InstallTargets::new(&self.options, ctx);
        let mut report = InstallReport::default();

        let mut fetched = self.fetch_all(&resolution.order).await;
        if self.cancel.is_cancelled() {
            report.cancelled = true;
        }

        let installed = self
            .install_all(&resolution, &mut fetched, &targets, &mut report)
            .await;

        self.reconcile(lock, client, &resolution, &targets, installed, &mut report)
            .await?;

        info!("Install finished: {}", report.summary());
        Ok(report)
    }

    /// Fetch phase. Stops early on cancellation; unfinished fetches are absent
    /// from the result.
    async fn fetch_all(
        &self,
        artifacts: &[Artifact],
    ) -> HashMap<ArtifactId, SkillsyncResult<Vec<u8>>> {
        let fetcher = self.fetcher.as_ref();
        let mut results = HashMap::with_capacity(artifacts.len());
        let mut pending = stream::iter(artifacts)
            .map(|artifact| async move { (artifact.id(), fetcher.fetch(artifact).await) })
            .buffer_unordered(self.options.concurrency.max(1));

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!("Fetch cancelled with {} of {} done", results.len(), artifacts.len());
                    break;
                }
                next = pending.next() => match next {
                    Some((id, result)) => {
                        if let Err(e) = &result {
                            warn!("Failed to fetch {}: {}", id, e);
                        }
                        results.insert(id, result);
                    }
                    None => break,
                },
            }
        }

        results
    }

    /// Install phase, in dependency order. Returns what landed where.
    async fn install_all(
        &self,
        resolution: &Resolution,
        fetched: &mut HashMap<ArtifactId, SkillsyncResult<Vec<u8>>>,
        targets: &InstallTargets,
        report: &mut InstallReport,
    ) -> Vec<(InstallTarget, InstalledArtifact)> {
        let mut failed: HashSet<ArtifactId> = HashSet::new();
        let mut installed = Vec::new();

        for artifact in &resolution.order {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let id = artifact.id();

            if let Some(dep) = resolution
                .dependencies_of(&id)
                .iter()
                .find(|d| failed.contains(*d))
            {
                debug!("Skipping {}: dependency {} failed", id, dep);
                report.record_failure(
                    id.clone(),
                    FailurePhase::Skipped,
                    format!("dependency {} failed", dep),
                );
                failed.insert(id);
                continue;
            }

            let data = match fetched.remove(&id) {
                Some(Ok(data)) => data,
                Some(Err(e)) => {
                    report.record_failure(id.clone(), FailurePhase::Fetch, e);
                    failed.insert(id);
                    continue;
                }
                None => {
                    // Never fetched: the run was cancelled mid-fetch
                    report.cancelled = true;
                    break;
                }
            };

            let target = targets.for_artifact(artifact);
            let handler = self.handlers.handler(&artifact.name, artifact.artifact_type);
            match install_one(handler.as_ref(), &id, &data, &target.base, &self.cancel).await {
                Ok(()) => {
                    info!("Installed {}", id);
                    installed.push((
                        target.clone(),
                        InstalledArtifact::new(artifact, handler.install_path()),
                    ));
                    report.installed.push(id);
                }
                Err(SkillsyncError::Cancelled) => {
                    info!("Install of {} rolled back on cancel", id);
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!("Failed to install {}: {}", id, e);
                    report.record_failure(id.clone(), FailurePhase::Install, e);
                    failed.insert(id);
                }
            }
        }

        installed
    }

    /// Reconcile phase: remove what left the lock and replace the records
    async fn reconcile(
        &self,
        lock: &LockFile,
        client: Option<&str>,
        resolution: &Resolution,
        targets: &InstallTargets,
        installed: Vec<(InstallTarget, InstalledArtifact)>,
        report: &mut InstallReport,
    ) -> SkillsyncResult<()> {
        let cache = self.fetcher.cache();
        let global_view =
            scope::filter_artifacts(&lock.artifacts, &ExecutionContext::global(), client);

        for target in targets.all() {
            let path = cache.install_state_path(&target.base, target.global);
            let previous = InstallRecord::load(&path).await?;

            let mut record = InstallRecord::new(&target.base);
            record.lock_version = Some(lock.version.clone());
            record.artifacts = installed
                .iter()
                .filter(|(t, _)| t == target)
                .map(|(_, entry)| entry.clone())
                .collect();

            for entry in previous.map(|p| p.artifacts).unwrap_or_default() {
                if record.artifacts.iter().any(|a| a.install_path == entry.install_path) {
                    // Replaced in place by this run
                    continue;
                }

                if self.cancel.is_cancelled() {
                    report.cancelled = true;
                }
                let still_wanted = resolution.order.iter().any(|a| entry.matches(a))
                    || (target.global && global_view.iter().any(|a| entry.matches(a)));
                if still_wanted || report.cancelled {
                    // Keep tracking until a run settles it
                    record.artifacts.push(entry);
                    continue;
                }

                let handler = self.handlers.handler(&entry.name, entry.artifact_type);
                match handler.remove(&target.base, &self.cancel).await {
                    Ok(()) => {
                        info!("Removed {} from {}", entry.id(), target.base.display());
                        report.removed.push(entry.id());
                    }
                    Err(SkillsyncError::Cancelled) => {
                        report.cancelled = true;
                        record.artifacts.push(entry);
                    }
                    Err(e) => {
                        warn!("Failed to remove {}: {}", entry.id(), e);
                        report.record_failure(entry.id(), FailurePhase::Remove, e);
                        record.artifacts.push(entry);
                    }
                }
            }

            record.save(&path).await?;
        }

        Ok(())
    }
}

async fn install_one(
    handler: &dyn ArtifactHandler,
    id: &ArtifactId,
    data: &[u8],
    base: &Path,
    cancel: &CancelSignal,
) -> SkillsyncResult<()> {
    handler
        .validate(data)
        .map_err(|e| SkillsyncError::install(id.to_string(), format!("validation failed: {}", e)))?;
    match handler.install(data, base, cancel).await {
        Ok(()) => Ok(()),
        Err(SkillsyncError::Cancelled) => Err(SkillsyncError::Cancelled),
        Err(e) => Err(SkillsyncError::install(id.to_string(), e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{pack_files, METADATA_FILE};
    use crate::cache::CacheManager;
    use crate::error::ResolutionError;
    use crate::lock::fixtures::{artifact, depends, http_artifact};
    use crate::lock::{ArtifactType, PathSource, Source};
    use crate::source::git::fake::FakeGit;
    use crate::source::http::fake::FakeTransport;
    use crate::source::http::{HttpRequest, HttpResponse};
    use crate::source::HttpTransport;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Records calls; fails validation for names in `reject`; installing
    /// `cancel_on` cancels the run mid-install
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        reject: Vec<String>,
        cancel_on: Option<String>,
    }

    struct RecordingHandler {
        name: String,
        artifact_type: ArtifactType,
        recorder: Arc<Recorder>,
    }

    #[async_trait]
    impl ArtifactHandler for RecordingHandler {
        fn install_path(&self) -> PathBuf {
            Path::new(self.artifact_type.install_dir()).join(&self.name)
        }

        fn validate(&self, _data: &[u8]) -> SkillsyncResult<()> {
            if self.recorder.reject.contains(&self.name) {
                return Err(SkillsyncError::Archive("rejected".to_string()));
            }
            Ok(())
        }

        async fn install(
            &self,
            _data: &[u8],
            _target_base: &Path,
            cancel: &CancelSignal,
        ) -> SkillsyncResult<()> {
            if self.recorder.cancel_on.as_deref() == Some(self.name.as_str()) {
                cancel.cancel();
                return Err(SkillsyncError::Cancelled);
            }
            self.recorder
                .calls
                .lock()
                .unwrap()
                .push(format!("install {}", self.name));
            Ok(())
        }

        async fn remove(&self, _target_base: &Path, _cancel: &CancelSignal) -> SkillsyncResult<()> {
            self.recorder
                .calls
                .lock()
                .unwrap()
                .push(format!("remove {}", self.name));
            Ok(())
        }
    }

    struct RecordingFactory(Arc<Recorder>);

    impl HandlerFactory for RecordingFactory {
        fn handler(&self, name: &str, artifact_type: ArtifactType) -> Box<dyn ArtifactHandler> {
            Box::new(RecordingHandler {
                name: name.to_string(),
                artifact_type,
                recorder: self.0.clone(),
            })
        }
    }

    struct Harness {
        temp: TempDir,
        transport: Arc<FakeTransport>,
        recorder: Arc<Recorder>,
    }

    impl Harness {
        fn new(reject: &[&str]) -> Self {
            Self::build(reject, None)
        }

        fn build(reject: &[&str], cancel_on: Option<&str>) -> Self {
            let temp = TempDir::new().unwrap();
            for name in ["a", "b", "c", "d", "app", "lib", "util"] {
                let dir = temp.path().join(name);
                std::fs::create_dir_all(&dir).unwrap();
                std::fs::write(dir.join("README.md"), name).unwrap();
            }
            Self {
                temp,
                transport: Arc::new(FakeTransport::new()),
                recorder: Arc::new(Recorder {
                    calls: Mutex::new(Vec::new()),
                    reject: reject.iter().map(|s| s.to_string()).collect(),
                    cancel_on: cancel_on.map(str::to_string),
                }),
            }
        }

        fn cache(&self) -> CacheManager {
            CacheManager::new(self.temp.path().join("cache"))
        }

        fn installer(&self) -> Installer {
            self.installer_with(self.transport.clone(), 2)
        }

        fn installer_with(&self, transport: Arc<dyn HttpTransport>, concurrency: usize) -> Installer {
            let fetcher = SourceFetcher::new(transport, Arc::new(FakeGit::new()), self.cache())
                .with_base_dir(self.temp.path());
            Installer::new(
                Arc::new(fetcher),
                Arc::new(RecordingFactory(self.recorder.clone())),
                InstallOptions {
                    concurrency,
                    global_dir: self.temp.path().join("global"),
                    repo_dir_name: ".claude".to_string(),
                },
            )
        }

        fn calls(&self) -> Vec<String> {
            self.recorder.calls.lock().unwrap().clone()
        }

        async fn record(&self) -> InstallRecord {
            let path = self
                .cache()
                .install_state_path(&self.temp.path().join("global"), true);
            InstallRecord::load(&path).await.unwrap().unwrap()
        }
    }

    fn lock(artifacts: Vec<Artifact>) -> LockFile {
        let mut lock = LockFile::new("v1", "test");
        lock.artifacts = artifacts;
        lock
    }

    fn ids(ids: &[ArtifactId]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn installs_in_dependency_order() {
        let h = Harness::new(&[]);
        let lock = lock(vec![
            depends(artifact("app", "1.0.0"), &["lib"]),
            depends(artifact("lib", "1.0.0"), &["util"]),
            artifact("util", "1.0.0"),
        ]);

        let report = h
            .installer()
            .run(&lock, &ExecutionContext::global(), None)
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(h.calls(), vec!["install util", "install lib", "install app"]);
        let record = h.record().await;
        assert_eq!(record.artifacts.len(), 3);
        assert_eq!(record.lock_version.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn integrity_failure_excludes_dependents() {
        let h = Harness::new(&[]);
        let bad = http_artifact("b", "1.0.0", b"declared");
        if let Source::Http(src) = &bad.source {
            h.transport.serve(&src.url, 200, None, b"tampered");
        }
        let lock = lock(vec![
            artifact("a", "1.0.0"),
            bad,
            depends(artifact("c", "1.0.0"), &["b"]),
            depends(artifact("d", "1.0.0"), &["c"]),
        ]);

        let report = h
            .installer()
            .run(&lock, &ExecutionContext::global(), None)
            .await
            .unwrap();

        assert_eq!(ids(&report.installed), vec!["a@1.0.0"]);
        let phase = |name: &str| {
            report
                .failure(&ArtifactId {
                    name: name.to_string(),
                    version: "1.0.0".to_string(),
                })
                .map(|f| f.phase)
        };
        assert_eq!(phase("b"), Some(FailurePhase::Fetch));
        assert!(report.failed[0].error.contains("Integrity"));
        assert_eq!(phase("c"), Some(FailurePhase::Skipped));
        assert_eq!(phase("d"), Some(FailurePhase::Skipped));
        assert_eq!(h.calls(), vec!["install a"]);
    }

    #[tokio::test]
    async fn failed_validation_skips_dependents_only() {
        let h = Harness::new(&["lib"]);
        let lock = lock(vec![
            depends(artifact("app", "1.0.0"), &["lib"]),
            artifact("lib", "1.0.0"),
            artifact("util", "1.0.0"),
        ]);

        let report = h
            .installer()
            .run(&lock, &ExecutionContext::global(), None)
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(ids(&report.installed), vec!["util@1.0.0"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].phase, FailurePhase::Install);
        assert_eq!(report.failed[1].phase, FailurePhase::Skipped);
    }

    #[tokio::test]
    async fn omitted_artifact_removed_exactly_once() {
        let h = Harness::new(&[]);
        let installer = h.installer();
        let ctx = ExecutionContext::global();

        let l1 = lock(vec![artifact("a", "1.0.0"), artifact("b", "1.0.0")]);
        installer.run(&l1, &ctx, None).await.unwrap();

        let l2 = lock(vec![artifact("a", "1.0.0")]);
        let report = installer.run(&l2, &ctx, None).await.unwrap();
        assert_eq!(ids(&report.removed), vec!["b@1.0.0"]);

        installer.run(&l2, &ctx, None).await.unwrap();

        let removes = h.calls().iter().filter(|c| *c == "remove b").count();
        assert_eq!(removes, 1);
        assert!(!h.calls().contains(&"remove a".to_string()));
        let record = h.record().await;
        assert_eq!(record.artifacts.len(), 1);
        assert_eq!(record.artifacts[0].name, "a");
    }

    #[tokio::test]
    async fn upgrade_in_place_is_not_a_removal() {
        let h = Harness::new(&[]);
        let installer = h.installer();
        let ctx = ExecutionContext::global();

        installer
            .run(&lock(vec![artifact("a", "1.0.0")]), &ctx, None)
            .await
            .unwrap();
        let report = installer
            .run(&lock(vec![artifact("a", "2.0.0")]), &ctx, None)
            .await
            .unwrap();

        assert!(report.removed.is_empty());
        assert!(!h.calls().iter().any(|c| c.starts_with("remove")));
        assert_eq!(h.record().await.artifacts[0].version, "2.0.0");
    }

    #[tokio::test]
    async fn failed_artifact_keeps_previous_record() {
        let h = Harness::new(&[]);
        let ctx = ExecutionContext::global();
        h.installer()
            .run(&lock(vec![artifact("a", "1.0.0")]), &ctx, None)
            .await
            .unwrap();

        // Same artifact, now unfetchable
        let mut gone = artifact("a", "1.0.0");
        gone.source = Source::Path(PathSource {
            path: "./missing".to_string(),
        });
        let report = h.installer().run(&lock(vec![gone]), &ctx, None).await.unwrap();

        assert_eq!(report.failed[0].phase, FailurePhase::Fetch);
        assert!(report.removed.is_empty());
        assert_eq!(h.record().await.artifacts.len(), 1);
    }

    #[tokio::test]
    async fn resolution_failure_aborts_before_io() {
        let h = Harness::new(&[]);
        let lock = lock(vec![
            depends(artifact("a", "1.0.0"), &["b"]),
            depends(artifact("b", "1.0.0"), &["a"]),
        ]);

        let err = h
            .installer()
            .run(&lock, &ExecutionContext::global(), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SkillsyncError::Resolution(ResolutionError::Cycle { .. })
        ));
        assert!(err.is_fatal());
        assert!(!h.cache().root().exists());
        assert!(h.calls().is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_installs_and_removes_nothing() {
        let h = Harness::new(&[]);
        let ctx = ExecutionContext::global();
        h.installer()
            .run(&lock(vec![artifact("a", "1.0.0"), artifact("b", "1.0.0")]), &ctx, None)
            .await
            .unwrap();

        let cancel = CancelSignal::new();
        cancel.cancel();
        let report = h
            .installer()
            .with_cancel(cancel)
            .run(&lock(vec![artifact("c", "1.0.0")]), &ctx, None)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.installed.is_empty());
        assert!(report.removed.is_empty());
        assert_eq!(h.record().await.artifacts.len(), 2);
    }

    #[tokio::test]
    async fn repo_scoped_artifacts_use_repo_target() {
        let h = Harness::new(&[]);
        let repo_url = "https://github.com/acme/app";
        let repo_root = h.temp.path().join("work");
        let ctx = ExecutionContext::in_repo(repo_url, &repo_root, "");
        let mut scoped = artifact("b", "1.0.0");
        scoped.scope = Some(Scope::Repo {
            url: repo_url.to_string(),
        });

        h.installer()
            .run(&lock(vec![artifact("a", "1.0.0"), scoped]), &ctx, None)
            .await
            .unwrap();

        let repo_record_path = h
            .cache()
            .install_state_path(&repo_root.join(".claude"), false);
        let repo_record = InstallRecord::load(&repo_record_path).await.unwrap().unwrap();
        assert_eq!(repo_record.artifacts.len(), 1);
        assert_eq!(repo_record.artifacts[0].name, "b");
        assert_eq!(h.record().await.artifacts[0].name, "a");
    }

    #[tokio::test]
    async fn overriding_scope_keeps_global_copy() {
        let h = Harness::new(&[]);
        let installer = h.installer();
        let repo_url = "https://github.com/acme/app";
        let in_web = ExecutionContext::in_repo(repo_url, h.temp.path().join("work"), "web");
        let web_scoped = Artifact {
            scope: Some(Scope::Path {
                repo: repo_url.to_string(),
                path: "web".to_string(),
            }),
            ..artifact("a", "2.0.0")
        };
        let both = lock(vec![
            Artifact {
                scope: Some(Scope::Global),
                ..artifact("a", "1.0.0")
            },
            web_scoped.clone(),
        ]);

        installer.run(&both, &ExecutionContext::global(), None).await.unwrap();
        let report = installer.run(&both, &in_web, None).await.unwrap();

        assert!(report.removed.is_empty());
        assert_eq!(h.calls(), vec!["install a", "install a"]);
        assert_eq!(h.record().await.artifacts[0].version, "1.0.0");

        let report = installer
            .run(&both, &ExecutionContext::global(), None)
            .await
            .unwrap();
        assert!(report.removed.is_empty());

        // Dropping the global entry from the lock still removes it
        let report = installer.run(&lock(vec![web_scoped]), &in_web, None).await.unwrap();
        assert_eq!(ids(&report.removed), vec!["a@1.0.0"]);
    }

    #[tokio::test]
    async fn two_versions_in_one_location_fail_before_io() {
        let h = Harness::new(&[]);
        let lock = lock(vec![
            artifact("a", "1.0.0"),
            artifact("a", "2.0.0"),
            Artifact {
                dependencies: vec![crate::lock::DependencyRef::new("a", Some("2.0.0"))],
                ..artifact("app", "1.0.0")
            },
        ]);

        let err = h
            .installer()
            .run(&lock, &ExecutionContext::global(), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SkillsyncError::Resolution(ResolutionError::Conflict { ref name, .. }) if name == "a"
        ));
        assert!(h.calls().is_empty());
        assert!(!h.cache().root().exists());
    }

    /// Serves every URL after a delay and tracks the in-flight peak
    struct CountingTransport {
        body: Vec<u8>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl HttpTransport for CountingTransport {
        fn get(&self, _request: &HttpRequest) -> SkillsyncResult<HttpResponse> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(25));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(HttpResponse {
                status: 200,
                etag: None,
                body: self.body.clone(),
            })
        }
    }

    #[tokio::test]
    async fn fetches_stay_within_concurrency() {
        let h = Harness::new(&[]);
        let transport = Arc::new(CountingTransport {
            body: b"archive".to_vec(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let names = ["a", "b", "c", "d", "app", "lib", "util"];
        let lock = lock(
            names
                .iter()
                .map(|n| http_artifact(n, "1.0.0", b"archive"))
                .collect(),
        );

        let report = h
            .installer_with(transport.clone(), 3)
            .run(&lock, &ExecutionContext::global(), None)
            .await
            .unwrap();

        assert_eq!(report.installed.len(), names.len());
        let peak = transport.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {} exceeds limit", peak);
        assert!(peak >= 2, "fetches never overlapped");
    }

    #[tokio::test]
    async fn cancel_inside_handler_stops_run() {
        let h = Harness::build(&[], Some("b"));
        let lock = lock(vec![
            artifact("a", "1.0.0"),
            artifact("b", "1.0.0"),
            artifact("c", "1.0.0"),
        ]);

        let report = h
            .installer()
            .run(&lock, &ExecutionContext::global(), None)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(ids(&report.installed), vec!["a@1.0.0"]);
        assert!(report.failed.is_empty());
        assert_eq!(h.calls(), vec!["install a"]);
        assert_eq!(h.record().await.artifacts.len(), 1);
    }

    #[tokio::test]
    async fn archive_handler_end_to_end() {
        let temp = TempDir::new().unwrap();
        let skill_dir = temp.path().join("review");
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(
            skill_dir.join(METADATA_FILE),
            "[artifact]\nname = \"review\"\nversion = \"1.0.0\"\ntype = \"skill\"\n",
        )
        .unwrap();
        std::fs::write(skill_dir.join("SKILL.md"), "# Review").unwrap();
        let zipped = pack_files(&[(
            METADATA_FILE,
            b"[artifact]\nname = \"helper\"\nversion = \"1.0.0\"\ntype = \"agent\"\n".as_slice(),
        )])
        .unwrap();
        std::fs::write(temp.path().join("helper.zip"), zipped).unwrap();

        let mut helper = artifact("helper", "1.0.0");
        helper.artifact_type = ArtifactType::Agent;
        helper.source = Source::Path(PathSource {
            path: "helper.zip".to_string(),
        });
        let lock = lock(vec![depends(artifact("review", "1.0.0"), &["helper"]), helper]);

        let fetcher = SourceFetcher::new(
            Arc::new(FakeTransport::new()),
            Arc::new(FakeGit::new()),
            CacheManager::new(temp.path().join("cache")),
        )
        .with_base_dir(temp.path());
        let global = temp.path().join("home").join(".claude");
        let installer = Installer::new(
            Arc::new(fetcher),
            Arc::new(ArchiveHandlerFactory),
            InstallOptions {
                concurrency: DEFAULT_CONCURRENCY,
                global_dir: global.clone(),
                repo_dir_name: ".claude".to_string(),
            },
        );

        let report = installer
            .run(&lock, &ExecutionContext::global(), None)
            .await
            .unwrap();

        assert!(report.is_success(), "{:?}", report.failed);
        assert_eq!(ids(&report.installed), vec!["helper@1.0.0", "review@1.0.0"]);
        assert!(global.join("skills/review/SKILL.md").is_file());
        assert!(global.join("agents/helper/metadata.toml").is_file());
    }
}
