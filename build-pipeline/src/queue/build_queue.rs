// Build Queue
// Admits builds, runs them one at a time on a background worker and keeps their history

use crate::config::ProjectConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::cancellation::CancelSignal;
use crate::pipeline::events::{BuildEvent, EventSender, ProgressSender};
use crate::pipeline::runner::{Builder, PipelineRunner};
use crate::queue::models::{BuildId, BuildResult, BuildStatus};

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Configuration for a build queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Root for per-build workspaces (default: <documents>/BuildAgent)
    pub output_root: PathBuf,

    /// How often the idle worker checks for pending builds
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl QueueConfig {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// `<documents>/BuildAgent`, falling back to the home directory
pub fn default_output_root() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("BuildAgent")
}

struct BuildEntry {
    result: BuildResult,
    cancel: CancelSignal,
}

/// The single build being run; written only by the worker
#[derive(Default)]
struct ActiveSlot(AtomicU64);

impl ActiveSlot {
    const EMPTY: u64 = 0;

    fn get(&self) -> Option<BuildId> {
        match self.0.load(Ordering::SeqCst) {
            Self::EMPTY => None,
            id => Some(id),
        }
    }

    fn set(&self, id: Option<BuildId>) {
        self.0.store(id.unwrap_or(Self::EMPTY), Ordering::SeqCst);
    }
}

/// State shared between callers and the worker
struct QueueState {
    next_id: AtomicU64,
    pending: Mutex<VecDeque<BuildId>>,
    builds: RwLock<HashMap<BuildId, BuildEntry>>,
    active: ActiveSlot,
}

/// What the worker needs to run a claimed build
struct ClaimedBuild {
    id: BuildId,
    project: Arc<ProjectConfig>,
    target_name: Option<String>,
    cancel: CancelSignal,
}

/// FIFO build queue with a single active build.
///
/// Enqueueing never blocks on running work. The worker polls the pending
/// sequence, skips builds cancelled while waiting and hands the rest to the
/// [`Builder`] one at a time. Every outcome, including builder errors, is
/// recorded on the build rather than returned.
pub struct BuildQueue {
    state: Arc<QueueState>,
    builder: Arc<dyn Builder>,
    config: QueueConfig,
    event_tx: Option<ProgressSender>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BuildQueue {
    pub fn new(builder: Arc<dyn Builder>, config: QueueConfig) -> Self {
        Self {
            state: Arc::new(QueueState {
                next_id: AtomicU64::new(1),
                pending: Mutex::new(VecDeque::new()),
                builds: RwLock::new(HashMap::new()),
                active: ActiveSlot::default(),
            }),
            builder,
            config,
            event_tx: None,
            worker: Mutex::new(None),
        }
    }

    /// Queue backed by a pipeline runner
    pub fn with_runner(runner: PipelineRunner, config: QueueConfig) -> Self {
        Self::new(Arc::new(runner), config)
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Start the background worker; a no-op when already started.
    ///
    /// Fails when the output root cannot be created.
    pub fn start_queue(&self) -> PipelineResult<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        fs::create_dir_all(&self.config.output_root)
            .map_err(|e| PipelineError::output_directory(&self.config.output_root, e))?;

        tracing::info!(
            output_root = %self.config.output_root.display(),
            poll_interval = ?self.config.poll_interval,
            "build queue started"
        );

        *worker = Some(tokio::spawn(run_worker(
            Arc::clone(&self.state),
            Arc::clone(&self.builder),
            self.config.clone(),
            self.event_tx.clone(),
        )));
        Ok(())
    }

    /// Stop the worker. The active build is not cancelled: it runs to the end
    /// and records its result, and no build is dispatched until it has.
    pub fn stop_queue(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            if let Some(id) = self.state.active.get() {
                tracing::warn!(
                    build_id = id,
                    "queue stopped with a build in flight; it will finish and be recorded"
                );
            }
            tracing::info!("build queue stopped");
        }
    }

    pub fn is_started(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Admit a build and return its `Queued` record
    pub async fn enqueue_build(
        &self,
        project: impl Into<Arc<ProjectConfig>>,
        target_name: Option<String>,
    ) -> BuildResult {
        let project = project.into();
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        let result = BuildResult::queued(id, project, target_name);

        // Registered before it becomes visible to the worker
        self.state.builds.write().await.insert(
            id,
            BuildEntry {
                result: result.clone(),
                cancel: CancelSignal::new(),
            },
        );
        self.state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(id);

        tracing::info!(
            build_id = id,
            project = %result.project_name(),
            target = ?result.target_name,
            "build queued"
        );
        self.event_tx.send_event(BuildEvent::BuildQueued {
            build_id: id,
            project_name: result.project_name().to_string(),
            target_name: result.target_name.clone(),
        });

        result
    }

    /// Every known build, any status, in enqueue order
    pub async fn get_all_build_results(&self) -> Vec<BuildResult> {
        let builds = self.state.builds.read().await;
        let mut results: Vec<BuildResult> =
            builds.values().map(|entry| entry.result.clone()).collect();
        results.sort_by_key(|r| r.id);
        results
    }

    pub async fn get_build_result(&self, id: BuildId) -> Option<BuildResult> {
        self.state
            .builds
            .read()
            .await
            .get(&id)
            .map(|entry| entry.result.clone())
    }

    /// Cancel a build.
    ///
    /// A queued build becomes `Cancelled` and is never dispatched. The active
    /// build is signalled and stops at its next checkpoint. Finished builds
    /// are left as they are. Returns the build's state after the call, or
    /// `None` for an unknown id.
    pub async fn cancel_build(&self, id: BuildId) -> Option<BuildResult> {
        let mut builds = self.state.builds.write().await;
        let entry = builds.get_mut(&id)?;

        match entry.result.status {
            BuildStatus::Queued => {
                entry.result.status = BuildStatus::Cancelled;
                entry.result.finished_at = Some(Utc::now());
                tracing::info!(build_id = id, "queued build cancelled");
            }
            BuildStatus::Running => {
                entry.cancel.cancel();
                tracing::info!(build_id = id, "cancellation requested for running build");
            }
            status => {
                tracing::debug!(build_id = id, %status, "cancel ignored for finished build");
            }
        }

        Some(entry.result.clone())
    }

    /// Id of the build currently running, if any
    pub fn active_build(&self) -> Option<BuildId> {
        self.state.active.get()
    }

    /// Number of builds waiting for the worker, including cancelled ones not yet discarded
    pub fn pending_count(&self) -> usize {
        self.state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for BuildQueue {
    fn drop(&mut self) {
        if let Some(handle) = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

async fn run_worker(
    state: Arc<QueueState>,
    builder: Arc<dyn Builder>,
    config: QueueConfig,
    event_tx: Option<ProgressSender>,
) {
    loop {
        match claim_next(&state).await {
            Some(claimed) => {
                // The build outlives an aborted worker and records its own outcome
                let build = tokio::spawn(run_claimed(
                    Arc::clone(&state),
                    Arc::clone(&builder),
                    config.output_root.clone(),
                    event_tx.clone(),
                    claimed,
                ));
                if let Err(e) = build.await {
                    tracing::error!(error = %e, "build recorder failed");
                    state.active.set(None);
                }
            }
            None => tokio::time::sleep(config.poll_interval).await,
        }
    }
}

/// Pop pending builds until one is still `Queued` and mark it `Running`.
///
/// Claims nothing while another build holds the active slot.
async fn claim_next(state: &QueueState) -> Option<ClaimedBuild> {
    if state.active.get().is_some() {
        return None;
    }
    loop {
        let id = state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()?;

        let mut builds = state.builds.write().await;
        let Some(entry) = builds.get_mut(&id) else {
            continue;
        };
        if entry.result.status != BuildStatus::Queued {
            tracing::debug!(build_id = id, status = %entry.result.status, "skipping build");
            continue;
        }

        entry.result.status = BuildStatus::Running;
        entry.result.started_at = Some(Utc::now());
        state.active.set(Some(id));

        return Some(ClaimedBuild {
            id,
            project: Arc::clone(&entry.result.project),
            target_name: entry.result.target_name.clone(),
            cancel: entry.cancel.clone(),
        });
    }
}

/// Run one claimed build, record its outcome and free the active slot
async fn run_claimed(
    state: Arc<QueueState>,
    builder: Arc<dyn Builder>,
    output_root: PathBuf,
    event_tx: Option<ProgressSender>,
    claimed: ClaimedBuild,
) {
    let id = claimed.id;
    tracing::info!(build_id = id, project = %claimed.project.project_name, "build dispatched");

    // Run on its own task so a panicking step is recorded as a failure
    let ClaimedBuild {
        project,
        target_name,
        cancel,
        ..
    } = claimed;
    let outcome = tokio::spawn(async move {
        builder
            .build(&project, target_name.as_deref(), &output_root, &cancel)
            .await
    })
    .await;

    let mut builds = state.builds.write().await;
    if let Some(entry) = builds.get_mut(&id) {
        let result = &mut entry.result;
        match outcome {
            Ok(Ok(run)) => {
                result.status = run.status;
                result.stages = run.results;
                result.error = run.error;
            }
            Ok(Err(err)) => {
                tracing::warn!(build_id = id, error = %err, "build could not run");
                event_tx.send_event(BuildEvent::error(format!("build {}: {}", id, err)));
                result.status = BuildStatus::Failed;
                result.error = Some(err.to_string());
            }
            Err(join_error) => {
                tracing::error!(build_id = id, error = %join_error, "build task aborted");
                result.status = BuildStatus::Failed;
                result.error = Some(format!("build task aborted: {}", join_error));
            }
        }
        result.finished_at = Some(Utc::now());
        tracing::info!(build_id = id, status = %result.status, "build recorded");
    }
    state.active.set(None);
}
