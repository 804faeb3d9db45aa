//! The Sync Engine (spec §4.7): one [`Synchronizer`] per remote URL, driving
//! fetch → classify → merge → push through the Task Queue.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::backend::GitBackend;
use crate::error::{GdbError, RemoteError, StateError};
use crate::events::{ErrorEvent, EventBus};
use crate::identity::{Identity, Signature};
use crate::merge::{self, MergeOptions};
use crate::task_queue::TaskQueue;

use super::options::{BehaviorForNoMergeBase, RemoteOptions, SyncDirection};
use super::result::{ChangeSet, CommitSet, SyncAction, SyncResult};

const FETCH_TIMEOUT_MS: u64 = 30_000;
const PUSH_TIMEOUT_MS: u64 = 30_000;

/// The Synchronizer state machine (spec §4.7 diagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Paused,
    Active,
    RunningTask,
    Retrying,
    Failed,
}

pub struct Synchronizer {
    backend: Arc<dyn GitBackend>,
    task_queue: TaskQueue,
    identity: Identity,
    default_branch: String,
    remote_name: String,
    options: Mutex<RemoteOptions>,
    state: Mutex<SyncState>,
    retry_counter: AtomicU32,
    upstream_recorded: AtomicBool,
    pub events: Arc<EventBus>,
    timer: Mutex<Option<tokio::task::JoinHandle<()>>>,
    db_open: Arc<AtomicBool>,
}

impl Synchronizer {
    pub fn new(
        backend: Arc<dyn GitBackend>,
        task_queue: TaskQueue,
        identity: Identity,
        default_branch: &str,
        remote_name: &str,
        options: RemoteOptions,
        db_open: Arc<AtomicBool>,
    ) -> Result<Arc<Self>, GdbError> {
        options.validate()?;
        Ok(Arc::new(Self {
            backend,
            task_queue,
            identity,
            default_branch: default_branch.to_string(),
            remote_name: remote_name.to_string(),
            options: Mutex::new(options),
            state: Mutex::new(SyncState::Paused),
            retry_counter: AtomicU32::new(0),
            upstream_recorded: AtomicBool::new(false),
            events: Arc::new(EventBus::new()),
            timer: Mutex::new(None),
            db_open,
        }))
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap()
    }

    fn local_ref(&self) -> String {
        format!("refs/heads/{}", self.default_branch)
    }

    fn remote_tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", self.remote_name, self.default_branch)
    }

    /// True when `commit` is the lone root commit `Database::open()` writes
    /// for a brand-new repository (spec §4.9): no parents, and a tree
    /// containing nothing but the `.gitddb/` metadata directory.
    fn is_bootstrap_only(&self, commit: crate::backend::Oid) -> Result<bool, GdbError> {
        let normalized = self.backend.read_commit(commit)?;
        if !normalized.parents.is_empty() {
            return Ok(false);
        }
        let entries = self.backend.read_tree(commit, "")?;
        Ok(entries.len() == 1 && entries[0].name == ".gitddb" && entries[0].kind == crate::backend::EntryKind::Tree)
    }

    /// `sync(options)` bootstrap (spec §4.7 steps 1-6).
    pub async fn bootstrap(self: &Arc<Self>) -> Result<(), GdbError> {
        let remote_url = self.options.lock().unwrap().remote_url.clone();
        self.backend.ensure_remote(&self.remote_name, &remote_url)?;

        let fetch_result = self
            .backend
            .fetch(&self.remote_name, &self.default_branch, FETCH_TIMEOUT_MS);

        if let Err(e) = &fetch_result {
            let is_github = matches!(
                self.options.lock().unwrap().connection.kind,
                super::options::ConnectionType::Github
            );
            if is_github {
                warn!(
                    "remote {} unreachable during bootstrap ({e}); repository auto-provisioning is not implemented",
                    self.remote_name
                );
            }
        }
        fetch_result?;

        *self.state.lock().unwrap() = SyncState::Active;

        let has_upstream = self.backend.resolve_ref(&self.remote_tracking_ref())?.is_some();
        let this = Arc::clone(self);
        if !has_upstream {
            let result = self.task_queue.enqueue("sync:bootstrap-push", move || this.try_push_blocking()).await?;
            if result.action != SyncAction::Canceled {
                self.backend
                    .set_upstream(&self.default_branch, &format!("{}/{}", self.remote_name, self.default_branch))?;
                self.upstream_recorded.store(true, Ordering::SeqCst);
            }
        } else {
            self.upstream_recorded.store(true, Ordering::SeqCst);
            let this = Arc::clone(self);
            self.task_queue.enqueue("sync:bootstrap-sync", move || this.sync_worker_blocking()).await?;
        }

        let live = self.options.lock().unwrap().live;
        if live {
            self.start_timer();
        }

        Ok(())
    }

    fn start_timer(self: &Arc<Self>) {
        let interval_ms = self.options.lock().unwrap().interval_ms;
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            ticker.tick().await; // first tick fires immediately; skip it, bootstrap already enqueued work
            loop {
                ticker.tick().await;
                if this.state() == SyncState::Paused {
                    continue;
                }
                let worker = Arc::clone(&this);
                let label = "sync:timer";
                let result = this.task_queue.enqueue_front(label, move || worker.sync_worker_blocking()).await;
                if let Err(e) = result {
                    debug!("timer-driven sync did not run: {e}");
                }
            }
        });
        *self.timer.lock().unwrap() = Some(handle);
    }

    /// `Synchronizer.pause()` (spec §5): stops future interval-driven tasks
    /// and resets the retry counter; in-flight tasks run to completion.
    pub fn pause(&self) {
        *self.state.lock().unwrap() = SyncState::Paused;
        self.retry_counter.store(0, Ordering::SeqCst);
        self.events.emit_pause();
    }

    /// `Synchronizer.resume({interval?, retry?})` (spec §5): rejects if the
    /// database is not open.
    pub fn resume(self: &Arc<Self>, interval_ms: Option<u64>, retry: Option<u32>) -> Result<(), GdbError> {
        if !self.db_open.load(Ordering::SeqCst) {
            return Err(StateError::RepositoryNotOpen.into());
        }
        {
            let mut opts = self.options.lock().unwrap();
            if let Some(interval_ms) = interval_ms {
                if interval_ms < 1000 {
                    return Err(StateError::IntervalTooSmall { interval_ms }.into());
                }
                opts.interval_ms = interval_ms;
            }
            if let Some(retry) = retry {
                opts.retry = retry;
            }
        }
        *self.state.lock().unwrap() = SyncState::Active;
        self.events.emit_resume();
        if self.options.lock().unwrap().live && self.timer.lock().unwrap().is_none() {
            self.start_timer();
        }
        Ok(())
    }

    /// Cancelled on database close (spec §3 Lifecycles).
    pub fn cancel(&self) {
        if let Some(handle) = self.timer.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// `trySync()` (spec §4.7 diagram): an application-submitted sync,
    /// enqueued at the tail of the Task Queue in ordinary FIFO order (as
    /// opposed to the interval timer's unshifted `sync:timer` task, spec
    /// §4.5).
    pub async fn try_sync(self: &Arc<Self>) -> Result<SyncResult, GdbError> {
        let this = Arc::clone(self);
        self.task_queue.enqueue("sync:try-sync", move || this.sync_worker_blocking()).await
    }

    /// `tryPush` (spec §4.7): omits the merge phase, fails if the remote is
    /// not an ancestor of local.
    pub async fn try_push(self: &Arc<Self>) -> Result<SyncResult, GdbError> {
        let this = Arc::clone(self);
        self.task_queue.enqueue("sync:try-push", move || this.try_push_blocking()).await
    }

    fn try_push_blocking(self: &Arc<Self>) -> Result<SyncResult, GdbError> {
        *self.state.lock().unwrap() = SyncState::RunningTask;
        self.events.emit_start();

        let local = self.backend.resolve_ref(&self.local_ref())?;
        let Some(local) = local else {
            *self.state.lock().unwrap() = SyncState::Active;
            return Ok(SyncResult::nop());
        };

        if let Ok(Some(remote)) = self.backend.resolve_ref(&self.remote_tracking_ref()) {
            if remote != local && !self.backend.is_ancestor(remote, local)? {
                *self.state.lock().unwrap() = SyncState::Failed;
                return Err(RemoteError::CannotPushBecauseUnfetchedCommitExists.into());
            }
        }

        let outcome = self
            .backend
            .push(&self.remote_name, &self.default_branch, PUSH_TIMEOUT_MS)?;
        *self.state.lock().unwrap() = SyncState::Active;

        let result = match outcome {
            crate::backend::PushOutcome::Ok => SyncResult {
                action: SyncAction::Push,
                commits: None,
                changes: ChangeSet::default(),
            },
            crate::backend::PushOutcome::RemoteHasUnfetchedCommits => {
                return Err(RemoteError::CannotPushBecauseUnfetchedCommitExists.into());
            }
        };
        self.events.emit_complete(&result);
        self.events.emit_change(&result);
        Ok(result)
    }

    /// `sync_worker` (spec §4.7): fetch, classify, merge, push, with the
    /// "wait `retryInterval`, resync, up to `retry` times" retry path on
    /// `CannotPushBecauseUnfetchedCommitExists`.
    pub fn sync_worker_blocking(self: &Arc<Self>) -> Result<SyncResult, GdbError> {
        *self.state.lock().unwrap() = SyncState::RunningTask;
        self.events.emit_start();

        let (retry, retry_interval_ms) = {
            let opts = self.options.lock().unwrap();
            (opts.retry, opts.retry_interval_ms)
        };

        let mut attempts = 0;
        loop {
            match self.attempt_sync() {
                Ok(result) => {
                    *self.state.lock().unwrap() = SyncState::Active;
                    self.retry_counter.store(0, Ordering::SeqCst);
                    self.events.emit_complete(&result);
                    self.events.emit_change(&result);
                    return Ok(result);
                }
                Err(GdbError::Remote(RemoteError::CannotPushBecauseUnfetchedCommitExists)) if attempts < retry => {
                    attempts += 1;
                    self.retry_counter.store(attempts, Ordering::SeqCst);
                    *self.state.lock().unwrap() = SyncState::Retrying;
                    info!("sync retry {attempts}/{retry} after unfetched remote commits");
                    std::thread::sleep(std::time::Duration::from_millis(retry_interval_ms));
                }
                Err(e) => {
                    *self.state.lock().unwrap() = SyncState::Failed;
                    self.events.emit_error(&ErrorEvent { message: e.to_string() });
                    return Err(e);
                }
            }
        }
    }

    fn attempt_sync(&self) -> Result<SyncResult, GdbError> {
        let remote_url = self.options.lock().unwrap().remote_url.clone();
        if remote_url.is_empty() {
            return Err(RemoteError::UndefinedRemoteURL.into());
        }
        self.backend
            .fetch(&self.remote_name, &self.default_branch, FETCH_TIMEOUT_MS)?;

        let local = self.backend.resolve_ref(&self.local_ref())?;
        let remote = self.backend.resolve_ref(&self.remote_tracking_ref())?;

        let direction = self.options.lock().unwrap().sync_direction;

        let (action, changes) = match (local, remote) {
            (None, None) => (SyncAction::Nop, ChangeSet::default()),
            (Some(local_oid), None) => {
                let remote_changes = merge::diff_trees(self.backend.as_ref(), None, Some(local_oid))?;
                (
                    SyncAction::Push,
                    ChangeSet {
                        local: Vec::new(),
                        remote: remote_changes,
                    },
                )
            }
            (None, Some(remote_oid)) => {
                self.backend.update_ref(&self.local_ref(), remote_oid, None)?;
                let local_changes = merge::diff_trees(self.backend.as_ref(), None, Some(remote_oid))?;
                (
                    SyncAction::FastForwardMerge,
                    ChangeSet {
                        local: local_changes,
                        remote: Vec::new(),
                    },
                )
            }
            (Some(local_oid), Some(remote_oid)) if local_oid == remote_oid => (SyncAction::Nop, ChangeSet::default()),
            (Some(local_oid), Some(remote_oid)) => {
                if self.backend.is_ancestor(remote_oid, local_oid)? {
                    let remote_changes = merge::diff_trees(self.backend.as_ref(), Some(remote_oid), Some(local_oid))?;
                    (
                        SyncAction::Push,
                        ChangeSet {
                            local: Vec::new(),
                            remote: remote_changes,
                        },
                    )
                } else if self.backend.is_ancestor(local_oid, remote_oid)? {
                    let local_changes = if direction != SyncDirection::Push {
                        self.backend.update_ref(&self.local_ref(), remote_oid, Some(local_oid))?;
                        merge::diff_trees(self.backend.as_ref(), Some(local_oid), Some(remote_oid))?
                    } else {
                        Vec::new()
                    };
                    (
                        SyncAction::FastForwardMerge,
                        ChangeSet {
                            local: local_changes,
                            remote: Vec::new(),
                        },
                    )
                } else {
                    self.merge_divergent(local_oid, remote_oid)?
                }
            }
        };

        if direction != SyncDirection::Pull
            && matches!(action, SyncAction::Push | SyncAction::MergeAndPush | SyncAction::ResolveConflictsAndPush)
        {
            let outcome = self
                .backend
                .push(&self.remote_name, &self.default_branch, PUSH_TIMEOUT_MS)?;
            if outcome == crate::backend::PushOutcome::RemoteHasUnfetchedCommits {
                return Err(RemoteError::CannotPushBecauseUnfetchedCommitExists.into());
            }
        }

        let include_commits = self.options.lock().unwrap().include_commits;
        let commits = if include_commits {
            Some(self.collect_commit_set(local, remote)?)
        } else {
            None
        };

        let local_changes = changes.local.clone();
        let remote_changes = changes.remote.clone();
        if !local_changes.is_empty() {
            self.events.emit_local_change(&local_changes);
        }
        if !remote_changes.is_empty() {
            self.events.emit_remote_change(&remote_changes);
        }

        Ok(SyncResult { action, commits, changes })
    }

    fn merge_divergent(
        &self,
        local_oid: crate::backend::Oid,
        remote_oid: crate::backend::Oid,
    ) -> Result<(SyncAction, ChangeSet), GdbError> {
        let base = self.backend.merge_base(local_oid, remote_oid)?;
        let base = match base {
            Some(base) => base,
            None => {
                if self.is_bootstrap_only(local_oid)? {
                    // `local` is still the lone metadata commit `open()` wrote
                    // and carries no document of its own; there is nothing to
                    // lose by adopting `remote`'s history wholesale, as if
                    // this database had cloned it in the first place.
                    self.backend.update_ref(&self.local_ref(), remote_oid, Some(local_oid))?;
                    return Ok((SyncAction::FastForwardMerge, ChangeSet::default()));
                }
                let behavior = self.options.lock().unwrap().behavior_for_no_merge_base;
                return match behavior {
                    Some(BehaviorForNoMergeBase::Nop) => Ok((SyncAction::Nop, ChangeSet::default())),
                    Some(BehaviorForNoMergeBase::Ours) => Ok((SyncAction::Push, ChangeSet::default())),
                    Some(BehaviorForNoMergeBase::Theirs) => {
                        self.backend.update_ref(&self.local_ref(), remote_oid, Some(local_oid))?;
                        Ok((SyncAction::FastForwardMerge, ChangeSet::default()))
                    }
                    None => Err(RemoteError::NoMergeBaseFound.into()),
                };
            }
        };

        let merge_options = {
            let opts = self.options.lock().unwrap();
            MergeOptions {
                conflict_resolution_strategy: opts.conflict_resolution_strategy,
                plain_text_properties: opts.schema.json.plain_text_properties.clone(),
            }
        };

        let outcome = merge::merge_trees(self.backend.as_ref(), Some(base), local_oid, remote_oid, &merge_options)?;
        let sig = Signature::now(&self.identity);
        let message = format!(
            "merge: {} into {}",
            &remote_oid.to_string()[..7],
            &local_oid.to_string()[..7]
        );
        let merge_commit =
            merge::create_merge_commit(self.backend.as_ref(), outcome.tree, local_oid, remote_oid, &sig, &sig, &message)?;
        self.backend.update_ref(&self.local_ref(), merge_commit, Some(local_oid))?;

        let action = if outcome.had_conflicts {
            SyncAction::ResolveConflictsAndPush
        } else {
            SyncAction::MergeAndPush
        };

        Ok((
            action,
            ChangeSet {
                local: outcome.changes,
                remote: Vec::new(),
            },
        ))
    }

    fn collect_commit_set(
        &self,
        local: Option<crate::backend::Oid>,
        remote: Option<crate::backend::Oid>,
    ) -> Result<CommitSet, GdbError> {
        let local_commits = match local {
            Some(oid) => self.backend.list_commits(oid, remote)?,
            None => Vec::new(),
        };
        let remote_commits = match remote {
            Some(oid) => self.backend.list_commits(oid, local)?,
            None => Vec::new(),
        };
        Ok(CommitSet {
            local: local_commits,
            remote: remote_commits,
        })
    }
}
