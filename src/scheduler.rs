//! Dependency-driven scheduler.
//!
//! Grounded on `scheduler.go` from the system this engine distills, but
//! translated per spec.md §9's explicit invitation to use any technique that
//! preserves the `Schedule` contract: a `std::sync::Mutex`-guarded map of
//! per-task subscriber lists and done markers (never held across an
//! `.await`), one `tokio::task` spawned per first-time schedule, and a
//! `tokio::sync::Semaphore` gating concurrent action execution.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, Semaphore};
use tracing::{info, instrument, warn};

use crate::checksum::{self, OutKind};
use crate::error::{ActionError, EngineError, Result};
use crate::path::AbsPath;
use crate::task::{BuildContext, Task, TaskRegistry};

/// Per-task bookkeeping under the scheduler mutex.
enum SchedulerEntry {
    /// A worker is running or queued; subscribers wait on this list.
    Pending(Vec<oneshot::Sender<Arc<Task>>>),
    /// The task has finished; late subscribers get the result immediately.
    Done(Arc<Task>),
}

/// Drives one engine run: schedules targets, runs dirty ones with bounded
/// concurrency, and fans out completion to every caller.
pub struct Scheduler {
    root: AbsPath,
    registry: Mutex<TaskRegistry>,
    entries: Mutex<HashMap<String, SchedulerEntry>>,
    permits: Semaphore,
    run_time: i64,
}

impl Scheduler {
    pub fn new(root: AbsPath, registry: TaskRegistry, concurrency: usize, run_time: i64) -> Arc<Self> {
        Arc::new(Self {
            root,
            registry: Mutex::new(registry),
            entries: Mutex::new(HashMap::new()),
            permits: Semaphore::new(concurrency),
            run_time,
        })
    }

    /// Schedule `name` for execution, deduplicating concurrent/repeated
    /// requests for the same target (spec.md §4.3, invariant 2/3).
    ///
    /// Returns a receiver that fires exactly once with the completed task,
    /// or `None` if `name` isn't registered (logged and skipped per the
    /// "missing dependency" tie-break).
    #[instrument(skip(self, self_arc))]
    pub fn schedule(
        self: &Arc<Self>,
        self_arc: Arc<Self>,
        name: &str,
    ) -> Option<oneshot::Receiver<Arc<Task>>> {
        if !self.registry.lock().unwrap().contains(name) {
            warn!(name, "missing dependency, skipping");
            return None;
        }

        let (tx, rx) = oneshot::channel();

        let should_spawn = {
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(name) {
                Some(SchedulerEntry::Done(task)) => {
                    let _ = tx.send(task.clone());
                    false
                }
                Some(SchedulerEntry::Pending(subs)) => {
                    subs.push(tx);
                    false
                }
                None => {
                    entries.insert(name.to_string(), SchedulerEntry::Pending(vec![tx]));
                    true
                }
            }
        };

        if should_spawn {
            let scheduler = self_arc;
            let name = name.to_string();
            tokio::spawn(async move { scheduler.run_worker(&name).await });
        }

        Some(rx)
    }

    #[instrument(skip(self))]
    async fn run_worker(self: Arc<Self>, name: &str) {
        match self.clone().execute(name).await {
            Ok(task) => self.finish(name, task),
            Err(err) => {
                // Fatal per spec.md §7: the run terminates. Drop this
                // target's subscriber list so every waiting receiver
                // observes a closed channel instead of hanging forever.
                tracing::error!(name, error = %err, "fatal error executing task");
                self.entries.lock().unwrap().remove(name);
            }
        }
    }

    async fn execute(self: Arc<Self>, name: &str) -> Result<Arc<Task>> {
        let out = crate::fs::unique_temp_path(&self.root, &format!("{name}-")).await;
        let mut ctx = BuildContext::new(out.clone());

        let (deps, mut dirty, action, recorded_time, recorded_checksum) = {
            let registry = self.registry.lock().unwrap();
            let task = registry.get(name).expect("scheduled task must be registered");
            (
                task.deps.clone(),
                task.dirty,
                task.action.clone(),
                task.time,
                task.checksum.clone(),
            )
        };

        let mut max_time = 0i64;
        let mut resolved_deps = 0usize;
        for dep_name in &deps {
            let Some(rx) = self.schedule(self.clone(), dep_name) else {
                continue;
            };
            resolved_deps += 1;
            let dep_task = rx.await.map_err(|_| {
                EngineError::Action(ActionError::Failed {
                    name: name.to_string(),
                    reason: format!("dependency {dep_name:?} failed"),
                })
            })?;
            ctx.dep.insert(dep_name.clone(), dep_task.out.clone());
            dirty = dirty || dep_task.dirty;
            max_time = max_time.max(dep_task.time);
        }
        // A target with no *resolvable* dependencies (none declared, or all
        // declared deps missing and skipped) is dirty iff it has no checksum
        // yet, mirroring the zero-dep tie-break in spec.md §4.3.
        if resolved_deps == 0 {
            dirty = dirty || recorded_checksum.is_empty();
        }
        dirty = dirty || max_time > recorded_time;

        let mut checksum = recorded_checksum;
        let final_out;
        let mut new_time = recorded_time;

        if dirty {
            info!(name, "running");
            let permit = self.permits.acquire().await.expect("semaphore not closed");
            let action_result = action(&ctx).await;
            drop(permit);
            action_result?;

            let kind = checksum::classify(&out).await?;
            match kind {
                OutKind::None => {
                    checksum = String::new();
                    final_out = None;
                }
                OutKind::File => {
                    let sum = checksum::checksum_file(&out).await?;
                    // Dirty reuse path (spec.md §4.2): a forced-dirty task whose
                    // fresh content matches what's already recorded is clean
                    // after all, even though its action just ran.
                    if sum == checksum {
                        dirty = false;
                    }
                    final_out = Some(self.promote_or_reuse(&sum, &checksum, &out).await?);
                    checksum = sum;
                }
                OutKind::Dir => {
                    let sum = checksum::checksum_dir(&out).await?;
                    if sum == checksum {
                        dirty = false;
                    }
                    final_out = Some(self.promote_or_reuse(&sum, &checksum, &out).await?);
                    checksum = sum;
                }
            }
            new_time = if dirty { self.run_time } else { recorded_time };
        } else {
            info!(name, "no actions");
            let registry = self.registry.lock().unwrap();
            final_out = registry.get(name).unwrap().out.clone();
        }

        let mut registry = self.registry.lock().unwrap();
        let task = registry.get_mut(name).expect("scheduled task must be registered");
        task.out = final_out;
        task.checksum = checksum;
        task.dirty = dirty;
        task.time = new_time;

        Ok(Arc::new(task.clone()))
    }

    /// If the fresh checksum matches the recorded one, reuse the cache
    /// symlink and delete the fresh temp output (spec.md §4.2, dirty reuse
    /// path). Otherwise promote the fresh output into the cache.
    async fn promote_or_reuse(
        &self,
        fresh_checksum: &str,
        recorded_checksum: &str,
        fresh_out: &AbsPath,
    ) -> Result<AbsPath> {
        let cache = crate::cache::Cache::new(&self.root);
        if fresh_checksum == recorded_checksum && !recorded_checksum.is_empty() {
            let loc = cache.location(fresh_checksum);
            if crate::fs::exists(&loc).await {
                crate::fs::remove_all(fresh_out).await?;
                return Ok(loc);
            }
        }
        cache.promote(fresh_checksum, fresh_out).await
    }

    fn finish(&self, name: &str, task: Arc<Task>) {
        let mut entries = self.entries.lock().unwrap();
        let prev = entries.insert(name.to_string(), SchedulerEntry::Done(task.clone()));
        if let Some(SchedulerEntry::Pending(subs)) = prev {
            for sub in subs {
                let _ = sub.send(task.clone());
            }
        }
    }

    /// Take back the registry after the run (used by the engine to persist
    /// records). Safe to call as soon as the root target's completion
    /// channel has fired: every worker that could still mutate the registry
    /// has already recorded its final state before notifying subscribers,
    /// even if its spawned task hasn't finished unwinding yet.
    pub fn take_registry(&self) -> TaskRegistry {
        std::mem::take(&mut self.registry.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{canonicalize_deps, Action};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_action(content: &'static [u8]) -> Action {
        Arc::new(move |ctx: &BuildContext| {
            let out = ctx.out.clone();
            Box::pin(async move { crate::fs::write(&out, content).await })
        })
    }

    #[tokio::test]
    async fn chain_runs_once_and_dedupes_concurrent_schedules() {
        let dir = tempfile::tempdir().unwrap();
        let root = AbsPath::new(dir.path()).unwrap();
        crate::fs::create_dir_all(&root).await.unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let echo_action: Action = Arc::new(move |ctx: &BuildContext| {
            let count = count2.clone();
            let out = ctx.out.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                crate::fs::write(&out, b"hi\n").await
            })
        });

        let mut registry = TaskRegistry::new();
        registry.register("echo", vec![], echo_action).unwrap();
        registry
            .register(
                "default",
                canonicalize_deps(vec!["echo".into()]),
                write_action(b"ignored"),
            )
            .unwrap();

        let scheduler = Scheduler::new(root.clone(), registry, 5, 1);

        let mut receivers = Vec::new();
        for _ in 0..10 {
            receivers.push(scheduler.schedule(scheduler.clone(), "echo").unwrap());
        }
        for rx in receivers {
            let task = rx.await.unwrap();
            assert_eq!(
                task.checksum,
                "98ea6e4f216f2fb4b69fff9b3a44842c38686ca685f3f55dc48c5d3fb1107be4"
            );
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn downstream_runs_after_dependency_completes() {
        let dir = tempfile::tempdir().unwrap();
        let root = AbsPath::new(dir.path()).unwrap();
        crate::fs::create_dir_all(&root).await.unwrap();

        let mut registry = TaskRegistry::new();
        registry
            .register("echo", vec![], write_action(b"hi\n"))
            .unwrap();
        registry
            .register(
                "default",
                canonicalize_deps(vec!["echo".into()]),
                write_action(b"default-out"),
            )
            .unwrap();

        let scheduler = Scheduler::new(root, registry, 5, 1);
        let rx = scheduler.schedule(scheduler.clone(), "default").unwrap();
        let task = rx.await.unwrap();
        assert!(!task.checksum.is_empty());
    }

    #[tokio::test]
    async fn missing_dependency_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = AbsPath::new(dir.path()).unwrap();
        crate::fs::create_dir_all(&root).await.unwrap();

        let mut registry = TaskRegistry::new();
        registry
            .register(
                "default",
                canonicalize_deps(vec!["ghost".into()]),
                write_action(b"out"),
            )
            .unwrap();

        let scheduler = Scheduler::new(root, registry, 5, 1);
        let rx = scheduler.schedule(scheduler.clone(), "default").unwrap();
        let task = rx.await.unwrap();
        assert!(!task.checksum.is_empty());
    }
}
