//! The programmatic entry point: `Engine`.
//!
//! Grounded on `yabs.go`'s `Yabs` struct (`New`, `Register`, `ExecWithDefault`,
//! `Prune`, `GetTaskNames`) for the operation set, and on the teacher's
//! `bon`-builder convention (`client.rs`'s `#[derive(Builder)]` structs) for
//! [`EngineConfig`].

use std::sync::Arc;

use bon::Builder;
use tracing::instrument;

use crate::cache::{Cache, TaskRecordStore};
use crate::error::{EngineError, RegistrationError, Result};
use crate::path::AbsPath;
use crate::scheduler::Scheduler;
use crate::task::{Action, Task, TaskRegistry};

/// Engine-wide tunables. Constructed via the generated builder:
/// `EngineConfig::builder().root(path).concurrency(8).build()`.
#[derive(Clone, Debug, Builder)]
pub struct EngineConfig {
    /// The engine's private root directory (created if absent).
    pub root: AbsPath,
    /// Maximum number of concurrently executing actions.
    #[builder(default = 5)]
    pub concurrency: usize,
}

impl EngineConfig {
    /// A config rooted at `.kiln/` under the current directory.
    pub fn default_rooted() -> Result<Self> {
        Ok(Self {
            root: AbsPath::from_cwd_relative(".kiln")?,
            concurrency: 5,
        })
    }
}

/// No process-wide default engine exists (spec.md §9): every instance is
/// constructed explicitly, and every path is resolved against its own root.
pub struct Engine {
    config: EngineConfig,
    registry: TaskRegistry,
    run_time: i64,
}

impl Engine {
    /// Construct an engine rooted at `.kiln/` in the current directory.
    pub async fn new() -> Result<Self> {
        Self::with_config(EngineConfig::default_rooted()?).await
    }

    /// Construct an engine with explicit configuration.
    #[instrument(skip(config))]
    pub async fn with_config(config: EngineConfig) -> Result<Self> {
        crate::fs::create_dir_all(&config.root).await?;
        Ok(Self {
            config,
            registry: TaskRegistry::new(),
            run_time: 0,
        })
    }

    /// Register a target. No-op if `name` is already registered.
    pub fn register(&mut self, name: impl Into<String>, deps: Vec<String>, action: Action) -> Result<()> {
        self.registry.register(name, deps, action)
    }

    /// Enumerate registered target names.
    pub fn task_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// The artifact path of a task after it has run (or been restored), if any.
    pub fn task_out(&self, name: &str) -> Option<AbsPath> {
        self.registry.get(name).and_then(|t| t.out.clone())
    }

    /// The content checksum of a task after it has run, if any.
    pub fn task_checksum(&self, name: &str) -> Option<String> {
        self.registry.get(name).map(|t| t.checksum.clone())
    }

    /// Restore prior records, increment the run clock, schedule `name`, block
    /// on its completion, then persist updated records.
    ///
    /// Records are not saved if the run fails (spec.md §7): partial state
    /// must not pollute future runs.
    #[instrument(skip(self))]
    pub async fn exec_with_default(&mut self, name: &str) -> Result<()> {
        if !self.registry.contains(name) {
            return Err(RegistrationError::UnknownTarget {
                name: name.to_string(),
            }
            .into());
        }

        let cache = Cache::new(&self.config.root);
        let store = TaskRecordStore::new(&self.config.root);
        let max_seen_time = store.restore(&mut self.registry, &cache).await?;
        self.run_time = max_seen_time + 1;

        let registry = std::mem::take(&mut self.registry);
        let scheduler = Scheduler::new(
            self.config.root.clone(),
            registry,
            self.config.concurrency,
            self.run_time,
        );

        let rx = scheduler
            .schedule(scheduler.clone(), name)
            .expect("presence checked above");

        let result: Result<Arc<Task>> = rx.await.map_err(|_| {
            EngineError::Action(crate::error::ActionError::Failed {
                name: name.to_string(),
                reason: "run terminated before completion".to_string(),
            })
        });

        self.registry = scheduler.take_registry();

        let completed = result?;
        let _ = completed;

        store.save(&self.registry).await?;
        Ok(())
    }

    /// Remove unreferenced cache and `out/` entries (spec.md §4.7).
    ///
    /// Must not be called concurrently with [`Engine::exec_with_default`]
    /// (spec.md §9: the two are documented as mutually exclusive, not
    /// enforced by a lock).
    pub async fn prune(&self) -> Result<()> {
        crate::prune::prune(&self.config.root, &self.registry).await
    }
}
