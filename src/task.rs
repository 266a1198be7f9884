//! Task registry and build context.
//!
//! Grounded on `task/task.go` (the `Task`/`BuildCtx` pair) from the system
//! this engine distills, and on `cache/backend.rs`'s convention of treating
//! an action as an opaque function rather than a trait object with a richer
//! interface: the engine has no scripting front-end, so it only needs to
//! invoke the action, not introspect it.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::path::AbsPath;

/// The handle an action receives when it runs.
#[derive(Clone, Debug)]
pub struct BuildContext {
    /// The unique path the action should write its artifact to.
    pub out: AbsPath,
    /// Dependency name -> that dependency's current output path.
    pub dep: BTreeMap<String, Option<AbsPath>>,
}

impl BuildContext {
    pub fn new(out: AbsPath) -> Self {
        Self {
            out,
            dep: BTreeMap::new(),
        }
    }

    /// Look up a dependency's output path by name.
    pub fn get_dep(&self, name: &str) -> Option<&AbsPath> {
        self.dep.get(name).and_then(|o| o.as_ref())
    }
}

/// The future an [`Action`] returns. Boxed so `Task` can be cheaply cloned
/// and actions can freely mix `tokio::fs`/`reqwest` calls with blocking
/// sections of their own (e.g. archive extraction via `spawn_blocking`).
pub type ActionFuture = Pin<Box<dyn Future<Output = std::result::Result<(), EngineError>> + Send>>;

/// A user-supplied build action.
///
/// Actions are opaque functions over a [`BuildContext`]; a failure propagates
/// its real typed error (`IoError`/`NetworkError`/`ArchiveError`/...) and is
/// fatal to the whole run (spec.md §7). `ActionError::Failed` is reserved for
/// failures the action itself has no more specific taxonomy for. The engine
/// has no scripting front-end, so an action is just an async closure — host
/// front-ends (scripted or compiled) adapt into this shape.
pub type Action = Arc<dyn Fn(&BuildContext) -> ActionFuture + Send + Sync>;

/// The in-memory record for a registered target.
#[derive(Clone)]
pub struct Task {
    pub name: String,
    pub deps: Vec<String>,
    pub action: Action,
    pub out: Option<AbsPath>,
    pub checksum: String,
    pub dirty: bool,
    pub time: i64,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("out", &self.out)
            .field("checksum", &self.checksum)
            .field("dirty", &self.dirty)
            .field("time", &self.time)
            .finish_non_exhaustive()
    }
}

impl Task {
    fn new(name: String, deps: Vec<String>, action: Action) -> Self {
        Self {
            name,
            deps,
            action,
            out: None,
            checksum: String::new(),
            dirty: false,
            time: 0,
        }
    }
}

/// Canonicalise a dependency list: dedup, then sort lexicographically.
pub fn canonicalize_deps(mut deps: Vec<String>) -> Vec<String> {
    deps.sort();
    deps.dedup();
    deps
}

/// Keyed-by-name store of registered [`Task`]s.
///
/// Registration is a no-op if the name already exists (first registration
/// wins, per spec.md §3). The registry itself does not run anything; the
/// scheduler owns execution.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: std::collections::HashMap<String, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        deps: Vec<String>,
        action: Action,
    ) -> Result<()> {
        let name = name.into();
        if self.tasks.contains_key(&name) {
            return Ok(());
        }
        let deps = canonicalize_deps(deps);
        self.tasks.insert(name.clone(), Task::new(name, deps, action));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Task> {
        self.tasks.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_and_sort() {
        let deps = canonicalize_deps(vec!["b".into(), "a".into(), "b".into()]);
        assert_eq!(deps, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn first_registration_wins() {
        let mut reg = TaskRegistry::new();
        let action: Action = Arc::new(|_ctx| Box::pin(async { Ok::<(), EngineError>(()) }));
        reg.register("t", vec![], action.clone()).unwrap();
        reg.register("t", vec!["x".into()], action).unwrap();
        assert_eq!(reg.get("t").unwrap().deps, Vec::<String>::new());
    }
}
