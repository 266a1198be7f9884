//! The `.records.json` task-record store.
//!
//! Grounded on `yabs.go`'s `TaskRecord`/`SaveTasks`/`RestoreTasks` for the
//! exact on-disk shape, and on the teacher's convention of keeping
//! persistence as its own submodule under `cache/`.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::cache::layout::Cache;
use crate::error::{EngineError, Result};
use crate::path::AbsPath;
use crate::task::TaskRegistry;

/// One persisted record, matching the wire shape in spec.md §6 exactly
/// (`Name`/`Checksum`/`Deps`/`Time`, PascalCase).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Checksum")]
    pub checksum: String,
    #[serde(rename = "Deps")]
    pub deps: Vec<String>,
    #[serde(rename = "Time")]
    pub time: i64,
}

/// JSON-file-backed store of [`TaskRecord`]s at `<engine-root>/.records.json`.
pub struct TaskRecordStore {
    path: AbsPath,
}

impl TaskRecordStore {
    pub fn new(engine_root: &AbsPath) -> Self {
        Self {
            path: engine_root.join(".records.json"),
        }
    }

    /// Load records from disk, or an empty list if the file doesn't exist yet.
    #[instrument(skip(self))]
    async fn load(&self) -> Result<Vec<TaskRecord>> {
        match crate::fs::read_optional(&self.path).await? {
            None => Ok(Vec::new()),
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| EngineError::Records { source })
            }
        }
    }

    /// Restore persisted records into `registry`, per spec.md §4.4.
    ///
    /// Returns the engine-wide maximum `Time` seen across all records (0 if
    /// there were none), so the caller can derive the new run-clock value.
    #[instrument(skip(self, registry, cache))]
    pub async fn restore(&self, registry: &mut TaskRegistry, cache: &Cache) -> Result<i64> {
        let records = self.load().await?;
        let mut max_time = 0;

        for record in records {
            let Some(task) = registry.get_mut(&record.name) else {
                continue;
            };

            if !record.checksum.is_empty() {
                let loc = cache.location(&record.checksum);
                if crate::fs::exists(&loc).await {
                    task.checksum = record.checksum.clone();
                    task.out = Some(loc);
                }
            }

            task.time = record.time;
            max_time = max_time.max(task.time);

            task.dirty = task.deps != record.deps;
        }

        Ok(max_time)
    }

    /// Persist every task with a non-empty checksum or non-empty dep list,
    /// sorted by name, per spec.md §4.4/§6.
    #[instrument(skip(self, registry))]
    pub async fn save(&self, registry: &TaskRegistry) -> Result<()> {
        let mut records: Vec<TaskRecord> = registry
            .iter()
            .filter(|t| !t.checksum.is_empty() || !t.deps.is_empty())
            .map(|t| TaskRecord {
                name: t.name.clone(),
                checksum: t.checksum.clone(),
                deps: t.deps.clone(),
                time: t.time,
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));

        let bytes = serde_json::to_vec_pretty(&records)
            .map_err(|source| EngineError::Records { source })?;
        crate::fs::write(&self.path, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{canonicalize_deps, Action};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn noop() -> Action {
        Arc::new(|_ctx| Box::pin(async { Ok(()) }))
    }

    #[tokio::test]
    async fn save_then_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let root = AbsPath::new(dir.path()).unwrap();
        let cache = Cache::new(&root);
        let store = TaskRecordStore::new(&root);

        let mut registry = TaskRegistry::new();
        registry
            .register("echo", vec![], noop())
            .unwrap();
        registry
            .register("default", canonicalize_deps(vec!["echo".into()]), noop())
            .unwrap();

        registry.get_mut("echo").unwrap().checksum =
            "98ea6e4f216f2fb4b69fff9b3a44842c38686ca685f3f55dc48c5d3fb1107be".into();
        registry.get_mut("echo").unwrap().time = 1;

        // Register the cache symlink so restore can find it.
        let artifact = root.join("out").join("a");
        crate::fs::write(&artifact, b"hi\n").await.unwrap();
        cache
            .promote(&registry.get("echo").unwrap().checksum, &artifact)
            .await
            .unwrap();

        store.save(&registry).await.unwrap();

        let mut registry2 = TaskRegistry::new();
        registry2.register("echo", vec![], noop()).unwrap();
        registry2
            .register("default", canonicalize_deps(vec!["echo".into()]), noop())
            .unwrap();

        let max_time = store.restore(&mut registry2, &cache).await.unwrap();
        assert_eq!(max_time, 1);
        assert_eq!(registry2.get("echo").unwrap().checksum, registry.get("echo").unwrap().checksum);
        assert!(!registry2.get("echo").unwrap().dirty);
        assert!(!registry2.get("default").unwrap().dirty);
    }

    #[tokio::test]
    async fn dep_list_change_marks_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let root = AbsPath::new(dir.path()).unwrap();
        let cache = Cache::new(&root);
        let store = TaskRecordStore::new(&root);

        let mut registry = TaskRegistry::new();
        registry.register("a", vec![], noop()).unwrap();
        registry.register("c", vec![], noop()).unwrap();
        registry
            .register("b", canonicalize_deps(vec!["a".into()]), noop())
            .unwrap();
        store.save(&registry).await.unwrap();

        let mut registry2 = TaskRegistry::new();
        registry2.register("a", vec![], noop()).unwrap();
        registry2.register("c", vec![], noop()).unwrap();
        registry2
            .register("b", canonicalize_deps(vec!["a".into(), "c".into()]), noop())
            .unwrap();

        store.restore(&mut registry2, &cache).await.unwrap();
        assert!(registry2.get("b").unwrap().dirty);
    }

    #[tokio::test]
    async fn missing_records_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let root = AbsPath::new(dir.path()).unwrap();
        let cache = Cache::new(&root);
        let store = TaskRecordStore::new(&root);
        let mut registry = TaskRegistry::new();
        registry.register("a", vec![], noop()).unwrap();
        let max_time = store.restore(&mut registry, &cache).await.unwrap();
        assert_eq!(max_time, 0);
    }
}
