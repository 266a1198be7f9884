//! GC of unreferenced cache and temp-output entries.
//!
//! Grounded on `yabs.go`'s `Prune` method from the system this engine
//! distills.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{instrument, trace};

use crate::cache::Cache;
use crate::error::{EngineError, Result};
use crate::path::AbsPath;
use crate::task::TaskRegistry;

#[instrument(skip(registry))]
pub async fn prune(root: &AbsPath, registry: &TaskRegistry) -> Result<()> {
    let cache = Cache::new(root);
    let mut valid: HashSet<PathBuf> = HashSet::new();

    for task in registry.iter() {
        if task.checksum.is_empty() {
            continue;
        }
        let loc = cache.location(&task.checksum);
        valid.insert(loc.as_std_path().to_path_buf());
        if let Ok(target) = crate::fs::read_link(&loc).await {
            let resolved = if target.is_absolute() {
                target
            } else {
                loc.parent()
                    .map(|p| p.as_std_path().join(&target))
                    .unwrap_or(target)
            };
            valid.insert(resolved);
        }
    }

    prune_out_dir(&root.join("out"), &valid).await?;
    prune_cache_dir(cache.root(), &valid).await?;
    Ok(())
}

async fn prune_out_dir(out: &AbsPath, valid: &HashSet<PathBuf>) -> Result<()> {
    if !crate::fs::exists(out).await {
        return Ok(());
    }
    let mut read = tokio::fs::read_dir(out.as_std_path())
        .await
        .map_err(|e| EngineError::io(format!("read dir: {out}"), e))?;

    while let Some(entry) = read
        .next_entry()
        .await
        .map_err(|e| EngineError::io(format!("read dir entry: {out}"), e))?
    {
        let path = entry.path();
        if !valid.contains(&path) {
            let abs = AbsPath::new(path)?;
            trace!(%abs, "pruning stale out entry");
            crate::fs::remove_all(&abs).await?;
        }
    }
    Ok(())
}

async fn prune_cache_dir(cache_root: &AbsPath, valid: &HashSet<PathBuf>) -> Result<()> {
    if !crate::fs::exists(cache_root).await {
        return Ok(());
    }

    let mut to_delete = Vec::new();
    collect_cache_entries(cache_root.as_std_path(), valid, &mut to_delete)?;

    for path in &to_delete {
        let abs = AbsPath::new(path.clone())?;
        trace!(%abs, "pruning stale cache entry");
        crate::fs::remove_all(&abs).await?;
        if let Some(parent) = abs.parent() {
            if crate::fs::exists(&parent).await && crate::fs::is_dir_empty(&parent).await.unwrap_or(false) {
                crate::fs::remove_all(&parent).await?;
            }
        }
    }
    Ok(())
}

fn collect_cache_entries(
    dir: &std::path::Path,
    valid: &HashSet<PathBuf>,
    out: &mut Vec<PathBuf>,
) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| EngineError::io(format!("read dir: {}", dir.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::io(format!("read dir entry: {}", dir.display()), e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| EngineError::io(format!("file type: {}", path.display()), e))?;
        if file_type.is_dir() {
            collect_cache_entries(&path, valid, out)?;
        } else if !valid.contains(&path) {
            out.push(path);
        }
    }
    Ok(())
}
