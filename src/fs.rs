//! Filesystem operations tailored to the engine.
//!
//! Thin, instrumented wrappers over `tokio::fs`. Kept deliberately small:
//! the engine only ever needs a handful of primitives (create, hardlink,
//! symlink, read/write, emptiness check, unique temp-output naming).

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::RngCore;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{instrument, trace};

use crate::error::{EngineError, Result};
use crate::path::AbsPath;

/// Create the directory and all of its parents, if they don't already exist.
#[instrument]
pub async fn create_dir_all(dir: &AbsPath) -> Result<()> {
    tokio::fs::create_dir_all(dir.as_std_path())
        .await
        .map_err(|e| EngineError::io(format!("create dir: {dir}"), e))?;
    trace!(%dir, "created directory");
    Ok(())
}

/// Report whether a path exists at all (file, dir, or dangling-symlink-free).
pub async fn exists(path: &AbsPath) -> bool {
    tokio::fs::symlink_metadata(path.as_std_path()).await.is_ok()
}

/// Report whether the directory has no entries. Errors if `path` isn't a directory.
#[instrument]
pub async fn is_dir_empty(path: &AbsPath) -> Result<bool> {
    let mut read = tokio::fs::read_dir(path.as_std_path())
        .await
        .map_err(|e| EngineError::io(format!("read dir: {path}"), e))?;
    let next = read
        .next_entry()
        .await
        .map_err(|e| EngineError::io(format!("read dir entry: {path}"), e))?;
    Ok(next.is_none())
}

/// Remove a file or directory tree, ignoring "does not exist".
#[instrument]
pub async fn remove_all(path: &AbsPath) -> Result<()> {
    match tokio::fs::metadata(path.as_std_path()).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path.as_std_path())
            .await
            .map_err(|e| EngineError::io(format!("remove dir: {path}"), e)),
        Ok(_) => tokio::fs::remove_file(path.as_std_path())
            .await
            .map_err(|e| EngineError::io(format!("remove file: {path}"), e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::io(format!("stat: {path}"), e)),
    }
}

/// Read an entire file's content.
#[instrument]
pub async fn read(path: &AbsPath) -> Result<Vec<u8>> {
    tokio::fs::read(path.as_std_path())
        .await
        .map_err(|e| EngineError::io(format!("read file: {path}"), e))
}

/// Read a file's content if it exists, or `None` if it doesn't.
#[instrument]
pub async fn read_optional(path: &AbsPath) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path.as_std_path()).await {
        Ok(buf) => Ok(Some(buf)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EngineError::io(format!("read file: {path}"), e)),
    }
}

/// Write content to a file, creating parent directories as needed.
#[instrument(skip(content))]
pub async fn write(path: &AbsPath, content: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(&parent).await?;
    }
    tokio::fs::write(path.as_std_path(), content.as_ref())
        .await
        .map_err(|e| EngineError::io(format!("write file: {path}"), e))
}

/// Create a hardlink from `src` to `dst`, creating `dst`'s parent directories first.
#[instrument]
pub async fn hard_link(src: &AbsPath, dst: &AbsPath) -> Result<()> {
    if let Some(parent) = dst.parent() {
        create_dir_all(&parent).await?;
    }
    tokio::fs::hard_link(src.as_std_path(), dst.as_std_path())
        .await
        .map_err(|e| EngineError::io(format!("hardlink {src} -> {dst}"), e))
}

/// Create a symlink at `dst` pointing at `target` (not necessarily existing yet).
#[instrument]
pub async fn symlink(target: &std::path::Path, dst: &AbsPath) -> Result<()> {
    if let Some(parent) = dst.parent() {
        create_dir_all(&parent).await?;
    }
    let target = target.to_path_buf();
    let dst_std = dst.as_std_path().to_path_buf();
    tokio::task::spawn_blocking(move || platform_symlink(&target, &dst_std))
        .await
        .expect("join spawn_blocking")
        .map_err(|e| EngineError::io(format!("symlink -> {dst}"), e))
}

#[cfg(unix)]
fn platform_symlink(target: &std::path::Path, dst: &std::path::Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(windows)]
fn platform_symlink(target: &std::path::Path, dst: &std::path::Path) -> std::io::Result<()> {
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, dst)
    } else {
        std::os::windows::fs::symlink_file(target, dst)
    }
}

/// Read the target of a symlink.
#[instrument]
pub async fn read_link(path: &AbsPath) -> Result<std::path::PathBuf> {
    tokio::fs::read_link(path.as_std_path())
        .await
        .map_err(|e| EngineError::io(format!("read_link: {path}"), e))
}

static TEMP_COUNTER: AtomicU32 = AtomicU32::new(0);
static TEMP_RNG: OnceLock<AsyncMutex<rand::rngs::StdRng>> = OnceLock::new();

fn temp_rng() -> &'static AsyncMutex<rand::rngs::StdRng> {
    TEMP_RNG.get_or_init(|| {
        use rand::SeedableRng;
        AsyncMutex::new(rand::rngs::StdRng::from_entropy())
    })
}

/// Allocate a unique path under `root/out/<prefix><rand>`.
///
/// The RNG backing this is seeded once per process (not per call), per the
/// engine's design notes. A monotonic counter is mixed in so that two
/// allocations racing within the same tick of the RNG never collide.
#[instrument]
pub async fn unique_temp_path(root: &AbsPath, prefix: &str) -> AbsPath {
    let mut rng = temp_rng().lock().await;
    let rand_part = rng.next_u32();
    drop(rng);
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    root.join("out")
        .join(format!("{prefix}{rand_part:08x}{counter:04x}"))
}
