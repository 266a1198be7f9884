//! Output classification and SHA-256 checksumming of artifacts.
//!
//! Mirrors `task.go`'s `ChecksumEntries`/`checksumFile`/`checksumDir` from the
//! system this spec distills, translated into async, typed Rust.

use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::error::{EngineError, Result};
use crate::path::AbsPath;

/// The kind of artifact a task's output directory resolved to.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum OutKind {
    /// `out` doesn't exist, or is an empty file/directory.
    None,
    /// `out` is a non-empty regular file.
    File,
    /// `out` is a non-empty directory.
    Dir,
}

/// Classify `out` per spec.md §4.2: missing/empty => `None`, else `File`/`Dir`.
#[instrument]
pub async fn classify(out: &AbsPath) -> Result<OutKind> {
    let meta = match tokio::fs::metadata(out.as_std_path()).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(OutKind::None),
        Err(e) => return Err(EngineError::io(format!("stat: {out}"), e)),
    };

    if meta.is_dir() {
        if crate::fs::is_dir_empty(out).await? {
            Ok(OutKind::None)
        } else {
            Ok(OutKind::Dir)
        }
    } else if meta.len() == 0 {
        Ok(OutKind::None)
    } else {
        Ok(OutKind::File)
    }
}

/// Hex-encoded SHA-256 of a file's byte content. Symlinks are followed
/// transitively by `tokio::fs::metadata`/`read` (both resolve symlinks).
#[instrument]
pub async fn checksum_file(path: &AbsPath) -> Result<String> {
    let bytes = crate::fs::read(path).await?;
    Ok(hex_sha256(&bytes))
}

/// Hex-encoded SHA-256 of a directory, computed by walking entries in sorted
/// order at every level and feeding each file's raw digest into a rolling
/// hasher. Deterministic regardless of the filesystem's own enumeration order.
#[instrument]
pub async fn checksum_dir(root: &AbsPath) -> Result<String> {
    let root = root.clone();
    tokio::task::spawn_blocking(move || checksum_dir_sync(root.as_std_path()))
        .await
        .expect("join spawn_blocking")
}

fn checksum_dir_sync(root: &std::path::Path) -> Result<String> {
    let mut hasher = Sha256::new();
    walk_sorted(root, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn walk_sorted(dir: &std::path::Path, hasher: &mut Sha256) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| EngineError::io(format!("read dir: {}", dir.display()), e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EngineError::io(format!("read dir entry: {}", dir.display()), e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| EngineError::io(format!("file type: {}", path.display()), e))?;

        if file_type.is_dir() {
            walk_sorted(&path, hasher)?;
        } else {
            let digest = file_digest_sync(&path)?;
            hasher.update(digest);
        }
    }
    Ok(())
}

fn file_digest_sync(path: &std::path::Path) -> Result<[u8; 32]> {
    // `metadata` (as opposed to `symlink_metadata`) follows symlinks
    // transitively; a dangling symlink surfaces as a NotFound io error here,
    // matching the "checksumming fails" requirement in spec.md §4.2.
    let resolved = std::fs::canonicalize(path)
        .map_err(|e| EngineError::io(format!("resolve symlink: {}", path.display()), e))?;
    let bytes = std::fs::read(&resolved)
        .map_err(|e| EngineError::io(format!("read file: {}", resolved.display()), e))?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.into())
}

fn hex_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn classifies_missing_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = AbsPath::new(dir.path().join("missing")).unwrap();
        assert_eq!(classify(&path).await.unwrap(), OutKind::None);
    }

    #[tokio::test]
    async fn classifies_empty_file_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty");
        std::fs::write(&file, b"").unwrap();
        let path = AbsPath::new(file).unwrap();
        assert_eq!(classify(&path).await.unwrap(), OutKind::None);
    }

    #[tokio::test]
    async fn classifies_nonempty_file_and_hashes_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hi.txt");
        std::fs::write(&file, b"hi\n").unwrap();
        let path = AbsPath::new(file).unwrap();
        assert_eq!(classify(&path).await.unwrap(), OutKind::File);

        let sum = checksum_file(&path).await.unwrap();
        assert_eq!(
            sum,
            "98ea6e4f216f2fb4b69fff9b3a44842c38686ca685f3f55dc48c5d3fb1107be4"
        );
    }

    #[tokio::test]
    async fn dir_checksum_is_order_independent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let path = AbsPath::new(dir.path()).unwrap();
        let sum1 = checksum_dir(&path).await.unwrap();

        let dir2 = tempfile::tempdir().unwrap();
        std::fs::write(dir2.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir2.path().join("b.txt"), b"b").unwrap();
        let path2 = AbsPath::new(dir2.path()).unwrap();
        let sum2 = checksum_dir(&path2).await.unwrap();

        assert_eq!(sum1, sum2);
    }
}
