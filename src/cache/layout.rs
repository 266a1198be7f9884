//! The `cache/<xx>/<rest>` symlink layout and artifact promotion.
//!
//! Grounded on `task.go`'s `cache()` method (symlink-at-checksum promotion)
//! and on the teacher's `cache/local/cas.rs` sharded-directory idea, adapted
//! from a compressed blob store to the spec's plain-symlink cache.

use tracing::{instrument, trace};

use crate::error::Result;
use crate::path::AbsPath;

/// The content-addressed cache rooted at `<engine-root>/cache`.
#[derive(Clone, Debug)]
pub struct Cache {
    root: AbsPath,
}

impl Cache {
    pub fn new(engine_root: &AbsPath) -> Self {
        Self {
            root: engine_root.join("cache"),
        }
    }

    /// Compute `cache/<xx>/<rest>` for a hex checksum.
    ///
    /// Panics if `checksum` is not a 64-character hex string; callers only
    /// ever pass a freshly computed SHA-256 digest here.
    pub fn location(&self, checksum: &str) -> AbsPath {
        assert!(checksum.len() >= 2, "checksum too short: {checksum:?}");
        let (prefix, rest) = checksum.split_at(2);
        self.root.join(prefix).join(rest)
    }

    /// Promote `artifact_out` to the cache under `checksum`, returning the
    /// cache location. If an entry already exists, it is reused as-is.
    #[instrument(skip(self))]
    pub async fn promote(&self, checksum: &str, artifact_out: &AbsPath) -> Result<AbsPath> {
        let loc = self.location(checksum);

        if crate::fs::exists(&loc).await {
            trace!(%loc, "cache entry already exists, reusing");
            return Ok(loc);
        }

        if let Some(parent) = loc.parent() {
            crate::fs::create_dir_all(&parent).await?;
        }
        crate::fs::symlink(artifact_out.as_std_path(), &loc).await?;
        trace!(%loc, target = %artifact_out, "promoted artifact");
        Ok(loc)
    }

    /// The root directory of the cache (used by `prune`).
    pub fn root(&self) -> &AbsPath {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn location_shards_by_first_two_hex_chars() {
        let dir = tempfile::tempdir().unwrap();
        let root = AbsPath::new(dir.path()).unwrap();
        let cache = Cache::new(&root);
        let checksum = "98ea6e4f216f2fb4b69fff9b3a44842c38686ca685f3f55dc48c5d3fb1107be";
        let loc = cache.location(checksum);
        assert_eq!(
            loc.as_std_path(),
            dir.path().join("cache").join("98").join(&checksum[2..])
        );
    }

    #[tokio::test]
    async fn promote_creates_symlink_and_reuses_on_second_call() {
        let dir = tempfile::tempdir().unwrap();
        let root = AbsPath::new(dir.path()).unwrap();
        let cache = Cache::new(&root);

        let artifact = root.join("out").join("artifact.txt");
        crate::fs::write(&artifact, b"hi").await.unwrap();

        let checksum = "98ea6e4f216f2fb4b69fff9b3a44842c38686ca685f3f55dc48c5d3fb1107be";
        let loc1 = cache.promote(checksum, &artifact).await.unwrap();
        assert!(crate::fs::exists(&loc1).await);

        // Second promotion with the same checksum reuses the existing symlink.
        let loc2 = cache.promote(checksum, &artifact).await.unwrap();
        assert_eq!(loc1.as_std_path(), loc2.as_std_path());
    }
}
