//! Toolchain provisioning: download, archive extraction, bin-subpath layout.
//!
//! Grounded on `toolchain/provider.go` from the system this engine distills
//! for the four-step action shape (download → extract → replicate bin
//! subpath). Archive decoding uses sync `tar`/`flate2`/`zip` run inside
//! `spawn_blocking`, not the teacher's async `async-tar`/`async-compression`
//! pair — see DESIGN.md for why.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::error::{ArchiveError, EngineError, NetworkError, Result};
use crate::path::AbsPath;
use crate::task::{Action, BuildContext};

/// Computes a toolchain archive's download URL at call time — typically
/// platform-dependent (`std::env::consts::OS`/`ARCH`), mirroring the system
/// this engine distills, which resolves `GOOS`/`GOARCH` when the provider
/// actually runs rather than baking a URL in at registration time.
pub type DownloadUrlFn = Arc<dyn Fn() -> String + Send + Sync>;

/// A downloadable external binary distribution exposed as a target named
/// `<kind>@<version>`.
#[derive(Clone)]
pub struct ToolchainProvider {
    pub kind: String,
    pub version: String,
    /// Path, relative to the extracted archive root, containing the binaries
    /// this toolchain exposes.
    pub bin_subpath: PathBuf,
    pub download_url_fn: DownloadUrlFn,
}

impl std::fmt::Debug for ToolchainProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolchainProvider")
            .field("kind", &self.kind)
            .field("version", &self.version)
            .field("bin_subpath", &self.bin_subpath)
            .finish_non_exhaustive()
    }
}

impl ToolchainProvider {
    pub fn target_name(&self) -> String {
        format!("{}@{}", self.kind, self.version)
    }

    /// Build the action for this provider. The caller registers it with
    /// `engine.register(provider.target_name(), vec![], provider.action(engine_root))`.
    pub fn action(&self, engine_root: AbsPath) -> Action {
        let kind = self.kind.clone();
        let version = self.version.clone();
        let bin_subpath = self.bin_subpath.clone();
        let download_url_fn = self.download_url_fn.clone();

        Arc::new(move |ctx: &BuildContext| {
            let engine_root = engine_root.clone();
            let kind = kind.clone();
            let version = version.clone();
            let bin_subpath = bin_subpath.clone();
            let download_url = (download_url_fn)();
            let out = ctx.out.clone();
            Box::pin(async move {
                provision(&engine_root, &kind, &version, &bin_subpath, &download_url, &out).await
            })
        })
    }
}

#[instrument(skip(download_url))]
async fn provision(
    engine_root: &AbsPath,
    kind: &str,
    version: &str,
    bin_subpath: &Path,
    download_url: &str,
    out: &AbsPath,
) -> Result<()> {
    let prefix = engine_root.join(kind).join(version);

    if !crate::fs::exists(&prefix).await {
        crate::fs::create_dir_all(&prefix).await?;
        let body = download(download_url).await?;
        extract(&body, &prefix).await?;
    }

    crate::fs::create_dir_all(out).await?;
    let bin_root = prefix.join(bin_subpath);
    replicate(&bin_root, out).await?;
    Ok(())
}

async fn download(url: &str) -> Result<bytes::Bytes> {
    let response = reqwest::get(url).await.map_err(|source| {
        EngineError::Network(NetworkError::Transport {
            url: url.to_string(),
            source,
        })
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(NetworkError::BadStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }
        .into());
    }
    response.bytes().await.map_err(|source| {
        NetworkError::Transport {
            url: url.to_string(),
            source,
        }
        .into()
    })
}

#[cfg(unix)]
async fn extract(body: &bytes::Bytes, prefix: &AbsPath) -> Result<()> {
    let body = body.clone();
    let prefix = prefix.as_std_path().to_path_buf();
    tokio::task::spawn_blocking(move || extract_tar_gz_sync(&body, &prefix))
        .await
        .expect("join spawn_blocking")
}

#[cfg(windows)]
async fn extract(body: &bytes::Bytes, prefix: &AbsPath) -> Result<()> {
    let body = body.clone();
    let prefix = prefix.as_std_path().to_path_buf();
    tokio::task::spawn_blocking(move || extract_zip_sync(&body, &prefix))
        .await
        .expect("join spawn_blocking")
}

#[cfg(unix)]
fn extract_tar_gz_sync(body: &[u8], prefix: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use std::os::unix::fs::PermissionsExt;
    use tar::EntryType;

    let decoder = GzDecoder::new(body);
    let mut archive = tar::Archive::new(decoder);
    let entries = archive
        .entries()
        .map_err(|source| ArchiveError::Open { source })?;

    for entry in entries {
        let mut entry = entry.map_err(|source| ArchiveError::Entry {
            path: String::new(),
            source,
        })?;
        let rel_path = entry
            .path()
            .map_err(|source| ArchiveError::Entry {
                path: String::new(),
                source,
            })?
            .to_path_buf();
        let dest = prefix.join(&rel_path);
        let header = entry.header().clone();

        match header.entry_type() {
            EntryType::Directory => {
                std::fs::create_dir_all(&dest)
                    .map_err(|e| EngineError::io(format!("mkdir: {}", dest.display()), e))?;
            }
            EntryType::Regular => {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| EngineError::io(format!("mkdir: {}", parent.display()), e))?;
                }
                entry.unpack(&dest).map_err(|source| ArchiveError::Entry {
                    path: dest.display().to_string(),
                    source,
                })?;
                let mode = header.mode().unwrap_or(0o644);
                let mode = if mode == 0 {
                    0o644
                } else if mode & 0o111 != 0 {
                    0o755
                } else {
                    0o644
                };
                std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(mode)).map_err(|e| {
                    EngineError::io(format!("set mode: {}", dest.display()), e)
                })?;
            }
            EntryType::Symlink => {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| EngineError::io(format!("mkdir: {}", parent.display()), e))?;
                }
                let target = entry
                    .link_name()
                    .map_err(|source| ArchiveError::Entry {
                        path: dest.display().to_string(),
                        source,
                    })?
                    .ok_or_else(|| ArchiveError::UnknownTarEntryType {
                        kind: "symlink with no target".to_string(),
                        path: dest.display().to_string(),
                    })?;
                // Tolerate a dangling target: it may become valid once a
                // later entry in this same archive is extracted.
                let _ = std::fs::remove_file(&dest);
                std::os::unix::fs::symlink(&target, &dest)
                    .map_err(|e| EngineError::io(format!("symlink: {}", dest.display()), e))?;
            }
            other => {
                return Err(ArchiveError::UnknownTarEntryType {
                    kind: format!("{other:?}"),
                    path: dest.display().to_string(),
                }
                .into());
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn extract_zip_sync(body: &[u8], prefix: &Path) -> Result<()> {
    let reader = std::io::Cursor::new(body);
    let mut archive = zip::ZipArchive::new(reader).map_err(|source| ArchiveError::Zip { source })?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|source| ArchiveError::Zip { source })?;
        let Some(rel_path) = file.enclosed_name().map(Path::to_path_buf) else {
            continue;
        };
        let dest = prefix.join(&rel_path);

        if file.is_dir() {
            std::fs::create_dir_all(&dest)
                .map_err(|e| EngineError::io(format!("mkdir: {}", dest.display()), e))?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::io(format!("mkdir: {}", parent.display()), e))?;
        }
        let mut out_file = std::fs::File::create(&dest)
            .map_err(|e| EngineError::io(format!("create: {}", dest.display()), e))?;
        std::io::copy(&mut file, &mut out_file)
            .map_err(|e| EngineError::io(format!("write: {}", dest.display()), e))?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(mode));
        }
    }
    Ok(())
}

/// Replicate every entry under `bin_root` into `out`, preserving relative
/// paths: symlinks become relative symlinks re-rooted at `out`, files become
/// hardlinks, directories are created plainly.
#[instrument]
async fn replicate(bin_root: &AbsPath, out: &AbsPath) -> Result<()> {
    if !crate::fs::exists(bin_root).await {
        warn!(%bin_root, "toolchain bin subpath does not exist");
        return Ok(());
    }

    let entries = walkdir::WalkDir::new(bin_root.as_std_path());
    for entry in entries {
        let entry = entry.map_err(|e| {
            EngineError::io(
                format!("walk: {bin_root}"),
                std::io::Error::other(e),
            )
        })?;
        let src_path = entry.path();
        if src_path == bin_root.as_std_path() {
            continue;
        }
        let rel = src_path
            .strip_prefix(bin_root.as_std_path())
            .expect("walkdir yields children of the root");
        let dest = out.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            crate::fs::create_dir_all(&dest).await?;
        } else if file_type.is_symlink() {
            let target = tokio::fs::read_link(src_path)
                .await
                .map_err(|e| EngineError::io(format!("read_link: {}", src_path.display()), e))?;
            let rerooted = reroot_symlink(src_path, &target, bin_root.as_std_path(), out.as_std_path());
            crate::fs::symlink(&rerooted, &dest).await?;
        } else {
            let src = AbsPath::new(src_path)?;
            crate::fs::hard_link(&src, &dest).await?;
        }
    }
    Ok(())
}

/// Re-root a symlink found at `src` (pointing at `target`, absolute or
/// relative) so that, placed at the corresponding location under `new_root`,
/// it continues to resolve to the same file under `old_root`.
fn reroot_symlink(src: &Path, target: &Path, old_root: &Path, new_root: &Path) -> PathBuf {
    let resolved_target = if target.is_absolute() {
        target.to_path_buf()
    } else {
        src.parent().unwrap_or(src).join(target)
    };
    if let Ok(rel) = resolved_target.strip_prefix(old_root) {
        new_root.join(rel)
    } else {
        resolved_target
    }
}
