//! Glob-based input collector: materialises a matched file set as a target's
//! output directory of hardlinks.
//!
//! Grounded on `rules.go`'s `Fs` rule from the system this engine distills;
//! the `glob` crate (borrowed from the wider example pack, which uses it for
//! `**`-recursive matching) stands in for the original's doublestar matcher.

use glob::{glob as glob_walk, Pattern};
use tracing::{instrument, warn};

use crate::error::{EngineError, IoError, RegistrationError, Result};
use crate::task::{Action, BuildContext};

const ENGINE_ROOT_NAME: &str = ".kiln";

/// Register a zero-dep target named `name` whose action walks `globs`
/// relative to the current directory, skips `excludes`, and hardlinks every
/// matched file into `ctx.out` preserving its relative path.
///
/// Rejects an empty glob list at registration time (spec.md §4.5 contract).
pub fn fs_collector_action(
    name: &str,
    globs: Vec<String>,
    excludes: Vec<String>,
) -> Result<Action> {
    if globs.is_empty() {
        return Err(RegistrationError::EmptyGlobList {
            name: name.to_string(),
        }
        .into());
    }

    let excludes: Vec<Pattern> = excludes
        .iter()
        .filter_map(|pat| Pattern::new(pat).ok())
        .collect();

    let action: Action = std::sync::Arc::new(move |ctx: &BuildContext| {
        let globs = globs.clone();
        let excludes = excludes.clone();
        let out = ctx.out.clone();
        Box::pin(async move { collect(&globs, &excludes, &out).await })
    });

    Ok(action)
}

#[instrument(skip(globs, excludes))]
async fn collect(
    globs: &[String],
    excludes: &[Pattern],
    out: &crate::path::AbsPath,
) -> std::result::Result<(), EngineError> {
    let mut matched = Vec::new();

    for pattern in globs {
        let paths = glob_walk(pattern).map_err(|source| {
            EngineError::from(IoError::Io {
                context: format!("invalid glob pattern {pattern:?}"),
                source: std::io::Error::other(source),
            })
        })?;
        for entry in paths {
            let path = entry.map_err(|e| {
                EngineError::from(IoError::Io {
                    context: format!("walking glob pattern {pattern:?}"),
                    source: e.into(),
                })
            })?;
            if path.is_dir() {
                continue;
            }
            if path_contains_component(&path, ".git") || path_contains_component(&path, ENGINE_ROOT_NAME) {
                continue;
            }
            if excludes.iter().any(|pat| pat.matches_path(&path)) {
                continue;
            }
            matched.push(path);
        }
    }

    for path in matched {
        let rel = path.strip_prefix(".").unwrap_or(&path);
        let dest = crate::path::AbsPath::new(out.as_std_path().join(rel))?;
        let src = crate::path::AbsPath::from_cwd_relative(&path)?;
        crate::fs::hard_link(&src, &dest).await?;
    }

    Ok(())
}

fn path_contains_component(path: &std::path::Path, name: &str) -> bool {
    path.components()
        .any(|c| c.as_os_str() == std::ffi::OsStr::new(name))
}

#[allow(dead_code)]
fn warn_unreadable(pattern: &str, err: &glob::PatternError) {
    warn!(pattern, %err, "invalid glob pattern");
}
