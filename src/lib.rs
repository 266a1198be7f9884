//! A content-addressed, incremental build engine.
//!
//! Users register named targets with [`task::TaskRegistry`] (via [`Engine`]),
//! each with zero or more dependencies and an action producing a single
//! artifact. [`Engine::exec_with_default`] resolves the dependency graph,
//! runs dirty targets with bounded parallelism, and caches artifacts
//! content-addressed on disk under the engine root.

pub mod cache;
pub mod checksum;
pub mod collector;
pub mod engine;
pub mod error;
pub mod fs;
pub mod logging;
pub mod path;
pub mod prune;
pub mod scheduler;
pub mod task;
pub mod toolchain;

pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, Result};
pub use task::{Action, ActionFuture, BuildContext};
pub use toolchain::ToolchainProvider;
