//! Content-addressed artifact cache.
//!
//! Two concerns live here, mirroring the teacher's `cache/` submodule split
//! (`cache/local/cas.rs` for blob storage, `cache/local/metadata.rs` for the
//! persisted index):
//! - [`layout`]: the `cache/<xx>/<rest>` symlink layout and promotion.
//! - [`records`]: the `.records.json` task-record store.

pub mod layout;
pub mod records;

pub use layout::Cache;
pub use records::{TaskRecord, TaskRecordStore};
