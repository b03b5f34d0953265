//! Filesystem operations shared by the pipeline, tools and trash handling.
//!
//! The media root is shared with external consumers (media servers), so
//! every disk-mutating operation routes through the containment predicate in
//! `paths` and uses atomic renames where possible.

mod paths;
mod trash;

pub use paths::{
    atomic_write, available_space, backup_path, check_disk_space, create_backup, ensure_within,
    is_within, quality_sidecar_path, PathSafetyError, MIN_FREE_BYTES,
};
pub use trash::{TrashBatch, TrashEntry, TrashError, TrashManager, TRASH_DIR_NAME};
