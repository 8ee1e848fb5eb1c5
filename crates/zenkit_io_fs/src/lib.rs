//! `zenkit_io_fs` v1:
//! Filesystem layer for pipeline artifacts and metadata.
//!
//! Module layout:
//! - `scheme`  : `scheme://` prefix resolution and path predicates
//! - `backend` : `Filesystem` trait, local and `gs://` backends, dispatch
//! - `fileio`  : scheme-dispatched operations and directory helpers
//! - `spec`    : enums/value models/errors
//! - `util`    : shared pattern and path helpers

pub mod backend;
pub mod fileio;
pub mod scheme;
pub mod spec;
mod util;

pub use backend::{
    FileHandle, Filesystem, GcsFilesystem, IterWalk, LocalFilesystem, MemoryObjectClient,
    ObjectClient, SpecObjectMeta, clear_gcs_client, get_filesystem, new_filesystem,
    register_gcs_client,
};
pub use scheme::{get_scheme, is_gcs_path, is_remote, is_root, resolve_scheme};
pub use spec::{
    C_GCS_PREFIX, C_REMOTE_FS_PREFIXES, EnumFilesystemScheme, EnumOpenMode, FileIoError,
    SpecFileStat, SpecWalkEntry,
};
