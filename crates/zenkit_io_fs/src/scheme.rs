//! Scheme resolution for filesystem paths.

use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::bytes::Regex;

use crate::spec::{C_GCS_PREFIX, C_REMOTE_FS_PREFIXES, EnumFilesystemScheme, FileIoError};

static RE_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]+://)").expect("scheme pattern is a valid regex")
});

/// Extract the `scheme://` prefix of a path, or `""` for local paths.
///
/// Accepts text or raw bytes; only the leading bytes are inspected.
///
/// # Examples
/// ```
/// use zenkit_io_fs::get_scheme;
///
/// assert_eq!(get_scheme("gs://bucket/obj"), "gs://");
/// assert_eq!(get_scheme(b"s3://bucket".as_slice()), "s3://");
/// assert_eq!(get_scheme("/tmp/data"), "");
/// ```
pub fn get_scheme<P: AsRef<[u8]>>(path: P) -> String {
    RE_SCHEME
        .captures(path.as_ref())
        .and_then(|caps| caps.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        .unwrap_or_default()
}

/// Resolve the backend a path dispatches to.
pub fn resolve_scheme<P: AsRef<[u8]>>(path: P) -> Result<EnumFilesystemScheme, FileIoError> {
    EnumFilesystemScheme::from_prefix(&get_scheme(path))
}

/// Whether the path lives on a remote store (`gs://`, `hdfs://`, `s3://`).
pub fn is_remote(path: &str) -> bool {
    C_REMOTE_FS_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Whether the path lives on Google Cloud Storage.
pub fn is_gcs_path(path: &str) -> bool {
    path.starts_with(C_GCS_PREFIX)
}

/// Whether a local path has no parent (`/`, `""` or `.`).
pub fn is_root(path: &str) -> bool {
    Path::new(path).components().all(|c| {
        matches!(
            c,
            Component::RootDir | Component::Prefix(_) | Component::CurDir
        )
    })
}
