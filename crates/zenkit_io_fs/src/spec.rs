//! Filesystem enums, value models and top-level error types.

use std::fmt;
use std::io;
use std::str::FromStr;

use thiserror::Error;

/// Scheme prefixes that denote network-accessible stores.
pub const C_REMOTE_FS_PREFIXES: [&str; 3] = ["gs://", "hdfs://", "s3://"];

/// Scheme prefix of Google Cloud Storage paths.
pub const C_GCS_PREFIX: &str = "gs://";

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Filesystem backends that can be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumFilesystemScheme {
    /// Schemeless paths on the local disk.
    Local,
    /// `gs://bucket/key` paths on Google Cloud Storage.
    Gcs,
}

impl EnumFilesystemScheme {
    /// Map a resolved scheme prefix (`""`, `"gs://"`, ...) to a backend.
    pub fn from_prefix(scheme: &str) -> Result<Self, FileIoError> {
        match scheme {
            "" => Ok(Self::Local),
            C_GCS_PREFIX => Ok(Self::Gcs),
            _ => Err(FileIoError::UnsupportedScheme(scheme.to_string())),
        }
    }

    /// Scheme prefix handled by this backend.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Local => "",
            Self::Gcs => C_GCS_PREFIX,
        }
    }
}

impl fmt::Display for EnumFilesystemScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Gcs => write!(f, "gcs"),
        }
    }
}

/// How a file is opened.
///
/// Parsed from Python-style mode strings; text and binary modes are the same
/// since handles always carry bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumOpenMode {
    /// `r` / `rb`: read an existing file.
    Read,
    /// `w` / `wb`: create or truncate, then write.
    Write,
    /// `a` / `ab`: create if missing, then write at the end.
    Append,
}

impl FromStr for EnumOpenMode {
    type Err = FileIoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "r" | "rb" => Ok(Self::Read),
            "w" | "wb" => Ok(Self::Write),
            "a" | "ab" => Ok(Self::Append),
            _ => Err(FileIoError::InvalidOpenMode(value.to_string())),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// Stat descriptor returned by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpecFileStat {
    /// Size in bytes (`0` for directories on object stores).
    pub size: u64,
    /// Whether the path is a directory.
    pub if_is_dir: bool,
    /// Modification time, whole seconds since the Unix epoch.
    pub mtime_seconds: i64,
    /// Sub-second part of the modification time.
    pub mtime_nanos: u32,
}

/// One `(root, dirs, files)` step of a directory walk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecWalkEntry {
    /// Directory being listed, in the same form as the walk root.
    pub root: String,
    /// Names of sub-directories directly under `root`.
    pub dirs: Vec<String>,
    /// Names of files directly under `root`.
    pub files: Vec<String>,
}

/// Errors raised by `fileio` operations and filesystem backends.
#[derive(Debug, Error)]
pub enum FileIoError {
    /// Path cannot be represented as UTF-8 text.
    #[error("Invalid path: {0}.")]
    InvalidPath(String),
    /// No backend is registered for the scheme.
    #[error("No registered handler found for filesystem scheme `{0}`.")]
    UnsupportedScheme(String),
    /// Unknown `open` mode string.
    #[error("Invalid open mode: `{0}`. Expected one of: ['r', 'rb', 'w', 'wb', 'a', 'ab']")]
    InvalidOpenMode(String),
    /// Glob pattern failed to compile.
    #[error("Invalid glob pattern: {0}")]
    InvalidPattern(String),
    /// Destination exists and `overwrite` is false.
    #[error("Destination file `{0}` already exists and argument `overwrite` is false.")]
    DestinationExists(String),
    /// Rename between two different backends.
    #[error(
        "Rename from `{src}` to `{dst}` using different filesystems plugins is currently not supported."
    )]
    CrossFilesystemRename {
        /// Source path.
        src: String,
        /// Destination path.
        dst: String,
    },
    /// Operation is declared but has no implementation.
    #[error("`{0}` is not implemented.")]
    NotImplemented(&'static str),
    /// Path does not exist.
    #[error("No such file or directory: `{0}`")]
    NotFound(String),
    /// Backend cannot serve requests (e.g. no object-store client registered).
    #[error("Filesystem backend unavailable: {0}")]
    BackendUnavailable(String),
    /// Underlying IO failure.
    #[error("IO error on `{path}`: {source}")]
    Io {
        /// Path the operation was applied to.
        path: String,
        /// Original error.
        #[source]
        source: io::Error,
    },
}

impl FileIoError {
    /// Wrap an IO error, folding `NotFound` into [`FileIoError::NotFound`].
    pub fn from_io(path: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Self::NotFound(path.to_string());
        }
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Whether the error is an OS-level failure rather than a usage error.
    pub fn is_os_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::DestinationExists(_) | Self::Io { .. }
        )
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{EnumFilesystemScheme, EnumOpenMode, FileIoError};

    #[test]
    fn open_mode_parses_text_and_binary_variants() {
        assert_eq!("r".parse::<EnumOpenMode>().unwrap(), EnumOpenMode::Read);
        assert_eq!("rb".parse::<EnumOpenMode>().unwrap(), EnumOpenMode::Read);
        assert_eq!("wb".parse::<EnumOpenMode>().unwrap(), EnumOpenMode::Write);
        assert_eq!("a".parse::<EnumOpenMode>().unwrap(), EnumOpenMode::Append);
        assert!(matches!(
            "x+".parse::<EnumOpenMode>(),
            Err(FileIoError::InvalidOpenMode(m)) if m == "x+"
        ));
    }

    #[test]
    fn scheme_prefix_mapping_is_closed() {
        assert_eq!(
            EnumFilesystemScheme::from_prefix("").unwrap(),
            EnumFilesystemScheme::Local
        );
        assert_eq!(
            EnumFilesystemScheme::from_prefix("gs://").unwrap(),
            EnumFilesystemScheme::Gcs
        );
        let err = EnumFilesystemScheme::from_prefix("s3://").unwrap_err();
        assert_eq!(
            err.to_string(),
            "No registered handler found for filesystem scheme `s3://`."
        );
    }

    #[test]
    fn io_not_found_folds_into_not_found() {
        let err = FileIoError::from_io(
            "/missing",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(err, FileIoError::NotFound(ref p) if p == "/missing"));
        assert!(err.is_os_error());
        assert!(!FileIoError::NotImplemented("append_file").is_os_error());
    }
}
