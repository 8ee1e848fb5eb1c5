//! Filesystem backends and scheme dispatch.
//!
//! - `local` : local disk, behaviour of TFX's `LocalFilesystem`
//! - `gcs`   : `gs://` object store over a pluggable [`ObjectClient`]

pub mod gcs;
pub mod local;

use std::fmt;
use std::io::{self, Read, Write};

use tracing::debug;

use crate::scheme::resolve_scheme;
use crate::spec::{EnumFilesystemScheme, EnumOpenMode, FileIoError, SpecFileStat, SpecWalkEntry};

pub use gcs::{
    GcsFilesystem, MemoryObjectClient, ObjectClient, SpecObjectMeta, clear_gcs_client,
    register_gcs_client,
};
pub use local::LocalFilesystem;

/// Lazy `(root, dirs, files)` stream; errors surface as `Err` items.
pub type IterWalk = Box<dyn Iterator<Item = Result<SpecWalkEntry, FileIoError>>>;

/// Capability set every backend implements.
///
/// Paths passed in always carry the backend's own scheme prefix.
pub trait Filesystem: fmt::Debug {
    /// Backend identity; two backends with the same scheme are interchangeable.
    fn scheme(&self) -> EnumFilesystemScheme;

    fn open(&self, path: &str, mode: EnumOpenMode) -> Result<FileHandle, FileIoError>;

    /// Copy one file; fails when `dst` exists and `overwrite` is false.
    fn copy(&self, src: &str, dst: &str, overwrite: bool) -> Result<(), FileIoError>;

    fn exists(&self, path: &str) -> Result<bool, FileIoError>;

    /// Paths matching a shell glob, sorted.
    fn glob(&self, pattern: &str) -> Result<Vec<String>, FileIoError>;

    fn isdir(&self, path: &str) -> Result<bool, FileIoError>;

    /// Sorted entry names directly under `path`; missing directories fail.
    fn listdir(&self, path: &str) -> Result<Vec<String>, FileIoError>;

    /// Create a directory and all missing parents; existing directories are fine.
    fn makedirs(&self, path: &str) -> Result<(), FileIoError>;

    /// Create one directory; the parent must exist and the path must not.
    fn mkdir(&self, path: &str) -> Result<(), FileIoError>;

    fn remove(&self, path: &str) -> Result<(), FileIoError>;

    fn rename(&self, src: &str, dst: &str, overwrite: bool) -> Result<(), FileIoError>;

    fn rmtree(&self, path: &str) -> Result<(), FileIoError>;

    fn stat(&self, path: &str) -> Result<SpecFileStat, FileIoError>;

    fn walk(&self, top: &str, if_topdown: bool) -> IterWalk;
}

/// Construct the backend for a path. Nothing is cached between calls.
pub fn get_filesystem(path: &str) -> Result<Box<dyn Filesystem>, FileIoError> {
    let enum_scheme = resolve_scheme(path)?;
    debug!(path, scheme = %enum_scheme, "dispatching filesystem call");
    Ok(new_filesystem(enum_scheme))
}

/// Static constructor table of the supported backends.
pub fn new_filesystem(enum_scheme: EnumFilesystemScheme) -> Box<dyn Filesystem> {
    match enum_scheme {
        EnumFilesystemScheme::Local => Box::new(LocalFilesystem),
        EnumFilesystemScheme::Gcs => Box::new(GcsFilesystem::new()),
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region FileHandle

/// An open file returned by `open`.
pub enum FileHandle {
    /// Opened with [`EnumOpenMode::Read`].
    Reader(Box<dyn Read>),
    /// Opened with [`EnumOpenMode::Write`] or [`EnumOpenMode::Append`].
    Writer(Box<dyn Write>),
}

impl FileHandle {
    /// Read the remaining bytes of a reader handle.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Flush and release the handle, surfacing deferred write errors.
    pub fn close(mut self) -> io::Result<()> {
        match &mut self {
            Self::Reader(_) => Ok(()),
            Self::Writer(writer) => writer.flush(),
        }
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reader(_) => write!(f, "FileHandle::Reader"),
            Self::Writer(_) => write!(f, "FileHandle::Writer"),
        }
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Reader(reader) => reader.read(buf),
            Self::Writer(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "file was opened for writing",
            )),
        }
    }
}

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Writer(writer) => writer.write(buf),
            Self::Reader(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "file was opened for reading",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Writer(writer) => writer.flush(),
            Self::Reader(_) => Ok(()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::{FileHandle, get_filesystem};
    use crate::spec::{EnumFilesystemScheme, FileIoError};

    #[test]
    fn dispatch_by_scheme() {
        assert_eq!(
            get_filesystem("/tmp/x").unwrap().scheme(),
            EnumFilesystemScheme::Local
        );
        assert_eq!(
            get_filesystem("gs://bucket/x").unwrap().scheme(),
            EnumFilesystemScheme::Gcs
        );
        assert!(matches!(
            get_filesystem("hdfs://nn/x"),
            Err(FileIoError::UnsupportedScheme(ref s)) if s == "hdfs://"
        ));
    }

    #[test]
    fn handle_rejects_wrong_direction() {
        let mut reader = FileHandle::Reader(Box::new(&b"abc"[..]));
        assert!(reader.write(b"x").is_err());
        assert_eq!(reader.read_all().unwrap(), b"abc");

        let mut writer = FileHandle::Writer(Box::new(Vec::<u8>::new()));
        let mut buf = [0u8; 4];
        let err = writer.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);
        writer.write_all(b"ok").unwrap();
        writer.close().unwrap();
    }
}
