//! Scheme-dispatched filesystem operations.
//!
//! Every function resolves the backend from the path's scheme on each call
//! and delegates to it. `copy` and `rename` compare the resolved schemes of
//! both paths to choose between the backend-native operation and the
//! cross-backend path.

use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::backend::{FileHandle, IterWalk, get_filesystem};
use crate::scheme::resolve_scheme;
use crate::spec::{EnumOpenMode, FileIoError, SpecFileStat};
use crate::util::{compile_glob, join_path};

/// Contents written by [`write_file_with_parents`] when none are given.
pub const C_DEFAULT_FILE_CONTENTS: &str = "{}";

////////////////////////////////////////////////////////////////////////////////
// #region Delegates

/// Open a file at the given path.
pub fn open(path: &str, mode: EnumOpenMode) -> Result<FileHandle, FileIoError> {
    get_filesystem(path)?.open(path, mode)
}

/// Copy a file from `src` to `dst`, possibly across backends.
///
/// On one backend the native copy is used. Across backends the destination
/// is checked first (unless `overwrite`), then the whole source is read into
/// memory and written out.
pub fn copy(src: &str, dst: &str, overwrite: bool) -> Result<(), FileIoError> {
    let enum_scheme_src = resolve_scheme(src)?;
    let enum_scheme_dst = resolve_scheme(dst)?;
    if enum_scheme_src == enum_scheme_dst {
        return get_filesystem(src)?.copy(src, dst, overwrite);
    }

    if !overwrite && exists(dst)? {
        return Err(FileIoError::DestinationExists(dst.to_string()));
    }
    debug!(
        src,
        dst,
        scheme_src = %enum_scheme_src,
        scheme_dst = %enum_scheme_dst,
        "copying across filesystems"
    );
    let contents = open(src, EnumOpenMode::Read)?
        .read_all()
        .map_err(|e| FileIoError::from_io(src, e))?;
    let mut handle_dst = open(dst, EnumOpenMode::Write)?;
    handle_dst
        .write_all(&contents)
        .and_then(|_| handle_dst.close())
        .map_err(|e| FileIoError::from_io(dst, e))
}

/// Whether a path exists.
pub fn exists(path: &str) -> Result<bool, FileIoError> {
    get_filesystem(path)?.exists(path)
}

/// Paths matching a glob pattern.
pub fn glob(pattern: &str) -> Result<Vec<String>, FileIoError> {
    get_filesystem(pattern)?.glob(pattern)
}

/// Whether the path points to a directory.
pub fn isdir(path: &str) -> Result<bool, FileIoError> {
    get_filesystem(path)?.isdir(path)
}

/// Entries under `dir_path`.
///
/// Returns full paths (`dir_path` joined with each name) unless
/// `if_only_file_names`. A directory that cannot be listed behaves as empty.
pub fn list_dir(dir_path: &str, if_only_file_names: bool) -> Result<Vec<String>, FileIoError> {
    let l_names = match get_filesystem(dir_path)?.listdir(dir_path) {
        Ok(v) => v,
        Err(e) if e.is_os_error() => {
            debug!(error = %e, "Dir {dir_path} not found.");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };
    if if_only_file_names {
        return Ok(l_names);
    }
    Ok(l_names
        .iter()
        .map(|name| join_path(dir_path, name))
        .collect())
}

/// Make a directory, creating missing parents.
pub fn makedirs(path: &str) -> Result<(), FileIoError> {
    get_filesystem(path)?.makedirs(path)
}

/// Make a directory; the parent must exist.
pub fn mkdir(path: &str) -> Result<(), FileIoError> {
    get_filesystem(path)?.mkdir(path)
}

/// Remove the file at the given path.
pub fn remove(path: &str) -> Result<(), FileIoError> {
    get_filesystem(path)?.remove(path)
}

/// Rename `src` to `dst`. Only supported when both share a backend.
pub fn rename(src: &str, dst: &str, overwrite: bool) -> Result<(), FileIoError> {
    if resolve_scheme(src)? != resolve_scheme(dst)? {
        return Err(FileIoError::CrossFilesystemRename {
            src: src.to_string(),
            dst: dst.to_string(),
        });
    }
    get_filesystem(src)?.rename(src, dst, overwrite)
}

/// Remove a directory and everything below it.
pub fn rmtree(path: &str) -> Result<(), FileIoError> {
    get_filesystem(path)?.rmtree(path)
}

/// Stat descriptor of a path.
pub fn stat(path: &str) -> Result<SpecFileStat, FileIoError> {
    get_filesystem(path)?.stat(path)
}

/// Walk the tree under `top`, yielding one entry per directory.
///
/// Errors while listing a directory are yielded as `Err` items; the walk
/// continues with the remaining directories.
pub fn walk(top: &str, if_topdown: bool) -> Result<IterWalk, FileIoError> {
    Ok(get_filesystem(top)?.walk(top, if_topdown))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Helpers

/// Lazily find files under `dir_path` whose basename matches `pattern`.
///
/// `pattern` follows `fnmatch` rules (`*.png`, `img_?.jpg`, `[!_]*`). The
/// tree is walked top-down as the iterator advances; every call walks anew.
/// Directories that cannot be listed are skipped.
pub fn find_files(
    dir_path: &str,
    pattern: &str,
) -> Result<impl Iterator<Item = String> + use<>, FileIoError> {
    let matcher = compile_glob(pattern, false)?;
    let iter_walk = walk(dir_path, true)?;
    Ok(iter_walk
        .filter_map(|res_entry| match res_entry {
            Ok(spec_walk_entry) => Some(spec_walk_entry),
            Err(e) => {
                debug!(error = %e, "skipping unreadable directory");
                None
            }
        })
        .flat_map(move |spec_walk_entry| {
            let matcher = matcher.clone();
            let root = spec_walk_entry.root;
            spec_walk_entry
                .files
                .into_iter()
                .filter(move |name| matcher.is_match(name))
                .map(move |name| join_path(&root, &name))
        }))
}

/// Create a directory unless one already exists. The parent must exist.
pub fn create_dir_if_not_exists(dir_path: &str) -> Result<(), FileIoError> {
    if !isdir(dir_path)? {
        mkdir(dir_path)?;
    }
    Ok(())
}

/// Create a directory and its parents unless it already exists.
pub fn create_dir_recursive_if_not_exists(dir_path: &str) -> Result<(), FileIoError> {
    if !isdir(dir_path)? {
        makedirs(dir_path)?;
    }
    Ok(())
}

/// Create the parent directories of `file_path`, then write the file.
///
/// An existing file is truncated and overwritten. `None` writes
/// [`C_DEFAULT_FILE_CONTENTS`].
pub fn write_file_with_parents(
    file_path: &str,
    file_contents: Option<&str>,
) -> Result<(), FileIoError> {
    if let Some(path_parent) = parent_path(file_path) {
        create_dir_recursive_if_not_exists(&path_parent)?;
    }
    let mut handle = open(file_path, EnumOpenMode::Write)?;
    handle
        .write_all(file_contents.unwrap_or(C_DEFAULT_FILE_CONTENTS).as_bytes())
        .and_then(|_| handle.close())
        .map_err(|e| FileIoError::from_io(file_path, e))
}

/// Append to a file. Not supported by any backend yet.
pub fn append_file(_file_path: &str, _file_contents: &str) -> Result<(), FileIoError> {
    Err(FileIoError::NotImplemented("append_file"))
}

fn parent_path(file_path: &str) -> Option<String> {
    let parent = Path::new(file_path).parent()?.to_str()?;
    if parent.is_empty() {
        return None;
    }
    Some(parent.to_string())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
