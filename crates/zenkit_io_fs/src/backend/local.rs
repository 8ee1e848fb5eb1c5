//! Local-disk backend.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use filetime::FileTime;
use globset::GlobMatcher;
use tracing::warn;

use crate::backend::{FileHandle, Filesystem, IterWalk};
use crate::spec::{EnumFilesystemScheme, EnumOpenMode, FileIoError, SpecFileStat, SpecWalkEntry};
use crate::util::{compile_glob, join_path, split_glob_prefix};

/// Backend for schemeless paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl Filesystem for LocalFilesystem {
    fn scheme(&self) -> EnumFilesystemScheme {
        EnumFilesystemScheme::Local
    }

    fn open(&self, path: &str, mode: EnumOpenMode) -> Result<FileHandle, FileIoError> {
        let res_handle = match mode {
            EnumOpenMode::Read => {
                File::open(path).map(|f| FileHandle::Reader(Box::new(BufReader::new(f))))
            }
            EnumOpenMode::Write => {
                File::create(path).map(|f| FileHandle::Writer(Box::new(BufWriter::new(f))))
            }
            EnumOpenMode::Append => OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map(|f| FileHandle::Writer(Box::new(BufWriter::new(f)))),
        };
        res_handle.map_err(|e| FileIoError::from_io(path, e))
    }

    fn copy(&self, src: &str, dst: &str, overwrite: bool) -> Result<(), FileIoError> {
        if !overwrite && self.exists(dst)? {
            return Err(FileIoError::DestinationExists(dst.to_string()));
        }
        fs::copy(src, dst).map_err(|e| FileIoError::from_io(failing_side(src, dst), e))?;
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, FileIoError> {
        Path::new(path)
            .try_exists()
            .map_err(|e| FileIoError::from_io(path, e))
    }

    fn glob(&self, pattern: &str) -> Result<Vec<String>, FileIoError> {
        let Some((prefix_dir, pattern_rest)) = split_glob_prefix(pattern) else {
            if self.exists(pattern)? {
                return Ok(vec![pattern.to_string()]);
            }
            return Ok(Vec::new());
        };

        let matcher = compile_glob(pattern, true)?;
        let path_dir_start = if prefix_dir.is_empty() {
            Path::new(".")
        } else {
            Path::new(prefix_dir)
        };
        let l_components: Vec<&str> = pattern_rest.split('/').collect();
        let mut l_matched = Vec::new();
        collect_glob_matches(
            path_dir_start,
            prefix_dir,
            &l_components,
            &matcher,
            &mut l_matched,
        );
        l_matched.sort();
        Ok(l_matched)
    }

    fn isdir(&self, path: &str) -> Result<bool, FileIoError> {
        Ok(Path::new(path).is_dir())
    }

    fn listdir(&self, path: &str) -> Result<Vec<String>, FileIoError> {
        let iter_entries = fs::read_dir(path).map_err(|e| FileIoError::from_io(path, e))?;
        let mut l_names = Vec::new();
        for entry_res in iter_entries {
            let entry = entry_res.map_err(|e| FileIoError::from_io(path, e))?;
            if let Some(name) = entry_name(path, &entry) {
                l_names.push(name);
            }
        }
        l_names.sort();
        Ok(l_names)
    }

    fn makedirs(&self, path: &str) -> Result<(), FileIoError> {
        fs::create_dir_all(path).map_err(|e| FileIoError::from_io(path, e))
    }

    fn mkdir(&self, path: &str) -> Result<(), FileIoError> {
        fs::create_dir(path).map_err(|e| FileIoError::from_io(path, e))
    }

    fn remove(&self, path: &str) -> Result<(), FileIoError> {
        fs::remove_file(path).map_err(|e| FileIoError::from_io(path, e))
    }

    fn rename(&self, src: &str, dst: &str, overwrite: bool) -> Result<(), FileIoError> {
        if !overwrite && self.exists(dst)? {
            return Err(FileIoError::DestinationExists(dst.to_string()));
        }
        fs::rename(src, dst).map_err(|e| FileIoError::from_io(failing_side(src, dst), e))
    }

    fn rmtree(&self, path: &str) -> Result<(), FileIoError> {
        fs::remove_dir_all(path).map_err(|e| FileIoError::from_io(path, e))
    }

    fn stat(&self, path: &str) -> Result<SpecFileStat, FileIoError> {
        let meta = fs::metadata(path).map_err(|e| FileIoError::from_io(path, e))?;
        let file_time_modify = FileTime::from_last_modification_time(&meta);
        Ok(SpecFileStat {
            size: meta.len(),
            if_is_dir: meta.is_dir(),
            mtime_seconds: file_time_modify.unix_seconds(),
            mtime_nanos: file_time_modify.nanoseconds(),
        })
    }

    fn walk(&self, top: &str, if_topdown: bool) -> IterWalk {
        if if_topdown {
            return Box::new(LocalWalkTopDown {
                l_stack: vec![top.to_string()],
            });
        }
        let mut l_entries = Vec::new();
        walk_bottom_up(top, &mut l_entries);
        Box::new(l_entries.into_iter())
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region Traversal

struct LocalWalkTopDown {
    l_stack: Vec<String>,
}

impl Iterator for LocalWalkTopDown {
    type Item = Result<SpecWalkEntry, FileIoError>;

    fn next(&mut self) -> Option<Self::Item> {
        let root = self.l_stack.pop()?;
        match scan_directory(&root) {
            Ok((spec_walk_entry, l_descend)) => {
                // Reverse so the stack pops children in name order.
                self.l_stack.extend(l_descend.into_iter().rev());
                Some(Ok(spec_walk_entry))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

fn walk_bottom_up(root: &str, l_entries: &mut Vec<Result<SpecWalkEntry, FileIoError>>) {
    match scan_directory(root) {
        Ok((spec_walk_entry, l_descend)) => {
            for path_dir_sub in &l_descend {
                walk_bottom_up(path_dir_sub, l_entries);
            }
            l_entries.push(Ok(spec_walk_entry));
        }
        Err(e) => l_entries.push(Err(e)),
    }
}

/// List one directory, splitting entries into dirs and files.
///
/// Also returns the sub-directories to descend into; symlinked directories
/// are reported in `dirs` but never descended.
fn scan_directory(root: &str) -> Result<(SpecWalkEntry, Vec<String>), FileIoError> {
    let iter_entries = fs::read_dir(root).map_err(|e| FileIoError::from_io(root, e))?;

    let mut l_dirs = Vec::new();
    let mut l_files = Vec::new();
    let mut l_descend = Vec::new();
    for entry_res in iter_entries {
        let entry = entry_res.map_err(|e| FileIoError::from_io(root, e))?;
        let Some(name) = entry_name(root, &entry) else {
            continue;
        };
        let cfg_file_type = entry
            .file_type()
            .map_err(|e| FileIoError::from_io(&join_path(root, &name), e))?;

        let if_is_symlink = cfg_file_type.is_symlink();
        let if_is_dir = cfg_file_type.is_dir() || (if_is_symlink && entry.path().is_dir());
        if if_is_dir {
            if !if_is_symlink {
                l_descend.push(name.clone());
            }
            l_dirs.push(name);
        } else {
            l_files.push(name);
        }
    }

    l_dirs.sort();
    l_files.sort();
    l_descend.sort();
    let l_descend = l_descend
        .iter()
        .map(|name| join_path(root, name))
        .collect();

    Ok((
        SpecWalkEntry {
            root: root.to_string(),
            dirs: l_dirs,
            files: l_files,
        },
        l_descend,
    ))
}

/// Match one pattern component per directory level, like `glob.glob`.
///
/// Names starting with `.` only match components that start with `.`.
fn collect_glob_matches(
    path_dir: &Path,
    prefix: &str,
    l_components: &[&str],
    matcher: &GlobMatcher,
    l_matched: &mut Vec<String>,
) {
    let Some((component, l_rest)) = l_components.split_first() else {
        return;
    };
    // Unreadable directories contribute nothing, as with shell globbing.
    let Ok(iter_entries) = fs::read_dir(path_dir) else {
        return;
    };
    let if_allow_hidden = component.starts_with('.');
    for entry in iter_entries.flatten() {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') && !if_allow_hidden {
            continue;
        }
        let candidate = format!("{prefix}{name}");
        if l_rest.is_empty() {
            if matcher.is_match(&candidate) {
                l_matched.push(candidate);
            }
            continue;
        }
        if entry.path().is_dir() {
            collect_glob_matches(
                &entry.path(),
                &format!("{candidate}/"),
                l_rest,
                matcher,
                l_matched,
            );
        }
    }
}

/// Path to blame for a failed two-path operation.
fn failing_side<'a>(src: &'a str, dst: &'a str) -> &'a str {
    if Path::new(src).symlink_metadata().is_ok() {
        return dst;
    }
    src
}

/// Entry name as UTF-8; other names are skipped with a warning.
fn entry_name(dir_path: &str, entry: &fs::DirEntry) -> Option<String> {
    match entry.file_name().into_string() {
        Ok(name) => Some(name),
        Err(raw) => {
            warn!(
                dir = dir_path,
                name = %raw.to_string_lossy(),
                "skipping entry with non UTF-8 name"
            );
            None
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use tempfile::TempDir;

    use super::LocalFilesystem;
    use crate::backend::Filesystem;
    use crate::spec::{EnumOpenMode, FileIoError};

    fn path_str(tmp: &TempDir, rel: &str) -> String {
        tmp.path().join(rel).to_string_lossy().into_owned()
    }

    fn write_text(path: &str, txt: &str) {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, txt).expect("write text");
    }

    #[test]
    fn open_write_append_read() {
        let tmp = TempDir::new().expect("tempdir");
        let fs_local = LocalFilesystem;
        let path = path_str(&tmp, "f.txt");

        let mut handle = fs_local.open(&path, EnumOpenMode::Write).unwrap();
        handle.write_all(b"abc").unwrap();
        handle.close().unwrap();

        let mut handle = fs_local.open(&path, EnumOpenMode::Append).unwrap();
        handle.write_all(b"def").unwrap();
        handle.close().unwrap();

        let mut handle = fs_local.open(&path, EnumOpenMode::Read).unwrap();
        assert_eq!(handle.read_all().unwrap(), b"abcdef");
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let tmp = TempDir::new().expect("tempdir");
        let err = LocalFilesystem
            .open(&path_str(&tmp, "nope"), EnumOpenMode::Read)
            .unwrap_err();
        assert!(matches!(err, FileIoError::NotFound(_)));
    }

    #[test]
    fn copy_refuses_existing_destination_without_overwrite() {
        let tmp = TempDir::new().expect("tempdir");
        let src = path_str(&tmp, "src.txt");
        let dst = path_str(&tmp, "dst.txt");
        write_text(&src, "new");
        write_text(&dst, "old");

        let err = LocalFilesystem.copy(&src, &dst, false).unwrap_err();
        assert!(matches!(err, FileIoError::DestinationExists(ref p) if *p == dst));
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "old");

        LocalFilesystem.copy(&src, &dst, true).unwrap();
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "new");
    }

    #[test]
    fn rename_respects_overwrite() {
        let tmp = TempDir::new().expect("tempdir");
        let src = path_str(&tmp, "a.txt");
        let dst = path_str(&tmp, "b.txt");
        write_text(&src, "a");
        write_text(&dst, "b");

        assert!(LocalFilesystem.rename(&src, &dst, false).is_err());
        LocalFilesystem.rename(&src, &dst, true).unwrap();
        assert!(!Path::new(&src).exists());
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "a");
    }

    #[test]
    fn mkdir_requires_parent_and_absence() {
        let tmp = TempDir::new().expect("tempdir");
        let fs_local = LocalFilesystem;

        assert!(fs_local.mkdir(&path_str(&tmp, "x/y")).is_err());
        fs_local.mkdir(&path_str(&tmp, "x")).unwrap();
        assert!(fs_local.mkdir(&path_str(&tmp, "x")).is_err());
        fs_local.makedirs(&path_str(&tmp, "x/y/z")).unwrap();
        fs_local.makedirs(&path_str(&tmp, "x/y/z")).unwrap();
        assert!(fs_local.isdir(&path_str(&tmp, "x/y/z")).unwrap());
    }

    #[test]
    fn listdir_sorted_and_missing_fails() {
        let tmp = TempDir::new().expect("tempdir");
        write_text(&path_str(&tmp, "b.txt"), "b");
        write_text(&path_str(&tmp, "a/inner.txt"), "a");

        let l_names = LocalFilesystem.listdir(&path_str(&tmp, "")).unwrap();
        assert_eq!(l_names, vec!["a".to_string(), "b.txt".to_string()]);
        assert!(matches!(
            LocalFilesystem.listdir(&path_str(&tmp, "missing")),
            Err(FileIoError::NotFound(_))
        ));
    }

    #[test]
    fn remove_and_rmtree() {
        let tmp = TempDir::new().expect("tempdir");
        let file = path_str(&tmp, "d/f.txt");
        write_text(&file, "x");

        LocalFilesystem.remove(&file).unwrap();
        assert!(!LocalFilesystem.exists(&file).unwrap());
        assert!(LocalFilesystem.remove(&file).is_err());

        write_text(&path_str(&tmp, "d/e/g.txt"), "x");
        LocalFilesystem.rmtree(&path_str(&tmp, "d")).unwrap();
        assert!(!LocalFilesystem.exists(&path_str(&tmp, "d")).unwrap());
    }

    #[test]
    fn stat_reports_size_dir_flag_and_mtime() {
        use filetime::{FileTime, set_file_mtime};

        let tmp = TempDir::new().expect("tempdir");
        let file = path_str(&tmp, "s.bin");
        write_text(&file, "12345");
        set_file_mtime(&file, FileTime::from_unix_time(1_700_000_000, 5)).unwrap();

        let spec_stat = LocalFilesystem.stat(&file).unwrap();
        assert_eq!(spec_stat.size, 5);
        assert!(!spec_stat.if_is_dir);
        assert_eq!(spec_stat.mtime_seconds, 1_700_000_000);

        assert!(LocalFilesystem.stat(&path_str(&tmp, "")).unwrap().if_is_dir);
    }

    #[test]
    fn glob_matches_within_components() {
        let tmp = TempDir::new().expect("tempdir");
        write_text(&path_str(&tmp, "run_1/metrics.csv"), "");
        write_text(&path_str(&tmp, "run_2/metrics.csv"), "");
        write_text(&path_str(&tmp, "run_2/deep/metrics.csv"), "");
        write_text(&path_str(&tmp, "other/metrics.csv"), "");

        let pattern = path_str(&tmp, "run_*/*.csv");
        let l_matched = LocalFilesystem.glob(&pattern).unwrap();
        assert_eq!(
            l_matched,
            vec![
                path_str(&tmp, "run_1/metrics.csv"),
                path_str(&tmp, "run_2/metrics.csv"),
            ]
        );

        let pattern = path_str(&tmp, "**/metrics.csv");
        assert_eq!(
            LocalFilesystem.glob(&pattern).unwrap(),
            vec![
                path_str(&tmp, "other/metrics.csv"),
                path_str(&tmp, "run_1/metrics.csv"),
                path_str(&tmp, "run_2/metrics.csv"),
            ]
        );

        let literal = path_str(&tmp, "other/metrics.csv");
        assert_eq!(LocalFilesystem.glob(&literal).unwrap(), vec![literal]);
        assert!(LocalFilesystem
            .glob(&path_str(&tmp, "absent.csv"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn glob_star_skips_dotfiles_unless_pattern_starts_with_dot() {
        let tmp = TempDir::new().expect("tempdir");
        write_text(&path_str(&tmp, "a/m.csv"), "");
        write_text(&path_str(&tmp, "a/b/m.csv"), "");
        write_text(&path_str(&tmp, ".hidden.csv"), "");
        write_text(&path_str(&tmp, ".cache/m.csv"), "");

        assert!(LocalFilesystem
            .glob(&path_str(&tmp, "*.csv"))
            .unwrap()
            .is_empty());
        assert_eq!(
            LocalFilesystem.glob(&path_str(&tmp, ".*.csv")).unwrap(),
            vec![path_str(&tmp, ".hidden.csv")]
        );
        assert_eq!(
            LocalFilesystem.glob(&path_str(&tmp, "*/m.csv")).unwrap(),
            vec![path_str(&tmp, "a/m.csv")]
        );
        assert_eq!(
            LocalFilesystem.glob(&path_str(&tmp, ".c*/m.csv")).unwrap(),
            vec![path_str(&tmp, ".cache/m.csv")]
        );
    }

    #[test]
    fn copy_and_rename_blame_destination_side() {
        let tmp = TempDir::new().expect("tempdir");
        let src = path_str(&tmp, "src.txt");
        let dst = path_str(&tmp, "no_parent/dst.txt");
        write_text(&src, "x");

        let err = LocalFilesystem.copy(&src, &dst, false).unwrap_err();
        assert!(matches!(err, FileIoError::NotFound(ref p) if *p == dst));
        let err = LocalFilesystem.rename(&src, &dst, false).unwrap_err();
        assert!(matches!(err, FileIoError::NotFound(ref p) if *p == dst));

        let missing = path_str(&tmp, "missing.txt");
        let err = LocalFilesystem
            .copy(&missing, &path_str(&tmp, "out.txt"), false)
            .unwrap_err();
        assert!(matches!(err, FileIoError::NotFound(ref p) if *p == missing));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_names_are_skipped_not_fatal() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().expect("tempdir");
        let top = path_str(&tmp, "t");
        write_text(&path_str(&tmp, "t/ok.txt"), "");
        write_text(&path_str(&tmp, "t/sub/deep.txt"), "");
        let path_bad = Path::new(&top).join(OsStr::from_bytes(b"bad\xff.txt"));
        std::fs::write(path_bad, "").unwrap();

        assert_eq!(
            LocalFilesystem.listdir(&top).unwrap(),
            vec!["ok.txt".to_string(), "sub".to_string()]
        );
        let l_entries = LocalFilesystem
            .walk(&top, true)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(l_entries.len(), 2);
        assert_eq!(l_entries[0].files, vec!["ok.txt".to_string()]);
        assert_eq!(l_entries[1].files, vec!["deep.txt".to_string()]);
    }

    #[test]
    fn walk_topdown_and_bottomup_orders() {
        let tmp = TempDir::new().expect("tempdir");
        let top = path_str(&tmp, "t");
        write_text(&path_str(&tmp, "t/a.txt"), "");
        write_text(&path_str(&tmp, "t/x/b.txt"), "");
        write_text(&path_str(&tmp, "t/x/y/c.txt"), "");

        let l_topdown = LocalFilesystem
            .walk(&top, true)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let l_roots: Vec<_> = l_topdown.iter().map(|e| e.root.clone()).collect();
        assert_eq!(
            l_roots,
            vec![top.clone(), format!("{top}/x"), format!("{top}/x/y")]
        );
        assert_eq!(l_topdown[0].dirs, vec!["x".to_string()]);
        assert_eq!(l_topdown[0].files, vec!["a.txt".to_string()]);

        let l_bottomup = LocalFilesystem
            .walk(&top, false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let l_roots: Vec<_> = l_bottomup.iter().map(|e| e.root.clone()).collect();
        assert_eq!(
            l_roots,
            vec![format!("{top}/x/y"), format!("{top}/x"), top.clone()]
        );
    }

    #[test]
    fn walk_missing_top_yields_error_item() {
        let tmp = TempDir::new().expect("tempdir");
        let l_items: Vec<_> = LocalFilesystem
            .walk(&path_str(&tmp, "missing"), true)
            .collect();
        assert_eq!(l_items.len(), 1);
        assert!(matches!(l_items[0], Err(FileIoError::NotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn walk_lists_but_does_not_follow_symlinked_dirs() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().expect("tempdir");
        write_text(&path_str(&tmp, "real/f.txt"), "");
        std::fs::create_dir_all(path_str(&tmp, "top")).unwrap();
        symlink(path_str(&tmp, "real"), path_str(&tmp, "top/link")).unwrap();

        let l_entries = LocalFilesystem
            .walk(&path_str(&tmp, "top"), true)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(l_entries.len(), 1);
        assert_eq!(l_entries[0].dirs, vec!["link".to_string()]);
    }
}
