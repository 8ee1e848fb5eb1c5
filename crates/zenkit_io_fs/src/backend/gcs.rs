//! `gs://` backend with object-store semantics.
//!
//! Directories are implicit key prefixes; `mkdir`/`makedirs` write a
//! zero-byte marker object whose key ends in `/`. Bucket roots always count
//! as existing directories. Network access goes through an [`ObjectClient`]
//! registered by the embedding application.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::backend::{FileHandle, Filesystem, IterWalk};
use crate::spec::{
    C_GCS_PREFIX, EnumFilesystemScheme, EnumOpenMode, FileIoError, SpecFileStat, SpecWalkEntry,
};
use crate::util::{compile_glob, join_path, split_glob_prefix};

////////////////////////////////////////////////////////////////////////////////
// #region ObjectClient

/// Listing/head record of one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecObjectMeta {
    /// Full object key inside the bucket.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last update time, seconds since the Unix epoch.
    pub mtime_seconds: i64,
}

/// Minimal object-store client the GCS backend is written against.
///
/// Missing objects are reported as [`io::ErrorKind::NotFound`].
pub trait ObjectClient: Send + Sync + fmt::Debug {
    fn get_object(&self, bucket: &str, key: &str) -> io::Result<Vec<u8>>;

    fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> io::Result<()>;

    fn delete_object(&self, bucket: &str, key: &str) -> io::Result<()>;

    /// `Ok(None)` when the object does not exist.
    fn head_object(&self, bucket: &str, key: &str) -> io::Result<Option<SpecObjectMeta>>;

    /// Every object whose key starts with `prefix`, in key order.
    fn list_objects(&self, bucket: &str, prefix: &str) -> io::Result<Vec<SpecObjectMeta>>;

    /// Server-side copy; the default downloads and re-uploads.
    fn copy_object(
        &self,
        bucket_src: &str,
        key_src: &str,
        bucket_dst: &str,
        key_dst: &str,
    ) -> io::Result<()> {
        let data = self.get_object(bucket_src, key_src)?;
        self.put_object(bucket_dst, key_dst, data)
    }
}

static GCS_CLIENT: RwLock<Option<Arc<dyn ObjectClient>>> = RwLock::new(None);

/// Install the client used by every `gs://` backend built afterwards.
///
/// Returns the previously registered client.
pub fn register_gcs_client(client: Arc<dyn ObjectClient>) -> Option<Arc<dyn ObjectClient>> {
    debug!(?client, "registering gcs object client");
    GCS_CLIENT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(client)
}

/// Remove the registered client; later `gs://` calls fail as unavailable.
pub fn clear_gcs_client() -> Option<Arc<dyn ObjectClient>> {
    GCS_CLIENT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}

fn registered_gcs_client() -> Option<Arc<dyn ObjectClient>> {
    GCS_CLIENT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

type TypeBucketMap = BTreeMap<String, BTreeMap<String, SpecStoredObject>>;

#[derive(Debug, Clone)]
struct SpecStoredObject {
    data: Vec<u8>,
    mtime_seconds: i64,
}

/// In-process object store, for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryObjectClient {
    buckets: Mutex<TypeBucketMap>,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TypeBucketMap> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn object_not_found(bucket: &str, key: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("object not found: gs://{bucket}/{key}"),
    )
}

fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl ObjectClient for MemoryObjectClient {
    fn get_object(&self, bucket: &str, key: &str) -> io::Result<Vec<u8>> {
        self.lock()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|obj| obj.data.clone())
            .ok_or_else(|| object_not_found(bucket, key))
    }

    fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> io::Result<()> {
        self.lock().entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            SpecStoredObject {
                data,
                mtime_seconds: now_unix_seconds(),
            },
        );
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> io::Result<()> {
        self.lock()
            .get_mut(bucket)
            .and_then(|objects| objects.remove(key))
            .map(|_| ())
            .ok_or_else(|| object_not_found(bucket, key))
    }

    fn head_object(&self, bucket: &str, key: &str) -> io::Result<Option<SpecObjectMeta>> {
        Ok(self
            .lock()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|obj| SpecObjectMeta {
                key: key.to_string(),
                size: obj.data.len() as u64,
                mtime_seconds: obj.mtime_seconds,
            }))
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> io::Result<Vec<SpecObjectMeta>> {
        let guard = self.lock();
        let Some(objects) = guard.get(bucket) else {
            return Ok(Vec::new());
        };
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| SpecObjectMeta {
                key: key.clone(),
                size: obj.data.len() as u64,
                mtime_seconds: obj.mtime_seconds,
            })
            .collect())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Paths

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpecGcsPath<'a> {
    bucket: &'a str,
    /// Key without trailing `/`; empty for the bucket root.
    key: &'a str,
}

impl SpecGcsPath<'_> {
    /// Key prefix of everything below this path.
    fn dir_prefix(&self) -> String {
        if self.key.is_empty() {
            return String::new();
        }
        format!("{}/", self.key)
    }

    fn parent_key(&self) -> &str {
        self.key.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
    }
}

fn parse_gcs_path(path: &str) -> Result<SpecGcsPath<'_>, FileIoError> {
    let rest = path
        .strip_prefix(C_GCS_PREFIX)
        .ok_or_else(|| FileIoError::InvalidPath(format!("not a gs:// path: `{path}`")))?;
    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(FileIoError::InvalidPath(format!(
            "missing bucket name: `{path}`"
        )));
    }
    Ok(SpecGcsPath {
        bucket,
        key: key.trim_end_matches('/'),
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Filesystem

type TypeWalkTree = BTreeMap<String, (BTreeSet<String>, BTreeSet<String>)>;

/// Backend for `gs://bucket/key` paths.
#[derive(Debug, Clone)]
pub struct GcsFilesystem {
    client: Option<Arc<dyn ObjectClient>>,
}

impl Default for GcsFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl GcsFilesystem {
    /// Backend bound to the currently registered client, if any.
    pub fn new() -> Self {
        Self {
            client: registered_gcs_client(),
        }
    }

    /// Backend bound to an explicit client.
    pub fn with_client(client: Option<Arc<dyn ObjectClient>>) -> Self {
        Self { client }
    }

    fn client(&self) -> Result<&Arc<dyn ObjectClient>, FileIoError> {
        self.client.as_ref().ok_or_else(|| {
            FileIoError::BackendUnavailable(
                "no object-store client registered for `gs://` paths".to_string(),
            )
        })
    }

    fn head(
        &self,
        path: &str,
        spec_path: SpecGcsPath<'_>,
    ) -> Result<Option<SpecObjectMeta>, FileIoError> {
        if spec_path.key.is_empty() {
            return Ok(None);
        }
        self.client()?
            .head_object(spec_path.bucket, spec_path.key)
            .map_err(|e| FileIoError::from_io(path, e))
    }

    fn list(
        &self,
        path: &str,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<SpecObjectMeta>, FileIoError> {
        self.client()?
            .list_objects(bucket, prefix)
            .map_err(|e| FileIoError::from_io(path, e))
    }

    fn is_dir_path(&self, path: &str, spec_path: SpecGcsPath<'_>) -> Result<bool, FileIoError> {
        if spec_path.key.is_empty() {
            return Ok(true);
        }
        let l_objects = self.list(path, spec_path.bucket, &spec_path.dir_prefix())?;
        Ok(!l_objects.is_empty())
    }

    fn put_marker(&self, path: &str, spec_path: SpecGcsPath<'_>) -> Result<(), FileIoError> {
        self.client()?
            .put_object(spec_path.bucket, &spec_path.dir_prefix(), Vec::new())
            .map_err(|e| FileIoError::from_io(path, e))
    }

    fn copy_checked(&self, src: &str, dst: &str, overwrite: bool) -> Result<(), FileIoError> {
        let spec_src = parse_gcs_path(src)?;
        let spec_dst = parse_gcs_path(dst)?;
        if !overwrite && self.exists(dst)? {
            return Err(FileIoError::DestinationExists(dst.to_string()));
        }
        self.client()?
            .copy_object(spec_src.bucket, spec_src.key, spec_dst.bucket, spec_dst.key)
            .map_err(|e| FileIoError::from_io(src, e))
    }

    fn collect_walk(
        &self,
        top: &str,
        if_topdown: bool,
    ) -> Result<Vec<SpecWalkEntry>, FileIoError> {
        let spec_path = parse_gcs_path(top)?;
        if !self.is_dir_path(top, spec_path)? {
            return Err(FileIoError::NotFound(top.to_string()));
        }
        let prefix = spec_path.dir_prefix();
        let l_objects = self.list(top, spec_path.bucket, &prefix)?;

        // Relative directory ("" for top) -> (child dirs, child files).
        let mut dict_tree: TypeWalkTree = BTreeMap::new();
        dict_tree.insert(String::new(), Default::default());
        for spec_obj in &l_objects {
            let rel = &spec_obj.key[prefix.len()..];
            let if_is_marker = rel.ends_with('/');
            let l_parts: Vec<&str> = rel.split('/').filter(|p| !p.is_empty()).collect();
            for (idx, part) in l_parts.iter().enumerate() {
                let parent = l_parts[..idx].join("/");
                let if_is_dir = idx + 1 < l_parts.len() || if_is_marker;
                let entry = dict_tree.entry(parent.clone()).or_default();
                if if_is_dir {
                    entry.0.insert(part.to_string());
                    let child = if parent.is_empty() {
                        part.to_string()
                    } else {
                        format!("{parent}/{part}")
                    };
                    dict_tree.entry(child).or_default();
                } else {
                    entry.1.insert(part.to_string());
                }
            }
        }

        let mut l_entries = Vec::with_capacity(dict_tree.len());
        emit_walk(top, "", &dict_tree, if_topdown, &mut l_entries);
        Ok(l_entries)
    }
}

fn emit_walk(
    top: &str,
    rel: &str,
    dict_tree: &TypeWalkTree,
    if_topdown: bool,
    l_entries: &mut Vec<SpecWalkEntry>,
) {
    let Some((set_dirs, set_files)) = dict_tree.get(rel) else {
        return;
    };
    let spec_walk_entry = SpecWalkEntry {
        root: if rel.is_empty() {
            top.to_string()
        } else {
            join_path(top, rel)
        },
        dirs: set_dirs.iter().cloned().collect(),
        files: set_files.iter().cloned().collect(),
    };
    if if_topdown {
        l_entries.push(spec_walk_entry.clone());
    }
    for name_dir in set_dirs {
        let rel_child = if rel.is_empty() {
            name_dir.clone()
        } else {
            format!("{rel}/{name_dir}")
        };
        emit_walk(top, &rel_child, dict_tree, if_topdown, l_entries);
    }
    if !if_topdown {
        l_entries.push(spec_walk_entry);
    }
}

impl Filesystem for GcsFilesystem {
    fn scheme(&self) -> EnumFilesystemScheme {
        EnumFilesystemScheme::Gcs
    }

    fn open(&self, path: &str, mode: EnumOpenMode) -> Result<FileHandle, FileIoError> {
        let spec_path = parse_gcs_path(path)?;
        let client = self.client()?;
        match mode {
            EnumOpenMode::Read => {
                let data = client
                    .get_object(spec_path.bucket, spec_path.key)
                    .map_err(|e| FileIoError::from_io(path, e))?;
                Ok(FileHandle::Reader(Box::new(Cursor::new(data))))
            }
            EnumOpenMode::Write | EnumOpenMode::Append => {
                let buf = if mode == EnumOpenMode::Append {
                    match client.get_object(spec_path.bucket, spec_path.key) {
                        Ok(data) => data,
                        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
                        Err(e) => return Err(FileIoError::from_io(path, e)),
                    }
                } else {
                    Vec::new()
                };
                Ok(FileHandle::Writer(Box::new(GcsObjectWriter {
                    client: Arc::clone(client),
                    bucket: spec_path.bucket.to_string(),
                    key: spec_path.key.to_string(),
                    buf,
                    if_dirty: true,
                })))
            }
        }
    }

    fn copy(&self, src: &str, dst: &str, overwrite: bool) -> Result<(), FileIoError> {
        self.copy_checked(src, dst, overwrite)
    }

    fn exists(&self, path: &str) -> Result<bool, FileIoError> {
        let spec_path = parse_gcs_path(path)?;
        if self.head(path, spec_path)?.is_some() {
            return Ok(true);
        }
        self.is_dir_path(path, spec_path)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<String>, FileIoError> {
        let Some((prefix_dir, _)) = split_glob_prefix(pattern) else {
            if self.exists(pattern)? {
                return Ok(vec![pattern.to_string()]);
            }
            return Ok(Vec::new());
        };
        if prefix_dir == C_GCS_PREFIX {
            return Err(FileIoError::InvalidPattern(format!(
                "`{pattern}` (bucket names cannot contain wildcards)"
            )));
        }

        let matcher = compile_glob(pattern, true)?;
        let spec_path = parse_gcs_path(prefix_dir)?;
        let prefix_key = spec_path.dir_prefix();
        let path_bucket = format!("{C_GCS_PREFIX}{}", spec_path.bucket);

        // Objects and every implied directory below the literal prefix.
        let mut set_candidates = BTreeSet::new();
        for spec_obj in self.list(pattern, spec_path.bucket, &prefix_key)? {
            let key = spec_obj.key.trim_end_matches('/');
            let mut idx_from = prefix_key.len();
            while let Some(idx_rel) = key[idx_from..].find('/') {
                let idx_slash = idx_from + idx_rel;
                set_candidates.insert(join_path(&path_bucket, &key[..idx_slash]));
                idx_from = idx_slash + 1;
            }
            if !key.is_empty() {
                set_candidates.insert(join_path(&path_bucket, key));
            }
        }
        Ok(set_candidates
            .into_iter()
            .filter(|candidate| matcher.is_match(candidate))
            .collect())
    }

    fn isdir(&self, path: &str) -> Result<bool, FileIoError> {
        let spec_path = parse_gcs_path(path)?;
        self.is_dir_path(path, spec_path)
    }

    fn listdir(&self, path: &str) -> Result<Vec<String>, FileIoError> {
        let spec_path = parse_gcs_path(path)?;
        let prefix = spec_path.dir_prefix();
        let l_objects = self.list(path, spec_path.bucket, &prefix)?;
        if l_objects.is_empty() && !spec_path.key.is_empty() {
            return Err(FileIoError::NotFound(path.to_string()));
        }
        let set_names: BTreeSet<String> = l_objects
            .iter()
            .filter_map(|spec_obj| spec_obj.key[prefix.len()..].split('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        Ok(set_names.into_iter().collect())
    }

    fn makedirs(&self, path: &str) -> Result<(), FileIoError> {
        let spec_path = parse_gcs_path(path)?;
        if self.is_dir_path(path, spec_path)? {
            return Ok(());
        }
        self.put_marker(path, spec_path)
    }

    fn mkdir(&self, path: &str) -> Result<(), FileIoError> {
        let spec_path = parse_gcs_path(path)?;
        if self.exists(path)? {
            return Err(FileIoError::Io {
                path: path.to_string(),
                source: io::Error::from(io::ErrorKind::AlreadyExists),
            });
        }
        let parent_key = spec_path.parent_key();
        let spec_parent = SpecGcsPath {
            bucket: spec_path.bucket,
            key: parent_key,
        };
        if !self.is_dir_path(path, spec_parent)? {
            return Err(FileIoError::NotFound(format!(
                "{C_GCS_PREFIX}{}/{parent_key}",
                spec_path.bucket
            )));
        }
        self.put_marker(path, spec_path)
    }

    fn remove(&self, path: &str) -> Result<(), FileIoError> {
        let spec_path = parse_gcs_path(path)?;
        if self.head(path, spec_path)?.is_none() {
            return Err(FileIoError::NotFound(path.to_string()));
        }
        self.client()?
            .delete_object(spec_path.bucket, spec_path.key)
            .map_err(|e| FileIoError::from_io(path, e))
    }

    fn rename(&self, src: &str, dst: &str, overwrite: bool) -> Result<(), FileIoError> {
        // Renaming onto itself is a no-op.
        if parse_gcs_path(src)? == parse_gcs_path(dst)? {
            if !self.exists(src)? {
                return Err(FileIoError::NotFound(src.to_string()));
            }
            if !overwrite {
                return Err(FileIoError::DestinationExists(dst.to_string()));
            }
            return Ok(());
        }
        self.copy_checked(src, dst, overwrite)?;
        self.remove(src)
    }

    fn rmtree(&self, path: &str) -> Result<(), FileIoError> {
        let spec_path = parse_gcs_path(path)?;
        let l_objects = self.list(path, spec_path.bucket, &spec_path.dir_prefix())?;
        if l_objects.is_empty() {
            return Err(FileIoError::NotFound(path.to_string()));
        }
        let client = self.client()?;
        for spec_obj in l_objects {
            client
                .delete_object(spec_path.bucket, &spec_obj.key)
                .map_err(|e| FileIoError::from_io(path, e))?;
        }
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<SpecFileStat, FileIoError> {
        let spec_path = parse_gcs_path(path)?;
        if let Some(spec_obj) = self.head(path, spec_path)? {
            return Ok(SpecFileStat {
                size: spec_obj.size,
                if_is_dir: false,
                mtime_seconds: spec_obj.mtime_seconds,
                mtime_nanos: 0,
            });
        }
        if self.is_dir_path(path, spec_path)? {
            return Ok(SpecFileStat {
                if_is_dir: true,
                ..SpecFileStat::default()
            });
        }
        Err(FileIoError::NotFound(path.to_string()))
    }

    fn walk(&self, top: &str, if_topdown: bool) -> IterWalk {
        match self.collect_walk(top, if_topdown) {
            Ok(l_entries) => Box::new(l_entries.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }
}

/// Buffers writes and uploads the whole object on flush.
struct GcsObjectWriter {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    key: String,
    buf: Vec<u8>,
    if_dirty: bool,
}

impl Write for GcsObjectWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        self.if_dirty = true;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.if_dirty {
            return Ok(());
        }
        self.client.put_object(&self.bucket, &self.key, self.buf.clone())?;
        self.if_dirty = false;
        Ok(())
    }
}

impl Drop for GcsObjectWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(
                bucket = %self.bucket,
                key = %self.key,
                error = %e,
                "failed to upload object on close"
            );
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
