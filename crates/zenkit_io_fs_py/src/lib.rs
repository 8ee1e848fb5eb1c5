//! Python bindings for `zenkit_io_fs`.
//!
//! `gs://` paths need an object-store client. Python callers can install the
//! in-process store with `use_memory_gcs_client()`; a networked client has to
//! be registered from Rust with `zenkit_io_fs::register_gcs_client`.

use std::sync::Arc;

use zenkit_io_fs::fileio;
use zenkit_io_fs::{
    EnumOpenMode, FileIoError, MemoryObjectClient, SpecFileStat, clear_gcs_client, get_scheme,
    is_gcs_path, is_remote, is_root, register_gcs_client,
};
use zenkit_log::{EnumLogVerbosity, LogInitError, SpecLogOptions, init_logging};

use pyo3::exceptions::{
    PyFileExistsError, PyFileNotFoundError, PyNotImplementedError, PyOSError, PyRuntimeError,
    PyValueError,
};
use pyo3::prelude::*;
use pyo3::types::PyBytes;

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "zenkit.io.fileio.v1";
const C_BRIDGE_TRANSPORT: &str = "rust_native";

#[pyclass(name = "FileStat")]
#[derive(Debug, Clone)]
struct PyFileStat {
    #[pyo3(get)]
    st_size: u64,
    #[pyo3(get)]
    is_dir: bool,
    #[pyo3(get)]
    mtime_seconds: i64,
    #[pyo3(get)]
    mtime_nanos: u32,
}

impl From<SpecFileStat> for PyFileStat {
    fn from(spec_stat: SpecFileStat) -> Self {
        Self {
            st_size: spec_stat.size,
            is_dir: spec_stat.if_is_dir,
            mtime_seconds: spec_stat.mtime_seconds,
            mtime_nanos: spec_stat.mtime_nanos,
        }
    }
}

#[pymethods]
impl PyFileStat {
    /// Modification time as float seconds, like `os.stat_result.st_mtime`.
    #[getter]
    fn st_mtime(&self) -> f64 {
        self.mtime_seconds as f64 + f64::from(self.mtime_nanos) / 1e9
    }

    fn __repr__(&self) -> String {
        format!(
            "FileStat(st_size={}, is_dir={}, st_mtime={})",
            self.st_size,
            if self.is_dir { "True" } else { "False" },
            self.st_mtime()
        )
    }
}

fn map_file_io_error(exception: FileIoError) -> PyErr {
    let message = exception.to_string();
    match exception {
        FileIoError::InvalidPath(_)
        | FileIoError::UnsupportedScheme(_)
        | FileIoError::InvalidOpenMode(_)
        | FileIoError::InvalidPattern(_) => PyValueError::new_err(message),
        FileIoError::NotFound(_) => PyFileNotFoundError::new_err(message),
        FileIoError::DestinationExists(_) => PyFileExistsError::new_err(message),
        FileIoError::CrossFilesystemRename { .. } | FileIoError::NotImplemented(_) => {
            PyNotImplementedError::new_err(message)
        }
        FileIoError::BackendUnavailable(_) | FileIoError::Io { .. } => {
            PyOSError::new_err(message)
        }
    }
}

fn map_log_init_error(exception: LogInitError) -> PyErr {
    match exception {
        LogInitError::InvalidVerbosity(_) => PyValueError::new_err(exception.to_string()),
        LogInitError::AlreadyInitialized(_) => PyRuntimeError::new_err(exception.to_string()),
    }
}

#[pyfunction(name = "get_scheme")]
fn get_scheme_py(path: &str) -> String {
    get_scheme(path)
}

#[pyfunction(name = "is_remote")]
fn is_remote_py(path: &str) -> bool {
    is_remote(path)
}

#[pyfunction(name = "is_gcs_path")]
fn is_gcs_path_py(path: &str) -> bool {
    is_gcs_path(path)
}

#[pyfunction(name = "is_root")]
fn is_root_py(path: &str) -> bool {
    is_root(path)
}

#[pyfunction(name = "read_bytes")]
fn read_bytes_py<'py>(py: Python<'py>, path: String) -> PyResult<Bound<'py, PyBytes>> {
    let data = py
        .allow_threads(|| -> Result<Vec<u8>, FileIoError> {
            fileio::open(&path, EnumOpenMode::Read)?
                .read_all()
                .map_err(|e| FileIoError::from_io(&path, e))
        })
        .map_err(map_file_io_error)?;
    Ok(PyBytes::new(py, &data))
}

#[pyfunction(name = "write_bytes")]
#[pyo3(signature = (path, data, mode = "wb"))]
fn write_bytes_py(py: Python<'_>, path: String, data: Vec<u8>, mode: &str) -> PyResult<()> {
    let enum_mode: EnumOpenMode = mode.parse().map_err(map_file_io_error)?;
    if enum_mode == EnumOpenMode::Read {
        return Err(PyValueError::new_err(format!(
            "Invalid write mode: `{mode}`. Expected one of: ['w', 'wb', 'a', 'ab']"
        )));
    }
    py.allow_threads(|| -> Result<(), FileIoError> {
        use std::io::Write;

        let mut handle = fileio::open(&path, enum_mode)?;
        handle
            .write_all(&data)
            .and_then(|_| handle.close())
            .map_err(|e| FileIoError::from_io(&path, e))
    })
    .map_err(map_file_io_error)
}

#[pyfunction(name = "copy")]
#[pyo3(signature = (src, dst, overwrite = false))]
fn copy_py(py: Python<'_>, src: String, dst: String, overwrite: bool) -> PyResult<()> {
    py.allow_threads(|| fileio::copy(&src, &dst, overwrite))
        .map_err(map_file_io_error)
}

#[pyfunction(name = "exists")]
fn exists_py(py: Python<'_>, path: String) -> PyResult<bool> {
    py.allow_threads(|| fileio::exists(&path))
        .map_err(map_file_io_error)
}

#[pyfunction(name = "glob")]
fn glob_py(py: Python<'_>, pattern: String) -> PyResult<Vec<String>> {
    py.allow_threads(|| fileio::glob(&pattern))
        .map_err(map_file_io_error)
}

#[pyfunction(name = "isdir")]
fn isdir_py(py: Python<'_>, path: String) -> PyResult<bool> {
    py.allow_threads(|| fileio::isdir(&path))
        .map_err(map_file_io_error)
}

#[pyfunction(name = "list_dir")]
#[pyo3(signature = (dir_path, only_file_names = false))]
fn list_dir_py(py: Python<'_>, dir_path: String, only_file_names: bool) -> PyResult<Vec<String>> {
    py.allow_threads(|| fileio::list_dir(&dir_path, only_file_names))
        .map_err(map_file_io_error)
}

#[pyfunction(name = "makedirs")]
fn makedirs_py(py: Python<'_>, path: String) -> PyResult<()> {
    py.allow_threads(|| fileio::makedirs(&path))
        .map_err(map_file_io_error)
}

#[pyfunction(name = "mkdir")]
fn mkdir_py(py: Python<'_>, path: String) -> PyResult<()> {
    py.allow_threads(|| fileio::mkdir(&path))
        .map_err(map_file_io_error)
}

#[pyfunction(name = "remove")]
fn remove_py(py: Python<'_>, path: String) -> PyResult<()> {
    py.allow_threads(|| fileio::remove(&path))
        .map_err(map_file_io_error)
}

#[pyfunction(name = "rename")]
#[pyo3(signature = (src, dst, overwrite = false))]
fn rename_py(py: Python<'_>, src: String, dst: String, overwrite: bool) -> PyResult<()> {
    py.allow_threads(|| fileio::rename(&src, &dst, overwrite))
        .map_err(map_file_io_error)
}

#[pyfunction(name = "rmtree")]
fn rmtree_py(py: Python<'_>, path: String) -> PyResult<()> {
    py.allow_threads(|| fileio::rmtree(&path))
        .map_err(map_file_io_error)
}

#[pyfunction(name = "stat")]
fn stat_py(py: Python<'_>, path: String) -> PyResult<PyFileStat> {
    let spec_stat = py
        .allow_threads(|| fileio::stat(&path))
        .map_err(map_file_io_error)?;
    Ok(PyFileStat::from(spec_stat))
}

/// Directories that fail to list are skipped, like `os.walk` without `onerror`.
#[pyfunction(name = "walk")]
#[pyo3(signature = (top, topdown = true))]
fn walk_py(
    py: Python<'_>,
    top: String,
    topdown: bool,
) -> PyResult<Vec<(String, Vec<String>, Vec<String>)>> {
    py.allow_threads(|| -> Result<Vec<_>, FileIoError> {
        let l_entries = fileio::walk(&top, topdown)?
            .filter_map(Result::ok)
            .map(|spec_walk_entry| {
                (
                    spec_walk_entry.root,
                    spec_walk_entry.dirs,
                    spec_walk_entry.files,
                )
            })
            .collect();
        Ok(l_entries)
    })
    .map_err(map_file_io_error)
}

#[pyfunction(name = "find_files")]
fn find_files_py(py: Python<'_>, dir_path: String, pattern: String) -> PyResult<Vec<String>> {
    py.allow_threads(|| -> Result<Vec<String>, FileIoError> {
        Ok(fileio::find_files(&dir_path, &pattern)?.collect())
    })
    .map_err(map_file_io_error)
}

#[pyfunction(name = "write_file_with_parents")]
#[pyo3(signature = (file_path, file_contents = None))]
fn write_file_with_parents_py(
    py: Python<'_>,
    file_path: String,
    file_contents: Option<String>,
) -> PyResult<()> {
    py.allow_threads(|| fileio::write_file_with_parents(&file_path, file_contents.as_deref()))
        .map_err(map_file_io_error)
}

#[pyfunction(name = "append_file")]
fn append_file_py(file_path: &str, file_contents: &str) -> PyResult<()> {
    fileio::append_file(file_path, file_contents).map_err(map_file_io_error)
}

#[pyfunction(name = "create_dir_if_not_exists")]
fn create_dir_if_not_exists_py(py: Python<'_>, dir_path: String) -> PyResult<()> {
    py.allow_threads(|| fileio::create_dir_if_not_exists(&dir_path))
        .map_err(map_file_io_error)
}

#[pyfunction(name = "create_dir_recursive_if_not_exists")]
fn create_dir_recursive_if_not_exists_py(py: Python<'_>, dir_path: String) -> PyResult<()> {
    py.allow_threads(|| fileio::create_dir_recursive_if_not_exists(&dir_path))
        .map_err(map_file_io_error)
}

/// Back `gs://` paths with a fresh in-process object store.
///
/// Returns whether a previously registered client was replaced.
#[pyfunction(name = "use_memory_gcs_client")]
fn use_memory_gcs_client_py() -> bool {
    register_gcs_client(Arc::new(MemoryObjectClient::new())).is_some()
}

/// Drop the registered object-store client. Returns whether one was set.
#[pyfunction(name = "clear_gcs_client")]
fn clear_gcs_client_py() -> bool {
    clear_gcs_client().is_some()
}

/// Install the Rust-side log sink; verbosity defaults to `ZENML_LOGGING_VERBOSITY`.
#[pyfunction(name = "init_logging")]
#[pyo3(signature = (verbosity = None))]
fn init_logging_py(verbosity: Option<&str>) -> PyResult<()> {
    let mut spec_log_options = SpecLogOptions::from_env().map_err(map_log_init_error)?;
    if let Some(verbosity) = verbosity {
        spec_log_options.verbosity = verbosity
            .parse::<EnumLogVerbosity>()
            .map_err(map_log_init_error)?;
    }
    init_logging(&spec_log_options).map_err(map_log_init_error)
}

#[pymodule]
fn _zenkit_io_fs_rs(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyFileStat>()?;
    module.add_function(wrap_pyfunction!(get_scheme_py, module)?)?;
    module.add_function(wrap_pyfunction!(is_remote_py, module)?)?;
    module.add_function(wrap_pyfunction!(is_gcs_path_py, module)?)?;
    module.add_function(wrap_pyfunction!(is_root_py, module)?)?;
    module.add_function(wrap_pyfunction!(read_bytes_py, module)?)?;
    module.add_function(wrap_pyfunction!(write_bytes_py, module)?)?;
    module.add_function(wrap_pyfunction!(copy_py, module)?)?;
    module.add_function(wrap_pyfunction!(exists_py, module)?)?;
    module.add_function(wrap_pyfunction!(glob_py, module)?)?;
    module.add_function(wrap_pyfunction!(isdir_py, module)?)?;
    module.add_function(wrap_pyfunction!(list_dir_py, module)?)?;
    module.add_function(wrap_pyfunction!(makedirs_py, module)?)?;
    module.add_function(wrap_pyfunction!(mkdir_py, module)?)?;
    module.add_function(wrap_pyfunction!(remove_py, module)?)?;
    module.add_function(wrap_pyfunction!(rename_py, module)?)?;
    module.add_function(wrap_pyfunction!(rmtree_py, module)?)?;
    module.add_function(wrap_pyfunction!(stat_py, module)?)?;
    module.add_function(wrap_pyfunction!(walk_py, module)?)?;
    module.add_function(wrap_pyfunction!(find_files_py, module)?)?;
    module.add_function(wrap_pyfunction!(write_file_with_parents_py, module)?)?;
    module.add_function(wrap_pyfunction!(append_file_py, module)?)?;
    module.add_function(wrap_pyfunction!(create_dir_if_not_exists_py, module)?)?;
    module.add_function(wrap_pyfunction!(create_dir_recursive_if_not_exists_py, module)?)?;
    module.add_function(wrap_pyfunction!(use_memory_gcs_client_py, module)?)?;
    module.add_function(wrap_pyfunction!(clear_gcs_client_py, module)?)?;
    module.add_function(wrap_pyfunction!(init_logging_py, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
