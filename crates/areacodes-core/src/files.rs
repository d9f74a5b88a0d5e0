//! Directory listing and line-by-line reading.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{AreaError, Result};

/// Regular files directly inside `dir`, sorted by path.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| AreaError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| AreaError::io(dir, e))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Like [`list_files`], but a missing `dir` has no files.
pub fn list_files_if_present(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "directory not found, treated as empty");
        return Ok(Vec::new());
    }
    list_files(dir)
}

/// File stem as UTF-8, for naming files in diagnostics and parsing years.
pub fn file_stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AreaError::InvalidFileStem(path.display().to_string()))
}

/// File name as shown in error messages.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Call `f` with each line's 1-based number and text, line ending stripped.
///
/// Stops at the first error returned by `f`.
pub fn for_each_line(path: &Path, mut f: impl FnMut(usize, &str) -> Result<()>) -> Result<()> {
    let file = File::open(path).map_err(|e| AreaError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = String::with_capacity(64);

    let mut line_no = 0;
    loop {
        buf.clear();
        let read = reader
            .read_line(&mut buf)
            .map_err(|e| AreaError::io(path, e))?;
        if read == 0 {
            return Ok(());
        }
        line_no += 1;

        let mut line = buf.strip_suffix('\n').unwrap_or(&buf);
        line = line.strip_suffix('\r').unwrap_or(line);
        f(line_no, line)?;
    }
}
