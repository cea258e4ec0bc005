use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to remove {path:?}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ensures that the specified directory exists, creating it if necessary.
pub fn ensure_dir_exists(path: &Path) -> Result<(), FileError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|source| FileError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

pub fn read_file(path: &Path) -> Result<String, FileError> {
    fs::read_to_string(path).map_err(|source| FileError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `contents` to `folder/name`, creating `folder` first. Returns the
/// written path.
pub fn write_file(folder: &Path, name: &str, contents: &str) -> Result<PathBuf, FileError> {
    ensure_dir_exists(folder)?;
    let path = folder.join(name);
    fs::write(&path, contents).map_err(|source| FileError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Lists every file below `dir`, recursing into sub-directories. A missing
/// directory yields an empty list.
pub fn get_files(dir: &Path) -> Result<Vec<PathBuf>, FileError> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), FileError> {
    if !dir.is_dir() {
        return Ok(());
    }
    let read_err = |source| FileError::Read {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Clears generated output ahead of a run.
///
/// A missing directory is created. Otherwise every file whose path contains
/// `prefix` is removed, or every file when no prefix is given. Returns the
/// number of files removed.
pub fn remove_files_from_dir(dir: &Path, prefix: Option<&str>) -> Result<usize, FileError> {
    if !dir.exists() {
        ensure_dir_exists(dir)?;
        return Ok(0);
    }

    let mut removed = 0;
    for file in get_files(dir)? {
        let matches = match prefix.filter(|p| !p.is_empty()) {
            Some(prefix) => file.to_string_lossy().contains(prefix),
            None => true,
        };
        if matches {
            debug!("remove file: {:?}", file);
            fs::remove_file(&file).map_err(|source| FileError::Remove {
                path: file.clone(),
                source,
            })?;
            removed += 1;
        }
    }
    if removed > 0 {
        info!("Removed {} file(s) from {:?}", removed, dir);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_file_creates_folder() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("output/sample");

        let path = write_file(&folder, "BASIC-001.xml", "<a/>").unwrap();

        assert_eq!(path, folder.join("BASIC-001.xml"));
        assert_eq!(read_file(&path).unwrap(), "<a/>");
    }

    #[test]
    fn test_get_files_is_recursive() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", "a").unwrap();
        write_file(&dir.path().join("nested"), "b.txt", "b").unwrap();

        let files = get_files(dir.path()).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.contains(&dir.path().join("nested/b.txt")));
        assert!(get_files(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_remove_files_with_prefix() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "BASIC-001.xml", "1").unwrap();
        write_file(dir.path(), "BASIC-002.xml", "2").unwrap();
        write_file(dir.path(), "OTHER-001.xml", "3").unwrap();

        let removed = remove_files_from_dir(dir.path(), Some("BASIC-")).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(get_files(dir.path()).unwrap(), vec![dir.path().join("OTHER-001.xml")]);
    }

    #[test]
    fn test_remove_files_creates_missing_dir() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("fresh");

        assert_eq!(remove_files_from_dir(&target, None).unwrap(), 0);
        assert!(target.is_dir());
    }

    #[test]
    fn test_read_missing_file_reports_path() {
        let dir = tempdir().unwrap();
        let err = read_file(&dir.path().join("nope.xml")).unwrap_err();
        assert!(err.to_string().contains("nope.xml"));
    }
}
