//! Helper functions for managing and manipulating the filesystem.

use std::io::ErrorKind;
use std::path::Path;
use std::{fs, io};

use crate::result::ResultEx;

/// Creates a new directory and its parent directories if `all` is specified,
/// but doesn't fail if it already exists.
///
/// # Example
/// ```no_run
/// # use lymbo_stdx::fs::create_dir;
/// create_dir("foo", true)?;
/// create_dir("foo", true)?; // second time doesn't fail
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
pub fn create_dir<P>(path: P, all: bool) -> io::Result<()>
where
    P: AsRef<Path>,
{
    fn inner(path: &Path, all: bool) -> io::Result<()> {
        let res = if all {
            fs::create_dir_all(path)
        } else {
            fs::create_dir(path)
        };
        res.ignore_default(|e| e.kind() == ErrorKind::AlreadyExists)
    }

    inner(path.as_ref(), all)
}

/// Removes a file, but doesn't fail if it doesn't exist.
///
/// # Example
/// ```no_run
/// # use lymbo_stdx::fs::remove_file;
/// remove_file("foo.txt")?;
/// remove_file("foo.txt")?; // second time doesn't fail
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
pub fn remove_file<P>(path: P) -> io::Result<()>
where
    P: AsRef<Path>,
{
    fn inner(path: &Path) -> io::Result<()> {
        std::fs::remove_file(path).ignore_default(|e| e.kind() == ErrorKind::NotFound)
    }

    inner(path.as_ref())
}

/// Atomically writes `content` to `path`.
///
/// The content is first written to a sibling file with a `.tmp-<pid>`
/// suffix, then renamed onto `path`. On POSIX and Windows a rename within
/// the same directory is atomic, so readers of `path` never observe a
/// partially written file: they either see the previous content or the new
/// one in full.
///
/// # Example
/// ```no_run
/// # use lymbo_stdx::fs::atomic_write;
/// atomic_write("report.json", b"{}")?;
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
pub fn atomic_write<P>(path: P, content: impl AsRef<[u8]>) -> io::Result<()>
where
    P: AsRef<Path>,
{
    fn inner(path: &Path, content: &[u8]) -> io::Result<()> {
        let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)
    }

    inner(path.as_ref(), content.as_ref())
}

/// Lists files directly inside `dir` whose name starts with `prefix`.
///
/// Returns an empty vector if `dir` doesn't exist.
pub fn list_with_prefix<P>(dir: P, prefix: &str) -> io::Result<Vec<std::path::PathBuf>>
where
    P: AsRef<Path>,
{
    fn inner(dir: &Path, prefix: &str) -> io::Result<Vec<std::path::PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(prefix)
            {
                matches.push(entry.path());
            }
        }

        Ok(matches)
    }

    inner(dir.as_ref(), prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_dir_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        create_dir(&nested, true).unwrap();
        create_dir(&nested, true).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_remove_file_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();
        remove_file(&file).unwrap();
        remove_file(&file).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.json");
        atomic_write(&file, b"{\"a\":1}").unwrap();
        atomic_write(&file, b"{\"a\":2}").unwrap();
        assert_eq!(std::fs::read(&file).unwrap(), b"{\"a\":2}");

        let leftover: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("tmp-"))
            .collect();
        assert!(leftover.is_empty());
    }

    #[test]
    fn test_list_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lymbo-a.json"), b"").unwrap();
        std::fs::write(dir.path().join("lymbo-b.json"), b"").unwrap();
        std::fs::write(dir.path().join("other.json"), b"").unwrap();

        let found = list_with_prefix(dir.path(), "lymbo-").unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_list_with_prefix_missing_dir() {
        let found = list_with_prefix("/does/not/exist", "lymbo-").unwrap();
        assert!(found.is_empty());
    }
}
