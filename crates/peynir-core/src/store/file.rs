use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{normalize_group, validate_group, validate_key, CacheEntry, KeyValueStore, StorageError};

/// Directory holding ungrouped JSON documents.
const DOCUMENTS_DIR: &str = "documents";

/// Directory holding one sub-directory per blob group.
const GROUPS_DIR: &str = "groups";

const TEMP_SUFFIX: &str = ".tmp";

/// Filesystem-backed store.
///
/// Layout under the root directory:
///
/// ```text
/// documents/categories.json
/// documents/c/42.json
/// groups/avatars/avatar_alice_45.png
/// groups/snapshots/123@320.0.png
/// ```
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn component_dir(&self, group: Option<&str>) -> Result<PathBuf, StorageError> {
        match normalize_group(group) {
            Some(group) => {
                validate_group(group)?;
                Ok(self.root.join(GROUPS_DIR).join(group))
            }
            None => Ok(self.root.join(DOCUMENTS_DIR)),
        }
    }

    fn entry_path(&self, key: &str, group: Option<&str>) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.component_dir(group)?.join(key))
    }

    /// Remove every child of `dir`, tallying successes and failures.
    fn remove_children(dir: &Path, tally: &mut DeleteTally) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                tally.fail(dir, e);
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tally.fail(dir, e);
                    continue;
                }
            };
            let path = entry.path();
            let removed = match entry.file_type() {
                Ok(t) if t.is_dir() => fs::remove_dir_all(&path),
                _ => fs::remove_file(&path),
            };
            match removed {
                Ok(()) => tally.removed += 1,
                // Already gone, e.g. a concurrent clear
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tally.fail(&path, e),
            }
        }
    }
}

/// Write to a sibling temp file and rename it over the destination.
pub(crate) fn write_atomic(path: &Path, payload: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "entry has no parent"))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    fs::create_dir_all(parent)?;
    let tmp = parent.join(format!(
        ".{}.{:016x}{}",
        file_name,
        rand::random::<u64>(),
        TEMP_SUFFIX
    ));

    let written = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(payload)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

#[derive(Default)]
struct DeleteTally {
    removed: usize,
    failed: usize,
    first_error: Option<io::Error>,
}

impl DeleteTally {
    fn fail(&mut self, path: &Path, error: io::Error) {
        warn!(path = %path.display(), error = %error, "Failed to delete cache entry");
        self.failed += 1;
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }

    fn finish(self) -> Result<(), StorageError> {
        if self.failed > 0 && self.removed == 0 {
            return Err(self
                .first_error
                .map(StorageError::Io)
                .unwrap_or_else(|| StorageError::Other("cache deletion failed".to_string())));
        }
        if self.failed > 0 {
            debug!(removed = self.removed, failed = self.failed, "Cache partially cleared");
        }
        Ok(())
    }
}

/// Recursive size of a directory. A missing directory measures zero and
/// unreadable children are skipped.
fn dir_size(dir: &Path) -> io::Result<u64> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut total = 0;
    for entry in entries.flatten() {
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "Skipping unreadable cache entry");
                continue;
            }
        };
        if metadata.is_dir() {
            match dir_size(&entry.path()) {
                Ok(size) => total += size,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "Skipping unreadable cache directory");
                }
            }
        } else {
            total += metadata.len();
        }
    }
    Ok(total)
}

impl KeyValueStore for FileStore {
    fn put(&self, key: &str, group: Option<&str>, payload: &[u8]) -> Result<(), StorageError> {
        let path = self.entry_path(key, group)?;

        // A concurrent clear can remove the parent directory between
        // creating it and renaming into it; one retry covers that window.
        match write_atomic(&path, payload) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(key = key, "Cache directory vanished during write, retrying");
                write_atomic(&path, payload)?;
            }
            other => other?,
        }

        debug!(key = key, group = ?group, bytes = payload.len(), "Cache entry written");
        Ok(())
    }

    fn get_entry(&self, key: &str, group: Option<&str>) -> Result<CacheEntry, StorageError> {
        let path = self.entry_path(key, group)?;

        let payload = match fs::read(&path) {
            Ok(payload) => payload,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let written_at = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(CacheEntry {
            key: key.to_string(),
            group: normalize_group(group).map(str::to_string),
            payload,
            written_at,
        })
    }

    fn delete_all(&self, group: Option<&str>) -> Result<(), StorageError> {
        let mut tally = DeleteTally::default();
        match normalize_group(group) {
            Some(_) => {
                let dir = self.component_dir(group)?;
                Self::remove_children(&dir, &mut tally);
                // Drop the emptied directory so the group stops being listed.
                // A put racing this removal retries after NotFound.
                if tally.failed == 0 {
                    let _ = fs::remove_dir(&dir);
                }
            }
            None => {
                Self::remove_children(&self.root.join(DOCUMENTS_DIR), &mut tally);
                Self::remove_children(&self.root.join(GROUPS_DIR), &mut tally);
            }
        }
        tally.finish()
    }

    fn component_size_bytes(&self, group: Option<&str>) -> Result<u64, StorageError> {
        Ok(dir_size(&self.component_dir(group)?)?)
    }

    fn groups(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(self.root.join(GROUPS_DIR)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut groups: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        groups.sort();
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cache")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_then_get() {
        let (_dir, store) = store();
        store.put("c/42.json", None, b"{\"a\":1}").unwrap();
        assert_eq!(store.get("c/42.json", None).unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.get("categories.json", None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let (_dir, store) = store();
        store.put("t/7.json", None, b"first").unwrap();
        store.put("t/7.json", None, b"second").unwrap();
        store.put("t/7.json", None, b"second").unwrap();
        assert_eq!(store.get("t/7.json", None).unwrap(), b"second");
    }

    #[test]
    fn test_groups_are_separate_namespaces() {
        let (_dir, store) = store();
        store.put("a.png", None, b"doc").unwrap();
        store.put("a.png", Some("avatars"), b"blob").unwrap();
        assert_eq!(store.get("a.png", None).unwrap(), b"doc");
        assert_eq!(store.get("a.png", Some("avatars")).unwrap(), b"blob");
        assert_eq!(store.groups().unwrap(), vec!["avatars".to_string()]);
    }

    #[test]
    fn test_blank_group_is_ungrouped() {
        let (_dir, store) = store();
        store.put("categories.json", Some(" "), b"[]").unwrap();
        assert_eq!(store.get("categories.json", None).unwrap(), b"[]");
    }

    #[test]
    fn test_rejects_template_keys() {
        let (_dir, store) = store();
        let err = store.put("c/{categoryId}.json", None, b"x").unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[test]
    fn test_delete_all_scoped_to_group() {
        let (_dir, store) = store();
        store.put("categories.json", None, b"[]").unwrap();
        store.put("1@320.0.png", Some("snapshots"), b"png").unwrap();
        store.put("avatar_bob_45.png", Some("avatars"), b"png").unwrap();

        store.delete_all(Some("snapshots")).unwrap();

        assert!(store.get("1@320.0.png", Some("snapshots")).unwrap_err().is_not_found());
        assert!(store.get("avatar_bob_45.png", Some("avatars")).is_ok());
        assert!(store.get("categories.json", None).is_ok());
        assert_eq!(store.groups().unwrap(), vec!["avatars".to_string()]);

        store.put("2@320.0.png", Some("snapshots"), b"png").unwrap();
        assert_eq!(store.get("2@320.0.png", Some("snapshots")).unwrap(), b"png");
    }

    #[test]
    fn test_delete_all_tolerates_partial_failure() {
        let (dir, store) = store();
        store.put("avatar_bob_45.png", Some("avatars"), b"png").unwrap();
        // A plain file where the documents directory belongs cannot be listed.
        fs::write(dir.path().join("cache").join(DOCUMENTS_DIR), b"not a dir").unwrap();

        store.delete_all(None).unwrap();
        assert!(store.get("avatar_bob_45.png", Some("avatars")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_all_fails_when_nothing_was_removed() {
        let (dir, store) = store();
        fs::write(dir.path().join("cache").join(DOCUMENTS_DIR), b"not a dir").unwrap();

        let err = store.delete_all(None).unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn test_delete_tally_outcomes() {
        let denied = || io::Error::new(io::ErrorKind::PermissionDenied, "denied");

        assert!(DeleteTally::default().finish().is_ok());

        let mut partial = DeleteTally {
            removed: 1,
            ..Default::default()
        };
        partial.fail(Path::new("a.png"), denied());
        assert!(partial.finish().is_ok());

        let mut failed = DeleteTally::default();
        failed.fail(Path::new("a.png"), denied());
        failed.fail(Path::new("b.png"), io::Error::new(io::ErrorKind::Other, "busy"));
        match failed.finish() {
            Err(StorageError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("expected the first error, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_all_everything() {
        let (_dir, store) = store();
        store.put("categories.json", None, b"[]").unwrap();
        store.put("c/1.json", None, b"{}").unwrap();
        store.put("avatar_bob_45.png", Some("avatars"), b"png").unwrap();

        store.delete_all(None).unwrap();

        assert!(store.get("categories.json", None).unwrap_err().is_not_found());
        assert!(store.get("c/1.json", None).unwrap_err().is_not_found());
        assert!(store.get("avatar_bob_45.png", Some("avatars")).unwrap_err().is_not_found());
        assert!(store.groups().unwrap().is_empty());
    }

    #[test]
    fn test_delete_all_on_empty_store_succeeds() {
        let (_dir, store) = store();
        store.delete_all(None).unwrap();
        store.delete_all(Some("avatars")).unwrap();
    }

    #[test]
    fn test_sizes() {
        let (_dir, store) = store();
        assert_eq!(store.total_size_bytes().unwrap(), 0);

        store.put("categories.json", None, &[0; 100]).unwrap();
        store.put("c/1.json", None, &[0; 50]).unwrap();
        store.put("avatar_bob_45.png", Some("avatars"), &[0; 25]).unwrap();

        assert_eq!(store.component_size_bytes(None).unwrap(), 150);
        assert_eq!(store.component_size_bytes(Some("avatars")).unwrap(), 25);
        assert!(store.total_size_bytes().unwrap() >= 175);

        store.delete_all(None).unwrap();
        assert_eq!(store.total_size_bytes().unwrap(), 0);
    }

    #[test]
    fn test_written_at_is_recent() {
        let (_dir, store) = store();
        store.put("categories.json", None, b"[]").unwrap();
        let entry = store.get_entry("categories.json", None).unwrap();
        assert!((Utc::now() - entry.written_at).num_minutes() < 1);
    }

    #[test]
    fn test_concurrent_writers_never_tear() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let a = vec![b'a'; 64 * 1024];
        let b = vec![b'b'; 64 * 1024];

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let payload = if i % 2 == 0 { a.clone() } else { b.clone() };
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        store.put("t/7.json", None, &payload).unwrap();
                        let read = store.get("t/7.json", None).unwrap();
                        assert!(read.iter().all(|&c| c == read[0]));
                        assert_eq!(read.len(), 64 * 1024);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
