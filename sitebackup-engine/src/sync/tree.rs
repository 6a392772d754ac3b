//! Recursive, cancellable download of a remote directory tree.
//!
//! The walk is depth-first. Failures are isolated: a directory that cannot be
//! listed contributes nothing but its siblings are still walked, and a file
//! that cannot be fetched is skipped. Cancellation is checked before listing
//! each directory and before each entry, so a large subtree stops between
//! files rather than at the next directory boundary.

use crate::remote::session::child_path;
use crate::remote::RemoteSource;
use crate::utils::errors::EngineError;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Counts accumulated over one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncTotals {
    pub files_count: u64,
    pub total_bytes: u64,
}

/// Receives per-file progress and the errors the walk absorbs.
pub trait SyncObserver {
    fn on_file(&mut self, path: &str, bytes: u64, totals: &SyncTotals);

    fn on_error(&mut self, path: &str, error: &EngineError);
}

/// Mirror `remote_root` under `local_root`. `local_root` must already exist.
///
/// Returns the counts gathered so far when cancelled; cancellation is not an
/// error here, callers inspect the token.
pub fn sync_tree(
    source: &mut dyn RemoteSource,
    remote_root: &str,
    local_root: &Path,
    cancel: &CancellationToken,
    observer: &mut dyn SyncObserver,
) -> SyncTotals {
    let mut totals = SyncTotals::default();
    walk(source, remote_root, local_root, cancel, observer, &mut totals);
    totals
}

fn walk(
    source: &mut dyn RemoteSource,
    remote_dir: &str,
    local_dir: &Path,
    cancel: &CancellationToken,
    observer: &mut dyn SyncObserver,
    totals: &mut SyncTotals,
) {
    if cancel.is_cancelled() {
        return;
    }

    let entries = match source.list_entries(remote_dir) {
        Ok(entries) => entries,
        Err(e) => {
            observer.on_error(remote_dir, &e);
            return;
        }
    };

    for entry in entries {
        if cancel.is_cancelled() {
            return;
        }

        let remote_child = child_path(remote_dir, &entry.name);
        if !is_plain_name(&entry.name) {
            observer.on_error(
                &remote_child,
                &EngineError::fetch(&remote_child, "refusing entry name outside the staging tree"),
            );
            continue;
        }
        let local_child = local_dir.join(&entry.name);

        if entry.is_dir {
            if let Err(e) = std::fs::create_dir_all(&local_child) {
                observer.on_error(&remote_child, &EngineError::listing(&remote_child, e));
                continue;
            }
            walk(source, &remote_child, &local_child, cancel, observer, totals);
        } else {
            match source.fetch(&remote_child, &local_child) {
                Ok(bytes) => {
                    totals.files_count += 1;
                    totals.total_bytes += bytes;
                    observer.on_file(&remote_child, bytes, totals);
                }
                Err(e) => observer.on_error(&remote_child, &e),
            }
        }
    }
}

/// A single path component that cannot escape the local mirror.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryTree;
    use crate::remote::RemoteEntry;
    use crate::utils::errors::Result;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        files: Vec<String>,
        errors: Vec<String>,
    }

    impl SyncObserver for Recorder {
        fn on_file(&mut self, path: &str, _bytes: u64, _totals: &SyncTotals) {
            self.files.push(path.to_string());
        }

        fn on_error(&mut self, path: &str, _error: &EngineError) {
            self.errors.push(path.to_string());
        }
    }

    fn site() -> MemoryTree {
        MemoryTree::new()
            .file("index.php", b"<?php")
            .file("wp-config.php", b"define();")
            .file("robots.txt", b"User-agent: *")
            .file("wp-content/uploads/a.jpg", b"jpegdata")
            .file("wp-content/themes/style.css", b"body{}")
    }

    #[test]
    fn test_sync_mirrors_tree() {
        let temp_dir = TempDir::new().unwrap();
        let mut tree = site();
        let mut recorder = Recorder::default();

        let totals = sync_tree(&mut tree, ".", temp_dir.path(), &CancellationToken::new(), &mut recorder);

        assert_eq!(totals.files_count, 5);
        assert_eq!(totals.total_bytes, site().total_bytes());
        assert!(temp_dir.path().join("wp-content/uploads/a.jpg").is_file());
        assert!(recorder.files.contains(&"wp-content/themes/style.css".to_string()));
        assert!(recorder.errors.is_empty());
    }

    #[test]
    fn test_unreadable_subtree_does_not_stop_siblings() {
        let temp_dir = TempDir::new().unwrap();
        let mut tree = MemoryTree::new()
            .file("alpha/one.txt", b"1")
            .file("alpha/two.txt", b"22")
            .file("beta/three.txt", b"333")
            .file("gamma/four.txt", b"4444")
            .unreadable_dir("beta");
        let mut recorder = Recorder::default();

        let totals = sync_tree(&mut tree, ".", temp_dir.path(), &CancellationToken::new(), &mut recorder);

        assert_eq!(totals.files_count, 3);
        assert_eq!(recorder.errors, vec!["beta".to_string()]);
        assert!(temp_dir.path().join("gamma/four.txt").exists());
        assert!(!temp_dir.path().join("beta/three.txt").exists());
    }

    #[test]
    fn test_unfetchable_file_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let mut tree = site().unreadable_file("wp-config.php");
        let mut recorder = Recorder::default();

        let totals = sync_tree(&mut tree, ".", temp_dir.path(), &CancellationToken::new(), &mut recorder);

        assert_eq!(totals.files_count, 4);
        assert_eq!(recorder.errors, vec!["wp-config.php".to_string()]);
    }

    #[test]
    fn test_cancel_before_start_fetches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut tree = site();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let totals = sync_tree(&mut tree, ".", temp_dir.path(), &cancel, &mut Recorder::default());

        assert_eq!(totals, SyncTotals::default());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_cancel_is_observed_between_files() {
        let temp_dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let mut tree = site().cancel_after(2, cancel.clone());

        let totals = sync_tree(&mut tree, ".", temp_dir.path(), &cancel, &mut Recorder::default());

        assert_eq!(totals.files_count, 2);
    }

    #[test]
    fn test_nested_root_builds_full_remote_paths() {
        let temp_dir = TempDir::new().unwrap();
        let mut tree = MemoryTree::new().file("public_html/blog/post.html", b"<p>");
        let mut recorder = Recorder::default();

        sync_tree(&mut tree, "public_html", temp_dir.path(), &CancellationToken::new(), &mut recorder);

        assert_eq!(recorder.files, vec!["public_html/blog/post.html".to_string()]);
        assert!(temp_dir.path().join("blog/post.html").is_file());
    }

    struct HostileSource;

    impl RemoteSource for HostileSource {
        fn connect(&mut self) -> Result<crate::remote::Handshake> {
            Ok(crate::remote::Handshake::Tree)
        }

        fn list_entries(&mut self, _path: &str) -> Result<Vec<RemoteEntry>> {
            Ok(vec![RemoteEntry::file("../escape.txt", 3), RemoteEntry::dir("..")])
        }

        fn fetch(&mut self, remote: &str, _local: &Path) -> Result<u64> {
            panic!("fetch must not be called for {}", remote);
        }

        fn close(&mut self) {}
    }

    #[test]
    fn test_path_escaping_names_are_refused() {
        let temp_dir = TempDir::new().unwrap();
        let mut recorder = Recorder::default();

        let totals = sync_tree(&mut HostileSource, ".", temp_dir.path(), &CancellationToken::new(), &mut recorder);

        assert_eq!(totals.files_count, 0);
        assert_eq!(recorder.errors.len(), 2);
    }
}
