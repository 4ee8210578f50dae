use super::{CoreError, Entry, NamePatterns};
use std::path::Path;

/// Walks a source tree and yields its entries in bundling order.
///
/// Every directory level is listed, sorted by name, filtered against the
/// compiled name patterns and then ordered by the explicit `order` list.
/// Sub-directories are spliced in right after their own entry.
pub struct DirectoryScanner {
    patterns: NamePatterns,
    order: Vec<String>,
}

impl DirectoryScanner {
    pub fn new(patterns: NamePatterns, order: Vec<String>) -> Self {
        Self { patterns, order }
    }

    /// Walks `root`, logging (and skipping) anything that cannot be read.
    pub async fn walk(&self, root: &Path) -> Vec<Entry> {
        self.walk_with_errors(root, |e| {
            tracing::warn!("Skipping unreadable entry: {}", e);
        })
        .await
    }

    /// Walks `root`, reporting I/O failures to `on_error`.
    ///
    /// A failing directory only loses its own children; siblings and the
    /// rest of the tree are still visited. Symbolic links are never followed
    /// nor returned. The traversal uses an explicit stack of pending levels,
    /// so deep trees do not grow the call stack.
    pub async fn walk_with_errors<F>(&self, root: &Path, mut on_error: F) -> Vec<Entry>
    where
        F: FnMut(CoreError),
    {
        let mut entries = Vec::new();
        let mut pending: Vec<std::vec::IntoIter<Entry>> = Vec::new();

        match self.read_level(root, &mut on_error).await {
            Ok(level) => pending.push(level.into_iter()),
            Err(e) => {
                on_error(e);
                return entries;
            }
        }

        while let Some(level) = pending.last_mut() {
            let Some(entry) = level.next() else {
                pending.pop();
                continue;
            };

            if entry.is_directory {
                let dir = entry.full_path();
                entries.push(entry);
                match self.read_level(&dir, &mut on_error).await {
                    Ok(children) => pending.push(children.into_iter()),
                    Err(e) => on_error(e),
                }
            } else {
                entries.push(entry);
            }
        }

        tracing::debug!("Walked {} entries under {}", entries.len(), root.display());
        entries
    }

    /// Lists one directory level, already filtered and ordered.
    async fn read_level<F>(&self, dir: &Path, on_error: &mut F) -> Result<Vec<Entry>, CoreError>
    where
        F: FnMut(CoreError),
    {
        let mut read_dir = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| CoreError::io(e, dir))?;

        let mut level = Vec::new();
        loop {
            let dir_entry = match read_dir.next_entry().await {
                Ok(Some(dir_entry)) => dir_entry,
                Ok(None) => break,
                Err(e) => {
                    on_error(CoreError::io(e, dir));
                    break;
                }
            };

            // file_type() does not follow links
            let file_type = match dir_entry.file_type().await {
                Ok(ft) => ft,
                Err(e) => {
                    on_error(CoreError::io(e, dir_entry.path()));
                    continue;
                }
            };

            if file_type.is_symlink() {
                tracing::debug!("Ignoring symbolic link {}", dir_entry.path().display());
                continue;
            }

            level.push(Entry {
                name: dir_entry.file_name().to_string_lossy().into_owned(),
                path: dir.to_path_buf(),
                is_directory: file_type.is_dir(),
                is_file: file_type.is_file(),
            });
        }

        // Listing order is platform dependent; names make it reproducible.
        level.sort_by(|a, b| a.name.cmp(&b.name));

        if !self.patterns.is_empty() {
            level.retain(|entry| !self.patterns.is_match(&entry.name));
        }

        if !self.order.is_empty() {
            level.sort_by_key(|entry| self.order_rank(&entry.name));
        }

        Ok(level)
    }

    /// Last position of `name` in the order list, `-1` when absent.
    fn order_rank(&self, name: &str) -> isize {
        self.order
            .iter()
            .rposition(|n| n == name)
            .map_or(-1, |i| i as isize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::build_name_patterns;
    use std::fs;
    use tempfile::TempDir;

    fn tree(files: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, file).unwrap();
        }
        dir
    }

    fn scanner(ignore: &[&str], order: &[&str]) -> DirectoryScanner {
        let ignore: Vec<String> = ignore.iter().map(|s| s.to_string()).collect();
        DirectoryScanner::new(
            build_name_patterns(&ignore).unwrap(),
            order.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_walk_splices_directories_in_place() {
        let dir = tree(&["a.js", "lib/inner.js", "lib/deep/x.js", "z.js"]);
        let entries = scanner(&[], &[]).walk(dir.path()).await;

        assert_eq!(
            names(&entries),
            vec!["a.js", "lib", "deep", "x.js", "inner.js", "z.js"]
        );
        assert!(entries[1].is_directory);
        assert_eq!(entries[3].path, dir.path().join("lib").join("deep"));
    }

    #[tokio::test]
    async fn test_order_puts_unnamed_entries_first() {
        let dir = tree(&["a.js", "b.js", "c.js", "d.js"]);
        let entries = scanner(&[], &["c.js", "a.js"]).walk(dir.path()).await;

        assert_eq!(names(&entries), vec!["b.js", "d.js", "c.js", "a.js"]);
    }

    #[tokio::test]
    async fn test_order_uses_last_occurrence() {
        let dir = tree(&["a.js", "b.js"]);
        let entries = scanner(&[], &["a.js", "b.js", "a.js"]).walk(dir.path()).await;

        assert_eq!(names(&entries), vec!["b.js", "a.js"]);
    }

    #[tokio::test]
    async fn test_ignored_directory_drops_whole_subtree() {
        let dir = tree(&["keep.js", "node_modules/pkg/index.js", "src/node_modules.js"]);
        let entries = scanner(&["^node_modules$"], &[]).walk(dir.path()).await;

        assert_eq!(names(&entries), vec!["keep.js", "src", "node_modules.js"]);
    }

    #[tokio::test]
    async fn test_missing_root_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut errors = Vec::new();
        let entries = scanner(&[], &[])
            .walk_with_errors(&dir.path().join("missing"), |e| errors.push(e))
            .await;

        assert!(entries.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], CoreError::Io(..)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_are_skipped_entirely() {
        let dir = tree(&["real.js", "sub/file.js"]);
        std::os::unix::fs::symlink(dir.path().join("real.js"), dir.path().join("link.js"))
            .unwrap();
        // A link back to the root would loop forever if followed.
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub").join("loop")).unwrap();

        let entries = scanner(&[], &[]).walk(dir.path()).await;

        assert_eq!(names(&entries), vec!["real.js", "sub", "file.js"]);
    }
}
