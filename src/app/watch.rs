//! Filesystem watching for the source tree.
//!
//! Every relevant change event becomes exactly one more bundling job. Events
//! are not debounced: a burst of changes produces a backlog of runs that the
//! queue works through one at a time.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use super::queue::{JobFn, JobQueue};
use crate::core::prepend::TEMP_PREFIX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Changed,
    Renamed,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Created => "created",
            ChangeKind::Changed => "changed",
            ChangeKind::Renamed => "renamed",
            ChangeKind::Removed => "removed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceChange {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl SourceChange {
    /// Maps a raw notify event; `None` for events that never affect the bundle.
    pub fn from_event(event: &Event, filter: &ChangeFilter) -> Option<Self> {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(notify::event::ModifyKind::Name(_)) => ChangeKind::Renamed,
            EventKind::Modify(_) => ChangeKind::Changed,
            EventKind::Remove(_) => ChangeKind::Removed,
            _ => return None,
        };

        let path = event.paths.iter().find(|p| filter.is_relevant(p))?;
        Some(Self {
            kind,
            path: path.clone(),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Drops events caused by the bundler itself: writes to the output artifact
/// and the temporary files of the header rewrite.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    output: PathBuf,
    output_dir: Option<PathBuf>,
}

impl ChangeFilter {
    pub fn new(output: &Path) -> Self {
        let output_dir = output.parent().and_then(|dir| dir.canonicalize().ok());
        Self {
            output: output.to_path_buf(),
            output_dir,
        }
    }

    pub fn is_relevant(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return true;
        };

        if name.to_string_lossy().starts_with(TEMP_PREFIX) {
            return false;
        }

        !self.is_output(path)
    }

    fn is_output(&self, path: &Path) -> bool {
        if path == self.output {
            return true;
        }
        if path.file_name() != self.output.file_name() {
            return false;
        }

        // Same name: compare directories, which may be spelled differently
        let parent = path.parent().and_then(|dir| dir.canonicalize().ok());
        match (&parent, &self.output_dir) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// A recursive watcher on the source root, delivering changes on a channel.
pub struct SourceWatcher {
    // Dropping the watcher stops the notifications
    _watcher: RecommendedWatcher,
    changes: mpsc::UnboundedReceiver<SourceChange>,
}

impl SourceWatcher {
    pub fn new(source: &Path, output: &Path) -> notify::Result<Self> {
        let (tx, changes) = mpsc::unbounded_channel();
        let filter = ChangeFilter::new(output);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Some(change) = SourceChange::from_event(&event, &filter) {
                    let _ = tx.send(change);
                }
            }
            Err(e) => tracing::warn!("Watch error: {}", e),
        })?;
        watcher.watch(source, RecursiveMode::Recursive)?;

        tracing::info!("Watching {} for changes", source.display());
        Ok(Self {
            _watcher: watcher,
            changes,
        })
    }

    pub async fn next_change(&mut self) -> Option<SourceChange> {
        self.changes.recv().await
    }
}

/// Enqueues `work` once per source change until `shutdown` resolves.
///
/// Returns the number of jobs enqueued.
pub async fn enqueue_on_change<S>(
    mut watcher: SourceWatcher,
    queue: JobQueue,
    work: JobFn,
    shutdown: S,
) -> usize
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut enqueued = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            change = watcher.next_change() => {
                let Some(change) = change else { break };
                tracing::info!("Source file {} {}", change.file_name(), change.kind);
                queue.enqueue_job(work.clone());
                enqueued += 1;
            }
        }
    }

    tracing::info!("Stopped watching");
    enqueued
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RenameMode};

    fn event(kind: EventKind, path: &Path) -> Event {
        Event::new(kind).add_path(path.to_path_buf())
    }

    #[test]
    fn test_event_kinds() {
        let filter = ChangeFilter::new(Path::new("/out/dist.js"));
        let path = Path::new("/src/a.js");

        let created = SourceChange::from_event(&event(EventKind::Create(CreateKind::File), path), &filter);
        assert_eq!(created.unwrap().kind, ChangeKind::Created);

        let renamed = SourceChange::from_event(
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::Any)), path),
            &filter,
        );
        assert_eq!(renamed.unwrap().kind, ChangeKind::Renamed);

        let access = SourceChange::from_event(
            &event(EventKind::Access(notify::event::AccessKind::Any), path),
            &filter,
        );
        assert!(access.is_none());
    }

    #[test]
    fn test_output_and_temp_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("dist.js");
        let filter = ChangeFilter::new(&output);

        assert!(!filter.is_relevant(&output));
        assert!(!filter.is_relevant(&dir.path().join(".distribute-x1y2.tmp")));
        assert!(filter.is_relevant(&dir.path().join("a.js")));
        // same name elsewhere is a real source file
        assert!(filter.is_relevant(&dir.path().join("lib").join("dist.js")));
    }

    #[test]
    fn test_change_display() {
        let change = SourceChange {
            kind: ChangeKind::Changed,
            path: PathBuf::from("/src/lib/a.js"),
        };
        assert_eq!(format!("Source file {} {}", change.file_name(), change.kind), "Source file a.js changed");
    }

    #[tokio::test]
    async fn test_changes_enqueue_jobs_until_shutdown() {
        let source = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let watcher = SourceWatcher::new(source.path(), &out.path().join("dist.js")).unwrap();

        let queue = JobQueue::new();
        let work: JobFn = std::sync::Arc::new(|| Box::pin(async { Ok(()) }));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(enqueue_on_change(watcher, queue.clone(), work, async {
            let _ = stop_rx.await;
        }));

        // give the backend a moment to register before touching the tree
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        std::fs::write(source.path().join("a.js"), "let a;\n").unwrap();

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while queue.size() == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        stop_tx.send(()).unwrap();
        let enqueued = handle.await.unwrap();
        assert!(enqueued >= 1);
        assert_eq!(queue.size(), enqueued);
    }
}
