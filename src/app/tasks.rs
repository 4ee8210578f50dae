use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::queue::{JobFn, JobQueue, JobState};
use super::watch::{enqueue_on_change, SourceWatcher};
use crate::config::BundleConfig;
use crate::core::{FileHandler, Transpiler};

/// How the jobs of one run settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
}

/// The bundling job: one full pass of the engine over `config`.
pub fn bundle_job(config: Arc<BundleConfig>, handler: Arc<FileHandler>) -> JobFn {
    Arc::new(move || {
        let config = Arc::clone(&config);
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            handler.bundle(&config).await?;
            Ok(())
        })
    })
}

/// Runs the tool until its work is done: the initial drain, or Ctrl-C in
/// watch mode.
pub async fn run(config: BundleConfig, transpiler: Arc<dyn Transpiler>) -> anyhow::Result<RunSummary> {
    run_until(config, transpiler, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Like [`run`], with an explicit shutdown trigger for watch mode.
pub async fn run_until<S>(
    config: BundleConfig,
    transpiler: Arc<dyn Transpiler>,
    shutdown: S,
) -> anyhow::Result<RunSummary>
where
    S: Future<Output = ()>,
{
    let config = Arc::new(config);
    let work = bundle_job(Arc::clone(&config), Arc::new(FileHandler::new(transpiler)));

    let completed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let queue = JobQueue::new();
    if config.watch {
        queue.reset_on_done();
    }
    {
        let completed = Arc::clone(&completed);
        let failed = Arc::clone(&failed);
        queue.on_finished(move |queue, job| {
            match job.state() {
                JobState::Failed => failed.fetch_add(1, Ordering::SeqCst),
                _ => completed.fetch_add(1, Ordering::SeqCst),
            };
            tracing::info!("{}% done", (queue.percentage() * 100.0).round());
        });
    }

    if config.start || config.watch {
        queue.run_on_new_job();
    }
    if config.start {
        queue.enqueue_job(work.clone());
    } else {
        tracing::info!("Initial run skipped");
    }

    if config.watch {
        let watcher = SourceWatcher::new(&config.source, &config.output)?;
        enqueue_on_change(watcher, queue.clone(), work, shutdown).await;
    }

    queue.drained().await;

    Ok(RunSummary {
        completed: completed.load(Ordering::SeqCst),
        failed: failed.load(Ordering::SeqCst),
    })
}
