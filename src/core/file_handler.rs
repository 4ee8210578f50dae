//! The concatenation engine.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::task::JoinSet;

use super::imports::ImportExtractor;
use super::prepend::prepend_file;
use super::streams::LineTransform;
use super::transpile::Transpiler;
use super::{build_name_patterns, CoreError, DirectoryScanner, ModuleWrapper};
use crate::config::BundleConfig;
use crate::utils::file_detection::{classify, SourceKind};

/// How many times output preparation is attempted before the run fails.
pub const MAX_RETRY: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Outcome of one bundling run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleReport {
    /// Cursor after the closing wrapper, before the header was prepended.
    pub final_offset: u64,
    /// Bytes the hoisted header added (0 when nothing was hoisted).
    pub header_bytes: u64,
    pub entries_bundled: usize,
    pub entries_skipped: usize,
    pub entries_failed: usize,
}

impl BundleReport {
    /// Size of the finished artifact.
    pub fn output_size(&self) -> u64 {
        self.final_offset + self.header_bytes
    }
}

/// One entry's transformed content, spooled to an anonymous temp file so its
/// length is known before an output range is assigned to it.
struct StagedEntry {
    source: PathBuf,
    spool: File,
    len: u64,
}

type EntryTransform = LineTransform<ImportExtractor>;

/// Bundles a source tree into a single output file.
pub struct FileHandler {
    transpiler: Arc<dyn Transpiler>,
}

impl FileHandler {
    pub fn new(transpiler: Arc<dyn Transpiler>) -> Self {
        Self { transpiler }
    }

    /// Runs the whole pipeline for `config`.
    ///
    /// Unreadable or untranspilable entries are logged and contribute nothing;
    /// only a missing source tree or an output that cannot be prepared fails
    /// the run.
    pub async fn bundle(&self, config: &BundleConfig) -> Result<BundleReport, CoreError> {
        let source = tokio::fs::canonicalize(&config.source)
            .await
            .map_err(|e| CoreError::io(e, &config.source))?;
        if !tokio::fs::metadata(&source)
            .await
            .map_err(|e| CoreError::io(e, &source))?
            .is_dir()
        {
            return Err(CoreError::NotADirectory(source));
        }

        tracing::info!("Started preparing output");
        let output = config.output.as_path();
        let dist_size = prepare_output(output).await?;
        let output_identity = tokio::fs::canonicalize(output)
            .await
            .unwrap_or_else(|_| output.to_path_buf());
        tracing::info!("Finished preparing output");

        let walk_patterns = build_name_patterns(config.ignore.iter().chain(&config.exclude))?;
        let exclude = build_name_patterns(&config.exclude)?;
        let entries = DirectoryScanner::new(walk_patterns, config.order.clone())
            .walk(&source)
            .await;

        let wrapper = ModuleWrapper::new(&config.module_config);
        let mut cursor = wrapper.open_module(output, 0).await?;

        tracing::info!("Started piping into output");
        let mut report = BundleReport::default();
        let mut transform = LineTransform::new(ImportExtractor::new());
        let mut transpiler_available: Option<bool> = None;
        let mut writes = JoinSet::new();

        for entry in entries {
            if !entry.is_file {
                continue;
            }

            let path = entry.full_path();
            if path == output_identity || exclude.is_match(&entry.name) {
                report.entries_skipped += 1;
                continue;
            }

            let kind = classify(&path);
            match kind {
                SourceKind::Unsupported => {
                    tracing::debug!("Skipping unsupported file {}", path.display());
                    report.entries_skipped += 1;
                    continue;
                }
                SourceKind::AlternateSource => {
                    let available = match transpiler_available {
                        Some(available) => available,
                        None => {
                            let available = self.transpiler.is_available().await;
                            transpiler_available = Some(available);
                            available
                        }
                    };
                    if !available {
                        tracing::warn!(
                            "No transpiler available, skipping {}",
                            path.display()
                        );
                        report.entries_skipped += 1;
                        continue;
                    }
                }
                SourceKind::Script => {}
            }

            let staged = match self
                .stage_entry(&path, kind, &config.separator, &mut transform)
                .await
            {
                Ok(staged) => staged,
                Err(e) => {
                    tracing::warn!("Failed to bundle {}: {}", path.display(), e);
                    report.entries_failed += 1;
                    continue;
                }
            };

            // The range is claimed before the write is dispatched, so
            // concurrent writes can never overlap.
            let offset = cursor;
            cursor += staged.len;
            writes.spawn(write_staged(output.to_path_buf(), offset, staged));
        }

        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok(Ok(_)) => report.entries_bundled += 1,
                Ok(Err(e)) => {
                    tracing::warn!("Failed to write entry: {}", e);
                    report.entries_failed += 1;
                }
                Err(e) => {
                    tracing::warn!("Entry writer did not finish: {}", e);
                    report.entries_failed += 1;
                }
            }
        }

        if cursor < dist_size {
            truncate(output, cursor).await?;
            tracing::debug!("Truncated stale output from {} to {} bytes", dist_size, cursor);
        }

        cursor = wrapper.close_module(output, cursor).await?;
        report.final_offset = cursor;

        let mut extractor = transform.into_inner();
        extractor.finish();
        let header = extractor.parsed_imports();
        if !header.is_empty() {
            match prepend_file(output, header).await {
                Ok(added) => report.header_bytes = added,
                Err(e) => tracing::warn!(
                    "Failed to hoist imports, output left without header: {}",
                    e
                ),
            }
        }

        tracing::info!(
            "Finished piping into {}: {} bundled, {} skipped, {} failed, {} bytes",
            output.display(),
            report.entries_bundled,
            report.entries_skipped,
            report.entries_failed,
            report.output_size()
        );

        Ok(report)
    }

    /// Streams one entry through the shared extractor into a spool file.
    ///
    /// On failure the extractor forgets everything this entry contributed.
    async fn stage_entry(
        &self,
        path: &Path,
        kind: SourceKind,
        separator: &str,
        transform: &mut EntryTransform,
    ) -> Result<StagedEntry, CoreError> {
        let checkpoint = transform.inspector().checkpoint();

        match self.spool_entry(path, kind, separator, transform).await {
            Ok(staged) => Ok(staged),
            Err(e) => {
                transform.discard_input();
                transform.inspector_mut().rollback(checkpoint);
                Err(e)
            }
        }
    }

    async fn spool_entry(
        &self,
        path: &Path,
        kind: SourceKind,
        separator: &str,
        transform: &mut EntryTransform,
    ) -> Result<StagedEntry, CoreError> {
        let spool = tokio::task::spawn_blocking(tempfile::tempfile)
            .await?
            .map_err(|e| CoreError::io(e, std::env::temp_dir()))?;
        let mut spool = File::from_std(spool);
        let io_err = |e| CoreError::io(e, path);

        let written = match kind {
            SourceKind::AlternateSource => {
                let text = tokio::fs::read_to_string(path).await.map_err(io_err)?;
                let transpiled = self.transpiler.transpile(&text, path).await?;
                transform
                    .pipe(transpiled.as_bytes(), &mut spool)
                    .await
                    .map_err(io_err)?
            }
            _ => {
                let file = File::open(path).await.map_err(io_err)?;
                transform.pipe(file, &mut spool).await.map_err(io_err)?
            }
        };

        spool.write_all(separator.as_bytes()).await.map_err(io_err)?;
        spool.write_all(b"\n").await.map_err(io_err)?;
        spool.flush().await.map_err(io_err)?;
        spool.seek(SeekFrom::Start(0)).await.map_err(io_err)?;

        Ok(StagedEntry {
            source: path.to_path_buf(),
            spool,
            len: written + separator.len() as u64 + 1,
        })
    }
}

/// Opens `path` for writing (never truncating) positioned at `offset`.
pub(crate) async fn open_at(path: &Path, offset: u64) -> Result<File, CoreError> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| CoreError::io(e, path))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|e| CoreError::io(e, path))?;
    Ok(file)
}

async fn write_staged(output: PathBuf, offset: u64, mut staged: StagedEntry) -> Result<u64, CoreError> {
    let mut file = open_at(&output, offset).await?;
    let copied = tokio::io::copy(&mut staged.spool, &mut file)
        .await
        .map_err(|e| CoreError::io(e, &staged.source))?;
    file.flush().await.map_err(|e| CoreError::io(e, &output))?;

    if copied != staged.len {
        tracing::warn!(
            "Wrote {} of {} bytes for {}",
            copied,
            staged.len,
            staged.source.display()
        );
    }
    tracing::debug!(
        "Wrote {} at [{}, {})",
        staged.source.display(),
        offset,
        offset + copied
    );
    Ok(copied)
}

/// Makes sure the output file (and its directory) exist, returning its
/// current size.
async fn prepare_output(output: &Path) -> Result<u64, CoreError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_prepare_output(output).await {
            Ok(size) => return Ok(size),
            Err(e) if attempt < MAX_RETRY => {
                tracing::warn!(
                    "Could not prepare {} (attempt {}/{}): {}",
                    output.display(),
                    attempt,
                    MAX_RETRY,
                    e
                );
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }
            Err(e) => {
                return Err(CoreError::OutputUnavailable {
                    path: output.to_path_buf(),
                    attempts: attempt,
                    source: e,
                })
            }
        }
    }
}

async fn try_prepare_output(output: &Path) -> std::io::Result<u64> {
    if let Some(dir) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            tracing::info!("Missing output folder, creating {}", dir.display());
            tokio::fs::create_dir_all(dir).await?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output)
        .await?;
    Ok(file.metadata().await?.len())
}

async fn truncate(path: &Path, len: u64) -> Result<(), CoreError> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| CoreError::io(e, path))?;
    file.set_len(len).await.map_err(|e| CoreError::io(e, path))
}
