//! The transpilation collaborator used for alternate-source files.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{build_name_patterns, CoreError, DirectoryScanner};

const TS_CONFIG_NAME: &str = "tsconfig.json";

/// Turns alternate-source text (e.g. TypeScript) into plain script text.
#[async_trait]
pub trait Transpiler: Send + Sync {
    /// Whether the toolchain can be used at all. Probed once per run.
    async fn is_available(&self) -> bool;

    /// Transpiles the full text of `path`.
    async fn transpile(&self, source: &str, path: &Path) -> Result<String, CoreError>;
}

/// A transpiler that is never available; alternate sources are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranspiler;

#[async_trait]
impl Transpiler for NoTranspiler {
    async fn is_available(&self) -> bool {
        false
    }

    async fn transpile(&self, _source: &str, path: &Path) -> Result<String, CoreError> {
        Err(CoreError::Transpile(
            path.to_path_buf(),
            "no transpiler configured".to_string(),
        ))
    }
}

/// Runs an external stdin-to-stdout transpiler.
#[derive(Debug, Clone)]
pub struct CommandTranspiler {
    program: String,
    args: Vec<String>,
}

impl CommandTranspiler {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `esbuild` reading TypeScript from stdin and printing CommonJS.
    pub fn esbuild(ts_config: Option<&Path>) -> Self {
        let mut args = vec!["--loader=ts".to_string(), "--format=cjs".to_string()];
        if let Some(ts_config) = ts_config {
            args.push(format!("--tsconfig={}", ts_config.display()));
        }
        Self::new("esbuild", args)
    }
}

#[async_trait]
impl Transpiler for CommandTranspiler {
    async fn is_available(&self) -> bool {
        let available = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false);

        if !available {
            tracing::debug!("Transpiler '{}' is not available", self.program);
        }
        available
    }

    async fn transpile(&self, source: &str, path: &Path) -> Result<String, CoreError> {
        let failed = |reason: String| CoreError::Transpile(path.to_path_buf(), reason);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| failed("stdin was not captured".to_string()))?;

        // stdin is fed while stdout drains, so a full pipe cannot stall either side
        let feed = async move {
            stdin.write_all(source.as_bytes()).await?;
            stdin.shutdown().await
        };
        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            return Err(failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        written.map_err(|e| failed(e.to_string()))?;

        String::from_utf8(output.stdout).map_err(|e| failed(e.to_string()))
    }
}

/// Finds the `tsconfig.json` closest to `root` (shortest path wins).
pub async fn find_ts_config(root: &Path) -> Option<PathBuf> {
    tracing::info!("Looking for TypeScript config");

    let skip = vec!["^node_modules$".to_string(), r"^\.git$".to_string()];
    let patterns = build_name_patterns(&skip).ok()?;

    let found = DirectoryScanner::new(patterns, Vec::new())
        .walk_with_errors(root, |e| tracing::debug!("tsconfig lookup: {}", e))
        .await
        .into_iter()
        .filter(|entry| entry.is_file && entry.name == TS_CONFIG_NAME)
        .map(|entry| entry.full_path())
        .min_by_key(|path| path.as_os_str().len());

    if let Some(path) = &found {
        tracing::info!("Found TypeScript config in {}", path.display());
    }
    found
}
