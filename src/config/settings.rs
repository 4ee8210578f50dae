use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::{BundleConfig, ConfigError, PartialConfig};
use crate::core::{build_name_patterns, transpile::find_ts_config, DirectoryScanner};

static CONFIG_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.*distrc\.*js\w*$").expect("config file name pattern is valid")
});

const SKIPPED_DIRS: &[&str] = &["^node_modules$", r"^\.git$"];

/// Where the config file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Search the working directory tree for a `distrc` file.
    Auto,
    /// Load exactly this file.
    File(PathBuf),
}

impl From<&str> for ConfigLocation {
    fn from(value: &str) -> Self {
        match value {
            "" | "auto" => ConfigLocation::Auto,
            path => ConfigLocation::File(PathBuf::from(path)),
        }
    }
}

/// Whether `name` looks like a config file (`.distrc.json`, `distrc.js`, ...).
pub fn is_config_file_name(name: &str) -> bool {
    CONFIG_FILE_NAME.is_match(name)
}

/// Finds the shallowest config file under `root`; ties go to walk order.
pub async fn find_config(root: &Path) -> Option<PathBuf> {
    let skip: Vec<String> = SKIPPED_DIRS.iter().map(|s| s.to_string()).collect();
    let patterns = build_name_patterns(&skip).ok()?;

    DirectoryScanner::new(patterns, Vec::new())
        .walk_with_errors(root, |e| tracing::debug!("Config lookup: {}", e))
        .await
        .into_iter()
        .filter(|entry| entry.is_file && is_config_file_name(&entry.name))
        .map(|entry| entry.full_path())
        .min_by_key(|path| path.components().count())
}

/// Reads and parses a JSON config file.
pub async fn load_config_file(path: &Path) -> Result<PartialConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;

    let config = serde_json::from_str::<PartialConfig>(&content)
        .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;

    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Builds the run's [`BundleConfig`]: `cli` values win over the config
/// file, which wins over defaults.
///
/// Without an explicit `tsConfig`, the `tsconfig.json` closest to `cwd` is
/// used when one exists.
pub async fn resolve_config(
    cli: PartialConfig,
    location: &ConfigLocation,
    cwd: &Path,
) -> Result<BundleConfig, ConfigError> {
    let file_config = match location {
        ConfigLocation::Auto => match find_config(cwd).await {
            Some(path) => load_config_file(&path).await?,
            None => {
                tracing::debug!("No config file found under {}", cwd.display());
                PartialConfig::default()
            }
        },
        ConfigLocation::File(path) => load_config_file(&cwd.join(path)).await?,
    };

    let mut config = cli.merge(file_config).into_bundle_config(cwd)?;
    if config.ts_config.is_none() {
        config.ts_config = find_ts_config(cwd).await;
    }

    tracing::debug!("Resolved config: {:?}", config);
    Ok(config)
}
