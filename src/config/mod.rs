pub mod settings;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_SOURCE: &str = "src";
pub const DEFAULT_OUTPUT_DIR: &str = "dist";
pub const DEFAULT_NAME: &str = "dist.js";

/// Errors raised while assembling a [`BundleConfig`].
///
/// All of them are fatal: no bundling job is started.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Malformed config file {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("Module type {0} requires a module name")]
    MissingModuleName(ModuleType),

    #[error("Unknown module type '{0}' (expected AMD, CommonJS, none, UMD or web)")]
    UnknownModuleType(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Could not determine the working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),
}

/// The wrapper written around the concatenated body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleType {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "web")]
    Web,
    #[serde(rename = "AMD")]
    Amd,
    #[serde(rename = "CommonJS")]
    CommonJs,
    #[serde(rename = "UMD")]
    Umd,
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModuleType::None => "none",
            ModuleType::Web => "web",
            ModuleType::Amd => "AMD",
            ModuleType::CommonJs => "CommonJS",
            ModuleType::Umd => "UMD",
        })
    }
}

impl FromStr for ModuleType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ModuleType::None),
            "web" => Ok(ModuleType::Web),
            "AMD" | "amd" => Ok(ModuleType::Amd),
            "CommonJS" | "commonjs" => Ok(ModuleType::CommonJs),
            "UMD" | "umd" => Ok(ModuleType::Umd),
            other => Err(ConfigError::UnknownModuleType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleConfig {
    pub module_name: String,
    pub module_type: ModuleType,
}

/// One immutable snapshot of everything a bundling run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleConfig {
    /// Root of the tree to bundle.
    pub source: PathBuf,
    /// Absolute path of the produced artifact.
    pub output: PathBuf,
    /// Names (regular expressions) never bundled.
    pub exclude: Vec<String>,
    /// Names (regular expressions) never walked into or bundled.
    pub ignore: Vec<String>,
    /// Explicit name ordering; later names sort later.
    pub order: Vec<String>,
    /// Written, followed by a newline, after every bundled entry.
    pub separator: String,
    pub module_config: ModuleConfig,
    /// `tsconfig.json` handed to the transpiler, if any.
    pub ts_config: Option<PathBuf>,
    /// Bundle once right away.
    pub start: bool,
    /// Keep running and re-bundle on changes.
    pub watch: bool,
}

impl BundleConfig {
    /// A config with every default, rooted at `source` and writing to `output`.
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            exclude: Vec::new(),
            ignore: Vec::new(),
            order: Vec::new(),
            separator: String::new(),
            module_config: ModuleConfig::default(),
            ts_config: None,
            start: true,
            watch: false,
        }
    }

    /// Checks the combinations a partial config cannot express on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ModuleConfig {
            module_name,
            module_type,
        } = &self.module_config;

        if *module_type != ModuleType::None && module_name.trim().is_empty() {
            return Err(ConfigError::MissingModuleName(*module_type));
        }

        for pattern in self.exclude.iter().chain(&self.ignore) {
            regex::Regex::new(pattern)?;
        }

        Ok(())
    }
}

/// Any subset of the bundling options, as supplied by the CLI or a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialConfig {
    pub source: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub name: Option<String>,
    pub exclude: Option<Vec<String>>,
    pub ignore: Option<Vec<String>>,
    pub order: Option<Vec<String>>,
    pub separator: Option<String>,
    pub module_config: Option<ModuleConfig>,
    pub ts_config: Option<PathBuf>,
    pub start: Option<bool>,
    pub watch: Option<bool>,
}

impl PartialConfig {
    /// Fills every option `self` leaves unset from `fallback`.
    pub fn merge(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            source: self.source.or(fallback.source),
            output: self.output.or(fallback.output),
            name: self.name.or(fallback.name),
            exclude: self.exclude.or(fallback.exclude),
            ignore: self.ignore.or(fallback.ignore),
            order: self.order.or(fallback.order),
            separator: self.separator.or(fallback.separator),
            module_config: self.module_config.or(fallback.module_config),
            ts_config: self.ts_config.or(fallback.ts_config),
            start: self.start.or(fallback.start),
            watch: self.watch.or(fallback.watch),
        }
    }

    /// Applies defaults and resolves the output path against `cwd`.
    ///
    /// `ts_config` stays `None` here when unset; discovery happens in
    /// [`settings::resolve_config`].
    pub fn into_bundle_config(self, cwd: &Path) -> Result<BundleConfig, ConfigError> {
        let source = self.source.unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE));
        let output_dir = self
            .output
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let name = self.name.unwrap_or_else(|| DEFAULT_NAME.to_string());

        let config = BundleConfig {
            source: cwd.join(source),
            output: cwd.join(output_dir).join(name),
            exclude: self.exclude.unwrap_or_default(),
            ignore: self.ignore.unwrap_or_default(),
            order: self.order.unwrap_or_default(),
            separator: self.separator.unwrap_or_default(),
            module_config: self.module_config.unwrap_or_default(),
            ts_config: self.ts_config.map(|p| cwd.join(p)),
            start: self.start.unwrap_or(true),
            watch: self.watch.unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve_against_cwd() {
        let config = PartialConfig::default()
            .into_bundle_config(Path::new("/work"))
            .unwrap();

        assert_eq!(config.source, PathBuf::from("/work/src"));
        assert_eq!(config.output, PathBuf::from("/work/dist/dist.js"));
        assert_eq!(config.module_config.module_type, ModuleType::None);
        assert!(config.start);
        assert!(!config.watch);
        assert!(config.separator.is_empty());
    }

    #[test]
    fn test_explicit_values_win_over_fallback() {
        let cli = PartialConfig {
            name: Some("bundle.js".into()),
            order: Some(vec!["b.js".into()]),
            ..Default::default()
        };
        let file = PartialConfig {
            name: Some("ignored.js".into()),
            source: Some("lib".into()),
            order: Some(vec!["a.js".into()]),
            ..Default::default()
        };

        let merged = cli.merge(file);

        assert_eq!(merged.name.as_deref(), Some("bundle.js"));
        assert_eq!(merged.source, Some(PathBuf::from("lib")));
        assert_eq!(merged.order, Some(vec!["b.js".to_string()]));
    }

    #[test]
    fn test_module_type_without_name_is_rejected() {
        let partial = PartialConfig {
            module_config: Some(ModuleConfig {
                module_name: String::new(),
                module_type: ModuleType::Web,
            }),
            ..Default::default()
        };

        assert!(matches!(
            partial.into_bundle_config(Path::new("/work")),
            Err(ConfigError::MissingModuleName(ModuleType::Web))
        ));
    }

    #[test]
    fn test_invalid_exclude_pattern_is_rejected() {
        let partial = PartialConfig {
            exclude: Some(vec!["[".into()]),
            ..Default::default()
        };

        assert!(matches!(
            partial.into_bundle_config(Path::new("/work")),
            Err(ConfigError::Pattern(_))
        ));
    }

    #[test]
    fn test_module_type_parsing() {
        assert_eq!("UMD".parse::<ModuleType>().unwrap(), ModuleType::Umd);
        assert_eq!("commonjs".parse::<ModuleType>().unwrap(), ModuleType::CommonJs);
        assert!("esm".parse::<ModuleType>().is_err());
    }

    #[test]
    fn test_partial_config_reads_camel_case_json() {
        let json = r#"{
            "source": "lib",
            "separator": "//--",
            "moduleConfig": { "moduleName": "app", "moduleType": "web" },
            "tsConfig": "tsconfig.json"
        }"#;

        let partial: PartialConfig = serde_json::from_str(json).unwrap();

        assert_eq!(partial.source, Some(PathBuf::from("lib")));
        assert_eq!(partial.separator.as_deref(), Some("//--"));
        assert_eq!(
            partial.module_config,
            Some(ModuleConfig {
                module_name: "app".into(),
                module_type: ModuleType::Web
            })
        );
        assert_eq!(partial.ts_config, Some(PathBuf::from("tsconfig.json")));
    }
}
