use clap::Parser;
use std::path::PathBuf;

use crate::config::settings::ConfigLocation;
use crate::config::{ModuleConfig, ModuleType, PartialConfig};

/// Concatenate a source tree into one distributable file.
#[derive(Parser, Debug)]
#[clap(
    name = "distribute",
    version,
    about = "Concatenate a source tree into a single file, hoisting require() imports"
)]
pub struct Cli {
    /// Source directory to bundle [default: src]
    #[clap(short = 'i', long)]
    pub source: Option<PathBuf>,

    /// Output directory [default: dist]
    #[clap(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Output file name [default: dist.js]
    #[clap(short = 'n', long)]
    pub name: Option<String>,

    /// Config file to load, or `auto` to search for a distrc file
    #[clap(short = 'c', long, default_value = "auto")]
    pub config: String,

    /// Name pattern never bundled (repeatable)
    #[clap(short = 'E', long, num_args = 1..)]
    pub exclude: Option<Vec<String>>,

    /// Name pattern never walked into or bundled (repeatable)
    #[clap(long, num_args = 1..)]
    pub ignore: Option<Vec<String>>,

    /// Names to bundle in this order (repeatable)
    #[clap(short = 'O', long, num_args = 1..)]
    pub order: Option<Vec<String>>,

    /// Text written after every bundled file
    #[clap(short = 'S', long)]
    pub separator: Option<String>,

    /// Module wrapper: AMD, CommonJS, none, UMD or web
    #[clap(short = 'M', long)]
    pub module_type: Option<ModuleType>,

    /// Module name, required by every wrapper but `none`
    #[clap(short = 'N', long)]
    pub module_name: Option<String>,

    /// tsconfig.json passed to the transpiler [default: closest one found]
    #[clap(short = 't', long)]
    pub ts_config: Option<PathBuf>,

    /// Bundle once right away
    #[clap(short = 's', long, num_args = 0..=1, default_missing_value = "true")]
    pub start: Option<bool>,

    /// Keep running and re-bundle whenever the source changes
    #[clap(short = 'w', long, num_args = 0..=1, default_missing_value = "true")]
    pub watch: Option<bool>,

    /// Log per-entry detail
    #[clap(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn config_location(&self) -> ConfigLocation {
        ConfigLocation::from(self.config.as_str())
    }

    /// The options given explicitly on the command line.
    pub fn to_partial_config(&self) -> PartialConfig {
        let module_config = match (&self.module_type, &self.module_name) {
            (None, None) => None,
            (module_type, module_name) => Some(ModuleConfig {
                module_name: module_name.clone().unwrap_or_default(),
                module_type: module_type.unwrap_or_default(),
            }),
        };

        PartialConfig {
            source: self.source.clone(),
            output: self.output.clone(),
            name: self.name.clone(),
            exclude: self.exclude.clone(),
            ignore: self.ignore.clone(),
            order: self.order.clone(),
            separator: self.separator.clone(),
            module_config,
            ts_config: self.ts_config.clone(),
            start: self.start,
            watch: self.watch,
        }
    }
}
