pub mod error;
pub mod file_handler;
pub mod ignore;
pub mod imports;
pub mod prepend;
pub mod scanner;
pub mod streams;
pub mod transpile;
pub mod wrapper;

use std::path::PathBuf;

/// A single directory listing result, produced by the `scanner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Bare file or directory name.
    pub name: String,
    /// The directory this entry was listed from.
    pub path: PathBuf,
    pub is_directory: bool,
    pub is_file: bool,
}

impl Entry {
    /// Absolute (or root-relative) path of the entry itself.
    pub fn full_path(&self) -> PathBuf {
        self.path.join(&self.name)
    }
}

pub use error::CoreError;
pub use file_handler::{BundleReport, FileHandler};
pub use ignore::{build_name_patterns, NamePatterns};
pub use imports::ImportExtractor;
pub use prepend::Prepender;
pub use scanner::DirectoryScanner;
pub use streams::{LineInspector, LineTransform};
pub use transpile::{CommandTranspiler, Transpiler};
pub use wrapper::ModuleWrapper;
