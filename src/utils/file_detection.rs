use std::path::Path;

/// Extensions that are bundled verbatim.
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];

/// Extensions that need the transpiler first.
const ALTERNATE_SOURCE_EXTENSIONS: &[&str] = &["ts", "mts", "cts", "tsx"];

/// How the bundler treats a file, judged by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Plain script, piped through as-is.
    Script,
    /// Needs transpiling before it can be bundled.
    AlternateSource,
    /// Not bundled at all.
    Unsupported,
}

/// Classifies `path` by its extension (case-insensitive).
pub fn classify(path: &Path) -> SourceKind {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return SourceKind::Unsupported;
    };

    // Type declarations carry no runtime code
    if file_name.to_ascii_lowercase().ends_with(".d.ts") {
        return SourceKind::Unsupported;
    }

    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return SourceKind::Unsupported;
    };
    let ext_lower = ext.to_ascii_lowercase();

    if SCRIPT_EXTENSIONS.contains(&ext_lower.as_str()) {
        SourceKind::Script
    } else if ALTERNATE_SOURCE_EXTENSIONS.contains(&ext_lower.as_str()) {
        SourceKind::AlternateSource
    } else {
        SourceKind::Unsupported
    }
}
