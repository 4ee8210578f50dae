//! Hoisting of `require` declarations.
//!
//! [`ImportExtractor`] is a [`LineInspector`] that removes whole-line
//! `require` declarations from the stream and remembers them, merged per
//! module and import kind, so they can be re-emitted once at the top of the
//! bundle.

use indexmap::IndexMap;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use super::streams::LineInspector;

static REQUIRE_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\brequire\s*\(").expect("static regex"));

static REQUIRE_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s*(const|var|let)\b\s*(\{?)",
        r"((?:(?:\s*[\w$@]+\s*:)*\s*[\w$@]+\s*,?\s*)+)\}?",
        r#"\s*=\s*require\s*\(["'`]([\w/{.$:}@-]+)["'`]\)"#,
        r"(?:\.(\w+))?\s*;?\s*$",
    ))
    .expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKeyword {
    Var,
    Let,
    Const,
}

impl DeclarationKeyword {
    fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "var" => Some(Self::Var),
            "let" => Some(Self::Let),
            "const" => Some(Self::Const),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::Let => "let",
            Self::Const => "const",
        }
    }
}

/// Whether a declaration binds the whole module or one of its properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportKind {
    Full,
    Property(String),
}

/// Everything imported from one module under one [`ImportKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub destructured: bool,
    pub keyword: DeclarationKeyword,
    /// Imported name to local alias, in first-seen order.
    pub variables: IndexMap<String, Option<String>>,
}

impl ImportBinding {
    fn render(&self, module_id: &str, kind: &ImportKind) -> String {
        let names = self
            .variables
            .iter()
            .map(|(name, alias)| match alias {
                Some(alias) => format!("{} : {}", name, alias),
                None => name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let needs_braces = self.destructured
            || self.variables.len() != 1
            || self.variables.values().any(Option::is_some);
        let bindings = if needs_braces {
            format!("{{ {} }}", names)
        } else {
            names
        };

        let property = match kind {
            ImportKind::Full => String::new(),
            ImportKind::Property(p) => format!(".{}", p),
        };

        format!(
            "{} {} = require(\"{}\"){};",
            self.keyword.as_str(),
            bindings,
            module_id,
            property
        )
    }
}

/// Import records keyed by module identifier, then by kind.
pub type ImportRecords = IndexMap<String, IndexMap<ImportKind, ImportBinding>>;

/// Snapshot of the merged records, used to undo a failed input.
#[derive(Debug, Clone)]
pub struct ImportCheckpoint(ImportRecords);

/// Extracts and merges `require` declarations across every input of a run.
#[derive(Debug, Default)]
pub struct ImportExtractor {
    imports: ImportRecords,
    parsed_imports: String,
}

impl ImportExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to record `line` as a `require` declaration.
    ///
    /// Returns `true` when the line was recognised (and should be removed).
    pub fn match_require(&mut self, line: &str) -> bool {
        if !REQUIRE_HINT.is_match(line) {
            return false;
        }

        let Some(caps) = REQUIRE_DECLARATION.captures(line) else {
            return false;
        };

        let Some(keyword) = DeclarationKeyword::parse(&caps[1]) else {
            return false;
        };
        let destructured = !caps[2].is_empty();
        let names = &caps[3];
        let module_id = caps[4].to_string();
        let kind = caps
            .get(5)
            .map_or(ImportKind::Full, |m| ImportKind::Property(m.as_str().to_string()));

        let binding = self
            .imports
            .entry(module_id)
            .or_default()
            .entry(kind)
            .or_insert_with(|| ImportBinding {
                destructured,
                keyword,
                variables: IndexMap::new(),
            });

        for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match name.split_once(':') {
                Some((name, alias)) => {
                    binding
                        .variables
                        .insert(name.trim().to_string(), Some(alias.trim().to_string()));
                }
                None => {
                    binding.variables.insert(name.to_string(), None);
                }
            }
        }

        true
    }

    /// Renders the pending records into the hoisted block and clears them.
    ///
    /// Repeated calls append to [`parsed_imports`](Self::parsed_imports),
    /// separated by a newline.
    pub fn finish(&mut self) {
        let imports = std::mem::take(&mut self.imports);

        let lines: Vec<String> = imports
            .iter()
            .flat_map(|(module_id, kinds)| {
                kinds
                    .iter()
                    .map(move |(kind, binding)| binding.render(module_id, kind))
            })
            .collect();

        if lines.is_empty() {
            return;
        }

        if !self.parsed_imports.is_empty() {
            self.parsed_imports.push('\n');
        }
        self.parsed_imports.push_str(&lines.join("\n"));
    }

    /// The hoisted declaration block accumulated so far.
    pub fn parsed_imports(&self) -> &str {
        &self.parsed_imports
    }

    /// Records merged but not yet rendered by [`finish`](Self::finish).
    pub fn imports(&self) -> &ImportRecords {
        &self.imports
    }

    pub fn checkpoint(&self) -> ImportCheckpoint {
        ImportCheckpoint(self.imports.clone())
    }

    pub fn rollback(&mut self, checkpoint: ImportCheckpoint) {
        self.imports = checkpoint.0;
    }
}

impl LineInspector for ImportExtractor {
    fn inspect_line(&mut self, line: &str, _line_bytes: &[u8]) -> String {
        if self.match_require(line) {
            String::new()
        } else {
            line.to_string()
        }
    }
}

impl fmt::Display for ImportExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parsed_imports)
    }
}
