//! Language detection and tree-sitter grammar registry.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// File extensions picked up by the source walker.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "py", "js", "tsx", "jsx", "ipynb", "java", "cpp", "ts", "go", "rs", "vue", "swift", "c", "h",
    "mjs", "cjs", "mts", "cts",
];

/// JavaScript-family dialect with a function-level extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    JavaScript,
    Jsx,
    TypeScript,
    /// TypeScript with embedded markup; superset grammar.
    Tsx,
}

impl Dialect {
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Jsx => "jsx",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
        }
    }

    /// The tree-sitter grammar. The JavaScript grammar accepts JSX natively.
    #[must_use]
    pub fn grammar(self) -> tree_sitter::Language {
        match self {
            Self::JavaScript | Self::Jsx => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }

    /// Wider grammar tried when this one rejects a file: plain JavaScript
    /// sources may still carry type annotations.
    #[must_use]
    pub fn superset(self) -> Option<Self> {
        match self {
            Self::JavaScript | Self::Jsx => Some(Self::Tsx),
            Self::TypeScript | Self::Tsx => None,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect the extractor dialect from the file extension.
#[must_use]
pub fn detect_dialect(path: &Path) -> Option<Dialect> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "js" | "mjs" | "cjs" => Some(Dialect::JavaScript),
        "jsx" => Some(Dialect::Jsx),
        "ts" | "mts" | "cts" => Some(Dialect::TypeScript),
        "tsx" => Some(Dialect::Tsx),
        _ => None,
    }
}

/// Check if a file should be ingested at all.
#[must_use]
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}
