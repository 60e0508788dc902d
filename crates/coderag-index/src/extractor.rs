//! Function-level code unit extraction via tree-sitter.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser, Tree};

use crate::error::{IndexError, Result};
use crate::languages::{Dialect, detect_dialect};

/// What a code unit spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    FunctionDeclaration,
    ArrowFunction,
    Method,
    /// Whole file, for sources without function units or without an extractor.
    File,
}

impl UnitKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FunctionDeclaration => "function_declaration",
            Self::ArrowFunction => "arrow_function",
            Self::Method => "method",
            Self::File => "file",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source file handed to the extractor. Path is relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

impl SourceFile {
    #[must_use]
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Option<Dialect> {
        detect_dialect(Path::new(&self.path))
    }
}

/// One contiguous span of source code.
///
/// `text` is exactly `source[start..end]` (byte offsets) of the file it came
/// from, and `start < end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnit {
    pub file_path: String,
    pub kind: UnitKind,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// blake3 hex digest of `text`.
    pub hash: String,
}

impl CodeUnit {
    fn new(file_path: &str, kind: UnitKind, source: &str, start: usize, end: usize) -> Self {
        let text = source[start..end].to_owned();
        Self {
            file_path: file_path.to_owned(),
            kind,
            start,
            end,
            hash: blake3_hex(&text),
            text,
        }
    }

    /// Text that is embedded and stored as match metadata: the file path,
    /// a newline, then the unit source.
    #[must_use]
    pub fn document(&self) -> String {
        format!("{}\n{}", self.file_path, self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Emit class and object method definitions as units.
    pub extract_methods: bool,
    /// Emit one whole-file unit when a file yields no function units.
    pub file_fallback: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            extract_methods: false,
            file_fallback: true,
        }
    }
}

/// Syntax node kinds the extractor distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    FunctionDeclaration,
    ArrowFunction,
    MethodDefinition,
    Other,
}

impl NodeKind {
    fn classify(node: Node<'_>) -> Self {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                Self::FunctionDeclaration
            }
            // `export default function () {}` parses as an expression
            "function_expression" | "function" | "generator_function"
                if node.parent().is_some_and(|p| p.kind() == "export_statement") =>
            {
                Self::FunctionDeclaration
            }
            "arrow_function" => Self::ArrowFunction,
            "method_definition" => Self::MethodDefinition,
            _ => Self::Other,
        }
    }

    fn unit_kind(self, options: &ExtractOptions) -> Option<UnitKind> {
        match self {
            Self::FunctionDeclaration => Some(UnitKind::FunctionDeclaration),
            Self::ArrowFunction => Some(UnitKind::ArrowFunction),
            Self::MethodDefinition if options.extract_methods => Some(UnitKind::Method),
            Self::MethodDefinition | Self::Other => None,
        }
    }
}

/// Extract function-like units from JavaScript-family source.
///
/// Units come back ordered by ascending start offset; when two start at the
/// same offset the longer (outer) span comes first. Nested functions produce
/// overlapping units.
///
/// # Errors
///
/// Returns `IndexError::Parse` if the source has syntax errors, also under
/// the dialect's superset grammar. No partial result is produced for such a
/// file.
pub fn extract_units(
    source: &str,
    file_path: &str,
    dialect: Dialect,
    options: &ExtractOptions,
) -> Result<Vec<CodeUnit>> {
    let mut tree = parse(source, file_path, dialect)?;
    if tree.root_node().has_error()
        && let Some(superset) = dialect.superset()
    {
        tree = parse(source, file_path, superset)?;
    }

    let root = tree.root_node();
    if root.has_error() {
        return Err(parse_error(file_path, describe_error(root)));
    }

    let mut units = Vec::new();
    let mut cursor = root.walk();
    let mut stack: Vec<Node<'_>> = vec![root];

    while let Some(node) = stack.pop() {
        if let Some(kind) = NodeKind::classify(node).unit_kind(options) {
            let (start, end) = (node.start_byte(), node.end_byte());
            if start < end {
                units.push(CodeUnit::new(file_path, kind, source, start, end));
            }
        }
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    sort_units(&mut units);
    Ok(units)
}

/// Extract units from any supported file, applying the whole-file fallback.
///
/// # Errors
///
/// Returns `IndexError::Parse` if a JavaScript-family file fails to parse.
pub fn extract_file(file: &SourceFile, options: &ExtractOptions) -> Result<Vec<CodeUnit>> {
    if file.text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let units = match file.dialect() {
        Some(dialect) => extract_units(&file.text, &file.path, dialect, options)?,
        None => Vec::new(),
    };

    if units.is_empty() && options.file_fallback {
        return Ok(vec![CodeUnit::new(
            &file.path,
            UnitKind::File,
            &file.text,
            0,
            file.text.len(),
        )]);
    }
    Ok(units)
}

/// Unit source strings, in unit order.
#[must_use]
pub fn unit_texts(units: &[CodeUnit]) -> Vec<&str> {
    units.iter().map(|u| u.text.as_str()).collect()
}

fn sort_units(units: &mut [CodeUnit]) {
    units.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
}

fn parse(source: &str, file_path: &str, dialect: Dialect) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&dialect.grammar())
        .map_err(|e| parse_error(file_path, format!("set_language failed: {e}")))?;
    parser
        .parse(source, None)
        .ok_or_else(|| parse_error(file_path, "parser produced no tree"))
}

fn parse_error(file_path: &str, message: impl Into<String>) -> IndexError {
    IndexError::Parse {
        file: file_path.to_owned(),
        message: message.into(),
    }
}

/// Locate the first error or missing node for the error message.
fn describe_error(root: Node<'_>) -> String {
    let mut cursor = root.walk();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let pos = node.start_position();
        if node.is_missing() {
            return format!(
                "missing `{}` at line {}, column {}",
                node.kind(),
                pos.row + 1,
                pos.column + 1
            );
        }
        if node.is_error() {
            return format!(
                "syntax error at line {}, column {}",
                pos.row + 1,
                pos.column + 1
            );
        }
        let children: Vec<Node<'_>> = node
            .children(&mut cursor)
            .filter(|c| c.has_error())
            .collect();
        stack.extend(children.into_iter().rev());
    }
    "syntax error".to_owned()
}

fn blake3_hex(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}
