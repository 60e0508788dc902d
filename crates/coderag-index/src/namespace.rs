//! Repository namespaces and deterministic unit ids.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IndexError, Result};
use crate::extractor::CodeUnit;

/// How a repository identifier becomes a namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespacePolicy {
    /// The identifier as given.
    #[default]
    Verbatim,
    /// Lowercased, without scheme, trailing slashes or `.git` suffix, so
    /// `https://GitHub.com/o/r.git/` and `github.com/o/r` share a namespace.
    Normalized,
}

/// Partition key isolating one repository's vectors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// # Errors
    ///
    /// Returns `IndexError::InvalidNamespace` when the identifier is blank.
    pub fn new(repository: &str, policy: NamespacePolicy) -> Result<Self> {
        let value = match policy {
            NamespacePolicy::Verbatim => repository.to_owned(),
            NamespacePolicy::Normalized => normalize(repository),
        };
        if value.trim().is_empty() {
            return Err(IndexError::InvalidNamespace(repository.to_owned()));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic point id for `unit` within this namespace.
    ///
    /// Derived from `(namespace, file path, start, end)`, so re-ingesting the
    /// same unit overwrites its point and identical units in different
    /// namespaces never collide.
    #[must_use]
    pub fn unit_id(&self, unit: &CodeUnit) -> String {
        let key = format!(
            "{}\0{}\0{}\0{}",
            self.0, unit.file_path, unit.start, unit.end
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(repository: &str) -> String {
    let mut s = repository.trim().to_lowercase();
    if let Some(idx) = s.find("://") {
        s.drain(..idx + 3);
    }
    loop {
        let before = s.len();
        while s.ends_with('/') {
            s.pop();
        }
        if let Some(stripped) = s.strip_suffix(".git") {
            s.truncate(stripped.len());
        }
        if s.len() == before {
            break;
        }
    }
    s
}
