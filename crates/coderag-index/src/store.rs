//! Vector index + `SQLite` unit manifest for code units.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use coderag_memory::{ScoredVectorPoint, VectorPoint, VectorStore};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::error::{IndexError, Result};
use crate::extractor::CodeUnit;
use crate::namespace::Namespace;
use crate::state::IngestState;

/// Payload key holding the unit document text returned with matches.
pub const TEXT_FIELD: &str = "text";

/// What the manifest remembers about one stored unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub file_path: String,
    pub content_hash: String,
}

/// A unit ready to be written, with its id and embedding.
#[derive(Debug, Clone)]
pub struct StoredUnit {
    pub id: String,
    pub unit: CodeUnit,
    pub vector: Vec<f32>,
}

/// Vector index + `SQLite` dual-write store for code units.
///
/// The vector index holds embeddings and match text; the manifest holds,
/// per namespace, each unit's id and content hash plus the namespace's
/// embedding model, dimension and ingestion state.
pub struct CodeStore {
    vectors: Arc<dyn VectorStore>,
    pool: SqlitePool,
}

impl std::fmt::Debug for CodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeStore").finish_non_exhaustive()
    }
}

impl CodeStore {
    /// Open (or create) the manifest database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn open(path: &str, vectors: Arc<dyn VectorStore>) -> Result<Self> {
        let (url, max_connections) = if path == ":memory:" {
            ("sqlite::memory:".to_string(), 1)
        } else {
            (format!("sqlite:{path}?mode=rwc"), 4)
        };

        let mut opts = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
        if max_connections > 1 {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        Self::with_pool(pool, vectors).await
    }

    /// Use an existing pool, running migrations on it.
    ///
    /// # Errors
    ///
    /// Returns an error if migration execution fails.
    pub async fn with_pool(pool: SqlitePool, vectors: Arc<dyn VectorStore>) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { vectors, pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// # Errors
    ///
    /// Returns an error if the vector index rejects the request.
    pub async fn ensure_collection(&self, vector_size: u64) -> Result<()> {
        self.vectors.ensure_collection(vector_size).await?;
        Ok(())
    }

    async fn ensure_namespace_row(&self, namespace: &Namespace) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO namespaces (namespace) VALUES (?)")
            .bind(namespace.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bind `namespace` to an embedding model and dimension on first use and
    /// verify the binding afterwards.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::NamespaceMismatch` if the namespace already holds
    /// vectors from a different model or dimension.
    pub async fn bind_vector_space(
        &self,
        namespace: &Namespace,
        model: &str,
        dimension: usize,
    ) -> Result<()> {
        self.ensure_namespace_row(namespace).await?;
        let dimension = i64::try_from(dimension)?;

        let (bound_model, bound_dim): (Option<String>, Option<i64>) =
            sqlx::query_as("SELECT model, dimension FROM namespaces WHERE namespace = ?")
                .bind(namespace.as_str())
                .fetch_one(&self.pool)
                .await?;

        match (bound_model, bound_dim) {
            (Some(m), Some(d)) if m == model && d == dimension => Ok(()),
            (Some(m), Some(d)) => Err(IndexError::NamespaceMismatch {
                namespace: namespace.to_string(),
                expected: format!("{m}/{d}"),
                actual: format!("{model}/{dimension}"),
            }),
            _ => {
                sqlx::query(
                    "UPDATE namespaces SET model = ?, dimension = ?, updated_at = datetime('now') \
                     WHERE namespace = ?",
                )
                .bind(model)
                .bind(dimension)
                .bind(namespace.as_str())
                .execute(&self.pool)
                .await?;
                Ok(())
            }
        }
    }

    /// Current ingestion state; `NotIngested` for unknown namespaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` query fails.
    pub async fn state(&self, namespace: &Namespace) -> Result<IngestState> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT state FROM namespaces WHERE namespace = ?")
                .bind(namespace.as_str())
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((s,)) => s.parse().map_err(IndexError::Other),
            None => Ok(IngestState::NotIngested),
        }
    }

    /// Move `namespace` into a running state.
    ///
    /// With `force`, a namespace left running by an interrupted process is
    /// taken over as a fresh `Ingesting` run.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::AlreadyIngesting` if a run is in progress.
    pub async fn begin_ingest(&self, namespace: &Namespace, force: bool) -> Result<IngestState> {
        self.ensure_namespace_row(namespace).await?;
        let current = self.state(namespace).await?;
        let next = match current.begin() {
            Some(next) => next,
            None if force => IngestState::Ingesting,
            None => return Err(IndexError::AlreadyIngesting(namespace.to_string())),
        };
        self.transition(namespace, current, next).await?;
        Ok(next)
    }

    /// Close the running state as `Ready` or `Failed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` update fails.
    pub async fn finish_ingest(&self, namespace: &Namespace, succeeded: bool) -> Result<IngestState> {
        let current = self.state(namespace).await?;
        let next = current.finish(succeeded);
        if next != current {
            self.transition(namespace, current, next).await?;
        }
        Ok(next)
    }

    /// Compare-and-set on the state column so two runs cannot both start.
    async fn transition(
        &self,
        namespace: &Namespace,
        from: IngestState,
        to: IngestState,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE namespaces SET state = ?, updated_at = datetime('now') \
             WHERE namespace = ? AND state = ?",
        )
        .bind(to.as_str())
        .bind(namespace.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(IndexError::AlreadyIngesting(namespace.to_string()));
        }
        tracing::debug!(namespace = %namespace, from = %from, to = %to, "ingest state");
        Ok(())
    }

    /// Every unit recorded for `namespace`, keyed by point id.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` query fails.
    pub async fn manifest(&self, namespace: &Namespace) -> Result<HashMap<String, ManifestEntry>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT point_id, file_path, content_hash FROM unit_manifest WHERE namespace = ?",
        )
        .bind(namespace.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, file_path, content_hash)| {
                (
                    id,
                    ManifestEntry {
                        file_path,
                        content_hash,
                    },
                )
            })
            .collect())
    }

    /// Write units to the vector index, then record them in the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector index or `SQLite` write fails.
    pub async fn upsert_units(&self, namespace: &Namespace, units: Vec<StoredUnit>) -> Result<usize> {
        if units.is_empty() {
            return Ok(0);
        }

        let points: Vec<VectorPoint> = units
            .iter()
            .map(|s| VectorPoint {
                id: s.id.clone(),
                vector: s.vector.clone(),
                payload: unit_payload(&s.unit),
            })
            .collect();
        self.vectors.upsert(namespace.as_str(), points).await?;

        let mut tx = self.pool.begin().await?;
        for s in &units {
            sqlx::query(
                "INSERT OR REPLACE INTO unit_manifest \
                 (namespace, point_id, file_path, kind, start_offset, end_offset, content_hash) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(namespace.as_str())
            .bind(&s.id)
            .bind(&s.unit.file_path)
            .bind(s.unit.kind.as_str())
            .bind(i64::try_from(s.unit.start)?)
            .bind(i64::try_from(s.unit.end)?)
            .bind(&s.unit.hash)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(units.len())
    }

    /// Remove units from both stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector index or `SQLite` delete fails.
    pub async fn remove_units(&self, namespace: &Namespace, ids: Vec<String>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.vectors.delete(namespace.as_str(), ids.clone()).await?;

        let mut tx = self.pool.begin().await?;
        for id in &ids {
            sqlx::query("DELETE FROM unit_manifest WHERE namespace = ? AND point_id = ?")
                .bind(namespace.as_str())
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(ids.len())
    }

    /// Drop every vector and manifest entry of `namespace` and unbind its
    /// vector space. The ingestion state is kept; callers hold the namespace
    /// through [`Self::begin_ingest`].
    ///
    /// # Errors
    ///
    /// Returns an error if the vector index or `SQLite` delete fails.
    pub(crate) async fn reset_namespace(&self, namespace: &Namespace) -> Result<()> {
        self.vectors.delete_namespace(namespace.as_str()).await?;
        sqlx::query("DELETE FROM unit_manifest WHERE namespace = ?")
            .bind(namespace.as_str())
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "UPDATE namespaces SET model = NULL, dimension = NULL, updated_at = datetime('now') \
             WHERE namespace = ?",
        )
        .bind(namespace.as_str())
        .execute(&self.pool)
        .await?;
        tracing::info!(namespace = %namespace, "namespace reset");
        Ok(())
    }

    /// Top-`top_k` matches with metadata, strictly from `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector index query fails.
    pub async fn query(
        &self,
        namespace: &Namespace,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredVectorPoint>> {
        let top_k = u64::try_from(top_k)?;
        Ok(self
            .vectors
            .query(namespace.as_str(), vector, top_k, true)
            .await?)
    }

    /// Number of points stored for `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector index count fails.
    pub async fn unit_count(&self, namespace: &Namespace) -> Result<u64> {
        Ok(self.vectors.count(namespace.as_str()).await?)
    }
}

fn unit_payload(unit: &CodeUnit) -> HashMap<String, serde_json::Value> {
    HashMap::from([
        (TEXT_FIELD.to_owned(), serde_json::Value::String(unit.document())),
        (
            "file_path".to_owned(),
            serde_json::Value::String(unit.file_path.clone()),
        ),
        (
            "kind".to_owned(),
            serde_json::Value::String(unit.kind.as_str().to_owned()),
        ),
        ("start".to_owned(), serde_json::Value::from(unit.start)),
        ("end".to_owned(), serde_json::Value::from(unit.end)),
        (
            "content_hash".to_owned(),
            serde_json::Value::String(unit.hash.clone()),
        ),
    ])
}
