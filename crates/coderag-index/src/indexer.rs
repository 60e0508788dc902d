//! Repository ingestion orchestrator: walk → extract → embed → store.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use coderag_llm::{EmbeddingClient, EmbeddingProvider};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{IndexError, Result};
use crate::extractor::{CodeUnit, ExtractOptions, SourceFile, extract_file};
use crate::namespace::Namespace;
use crate::state::IngestState;
use crate::store::{CodeStore, ManifestEntry, StoredUnit};
use crate::walker::{WalkedFile, collect_files};

/// Indexer configuration.
#[derive(Debug, Clone, Copy)]
pub struct IndexerConfig {
    pub extract: ExtractOptions,
    /// Files parsed and embedded concurrently.
    pub file_concurrency: usize,
    /// Remove units that are no longer present in the repository.
    pub prune_stale: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            extract: ExtractOptions::default(),
            file_concurrency: 4,
            prune_stale: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Parse,
    Read,
    Embedding,
}

/// A per-file or per-unit failure that did not stop the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    pub file_path: String,
    /// Unit byte span for embedding failures.
    pub span: Option<(usize, usize)>,
    pub kind: FailureKind,
    pub message: String,
}

/// Summary of an ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub units_extracted: usize,
    pub units_embedded: usize,
    pub units_unchanged: usize,
    pub units_removed: usize,
    pub failures: Vec<IngestFailure>,
    pub duration_ms: u64,
    pub state: IngestState,
}

enum FileInput {
    OnDisk(WalkedFile),
    Loaded(SourceFile),
}

impl FileInput {
    fn path(&self) -> &str {
        match self {
            Self::OnDisk(f) => &f.rel_path,
            Self::Loaded(f) => &f.path,
        }
    }
}

#[derive(Default)]
struct FileOutcome {
    file_path: String,
    /// False when the file could not be read or parsed.
    processed: bool,
    unit_ids: Vec<String>,
    extracted: usize,
    embedded: usize,
    unchanged: usize,
    failures: Vec<IngestFailure>,
}

/// Orchestrates ingestion of one repository snapshot into its namespace.
pub struct CodeIndexer<P> {
    store: Arc<CodeStore>,
    embedder: Arc<EmbeddingClient<P>>,
    config: IndexerConfig,
}

impl<P: EmbeddingProvider> CodeIndexer<P> {
    #[must_use]
    pub fn new(
        store: Arc<CodeStore>,
        embedder: Arc<EmbeddingClient<P>>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<CodeStore> {
        &self.store
    }

    /// Ingest every supported file under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace is already being ingested, the
    /// dimension lookup or vector index fails, the embedding credentials are
    /// rejected, the namespace is bound to a different model, or the run is
    /// cancelled. Per-file and per-unit failures are recorded in the report
    /// instead.
    pub async fn index_directory(
        &self,
        namespace: &Namespace,
        root: &Path,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let inputs = walk(root).await?;
        self.run(namespace, inputs, force, false, cancel).await
    }

    /// Drop every vector and manifest entry of the namespace, then ingest
    /// `root` from scratch. The reset happens inside the run, so it is refused
    /// like any other run while the namespace is being ingested.
    ///
    /// # Errors
    ///
    /// Same as [`Self::index_directory`].
    pub async fn rebuild_directory(
        &self,
        namespace: &Namespace,
        root: &Path,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let inputs = walk(root).await?;
        self.run(namespace, inputs, force, true, cancel).await
    }

    /// Ingest an in-memory snapshot of source files.
    ///
    /// # Errors
    ///
    /// Same as [`Self::index_directory`].
    pub async fn index_files(
        &self,
        namespace: &Namespace,
        files: Vec<SourceFile>,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let inputs = files.into_iter().map(FileInput::Loaded).collect();
        self.run(namespace, inputs, force, false, cancel).await
    }

    async fn run(
        &self,
        namespace: &Namespace,
        inputs: Vec<FileInput>,
        force: bool,
        reset: bool,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let start = std::time::Instant::now();
        let running = self.store.begin_ingest(namespace, force).await?;
        tracing::info!(namespace = %namespace, state = %running, files = inputs.len(), "ingestion started");

        let mut report = IngestReport::default();
        let outcome = self
            .ingest(namespace, inputs, reset, cancel, &mut report)
            .await;

        let state = match self.store.finish_ingest(namespace, outcome.is_ok()).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(namespace = %namespace, "failed to record ingest state: {e}");
                if outcome.is_ok() {
                    return Err(e);
                }
                IngestState::Failed
            }
        };

        if let Err(e) = outcome {
            tracing::warn!(namespace = %namespace, "ingestion failed: {e}");
            return Err(e);
        }

        report.state = state;
        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            namespace = %namespace,
            files = report.files_scanned,
            embedded = report.units_embedded,
            unchanged = report.units_unchanged,
            removed = report.units_removed,
            failures = report.failures.len(),
            duration_ms = report.duration_ms,
            "ingestion finished"
        );
        Ok(report)
    }

    async fn ingest(
        &self,
        namespace: &Namespace,
        inputs: Vec<FileInput>,
        reset: bool,
        cancel: &CancellationToken,
        report: &mut IngestReport,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        if reset {
            self.store.reset_namespace(namespace).await?;
        }

        let dimension = match self.embedder.dimensions() {
            Some(d) => d,
            None => self.embedder.embed("probe").await?.len(),
        };
        self.store.ensure_collection(u64::try_from(dimension)?).await?;
        self.store
            .bind_vector_space(namespace, self.embedder.model(), dimension)
            .await?;

        let manifest = self.store.manifest(namespace).await?;
        report.files_scanned = inputs.len();

        let mut seen: HashSet<String> = HashSet::new();
        let mut failed_files: HashSet<String> = HashSet::new();

        let concurrency = self.config.file_concurrency.max(1);
        let mut outcomes = futures::stream::iter(inputs)
            .map(|input| self.process_file(namespace, input, &manifest))
            .buffer_unordered(concurrency);

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(IndexError::Cancelled),
                next = outcomes.next() => next,
            };
            let Some(outcome) = next else { break };
            let outcome = outcome?;

            if outcome.processed {
                seen.extend(outcome.unit_ids);
            } else {
                failed_files.insert(outcome.file_path.clone());
            }
            if outcome.embedded > 0 {
                report.files_indexed += 1;
            }
            report.units_extracted += outcome.extracted;
            report.units_embedded += outcome.embedded;
            report.units_unchanged += outcome.unchanged;
            report.failures.extend(outcome.failures);
        }

        if self.config.prune_stale {
            let stale = stale_ids(&manifest, &seen, &failed_files);
            if !stale.is_empty() {
                report.units_removed = self.store.remove_units(namespace, stale).await?;
                tracing::info!(namespace = %namespace, removed = report.units_removed, "stale units pruned");
            }
        }

        Ok(())
    }

    async fn process_file(
        &self,
        namespace: &Namespace,
        input: FileInput,
        manifest: &HashMap<String, ManifestEntry>,
    ) -> Result<FileOutcome> {
        let mut outcome = FileOutcome {
            file_path: input.path().to_owned(),
            ..FileOutcome::default()
        };

        let file = match load(input).await {
            Ok(file) => file,
            Err(message) => {
                tracing::warn!(file = %outcome.file_path, "read failed: {message}");
                outcome.failures.push(IngestFailure {
                    file_path: outcome.file_path.clone(),
                    span: None,
                    kind: FailureKind::Read,
                    message,
                });
                return Ok(outcome);
            }
        };

        let options = self.config.extract;
        let extracted = tokio::task::spawn_blocking(move || extract_file(&file, &options))
            .await
            .map_err(|e| IndexError::Other(format!("extract task failed: {e}")))?;

        let units = match extracted {
            Ok(units) => units,
            Err(e) => {
                tracing::warn!(file = %outcome.file_path, "{e}");
                outcome.failures.push(IngestFailure {
                    file_path: outcome.file_path.clone(),
                    span: None,
                    kind: FailureKind::Parse,
                    message: e.to_string(),
                });
                return Ok(outcome);
            }
        };

        outcome.processed = true;
        outcome.extracted = units.len();

        let mut pending: Vec<(String, CodeUnit)> = Vec::new();
        for unit in units {
            let id = namespace.unit_id(&unit);
            outcome.unit_ids.push(id.clone());
            if manifest
                .get(&id)
                .is_some_and(|entry| entry.content_hash == unit.hash)
            {
                outcome.unchanged += 1;
            } else {
                pending.push((id, unit));
            }
        }

        if pending.is_empty() {
            tracing::debug!(file = %outcome.file_path, unchanged = outcome.unchanged, "file unchanged");
            return Ok(outcome);
        }

        let documents: Vec<String> = pending.iter().map(|(_, u)| u.document()).collect();
        let vectors = self.embedder.embed_many(&documents).await;

        let mut stored = Vec::with_capacity(pending.len());
        for ((id, unit), vector) in pending.into_iter().zip(vectors) {
            match vector {
                Ok(vector) => stored.push(StoredUnit { id, unit, vector }),
                Err(e) if e.is_unauthorized() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(
                        file = %unit.file_path,
                        start = unit.start,
                        end = unit.end,
                        "embedding failed: {e}"
                    );
                    outcome.failures.push(IngestFailure {
                        file_path: unit.file_path.clone(),
                        span: Some((unit.start, unit.end)),
                        kind: FailureKind::Embedding,
                        message: e.to_string(),
                    });
                }
            }
        }

        outcome.embedded = self.store.upsert_units(namespace, stored).await?;
        tracing::debug!(
            file = %outcome.file_path,
            embedded = outcome.embedded,
            unchanged = outcome.unchanged,
            "file indexed"
        );
        Ok(outcome)
    }
}

async fn walk(root: &Path) -> Result<Vec<FileInput>> {
    let walk_root = root.to_path_buf();
    let files = tokio::task::spawn_blocking(move || collect_files(&walk_root))
        .await
        .map_err(|e| IndexError::Other(format!("walk task failed: {e}")))?;
    tracing::info!(root = %root.display(), files = files.len(), "repository walked");
    Ok(files.into_iter().map(FileInput::OnDisk).collect())
}

async fn load(input: FileInput) -> std::result::Result<SourceFile, String> {
    match input {
        FileInput::Loaded(file) => Ok(file),
        FileInput::OnDisk(walked) => {
            let bytes = tokio::fs::read(&walked.abs_path)
                .await
                .map_err(|e| e.to_string())?;
            let text = String::from_utf8(bytes).map_err(|e| format!("not valid UTF-8: {e}"))?;
            Ok(SourceFile::new(walked.rel_path, text))
        }
    }
}

/// Manifest ids not produced by this run. Units of files that failed to
/// read or parse are kept.
fn stale_ids(
    manifest: &HashMap<String, ManifestEntry>,
    seen: &HashSet<String>,
    failed_files: &HashSet<String>,
) -> Vec<String> {
    let mut stale: Vec<String> = manifest
        .iter()
        .filter(|(id, entry)| !seen.contains(*id) && !failed_files.contains(&entry.file_path))
        .map(|(id, _)| id.clone())
        .collect();
    stale.sort();
    stale
}

#[cfg(test)]
mod tests {
    use coderag_llm::EmbedderConfig;
    use coderag_llm::mock::MockEmbedder;
    use coderag_memory::InMemoryVectorStore;

    use super::*;
    use crate::namespace::NamespacePolicy;

    const VALID: &str = "function add(a,b){return a+b;} const mul = (a,b) => a*b;";

    async fn store() -> Arc<CodeStore> {
        let vectors = Arc::new(InMemoryVectorStore::new());
        Arc::new(CodeStore::open(":memory:", vectors).await.unwrap())
    }

    fn indexer(store: &Arc<CodeStore>, mock: &MockEmbedder) -> CodeIndexer<MockEmbedder> {
        let embedder = Arc::new(EmbeddingClient::new(mock.clone(), EmbedderConfig::default()));
        CodeIndexer::new(Arc::clone(store), embedder, IndexerConfig::default())
    }

    fn ns(name: &str) -> Namespace {
        Namespace::new(name, NamespacePolicy::Verbatim).unwrap()
    }

    fn file(path: &str, text: &str) -> SourceFile {
        SourceFile::new(path, text)
    }

    #[test]
    fn default_config() {
        let config = IndexerConfig::default();
        assert_eq!(config.file_concurrency, 4);
        assert!(config.prune_stale);
        assert!(!config.extract.extract_methods);
    }

    #[test]
    fn stale_ids_keep_failed_files() {
        let entry = |path: &str| ManifestEntry {
            file_path: path.into(),
            content_hash: "h".into(),
        };
        let manifest = HashMap::from([
            ("1".to_owned(), entry("a.js")),
            ("2".to_owned(), entry("b.js")),
            ("3".to_owned(), entry("c.js")),
        ]);
        let seen = HashSet::from(["1".to_owned()]);
        let failed = HashSet::from(["b.js".to_owned()]);
        assert_eq!(stale_ids(&manifest, &seen, &failed), ["3"]);
    }

    #[tokio::test]
    async fn invalid_file_is_reported_and_repository_ends_ready() {
        let store = store().await;
        let mock = MockEmbedder::default();
        let repo = ns("repo");

        let report = indexer(&store, &mock)
            .index_files(
                &repo,
                vec![file("src/ok.js", VALID), file("src/broken.js", "function (")],
                false,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.state, IngestState::Ready);
        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.units_embedded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::Parse);
        assert_eq!(report.failures[0].file_path, "src/broken.js");
        assert_eq!(store.unit_count(&repo).await.unwrap(), 2);
        assert_eq!(store.state(&repo).await.unwrap(), IngestState::Ready);
    }

    #[tokio::test]
    async fn reingest_unchanged_does_not_reembed() {
        let store = store().await;
        let mock = MockEmbedder::default();
        let indexer = indexer(&store, &mock);
        let repo = ns("repo");
        let cancel = CancellationToken::new();

        let first = indexer
            .index_files(&repo, vec![file("a.js", VALID)], false, &cancel)
            .await
            .unwrap();
        let embedded_after_first = mock.embedded_count();
        let ids_after_first = store.manifest(&repo).await.unwrap();

        let second = indexer
            .index_files(&repo, vec![file("a.js", VALID)], false, &cancel)
            .await
            .unwrap();

        assert_eq!(first.units_embedded, 2);
        assert_eq!(second.units_embedded, 0);
        assert_eq!(second.units_unchanged, 2);
        assert_eq!(second.files_indexed, 0);
        assert_eq!(mock.embedded_count(), embedded_after_first);
        assert_eq!(store.manifest(&repo).await.unwrap(), ids_after_first);
        assert_eq!(store.unit_count(&repo).await.unwrap(), 2);
        assert_eq!(second.state, IngestState::Ready);
    }

    #[tokio::test]
    async fn changed_unit_is_reembedded_in_place() {
        let store = store().await;
        let mock = MockEmbedder::default();
        let indexer = indexer(&store, &mock);
        let repo = ns("repo");
        let cancel = CancellationToken::new();

        let v1 = "function a(){return 1}\nfunction b(){return 2}\n";
        let v2 = "function a(){return 1}\nfunction c(){return 3}\n";
        indexer
            .index_files(&repo, vec![file("a.js", v1)], false, &cancel)
            .await
            .unwrap();
        let report = indexer
            .index_files(&repo, vec![file("a.js", v2)], false, &cancel)
            .await
            .unwrap();

        assert_eq!(report.units_embedded, 1);
        assert_eq!(report.units_unchanged, 1);
        assert_eq!(report.units_removed, 0);
        assert_eq!(store.unit_count(&repo).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn removed_file_units_are_pruned() {
        let store = store().await;
        let mock = MockEmbedder::default();
        let indexer = indexer(&store, &mock);
        let repo = ns("repo");
        let cancel = CancellationToken::new();

        indexer
            .index_files(
                &repo,
                vec![file("a.js", VALID), file("b.js", "function b() {}")],
                false,
                &cancel,
            )
            .await
            .unwrap();
        let report = indexer
            .index_files(&repo, vec![file("a.js", VALID)], false, &cancel)
            .await
            .unwrap();

        assert_eq!(report.units_removed, 1);
        assert_eq!(store.unit_count(&repo).await.unwrap(), 2);
        let manifest = store.manifest(&repo).await.unwrap();
        assert!(manifest.values().all(|e| e.file_path == "a.js"));
    }

    #[tokio::test]
    async fn parse_failure_keeps_previous_units() {
        let store = store().await;
        let mock = MockEmbedder::default();
        let indexer = indexer(&store, &mock);
        let repo = ns("repo");
        let cancel = CancellationToken::new();

        indexer
            .index_files(&repo, vec![file("a.js", VALID)], false, &cancel)
            .await
            .unwrap();
        let report = indexer
            .index_files(&repo, vec![file("a.js", "const = ;")], false, &cancel)
            .await
            .unwrap();

        assert_eq!(report.units_removed, 0);
        assert_eq!(report.failures[0].kind, FailureKind::Parse);
        assert_eq!(store.unit_count(&repo).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = store().await;
        let mock = MockEmbedder::default();
        let indexer = indexer(&store, &mock);
        let cancel = CancellationToken::new();
        let (a, b) = (ns("repo-a"), ns("repo-b"));

        indexer
            .index_files(&a, vec![file("a.js", VALID)], false, &cancel)
            .await
            .unwrap();
        indexer
            .index_files(&b, vec![file("b.js", "function only_b() {}")], false, &cancel)
            .await
            .unwrap();

        let query = mock.vector_for("a.js\n(a,b) => a*b");
        let hits = store.query(&b, query, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload["file_path"], "b.js");
        assert_eq!(store.unit_count(&a).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn different_model_is_rejected_before_upsert() {
        let store = store().await;
        let repo = ns("repo");
        let cancel = CancellationToken::new();

        indexer(&store, &MockEmbedder::default())
            .index_files(&repo, vec![file("a.js", VALID)], false, &cancel)
            .await
            .unwrap();

        let other = MockEmbedder::default().with_model("other-model");
        let err = indexer(&store, &other)
            .index_files(&repo, vec![file("b.js", "function b() {}")], false, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::NamespaceMismatch { .. }));
        assert_eq!(store.unit_count(&repo).await.unwrap(), 2);
        assert_eq!(store.state(&repo).await.unwrap(), IngestState::Failed);
    }

    #[tokio::test]
    async fn other_dimension_in_shared_collection_fails_before_upsert() {
        let store = store().await;
        let cancel = CancellationToken::new();
        let (a, b) = (ns("repo-a"), ns("repo-b"));

        indexer(&store, &MockEmbedder::new(8))
            .index_files(&a, vec![file("a.js", VALID)], false, &cancel)
            .await
            .unwrap();

        let narrow = MockEmbedder::new(4);
        let err = indexer(&store, &narrow)
            .index_files(&b, vec![file("b.js", "function b() {}")], false, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IndexError::VectorStore(coderag_memory::VectorStoreError::Collection(_))
        ));
        // only the dimension lookup reached the provider
        assert_eq!(narrow.request_count(), 1);
        assert_eq!(store.unit_count(&b).await.unwrap(), 0);
        assert_eq!(store.state(&b).await.unwrap(), IngestState::Failed);
    }

    #[tokio::test]
    async fn running_ingestion_is_rejected_unless_forced() {
        let store = store().await;
        let mock = MockEmbedder::default();
        let indexer = indexer(&store, &mock);
        let repo = ns("repo");
        let cancel = CancellationToken::new();

        store.begin_ingest(&repo, false).await.unwrap();
        let err = indexer
            .index_files(&repo, vec![file("a.js", VALID)], false, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::AlreadyIngesting(_)));

        let report = indexer
            .index_files(&repo, vec![file("a.js", VALID)], true, &cancel)
            .await
            .unwrap();
        assert_eq!(report.state, IngestState::Ready);
    }

    #[tokio::test]
    async fn cancelled_run_fails_without_writes() {
        let store = store().await;
        let mock = MockEmbedder::default();
        let repo = ns("repo");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = indexer(&store, &mock)
            .index_files(&repo, vec![file("a.js", VALID)], false, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::Cancelled));
        assert_eq!(mock.request_count(), 0);
        assert_eq!(store.state(&repo).await.unwrap(), IngestState::Failed);
    }

    #[tokio::test]
    async fn embedding_failure_is_isolated_per_unit() {
        let store = store().await;
        let mock = MockEmbedder::default().failing_on("BROKEN");
        let repo = ns("repo");

        let source = "function ok() { return 1; }\nfunction bad() { return 'BROKEN'; }\n";
        let report = indexer(&store, &mock)
            .index_files(&repo, vec![file("a.js", source)], false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.state, IngestState::Ready);
        assert_eq!(report.units_extracted, 2);
        assert_eq!(report.units_embedded, 1);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.kind, FailureKind::Embedding);
        let (start, end) = failure.span.unwrap();
        assert!(source[start..end].contains("BROKEN"));
        assert_eq!(store.unit_count(&repo).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejected_credentials_fail_the_run() {
        let store = store().await;
        let mock = MockEmbedder::new(8).rejecting_credentials();
        let embedder = Arc::new(EmbeddingClient::new(
            mock.clone(),
            EmbedderConfig {
                dimensions: Some(8),
                ..EmbedderConfig::default()
            },
        ));
        let indexer = CodeIndexer::new(Arc::clone(&store), embedder, IndexerConfig::default());
        let repo = ns("repo");

        let err = indexer
            .index_files(&repo, vec![file("a.js", VALID)], false, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::Llm(ref e) if e.is_unauthorized()));
        assert_eq!(mock.request_count(), 1);
        assert_eq!(store.state(&repo).await.unwrap(), IngestState::Failed);
        assert_eq!(store.unit_count(&repo).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rebuild_is_refused_while_another_run_holds_the_namespace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), VALID).unwrap();
        let store = store().await;
        let mock = MockEmbedder::default();
        let indexer = indexer(&store, &mock);
        let repo = ns("repo");
        let cancel = CancellationToken::new();

        indexer
            .index_directory(&repo, dir.path(), false, &cancel)
            .await
            .unwrap();
        store.begin_ingest(&repo, false).await.unwrap();

        let err = indexer
            .rebuild_directory(&repo, dir.path(), false, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::AlreadyIngesting(_)));
        assert_eq!(store.unit_count(&repo).await.unwrap(), 2);
        assert_eq!(store.manifest(&repo).await.unwrap().len(), 2);

        let report = indexer
            .rebuild_directory(&repo, dir.path(), true, &cancel)
            .await
            .unwrap();
        assert_eq!(report.state, IngestState::Ready);
        assert_eq!(report.units_embedded, 2);
        assert_eq!(report.units_unchanged, 0);
    }

    #[tokio::test]
    async fn rebuild_switches_embedding_model() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), VALID).unwrap();
        let store = store().await;
        let repo = ns("repo");
        let cancel = CancellationToken::new();

        indexer(&store, &MockEmbedder::default())
            .index_directory(&repo, dir.path(), false, &cancel)
            .await
            .unwrap();

        let other = indexer(&store, &MockEmbedder::default().with_model("other-model"));
        assert!(matches!(
            other
                .index_directory(&repo, dir.path(), false, &cancel)
                .await
                .unwrap_err(),
            IndexError::NamespaceMismatch { .. }
        ));
        let report = other
            .rebuild_directory(&repo, dir.path(), false, &cancel)
            .await
            .unwrap();
        assert_eq!(report.state, IngestState::Ready);
        assert_eq!(store.unit_count(&repo).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn index_directory_walks_reads_and_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        std::fs::write(root.join("src/app.ts"), "export const f = (x: number) => x + 1;").unwrap();
        std::fs::write(root.join("src/tool.py"), "def tool():\n    return 1\n").unwrap();
        std::fs::write(root.join("src/empty.js"), "   \n").unwrap();
        std::fs::write(root.join("src/bin.js"), [0xff_u8, 0xfe, 0x00]).unwrap();
        std::fs::write(root.join("node_modules/dep/index.js"), "function dep() {}").unwrap();

        let store = store().await;
        let mock = MockEmbedder::default();
        let repo = ns("repo");
        let report = indexer(&store, &mock)
            .index_directory(&repo, root, false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.files_scanned, 4);
        assert_eq!(report.units_embedded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::Read);
        assert_eq!(report.failures[0].file_path, "src/bin.js");

        let manifest = store.manifest(&repo).await.unwrap();
        let mut paths: Vec<_> = manifest.values().map(|e| e.file_path.as_str()).collect();
        paths.sort_unstable();
        assert_eq!(paths, ["src/app.ts", "src/tool.py"]);
    }
}
