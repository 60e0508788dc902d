//! Application bootstrap: config resolution and component construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use coderag_index::{CodeIndexer, CodeStore, ContextAssembler, Namespace, NamespacePolicy};
use coderag_llm::{EmbeddingClient, EmbeddingProvider};
use coderag_llm::any::AnyEmbedder;
use coderag_llm::openai::OpenAiEmbedder;
use coderag_memory::{QdrantOps, VectorStore};

use crate::config::{Config, ConfigError, EmbeddingProviderKind, OPENAI_API_KEY_VAR};
use crate::vault::{EnvVaultProvider, VaultProvider};

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

/// Every long-lived component, built once from one [`Config`].
pub struct Pipeline {
    pub store: Arc<CodeStore>,
    pub embedder: Arc<EmbeddingClient<AnyEmbedder>>,
    pub indexer: CodeIndexer<AnyEmbedder>,
    pub assembler: ContextAssembler<AnyEmbedder>,
    namespace_policy: NamespacePolicy,
}

impl Pipeline {
    /// Namespace for `repository` under the configured policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is blank.
    pub fn namespace(&self, repository: &str) -> coderag_index::Result<Namespace> {
        Namespace::new(repository, self.namespace_policy)
    }

    /// Embed one short text against the configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RejectedSecret`] if the provider refuses the
    /// API key, or the provider error if the service is unusable otherwise.
    pub async fn verify_credentials(&self) -> anyhow::Result<()> {
        match self.embedder.embed("ping").await {
            Ok(_) => {
                tracing::debug!(model = self.embedder.model(), "embedding credentials accepted");
                Ok(())
            }
            Err(e) if e.is_unauthorized() => Err(ConfigError::RejectedSecret {
                name: OPENAI_API_KEY_VAR,
                reason: e.to_string(),
            }
            .into()),
            Err(e) => Err(anyhow::Error::new(e).context("embedding service check failed")),
        }
    }
}

impl AppBuilder {
    /// Load config from `config_path`, resolve secrets from the environment
    /// and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, secret resolution or validation fails.
    pub async fn from_path(config_path: PathBuf) -> anyhow::Result<Self> {
        Self::from_path_with_vault(config_path, &EnvVaultProvider).await
    }

    /// # Errors
    ///
    /// Returns an error if loading, secret resolution or validation fails.
    pub async fn from_path_with_vault(
        config_path: PathBuf,
        vault: &dyn VaultProvider,
    ) -> anyhow::Result<Self> {
        let mut config = Config::load(&config_path)?;
        config.resolve_secrets(vault).await?;
        config.validate()?;
        tracing::debug!(path = %config_path.display(), "configuration loaded");
        Ok(Self {
            config,
            config_path,
        })
    }

    /// Use an already resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            config_path: PathBuf::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// # Errors
    ///
    /// Returns an error if the configured provider cannot be created.
    pub fn build_embedder(&self) -> anyhow::Result<EmbeddingClient<AnyEmbedder>> {
        let provider = create_embedder(&self.config)?;
        Ok(EmbeddingClient::new(provider, self.config.embedder_config()))
    }

    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn build_vector_store(&self) -> anyhow::Result<Arc<dyn VectorStore>> {
        let ops = QdrantOps::new(&self.config.qdrant_settings())
            .map_err(|e| anyhow::anyhow!("failed to create Qdrant client: {e}"))?;
        Ok(Arc::new(ops))
    }

    /// # Errors
    ///
    /// Returns an error if the manifest database cannot be opened.
    pub async fn build_store(&self, vectors: Arc<dyn VectorStore>) -> anyhow::Result<CodeStore> {
        let path = &self.config.index.sqlite_path;
        if path != ":memory:"
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        CodeStore::open(path, vectors)
            .await
            .with_context(|| format!("failed to open manifest database {path}"))
    }

    /// Build the pipeline against the configured Qdrant instance.
    ///
    /// # Errors
    ///
    /// Returns an error if any component cannot be created.
    pub async fn build(&self) -> anyhow::Result<Pipeline> {
        let vectors = self.build_vector_store()?;
        self.build_with_vectors(vectors).await
    }

    /// Build the pipeline on top of the given vector store.
    ///
    /// # Errors
    ///
    /// Returns an error if any component cannot be created.
    pub async fn build_with_vectors(
        &self,
        vectors: Arc<dyn VectorStore>,
    ) -> anyhow::Result<Pipeline> {
        let store = Arc::new(self.build_store(vectors).await?);
        let embedder = Arc::new(self.build_embedder()?);

        tracing::info!(
            provider = %embedder.provider().name(),
            model = embedder.model(),
            collection = %self.config.vector_store.collection,
            "pipeline ready"
        );

        Ok(Pipeline {
            indexer: CodeIndexer::new(
                Arc::clone(&store),
                Arc::clone(&embedder),
                self.config.indexer_config(),
            ),
            assembler: ContextAssembler::new(
                Arc::clone(&store),
                Arc::clone(&embedder),
                self.config.retrieval_config(),
            ),
            store,
            embedder,
            namespace_policy: self.config.index.namespace_policy,
        })
    }
}

fn create_embedder(config: &Config) -> anyhow::Result<AnyEmbedder> {
    match config.embedding.provider {
        EmbeddingProviderKind::OpenAi => {
            let api_key = config
                .secrets
                .openai_api_key
                .as_ref()
                .context("CODERAG_OPENAI_API_KEY not found in vault")?;
            let client = coderag_llm::http::embedding_client(Duration::from_secs(
                config.timeouts.embedding_seconds,
            ));
            Ok(AnyEmbedder::OpenAi(
                OpenAiEmbedder::new(
                    api_key.expose().to_owned(),
                    config.embedding.base_url.clone(),
                    config.embedding.model.clone(),
                )
                .with_client(client)
                .with_dimensions(config.embedding.dimensions)
                .with_retry(config.retry_policy()),
            ))
        }
        EmbeddingProviderKind::Mock => create_mock_embedder(config),
    }
}

#[cfg(any(test, feature = "mock"))]
#[allow(clippy::unnecessary_wraps)]
fn create_mock_embedder(config: &Config) -> anyhow::Result<AnyEmbedder> {
    let dimension = config.embedding.dimensions.unwrap_or(8);
    Ok(AnyEmbedder::Mock(
        coderag_llm::mock::MockEmbedder::new(dimension).with_model(config.embedding.model.clone()),
    ))
}

#[cfg(not(any(test, feature = "mock")))]
fn create_mock_embedder(_config: &Config) -> anyhow::Result<AnyEmbedder> {
    anyhow::bail!("mock embedding provider requires the `mock` feature")
}

/// Priority: `--config` argument > `CODERAG_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("CODERAG_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use coderag_index::{IngestState, SourceFile};
    use coderag_memory::InMemoryVectorStore;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::vault::Secret;
    use crate::vault::tests::MapVault;

    fn mock_config() -> Config {
        let mut config = Config::default();
        config.embedding.provider = EmbeddingProviderKind::Mock;
        config.embedding.model = "mock-embedding".into();
        config.index.sqlite_path = ":memory:".into();
        config
    }

    #[test]
    #[serial_test::serial]
    fn config_path_priority() {
        unsafe { std::env::remove_var("CODERAG_CONFIG") };
        assert_eq!(
            resolve_config_path(None),
            PathBuf::from("config/default.toml")
        );

        unsafe { std::env::set_var("CODERAG_CONFIG", "/etc/coderag.toml") };
        assert_eq!(
            resolve_config_path(None),
            PathBuf::from("/etc/coderag.toml")
        );
        assert_eq!(
            resolve_config_path(Some(Path::new("cli.toml"))),
            PathBuf::from("cli.toml")
        );
        unsafe { std::env::remove_var("CODERAG_CONFIG") };
    }

    #[test]
    fn from_config_rejects_missing_key() {
        let mut config = Config::default();
        config.secrets.openai_api_key = None;
        assert!(AppBuilder::from_config(config).is_err());
    }

    #[test]
    fn openai_embedder_uses_configured_model() {
        let mut config = Config::default();
        config.secrets.openai_api_key = Some(Secret::new("sk-test"));
        config.embedding.model = "text-embedding-3-large".into();
        config.embedding.dimensions = Some(256);
        let app = AppBuilder::from_config(config).unwrap();

        let embedder = app.build_embedder().unwrap();
        assert_eq!(embedder.model(), "text-embedding-3-large");
        assert_eq!(embedder.provider().name(), "openai");
        assert_eq!(embedder.dimensions(), Some(256));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn from_path_resolves_secrets_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coderag.toml");
        std::fs::write(&path, "[retrieval]\ntop_k = 3\n").unwrap();

        let empty = MapVault(HashMap::new());
        assert!(
            AppBuilder::from_path_with_vault(path.clone(), &empty)
                .await
                .is_err()
        );

        let vault = MapVault(HashMap::from([(
            "CODERAG_OPENAI_API_KEY".to_owned(),
            "sk-file".to_owned(),
        )]));
        let app = AppBuilder::from_path_with_vault(path.clone(), &vault)
            .await
            .unwrap();
        assert_eq!(app.config().retrieval.top_k, 3);
        assert_eq!(app.config_path(), path.as_path());
    }

    #[tokio::test]
    async fn build_store_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested/data/coderag.db");
        let mut config = mock_config();
        config.index.sqlite_path = db.to_string_lossy().into_owned();
        let app = AppBuilder::from_config(config).unwrap();

        app.build_store(Arc::new(InMemoryVectorStore::new()))
            .await
            .unwrap();
        assert!(db.exists());
    }

    #[tokio::test]
    async fn pipeline_ingests_and_assembles() {
        let app = AppBuilder::from_config(mock_config()).unwrap();
        let pipeline = app
            .build_with_vectors(Arc::new(InMemoryVectorStore::new()))
            .await
            .unwrap();
        let repo = pipeline.namespace("https://github.com/o/r").unwrap();
        let cancel = CancellationToken::new();

        let report = pipeline
            .indexer
            .index_files(
                &repo,
                vec![SourceFile::new(
                    "src/math.ts",
                    "function add(a: number, b: number) { return a + b; }\nconst mul = (a: number, b: number) => a * b;\n",
                )],
                false,
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(report.state, IngestState::Ready);
        assert_eq!(report.units_embedded, 2);

        let ctx = pipeline
            .assembler
            .assemble(&repo, "how do I multiply?", &cancel)
            .await
            .unwrap();
        assert_eq!(ctx.matches.len(), 2);
        assert!(ctx.text.starts_with("<CONTEXT>\nsrc/math.ts\n"));
        assert!(ctx.text.ends_with("MY QUESTION:\nhow do I multiply?"));
    }

    async fn openai_pipeline(server: &wiremock::MockServer) -> Pipeline {
        let mut config = Config::default();
        config.secrets.openai_api_key = Some(Secret::new("sk-revoked"));
        config.embedding.base_url = server.uri();
        config.embedding.max_retries = 0;
        config.index.sqlite_path = ":memory:".into();
        AppBuilder::from_config(config)
            .unwrap()
            .build_with_vectors(Arc::new(InMemoryVectorStore::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn rejected_key_is_a_config_error() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = openai_pipeline(&server).await;
        let err = pipeline.verify_credentials().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::RejectedSecret {
                name: OPENAI_API_KEY_VAR,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn accepted_key_passes_verification() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [0.1, 0.2]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = openai_pipeline(&server).await;
        pipeline.verify_credentials().await.unwrap();
        assert_eq!(pipeline.embedder.dimensions(), Some(2));
    }

    #[tokio::test]
    async fn pipeline_namespace_follows_policy() {
        let mut config = mock_config();
        config.index.namespace_policy = NamespacePolicy::Normalized;
        let app = AppBuilder::from_config(config).unwrap();
        let pipeline = app
            .build_with_vectors(Arc::new(InMemoryVectorStore::new()))
            .await
            .unwrap();
        assert_eq!(
            pipeline
                .namespace("https://GitHub.com/o/r.git")
                .unwrap()
                .as_str(),
            "github.com/o/r"
        );
    }
}
