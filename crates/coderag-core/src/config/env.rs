use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_embedding();
        self.apply_env_overrides_index();
    }

    fn apply_env_overrides_embedding(&mut self) {
        if let Ok(v) = std::env::var("CODERAG_EMBEDDING_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.embedding.provider = kind;
            } else {
                tracing::warn!("ignoring invalid CODERAG_EMBEDDING_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CODERAG_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("CODERAG_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("CODERAG_EMBEDDING_DIMENSIONS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.embedding.dimensions = Some(n);
        }
        if let Ok(v) = std::env::var("CODERAG_EMBEDDING_BATCH_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.embedding.batch_size = n;
        }
        if let Ok(v) = std::env::var("CODERAG_EMBEDDING_MAX_CONCURRENT")
            && let Ok(n) = v.parse::<usize>()
        {
            self.embedding.max_concurrent_requests = n;
        }
        if let Ok(v) = std::env::var("CODERAG_EMBEDDING_MAX_INPUT_CHARS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.embedding.max_input_chars = n;
        }
        if let Ok(v) = std::env::var("CODERAG_EMBEDDING_MAX_RETRIES")
            && let Ok(n) = v.parse::<u32>()
        {
            self.embedding.max_retries = n;
        }
        if let Ok(v) = std::env::var("CODERAG_TIMEOUT_EMBEDDING")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.embedding_seconds = secs;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("CODERAG_QDRANT_URL") {
            self.vector_store.url = v;
        }
        if let Ok(v) = std::env::var("CODERAG_QDRANT_COLLECTION") {
            self.vector_store.collection = v;
        }
        if let Ok(v) = std::env::var("CODERAG_TIMEOUT_INDEX")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.index_seconds = secs;
        }
        if let Ok(v) = std::env::var("CODERAG_SQLITE_PATH") {
            self.index.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("CODERAG_INDEX_FILE_CONCURRENCY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.index.file_concurrency = n;
        }
        if let Ok(v) = std::env::var("CODERAG_INDEX_EXTRACT_METHODS")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.index.extract_methods = enabled;
        }
        if let Ok(v) = std::env::var("CODERAG_INDEX_PRUNE_STALE")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.index.prune_stale = enabled;
        }
        if let Ok(v) = std::env::var("CODERAG_INDEX_NAMESPACE_POLICY") {
            if let Ok(policy) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.index.namespace_policy = policy;
            } else {
                tracing::warn!("ignoring invalid CODERAG_INDEX_NAMESPACE_POLICY value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CODERAG_RETRIEVAL_TOP_K")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.top_k = n;
        }
        if let Ok(v) = std::env::var("CODERAG_RETRIEVAL_MATCH_CAP")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.match_cap = n;
        }
    }
}
