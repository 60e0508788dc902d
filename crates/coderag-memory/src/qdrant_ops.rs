//! Qdrant-backed [`VectorStore`] with namespace isolation by payload filter.

use std::collections::HashMap;
use std::time::Duration;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    CollectionInfo, Condition, CountPointsBuilder, CreateCollectionBuilder,
    CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance, FieldType, Filter, PointId,
    PointStruct, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
    value::Kind, vectors_config,
};

use crate::vector_store::{
    BoxFuture, NAMESPACE_FIELD, ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError,
};

type QdrantResult<T> = Result<T, Box<qdrant_client::QdrantError>>;

/// Connection settings for [`QdrantOps`].
#[derive(Clone)]
pub struct QdrantSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for QdrantSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantSettings")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("collection", &self.collection)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Thin wrapper over [`Qdrant`] scoped to one collection.
///
/// Every point carries a keyword `namespace` payload field and every read or
/// delete is filtered on it.
#[derive(Clone)]
pub struct QdrantOps {
    client: Qdrant,
    collection: String,
}

impl std::fmt::Debug for QdrantOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantOps")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl QdrantOps {
    /// Create a new `QdrantOps` connected to the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(settings: &QdrantSettings) -> QdrantResult<Self> {
        let client = Qdrant::from_url(&settings.url)
            .api_key(settings.api_key.clone())
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout)
            .build()
            .map_err(Box::new)?;
        Ok(Self {
            client,
            collection: settings.collection.clone(),
        })
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Ensure the collection exists with cosine distance vectors and a keyword
    /// index on the namespace field.
    ///
    /// Idempotent: an existing collection is accepted as long as its vector
    /// size equals `vector_size`.
    ///
    /// # Errors
    ///
    /// Returns `VectorStoreError::Collection` if Qdrant cannot be reached,
    /// collection creation fails, or the existing collection was created with
    /// a different vector size.
    pub async fn ensure_collection(&self, vector_size: u64) -> Result<(), VectorStoreError> {
        let collection_error =
            |e: qdrant_client::QdrantError| VectorStoreError::Collection(e.to_string());

        if self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(collection_error)?
        {
            let info = self
                .client
                .collection_info(&self.collection)
                .await
                .map_err(collection_error)?;
            return match info.result.as_ref().and_then(vector_size_of) {
                Some(existing) if existing != vector_size => {
                    Err(VectorStoreError::Collection(format!(
                        "collection {} has vector size {existing}, requested {vector_size}",
                        self.collection
                    )))
                }
                _ => Ok(()),
            };
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
            )
            .await
            .map_err(collection_error)?;
        self.client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    NAMESPACE_FIELD,
                    FieldType::Keyword,
                )
                .wait(true),
            )
            .await
            .map_err(collection_error)?;
        tracing::info!(
            collection = %self.collection,
            vector_size,
            "created Qdrant collection"
        );
        Ok(())
    }

    /// Upsert points, waiting until they are visible to queries.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn upsert(&self, points: Vec<PointStruct>) -> QdrantResult<()> {
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Search for similar vectors within `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        filter: Filter,
        with_payload: bool,
    ) -> QdrantResult<Vec<ScoredPoint>> {
        let builder = SearchPointsBuilder::new(&self.collection, vector, limit)
            .filter(filter)
            .with_payload(with_payload);
        let results = self.client.search_points(builder).await.map_err(Box::new)?;
        Ok(results.result)
    }

    /// Delete every point matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub async fn delete_matching(&self, filter: Filter) -> QdrantResult<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Exact number of points matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the count request fails.
    pub async fn count_matching(&self, filter: Filter) -> QdrantResult<u64> {
        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(filter)
                    .exact(true),
            )
            .await
            .map_err(Box::new)?;
        Ok(response.result.map_or(0, |r| r.count))
    }

    /// Convert a JSON value to a Qdrant payload map.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if deserialization fails.
    pub fn json_to_payload(
        value: serde_json::Value,
    ) -> Result<HashMap<String, qdrant_client::qdrant::Value>, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Size of the collection's unnamed vector, if it has one.
fn vector_size_of(info: &CollectionInfo) -> Option<u64> {
    let config = info
        .config
        .as_ref()?
        .params
        .as_ref()?
        .vectors_config
        .as_ref()?
        .config
        .as_ref()?;
    if let vectors_config::Config::Params(params) = config {
        Some(params.size)
    } else {
        None
    }
}

/// Mandatory filter restricting an operation to one namespace.
#[must_use]
pub fn namespace_filter(namespace: &str) -> Filter {
    Filter::must([Condition::matches(NAMESPACE_FIELD, namespace.to_owned())])
}

fn vector_point_to_qdrant(
    namespace: &str,
    point: VectorPoint,
) -> Result<PointStruct, VectorStoreError> {
    let mut object: serde_json::Map<String, serde_json::Value> =
        point.payload.into_iter().collect();
    object.insert(
        NAMESPACE_FIELD.to_owned(),
        serde_json::Value::String(namespace.to_owned()),
    );
    let payload = QdrantOps::json_to_payload(serde_json::Value::Object(object))
        .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
    Ok(PointStruct::new(point.id, point.vector, payload))
}

impl VectorStore for QdrantOps {
    fn ensure_collection(&self, vector_size: u64) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        Box::pin(async move {
            self.ensure_collection(vector_size).await
        })
    }

    fn upsert(
        &self,
        namespace: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let namespace = namespace.to_owned();
        Box::pin(async move {
            if points.is_empty() {
                return Ok(());
            }
            let qdrant_points = points
                .into_iter()
                .map(|p| vector_point_to_qdrant(&namespace, p))
                .collect::<Result<Vec<_>, _>>()?;
            self.upsert(qdrant_points)
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))
        })
    }

    fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: u64,
        include_metadata: bool,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let namespace = namespace.to_owned();
        Box::pin(async move {
            let results = self
                .search(vector, top_k, namespace_filter(&namespace), include_metadata)
                .await
                .map_err(|e| VectorStoreError::Query(e.to_string()))?;
            Ok(results.into_iter().map(scored_point_to_vector).collect())
        })
    }

    fn delete(
        &self,
        namespace: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let namespace = namespace.to_owned();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(());
            }
            let point_ids: Vec<PointId> = ids.into_iter().map(PointId::from).collect();
            let filter = Filter::must([
                Condition::matches(NAMESPACE_FIELD, namespace),
                Condition::has_id(point_ids),
            ]);
            self.delete_matching(filter)
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))
        })
    }

    fn delete_namespace(&self, namespace: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let namespace = namespace.to_owned();
        Box::pin(async move {
            self.delete_matching(namespace_filter(&namespace))
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))
        })
    }

    fn count(&self, namespace: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let namespace = namespace.to_owned();
        Box::pin(async move {
            self.count_matching(namespace_filter(&namespace))
                .await
                .map_err(|e| VectorStoreError::Query(e.to_string()))
        })
    }
}

fn scored_point_to_vector(point: ScoredPoint) -> ScoredVectorPoint {
    let payload: HashMap<String, serde_json::Value> = point
        .payload
        .into_iter()
        .filter_map(|(k, v)| {
            let json_val = match v.kind? {
                Kind::StringValue(s) => serde_json::Value::String(s),
                Kind::IntegerValue(i) => serde_json::Value::Number(i.into()),
                Kind::DoubleValue(d) => {
                    serde_json::Number::from_f64(d).map(serde_json::Value::Number)?
                }
                Kind::BoolValue(b) => serde_json::Value::Bool(b),
                _ => return None,
            };
            Some((k, json_val))
        })
        .collect();

    let id = match point.id.and_then(|pid| pid.point_id_options) {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    };

    ScoredVectorPoint {
        id,
        score: point.score,
        payload,
    }
}
