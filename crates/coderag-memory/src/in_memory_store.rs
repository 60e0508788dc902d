use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::vector_store::{
    BoxFuture, NAMESPACE_FIELD, ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError,
};

struct StoredPoint {
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
}

#[derive(Default)]
struct Inner {
    vector_size: Option<u64>,
    /// namespace -> id -> point. Ordered maps keep tie-breaking stable.
    namespaces: HashMap<String, BTreeMap<String, StoredPoint>>,
}

/// Process-local vector store with the same namespace semantics as Qdrant.
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .finish_non_exhaustive()
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(&self, vector_size: u64) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        Box::pin(async move {
            let mut inner = self
                .inner
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            match inner.vector_size {
                None => inner.vector_size = Some(vector_size),
                Some(existing) if existing != vector_size => {
                    return Err(VectorStoreError::Collection(format!(
                        "collection has vector size {existing}, requested {vector_size}"
                    )));
                }
                Some(_) => {}
            }
            Ok(())
        })
    }

    fn upsert(
        &self,
        namespace: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let namespace = namespace.to_owned();
        Box::pin(async move {
            let mut inner = self
                .inner
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let Some(size) = inner.vector_size else {
                return Err(VectorStoreError::Upsert("collection not found".into()));
            };
            if let Some(bad) = points.iter().find(|p| p.vector.len() as u64 != size) {
                return Err(VectorStoreError::Upsert(format!(
                    "point {} has {} dimensions, collection expects {size}",
                    bad.id,
                    bad.vector.len()
                )));
            }
            let partition = inner.namespaces.entry(namespace.clone()).or_default();
            for p in points {
                let mut payload = p.payload;
                payload.insert(
                    NAMESPACE_FIELD.to_owned(),
                    serde_json::Value::String(namespace.clone()),
                );
                partition.insert(
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        payload,
                    },
                );
            }
            Ok(())
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
            let inner = self
                .inner
                .read()
                .map_err(|e| VectorStoreError::Query(e.to_string()))?;
            if inner.vector_size.is_none() {
                return Err(VectorStoreError::Query("collection not found".into()));
            }
            let Some(partition) = inner.namespaces.get(&namespace) else {
                return Ok(Vec::new());
            };

            let mut scored: Vec<ScoredVectorPoint> = partition
                .iter()
                .map(|(id, sp)| ScoredVectorPoint {
                    id: id.clone(),
                    score: cosine_similarity(&vector, &sp.vector),
                    payload: if include_metadata {
                        sp.payload.clone()
                    } else {
                        HashMap::new()
                    },
                })
                .collect();

            // stable sort: equal scores keep id order
            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            scored.truncate(usize::try_from(top_k).unwrap_or(usize::MAX));
            Ok(scored)
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
            let mut inner = self
                .inner
                .write()
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            if let Some(partition) = inner.namespaces.get_mut(&namespace) {
                for id in &ids {
                    partition.remove(id);
                }
            }
            Ok(())
        })
    }

    fn delete_namespace(&self, namespace: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let namespace = namespace.to_owned();
        Box::pin(async move {
            let mut inner = self
                .inner
                .write()
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            inner.namespaces.remove(&namespace);
            Ok(())
        })
    }

    fn count(&self, namespace: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let namespace = namespace.to_owned();
        Box::pin(async move {
            let inner = self
                .inner
                .read()
                .map_err(|e| VectorStoreError::Query(e.to_string()))?;
            Ok(inner
                .namespaces
                .get(&namespace)
                .map_or(0, |p| p.len() as u64))
        })
    }
}
