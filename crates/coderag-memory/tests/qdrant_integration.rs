use std::collections::HashMap;
use std::time::Duration;

use coderag_memory::{QdrantOps, QdrantSettings, VectorPoint, VectorStore, VectorStoreError};
use testcontainers::ContainerAsync;
use testcontainers::GenericImage;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;

const QDRANT_GRPC_PORT: ContainerPort = ContainerPort::Tcp(6334);

fn qdrant_image() -> GenericImage {
    GenericImage::new("qdrant/qdrant", "v1.16.0")
        .with_wait_for(WaitFor::message_on_stdout("gRPC listening"))
        .with_exposed_port(QDRANT_GRPC_PORT)
}

async fn setup_with_qdrant() -> (QdrantOps, ContainerAsync<GenericImage>) {
    let container = qdrant_image().start().await.unwrap();
    let grpc_port = container.get_host_port_ipv4(6334).await.unwrap();
    let ops = QdrantOps::new(&QdrantSettings {
        url: format!("http://127.0.0.1:{grpc_port}"),
        api_key: None,
        collection: "codebase_rag".into(),
        timeout: Duration::from_secs(10),
    })
    .unwrap();
    (ops, container)
}

fn point(namespace: &str, key: &str, vector: Vec<f32>, text: &str) -> VectorPoint {
    let id = uuid::Uuid::new_v5(
        &uuid::Uuid::NAMESPACE_OID,
        format!("{namespace}\0{key}").as_bytes(),
    );
    VectorPoint {
        id: id.to_string(),
        vector,
        payload: HashMap::from([("text".into(), serde_json::json!(text))]),
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn ensure_collection_is_idempotent() {
    let (qdrant, _container) = setup_with_qdrant().await;

    VectorStore::ensure_collection(&qdrant, 4).await.unwrap();
    VectorStore::ensure_collection(&qdrant, 4).await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn ensure_collection_rejects_other_vector_size() {
    let (qdrant, _container) = setup_with_qdrant().await;

    VectorStore::ensure_collection(&qdrant, 4).await.unwrap();
    let err = VectorStore::ensure_collection(&qdrant, 8).await.unwrap_err();
    assert!(
        matches!(err, VectorStoreError::Collection(ref msg) if msg.contains("vector size 4"))
    );
}

#[tokio::test]
#[ignore = "requires docker"]
async fn upsert_and_query_within_namespace() {
    let (qdrant, _container) = setup_with_qdrant().await;
    VectorStore::ensure_collection(&qdrant, 4).await.unwrap();

    let points = vec![
        point("repo-a", "add", vec![1.0, 0.0, 0.0, 0.0], "src/a.js\nfunction add() {}"),
        point("repo-a", "mul", vec![0.0, 1.0, 0.0, 0.0], "src/a.js\n(a,b) => a*b"),
    ];
    VectorStore::upsert(&qdrant, "repo-a", points).await.unwrap();

    let hits = qdrant
        .query("repo-a", vec![1.0, 0.0, 0.0, 0.0], 5, true)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].payload["text"], "src/a.js\nfunction add() {}");
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn namespaces_never_leak() {
    let (qdrant, _container) = setup_with_qdrant().await;
    VectorStore::ensure_collection(&qdrant, 4).await.unwrap();

    VectorStore::upsert(
        &qdrant,
        "repo-a",
        vec![point("repo-a", "x", vec![1.0, 0.0, 0.0, 0.0], "a")],
    )
    .await
    .unwrap();
    VectorStore::upsert(
        &qdrant,
        "repo-b",
        vec![point("repo-b", "x", vec![1.0, 0.0, 0.0, 0.0], "b")],
    )
    .await
    .unwrap();

    let hits = qdrant
        .query("repo-b", vec![1.0, 0.0, 0.0, 0.0], 10, true)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload["text"], "b");

    qdrant.delete_namespace("repo-a").await.unwrap();
    assert_eq!(qdrant.count("repo-a").await.unwrap(), 0);
    assert_eq!(qdrant.count("repo-b").await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn delete_by_id_is_scoped_to_namespace() {
    let (qdrant, _container) = setup_with_qdrant().await;
    VectorStore::ensure_collection(&qdrant, 4).await.unwrap();

    let p = point("repo-a", "x", vec![1.0, 0.0, 0.0, 0.0], "a");
    let id = p.id.clone();
    VectorStore::upsert(&qdrant, "repo-a", vec![p]).await.unwrap();

    qdrant.delete("repo-b", vec![id.clone()]).await.unwrap();
    assert_eq!(qdrant.count("repo-a").await.unwrap(), 1);

    qdrant.delete("repo-a", vec![id]).await.unwrap();
    assert_eq!(qdrant.count("repo-a").await.unwrap(), 0);
}
