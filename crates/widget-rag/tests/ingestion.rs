//! End-to-end ingestion through the orchestrator

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use widget_rag::error::Error;
use widget_rag::index::point_id;
use widget_rag::providers::{EmbeddingProvider, VectorStoreProvider};
use widget_rag::storage::KnowledgeBaseRepository;
use widget_rag::KnowledgeBaseStatus;

const WIDGET: &str = "3f2a9c1b-widget";

fn scenario_text() -> String {
    "abcdefghi ".repeat(250)
}

#[tokio::test]
async fn test_plain_text_ingests_into_three_chunks() {
    let embedder = Arc::new(HashingEmbedder::new(DIMS));
    let h = Harness::new(embedder.clone());

    let text = scenario_text();
    assert_eq!(text.chars().count(), 2500);
    h.put("docs/faq.txt", &text).await;
    let kb = h.register(WIDGET, "docs/faq.txt", "text/plain").await;

    let report = h
        .orchestrator
        .ingest(kb.id, "docs/faq.txt", "text/plain")
        .await
        .unwrap();
    assert_eq!(report.chunk_count, 3);
    assert_eq!(report.removed_stale, 0);
    assert_eq!(embedder.calls(), 3);

    let record = h.reload(kb.id).await;
    assert_eq!(record.status, KnowledgeBaseStatus::Completed);
    assert_eq!(record.chunk_count, 3);
    assert!(record.processed_at.is_some());
    assert!(record.error_message.is_none());

    let expected: Vec<_> = (0..3).map(|i| point_id(&kb.id, i)).collect();
    assert_eq!(record.vector_ids, expected);
    assert_eq!(report.vector_ids, expected);

    let collection = h.index.collection_for(WIDGET);
    assert_eq!(collection, "kb_3f2a9c1b");
    assert_eq!(h.vectors.count(&collection).await.unwrap(), 3);

    let contents: Vec<String> = expected
        .iter()
        .map(|id| h.vectors.get(&collection, id).unwrap().payload.content)
        .collect();
    for content in &contents {
        assert!(content.chars().count() <= 1000);
    }
    let first: Vec<char> = contents[0].chars().collect();
    let second: Vec<char> = contents[1].chars().collect();
    assert_eq!(first[first.len() - 200..], second[..200]);
}

#[tokio::test]
async fn test_unknown_media_type_fails_without_vectors() {
    let embedder = Arc::new(HashingEmbedder::new(DIMS));
    let h = Harness::new(embedder.clone());
    h.put("docs/blob.bin", "whatever").await;
    let kb = h.register(WIDGET, "docs/blob.bin", "application/unknown").await;

    let err = h
        .orchestrator
        .ingest(kb.id, "docs/blob.bin", "application/unknown")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedMediaType(_)));

    let record = h.reload(kb.id).await;
    assert_eq!(record.status, KnowledgeBaseStatus::Failed);
    let message = record.error_message.unwrap();
    assert!(message.contains("application/unknown"), "{}", message);
    assert!(record.vector_ids.is_empty());
    assert_eq!(record.chunk_count, 0);

    assert!(h.vectors.collections().is_empty());
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let h = Harness::new(Arc::new(HashingEmbedder::new(DIMS)));
    let first = h.ingest_text(WIDGET, "docs/a.txt", &scenario_text()).await;

    let report = h
        .orchestrator
        .ingest(first.id, "docs/a.txt", "text/plain")
        .await
        .unwrap();
    let second = h.reload(first.id).await;

    assert_eq!(second.status, KnowledgeBaseStatus::Completed);
    assert_eq!(second.vector_ids, first.vector_ids);
    assert_eq!(second.chunk_count, first.chunk_count);
    assert_eq!(report.removed_stale, 0);

    let collection = h.index.collection_for(WIDGET);
    assert_eq!(h.vectors.count(&collection).await.unwrap(), 3);
}

#[tokio::test]
async fn test_reingest_of_shorter_source_removes_stale_points() {
    let h = Harness::new(Arc::new(HashingEmbedder::new(DIMS)));
    let kb = h.ingest_text(WIDGET, "docs/a.txt", &scenario_text()).await;
    assert_eq!(kb.chunk_count, 3);

    h.put("docs/a.txt", "Refunds are issued within 14 days.").await;
    let report = h
        .orchestrator
        .ingest(kb.id, "docs/a.txt", "text/plain")
        .await
        .unwrap();

    assert_eq!(report.chunk_count, 1);
    assert_eq!(report.removed_stale, 2);
    let collection = h.index.collection_for(WIDGET);
    assert_eq!(h.vectors.count(&collection).await.unwrap(), 1);
    assert_eq!(h.reload(kb.id).await.vector_ids, vec![point_id(&kb.id, 0)]);
}

#[tokio::test]
async fn test_failed_run_between_ingests_leaves_no_stale_points() {
    let h = Harness::new(Arc::new(HashingEmbedder::new(DIMS)));
    let long = words(2600, "w");
    let kb = h.ingest_text(WIDGET, "docs/a.txt", &long).await;
    assert!(kb.chunk_count >= 3, "{}", kb.chunk_count);
    let previous = kb.chunk_count as usize;

    // A failed run clears vector_ids on the record but leaves its points behind
    let err = h
        .orchestrator
        .ingest(kb.id, "docs/gone.txt", "text/plain")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ObjectNotFound(_)));
    assert!(h.reload(kb.id).await.vector_ids.is_empty());

    h.put("docs/a.txt", "Refunds are issued within 14 days.").await;
    let report = h
        .orchestrator
        .ingest(kb.id, "docs/a.txt", "text/plain")
        .await
        .unwrap();
    assert_eq!(report.chunk_count, 1);
    assert_eq!(report.removed_stale, previous - 1);

    let collection = h.index.collection_for(WIDGET);
    assert_eq!(h.vectors.count(&collection).await.unwrap(), 1);
    for query in [long.as_str(), "w1 w2 w3 w4", "Refunds"] {
        let results = h.retrieval.search(WIDGET, query, 10).await;
        assert_eq!(results.len(), 1, "query {:?}", query);
        assert_eq!(results[0].metadata["chunk_index"], 0);
        assert!(results[0].content.contains("Refunds"));
    }
}

#[tokio::test]
async fn test_reingest_records_new_source() {
    let h = Harness::new(Arc::new(HashingEmbedder::new(DIMS)));
    let kb = h.ingest_text(WIDGET, "docs/a.txt", "Orders ship in two days.").await;

    h.put("docs/b.md", "# Returns\n\nReturns are free.").await;
    h.orchestrator
        .ingest(kb.id, "docs/b.md", "text/markdown")
        .await
        .unwrap();

    let record = h.reload(kb.id).await;
    assert_eq!(record.status, KnowledgeBaseStatus::Completed);
    assert_eq!(record.source_key, "docs/b.md");
    assert_eq!(record.media_type, "text/markdown");

    let results = h.retrieval.search(WIDGET, "Returns are free", 5).await;
    assert_eq!(results[0].metadata["source_key"], "docs/b.md");
}

#[tokio::test]
async fn test_failed_job_can_be_retried() {
    let h = Harness::new(Arc::new(HashingEmbedder::new(DIMS)));
    let kb = h.register(WIDGET, "docs/late.txt", "text/plain").await;

    let err = h
        .orchestrator
        .ingest(kb.id, "docs/late.txt", "text/plain")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ObjectNotFound(_)));
    assert_eq!(h.reload(kb.id).await.status, KnowledgeBaseStatus::Failed);

    h.put("docs/late.txt", "Now the file exists.").await;
    h.orchestrator
        .ingest(kb.id, "docs/late.txt", "text/plain")
        .await
        .unwrap();

    let record = h.reload(kb.id).await;
    assert_eq!(record.status, KnowledgeBaseStatus::Completed);
    assert!(record.error_message.is_none());
    assert_eq!(record.chunk_count, 1);
}

#[tokio::test]
async fn test_empty_document_fails() {
    let h = Harness::new(Arc::new(HashingEmbedder::new(DIMS)));
    h.put("docs/empty.txt", "   \n\n  ").await;
    let kb = h.register(WIDGET, "docs/empty.txt", "text/plain").await;

    let err = h
        .orchestrator
        .ingest(kb.id, "docs/empty.txt", "text/plain")
        .await
        .unwrap_err();
    assert!(err.is_input_error());
    assert_eq!(h.reload(kb.id).await.status, KnowledgeBaseStatus::Failed);
}

#[tokio::test]
async fn test_embedding_outage_fails_job_after_retries() {
    let embedder = Arc::new(FailingEmbedder::new(true));
    let h = Harness::new(embedder.clone());
    h.put("docs/a.txt", "Short text").await;
    let kb = h.register(WIDGET, "docs/a.txt", "text/plain").await;

    let err = h
        .orchestrator
        .ingest(kb.id, "docs/a.txt", "text/plain")
        .await
        .unwrap_err();
    assert!(err.is_transient());

    let record = h.reload(kb.id).await;
    assert_eq!(record.status, KnowledgeBaseStatus::Failed);
    assert!(record.error_message.unwrap().contains("503"));
}

#[tokio::test]
async fn test_retrying_embedder_rides_out_transient_errors() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use widget_rag::providers::RetryingEmbedder;
    use widget_rag::retry::RetryPolicy;

    struct FlakyOnce {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for FlakyOnce {
        async fn embed(&self, text: &str) -> widget_rag::Result<Vec<f32>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                return Err(Error::transient("flaky", "HTTP 429 Too Many Requests"));
            }
            self.inner.embed(text).await
        }

        fn dimensions(&self) -> usize {
            DIMS
        }

        async fn health_check(&self) -> widget_rag::Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    let flaky = FlakyOnce {
        inner: HashingEmbedder::new(DIMS),
        calls: AtomicUsize::new(0),
    };
    let policy = RetryPolicy::new(3, Duration::from_millis(1), 2.0, Duration::from_millis(2));
    let mut config = test_config();
    config.processing.parallel_embeddings = Some(1);
    // One chunk per batch so each retry covers a single failing call
    config.embeddings.batch_size = 1;
    let h = Harness::with_config(config, Arc::new(RetryingEmbedder::new(flaky, policy)));

    let kb = h.ingest_text(WIDGET, "docs/a.txt", &scenario_text()).await;
    assert_eq!(kb.status, KnowledgeBaseStatus::Completed);
    assert_eq!(kb.chunk_count, 3);
}

#[tokio::test]
async fn test_chunks_are_embedded_in_batches() {
    use parking_lot::Mutex;

    struct Recording {
        inner: HashingEmbedder,
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for Recording {
        async fn embed(&self, text: &str) -> widget_rag::Result<Vec<f32>> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> widget_rag::Result<Vec<Vec<f32>>> {
            self.batches.lock().push(texts.len());
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.inner.vector(text));
            }
            Ok(vectors)
        }

        fn dimensions(&self) -> usize {
            DIMS
        }

        async fn health_check(&self) -> widget_rag::Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    let embedder = Arc::new(Recording {
        inner: HashingEmbedder::new(DIMS),
        batches: Mutex::new(Vec::new()),
    });
    let mut config = test_config();
    config.embeddings.batch_size = 2;
    let h = Harness::with_config(config, embedder.clone());

    let kb = h.ingest_text(WIDGET, "docs/a.txt", &scenario_text()).await;
    assert_eq!(kb.chunk_count, 3);

    let mut batches = embedder.batches.lock().clone();
    batches.sort_unstable();
    assert_eq!(batches, vec![1, 2]);
    assert_eq!(embedder.inner.calls(), 0);

    let expected: Vec<_> = (0..3).map(|i| point_id(&kb.id, i)).collect();
    assert_eq!(kb.vector_ids, expected);
}

#[tokio::test]
async fn test_vector_store_outage_fails_job() {
    use widget_rag::index::VectorIndexManager;
    use widget_rag::ingestion::DocumentLoader;
    use widget_rag::providers::{MemoryObjectStore, ObjectStore};
    use widget_rag::storage::SqliteKnowledgeBaseStore;
    use widget_rag::IngestionOrchestrator;

    let config = test_config();
    let repository = Arc::new(SqliteKnowledgeBaseStore::in_memory().unwrap());
    let objects = Arc::new(MemoryObjectStore::new());
    objects
        .put_object(BUCKET, "a.txt", bytes::Bytes::from_static(b"Some content"))
        .await
        .unwrap();

    let index = Arc::new(VectorIndexManager::from_config(
        Arc::new(FailingVectorStore),
        &config,
    ));
    let orchestrator = IngestionOrchestrator::from_config(
        &config,
        repository.clone(),
        DocumentLoader::new(objects, BUCKET),
        Arc::new(HashingEmbedder::new(DIMS)),
        index,
    );

    let kb = repository
        .create(widget_rag::NewKnowledgeBase::new(WIDGET, "a.txt", "text/plain"))
        .await
        .unwrap();
    let err = orchestrator.ingest(kb.id, "a.txt", "text/plain").await.unwrap_err();
    assert!(matches!(err, Error::VectorDb(_)));

    let record = repository.get(kb.id).await.unwrap().unwrap();
    assert_eq!(record.status, KnowledgeBaseStatus::Failed);
    assert!(record.error_message.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_concurrent_ingest_of_same_id_is_rejected() {
    let embedder = Arc::new(GatedEmbedder::new());
    let h = Harness::new(embedder.clone());
    h.put("docs/a.txt", &scenario_text()).await;
    let kb = h.register(WIDGET, "docs/a.txt", "text/plain").await;

    let handle = h
        .orchestrator
        .spawn_ingest(kb.id, "docs/a.txt".into(), "text/plain".into())
        .unwrap();

    // Wait until the first run has persisted `processing`
    for _ in 0..200 {
        if h.reload(kb.id).await.status == KnowledgeBaseStatus::Processing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.reload(kb.id).await.status, KnowledgeBaseStatus::Processing);
    assert!(h.orchestrator.is_in_flight(&kb.id));

    let err = h
        .orchestrator
        .ingest(kb.id, "docs/a.txt", "text/plain")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IngestionInFlight(id) if id == kb.id));

    let err = h
        .orchestrator
        .spawn_ingest(kb.id, "docs/a.txt".into(), "text/plain".into())
        .unwrap_err();
    assert!(matches!(err, Error::IngestionInFlight(id) if id == kb.id));
    assert_eq!(h.reload(kb.id).await.status, KnowledgeBaseStatus::Processing);

    embedder.open();
    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.chunk_count, 3);
    assert_eq!(h.reload(kb.id).await.status, KnowledgeBaseStatus::Completed);
    assert!(!h.orchestrator.is_in_flight(&kb.id));
}

#[tokio::test]
async fn test_run_timeout_marks_failed() {
    let mut config = test_config();
    config.processing.ingest_timeout_secs = 0;
    let h = Harness::with_config(config, Arc::new(GatedEmbedder::new()));
    h.put("docs/a.txt", "Never embedded").await;
    let kb = h.register(WIDGET, "docs/a.txt", "text/plain").await;

    let err = h
        .orchestrator
        .ingest(kb.id, "docs/a.txt", "text/plain")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));

    let record = h.reload(kb.id).await;
    assert_eq!(record.status, KnowledgeBaseStatus::Failed);
    assert!(record.error_message.unwrap().contains("Timed out"));
    assert!(!h.orchestrator.is_in_flight(&kb.id));
}

#[tokio::test]
async fn test_independent_jobs_run_in_parallel() {
    let h = Harness::new(Arc::new(HashingEmbedder::new(DIMS)));
    let mut handles = Vec::new();
    for i in 0..4 {
        let key = format!("docs/{}.txt", i);
        h.put(&key, &words(1800, &format!("doc{}w", i))).await;
        let kb = h.register(WIDGET, &key, "text/plain").await;
        let handle = h
            .orchestrator
            .spawn_ingest(kb.id, key, "text/plain".into())
            .unwrap();
        handles.push((kb.id, handle));
    }

    for (id, handle) in handles {
        handle.await.unwrap().unwrap();
        assert_eq!(h.reload(id).await.status, KnowledgeBaseStatus::Completed);
    }

    let counts = h.repository.status_counts(WIDGET).await.unwrap();
    assert_eq!(counts.completed, 4);
}

#[tokio::test]
async fn test_markdown_is_rendered_before_chunking() {
    let h = Harness::new(Arc::new(HashingEmbedder::new(DIMS)));
    h.put("docs/guide.md", "# Returns\n\nItems can be **returned** within 30 days.")
        .await;
    let kb = h.register(WIDGET, "docs/guide.md", "text/markdown").await;
    h.orchestrator
        .ingest(kb.id, "docs/guide.md", "text/markdown")
        .await
        .unwrap();

    let collection = h.index.collection_for(WIDGET);
    let point = h.vectors.get(&collection, &point_id(&kb.id, 0)).unwrap();
    assert!(point.payload.content.contains("returned within 30 days"));
    assert!(!point.payload.content.contains("**"));
    assert_eq!(point.payload.metadata["source_key"], "docs/guide.md");
    assert_eq!(point.payload.metadata["media_type"], "text/markdown");
}
