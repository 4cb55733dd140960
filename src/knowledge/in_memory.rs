//! 인메모리 벡터 저장소
//!
//! LanceDB 없이 같은 트레이트 계약을 제공합니다. 테스트와 일회성 실행용이며
//! 프로세스가 끝나면 내용이 사라집니다.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::error::{RagError, Result};

use super::lance::dedup_by_id;
use super::vector::{
    check_dimensions, document_of, Collection, DistanceMetric, QueryHit, VectorEntry, VectorStore,
};

/// 인메모리 저장소
pub struct InMemoryVectorStore {
    collections: Mutex<HashMap<String, Arc<InMemoryCollection>>>,
    metric: DistanceMetric,
}

impl InMemoryVectorStore {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            metric,
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(DistanceMetric::default())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn get_or_create_collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        if name.trim().is_empty() {
            return Err(RagError::InvalidInput("collection name must not be empty".into()));
        }

        let mut collections = self
            .collections
            .lock()
            .map_err(|e| RagError::store("Lock error", e))?;

        let collection = collections
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(InMemoryCollection {
                    name: name.to_string(),
                    entries: RwLock::new(Vec::new()),
                    metric: self.metric,
                })
            })
            .clone();

        Ok(collection)
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        let collections = self
            .collections
            .lock()
            .map_err(|e| RagError::store("Lock error", e))?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

/// 인메모리 컬렉션 (삽입 순서 유지)
pub struct InMemoryCollection {
    name: String,
    entries: RwLock<Vec<VectorEntry>>,
    metric: DistanceMetric,
}

#[async_trait]
impl Collection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut stored = self
            .entries
            .write()
            .map_err(|e| RagError::store("Lock error", e))?;

        let existing_dim = stored.first().map(|e| e.embedding.len());
        check_dimensions(entries, existing_dim)?;

        let entries = dedup_by_id(entries);
        for entry in &entries {
            match stored.iter_mut().find(|e| e.id == entry.id) {
                Some(slot) => *slot = entry.clone(),
                None => stored.push(entry.clone()),
            }
        }

        Ok(entries.len())
    }

    async fn replace_documents(
        &self,
        document_ids: &[String],
        entries: &[VectorEntry],
    ) -> Result<usize> {
        let mut stored = self
            .entries
            .write()
            .map_err(|e| RagError::store("Lock error", e))?;

        if !entries.is_empty() {
            let existing_dim = stored.first().map(|e| e.embedding.len());
            check_dimensions(entries, existing_dim)?;
        }

        let entries = dedup_by_id(entries);
        let documents: HashSet<&str> = document_ids.iter().map(String::as_str).collect();
        let fresh: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();

        stored.retain(|e| {
            fresh.contains(e.id.as_str())
                || !document_of(&e.id).is_some_and(|doc| documents.contains(doc))
        });

        for entry in &entries {
            match stored.iter_mut().find(|e| e.id == entry.id) {
                Some(slot) => *slot = entry.clone(),
                None => stored.push(entry.clone()),
            }
        }

        Ok(entries.len())
    }

    async fn query(&self, query_embedding: &[f32], n_results: usize) -> Result<Vec<QueryHit>> {
        let stored = self
            .entries
            .read()
            .map_err(|e| RagError::store("Lock error", e))?;

        let Some(first) = stored.first() else {
            return Ok(vec![]);
        };
        if first.embedding.len() != query_embedding.len() {
            return Err(RagError::DimensionMismatch {
                expected: first.embedding.len(),
                actual: query_embedding.len(),
            });
        }

        let mut hits: Vec<QueryHit> = stored
            .iter()
            .map(|e| QueryHit {
                id: e.id.clone(),
                text: e.text.clone(),
                distance: self.metric.distance(query_embedding, &e.embedding),
            })
            .collect();

        // 안정 정렬: 동일 거리는 삽입 순서
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let stored = self
            .entries
            .read()
            .map_err(|e| RagError::store("Lock error", e))?;
        Ok(stored.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            id: id.to_string(),
            text: id.to_uppercase(),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_collection() {
        let store = InMemoryVectorStore::default();
        let a = store.get_or_create_collection("publications").await.unwrap();
        a.upsert(&[entry("x", vec![1.0, 0.0])]).await.unwrap();

        let b = store.get_or_create_collection("publications").await.unwrap();
        assert_eq!(b.count().await.unwrap(), 1);
        assert_eq!(store.collection_names().await.unwrap(), vec!["publications"]);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_id() {
        let store = InMemoryVectorStore::default();
        let c = store.get_or_create_collection("c").await.unwrap();
        let batch = vec![entry("a", vec![1.0, 0.0]), entry("b", vec![0.0, 1.0])];

        c.upsert(&batch).await.unwrap();
        let again = store.get_or_create_collection("c").await.unwrap();
        again.upsert(&batch).await.unwrap();
        assert_eq!(again.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_query_sorted_and_limited() {
        let store = InMemoryVectorStore::new(DistanceMetric::Cosine);
        let c = store.get_or_create_collection("c").await.unwrap();
        c.upsert(&[
            entry("far", vec![0.0, 1.0]),
            entry("near", vec![1.0, 0.05]),
            entry("exact", vec![2.0, 0.0]),
        ])
        .await
        .unwrap();

        let hits = c.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "exact");
        assert_eq!(hits[1].id, "near");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_empty_collection_query() {
        let store = InMemoryVectorStore::default();
        let c = store.get_or_create_collection("c").await.unwrap();
        assert!(c.query(&[1.0, 2.0, 3.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let store = InMemoryVectorStore::default();
        let c = store.get_or_create_collection("c").await.unwrap();

        let err = c
            .upsert(&[entry("a", vec![1.0, 0.0]), entry("b", vec![1.0])])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "dimension_mismatch");

        c.upsert(&[entry("a", vec![1.0, 0.0])]).await.unwrap();
        let err = c.upsert(&[entry("c", vec![1.0, 0.0, 0.0])]).await.unwrap_err();
        assert_eq!(err.kind(), "dimension_mismatch");
    }

    #[tokio::test]
    async fn test_replace_documents_drops_stale_chunks() {
        let store = InMemoryVectorStore::default();
        let c = store.get_or_create_collection("c").await.unwrap();
        c.upsert(&[
            entry("d-0", vec![1.0, 0.0]),
            entry("d-1", vec![1.0, 0.0]),
            entry("d-2", vec![1.0, 0.0]),
            entry("d-1-0", vec![0.0, 1.0]),
            entry("other-0", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();

        let replaced = c
            .replace_documents(&["d".to_string()], &[entry("d-0", vec![0.5, 0.5])])
            .await
            .unwrap();
        assert_eq!(replaced, 1);

        let mut ids: Vec<String> = c
            .query(&[1.0, 0.0], 10)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["d-0", "d-1-0", "other-0"]);
    }
}
