//! LanceDB Vector Store - 영구 벡터 저장소
//!
//! 컬렉션 하나가 LanceDB 테이블 하나입니다. 스키마는
//! `(id Utf8, text Utf8, embedding FixedSizeList<Float32, dim>)` 입니다.
//! ref: https://lancedb.github.io/lancedb/

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::DistanceType;

use crate::error::{RagError, Result};

use super::vector::{
    check_dimensions, document_of, Collection, DistanceMetric, QueryHit, VectorEntry, VectorStore,
};

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// 프로세스 시작 시 한 번 만들고 검색기/적재기에 참조로 넘깁니다.
pub struct LanceVectorStore {
    db: Connection,
    path: PathBuf,
    dimension: usize,
    metric: DistanceMetric,
}

impl LanceVectorStore {
    /// 저장소 열기
    ///
    /// `reset`이 true면 기존 디렉토리를 지우고 새로 만듭니다.
    ///
    /// # Arguments
    /// * `path` - LanceDB 디렉토리
    /// * `dimension` - 새 컬렉션의 임베딩 차원
    /// * `metric` - 조회 거리 함수
    /// * `reset` - 파괴적 초기화 여부
    pub async fn initialize(
        path: &Path,
        dimension: usize,
        metric: DistanceMetric,
        reset: bool,
    ) -> Result<Self> {
        if reset && path.exists() {
            tracing::info!("Removing existing vector store at {}", path.display());
            tokio::fs::remove_dir_all(path)
                .await
                .map_err(|e| RagError::store("Failed to remove vector store", e))?;
        }

        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| RagError::store("Failed to create vector store directory", e))?;

        let path_str = path
            .to_str()
            .ok_or_else(|| RagError::StoreUnavailable("Invalid path encoding".to_string()))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .map_err(|e| RagError::store("Failed to connect to LanceDB", e))?;

        tracing::info!(
            "Vector store initialized at {} (dimension={}, metric={})",
            path.display(),
            dimension,
            metric.as_str()
        );

        Ok(Self {
            db,
            path: path.to_path_buf(),
            dimension,
            metric,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 컬렉션 테이블 스키마 생성
    fn create_schema(dimension: usize) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
        ])
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self, name: &str) -> Result<bool> {
        let names = self.db.table_names().execute().await?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn open_collection(&self, name: &str) -> Result<LanceCollection> {
        let table = self.db.open_table(name).execute().await?;
        let schema = table.schema().await?;
        let dimension = embedding_dimension(&schema).unwrap_or(self.dimension);

        Ok(LanceCollection {
            name: name.to_string(),
            table,
            dimension,
            metric: self.metric,
        })
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn get_or_create_collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        if name.trim().is_empty() {
            return Err(RagError::InvalidInput("collection name must not be empty".into()));
        }

        tracing::info!("Retrieving {} collection", name);

        if !self.table_exists(name).await? {
            let schema = Arc::new(Self::create_schema(self.dimension));
            if let Err(e) = self.db.create_empty_table(name, schema).execute().await {
                // 동시에 다른 호출이 만든 경우는 그대로 연다
                if !self.table_exists(name).await? {
                    return Err(RagError::store("Failed to create collection", e));
                }
            } else {
                tracing::info!("Created collection {}", name);
            }
        }

        Ok(Arc::new(self.open_collection(name).await?))
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self.db.table_names().execute().await?)
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

// ============================================================================
// LanceCollection
// ============================================================================

/// LanceDB 테이블 기반 컬렉션
pub struct LanceCollection {
    name: String,
    table: lancedb::table::Table,
    dimension: usize,
    metric: DistanceMetric,
}

impl LanceCollection {
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// `id` 기준 merge insert (단일 커밋)
    ///
    /// 같은 ID는 교체, 새 ID는 추가합니다. `delete_filter`가 있으면 입력에 없는
    /// 기존 행 중 필터에 맞는 행을 같은 커밋에서 삭제합니다.
    async fn merge(&self, entries: &[VectorEntry], delete_filter: Option<String>) -> Result<()> {
        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let mut merge = self.table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        if let Some(filter) = delete_filter {
            merge.when_not_matched_by_source_delete(Some(filter));
        }

        merge
            .execute(Box::new(batches))
            .await
            .map_err(|e| RagError::store("Failed to merge vectors into table", e))
    }

    /// 주어진 문서들에 속한 기존 청크 ID
    async fn chunk_ids_of(&self, document_ids: &[String]) -> Result<Vec<String>> {
        if document_ids.is_empty() {
            return Ok(vec![]);
        }

        let documents: HashSet<&str> = document_ids.iter().map(String::as_str).collect();
        let filter = prefix_filter(documents.iter().copied());

        let candidates = self
            .table
            .count_rows(Some(filter.clone()))
            .await
            .map_err(|e| RagError::store("Failed to count rows", e))?;
        if candidates == 0 {
            return Ok(vec![]);
        }

        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .only_if(filter)
            .select(Select::columns(&["id"]))
            .limit(candidates)
            .execute()
            .await
            .map_err(|e| RagError::store("Failed to scan chunk ids", e))?
            .try_collect()
            .await
            .map_err(|e| RagError::store("Failed to collect chunk ids", e))?;

        // LIKE의 `_`/`%`는 와일드카드라 후보가 넓을 수 있음
        let mut ids = Vec::new();
        for batch in &batches {
            let column = string_column(batch, "id")?;
            for i in 0..batch.num_rows() {
                let id = column.value(i);
                if document_of(id).is_some_and(|doc| documents.contains(doc)) {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .map_err(|e| RagError::store("Failed to create embedding array", e))?;

        RecordBatch::try_new(
            Arc::new(LanceVectorStore::create_schema(self.dimension)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings_list),
            ],
        )
        .map_err(|e| RagError::store("Failed to create RecordBatch", e))
    }
}

#[async_trait]
impl Collection for LanceCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        check_dimensions(entries, Some(self.dimension))?;
        let entries = dedup_by_id(entries);

        self.merge(&entries, None).await?;

        tracing::debug!("Upserted {} vectors into {}", entries.len(), self.name);
        Ok(entries.len())
    }

    async fn replace_documents(
        &self,
        document_ids: &[String],
        entries: &[VectorEntry],
    ) -> Result<usize> {
        check_dimensions(entries, Some(self.dimension))?;
        let entries = dedup_by_id(entries);

        let fresh: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let stale: Vec<String> = self
            .chunk_ids_of(document_ids)
            .await?
            .into_iter()
            .filter(|id| !fresh.contains(id.as_str()))
            .collect();

        if entries.is_empty() {
            if !stale.is_empty() {
                self.table
                    .delete(&id_filter(stale.iter().map(String::as_str)))
                    .await
                    .map_err(|e| RagError::store("Failed to delete stale vectors", e))?;
            }
            return Ok(0);
        }

        let delete_filter = (!stale.is_empty()).then(|| id_filter(stale.iter().map(String::as_str)));
        self.merge(&entries, delete_filter).await?;

        tracing::debug!(
            "Replaced {} documents in {}: {} vectors written, {} stale removed",
            document_ids.len(),
            self.name,
            entries.len(),
            stale.len()
        );
        Ok(entries.len())
    }

    async fn query(&self, query_embedding: &[f32], n_results: usize) -> Result<Vec<QueryHit>> {
        if n_results == 0 || self.count().await? == 0 {
            return Ok(vec![]);
        }

        if query_embedding.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query_embedding.len(),
            });
        }

        let results = self
            .table
            .vector_search(query_embedding.to_vec())
            .map_err(|e| RagError::store("Failed to create vector search", e))?
            .distance_type(distance_type(self.metric))
            .limit(n_results)
            .execute()
            .await
            .map_err(|e| RagError::store("Failed to execute vector search", e))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| RagError::store("Failed to collect search results", e))?;

        let mut hits = Vec::new();

        for batch in batches {
            let ids = string_column(&batch, "id")?;
            let texts = string_column(&batch, "text")?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| RagError::StoreUnavailable("Missing _distance column".into()))?;

            for i in 0..batch.num_rows() {
                hits.push(QueryHit {
                    id: ids.value(i).to_string(),
                    text: texts.value(i).to_string(),
                    distance: distances.value(i),
                });
            }
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| RagError::store("Failed to count rows", e))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn distance_type(metric: DistanceMetric) -> DistanceType {
    match metric {
        DistanceMetric::L2 => DistanceType::L2,
        DistanceMetric::Cosine => DistanceType::Cosine,
    }
}

/// 스키마에서 임베딩 차원 읽기
fn embedding_dimension(schema: &SchemaRef) -> Option<usize> {
    match schema.field_with_name("embedding").ok()?.data_type() {
        DataType::FixedSizeList(_, size) => Some(*size as usize),
        _ => None,
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RagError::StoreUnavailable(format!("Missing {} column", name)))
}

/// 같은 호출 안의 중복 ID는 마지막 엔트리만 남김 (첫 등장 위치 유지)
pub(crate) fn dedup_by_id(entries: &[VectorEntry]) -> Vec<VectorEntry> {
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
    let mut result: Vec<VectorEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match positions.get(entry.id.as_str()) {
            Some(&i) => result[i] = entry.clone(),
            None => {
                positions.insert(entry.id.as_str(), result.len());
                result.push(entry.clone());
            }
        }
    }
    result
}

/// 문서별 청크 후보 필터: `id LIKE 'a-%' OR id LIKE 'b-%'`
fn prefix_filter<'a>(documents: impl Iterator<Item = &'a str>) -> String {
    let clauses: Vec<String> = documents
        .map(|doc| {
            let literal = doc.replace('\\', "\\\\").replace('\'', "''");
            format!("id LIKE '{}-%'", literal)
        })
        .collect();
    clauses.join(" OR ")
}

/// `id IN ('a', 'b')` 필터 (작은따옴표 이스케이프)
fn id_filter<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = ids
        .map(|id| format!("'{}'", id.replace('\'', "''")))
        .collect();
    format!("id IN ({})", quoted.join(", "))
}

// ============================================================================
// Tests
// ============================================================================
