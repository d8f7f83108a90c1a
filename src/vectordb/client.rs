use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use tracing::{debug, info};

use super::error::VectorDbError;
use super::model::{ChunkPayload, SearchFilter, SearchResult, VectorPoint, fields};

/// Page size used when scrolling a collection.
const SCROLL_PAGE_SIZE: u32 = 256;

#[derive(Clone)]
/// Direct Qdrant client wrapper.
pub struct QdrantClient {
    client: Qdrant,
    url: String,
    /// Vector sizes of collections seen by `ensure_collection`.
    known_sizes: Arc<RwLock<HashMap<String, u64>>>,
}

impl QdrantClient {
    /// Creates a client for `url`.
    pub async fn new(url: &str) -> Result<Self, VectorDbError> {
        let client =
            Qdrant::from_url(url)
                .build()
                .map_err(|e| VectorDbError::ConnectionFailed {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;

        Ok(Self {
            client,
            url: url.to_string(),
            known_sizes: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Returns the underlying Qdrant client.
    pub fn client(&self) -> &Qdrant {
        &self.client
    }

    /// Returns the configured URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs a basic health check request.
    pub async fn health_check(&self) -> Result<(), VectorDbError> {
        self.client
            .health_check()
            .await
            .map_err(|e| VectorDbError::ConnectionFailed {
                url: self.url.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// Creates a collection with cosine distance.
    pub async fn create_collection(
        &self,
        name: &str,
        vector_size: u64,
    ) -> Result<(), VectorDbError> {
        let vectors_config = VectorParamsBuilder::new(vector_size, Distance::Cosine);

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(vectors_config)
                    .on_disk_payload(true),
            )
            .await
            .map_err(|e| VectorDbError::CreateCollectionFailed {
                collection: name.to_string(),
                message: e.to_string(),
            })?;

        info!(collection = name, vector_size, "Created collection");
        Ok(())
    }

    /// Ensures a cosine collection of `vector_size` exists (creates it if missing).
    ///
    /// An existing collection with another metric or size is rejected.
    pub async fn ensure_collection(
        &self,
        name: &str,
        vector_size: u64,
    ) -> Result<(), VectorDbError> {
        if self.collection_exists(name).await? {
            self.check_collection_params(name, vector_size).await?;
        } else {
            self.create_collection(name, vector_size).await?;
        }

        self.known_sizes.write().insert(name.to_string(), vector_size);
        Ok(())
    }

    async fn check_collection_params(
        &self,
        name: &str,
        vector_size: u64,
    ) -> Result<(), VectorDbError> {
        let info = self.client.collection_info(name).await.map_err(|e| {
            VectorDbError::QueryFailed {
                collection: name.to_string(),
                message: e.to_string(),
            }
        })?;

        let params = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        match params {
            Some(VectorsConfigKind::Params(p))
                if p.size == vector_size && p.distance == Distance::Cosine as i32 =>
            {
                Ok(())
            }
            Some(VectorsConfigKind::Params(p)) => Err(VectorDbError::MetricMismatch {
                collection: name.to_string(),
                expected_size: vector_size,
                actual: format!(
                    "{:?} distance with size {}",
                    Distance::try_from(p.distance).unwrap_or(Distance::UnknownDistance),
                    p.size
                ),
            }),
            Some(VectorsConfigKind::ParamsMap(_)) => Err(VectorDbError::MetricMismatch {
                collection: name.to_string(),
                expected_size: vector_size,
                actual: "named vectors".to_string(),
            }),
            None => Err(VectorDbError::MetricMismatch {
                collection: name.to_string(),
                expected_size: vector_size,
                actual: "unknown vector parameters".to_string(),
            }),
        }
    }

    /// Returns `true` if the collection exists.
    pub async fn collection_exists(&self, name: &str) -> Result<bool, VectorDbError> {
        self.client.collection_exists(name).await.map_err(|e| {
            VectorDbError::CreateCollectionFailed {
                collection: name.to_string(),
                message: e.to_string(),
            }
        })
    }

    /// Upserts points into a collection (same id overwrites). Waits until the
    /// points are searchable.
    pub async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> Result<(), VectorDbError> {
        if points.is_empty() {
            return Ok(());
        }

        let known_size = self.known_sizes.read().get(collection).copied();
        if let Some(expected) = known_size {
            check_dimensions(&points, expected)?;
        }

        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| PointStruct::new(p.id, p.vector, p.payload.into_qdrant()))
            .collect();

        self.client
            .upsert_points(
                UpsertPointsBuilder::new(collection, qdrant_points).wait(true),
            )
            .await
            .map_err(|e| VectorDbError::UpsertFailed {
                collection: collection.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    /// Searches a collection by vector similarity.
    pub async fn search(
        &self,
        collection: &str,
        query: Vec<f32>,
        limit: u64,
        filter: SearchFilter,
    ) -> Result<Vec<SearchResult>, VectorDbError> {
        let mut search_builder =
            SearchPointsBuilder::new(collection, query, limit).with_payload(true);

        if !filter.is_empty() {
            search_builder = search_builder.filter(to_qdrant_filter(&filter));
        }

        let search_result = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| {
                request_error(collection, e, |collection, message| {
                    VectorDbError::SearchFailed {
                        collection,
                        message,
                    }
                })
            })?;

        let results = search_result
            .result
            .into_iter()
            .filter_map(SearchResult::from_scored_point)
            .collect();

        Ok(results)
    }

    /// Deletes every record belonging to `document_id`.
    pub async fn delete_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<(), VectorDbError> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(document_filter(document_id))
                    .wait(true),
            )
            .await
            .map_err(|e| {
                request_error(collection, e, |collection, message| {
                    VectorDbError::DeleteFailed {
                        collection,
                        message,
                    }
                })
            })?;

        debug!(collection, document_id, "Deleted document records");
        Ok(())
    }

    /// Fingerprint stored on the document's records, if any are indexed.
    pub async fn document_fingerprint(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Option<String>, VectorDbError> {
        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collection)
                    .filter(document_filter(document_id))
                    .limit(1)
                    .with_payload(true)
                    .with_vectors(false),
            )
            .await
            .map_err(|e| query_error(collection, e))?;

        Ok(response
            .result
            .into_iter()
            .find_map(|point| ChunkPayload::from_qdrant(&point.payload))
            .map(|payload| payload.fingerprint))
    }

    /// Number of records stored for `document_id`.
    pub async fn count_document_points(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<u64, VectorDbError> {
        let response = self
            .client
            .count(
                CountPointsBuilder::new(collection)
                    .filter(document_filter(document_id))
                    .exact(true),
            )
            .await
            .map_err(|e| query_error(collection, e))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    /// Distinct document ids present in the collection, sorted.
    pub async fn list_document_ids(&self, collection: &str) -> Result<Vec<String>, VectorDbError> {
        let mut ids = BTreeSet::new();
        let mut offset = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .limit(SCROLL_PAGE_SIZE)
                .with_payload(true)
                .with_vectors(false);
            if let Some(next) = offset.take() {
                builder = builder.offset(next);
            }

            let page = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| query_error(collection, e))?;

            ids.extend(
                page.result
                    .iter()
                    .filter_map(|point| ChunkPayload::from_qdrant(&point.payload))
                    .map(|payload| payload.document_id),
            );

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(ids.into_iter().collect())
    }
}

/// Qdrant answers requests on a missing collection with
/// "Not found: Collection `name` doesn't exist!".
pub(crate) fn is_missing_collection(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("collection")
        && (message.contains("doesn't exist") || message.contains("not found"))
}

/// Maps a failed request, reporting a missing collection as
/// [`VectorDbError::CollectionNotFound`] and anything else through `failed`.
pub(crate) fn request_error(
    collection: &str,
    error: impl std::fmt::Display,
    failed: fn(String, String) -> VectorDbError,
) -> VectorDbError {
    let message = error.to_string();
    if is_missing_collection(&message) {
        VectorDbError::CollectionNotFound {
            collection: collection.to_string(),
        }
    } else {
        failed(collection.to_string(), message)
    }
}

fn query_error(collection: &str, error: impl std::fmt::Display) -> VectorDbError {
    request_error(collection, error, |collection, message| {
        VectorDbError::QueryFailed {
            collection,
            message,
        }
    })
}

fn document_filter(document_id: &str) -> Filter {
    Filter::must([Condition::matches(
        fields::DOCUMENT_ID,
        document_id.to_string(),
    )])
}

fn to_qdrant_filter(filter: &SearchFilter) -> Filter {
    let must = filter
        .require_tag
        .iter()
        .map(|tag| Condition::matches(fields::TAGS, tag.clone()))
        .collect();
    let must_not = filter
        .exclude_document_ids
        .iter()
        .map(|id| Condition::matches(fields::DOCUMENT_ID, id.clone()))
        .collect();

    Filter {
        must,
        must_not,
        ..Default::default()
    }
}

pub(crate) fn check_dimensions(points: &[VectorPoint], expected: u64) -> Result<(), VectorDbError> {
    match points.iter().find(|p| p.vector.len() as u64 != expected) {
        Some(bad) => Err(VectorDbError::InvalidDimension {
            expected: expected as usize,
            actual: bad.vector.len(),
        }),
        None => Ok(()),
    }
}

/// Minimal async interface used by higher-level code.
pub trait VectorDbClient: Send + Sync {
    /// Ensures a cosine collection of `vector_size` exists.
    fn ensure_collection(
        &self,
        name: &str,
        vector_size: u64,
    ) -> impl std::future::Future<Output = Result<(), VectorDbError>> + Send;

    /// Upserts points.
    fn upsert_points(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> impl std::future::Future<Output = Result<(), VectorDbError>> + Send;

    /// Searches for the `limit` most similar points passing `filter`.
    fn search(
        &self,
        collection: &str,
        query: Vec<f32>,
        limit: u64,
        filter: SearchFilter,
    ) -> impl std::future::Future<Output = Result<Vec<SearchResult>, VectorDbError>> + Send;

    /// Deletes every record of a document.
    fn delete_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> impl std::future::Future<Output = Result<(), VectorDbError>> + Send;

    /// Fingerprint stored on a document's records.
    fn document_fingerprint(
        &self,
        collection: &str,
        document_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, VectorDbError>> + Send;

    /// Number of records stored for a document.
    fn count_document_points(
        &self,
        collection: &str,
        document_id: &str,
    ) -> impl std::future::Future<Output = Result<u64, VectorDbError>> + Send;

    /// Distinct document ids in a collection.
    fn list_document_ids(
        &self,
        collection: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, VectorDbError>> + Send;
}

impl VectorDbClient for QdrantClient {
    async fn ensure_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDbError> {
        self.ensure_collection(name, vector_size).await
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> Result<(), VectorDbError> {
        self.upsert_points(collection, points).await
    }

    async fn search(
        &self,
        collection: &str,
        query: Vec<f32>,
        limit: u64,
        filter: SearchFilter,
    ) -> Result<Vec<SearchResult>, VectorDbError> {
        self.search(collection, query, limit, filter).await
    }

    async fn delete_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<(), VectorDbError> {
        self.delete_document(collection, document_id).await
    }

    async fn document_fingerprint(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Option<String>, VectorDbError> {
        self.document_fingerprint(collection, document_id).await
    }

    async fn count_document_points(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<u64, VectorDbError> {
        self.count_document_points(collection, document_id).await
    }

    async fn list_document_ids(&self, collection: &str) -> Result<Vec<String>, VectorDbError> {
        self.list_document_ids(collection).await
    }
}
