use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::vectordb::client::check_dimensions;
use crate::vectordb::{
    ChunkPayload, SearchFilter, SearchResult, VectorDbClient, VectorDbError, VectorPoint,
};

/// In-memory stand-in for Qdrant with exact cosine search.
#[derive(Default)]
pub struct MockVectorDbClient {
    collections: std::sync::RwLock<HashMap<String, MockCollection>>,
    fail_searches: AtomicBool,
    fail_upserts: AtomicBool,
}

#[derive(Default, Clone)]
struct MockCollection {
    vector_size: u64,
    points: HashMap<u64, MockStoredPoint>,
}

#[derive(Clone)]
struct MockStoredPoint {
    vector: Vec<f32>,
    payload: ChunkPayload,
}

impl MockVectorDbClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn point_count(&self, collection: &str) -> Option<usize> {
        self.collections
            .read()
            .ok()?
            .get(collection)
            .map(|c| c.points.len())
    }

    /// Payloads stored for one document, ordered by chunk index.
    pub fn document_payloads(&self, collection: &str, document_id: &str) -> Vec<ChunkPayload> {
        let Ok(collections) = self.collections.read() else {
            return Vec::new();
        };
        let mut payloads: Vec<ChunkPayload> = collections
            .get(collection)
            .map(|c| {
                c.points
                    .values()
                    .filter(|p| p.payload.document_id == document_id)
                    .map(|p| p.payload.clone())
                    .collect()
            })
            .unwrap_or_default();
        payloads.sort_by_key(|p| p.chunk_index);
        payloads
    }

    /// Makes every subsequent `search` fail.
    pub fn set_fail_searches(&self, fail: bool) {
        self.fail_searches.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `upsert_points` fail.
    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Poisons the internal RwLock for testing error handling paths.
    /// This method is only available in test builds.
    #[cfg(test)]
    pub fn poison_lock(&self) {
        use std::thread;

        let collections_ptr = &self.collections as *const _ as usize;
        let handle = thread::spawn(move || {
            // SAFETY: We're in test code, the pointer is valid for the duration
            let collections: &std::sync::RwLock<HashMap<String, MockCollection>> =
                unsafe { &*(collections_ptr as *const _) };
            let _guard = collections.write().unwrap();
            panic!("Intentional panic to poison lock for testing");
        });
        // Wait for the thread to panic, which poisons the lock
        let _ = handle.join();
    }

    fn with_collection<T>(
        &self,
        collection: &str,
        on_poison: impl FnOnce() -> VectorDbError,
        f: impl FnOnce(&MockCollection) -> T,
    ) -> Result<T, VectorDbError> {
        let collections = self.collections.read().map_err(|_| on_poison())?;
        let coll = collections
            .get(collection)
            .ok_or_else(|| VectorDbError::CollectionNotFound {
                collection: collection.to_string(),
            })?;
        Ok(f(coll))
    }
}

const POISONED: &str = "lock poisoned";

impl VectorDbClient for MockVectorDbClient {
    async fn ensure_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDbError> {
        let mut collections =
            self.collections
                .write()
                .map_err(|_| VectorDbError::CreateCollectionFailed {
                    collection: name.to_string(),
                    message: POISONED.to_string(),
                })?;

        let coll = collections
            .entry(name.to_string())
            .or_insert(MockCollection {
                vector_size,
                points: HashMap::new(),
            });

        if coll.vector_size != vector_size {
            return Err(VectorDbError::MetricMismatch {
                collection: name.to_string(),
                expected_size: vector_size,
                actual: format!("Cosine distance with size {}", coll.vector_size),
            });
        }

        Ok(())
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> Result<(), VectorDbError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(VectorDbError::UpsertFailed {
                collection: collection.to_string(),
                message: "scripted failure".to_string(),
            });
        }

        let mut collections =
            self.collections
                .write()
                .map_err(|_| VectorDbError::UpsertFailed {
                    collection: collection.to_string(),
                    message: POISONED.to_string(),
                })?;

        let coll =
            collections
                .get_mut(collection)
                .ok_or_else(|| VectorDbError::CollectionNotFound {
                    collection: collection.to_string(),
                })?;

        check_dimensions(&points, coll.vector_size)?;

        for point in points {
            coll.points.insert(
                point.id,
                MockStoredPoint {
                    vector: point.vector,
                    payload: point.payload,
                },
            );
        }

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: Vec<f32>,
        limit: u64,
        filter: SearchFilter,
    ) -> Result<Vec<SearchResult>, VectorDbError> {
        if self.fail_searches.load(Ordering::SeqCst) {
            return Err(VectorDbError::SearchFailed {
                collection: collection.to_string(),
                message: "scripted failure".to_string(),
            });
        }

        let on_poison = || VectorDbError::SearchFailed {
            collection: collection.to_string(),
            message: POISONED.to_string(),
        };

        let mut results = self.with_collection(collection, on_poison, |coll| {
            coll.points
                .iter()
                .filter(|(_, p)| filter.accepts(&p.payload))
                .map(|(&id, p)| SearchResult {
                    id,
                    score: cosine_similarity(&query, &p.vector),
                    payload: p.payload.clone(),
                })
                .collect::<Vec<_>>()
        })?;

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });

        results.truncate(limit as usize);
        Ok(results)
    }

    async fn delete_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<(), VectorDbError> {
        let mut collections =
            self.collections
                .write()
                .map_err(|_| VectorDbError::DeleteFailed {
                    collection: collection.to_string(),
                    message: POISONED.to_string(),
                })?;

        let coll =
            collections
                .get_mut(collection)
                .ok_or_else(|| VectorDbError::CollectionNotFound {
                    collection: collection.to_string(),
                })?;

        coll.points
            .retain(|_, p| p.payload.document_id != document_id);

        Ok(())
    }

    async fn document_fingerprint(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Option<String>, VectorDbError> {
        let on_poison = || VectorDbError::QueryFailed {
            collection: collection.to_string(),
            message: POISONED.to_string(),
        };

        self.with_collection(collection, on_poison, |coll| {
            coll.points
                .values()
                .find(|p| p.payload.document_id == document_id)
                .map(|p| p.payload.fingerprint.clone())
        })
    }

    async fn count_document_points(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<u64, VectorDbError> {
        let on_poison = || VectorDbError::QueryFailed {
            collection: collection.to_string(),
            message: POISONED.to_string(),
        };

        self.with_collection(collection, on_poison, |coll| {
            coll.points
                .values()
                .filter(|p| p.payload.document_id == document_id)
                .count() as u64
        })
    }

    async fn list_document_ids(&self, collection: &str) -> Result<Vec<String>, VectorDbError> {
        let on_poison = || VectorDbError::QueryFailed {
            collection: collection.to_string(),
            message: POISONED.to_string(),
        };

        self.with_collection(collection, on_poison, |coll| {
            coll.points
                .values()
                .map(|p| p.payload.document_id.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
