//! BLAKE3-derived identifiers and content fingerprints.

use blake3::Hasher;

/// Computes a 64-bit hash of the input data using BLAKE3, truncated from 256 bits.
///
/// # Collision Tolerance
///
/// Used for point ids and cache keys. With 64 bits the birthday bound sits near
/// 4.3 billion items, far beyond any personal vault. A collision between two
/// point ids would overwrite one chunk with another; the next fingerprint
/// mismatch re-indexes the affected document.
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes)
}

/// Stable point id for one chunk of one document.
///
/// Re-indexing the same `(document_id, chunk_index)` overwrites the record.
#[inline]
pub fn chunk_point_id(document_id: &str, chunk_index: usize) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(document_id.as_bytes());
    hasher.update(b"#");
    hasher.update(&(chunk_index as u64).to_le_bytes());

    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes)
}

/// Content fingerprint of a document as it will be indexed.
///
/// Covers everything that ends up in the index (title, tags, body) and the
/// chunking parameters, so changing either forces a re-index.
pub fn fingerprint_document(
    title: &str,
    tags: &[String],
    body: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> String {
    let mut hasher = Hasher::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\x1f");
    for tag in tags {
        hasher.update(tag.as_bytes());
        hasher.update(b"\x1e");
    }
    hasher.update(b"\x1f");
    hasher.update(body.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(&(chunk_size as u64).to_le_bytes());
    hasher.update(&(chunk_overlap as u64).to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Cache key for a piece of text (embedding cache).
#[inline]
pub fn hash_text(text: &str) -> u64 {
    hash_to_u64(text.as_bytes())
}
