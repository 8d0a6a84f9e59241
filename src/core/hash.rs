//! Document Digests
//!
//! SHA-256 digests of serialized map documents. Used to recognise cross-tab
//! echoes: a payload whose digest matches the document a store already holds
//! carries no new information.

use sha2::{Sha256, Digest};

/// Digest output type (256 bits / 32 bytes)
pub type DocumentDigest = [u8; 32];

/// Domain separator for map documents.
const MAP_DOCUMENT_DOMAIN: &[u8] = b"AREA_SYNC_MAP_DOCUMENT_V1";

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> DocumentDigest {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Digest of a serialized map document.
///
/// Byte-identical documents produce identical digests; no normalisation is
/// applied, so documents that differ only in whitespace are distinct.
pub fn document_digest(document: &str) -> DocumentDigest {
    hash_with_domain(MAP_DOCUMENT_DOMAIN, document.as_bytes())
}

/// First eight bytes of a digest as hex, for log fields.
pub fn short_hex(digest: &DocumentDigest) -> String {
    hex::encode(&digest[..8])
}
