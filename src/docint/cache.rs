//! Cache key derivation for document-understanding results.
//!
//! The analyze call is the most expensive non-AI step in the pipeline, and
//! its output depends only on the file content, the backend model, and the
//! backend version. The cache is advisory: correctness never depends on it,
//! the worst case is a redundant backend call.

/// Composite key: content hash + model + backend version.
pub fn cache_key(file_hash: &str, model: &str, backend_version: &str) -> String {
    format!("di:{file_hash}:{model}:{backend_version}")
}
