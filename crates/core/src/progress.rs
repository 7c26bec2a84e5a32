//! Chunk-arrival events emitted while a catalog response is streaming in.

/// Emitted once per received body chunk, always before the fetch completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// ISBN being looked up.
    pub isbn: String,
    pub chunk_len: usize,
    /// Bytes accumulated so far for this request.
    pub received: u64,
    /// `Content-Length`, when the server sent one.
    pub total: Option<u64>,
}

/// Receives chunk events for a lookup. The CLI drives its spinner from this.
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

/// Helper to emit a progress event if a handler is provided.
pub fn emit_progress(
    handler: Option<&dyn ProgressHandler>,
    isbn: &str,
    chunk_len: usize,
    received: u64,
    total: Option<u64>,
) {
    if let Some(h) = handler {
        h.on_progress(ProgressEvent {
            isbn: isbn.to_string(),
            chunk_len,
            received,
            total,
        });
    }
}
