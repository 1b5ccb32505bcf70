//! Persistence seam for transcribed utterances.
//!
//! The engine treats storage as an external collaborator: an idempotent
//! upsert keyed by utterance id. Concurrent workers may land out of order,
//! which is fine precisely because each write is keyed and idempotent.
//! Failures are logged by the calling worker and not retried here; retry
//! policy belongs to the implementation behind this trait.

use crate::error::Result;

/// Upsert-by-id key/value store for transcripts.
pub trait TranscriptStore: Send + Sync + 'static {
    /// Insert or replace the text stored under (`collection`, `id`).
    ///
    /// Must be idempotent: re-upserting the same id overwrites, never
    /// duplicates.
    fn upsert(&self, collection: &str, id: &str, text: &str) -> Result<()>;
}
