use crate::candidate::CandidateSpace;
use crate::chunking::Chunk;
use crate::error::Result;
use crate::fingerprint::Fingerprinter;

use tokio_util::sync::CancellationToken;

/// How a chunk search ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Every candidate was tested without a match.
    Exhausted,
    Found { index: u64, candidate: String },
    /// The chunk was taken away; `tested` candidates were checked.
    Aborted { tested: u64 },
    /// The whole search is over.
    Terminated { tested: u64 },
}

/// Everything the inner loop needs, borrowed for its duration.
pub struct SearchRequest<'a> {
    pub space: &'a dyn CandidateSpace,
    pub chunk: Chunk,
    pub fingerprint: &'a [u8],
    pub hasher: &'a dyn Fingerprinter,
    /// Per-chunk token; a child of `terminal`.
    pub cancel: &'a CancellationToken,
    pub terminal: &'a CancellationToken,
    /// Candidates between two cancellation checks.
    pub poll_interval: u64,
}

/// Tests the candidates of one chunk in index order. CPU-bound; run it on a
/// blocking thread.
pub fn search_range(request: &SearchRequest<'_>) -> Result<ChunkOutcome> {
    let poll_interval = request.poll_interval.max(1);
    let end = request.chunk.end().min(request.space.size());
    let mut candidate = String::new();
    let mut tested = 0u64;

    for index in request.chunk.offset..end {
        if tested % poll_interval == 0 && request.cancel.is_cancelled() {
            return Ok(if request.terminal.is_cancelled() {
                ChunkOutcome::Terminated { tested }
            } else {
                ChunkOutcome::Aborted { tested }
            });
        }

        request.space.decode_into(index, &mut candidate)?;
        if request.hasher.matches(&candidate, request.fingerprint) {
            return Ok(ChunkOutcome::Found { index, candidate });
        }
        tested += 1;
    }

    Ok(ChunkOutcome::Exhausted)
}
