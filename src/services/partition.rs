//! Order-preserving partitioning of a project list into worker chunks.
//!
//! The coordinator hands each worker process one contiguous chunk. Chunk
//! sizes differ by at most one, with the larger chunks first, so the longest
//! running worker starts on the biggest share.

/// Split `items` into at most `workers` contiguous chunks.
///
/// Returns `min(workers, items.len())` non-empty chunks whose concatenation
/// equals the input. Zero workers or an empty input yield no chunks.
pub fn partition<T: Clone>(items: &[T], workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() || workers == 0 {
        return Vec::new();
    }

    let chunk_count = workers.min(items.len());
    let base = items.len() / chunk_count;
    let remainder = items.len() % chunk_count;

    let mut chunks = Vec::with_capacity(chunk_count);
    let mut offset = 0;
    for index in 0..chunk_count {
        // The first `remainder` chunks carry one extra item.
        let size = base + usize::from(index < remainder);
        chunks.push(items[offset..offset + size].to_vec());
        offset += size;
    }

    chunks
}
