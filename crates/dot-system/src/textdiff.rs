//! Line diffs as patch chunks

use std::time::Duration;

use similar::{Algorithm, ChangeTag, TextDiff};

use crate::patch::{Chunk, ChunkOp};

/// Upper bound on time spent searching for a minimal diff.
pub const DIFF_TIMEOUT: Duration = Duration::from_secs(1);

/// Diff `from` against `to` line by line.
///
/// Consecutive lines with the same operation are merged into one chunk, so
/// the result alternates operations. A replaced region yields a delete chunk
/// followed by an add chunk.
pub fn diff_chunks(from: &[u8], to: &[u8]) -> Vec<Chunk> {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .timeout(DIFF_TIMEOUT)
        .diff_lines(from, to);

    let mut chunks: Vec<Chunk> = Vec::new();
    for op in diff.ops() {
        for change in diff.iter_changes(op) {
            let op = chunk_op(change.tag());
            match chunks.last_mut() {
                Some(last) if last.op == op => last.content.extend_from_slice(change.value()),
                _ => chunks.push(Chunk::new(op, change.value())),
            }
        }
    }
    chunks
}

fn chunk_op(tag: ChangeTag) -> ChunkOp {
    match tag {
        ChangeTag::Equal => ChunkOp::Equal,
        ChangeTag::Delete => ChunkOp::Delete,
        ChangeTag::Insert => ChunkOp::Add,
    }
}
