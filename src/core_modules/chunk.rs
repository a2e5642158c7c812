// THEORY:
// The `chunk` module treats a label sequence as a series of "chunks": maximal
// runs of consecutive samples sharing one label. It is the bridge between
// per-sample classification and event-level reasoning, in the same way a
// spatial chunk pools pixels into a region.
//
// Key architectural principles:
// 1.  **Partition**: `chunk_indices` splits the index range into runs that cover
//     every index exactly once, in order, with no gaps.
// 2.  **Noise Reduction**: `suppress_short_chunks` erases runs that are too brief
//     to be a physiological event, and `merge_proximal_chunks` heals short
//     interruptions between two runs of the same label.
// 3.  **Single Pass**: both clean-up operations compute chunk boundaries once from
//     their input and never cascade within a call. Merging a gap does not make
//     the merged run eligible for further merging until the next call.
// 4.  **Label Agnostic**: the utilities are generic over any `Copy + PartialEq`
//     label, so they work on `GazeEventType` as well as on plain codes.

use std::ops::Range;

/// Splits `labels` into maximal runs of identical values.
pub fn chunk_indices<T: PartialEq>(labels: &[T]) -> Vec<Range<usize>> {
    let mut chunks = Vec::new();
    if labels.is_empty() {
        return chunks;
    }
    let mut start = 0;
    for i in 1..labels.len() {
        if labels[i] != labels[i - 1] {
            chunks.push(start..i);
            start = i;
        }
    }
    chunks.push(start..labels.len());
    chunks
}

/// Overwrites every chunk shorter than `min_length` with `fill`.
pub fn suppress_short_chunks<T: Copy + PartialEq>(labels: &[T], min_length: usize, fill: T) -> Vec<T> {
    let mut suppressed = labels.to_vec();
    for chunk in chunk_indices(labels) {
        if chunk.len() < min_length {
            suppressed[chunk].fill(fill);
        }
    }
    suppressed
}

/// Fills short chunks that sit between two chunks of the same label with that label.
///
/// A chunk is merged when it is neither first nor last, is shorter than `min_length`,
/// its label is not listed in `exempt`, and both neighbours carry the same label.
/// Neighbour labels are read from the input, so merges never cascade within one call.
pub fn merge_proximal_chunks<T: Copy + PartialEq>(labels: &[T], min_length: usize, exempt: &[T]) -> Vec<T> {
    let mut merged = labels.to_vec();
    let chunks = chunk_indices(labels);
    if chunks.len() < 3 {
        return merged;
    }
    for window in chunks.windows(3) {
        let (left, middle, right) = (&window[0], &window[1], &window[2]);
        if middle.len() >= min_length {
            continue;
        }
        let middle_label = labels[middle.start];
        if exempt.contains(&middle_label) {
            continue;
        }
        let left_label = labels[left.start];
        if left_label != labels[right.start] {
            continue;
        }
        merged[middle.clone()].fill(left_label);
    }
    merged
}
