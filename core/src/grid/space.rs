//! Free-space scanning.
//!
//! The scan walks a layer row by row collecting contiguous free runs, then
//! merges vertically adjacent runs whose time extents match exactly. Runs
//! that only partially overlap are never merged, so the result
//! under-approximates the true maximal-rectangle set; the allocation
//! primitives depend on this exact behaviour and on the deterministic
//! row-major output order.

use crate::grid::{Layer, LayerRef};
use crate::radio::BlockShape;

/// Maximal (under the exact-extent merge rule) empty rectangle in one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Space {
    pub layer: LayerRef,
    pub freq_start: usize,
    pub time_start: usize,
    pub freq_len: usize,
    pub time_len: usize,
}

impl Space {
    /// How many whole blocks of `shape` fit into this space.
    pub fn block_capacity(&self, shape: BlockShape) -> usize {
        (self.freq_len / shape.freq) * (self.time_len / shape.time)
    }

    /// Block shapes from `shapes` that fit here at least once.
    pub fn possible_block_shapes<'a>(
        &'a self,
        shapes: &'a [BlockShape],
    ) -> impl Iterator<Item = BlockShape> + 'a {
        shapes
            .iter()
            .copied()
            .filter(|&shape| self.block_capacity(shape) >= 1)
    }

    /// First block origin inside the space, or `None` when even one block
    /// does not fit.
    pub fn first_block_position(&self, shape: BlockShape) -> Option<(usize, usize)> {
        (self.block_capacity(shape) >= 1).then_some((self.freq_start, self.time_start))
    }

    /// Advances from the block origin `(freq, time)` in row-major order by
    /// the block's extents; `None` once the space is exhausted.
    pub fn next_block_position(
        &self,
        freq: usize,
        time: usize,
        shape: BlockShape,
    ) -> Option<(usize, usize)> {
        let next_time = time + shape.time;
        if next_time + shape.time <= self.time_start + self.time_len {
            return Some((freq, next_time));
        }
        let next_freq = freq + shape.freq;
        if next_freq + shape.freq <= self.freq_start + self.freq_len {
            return Some((next_freq, self.time_start));
        }
        None
    }
}

/// Contiguous free run within one frequency row.
#[derive(Debug, Clone, Copy)]
struct Run {
    freq: usize,
    time_start: usize,
    time_len: usize,
}

/// Scans a layer for free rectangles. Deterministic: rows top to bottom,
/// runs left to right, merge strictly downward.
pub(crate) fn scan_layer(layer: &Layer) -> Vec<Space> {
    let mut runs: Vec<Run> = Vec::new();
    for freq in 0..layer.freq_units() {
        let mut start: Option<usize> = None;
        for time in 0..layer.time_units() {
            if layer.is_free(freq, time) {
                start.get_or_insert(time);
            } else if let Some(time_start) = start.take() {
                runs.push(Run {
                    freq,
                    time_start,
                    time_len: time - time_start,
                });
            }
        }
        if let Some(time_start) = start {
            runs.push(Run {
                freq,
                time_start,
                time_len: layer.time_units() - time_start,
            });
        }
    }

    let mut consumed = vec![false; runs.len()];
    let mut spaces = Vec::new();
    for index in 0..runs.len() {
        if consumed[index] {
            continue;
        }
        let seed = runs[index];
        let mut freq_len = 1;
        // Greedily absorb directly-below runs with the identical time extent.
        for (other_index, other) in runs.iter().enumerate().skip(index + 1) {
            if consumed[other_index] {
                continue;
            }
            if other.freq == seed.freq + freq_len
                && other.time_start == seed.time_start
                && other.time_len == seed.time_len
            {
                consumed[other_index] = true;
                freq_len += 1;
            } else if other.freq > seed.freq + freq_len {
                break;
            }
        }
        spaces.push(Space {
            layer: layer.id,
            freq_start: seed.freq,
            time_start: seed.time_start,
            freq_len,
            time_len: seed.time_len,
        });
    }
    spaces
}
