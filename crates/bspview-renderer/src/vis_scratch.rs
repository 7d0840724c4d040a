//! Per-view visibility scratch.
//!
//! Sized lazily to the largest level seen so far; `ensure` grows but never
//! shrinks, keeps what is already set and zero-fills the new tail.

const WORD_BITS: usize = 64;

/// Fixed-length bit set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisBits {
    words: Vec<u64>,
    len: usize,
}

impl VisBits {
    pub fn with_len(len: usize) -> Self {
        let mut bits = Self::default();
        bits.ensure(len);
        bits
    }

    /// Grow to at least `len` bits.
    pub fn ensure(&mut self, len: usize) {
        if len <= self.len {
            return;
        }
        self.words.resize(len.div_ceil(WORD_BITS), 0);
        self.len = len;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Out-of-range bits read as clear.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    /// Out-of-range writes are dropped.
    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        if index >= self.len {
            debug_assert!(false, "vis bit {} out of range {}", index, self.len);
            return;
        }
        let mask = 1u64 << (index % WORD_BITS);
        if value {
            self.words[index / WORD_BITS] |= mask;
        } else {
            self.words[index / WORD_BITS] &= !mask;
        }
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Set or clear `start..end`, clamped to the set's length.
    pub fn fill_range(&mut self, start: usize, end: usize, value: bool) {
        let end = end.min(self.len);
        if start >= end {
            return;
        }

        let (first_word, last_word) = (start / WORD_BITS, (end - 1) / WORD_BITS);
        for w in first_word..=last_word {
            let lo = if w == first_word { start % WORD_BITS } else { 0 };
            let hi = if w == last_word { (end - 1) % WORD_BITS + 1 } else { WORD_BITS };
            let mask = if hi - lo == WORD_BITS {
                u64::MAX
            } else {
                ((1u64 << (hi - lo)) - 1) << lo
            };
            if value {
                self.words[w] |= mask;
            } else {
                self.words[w] &= !mask;
            }
        }
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|&i| self.get(i))
    }
}

/// The visibility sets of one view.
#[derive(Debug, Clone, Default)]
pub struct VisScratch {
    /// Surfaces visible this frame (possibly after a box test).
    pub surf_vis: VisBits,
    /// Surfaces whose leaf was entirely inside the frustum.
    pub surf_full_vis: VisBits,
    pub leaf_vis: VisBits,
    pub draw_surf_vis: VisBits,
    /// Frame in which each draw surface was last appended to the list.
    pub draw_surf_frames: Vec<u32>,
}

impl VisScratch {
    pub fn ensure(&mut self, num_surfaces: usize, num_leaves: usize, num_draw_surfaces: usize) {
        self.surf_vis.ensure(num_surfaces);
        self.surf_full_vis.ensure(num_surfaces);
        self.leaf_vis.ensure(num_leaves);
        self.draw_surf_vis.ensure(num_draw_surfaces);
        if self.draw_surf_frames.len() < num_draw_surfaces {
            self.draw_surf_frames.resize(num_draw_surfaces, 0);
        }
    }

    /// Clear the visibility bits; frame stamps are left alone.
    pub fn clear(&mut self) {
        self.surf_vis.clear();
        self.surf_full_vis.clear();
        self.leaf_vis.clear();
        self.draw_surf_vis.clear();
    }
}
