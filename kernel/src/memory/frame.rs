//! Physical frame allocator.
//!
//! Frames are tracked in a bitmap, one bit per frame. Allocation returns the
//! lowest free frame so runs are reproducible.

/// Pool of physical page frames.
#[derive(Debug, Clone)]
pub struct FramePool {
    /// Set bit = frame in use.
    bitmap: Vec<u64>,
    /// Number of frames managed.
    total: usize,
    /// Frames currently free.
    free: usize,
}

impl FramePool {
    /// Create a pool of `total` free frames.
    pub fn new(total: usize) -> Self {
        FramePool {
            bitmap: vec![0; total.div_ceil(64)],
            total,
            free: total,
        }
    }

    /// Allocate the lowest-numbered free frame.
    pub fn allocate(&mut self) -> Option<usize> {
        for (word_idx, word) in self.bitmap.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let bit = (!*word).trailing_zeros() as usize;
            let frame = word_idx * 64 + bit;
            if frame >= self.total {
                return None;
            }
            *word |= 1 << bit;
            self.free -= 1;
            return Some(frame);
        }
        None
    }

    /// Return a frame to the pool. Freeing a free frame is ignored.
    pub fn free(&mut self, frame: usize) {
        if frame >= self.total || self.is_free(frame) {
            return;
        }
        self.bitmap[frame / 64] &= !(1 << (frame % 64));
        self.free += 1;
    }

    /// Mark a specific frame as used.
    pub fn mark_used(&mut self, frame: usize) {
        if frame >= self.total || !self.is_free(frame) {
            return;
        }
        self.bitmap[frame / 64] |= 1 << (frame % 64);
        self.free -= 1;
    }

    pub fn is_free(&self, frame: usize) -> bool {
        frame < self.total && self.bitmap[frame / 64] & (1 << (frame % 64)) == 0
    }

    /// Get the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free
    }

    /// Get the number of frames managed.
    pub fn total(&self) -> usize {
        self.total
    }
}
