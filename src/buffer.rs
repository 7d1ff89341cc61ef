/// Fixed-capacity sample buffer handed to the engine.
///
/// Allocated once for the block size; every block is copied in, so the
/// engine may work on it in place without touching the delivery buffer.
pub struct BlockBuffer {
    samples: Box<[f32]>,
}

impl BlockBuffer {
    pub fn new(block_size: usize) -> Self {
        Self {
            samples: vec![0.0; block_size].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Copy `block` in and lend it out for processing.
    /// Returns `None` when the length doesn't match the capacity.
    pub fn load(&mut self, block: &[f32]) -> Option<&mut [f32]> {
        if block.len() != self.samples.len() {
            return None;
        }
        self.samples.copy_from_slice(block);
        Some(&mut self.samples)
    }
}

/// Accumulates arbitrarily sized device callbacks into fixed-size blocks.
pub struct BlockAssembler {
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockAssembler {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            pending: Vec::with_capacity(block_size * 2),
        }
    }

    /// Append `samples` and call `emit` once per completed block, in order.
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(&[f32])) {
        self.pending.extend_from_slice(samples);
        let mut start = 0;
        while self.pending.len() - start >= self.block_size {
            emit(&self.pending[start..start + self.block_size]);
            start += self.block_size;
        }
        self.pending.drain(..start);
    }
}
