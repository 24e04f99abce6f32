//! Grouping block windows into batches of work

use covershift_core::Window;

/// Iterator yielding consecutive windows in batches of at most `size`.
///
/// Batches preserve the order of the underlying iterator, so concatenating
/// them reproduces the block sequence.
#[derive(Debug, Clone)]
pub struct Batches<I> {
    inner: I,
    size: usize,
}

impl<I: Iterator<Item = Window>> Batches<I> {
    /// A zero batch size is treated as one.
    pub fn new(inner: I, size: usize) -> Self {
        Self {
            inner,
            size: size.max(1),
        }
    }
}

impl<I: Iterator<Item = Window>> Iterator for Batches<I> {
    type Item = Vec<Window>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<Window> = self.inner.by_ref().take(self.size).collect();
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

/// Default batch size for `threads` workers: four blocks per worker.
pub fn default_batch_size(threads: usize) -> usize {
    threads.max(1) * 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use covershift_core::BlockWindows;

    #[test]
    fn batches_preserve_order() {
        let all: Vec<Window> = BlockWindows::new(50, 50, 16, 16).collect();
        let batches: Vec<Vec<Window>> = Batches::new(all.clone().into_iter(), 5).collect();

        assert_eq!(batches.len(), 4);
        assert_eq!(batches[3].len(), 1);
        let flat: Vec<Window> = batches.into_iter().flatten().collect();
        assert_eq!(flat, all);
    }
}
