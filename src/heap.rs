use tracing::debug;

/// The smallest capacity the heap can have: a single region with no payload
/// is still a header and a footer.
pub const MIN_HEAP_WORDS: usize = 2;

/// The capacity of the simulated heap, changed `sbrk` style at its tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heap {
    size: usize,
    ceiling: usize,
}

impl Heap {
    /// Creates a heap of `size` words that may never grow past `ceiling`
    /// words.
    pub fn new(size: usize, ceiling: usize) -> Self {
        Self { size, ceiling }
    }

    /// The current capacity in words.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The capacity the heap may never exceed.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Changes the capacity of the heap by `delta` words.
    ///
    /// Returns `false` and leaves the heap untouched if the new capacity would
    /// exceed the ceiling or drop below [`MIN_HEAP_WORDS`].
    pub fn grow(&mut self, delta: isize) -> bool {
        let new_size = match self.size.checked_add_signed(delta) {
            Some(new_size) => new_size,
            None => return false,
        };
        if new_size > self.ceiling || new_size < MIN_HEAP_WORDS {
            debug!(
                heap_words = self.size,
                delta,
                ceiling = self.ceiling,
                "heap resize refused"
            );
            return false;
        }

        debug!(from = self.size, to = new_size, "heap resized");
        self.size = new_size;
        true
    }

    /// Gives `words` words back from the tail of the heap.
    pub fn shrink(&mut self, words: usize) -> bool {
        match isize::try_from(words) {
            Ok(words) => self.grow(-words),
            Err(_) => false,
        }
    }
}
