//! Word and byte arithmetic used by the placement engine.

/// Checks if the given value is aligned to the given alignment.
///
/// `align` must be a power of 2.
pub fn is_aligned(n: usize, align: usize) -> bool {
    n & (align - 1) == 0
}

/// Returns the amount of words needed to hold `size_bytes` bytes of payload.
///
/// `word_size` must be a power of 2.
pub fn payload_words(size_bytes: usize, word_size: usize) -> usize {
    size_bytes / word_size + usize::from(!is_aligned(size_bytes, word_size))
}

/// Checks if a block whose header sits at word `header_word` has its payload
/// on a double word boundary.
///
/// The payload starts one word after the header, so the condition is that
/// `(header_word + 1) * word_size` is a multiple of `2 * word_size` bytes.
///
/// The boundary scales with the word size, so it is 8 bytes only for 4 byte
/// words. With 8 byte words payloads land on 16 byte boundaries rather than 8,
/// which keeps every block starting on an odd word whatever the word size.
pub fn is_double_word_aligned(header_word: usize, word_size: usize) -> bool {
    is_aligned((header_word + 1) * word_size, 2 * word_size)
}
