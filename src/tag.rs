use core::fmt;

/// The amount of low bits reserved for flags in a boundary tag. The size is
/// stored above them, so a tag prints as the size in hex followed by a single
/// flag digit.
const FLAG_BITS: u32 = 4;
const FREE_BIT: u32 = 1;

/// The largest size that fits in a boundary tag.
pub const MAX_TAG_SIZE: usize = (u32::MAX >> FLAG_BITS) as usize;

/// A boundary tag, the word written at both ends of a heap region. The upper
/// bits store the payload size in words and the lowest bit tells whether the
/// region is free.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundaryTag(u32);

impl BoundaryTag {
    /// Creates a boundary tag for a region of the given payload size.
    ///
    /// Panics if the size does not fit in the tag.
    pub fn new(size: usize, is_free: bool) -> Self {
        if size > MAX_TAG_SIZE {
            panic!("a boundary tag can't hold a size of {} words", size);
        }
        Self(((size as u32) << FLAG_BITS) | u32::from(is_free))
    }

    /// Returns the raw word stored in the heap.
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Returns the payload size stored in the tag, in words.
    pub fn size(&self) -> usize {
        (self.0 >> FLAG_BITS) as usize
    }

    /// Is the region described by this tag free?
    pub fn is_free(&self) -> bool {
        self.0 & FREE_BIT != 0
    }
}

impl fmt::Display for BoundaryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.raw())
    }
}
