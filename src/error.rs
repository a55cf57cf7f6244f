use core::fmt;

use thiserror::Error;

use crate::{Address, ClientPtr};

/// Why a pointer identifier was refused by an allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerFault {
    /// The identifier is outside the legal range.
    OutOfRange,
    /// The identifier is already bound to an allocated block.
    AlreadyAllocated,
}

impl fmt::Display for PointerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerFault::OutOfRange => f.write_str("out of range"),
            PointerFault::AlreadyAllocated => f.write_str("already allocated"),
        }
    }
}

/// Errors returned by the allocator facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("invalid pointer {ptr}: {fault}")]
    InvalidPointer { ptr: ClientPtr, fault: PointerFault },

    #[error("pointer {0} is not currently allocated")]
    UnknownPointer(ClientPtr),

    #[error(
        "heap space in excess of {ceiling} words needed for a {requested_words} word block \
         (heap is {heap_words} words)"
    )]
    OutOfMemory {
        requested_words: usize,
        heap_words: usize,
        ceiling: usize,
    },

    #[error("the simulator halted after running out of memory")]
    Halted,
}

impl SimError {
    /// Errors after which no further request may be processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimError::OutOfMemory { .. } | SimError::Halted)
    }
}

/// Errors produced while reading a request script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: malformed request `{text}`: {reason}")]
    MalformedRequest {
        line: usize,
        text: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while building a simulator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("list type must be either I for Implicit or E for Explicit, got `{0}`")]
    InvalidListMode(String),

    #[error("fit type must be either F for First-fit or B for Best-fit, got `{0}`")]
    InvalidFitPolicy(String),

    #[error("word size must be a non-zero power of 2, got {0}")]
    InvalidWordSize(usize),

    #[error("initial heap of {initial} words must be between 2 and the ceiling of {ceiling} words")]
    InvalidHeapBounds { initial: usize, ceiling: usize },

    #[error("heap ceiling of {ceiling} words is past the largest heap a boundary tag can describe ({max} words)")]
    CeilingTooLarge { ceiling: usize, max: usize },
}

/// A broken ledger invariant. A correct engine never produces one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("the ledger has no regions")]
    Empty,

    #[error("region at {address} is not after the region ending at {prev_end}")]
    Unsorted { address: Address, prev_end: Address },

    #[error("free regions at {first} and {second} are adjacent")]
    AdjacentFree { first: Address, second: Address },

    #[error("untracked gap of {words} words at {address}")]
    UntrackedGap { address: Address, words: usize },

    #[error("region at {address} ends at {end}, past the heap of {heap_words} words")]
    PastHeapEnd {
        address: Address,
        end: Address,
        heap_words: usize,
    },

    #[error("footer ledger does not mirror the header at {address}")]
    FooterMismatch { address: Address },

    #[error("region at {address} has an inconsistent owner")]
    BadOwner { address: Address },

    #[error("explicit free list is inconsistent at {address}")]
    BrokenFreeList { address: Address },
}
