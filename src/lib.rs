//! A simulator of a word addressed heap allocator, modelling the implicit and
//! explicit free list designs of a `malloc`/`free`/`realloc` family over a raw
//! memory arena. The simulator tracks region sizes, addresses and flags, never
//! payload bytes.
//!
//! Every region of the heap is framed by a header word and a footer word, both
//! holding a [`BoundaryTag`]: the payload size in words and a free flag. Blocks
//! are placed so that their payload starts on a double word boundary, using
//! either first-fit or best-fit. After every allocation and free the ledger of
//! regions is coalesced: adjacent free space is merged, gaps between blocks
//! become free regions, and unused capacity at the tail of the heap is given
//! back. When no free region is large enough, the heap grows `sbrk` style up to
//! a fixed ceiling, past which the simulated program runs out of memory.
//!
//! ## Usage
//!
//! ```
//! use freelist_sim::{FitPolicy, ListMode, SimConfig, Simulator};
//!
//! let mut simulator = Simulator::new(SimConfig::new(ListMode::Explicit, FitPolicy::Best))?;
//!
//! let first = simulator.allocate(5, 0)?;
//! let second = simulator.allocate(50, 1)?;
//! assert!(first < second);
//!
//! simulator.free(0)?;
//! simulator.reallocate(100, 1, 1)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! A whole request script can be run with [`Simulator::run`], and the final
//! heap written out with [`dump::write_heap_dump`].
//!
//! ## List modes
//!
//! - **Implicit**: every region lives in one list. Placement walks all of them
//!   and freeing a pointer scans for the block it owns.
//! - **Explicit**: free regions are also threaded on a doubly linked free list
//!   which placement walks instead, and blocks are indexed by their pointer.
//!
//! Both modes produce the same heap for the same requests.

pub mod alignment;
pub mod coalesce;
pub mod config;
pub mod dump;
pub mod error;
pub mod heap;
pub mod ledger;
pub mod placement;
pub mod script;
pub mod tag;

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;

use tracing::{debug, error, warn};

use alignment::payload_words;
use coalesce::coalesce;
pub use config::{FitPolicy, ListMode, SimConfig};
pub use error::{ConfigError, InvariantViolation, PointerFault, ScriptError, SimError};
use heap::Heap;
pub use ledger::{Footer, Ledger, Region};
pub use script::Request;
pub use tag::BoundaryTag;

/// A word offset from the start of the heap.
pub type Address = usize;

/// The identifier a client program uses for an allocated block.
pub type ClientPtr = i64;

/// The outcome of running a request script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Requests that completed.
    pub executed: usize,

    /// Requests refused with a non fatal error.
    pub rejected: usize,

    /// Set when the run stopped because the heap couldn't grow.
    pub out_of_memory: Option<SimError>,
}

impl RunReport {
    /// Did the run stop before the end of the script?
    pub fn halted(&self) -> bool {
        self.out_of_memory.is_some()
    }
}

/// The allocator facade, owning the whole state of one simulation run: the
/// heap, the ledger of its regions and the set of allocated pointers.
#[derive(Debug)]
pub struct Simulator {
    config: SimConfig,
    heap: Heap,
    ledger: Ledger,
    pointers: BTreeSet<ClientPtr>,
    halted: bool,
}

impl Simulator {
    /// Creates a simulator with a fresh heap of `config.initial_heap_words`
    /// words, holding a single free region.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut heap = Heap::new(config.initial_heap_words, config.max_heap_words);
        let mut ledger = Ledger::new(config.list_mode);
        coalesce(&mut ledger, &mut heap, config.initial_heap_words);

        Ok(Self {
            config,
            heap,
            ledger,
            pointers: BTreeSet::new(),
            halted: false,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The current capacity of the heap in words.
    pub fn heap_size(&self) -> usize {
        self.heap.size()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Is `ptr` currently bound to a block?
    pub fn is_allocated(&self, ptr: ClientPtr) -> bool {
        self.pointers.contains(&ptr)
    }

    /// The allocated pointers, in ascending order.
    pub fn pointers(&self) -> impl Iterator<Item = ClientPtr> + '_ {
        self.pointers.iter().copied()
    }

    /// The address of the block bound to `ptr`.
    pub fn address_of(&self, ptr: ClientPtr) -> Option<Address> {
        let index = self.ledger.find_by_owner(ptr)?;
        Some(self.ledger.headers()[index].address)
    }

    /// Did the simulated program run out of memory?
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Checks the invariants of the ledger against the heap.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        coalesce::check_invariants(&self.ledger, self.heap.size())
    }

    fn ensure_running(&self) -> Result<(), SimError> {
        if self.halted {
            return Err(SimError::Halted);
        }
        Ok(())
    }

    /// Checks that `ptr` may be bound to a new block.
    fn validate_new_ptr(&self, ptr: ClientPtr) -> Result<(), SimError> {
        let fault = if !(0..=self.config.max_client_ptr).contains(&ptr) {
            PointerFault::OutOfRange
        } else if self.pointers.contains(&ptr) {
            PointerFault::AlreadyAllocated
        } else {
            return Ok(());
        };
        Err(SimError::InvalidPointer { ptr, fault })
    }

    /// Allocates a block of `size_bytes` bytes and binds it to `ptr`. Returns
    /// the address of the block's header; its payload starts on the word after.
    ///
    /// Fails with [`SimError::InvalidPointer`] if `ptr` is out of range or
    /// already allocated, in which case nothing changes. Fails with
    /// [`SimError::OutOfMemory`] if the heap can't grow enough, after which
    /// the simulator is halted.
    pub fn allocate(&mut self, size_bytes: usize, ptr: ClientPtr) -> Result<Address, SimError> {
        self.ensure_running()?;
        self.validate_new_ptr(ptr)?;

        let payload_words = payload_words(size_bytes, self.config.word_size);
        let placed = placement::place(
            &mut self.ledger,
            &mut self.heap,
            &self.config,
            payload_words,
            ptr,
        );
        debug_assert_eq!(self.check_invariants(), Ok(()));

        match placed {
            Ok(address) => {
                self.pointers.insert(ptr);
                debug!(ptr, address, size_bytes, "allocated");
                Ok(address)
            },
            Err(err) => {
                if err.is_fatal() {
                    error!(ptr, size_bytes, %err, "stopping simulator");
                    self.halted = true;
                }
                Err(err)
            },
        }
    }

    /// Frees the block bound to `ptr`. Freeing a pointer that isn't allocated
    /// does nothing.
    pub fn free(&mut self, ptr: ClientPtr) -> Result<(), SimError> {
        self.ensure_running()?;
        if !self.pointers.contains(&ptr) {
            debug!(ptr, "ignoring free of a pointer that isn't allocated");
            return Ok(());
        }

        let index = self
            .ledger
            .find_by_owner(ptr)
            .ok_or(SimError::UnknownPointer(ptr))?;
        let address = self.ledger.headers()[index].address;
        self.ledger.mark_free(index);
        self.pointers.remove(&ptr);
        coalesce(&mut self.ledger, &mut self.heap, self.config.initial_heap_words);
        debug_assert_eq!(self.check_invariants(), Ok(()));

        debug!(ptr, address, "freed");
        Ok(())
    }

    /// Frees the block bound to `old_ptr`, then allocates a block of
    /// `size_bytes` bytes bound to `new_ptr`, which may be the same pointer.
    /// The old payload isn't carried over.
    ///
    /// Fails with [`SimError::UnknownPointer`] if `old_ptr` isn't allocated.
    /// The old block is freed before `new_ptr` is checked, so it stays freed
    /// if the new allocation is refused.
    pub fn reallocate(
        &mut self,
        size_bytes: usize,
        old_ptr: ClientPtr,
        new_ptr: ClientPtr,
    ) -> Result<Address, SimError> {
        self.ensure_running()?;
        if !self.pointers.contains(&old_ptr) {
            return Err(SimError::UnknownPointer(old_ptr));
        }

        self.free(old_ptr)?;
        self.allocate(size_bytes, new_ptr)
    }

    /// Executes a single request. Returns the address of the new block for
    /// allocations and reallocations.
    pub fn execute(&mut self, request: &Request) -> Result<Option<Address>, SimError> {
        match *request {
            Request::Allocate { size_bytes, ptr } => self.allocate(size_bytes, ptr).map(Some),
            Request::Free { ptr } => self.free(ptr).map(|()| None),
            Request::Reallocate {
                size_bytes,
                old_ptr,
                new_ptr,
            } => self.reallocate(size_bytes, old_ptr, new_ptr).map(Some),
        }
    }

    /// Executes requests in order. Refused requests are logged and skipped;
    /// running out of memory stops the run.
    pub fn run<I>(&mut self, requests: I) -> RunReport
    where
        I: IntoIterator<Item = Request>,
    {
        let mut report = RunReport::default();
        for request in requests {
            debug!(%request, "executing");
            match self.execute(&request) {
                Ok(_) => report.executed += 1,
                Err(err) if err.is_fatal() => {
                    report.out_of_memory = Some(err);
                    break;
                },
                Err(err) => {
                    warn!(%request, %err, "request refused");
                    report.rejected += 1;
                },
            }
        }
        report
    }
}
