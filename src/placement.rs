//! The placement engine: finds a free region for a new block, growing the heap
//! when none is large enough.

use tracing::debug;

use crate::{
    alignment::is_double_word_aligned,
    coalesce::coalesce,
    config::{FitPolicy, SimConfig},
    error::SimError,
    heap::Heap,
    ledger::{Ledger, Region, FRAMING_WORDS},
    Address, ClientPtr,
};

/// A place where a block fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fit {
    /// The word where the block's header goes.
    pub address: Address,

    /// The words the chosen free region has over the payload.
    pub leftover: usize,
}

/// Returns the fit for a block of `payload_words` words in `region`, if the
/// region can hold it.
fn fit_in(region: &Region, payload_words: usize, word_size: usize) -> Option<Fit> {
    let address = region.first_aligned_word(payload_words, word_size)?;
    Some(Fit {
        address,
        leftover: region.size - payload_words,
    })
}

/// Searches the free regions of the ledger for a place for a block of
/// `payload_words` words.
pub fn find_fit(
    ledger: &Ledger,
    policy: FitPolicy,
    payload_words: usize,
    word_size: usize,
) -> Option<Fit> {
    let mut fits = ledger
        .free_regions()
        .filter_map(|region| fit_in(region, payload_words, word_size));

    match policy {
        FitPolicy::First => fits.next(),
        // `min_by_key` keeps the first of equal candidates, which is the lowest
        // address since free regions are visited in address order.
        FitPolicy::Best => fits.min_by_key(|fit| fit.leftover),
    }
}

/// Grows the heap so that a block of `payload_words` words fits at its tail.
///
/// A free tail region is extended, otherwise a new free region is appended
/// after the last block. The heap grows just enough for the block to end on
/// its last word. Returns `false` if the heap can't grow that much.
fn grow_for(ledger: &mut Ledger, heap: &mut Heap, payload_words: usize, word_size: usize) -> bool {
    let tail = match ledger.tail() {
        Some(tail) => *tail,
        None => return false,
    };

    // the new block goes at the start of the free tail, or right after the
    // last block, moved up a word if its payload wouldn't be aligned.
    let start = if tail.free { tail.address } else { tail.end_addr() };
    let block_addr = if is_double_word_aligned(start, word_size) {
        start
    } else {
        start + 1
    };
    let block_end = match payload_words
        .checked_add(block_addr)
        .and_then(|end| end.checked_add(FRAMING_WORDS))
    {
        Some(block_end) => block_end,
        None => return false,
    };

    let delta = block_end.saturating_sub(heap.size());
    let grown = isize::try_from(delta).map_or(false, |delta| heap.grow(delta));
    if !grown {
        return false;
    }

    if tail.free {
        ledger.extend_tail(heap.size() - tail.address - FRAMING_WORDS);
    } else {
        ledger.insert(
            Region::new_free(start, heap.size() - start - FRAMING_WORDS),
            false,
        );
    }
    debug!(payload_words, delta, heap_words = heap.size(), "heap grown to fit block");
    true
}

/// Places a block of `payload_words` words owned by `owner`, then coalesces
/// the ledger. Returns the address of the block's header.
///
/// If no free region fits, the heap grows and the search is retried. When the
/// heap can't grow any further the allocation fails with
/// [`SimError::OutOfMemory`].
pub(crate) fn place(
    ledger: &mut Ledger,
    heap: &mut Heap,
    config: &SimConfig,
    payload_words: usize,
    owner: ClientPtr,
) -> Result<Address, SimError> {
    loop {
        if let Some(fit) = find_fit(ledger, config.fit_policy, payload_words, config.word_size) {
            debug!(
                owner,
                address = fit.address,
                payload_words,
                leftover = fit.leftover,
                policy = %config.fit_policy,
                "block placed"
            );
            ledger.insert(Region::new_used(fit.address, payload_words, owner), false);
            coalesce(ledger, heap, config.initial_heap_words);
            return Ok(fit.address);
        }

        if !grow_for(ledger, heap, payload_words, config.word_size) {
            let heap_words = heap.size();
            coalesce(ledger, heap, config.initial_heap_words);
            return Err(SimError::OutOfMemory {
                requested_words: payload_words,
                heap_words,
                ceiling: heap.ceiling(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{coalesce::check_invariants, config::ListMode};

    fn ledger_with(mode: ListMode, regions: &[Region]) -> Ledger {
        let mut ledger = Ledger::new(mode);
        for region in regions {
            ledger.insert(*region, false);
        }
        ledger
    }

    #[test]
    fn first_fit_takes_the_first_region_large_enough() {
        for mode in [ListMode::Implicit, ListMode::Explicit] {
            let ledger = ledger_with(
                mode,
                &[
                    Region::new_free(0, 1),
                    Region::new_used(3, 2, 1),
                    Region::new_free(7, 20),
                    Region::new_used(29, 2, 2),
                    Region::new_free(33, 4),
                ],
            );

            assert_eq!(
                find_fit(&ledger, FitPolicy::First, 3, 4),
                Some(Fit {
                    address: 7,
                    leftover: 17
                })
            );
        }
    }

    #[test]
    fn best_fit_takes_the_tightest_region() {
        for mode in [ListMode::Implicit, ListMode::Explicit] {
            let ledger = ledger_with(
                mode,
                &[
                    Region::new_free(0, 1),
                    Region::new_used(3, 2, 1),
                    Region::new_free(7, 20),
                    Region::new_used(29, 2, 2),
                    Region::new_free(33, 4),
                    Region::new_used(39, 2, 3),
                    Region::new_free(43, 4),
                ],
            );

            // both 4 word regions leave 1 word over, the lower one wins.
            assert_eq!(
                find_fit(&ledger, FitPolicy::Best, 3, 4),
                Some(Fit {
                    address: 33,
                    leftover: 1
                })
            );
        }
    }

    #[test]
    fn regions_without_an_aligned_start_are_skipped() {
        let ledger = ledger_with(
            ListMode::Implicit,
            &[
                Region::new_free(4, 3),
                Region::new_used(9, 2, 1),
                Region::new_free(13, 5),
            ],
        );

        // the region at 4 is large enough but only word 4 could hold the block.
        assert_eq!(
            find_fit(&ledger, FitPolicy::Best, 3, 4),
            Some(Fit {
                address: 13,
                leftover: 2
            })
        );
        assert_eq!(find_fit(&ledger, FitPolicy::First, 6, 4), None);
    }

    #[test]
    fn place_grows_an_empty_heap() {
        let config = SimConfig::new(ListMode::Implicit, FitPolicy::First);
        let mut ledger = Ledger::new(ListMode::Implicit);
        let mut heap = Heap::new(1000, 100_000);
        coalesce(&mut ledger, &mut heap, 1000);

        let address = place(&mut ledger, &mut heap, &config, 998, 0).unwrap();

        assert_eq!(address, 1);
        assert_eq!(heap.size(), 1001);
        assert_eq!(check_invariants(&ledger, heap.size()), Ok(()));
    }

    #[test]
    fn place_appends_after_a_used_tail() {
        let config = SimConfig::new(ListMode::Explicit, FitPolicy::Best);
        let mut ledger = Ledger::new(ListMode::Explicit);
        let mut heap = Heap::new(1000, 100_000);
        coalesce(&mut ledger, &mut heap, 1000);

        assert_eq!(place(&mut ledger, &mut heap, &config, 2000, 0), Ok(1));
        assert_eq!(heap.size(), 2003);

        assert_eq!(place(&mut ledger, &mut heap, &config, 10, 1), Ok(2003));
        assert_eq!(heap.size(), 2015);
        assert_eq!(check_invariants(&ledger, heap.size()), Ok(()));
    }

    #[test]
    fn place_fails_past_the_ceiling() {
        let config = SimConfig::new(ListMode::Implicit, FitPolicy::First);
        let mut ledger = Ledger::new(ListMode::Implicit);
        let mut heap = Heap::new(1000, 100_000);
        coalesce(&mut ledger, &mut heap, 1000);

        assert_eq!(
            place(&mut ledger, &mut heap, &config, 100_000, 0),
            Err(SimError::OutOfMemory {
                requested_words: 100_000,
                heap_words: 1000,
                ceiling: 100_000,
            })
        );
        assert_eq!(heap.size(), 1000);
        assert_eq!(ledger.headers(), [Region::new_free(0, 998)]);
    }
}
