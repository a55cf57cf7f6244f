//! The coalescing engine.
//!
//! After every allocation or free the ledger is rebuilt from its in use
//! regions alone: they are sorted by address, every gap between them that is
//! large enough to hold a free region gets one, and the heap is trimmed so that
//! no capacity is carried past the last region. Since every free region is
//! regenerated from the gaps, adjacent free space always ends up in a single
//! region.
//!
//! Gaps too small to hold a free region (1 or 2 words, since blocks start on
//! odd words) stay untracked. They are the only words of the heap not covered
//! by a region.

use std::collections::HashSet;

use tracing::trace;

use crate::{
    config::ListMode,
    error::InvariantViolation,
    heap::Heap,
    ledger::{Ledger, Region, FRAMING_WORDS},
    Address,
};

/// The smallest gap that is tracked as a free region: a header, one word of
/// payload and a footer.
pub const MIN_FREE_REGION_WORDS: usize = FRAMING_WORDS + 1;

/// Returns a free region exactly filling the words in `start..next`, if they
/// are enough to hold one.
fn gap_filler(start: Address, next: Address) -> Option<Region> {
    let gap = next.checked_sub(start)?;
    if gap < MIN_FREE_REGION_WORDS {
        return None;
    }
    Some(Region::new_free(start, gap - FRAMING_WORDS))
}

/// Brings the ledger back to its canonical form, trimming the heap down to
/// `trim_floor` words at the lowest.
pub(crate) fn coalesce(ledger: &mut Ledger, heap: &mut Heap, trim_floor: usize) {
    // drop the stale free regions at the start of the list, then every other
    // free region. only the in use regions and their order survive.
    let first_used = ledger
        .headers
        .iter()
        .position(|region| !region.free)
        .unwrap_or(ledger.headers.len());
    ledger.headers.drain(..first_used);
    ledger.headers.retain(|region| !region.free);

    if ledger.headers.is_empty() {
        if heap.size() > trim_floor {
            let shrunk = heap.shrink(heap.size() - trim_floor);
            debug_assert!(shrunk, "trimming an empty heap can't fail");
        }
        trace!(heap_words = heap.size(), "no blocks in use, heap is a single free region");
        ledger.headers.push(Region::new_free(0, heap.size() - FRAMING_WORDS));
        finish(ledger);
        return;
    }

    ledger.headers.sort_by_key(|region| region.address);

    // fill the gaps between consecutive blocks.
    let used = core::mem::take(&mut ledger.headers);
    let mut tiled: Vec<Region> = Vec::with_capacity(used.len() * 2 + 1);
    for region in used {
        let filler = tiled
            .last()
            .and_then(|prev| gap_filler(prev.end_addr(), region.address));
        tiled.extend(filler);
        tiled.push(region);
    }
    ledger.headers = tiled;

    // fill the space before the first block.
    let first_addr = ledger.headers[0].address;
    if let Some(head) = gap_filler(0, first_addr) {
        ledger.insert(head, true);
    }

    // trim the space after the last block, but never below the floor. what the
    // floor keeps becomes the free tail.
    let last_end = ledger.headers[ledger.headers.len() - 1].end_addr();
    let target = core::cmp::max(last_end, trim_floor);
    if heap.size() > target {
        let shrunk = heap.shrink(heap.size() - target);
        debug_assert!(shrunk, "trimming the heap tail can't fail");
    }
    if let Some(tail) = gap_filler(last_end, heap.size()) {
        ledger.headers.push(tail);
    }

    trace!(
        regions = ledger.headers.len(),
        heap_words = heap.size(),
        "ledger coalesced"
    );
    finish(ledger);
}

/// Regenerates the footers and the explicit free list from the headers.
fn finish(ledger: &mut Ledger) {
    regenerate_footers(ledger);
    ledger.relink();
}

/// Emits one footer per header, walking from the last header to the first.
fn regenerate_footers(ledger: &mut Ledger) {
    ledger.footers.clear();
    ledger
        .footers
        .extend(ledger.headers.iter().rev().map(Region::footer));
}

/// Returns every run of heap words lying between regions, as its start and
/// length: the head of the heap, the gaps between consecutive regions and the
/// tail. Runs of length 0 are skipped.
pub fn untracked_gaps(
    ledger: &Ledger,
    heap_words: usize,
) -> impl Iterator<Item = (Address, usize)> + '_ {
    let starts = core::iter::once(0).chain(ledger.iter().map(Region::end_addr));
    let ends = ledger
        .iter()
        .map(|region| region.address)
        .chain(core::iter::once(heap_words));
    starts
        .zip(ends)
        .map(|(start, end)| (start, end.saturating_sub(start)))
        .filter(|&(_, words)| words > 0)
}

/// Returns the amount of heap words not covered by any region.
pub fn untracked_words(ledger: &Ledger, heap_words: usize) -> usize {
    untracked_gaps(ledger, heap_words).map(|(_, words)| words).sum()
}

/// Checks every invariant of a coalesced ledger over a heap of `heap_words`
/// words.
pub fn check_invariants(ledger: &Ledger, heap_words: usize) -> Result<(), InvariantViolation> {
    let headers = ledger.headers();
    let first = headers.first().ok_or(InvariantViolation::Empty)?;

    if first.address >= MIN_FREE_REGION_WORDS {
        return Err(InvariantViolation::UntrackedGap {
            address: 0,
            words: first.address,
        });
    }

    for pair in headers.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let prev_end = prev.end_addr();
        if next.address < prev_end {
            return Err(InvariantViolation::Unsorted {
                address: next.address,
                prev_end,
            });
        }
        if next.address - prev_end >= MIN_FREE_REGION_WORDS {
            return Err(InvariantViolation::UntrackedGap {
                address: prev_end,
                words: next.address - prev_end,
            });
        }
        if prev.free && next.free {
            return Err(InvariantViolation::AdjacentFree {
                first: prev.address,
                second: next.address,
            });
        }
    }

    let last = &headers[headers.len() - 1];
    if last.end_addr() > heap_words {
        return Err(InvariantViolation::PastHeapEnd {
            address: last.address,
            end: last.end_addr(),
            heap_words,
        });
    }
    if heap_words - last.end_addr() >= MIN_FREE_REGION_WORDS {
        return Err(InvariantViolation::UntrackedGap {
            address: last.end_addr(),
            words: heap_words - last.end_addr(),
        });
    }

    let mut owners = HashSet::new();
    for region in headers {
        let owner_ok = match (region.free, region.owner) {
            (true, None) => true,
            (false, Some(owner)) => owners.insert(owner),
            _ => false,
        };
        if !owner_ok {
            return Err(InvariantViolation::BadOwner {
                address: region.address,
            });
        }
    }

    if ledger.footers().len() != headers.len() {
        return Err(InvariantViolation::FooterMismatch {
            address: last.address,
        });
    }
    for (footer, header) in ledger.footers().iter().rev().zip(headers) {
        if *footer != header.footer() {
            return Err(InvariantViolation::FooterMismatch {
                address: header.address,
            });
        }
    }

    if ledger.mode() == ListMode::Explicit {
        check_explicit_lists(ledger)?;
    }

    Ok(())
}

/// Checks that the free list threads exactly the free regions, in order, and
/// that the owner index matches the in use regions.
fn check_explicit_lists(ledger: &Ledger) -> Result<(), InvariantViolation> {
    let headers = ledger.headers();
    let mut expected = headers
        .iter()
        .enumerate()
        .filter(|(_, region)| region.free)
        .map(|(index, _)| index);

    let mut prev_node = None;
    let mut cursor = ledger.free_head;
    while let Some(node_index) = cursor {
        let node = ledger.free_nodes.get(node_index).ok_or(InvariantViolation::BrokenFreeList {
            address: headers[0].address,
        })?;
        let address = headers
            .get(node.region)
            .map_or(headers[0].address, |region| region.address);
        if node.prev != prev_node || expected.next() != Some(node.region) {
            return Err(InvariantViolation::BrokenFreeList { address });
        }
        prev_node = Some(node_index);
        cursor = node.next;
    }
    if let Some(missing) = expected.next() {
        return Err(InvariantViolation::BrokenFreeList {
            address: headers[missing].address,
        });
    }

    let mut used = 0;
    for (owner, region) in ledger.used_regions() {
        used += 1;
        if ledger.owners.get(&owner) != Some(&region.address) {
            return Err(InvariantViolation::BadOwner {
                address: region.address,
            });
        }
    }
    if used != ledger.owners.len() {
        return Err(InvariantViolation::BadOwner {
            address: headers[0].address,
        });
    }

    Ok(())
}
