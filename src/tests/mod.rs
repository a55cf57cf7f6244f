
use super::*;

/// Every combination of list mode and fit policy.
const ALL_MODES: [(ListMode, FitPolicy); 4] = [
    (ListMode::Implicit, FitPolicy::First),
    (ListMode::Implicit, FitPolicy::Best),
    (ListMode::Explicit, FitPolicy::First),
    (ListMode::Explicit, FitPolicy::Best),
];

/// Creates a simulator over the default 1000 word heap.
fn simulator(list_mode: ListMode, fit_policy: FitPolicy) -> Simulator {
    Simulator::new(SimConfig::new(list_mode, fit_policy)).unwrap()
}

/// Makes sure that the ledger is canonical, and that the regions cover the
/// whole heap apart from gaps too small to hold a region.
fn assert_canonical(simulator: &Simulator) {
    assert_eq!(simulator.check_invariants(), Ok(()));

    let heap_words = simulator.heap_size();
    for (address, words) in coalesce::untracked_gaps(simulator.ledger(), heap_words) {
        assert!(
            words < coalesce::MIN_FREE_REGION_WORDS,
            "untracked gap of {} words at {}",
            words,
            address
        );
    }
    let tracked: usize = simulator.ledger().iter().map(Region::words).sum();
    let untracked = coalesce::untracked_words(simulator.ledger(), heap_words);
    assert_eq!(tracked + untracked, heap_words);

    let used = simulator.ledger().used_regions().count();
    assert_eq!(used, simulator.pointers().count());
}

/// Makes sure that the heap is a single free region spanning `heap_words`
/// words.
fn assert_only_1_free_region(simulator: &Simulator, heap_words: usize) {
    assert_canonical(simulator);
    assert_eq!(simulator.heap_size(), heap_words);
    assert_eq!(
        simulator.ledger().headers(),
        [Region::new_free(0, heap_words - ledger::FRAMING_WORDS)]
    );
    assert_eq!(simulator.ledger().footers()[0].address, heap_words - 1);
}

/// Returns the region bound to `ptr`.
fn region_of(simulator: &Simulator, ptr: ClientPtr) -> Region {
    let index = simulator.ledger().find_by_owner(ptr).unwrap();
    simulator.ledger().headers()[index]
}
