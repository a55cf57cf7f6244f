use std::collections::HashMap;

use either::Either;

use crate::{alignment::is_double_word_aligned, config::ListMode, tag::BoundaryTag, Address, ClientPtr};

/// Every region is framed by a header word and a footer word.
pub const FRAMING_WORDS: usize = 2;

/// A region of the heap, as described by its header.
///
/// The header sits at `address`, the payload covers the `size` words after it
/// and the footer sits right after the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub address: Address,
    pub size: usize,
    pub free: bool,

    /// The client pointer bound to this region while it is in use.
    pub owner: Option<ClientPtr>,
}

impl Region {
    /// Creates a free region.
    pub fn new_free(address: Address, size: usize) -> Self {
        Self {
            address,
            size,
            free: true,
            owner: None,
        }
    }

    /// Creates an in use region owned by `owner`.
    pub fn new_used(address: Address, size: usize, owner: ClientPtr) -> Self {
        Self {
            address,
            size,
            free: false,
            owner: Some(owner),
        }
    }

    /// The address of this region's footer.
    pub fn footer_addr(&self) -> Address {
        self.address + self.size + 1
    }

    /// The address right after this region's footer, where the next region
    /// may start.
    pub fn end_addr(&self) -> Address {
        self.address + self.size + FRAMING_WORDS
    }

    /// The amount of words this region covers, including its framing.
    pub fn words(&self) -> usize {
        self.size + FRAMING_WORDS
    }

    /// The boundary tag written in this region's header and footer.
    pub fn tag(&self) -> BoundaryTag {
        BoundaryTag::new(self.size, self.free)
    }

    /// Returns the footer record mirroring this header.
    pub fn footer(&self) -> Footer {
        Footer {
            address: self.footer_addr(),
            size: self.size,
            free: self.free,
        }
    }

    /// Returns the lowest word inside this region where a block with
    /// `payload_words` words of payload can start with its payload double
    /// word aligned, if there is one.
    pub fn first_aligned_word(&self, payload_words: usize, word_size: usize) -> Option<Address> {
        if self.size < payload_words {
            return None;
        }
        let last_start = self.address + self.size - payload_words;
        (self.address..=last_start).find(|&word| is_double_word_aligned(word, word_size))
    }
}

/// A region's footer. Footers mirror headers, addressed from the end of each
/// region so that a region's predecessor can be found from its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub address: Address,
    pub size: usize,
    pub free: bool,
}

impl Footer {
    /// The boundary tag stored in this footer.
    pub fn tag(&self) -> BoundaryTag {
        BoundaryTag::new(self.size, self.free)
    }
}

/// A node of the explicit free list. Nodes live in an arena and point at each
/// other and at their region by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeNode {
    pub(crate) region: usize,
    pub(crate) prev: Option<usize>,
    pub(crate) next: Option<usize>,
}

/// The block ledger: the header records of every region, and the footer
/// records mirroring them.
#[derive(Debug, Clone)]
pub struct Ledger {
    pub(crate) mode: ListMode,

    /// Address ordered once coalesced. Placement appends new blocks at the
    /// end, the coalescer puts them in place.
    pub(crate) headers: Vec<Region>,

    /// Built from the tail of the heap backwards, so the footer of the last
    /// region comes first.
    pub(crate) footers: Vec<Footer>,

    /// Explicit mode only.
    pub(crate) free_nodes: Vec<FreeNode>,
    pub(crate) free_head: Option<usize>,
    pub(crate) owners: HashMap<ClientPtr, Address>,
}

impl Ledger {
    /// Creates an empty ledger. The coalescer turns an empty ledger into a
    /// single free region spanning the heap.
    pub fn new(mode: ListMode) -> Self {
        Self {
            mode,
            headers: Vec::new(),
            footers: Vec::new(),
            free_nodes: Vec::new(),
            free_head: None,
            owners: HashMap::new(),
        }
    }

    pub fn mode(&self) -> ListMode {
        self.mode
    }

    /// The header records, in list order.
    pub fn headers(&self) -> &[Region] {
        &self.headers
    }

    /// The footer records, last region first.
    pub fn footers(&self) -> &[Footer] {
        &self.footers
    }

    /// Iterates over the header records in list order.
    pub fn iter(&self) -> core::slice::Iter<'_, Region> {
        self.headers.iter()
    }

    /// The last header in the list.
    pub fn tail(&self) -> Option<&Region> {
        self.headers.last()
    }

    /// Inserts a header record either at the front of the list or at its end.
    pub fn insert(&mut self, region: Region, at_start: bool) {
        if let (ListMode::Explicit, Some(owner)) = (self.mode, region.owner) {
            self.owners.insert(owner, region.address);
        }

        if at_start {
            self.headers.insert(0, region);
        } else {
            self.headers.push(region);
        }
        self.relink();
    }

    /// Returns the index of the in use region owned by `ptr`.
    ///
    /// The implicit list keeps no index of its blocks, so it has to scan.
    pub fn find_by_owner(&self, ptr: ClientPtr) -> Option<usize> {
        match self.mode {
            ListMode::Implicit => self
                .headers
                .iter()
                .position(|region| !region.free && region.owner == Some(ptr)),
            ListMode::Explicit => {
                let address = *self.owners.get(&ptr)?;
                self.find_by_address(address)
            },
        }
    }

    /// Returns the index of the region whose header sits at `address`.
    ///
    /// The ledger must be coalesced, so that it is address ordered.
    pub fn find_by_address(&self, address: Address) -> Option<usize> {
        self.headers
            .binary_search_by_key(&address, |region| region.address)
            .ok()
    }

    /// Marks the region at `index` as free and returns the pointer that owned
    /// it.
    pub fn mark_free(&mut self, index: usize) -> Option<ClientPtr> {
        let region = self.headers.get_mut(index)?;
        region.free = true;
        let owner = region.owner.take();

        if let Some(owner) = owner {
            self.owners.remove(&owner);
        }
        self.relink();

        owner
    }

    /// Resizes the last region, which must be free, after the heap grew.
    pub(crate) fn extend_tail(&mut self, new_size: usize) {
        if let Some(tail) = self.headers.last_mut() {
            debug_assert!(tail.free, "only a free tail can be extended");
            tail.size = new_size;
        }
    }

    /// Iterates over the free regions. The explicit list follows its free list
    /// links, the implicit list has to look at every region.
    pub fn free_regions(&self) -> impl Iterator<Item = &Region> + '_ {
        match self.mode {
            ListMode::Explicit => Either::Left(FreeListIter {
                ledger: self,
                cursor: self.free_head,
            }),
            ListMode::Implicit => Either::Right(self.headers.iter().filter(|region| region.free)),
        }
    }

    /// Iterates over the in use regions together with their owner.
    pub fn used_regions(&self) -> impl Iterator<Item = (ClientPtr, &Region)> + '_ {
        self.headers
            .iter()
            .filter_map(|region| region.owner.filter(|_| !region.free).map(|owner| (owner, region)))
    }

    /// Rebuilds the explicit free list, threading the free regions in list
    /// order.
    pub(crate) fn relink(&mut self) {
        self.free_nodes.clear();
        self.free_head = None;
        if self.mode != ListMode::Explicit {
            return;
        }

        for (region_index, region) in self.headers.iter().enumerate() {
            if !region.free {
                continue;
            }
            let node_index = self.free_nodes.len();
            let prev = node_index.checked_sub(1);
            if let Some(prev) = prev {
                self.free_nodes[prev].next = Some(node_index);
            }
            self.free_nodes.push(FreeNode {
                region: region_index,
                prev,
                next: None,
            });
        }

        if !self.free_nodes.is_empty() {
            self.free_head = Some(0);
        }
    }
}

/// Walks the explicit free list.
struct FreeListIter<'a> {
    ledger: &'a Ledger,
    cursor: Option<usize>,
}

impl<'a> Iterator for FreeListIter<'a> {
    type Item = &'a Region;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.ledger.free_nodes.get(self.cursor?)?;
        self.cursor = node.next;
        self.ledger.headers.get(node.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_geometry() {
        let region = Region::new_used(5, 13, 1);
        assert_eq!(region.footer_addr(), 19);
        assert_eq!(region.end_addr(), 20);
        assert_eq!(region.words(), 15);
        assert_eq!(region.footer().address, region.footer_addr());
        assert_eq!(region.tag(), region.footer().tag());
    }

    #[test]
    fn first_aligned_word_skips_even_words() {
        let region = Region::new_free(0, 998);
        assert_eq!(region.first_aligned_word(2, 4), Some(1));

        let region = Region::new_free(5, 993);
        assert_eq!(region.first_aligned_word(13, 4), Some(5));
    }

    #[test]
    fn first_aligned_word_needs_room_after_alignment() {
        // starting at an even word, the block has to move one word up.
        let region = Region::new_free(4, 3);
        assert_eq!(region.first_aligned_word(3, 4), None);
        assert_eq!(region.first_aligned_word(2, 4), Some(5));

        let region = Region::new_free(4, 2);
        assert_eq!(region.first_aligned_word(3, 4), None);
    }

    #[test]
    fn insert_at_start_and_at_end() {
        let mut ledger = Ledger::new(ListMode::Implicit);
        ledger.insert(Region::new_used(7, 2, 1), false);
        ledger.insert(Region::new_used(11, 2, 2), false);
        ledger.insert(Region::new_free(0, 5), true);

        let addresses: Vec<_> = ledger.iter().map(|region| region.address).collect();
        assert_eq!(addresses, [0, 7, 11]);
        assert_eq!(ledger.tail().map(|region| region.address), Some(11));
    }

    #[test]
    fn find_by_owner_in_both_modes() {
        for mode in [ListMode::Implicit, ListMode::Explicit] {
            let mut ledger = Ledger::new(mode);
            ledger.insert(Region::new_used(1, 2, 10), false);
            ledger.insert(Region::new_free(5, 3), false);
            ledger.insert(Region::new_used(11, 4, 20), false);

            assert_eq!(ledger.find_by_owner(10), Some(0));
            assert_eq!(ledger.find_by_owner(20), Some(2));
            assert_eq!(ledger.find_by_owner(30), None);
            assert_eq!(ledger.find_by_address(5), Some(1));
            assert_eq!(ledger.find_by_address(6), None);
        }
    }

    #[test]
    fn mark_free_releases_the_owner() {
        let mut ledger = Ledger::new(ListMode::Explicit);
        ledger.insert(Region::new_used(1, 2, 10), false);

        assert_eq!(ledger.mark_free(0), Some(10));
        assert!(ledger.headers()[0].free);
        assert_eq!(ledger.headers()[0].owner, None);
        assert_eq!(ledger.find_by_owner(10), None);
        assert_eq!(ledger.free_regions().count(), 1);
    }

    #[test]
    fn explicit_free_list_only_visits_free_regions() {
        let mut ledger = Ledger::new(ListMode::Explicit);
        ledger.insert(Region::new_free(0, 3), false);
        ledger.insert(Region::new_used(5, 2, 1), false);
        ledger.insert(Region::new_free(9, 4), false);
        ledger.insert(Region::new_used(15, 2, 2), false);

        let free: Vec<_> = ledger.free_regions().map(|region| region.address).collect();
        assert_eq!(free, [0, 9]);
        assert_eq!(ledger.free_nodes[1].prev, Some(0));
        assert_eq!(ledger.free_nodes[0].next, Some(1));

        let used: Vec<_> = ledger.used_regions().map(|(owner, _)| owner).collect();
        assert_eq!(used, [1, 2]);
    }

    #[test]
    fn implicit_mode_has_no_free_list() {
        let mut ledger = Ledger::new(ListMode::Implicit);
        ledger.insert(Region::new_free(0, 3), false);
        ledger.insert(Region::new_used(5, 2, 1), false);

        assert!(ledger.free_nodes.is_empty());
        assert_eq!(ledger.free_regions().count(), 1);
    }
}
