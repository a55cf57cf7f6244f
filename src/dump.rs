//! Writes the heap out one word per line, showing the boundary tags.

use std::io::{self, Write};

use crate::{ledger::Ledger, tag::BoundaryTag, Simulator};

/// Returns the boundary tag stored at every word of a heap of `heap_words`
/// words, `None` for payload words and untracked words.
pub fn heap_words_tags(ledger: &Ledger, heap_words: usize) -> Vec<Option<BoundaryTag>> {
    let mut words = vec![None; heap_words];
    for region in ledger.headers() {
        if let Some(word) = words.get_mut(region.address) {
            *word = Some(region.tag());
        }
    }
    for footer in ledger.footers() {
        if let Some(word) = words.get_mut(footer.address) {
            *word = Some(footer.tag());
        }
    }
    words
}

/// Writes `<address>, <tag>` for every word of the simulator's heap, leaving
/// the tag out for words that hold none.
pub fn write_heap_dump<W: Write>(simulator: &Simulator, mut out: W) -> io::Result<()> {
    let tags = heap_words_tags(simulator.ledger(), simulator.heap_size());
    for (address, tag) in tags.iter().enumerate() {
        match tag {
            Some(tag) => writeln!(out, "{}, {}", address, tag)?,
            None => writeln!(out, "{}, ", address)?,
        }
    }
    out.flush()
}
