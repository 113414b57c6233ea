//! The list of active formatting elements.
//!
//! > The list contains elements in the formatting category, and markers.
//! > The markers are inserted when entering applet, object, marquee,
//! > template, td, th, and caption elements, and are used to prevent
//! > formatting from "leaking" into those elements.
//!
//! @see https://html.spec.whatwg.org/multipage/parsing.html#the-list-of-active-formatting-elements

use crate::node::NodeId;

/// One slot in the list: a formatting element or a scope-marker sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AfeEntry {
    Marker,
    Element(NodeId),
}

#[derive(Debug, Default)]
pub(crate) struct ActiveFormattingElements {
    entries: Vec<AfeEntry>,
}

impl ActiveFormattingElements {
    pub fn new() -> ActiveFormattingElements {
        ActiveFormattingElements::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> AfeEntry {
        self.entries[i]
    }

    pub fn set(&mut self, i: usize, entry: AfeEntry) {
        self.entries[i] = entry;
    }

    pub fn last(&self) -> Option<AfeEntry> {
        self.entries.last().copied()
    }

    pub fn push_element(&mut self, element: NodeId) {
        self.entries.push(AfeEntry::Element(element));
    }

    /// Inserts a marker, bounding how far formatting reconstruction may
    /// reach back.
    pub fn insert_marker(&mut self) {
        self.entries.push(AfeEntry::Marker);
    }

    pub fn insert(&mut self, i: usize, entry: AfeEntry) {
        self.entries.insert(i, entry);
    }

    /// Position of `element` in the list.
    pub fn index_of(&self, element: NodeId) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|&e| e == AfeEntry::Element(element))
    }

    /// Removes `element` from the list; a no-op when absent.
    pub fn remove(&mut self, element: NodeId) {
        if let Some(i) = self.index_of(element) {
            self.entries.remove(i);
        }
    }

    /// > Remove entries ... until the list is empty or a marker has been
    /// > removed.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#clear-the-list-of-active-formatting-elements-up-to-the-last-marker
    pub fn clear_up_to_last_marker(&mut self) {
        while let Some(entry) = self.entries.pop() {
            if entry == AfeEntry::Marker {
                break;
            }
        }
    }
}
